mod test_runner;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use compiler::{CompilerOptions, DiagnosticError};

const SUBCOMMANDS: &[&str] = &["compile", "test", "help"];

#[derive(Parser)]
#[command(name = "pyml", version, about = "Pythonic markup to HTML compiler")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// More log output: -v info, -vv debug, -vvv trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a .pyml file
    Compile(CompileArgs),

    /// Run .test.pyml test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct CompileArgs {
    /// Source file to compile
    file: PathBuf,

    /// Output file (default: the input with the output extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the output to stdout instead of a file
    #[arg(long, conflicts_with = "output")]
    stdout: bool,

    /// Compile but write nothing (exit 0 if valid)
    #[arg(long)]
    check: bool,

    /// List the methods defined by the file and its imports
    #[arg(long)]
    list_methods: bool,

    /// Markup rule set: a built-in name, a rule file path, or a name under <lib>/markup/
    #[arg(long)]
    markup: Option<String>,

    /// Extra import directory, searched after the file's own. Repeatable.
    #[arg(long = "lib-dir")]
    lib_dirs: Vec<PathBuf>,

    /// Maximum nesting of macro expansions
    #[arg(long)]
    max_depth: Option<usize>,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.pyml file or directory containing them
    path: PathBuf,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    // `pyml page.pyml` is shorthand for `pyml compile page.pyml`.
    let mut args: Vec<String> = std::env::args().collect();
    let first_positional = args
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, arg)| !arg.starts_with('-'))
        .map(|(index, arg)| (index, arg.clone()));
    if let Some((index, first)) = first_positional {
        if !SUBCOMMANDS.contains(&first.as_str()) {
            args.insert(index, "compile".to_string());
        }
    }

    let cli = Cli::parse_from(&args);
    init_logging(cli.verbose);

    let color = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    let exit_code = match cli.command {
        Command::Compile(compile_args) => do_compile(compile_args, color),
        Command::Test(test_args) => {
            if test_args.list_categories {
                test_runner::list_categories(&test_args.path);
                0
            } else {
                test_runner::run_tests(&test_args.path, cli.no_color, &test_args.category)
            }
        }
    };
    process::exit(exit_code);
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Options from the `pyml.toml` next to the input, overridden by flags.
fn options_for(base_dir: &Path, args: &CompileArgs) -> Result<CompilerOptions, compiler::CompileError> {
    let mut options = CompilerOptions::load(base_dir)?;
    if let Some(markup) = &args.markup {
        options.markup = markup.clone();
    }
    options.library_dirs.extend(args.lib_dirs.iter().cloned());
    if let Some(depth) = args.max_depth {
        options.max_depth = depth;
    }
    Ok(options)
}

fn do_compile(args: CompileArgs, color: ColorChoice) -> i32 {
    let base_dir = match args.file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let options = match options_for(&base_dir, &args) {
        Ok(options) => options,
        Err(error) => {
            emit_error(&DiagnosticError::unlocated(error, &base_dir), color);
            return 1;
        }
    };
    let extension = options.output_extension.clone();
    let rules = match options.load_rules(&base_dir) {
        Ok(rules) => rules,
        Err(error) => {
            emit_error(&DiagnosticError::unlocated(error, &args.file), color);
            return 1;
        }
    };

    let mut parser = compiler::Parser::new(rules, options);
    if let Err(error) = parser.compile_file(&args.file) {
        emit_error(&error, color);
        return 1;
    }

    if args.list_methods {
        for name in parser.method_names() {
            println!("{}", name);
        }
    }
    if args.check {
        eprintln!("ok: {} compiled successfully", args.file.display());
        return 0;
    }
    if args.list_methods {
        return 0;
    }

    let output = parser.into_output();
    if args.stdout {
        print!("{}", output);
        return 0;
    }

    let target = args
        .output
        .unwrap_or_else(|| args.file.with_extension(&extension));
    if let Err(e) = fs::write(&target, output) {
        eprintln!("error: cannot write '{}': {}", target.display(), e);
        return 1;
    }
    log::info!("wrote {}", target.display());
    0
}

/// Render a compile error with the offending line of its file labelled.
fn emit_error(error: &DiagnosticError, color: ColorChoice) {
    let Ok(source) = fs::read_to_string(&error.file) else {
        eprintln!("{}", error);
        return;
    };

    let mut files = SimpleFiles::new();
    let file_id = files.add(error.file.display().to_string(), source.clone());
    let diagnostic = error.to_diagnostic(file_id, &source);

    let writer = StandardStream::stderr(color);
    let config = term::Config::default();
    if term::emit_to_write_style(&mut writer.lock(), &config, &files, &diagnostic).is_err() {
        eprintln!("{}", error);
    }
}
