use std::collections::HashMap;

use compiler::CompileError;
use compiler::color::ColorTable;
use compiler::environment::Heap;
use compiler::evaluator::{evaluate_fragment, evaluate_line, substitute_named, substitute_variables};
use compiler::method::{BodyLine, HeapPolicy, Method, expand_assignment};
use compiler::output::OutputBuffer;
use compiler::template_engine::{Declaration, Format, TemplateEngine, find_calls, parse_declaration};

fn eval(fragment: &str) -> String {
    evaluate_fragment(fragment, ColorTable::html()).expect("evaluation failed")
}

fn heap(pairs: &[(&str, &str)]) -> Heap {
    let mut heap = Heap::default();
    for (name, value) in pairs {
        heap.set(*name, *value);
    }
    heap
}

// ---- Arithmetic ----

#[test]
fn precedence_and_grouping() {
    assert_eq!(eval("2 + 3 * 4"), "14");
    assert_eq!(eval("(2 + 3) * 4"), "20");
    assert_eq!(eval("-5 + 10"), "5");
    assert_eq!(eval("10 - 2 - 3"), "5");
}

#[test]
fn division_keeps_integers_when_exact() {
    assert_eq!(eval("7 / 2"), "3.5");
    assert_eq!(eval("8 / 2"), "4");
    assert_eq!(eval("1.5 * 2"), "3");
    assert_eq!(eval("-7 % 3"), "2");
}

#[test]
fn strings_concatenate() {
    assert_eq!(eval("\"foo\" + \"bar\""), "\"foobar\"");
}

#[test]
fn non_arithmetic_text_is_untouched() {
    for text in ["main-box", "#main-box", "#fade-in", "class=\"a-b\"", "\"a + b\"", "2em + 1"] {
        assert_eq!(eval(text), text);
    }
}

#[test]
fn attribute_values_are_evaluated() {
    assert_eq!(eval("width=2*3"), "width=\"6\"");
}

#[test]
fn math_errors() {
    let colors = ColorTable::html();
    assert!(matches!(
        evaluate_fragment("3 +", colors),
        Err(CompileError::InvalidMath { .. })
    ));
    assert!(evaluate_fragment("1 / 0", colors).is_err());
    assert!(evaluate_fragment("\"a\" * 2", colors).is_err());
    assert!(evaluate_fragment("\"a\" + 2", colors).is_err());
}

#[test]
fn integer_overflow_is_a_math_error() {
    let colors = ColorTable::html();
    let min = "(-9223372036854775807 - 1)";
    for fragment in [
        format!("{} / -1", min),
        format!("{} % -1", min),
        format!("-{}", min),
        format!("{} - 1", min),
        "9223372036854775807 * 2".to_string(),
    ] {
        let result = evaluate_fragment(&fragment, colors);
        assert!(
            matches!(&result, Err(CompileError::InvalidMath { reason, .. }) if reason == "integer overflow"),
            "{} gave {:?}",
            fragment,
            result
        );
    }
    assert_eq!(eval("7 % -3"), "-2");
    assert_eq!(eval("-9 / 3"), "-3");
}

// ---- Colors ----

#[test]
fn color_arithmetic() {
    assert_eq!(eval("\"white\" + \"#000001\""), "#ffffff");
    assert_eq!(eval("#f00 + #001"), "#ff0011");
    assert_eq!(eval("\"#000\" - 1"), "#000000");
    assert_eq!(eval("#808080 / 2"), "#404040");
    assert_eq!(eval("\"Black\" + 255"), "#0000ff");
}

#[test]
fn color_table_conversions() {
    let colors = ColorTable::html();
    assert_eq!(colors.to_num("white").unwrap(), 0xffffff);
    assert_eq!(colors.to_num("#FFF").unwrap(), 0xffffff);
    assert_eq!(colors.to_num("00ff00").unwrap(), 0x00ff00);
    assert!(colors.to_num("abcd").is_err());
    assert!(colors.to_num("nocolor").is_err());
    assert_eq!(colors.to_color(-5), "#000000");
    assert_eq!(colors.to_color(0x1000000), "#ffffff");
    assert!(colors.is_named("RebeccaPurple"));
}

// ---- Lines and substitution ----

#[test]
fn evaluate_line_keeps_indentation_and_colon() {
    let colors = ColorTable::html();
    assert_eq!(
        evaluate_line("    div(data-a=1+1, .big):", colors).unwrap(),
        "    div(data-a=\"2\",class=\"big\"):"
    );
    assert_eq!(evaluate_line("p", colors).unwrap(), "p");
    assert_eq!(evaluate_line("", colors).unwrap(), "");
}

#[test]
fn substitution() {
    let heap = heap(&[("$x", "1"), ("$name", "box")]);
    assert_eq!(
        substitute_variables("\\$x $x-$name", &heap, &[]).unwrap(),
        "\\$x 1-box"
    );
    assert!(matches!(
        substitute_variables("$y", &heap, &[]),
        Err(CompileError::UndefinedVariable(ref name)) if name == "$y"
    ));
    assert_eq!(
        substitute_variables("$y $x", &heap, &["$y".to_string()]).unwrap(),
        "$y 1"
    );
    assert_eq!(
        substitute_named("$x $name", &["$name".to_string()], &heap).unwrap(),
        "$x box"
    );
}

// ---- Methods ----

#[test]
fn compound_assignment_expansion() {
    assert_eq!(expand_assignment("$a += 2"), "$a := $a + (2)");
    assert_eq!(expand_assignment("  $a *= $b"), "  $a := $a * ($b)");
    assert_eq!(expand_assignment("p(x+=1)"), "p(x+=1)");
}

#[test]
fn method_binding_and_invocation() {
    let mut method = Method::new("m", vec!["$a".to_string()], HeapPolicy::Copy);
    method.add_line(0, "$b := $a * 2");
    method.add_line(1, "    p(\"$b\")");
    assert!(method.is_local("$a"));
    assert!(method.is_local("$b"));
    assert_eq!(method.body()[1].depth(), 1);

    let mut heap = Heap::default();
    assert!(matches!(
        method.bind(&[], &mut heap),
        Err(CompileError::ArgumentCount { expected: 1, got: 0, .. })
    ));
    method.bind(&["4".to_string()], &mut heap).unwrap();

    let colors = ColorTable::html();
    assert!(method.run_line(0, &mut heap, colors).unwrap().unwrap().is_none());
    assert_eq!(heap.get("$b"), Some("8"));
    assert_eq!(
        method.run_line(1, &mut heap, colors).unwrap().unwrap(),
        Some(BodyLine {
            depth: 1,
            text: "p(\"8\")".to_string()
        })
    );
    assert!(method.run_line(2, &mut heap, colors).is_none());
}

#[test]
fn multiple_assignment_in_a_body_is_an_error() {
    let mut method = Method::new("m", Vec::new(), HeapPolicy::Shared);
    method.add_line(0, "$a := $b := 1");
    let mut heap = Heap::default();
    let line = method.run_line(0, &mut heap, ColorTable::html()).unwrap();
    assert!(matches!(line, Err(CompileError::MultipleAssignment(_))));
}

// ---- Template engines ----

#[test]
fn formats() {
    let format = Format::parse("{%% %s %%}").unwrap();
    assert_eq!(format.holes(), 1);
    assert_eq!(format.render(&["if x"]), "{% if x %}");
    assert!(Format::parse("%d").is_err());
    assert!(TemplateEngine::new("e", "no hole").is_err());
}

#[test]
fn engine_methods() {
    let mut engine = TemplateEngine::new("django", "{%% %s %%}").unwrap();
    engine.add_method("if", "if %s", Some("endif")).unwrap();
    engine.enhance_method("if", "else", "else").unwrap();
    assert!(engine.add_method("bad", "x", Some("end %s")).is_err());
    assert!(engine.enhance_method("missing", "x", "x").is_err());

    let err = engine.call_method("if", &[], None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "template engine: TemplateEngine method if takes 1 variables, 0 given"
    );

    assert_eq!(engine.call_method("if", &["a".to_string()], Some(0)).unwrap(), "{% if a %}");
    assert_eq!(engine.open_calls(), 1);
    assert!(engine.is_submethod("else", 0));
    assert!(!engine.is_submethod("else", 1));
    assert_eq!(engine.end_method("if", true).as_deref(), Some("{% endif %}"));
    assert_eq!(engine.open_calls(), 0);
}

#[test]
fn declarations() {
    assert_eq!(
        parse_declaration("jinja = TemplateEngine(\"{{ %s }}\")").unwrap(),
        Some(Declaration::Engine {
            name: "jinja".to_string(),
            format: "{{ %s }}".to_string(),
        })
    );
    assert_eq!(
        parse_declaration("jinja.if = create(\"if %s\", \"endif\")").unwrap(),
        Some(Declaration::Create {
            engine: "jinja".to_string(),
            method: "if".to_string(),
            start: "if %s".to_string(),
            end: Some("endif".to_string()),
        })
    );
    assert!(matches!(
        parse_declaration("jinja.else = jinja.if.append(\"else\")").unwrap(),
        Some(Declaration::Append { ref parent, .. }) if parent == "if"
    ));
    assert!(parse_declaration("other.else = jinja.if.append(\"else\")").is_err());
    assert_eq!(parse_declaration("div(.a)").unwrap(), None);
}

#[test]
fn call_sites() {
    let mut engines = HashMap::new();
    let mut engine = TemplateEngine::new("t", "{{ %s }}").unwrap();
    engine.add_method("var", "%s", None).unwrap();
    engines.insert("t".to_string(), engine);

    let calls = find_calls("p(\"t.var\", t.var(\"x\"), u.var(y))", &engines).unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, "var");
    assert_eq!(calls[0].arguments, vec!["x".to_string()]);
    assert!(find_calls("st.var", &engines).unwrap().is_empty());
}

// ---- Output ----

#[test]
fn output_buffer() {
    let mut output = OutputBuffer::new();
    output.append("<p>\\$5\n");
    assert_eq!(output.as_str(), "<p>$5\n");
    output.replace_suffix(">$5\n", ">$6\n").unwrap();
    assert_eq!(output.as_str(), "<p>$6\n");
    assert!(output.replace_suffix("nope", "").is_err());
}
