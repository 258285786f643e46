use pyml::{IndentTracker, SyntaxError, logical_lines};

#[test]
fn first_indented_line_sets_the_unit() {
    let mut tracker = IndentTracker::new();
    assert_eq!(tracker.find_indent("html").unwrap(), 0);
    assert_eq!(tracker.find_indent("  body").unwrap(), 1);
    assert_eq!(tracker.find_indent("    div").unwrap(), 2);
    assert_eq!(tracker.unit(), Some("  "));
    assert_eq!(tracker.indent_to(3), "      ");
}

#[test]
fn non_multiple_indentation_is_an_error() {
    let mut tracker = IndentTracker::new();
    tracker.find_indent("\tbody").unwrap();
    assert!(matches!(
        tracker.find_indent("  div"),
        Err(SyntaxError::InconsistentIndentation { .. })
    ));

    let mut tracker = IndentTracker::new();
    tracker.find_indent("    a").unwrap();
    assert!(tracker.find_indent("      b").is_err());
    assert_eq!(tracker.find_indent_lenient("      b"), 1);
}

#[test]
fn blank_lines_are_level_zero() {
    let mut tracker = IndentTracker::new();
    assert_eq!(tracker.find_indent("   ").unwrap(), 0);
    assert_eq!(tracker.unit(), None);
}

#[test]
fn one_level_steps_never_fail() {
    let mut tracker = IndentTracker::new();
    assert_eq!(tracker.handle_indent(0).unwrap(), 0);
    assert_eq!(tracker.handle_indent(1).unwrap(), 0);
    assert_eq!(tracker.handle_indent(2).unwrap(), 0);
    assert_eq!(tracker.handle_indent(2).unwrap(), 1);
    assert_eq!(tracker.handle_indent(0).unwrap(), 3);
}

#[test]
fn jumping_two_levels_fails() {
    let mut tracker = IndentTracker::new();
    tracker.handle_indent(0).unwrap();
    assert_eq!(
        tracker.handle_indent(2),
        Err(SyntaxError::IncorrectIndentation)
    );
}

#[test]
fn nothing_closes_before_the_first_block() {
    let mut tracker = IndentTracker::new();
    assert!(!tracker.has_opened());
    assert_eq!(tracker.handle_indent(0).unwrap(), 0);
    assert!(tracker.has_opened());
    tracker.reset();
    assert_eq!(tracker.handle_indent(0).unwrap(), 0);
}

#[test]
fn retreat_closes_deeper_levels_only() {
    let mut tracker = IndentTracker::new();
    tracker.handle_indent(0).unwrap();
    tracker.handle_indent(1).unwrap();
    tracker.handle_indent(2).unwrap();
    assert_eq!(tracker.retreat(0), 2);
    assert_eq!(tracker.level(), 0);
    assert_eq!(tracker.retreat(1), 0);
}

#[test]
fn dedent_strips_whole_units() {
    let mut tracker = IndentTracker::new();
    tracker.find_indent("\tx").unwrap();
    assert_eq!(tracker.dedent("\t\t\tcode", 2), "\tcode");
    assert_eq!(tracker.dedent("code", 2), "code");
}

#[test]
fn continuation_lines_join_with_one_space() {
    let lines = logical_lines("div(a=\"1\",\\\n\t\tb=\"2\")\np");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].text, "div(a=\"1\", b=\"2\")");
    assert_eq!(lines[0].number, 2);
    assert_eq!(lines[1].number, 3);
}

#[test]
fn split_units_counts_whole_units() {
    let mut tracker = IndentTracker::new();
    assert_eq!(tracker.split_units("  a"), (0, "  a"));
    tracker.adopt_unit("  ");
    tracker.adopt_unit("\t");
    assert_eq!(tracker.unit(), Some("  "));
    assert_eq!(tracker.split_units("     a"), (2, " a"));
    assert_eq!(tracker.split_units("b"), (0, "b"));
}
