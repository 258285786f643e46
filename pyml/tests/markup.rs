use pyml::{CloseKind, MarkupRules, SyntaxError, end_tag, start_tag};

const RULES: &str = "\
# test rules
<.> id class
\t<div>
\t<a> href, target
\t<br>-
\t<script>+ src \\
\t\ttype
<custom> *
";

#[test]
fn nested_rules_inherit_attributes() {
    let rules = MarkupRules::parse(RULES).unwrap();
    let a = rules.lookup("a").unwrap();
    assert!(a.allows("href"));
    assert!(a.allows("class"));
    assert!(!a.allows("src"));

    let div = rules.lookup("div").unwrap();
    assert!(div.allows("id"));
    assert!(!div.allows("href"));
}

#[test]
fn close_kind_markers() {
    let rules = MarkupRules::parse(RULES).unwrap();
    assert_eq!(rules.close_kind("div"), CloseKind::Normal);
    assert_eq!(rules.close_kind("br"), CloseKind::NeverSelfClose);
    assert_eq!(rules.close_kind("script"), CloseKind::AlwaysSeparate);
    assert!(rules.lookup("script").unwrap().allows("type"));
}

#[test]
fn star_accepts_any_attribute() {
    let rules = MarkupRules::parse(RULES).unwrap();
    assert_eq!(rules.lookup("custom").unwrap().attributes, None);
    assert!(rules.lookup("custom").unwrap().allows("anything"));
}

#[test]
fn meta_rule_is_not_a_tag() {
    let rules = MarkupRules::parse(RULES).unwrap();
    assert!(!rules.defines("."));
    assert!(rules.lookup("span").is_none());
}

#[test]
fn wildcard_entry_catches_unknown_tags() {
    let rules = MarkupRules::permissive();
    assert!(rules.lookup("my-widget").is_some());
    assert!(!rules.defines("my-widget"));
}

#[test]
fn repeated_entries_extend() {
    let rules = MarkupRules::parse("<p> id\n<p> lang\n").unwrap();
    let p = rules.lookup("p").unwrap();
    assert!(p.allows("id") && p.allows("lang"));
}

#[test]
fn malformed_rule_reports_its_line() {
    let err = MarkupRules::parse("<p> id\nspan\n").unwrap_err();
    assert!(matches!(err, SyntaxError::Rule { line: 2, .. }));
}

#[test]
fn builtin_html_rules() {
    let html = MarkupRules::builtin("html").unwrap();
    assert_eq!(html.close_kind("br"), CloseKind::NeverSelfClose);
    assert_eq!(html.close_kind("script"), CloseKind::AlwaysSeparate);
    assert_eq!(html.close_kind("p"), CloseKind::Normal);
    let a = html.lookup("a").unwrap();
    assert!(a.allows("href"));
    assert!(a.allows("data-id"));
    assert!(a.allows("onclick"));
    assert!(!a.allows("colspan"));
    assert!(html.lookup("blink").is_none());
}

#[test]
fn tag_rendering() {
    assert_eq!(start_tag("br", &[]), "<br>\n");
    let attributes = vec!["class=\"x\"".to_string(), "hidden".to_string()];
    assert_eq!(start_tag("div", &attributes), "<div class=\"x\" hidden>\n");
    assert_eq!(end_tag("div"), "</div>\n");
}
