use pyml::SyntaxError;
use pyml::syntax::{
    expand_ranges, find_unquoted, has_unquoted_operator, normalize_attribute, parse_definition,
    resolve_indexing, split_arguments,
};

#[test]
fn range_expansion() {
    assert_eq!(expand_ranges("[0:6]").unwrap(), "[0,1,2,3,4,5,6]");
    assert_eq!(expand_ranges("[1:8:2]").unwrap(), "[1,3,5,7]");
    assert_eq!(expand_ranges("[8:1:-1]").unwrap(), "[8,7,6,5,4,3,2,1]");
    assert_eq!(expand_ranges("[8:1]").unwrap(), "[]");
    assert_eq!(expand_ranges("[1:-1:1]").unwrap(), "[]");
}

#[test]
fn range_expansion_keeps_surrounding_text() {
    assert_eq!(
        expand_ranges("for $i in [1:3]:").unwrap(),
        "for $i in [1,2,3]:"
    );
    assert_eq!(expand_ranges("p(\"no ranges here\")").unwrap(), "p(\"no ranges here\")");
}

#[test]
fn ranges_at_the_edge_of_i64_stop_without_overflowing() {
    assert_eq!(
        expand_ranges("[9223372036854775806:9223372036854775807]").unwrap(),
        "[9223372036854775806,9223372036854775807]"
    );
    assert_eq!(
        expand_ranges("[-9223372036854775807:-9223372036854775808:-1]").unwrap(),
        "[-9223372036854775807,-9223372036854775808]"
    );
    assert_eq!(
        expand_ranges("[9223372036854775800:9223372036854775807:5]").unwrap(),
        "[9223372036854775800,9223372036854775805]"
    );
}

#[test]
fn range_with_zero_step_is_rejected() {
    assert!(matches!(
        expand_ranges("[1:5:0]"),
        Err(SyntaxError::InvalidRange(_))
    ));
}

#[test]
fn indexing_picks_elements() {
    assert_eq!(resolve_indexing("[1,2,3][1]").unwrap(), "2");
    assert_eq!(resolve_indexing("p([\"a\", \"b\"][0])").unwrap(), "p(\"a\")");
    assert_eq!(resolve_indexing("[[1,2],[3,4]][1][0]").unwrap(), "3");
    assert_eq!(resolve_indexing("[5,6,7][-1]").unwrap(), "7");
}

#[test]
fn indexing_respects_quoted_commas() {
    assert_eq!(
        resolve_indexing("[\"a, b\", \"c\"][0]").unwrap(),
        "\"a, b\""
    );
}

#[test]
fn brackets_inside_quotes_are_not_indexed() {
    assert_eq!(resolve_indexing("p(\"[1][0]\")").unwrap(), "p(\"[1][0]\")");
    assert_eq!(
        resolve_indexing("p('[a][b]', [3, 4][1])").unwrap(),
        "p('[a][b]', 4)"
    );
}

#[test]
fn indexing_errors() {
    assert_eq!(
        resolve_indexing("[1,2][x]"),
        Err(SyntaxError::InvalidIndex("x".to_string()))
    );
    assert_eq!(resolve_indexing("[1,2][5]"), Err(SyntaxError::MalformedIndex));
    assert_eq!(resolve_indexing("1,2][0]"), Err(SyntaxError::MalformedIndex));
}

#[test]
fn arguments_keep_strings_and_lists_whole() {
    assert_eq!(
        split_arguments("\"a, b\", [1, 2], c").unwrap(),
        vec!["\"a, b\"", "[1, 2]", "c"]
    );
    assert_eq!(split_arguments("").unwrap(), Vec::<String>::new());
    assert_eq!(
        split_arguments("script(type=\"x\", id=\"y\")").unwrap(),
        vec!["script(type=\"x\", id=\"y\")"]
    );
    assert!(split_arguments("[1, 2").is_err());
}

#[test]
fn attribute_normalization() {
    assert_eq!(normalize_attribute(".big"), "class=\"big\"");
    assert_eq!(normalize_attribute("width=100"), "width=\"100\"");
    assert_eq!(normalize_attribute("'z-index'=3"), "z-index=\"3\"");
    assert_eq!(normalize_attribute("href=\"/\""), "href=\"/\"");
    assert_eq!(normalize_attribute(".5"), ".5");
}

#[test]
fn definitions() {
    assert_eq!(
        parse_definition("div(.box, id=\"main\"):").unwrap(),
        (
            "div".to_string(),
            vec!["class=\"box\"".to_string(), "id=\"main\"".to_string()]
        )
    );
    assert_eq!(parse_definition("body:").unwrap(), ("body".to_string(), vec![]));
    assert_eq!(parse_definition("br()").unwrap(), ("br".to_string(), vec![]));
    assert!(matches!(
        parse_definition("div(a"),
        Err(SyntaxError::MissingParenthesis(_))
    ));
}

#[test]
fn unquoted_search() {
    assert_eq!(find_unquoted("\"a := b\" := c", ":="), Some(9));
    assert_eq!(find_unquoted("'x+=1'", "+="), None);
    assert!(has_unquoted_operator("5 + 3"));
    assert!(!has_unquoted_operator("\"a-b\""));
    assert!(!has_unquoted_operator("\"it\\\"s-b\""));
}
