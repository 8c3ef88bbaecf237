//! Queries run end to end against parsed trees.

use arbor::query::queries;
use arbor::{builtin_grammar, cache, MatchError, Parser, Query, QueryCursor, QueryErrorKind};

const SOURCE: &str = "\
import os

class Greeter:
    def greet(self, name):
        print(name)

def fibonacci(n):
    if n < 2:
        return n
    return fibonacci(n - 1) + fibonacci(n - 2)
";

#[test]
fn function_name_capture() {
    let python = builtin_grammar("python").unwrap();
    let source = "def fibonacci(n): pass";
    let tree = Parser::new(python.clone()).parse(source.as_bytes()).unwrap();
    let query = Query::new(&python, "(function_definition name: (identifier) @fn)").unwrap();

    let captures: Vec<_> = query
        .captures(&tree, source.as_bytes())
        .map(|c| (c.name(&query).to_string(), c.node.text(source).to_string()))
        .collect();
    assert_eq!(captures, [("fn".to_string(), "fibonacci".to_string())]);
}

#[test]
fn matches_restart_from_a_clone() {
    let python = builtin_grammar("python").unwrap();
    let tree = Parser::new(python.clone()).parse(SOURCE.as_bytes()).unwrap();
    let query = Query::new(&python, "(call function: (identifier) @callee)").unwrap();

    let mut matches = query.matches(&tree, SOURCE.as_bytes());
    let first = matches.next().unwrap();
    let resumed = matches.clone();
    let rest: Vec<_> = matches.map(|m| m.pattern_index).collect();
    let rest_again: Vec<_> = resumed.map(|m| m.pattern_index).collect();
    assert_eq!(rest, rest_again);
    assert_eq!(first.pattern_index, 0);
    // print, fibonacci, fibonacci
    assert_eq!(rest.len(), 2);
}

#[test]
fn prebuilt_queries_find_definitions() {
    let python = builtin_grammar("python").unwrap();
    let tree = Parser::new(python.clone()).parse(SOURCE.as_bytes()).unwrap();

    let query = Query::new(&python, &queries::function_by_name("fibonacci")).unwrap();
    let found = query.find_unique(&tree, SOURCE.as_bytes()).unwrap();
    let node = found.capture(&query, "function").unwrap();
    assert!(node.text(SOURCE).starts_with("def fibonacci(n):"));

    let query = Query::new(&python, &queries::class_by_name("Greeter")).unwrap();
    assert!(query.find_unique(&tree, SOURCE.as_bytes()).is_ok());

    let query = Query::new(&python, &queries::function_by_name("missing")).unwrap();
    assert_eq!(
        query.find_unique(&tree, SOURCE.as_bytes()).unwrap_err(),
        MatchError::NoMatch
    );

    let query = Query::new(&python, &queries::call_by_name(true, "fibonacci")).unwrap();
    assert_eq!(
        query.find_unique(&tree, SOURCE.as_bytes()).unwrap_err(),
        MatchError::AmbiguousMatch { count: 2 }
    );
}

#[test]
fn cursor_limits_matches_to_a_range() {
    let python = builtin_grammar("python").unwrap();
    let tree = Parser::new(python.clone()).parse(SOURCE.as_bytes()).unwrap();
    let query = Query::new(&python, "(identifier) @id").unwrap();

    let start = SOURCE.find("def fibonacci").unwrap();
    let end = start + "def fibonacci".len();
    let mut cursor = QueryCursor::new();
    cursor.set_byte_range(start..end);
    let names: Vec<_> = cursor
        .captures(&query, &tree, SOURCE.as_bytes())
        .map(|c| c.node.text(SOURCE))
        .collect();
    assert_eq!(names, ["fibonacci"]);
}

#[test]
fn compile_errors_point_at_the_problem() {
    let python = builtin_grammar("python").unwrap();
    let err = Query::new(&python, "(function_definition nam: (identifier))").unwrap_err();
    assert_eq!(err.kind, QueryErrorKind::Field);
    assert_eq!(err.offset, 21);
    assert_eq!(err.suggestion.as_deref(), Some("name"));

    let err = Query::new(&python, "(clas_definition)").unwrap_err();
    assert_eq!(err.kind, QueryErrorKind::NodeKind);
    assert_eq!(err.suggestion.as_deref(), Some("class_definition"));
}

#[test]
fn cached_queries_are_shared() {
    let javascript = builtin_grammar("javascript").unwrap();
    let source = "function add(a, b) { return a + b; }";
    let tree = Parser::new(javascript.clone())
        .parse(source.as_bytes())
        .unwrap();
    let pattern = queries::function_declaration_by_name("add");
    let query = cache::get_or_compile(&javascript, &pattern).unwrap();
    let again = cache::get_or_compile(&javascript, &pattern).unwrap();
    assert_eq!(query.pattern_count(), again.pattern_count());
    assert!(query.find_unique(&tree, source.as_bytes()).is_ok());
}

/// Error flag and text of the one definition named `name` in `source`.
fn definition(language: &str, source: &str, name: &str) -> Option<(bool, String)> {
    let grammar = builtin_grammar(language).unwrap();
    let tree = Parser::new(grammar.clone()).parse(source.as_bytes()).unwrap();
    assert_eq!(tree.root().byte_range(), 0..source.len());
    let pattern = match language {
        "python" => queries::function_by_name(name),
        _ => queries::function_declaration_by_name(name),
    };
    let query = Query::new(&grammar, &pattern).unwrap();
    let found = query.find_unique(&tree, source.as_bytes()).ok()?;
    let node = found.capture(&query, "function").unwrap();
    Some((node.has_error(), node.text(source).to_string()))
}

#[test]
fn definition_after_a_broken_body_is_found() {
    let source = "def ok0():\n    x = )\ndef last():\n    pass\n";
    assert!(definition("python", source, "ok0").is_some());
    assert_eq!(
        definition("python", source, "last"),
        Some((false, "def last():\n    pass".to_string()))
    );
}

#[test]
fn definition_after_unclosed_parameters_is_found() {
    let source = "def a(:\n    pass\ndef last():\n    pass\n";
    assert_eq!(
        definition("python", source, "last"),
        Some((false, "def last():\n    pass".to_string()))
    );
}

#[test]
fn javascript_declaration_after_a_broken_one_is_found() {
    let source = "function a() { let x = ; }\nfunction last() { return 1; }";
    assert_eq!(
        definition("javascript", source, "last"),
        Some((false, "function last() { return 1; }".to_string()))
    );

    let source = "function a( { return 1; }\nfunction b() { return 2; }\nfunction last() {}";
    let (has_error, _) = definition("javascript", source, "last").unwrap();
    assert!(!has_error);
}
