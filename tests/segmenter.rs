use pretty_assertions::assert_eq;
use sharpling::{
    segmenter::{check_balance, is_incomplete, split, split_at, split_top_level},
    DiagnosticKind, SourceSpan,
};

fn texts(block: &str) -> Vec<String> {
    split(block).into_iter().map(|unit| unit.text).collect()
}

#[test]
fn splits_on_top_level_semicolons() {
    assert_eq!(
        texts("int a = 1; int b = 2;"),
        vec!["int a = 1;", "int b = 2;"]
    );
}

#[test]
fn if_else_chain_is_one_unit() {
    assert_eq!(
        texts("if (x) { a(); } else { b(); } c();"),
        vec!["if (x) { a(); } else { b(); }", "c();"]
    );
}

#[test]
fn braceless_else_stays_attached() {
    assert_eq!(
        texts("if (x) a(); else b();\nc();"),
        vec!["if (x) a(); else b();", "c();"]
    );
}

#[test]
fn do_while_is_one_unit() {
    assert_eq!(
        texts("do { x++; } while (x < 3); y();"),
        vec!["do { x++; } while (x < 3);", "y();"]
    );
}

#[test]
fn for_header_semicolons_do_not_split() {
    assert_eq!(
        texts("for (int i = 0; i < 3; i++) { f(i); } done();"),
        vec!["for (int i = 0; i < 3; i++) { f(i); }", "done();"]
    );
}

#[test]
fn literals_and_comments_are_opaque() {
    assert_eq!(
        texts("Console.WriteLine(\"a;b}\"); // c; d\nx = 1;"),
        vec!["Console.WriteLine(\"a;b}\");", "x = 1;"]
    );
}

#[test]
fn array_initializer_keeps_its_semicolon() {
    assert_eq!(
        texts("int[] a = { 1, 2 }; b();"),
        vec!["int[] a = { 1, 2 };", "b();"]
    );
}

#[test]
fn spans_are_shifted_by_base() {
    let units = split_at("  a();", 100);
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].span, SourceSpan::new(102, 106));
}

#[test]
fn top_level_split_ignores_nested_separators() {
    let text = "a, f(b, c), \"d,e\"";
    let pieces: Vec<&str> = split_top_level(text, b',')
        .into_iter()
        .map(|span| text[span.start..span.end].trim())
        .collect();
    assert_eq!(pieces, vec!["a", "f(b, c)", "\"d,e\""]);
}

#[test]
fn balance_check_reports_mismatches() {
    assert!(check_balance("if (x) { a[0] = \"}\"; }").is_ok());
    let err = check_balance("{ ( }").expect_err("mismatched");
    assert_eq!(err.kind, DiagnosticKind::BracketMismatch);
    let err = check_balance("f(").expect_err("unclosed");
    assert_eq!(err.kind, DiagnosticKind::BracketMismatch);
    assert_eq!(err.span, Some(SourceSpan::new(1, 2)));
}

#[test]
fn incomplete_input_detection() {
    assert!(is_incomplete("static void Main() {"));
    assert!(!is_incomplete("a();"));
    assert!(!is_incomplete("}"));
    assert!(!is_incomplete("s = \"{\";"));
}
