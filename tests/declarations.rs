use pretty_assertions::assert_eq;
use sharpling::{
    ast::StmtKind,
    declarations::{extract, extract_fragment, Entry},
    DiagnosticKind, SourceSpan,
};

const PROGRAM: &str = r#"
using System;

namespace Shop
{
    public class Program
    {
        static double rate = 0.2;

        public static void Main(string[] args)
        {
            Console.WriteLine(Total(10));
        }

        static double Total(double net, double extra = 0) => net * (1 + rate) + extra;

        public string Describe() { return "instance"; }

        public Program() { }

        public int Count { get; set; }
    }
}
"#;

#[test]
fn collects_static_functions_and_main() {
    let program = extract(PROGRAM).expect("extracts");
    let names: Vec<&str> = program.functions.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["Main", "Total"]);
    assert!(matches!(program.entry, Some(Entry::Main(_))));
}

#[test]
fn loose_fields_become_initializers() {
    let program = extract(PROGRAM).expect("extracts");
    assert_eq!(program.initializers.len(), 1);
    assert!(matches!(
        program.initializers[0].kind,
        StmtKind::Declare { .. }
    ));
}

#[test]
fn parameters_keep_types_and_defaults() {
    let program = extract(PROGRAM).expect("extracts");
    let main = &program.functions["Main"];
    assert_eq!(main.params.len(), 1);
    assert_eq!(main.params[0].declared_type.name, "string");
    assert_eq!(main.params[0].declared_type.rank, 1);
    assert!(main.returns_void());

    let total = &program.functions["Total"];
    let params: Vec<&str> = total.params.iter().map(|param| param.name.as_str()).collect();
    assert_eq!(params, vec!["net", "extra"]);
    assert!(total.params[0].default.is_none());
    assert!(total.params[1].default.is_some());
    assert!(matches!(total.body[0].kind, StmtKind::Return(Some(_))));
}

#[test]
fn top_level_statements_are_the_entry_without_main() {
    let program = extract(
        "int x = 1;\nstatic int Twice(int n) { return n * 2; }\nx = Twice(x);\nConsole.WriteLine(x);\n",
    )
    .expect("extracts");
    assert_eq!(program.functions.len(), 1);
    match program.entry {
        Some(Entry::Statements(stmts)) => assert_eq!(stmts.len(), 3),
        other => panic!("expected top-level statements, got {other:?}"),
    }
    assert!(program.initializers.is_empty());
}

#[test]
fn nothing_to_run_is_a_missing_entry_point() {
    let err = extract("class Empty { static void Helper() { } }").expect_err("no entry");
    assert_eq!(err.kind, DiagnosticKind::MissingEntryPoint);
}

#[test]
fn unbalanced_source_is_rejected() {
    let err = extract("static void Main() { if (x { }").expect_err("unbalanced");
    assert_eq!(err.kind, DiagnosticKind::BracketMismatch);
}

#[test]
fn fragments_may_define_functions_only() {
    let source = "ignored; static void Greet() { Console.WriteLine(\"hi\"); }";
    let start = source.find("static").expect("offset");
    let program =
        extract_fragment(source, SourceSpan::new(start, source.len())).expect("extracts");
    assert!(program.entry.is_none());
    let signature = source.find("void").expect("offset");
    assert_eq!(program.functions["Greet"].span.start, signature);
}
