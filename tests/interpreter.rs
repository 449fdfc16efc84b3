use pretty_assertions::assert_eq;
use sharpling::{
    BufferConsole, CallOutcome, DiagnosticKind, Interpreter, RunConfig, RunOutcome, ValueKind,
};

fn run_with_input(source: &str, input: &[&str]) -> (Vec<String>, RunOutcome) {
    let console = BufferConsole::with_input(input.iter().copied());
    let mut interpreter = Interpreter::new(console);
    let outcome = interpreter.run(source).expect("program should load");
    let lines = interpreter
        .console()
        .lines()
        .into_iter()
        .map(String::from)
        .collect();
    (lines, outcome)
}

fn run(source: &str) -> Vec<String> {
    let (lines, outcome) = run_with_input(source, &[]);
    assert!(outcome.is_completed(), "run aborted: {outcome:?}");
    lines
}

#[test]
fn for_loop_counts_up() {
    let lines = run(r#"
        class Program
        {
            static void Main()
            {
                for (int i = 1; i <= 5; i++)
                {
                    Console.WriteLine($"Number: {i}");
                }
            }
        }
    "#);
    assert_eq!(
        lines,
        vec!["Number: 1", "Number: 2", "Number: 3", "Number: 4", "Number: 5"]
    );
}

#[test]
fn while_loop_counts_down() {
    let lines = run(r#"
        int counter = 5;
        while (counter > 0)
        {
            Console.WriteLine(counter);
            counter--;
        }
    "#);
    assert_eq!(lines, vec!["5", "4", "3", "2", "1"]);
}

#[test]
fn while_with_false_condition_never_runs() {
    let lines = run(r#"
        int n = 0;
        while (n > 0) { Console.WriteLine("unreachable"); }
        Console.WriteLine("end");
    "#);
    assert_eq!(lines, vec!["end"]);
}

#[test]
fn do_while_runs_body_once() {
    let lines = run(r#"
        int n = 10;
        do { Console.WriteLine(n); n++; } while (n < 5);
    "#);
    assert_eq!(lines, vec!["10"]);
}

#[test]
fn break_and_continue_steer_loops() {
    let lines = run(r#"
        for (int i = 0; i < 10; i++)
        {
            if (i == 2) continue;
            if (i == 5) break;
            Console.Write(i);
        }
        Console.WriteLine();
    "#);
    assert_eq!(lines, vec!["0134"]);
}

#[test]
fn foreach_walks_strings_and_arrays() {
    let lines = run(r#"
        foreach (char ch in "abc") Console.Write(char.ToUpper(ch));
        Console.WriteLine();
        int[] values = { 3, 4, 5 };
        int sum = 0;
        foreach (int v in values) { sum += v; }
        Console.WriteLine(sum);
    "#);
    assert_eq!(lines, vec!["ABC", "12"]);
}

#[test]
fn recursive_factorial_through_declarations() {
    let lines = run(r#"
        static long Factorial(int n)
        {
            if (n <= 1) return 1;
            long rest = Factorial(n - 1);
            return n * rest;
        }

        long result = Factorial(5);
        Console.WriteLine($"5! = {result}");
    "#);
    assert_eq!(lines, vec!["5! = 120"]);
}

#[test]
fn demo_program_reads_console_input() {
    let (lines, outcome) = run_with_input(include_str!("../demos/loops.cs"), &["3", "0", "5"]);
    assert!(outcome.is_completed());
    assert!(lines.contains(&"The square of 3 is 9".to_string()), "{lines:?}");
    assert!(lines.contains(&"The factorial of 5 is 120".to_string()), "{lines:?}");
    assert_eq!(lines.last().map(String::as_str), Some("The factorial of 5 is 120"));
}

#[test]
fn main_runs_after_field_initializers() {
    let lines = run(r#"
        using System;

        namespace Demo
        {
            class Program
            {
                static int counter = 3;

                static void Main(string[] args)
                {
                    Console.WriteLine($"counter = {counter}");
                    Helper();
                }

                static void Helper() => Console.WriteLine("helper ran");

                public void Ignored() { Console.WriteLine("never"); }
            }
        }
    "#);
    assert_eq!(lines, vec!["counter = 3", "helper ran"]);
}

#[test]
fn expression_bodies_and_default_parameters() {
    let lines = run(r#"
        static int Square(int x) => x * x;
        static int Add(int a, int b = 10) { return a + b; }

        int s = Square(7);
        int r = Add(5);
        int t = Add(5, 1);
        Console.WriteLine($"{s} {r} {t}");
    "#);
    assert_eq!(lines, vec!["49 15 6"]);
}

#[test]
fn switch_selects_case_and_default() {
    let lines = run(r#"
        static string Grade(int score)
        {
            switch (score / 10)
            {
                case 10:
                case 9:
                    return "A";
                case 8:
                    return "B";
                default:
                    return "F";
            }
        }

        string a = Grade(95);
        string b = Grade(81);
        string c = Grade(12);
        Console.WriteLine(a + b + c);
    "#);
    assert_eq!(lines, vec!["ABF"]);
}

#[test]
fn arithmetic_keeps_integer_and_double_apart() {
    let lines = run(r#"
        Console.WriteLine(7 / 2);
        Console.WriteLine(7 / 2.0);
        Console.WriteLine(7 % 3);
        double d = 3;
        Console.WriteLine(d / 2);
        Console.WriteLine(3 > 2);
    "#);
    assert_eq!(lines, vec!["3", "3.5", "1", "1.5", "True"]);
}

#[test]
fn interpolation_and_composite_formatting() {
    let lines = run(r#"
        double price = 3.5;
        int qty = 4;
        string tag = "ab";
        Console.WriteLine($"Total: {price * qty:F2}");
        Console.WriteLine($"[{qty,3}|{tag,-4}]");
        Console.WriteLine("{0} + {1} = {2}", 1, 2, 1 + 2);
        Console.WriteLine($"{{literal}}");
    "#);
    assert_eq!(
        lines,
        vec!["Total: 14.00", "[  4|ab  ]", "1 + 2 = 3", "{literal}"]
    );
}

#[test]
fn casts_conditionals_and_coalesce() {
    let lines = run(r#"
        double d = 7.9;
        int i = (int)d;
        char c = (char)65;
        string name = null;
        Console.WriteLine(i);
        Console.WriteLine(c);
        Console.WriteLine(name ?? "anon");
        Console.WriteLine(i > 3 ? "big" : "small");
    "#);
    assert_eq!(lines, vec!["7", "A", "anon", "big"]);
}

#[test]
fn runtime_errors_are_reported_and_execution_continues() {
    let lines = run("Console.WriteLine(missing);\nConsole.WriteLine(\"still running\");\n");
    assert_eq!(
        lines,
        vec![
            "[UnboundVariable] the name `missing` does not exist in the current context (line 1)",
            "still running",
        ]
    );
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let lines = run("int z = 0;\nConsole.WriteLine(1 / z);\n");
    assert_eq!(
        lines,
        vec!["[RuntimeEvaluationError] Attempted to divide by zero. (line 2)"]
    );
}

#[test]
fn conditions_must_be_boolean() {
    let lines = run("int n = 1;\nif (n) { Console.WriteLine(\"yes\"); }\n");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("[RuntimeEvaluationError] cannot implicitly convert type `int` to `bool`"));
}

#[test]
fn declared_types_constrain_assignments() {
    let lines = run(r#"
        int n = 2.5;
        const int Max = 3;
        Max = 4;
        Console.WriteLine(Max);
    "#);
    assert_eq!(lines.len(), 3, "{lines:?}");
    assert!(lines[0].contains("cannot implicitly convert type `double` to `int`"));
    assert!(lines[1].contains("cannot assign to constant `Max`"));
    assert_eq!(lines[2], "3");
}

#[test]
fn block_variables_do_not_leak() {
    let lines = run(r#"
        if (true) { int inner = 1; }
        Console.WriteLine(inner);
    "#);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("[UnboundVariable] the name `inner`"));
}

#[test]
fn arrays_are_indexed_and_bounds_checked() {
    let lines = run(r#"
        int[] values = new int[3];
        values[1] = 5;
        values[2] += 2;
        Console.WriteLine(string.Join("-", values));
        values[3] = 1;
        Console.WriteLine(values.Length);
    "#);
    assert_eq!(lines.len(), 3, "{lines:?}");
    assert_eq!(lines[0], "0-5-2");
    assert!(lines[1].contains("Index was outside the bounds of the array."));
    assert_eq!(lines[2], "3");
}

#[test]
fn nested_user_calls_are_unsupported() {
    let lines = run(r#"
        static int Twice(int n) { return n * 2; }
        Console.WriteLine(Twice(3) + 1);
        int x = Twice(4);
        Console.WriteLine(x);
    "#);
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(lines[0].starts_with("[UnsupportedConstruct] call to `Twice`"));
    assert_eq!(lines[1], "8");
}

#[test]
fn malformed_for_header_aborts_but_keeps_earlier_output() {
    let (lines, outcome) = run_with_input(
        "Console.WriteLine(\"before\");\nfor (int i = 0; i < 3) { Console.WriteLine(i); }\nConsole.WriteLine(\"after\");\n",
        &[],
    );
    match outcome {
        RunOutcome::Aborted(diag) => assert_eq!(diag.kind, DiagnosticKind::Syntax),
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert_eq!(lines[0], "before");
    assert!(lines[1].starts_with("[SyntaxError]"));
    assert!(lines[1].ends_with("(line 2)"));
}

#[test]
fn call_depth_is_limited_by_config() {
    let console = BufferConsole::new();
    let mut interpreter =
        Interpreter::with_config(console, RunConfig::default().with_max_call_depth(8));
    let outcome = interpreter
        .run("static void Dive(int n) { Dive(n + 1); }\nDive(0);\nConsole.WriteLine(\"done\");\n")
        .expect("program should load");
    assert!(outcome.is_completed());
    let lines = interpreter.console().lines();
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(lines[0].contains("call depth limit of 8 exceeded"));
    assert_eq!(lines[1], "done");
}

#[test]
fn missing_entry_point_is_rejected_before_running() {
    let mut interpreter = Interpreter::new(BufferConsole::new());
    let err = interpreter
        .run("static void Helper() { Console.WriteLine(\"x\"); }")
        .expect_err("no entry point");
    assert_eq!(
        err.diagnostic().map(|diag| diag.kind),
        Some(DiagnosticKind::MissingEntryPoint)
    );
    assert_eq!(interpreter.console().output(), "");
}

#[test]
fn bracket_mismatch_is_rejected_before_running() {
    let mut interpreter = Interpreter::new(BufferConsole::new());
    let err = interpreter
        .run("Console.WriteLine(\"hi\";\nConsole.WriteLine(\"ok\");")
        .expect_err("unbalanced");
    assert_eq!(
        err.diagnostic().map(|diag| diag.kind),
        Some(DiagnosticKind::BracketMismatch)
    );
    assert_eq!(interpreter.console().output(), "");
}

#[test]
fn running_twice_gives_identical_output() {
    let source = r#"
        int total = 0;
        for (int i = 1; i <= 3; i++) { total += i; }
        Console.WriteLine(total);
    "#;
    let mut interpreter = Interpreter::new(BufferConsole::new());
    interpreter.run(source).expect("first run");
    let first = interpreter.console_mut().take_output();
    interpreter.run(source).expect("second run");
    let second = interpreter.console_mut().take_output();
    assert_eq!(first, "6\n");
    assert_eq!(first, second);
}

#[test]
fn void_and_null_returns_are_distinguished() {
    let mut interpreter = Interpreter::new(BufferConsole::new());
    interpreter
        .execute_snippet(
            r#"
            static void Nothing() { return; }
            static string Maybe() { return null; }
            static void Falls() { int x = 1; }
            "#,
        )
        .expect("snippet loads");

    assert!(matches!(
        interpreter.call_function("Nothing", Vec::new()).expect("call"),
        CallOutcome::ReturnedVoid
    ));
    match interpreter.call_function("Maybe", Vec::new()).expect("call") {
        CallOutcome::Returned(value) => assert!(value.is_null()),
        other => panic!("expected a returned value, got {other:?}"),
    }
    assert!(matches!(
        interpreter.call_function("Falls", Vec::new()).expect("call"),
        CallOutcome::Completed
    ));
}

#[test]
fn snippets_share_session_state() {
    let mut interpreter = Interpreter::new(BufferConsole::new());
    interpreter.execute_snippet("int x = 40;").expect("declare");
    interpreter.execute_snippet("x += 2;").expect("assign");
    let value = interpreter.evaluate_source("x").expect("evaluate");
    assert!(matches!(value.kind(), ValueKind::Int(42)));
    assert!(interpreter.global("x").is_some());

    interpreter.reset();
    assert!(interpreter.global("x").is_none());
}

#[test]
fn empty_for_range_prints_nothing() {
    let lines = run(r#"
        for (int i = 5; i <= 1; i++)
        {
            Console.WriteLine($"Number: {i}");
        }
        Console.WriteLine("done");
    "#);
    assert_eq!(lines, vec!["done"]);
}

#[test]
fn countdown_with_accented_text() {
    let lines = run(r#"
        int contador = 5;
        while (contador > 0)
        {
            Console.WriteLine($"Número: {contador}");
            contador--;
        }
    "#);
    assert_eq!(
        lines,
        vec!["Número: 5", "Número: 4", "Número: 3", "Número: 2", "Número: 1"]
    );
}

const NESTED_DEPTH: &str = r#"
    static int Depth(int n)
    {
        int r = 0;
        if (n > 0)
        {
            for (int i = 0; i < 1; i++)
            {
                while (true)
                {
                    switch (1)
                    {
                        case 1:
                            r = Depth(n - 1);
                            break;
                    }
                    break;
                }
            }
        }
        return r + 1;
    }
"#;

#[test]
fn deep_recursion_within_default_limit_completes() {
    let source = format!("{NESTED_DEPTH}\nint total = Depth(250);\nConsole.WriteLine(total);");
    assert_eq!(run(&source), vec!["251"]);
}

#[test]
fn default_call_depth_limit_is_reported() {
    let source = format!("{NESTED_DEPTH}\nint total = Depth(400);\nConsole.WriteLine(total);");
    let lines = run(&source);
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(
        lines[0].starts_with("[RuntimeEvaluationError] call depth limit of 256 exceeded"),
        "{lines:?}"
    );
    assert_eq!(lines[1], "256");
}

#[test]
fn functions_share_the_callers_variables() {
    let lines = run(r#"
        static void Show() { Console.WriteLine(x); }
        static void Bump() { x = x + 1; int scratch = 9; }
        static void Shadow(int x) { x = 100; }
        static void Main()
        {
            int x = 5;
            Show();
            Bump();
            Shadow(1);
            Console.WriteLine(x);
            Console.WriteLine(scratch);
        }
    "#);
    assert_eq!(lines.len(), 3, "{lines:?}");
    assert_eq!(lines[0], "5");
    assert_eq!(lines[1], "6");
    assert!(lines[2].starts_with("[UnboundVariable]"), "{lines:?}");
}

#[test]
fn using_static_brings_console_and_math_members_into_scope() {
    let (lines, outcome) = run_with_input(
        r#"
        using static System.Console;
        using static System.Math;

        WriteLine("name?");
        string name = ReadLine();
        double root = Sqrt(16);
        WriteLine($"{name} {root}");
        Console.WriteLine(Max(2, 7) + 1);
    "#,
        &["Ada"],
    );
    assert!(outcome.is_completed());
    assert_eq!(lines, vec!["name?", "Ada 4", "8"]);
}

#[test]
fn bare_read_line_discards_input() {
    let (lines, outcome) = run_with_input(
        r#"
        Console.ReadLine();
        string name = Console.ReadLine();
        string other;
        other = Console.ReadLine();
        Console.WriteLine($"{name}/{other}");
    "#,
        &["skipped", "kept", "also"],
    );
    assert!(outcome.is_completed());
    assert_eq!(lines, vec!["kept/also"]);
}

#[test]
fn oversized_interpolation_alignment_is_an_error() {
    let lines = run(r#"
        Console.WriteLine($"[{1,70000}]");
        Console.WriteLine("after");
    "#);
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(
        lines[0].starts_with("[RuntimeEvaluationError] format alignment must not exceed 65535"),
        "{lines:?}"
    );
    assert_eq!(lines[1], "after");
}
