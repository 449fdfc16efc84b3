use pretty_assertions::assert_eq;
use sharpling::{
    diagnostics::Result,
    stdlib::{call_method, format_composite, lookup, property},
    BufferConsole, Value, ValueKind,
};

fn call(name: &str, args: &[Value]) -> Result<Value> {
    let builtin = lookup(name).expect("builtin exists");
    builtin.call(&mut BufferConsole::new(), args)
}

fn message<T: std::fmt::Debug>(result: Result<T>) -> String {
    result
        .expect_err("call should fail")
        .diagnostic()
        .map(|diag| diag.message.clone())
        .expect("diagnostic error")
}

#[test]
fn int_parse_trims_and_checks_range() {
    let value = call("int.Parse", &[Value::string(" 42 ")]).expect("parses");
    assert_eq!(value.as_i64(), Some(42));
    assert_eq!(
        message(call("int.Parse", &[Value::string("abc")])),
        "Input string was not in a correct format."
    );
    assert_eq!(
        message(call("int.Parse", &[Value::string("3000000000")])),
        "Value was either too large or too small for an Int32."
    );
    assert_eq!(
        message(call("int.Parse", &[Value::null()])),
        "Value cannot be null. (Parameter 's')"
    );
}

#[test]
fn rounding_uses_bankers_rules() {
    let round = |args: &[Value]| call("Math.Round", args).expect("rounds").as_f64();
    assert_eq!(round(&[Value::double(2.5)]), Some(2.0));
    assert_eq!(round(&[Value::double(3.5)]), Some(4.0));
    assert_eq!(round(&[Value::double(3.14159), Value::int(2)]), Some(3.14));

    let converted = call("Convert.ToInt32", &[Value::double(2.5)]).expect("converts");
    assert_eq!(converted.as_i64(), Some(2));
}

#[test]
fn math_min_and_max_keep_integers() {
    let max = call("Math.Max", &[Value::int(3), Value::int(9)]).expect("max");
    assert!(matches!(max.kind(), ValueKind::Int(9)));
    let min = call("Math.Min", &[Value::int(3), Value::double(1.5)]).expect("min");
    assert!(matches!(min.kind(), ValueKind::Double(n) if *n == 1.5));
}

#[test]
fn composite_format_pads_and_formats() {
    let rendered = format_composite(
        "{0,-5}|{1:F1}|{0}",
        &[Value::string("ab"), Value::double(2.0)],
    )
    .expect("formats");
    assert_eq!(rendered, "ab   |2.0|ab");
    assert!(format_composite("{1}", &[Value::int(1)]).is_err());
}

#[test]
fn string_methods() {
    let hello = Value::string("Hello");
    let sub = call_method(&hello, "Substring", &[Value::int(1), Value::int(3)]).expect("substring");
    assert_eq!(sub.as_str(), Some("ell"));
    let upper = call_method(&hello, "ToUpper", &[]).expect("upper");
    assert_eq!(upper.as_str(), Some("HELLO"));
    let index = call_method(&hello, "IndexOf", &[Value::char('l')]).expect("index");
    assert_eq!(index.as_i64(), Some(2));
    let padded = call_method(&Value::int(7), "ToString", &[Value::string("D3")]).expect("pad");
    assert_eq!(padded.as_str(), Some("007"));
}

#[test]
fn length_property_and_null_receivers() {
    let array = Value::array(vec![Value::int(1), Value::int(2), Value::int(3)]);
    assert_eq!(property(&array, "Length").expect("length").as_i64(), Some(3));
    assert_eq!(
        property(&Value::null(), "Length")
            .expect_err("null")
            .to_string(),
        "[RuntimeEvaluationError] Object reference not set to an instance of an object."
    );
}

#[test]
fn console_builtins_use_the_console() {
    let mut console = BufferConsole::with_input(["first"]);
    let read = lookup("Console.ReadLine").expect("builtin");
    let line = read.call(&mut console, &[]).expect("reads");
    assert_eq!(line.as_str(), Some("first"));
    assert!(read.call(&mut console, &[]).expect("reads").is_null());

    let write = lookup("Console.WriteLine").expect("builtin");
    write
        .call(&mut console, &[Value::string("{0}-{1}"), Value::int(1), Value::int(2)])
        .expect("writes");
    assert_eq!(console.output(), "1-2\n");
}

#[test]
fn date_parse_reads_iso_dates() {
    let date = call("DateTime.Parse", &[Value::string("2024-03-05")]).expect("parses");
    assert_eq!(property(&date, "Year").expect("year").as_i64(), Some(2024));
    assert_eq!(property(&date, "Day").expect("day").as_i64(), Some(5));
    let formatted = call_method(&date, "ToString", &[Value::string("yyyy-MM-dd")]).expect("fmt");
    assert_eq!(formatted.as_str(), Some("2024-03-05"));
}

#[test]
fn substring_rejects_ranges_past_the_end() {
    let hello = Value::string("Hello");
    assert_eq!(
        message(call_method(&hello, "Substring", &[Value::int(1), Value::int(i64::MAX)])),
        "Index and length must refer to a location within the string."
    );
    assert_eq!(
        message(call_method(&hello, "Substring", &[Value::int(2), Value::int(-1)])),
        "Index and length must refer to a location within the string."
    );
    let tail = call_method(&hello, "Substring", &[Value::int(5), Value::int(0)]).expect("empty");
    assert_eq!(tail.as_str(), Some(""));
}

#[test]
fn format_widths_are_bounded() {
    assert_eq!(
        message(format_composite("{0,70000}", &[Value::int(1)])),
        "format alignment must not exceed 65535"
    );
    assert_eq!(
        message(format_composite("{0:F70000}", &[Value::double(1.5)])),
        "format precision must not exceed 65535"
    );
    assert_eq!(
        message(call_method(&Value::double(1.5), "ToString", &[Value::string("N99999")])),
        "format precision must not exceed 65535"
    );
    let padded = format_composite("{0,3}", &[Value::int(7)]).expect("formats");
    assert_eq!(padded, "  7");
}
