use std::{cell::RefCell, cmp::Ordering, f64::consts};

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::{
    console::Console,
    diagnostics::{Diagnostic, Result, SharplingError},
    value::{align, Value, ValueKind},
};

pub type Callback = fn(&mut dyn Console, &[Value]) -> Result<Value>;

/// Host implementation standing in for a static member of the .NET base
/// library, keyed by its qualified name.
pub struct NativeFunction {
    pub name: &'static str,
    pub min_arity: usize,
    pub max_arity: usize,
    pub callback: Callback,
}

impl NativeFunction {
    pub fn call(&self, console: &mut dyn Console, args: &[Value]) -> Result<Value> {
        ensure_arity(args, self.min_arity, self.max_arity, self.name)?;
        (self.callback)(console, args)
    }
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<builtin {}>", self.name)
    }
}

const fn native(
    name: &'static str,
    min_arity: usize,
    max_arity: usize,
    callback: Callback,
) -> NativeFunction {
    NativeFunction {
        name,
        min_arity,
        max_arity,
        callback,
    }
}

const VARIADIC: usize = usize::MAX;

static BUILTINS: &[NativeFunction] = &[
    native("int.Parse", 1, 1, int_parse),
    native("long.Parse", 1, 1, long_parse),
    native("double.Parse", 1, 1, double_parse),
    native("float.Parse", 1, 1, double_parse),
    native("decimal.Parse", 1, 1, double_parse),
    native("bool.Parse", 1, 1, bool_parse),
    native("char.Parse", 1, 1, char_parse),
    native("int.MaxValue", 0, 0, int_max_value),
    native("int.MinValue", 0, 0, int_min_value),
    native("char.IsDigit", 1, 2, char_is_digit),
    native("char.IsLetter", 1, 2, char_is_letter),
    native("char.IsWhiteSpace", 1, 2, char_is_white_space),
    native("char.IsUpper", 1, 2, char_is_upper),
    native("char.IsLower", 1, 2, char_is_lower),
    native("char.ToUpper", 1, 1, char_to_upper),
    native("char.ToLower", 1, 1, char_to_lower),
    native("Convert.ToInt32", 1, 1, convert_to_int32),
    native("Convert.ToInt64", 1, 1, convert_to_int64),
    native("Convert.ToDouble", 1, 1, convert_to_double),
    native("Convert.ToSingle", 1, 1, convert_to_double),
    native("Convert.ToDecimal", 1, 1, convert_to_double),
    native("Convert.ToString", 1, 1, convert_to_string),
    native("Convert.ToBoolean", 1, 1, convert_to_boolean),
    native("Convert.ToChar", 1, 1, convert_to_char),
    native("Math.Pow", 2, 2, math_pow),
    native("Math.Sqrt", 1, 1, math_sqrt),
    native("Math.Abs", 1, 1, math_abs),
    native("Math.Floor", 1, 1, math_floor),
    native("Math.Ceiling", 1, 1, math_ceiling),
    native("Math.Round", 1, 2, math_round),
    native("Math.Min", 2, 2, math_min),
    native("Math.Max", 2, 2, math_max),
    native("Math.Sign", 1, 1, math_sign),
    native("Math.Truncate", 1, 1, math_truncate),
    native("Math.Log", 1, 1, math_log),
    native("Math.Log10", 1, 1, math_log10),
    native("Math.Exp", 1, 1, math_exp),
    native("Math.PI", 0, 0, math_pi),
    native("Math.E", 0, 0, math_e),
    native("String.IsNullOrEmpty", 1, 1, string_is_null_or_empty),
    native("String.IsNullOrWhiteSpace", 1, 1, string_is_null_or_white_space),
    native("String.Join", 2, VARIADIC, string_join),
    native("String.Format", 1, VARIADIC, string_format),
    native("String.Concat", 0, VARIADIC, string_concat),
    native("String.Empty", 0, 0, string_empty),
    native("Array.IndexOf", 2, 2, array_index_of),
    native("Array.LastIndexOf", 2, 2, array_last_index_of),
    native("Array.Copy", 3, 3, array_copy),
    native("Array.Sort", 1, 1, array_sort),
    native("Array.Reverse", 1, 1, array_reverse),
    native("Console.WriteLine", 0, VARIADIC, console_write_line),
    native("Console.Write", 1, VARIADIC, console_write),
    native("Console.ReadLine", 0, 0, console_read_line),
    native("Console.ReadKey", 0, 1, console_read_key),
    native("Console.Clear", 0, 0, console_clear),
    native("DateTime.Now", 0, 0, date_now),
    native("DateTime.Today", 0, 0, date_today),
    native("DateTime.Parse", 1, 1, date_parse),
];

/// Looks up a builtin by its canonical qualified name (see [`qualified_name`]).
pub fn lookup(name: &str) -> Option<&'static NativeFunction> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

/// Canonical `Owner.Member` key, folding keyword and framework spellings of
/// the same type (`string`/`String`, `int`/`Int32`).
pub fn qualified_name(owner: &str, member: &str) -> String {
    let owner = match owner {
        "string" | "String" => "String",
        "int" | "Int32" => "int",
        "long" | "Int64" => "long",
        "double" | "Double" => "double",
        "float" | "Single" => "float",
        "decimal" | "Decimal" => "decimal",
        "bool" | "Boolean" => "bool",
        "char" | "Char" => "char",
        other => other,
    };
    format!("{owner}.{member}")
}

/// Text written by `Console.Write`/`WriteLine`: the single argument's string
/// form, or composite formatting when more than one argument is given.
pub fn console_text(args: &[Value]) -> Result<String> {
    match args {
        [] => Ok(String::new()),
        [value] => Ok(value.to_string()),
        [format, rest @ ..] => format_composite(&format.to_string(), rest),
    }
}

/// Expands .NET composite format strings: `{index[,alignment][:format]}`
/// holes, with `{{` and `}}` as literal braces.
pub fn format_composite(format: &str, args: &[Value]) -> Result<String> {
    let mut out = String::new();
    let mut chars = format.char_indices().peekable();
    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' if chars.peek().map(|(_, next)| *next) == Some('{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek().map(|(_, next)| *next) == Some('}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let body_start = pos + 1;
                let Some(close) = format[body_start..].find('}').map(|idx| body_start + idx) else {
                    return Err(invalid_format());
                };
                while chars.peek().is_some_and(|(idx, _)| *idx <= close) {
                    chars.next();
                }
                out.push_str(&format_hole(&format[body_start..close], args)?);
            }
            '}' => return Err(invalid_format()),
            _ => out.push(ch),
        }
    }
    Ok(out)
}

fn format_hole(body: &str, args: &[Value]) -> Result<String> {
    let (head, spec) = match body.split_once(':') {
        Some((head, spec)) => (head, Some(spec)),
        None => (body, None),
    };
    let (index, alignment) = match head.split_once(',') {
        Some((index, alignment)) => (
            index,
            Some(
                alignment
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| invalid_format())?,
            ),
        ),
        None => (head, None),
    };
    let index = index.trim().parse::<usize>().map_err(|_| invalid_format())?;
    let value = args.get(index).ok_or_else(|| {
        runtime_error(
            "Index (zero based) must be greater than or equal to zero and less than the size of the argument list.",
        )
    })?;
    let text = match spec {
        Some(spec) => value.format_with(spec)?,
        None => value.to_string(),
    };
    Ok(align(text, alignment)?)
}

fn invalid_format() -> SharplingError {
    runtime_error("Input string was not in a correct format.")
}

/// Reads an instance property such as `.Length` or `.KeyChar`.
pub fn property(receiver: &Value, name: &str) -> Result<Value> {
    match (receiver.kind(), name) {
        (ValueKind::Null, _) => Err(null_reference()),
        (ValueKind::String(s), "Length") => Ok(Value::int(s.chars().count() as i64)),
        (ValueKind::Array(items), "Length") => Ok(Value::int(items.borrow().len() as i64)),
        (ValueKind::KeyInfo(key), "KeyChar") => Ok(Value::char(*key)),
        (ValueKind::Date(date), "Year") => Ok(Value::int(i64::from(date.year()))),
        (ValueKind::Date(date), "Month") => Ok(Value::int(i64::from(date.month()))),
        (ValueKind::Date(date), "Day") => Ok(Value::int(i64::from(date.day()))),
        (ValueKind::Date(date), "Hour") => Ok(Value::int(i64::from(date.hour()))),
        (ValueKind::Date(date), "Minute") => Ok(Value::int(i64::from(date.minute()))),
        (ValueKind::Date(date), "Second") => Ok(Value::int(i64::from(date.second()))),
        (ValueKind::Date(date), "Date") => Ok(Value::date(date.date().and_time(NaiveTime::MIN))),
        _ => Err(missing_member(receiver, name)),
    }
}

pub fn call_method(receiver: &Value, name: &str, args: &[Value]) -> Result<Value> {
    let method = format!(".{name}");
    match (receiver.kind(), name) {
        (ValueKind::Null, _) => Err(null_reference()),
        (_, "ToString") => {
            ensure_arity(args, 0, 1, &method)?;
            match args.first() {
                Some(spec) => Ok(Value::string(receiver.format_with(&expect_string(spec, &method)?)?)),
                None => Ok(Value::string(receiver.to_string())),
            }
        }
        (_, "Equals") => {
            ensure_arity(args, 1, 1, &method)?;
            Ok(Value::bool(receiver.strict_eq(&args[0])))
        }
        (_, "CompareTo") => {
            ensure_arity(args, 1, 1, &method)?;
            let ordering = compare(receiver, &args[0])
                .ok_or_else(|| runtime_error("Object must be of the same type."))?;
            Ok(Value::int(ordering as i64))
        }
        (ValueKind::String(s), _) => string_method(s, name, args),
        _ => Err(missing_member(receiver, name)),
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Value> {
    let method = format!("String.{name}");
    match name {
        "ToUpper" | "ToUpperInvariant" => {
            ensure_arity(args, 0, 0, &method)?;
            Ok(Value::string(s.to_uppercase()))
        }
        "ToLower" | "ToLowerInvariant" => {
            ensure_arity(args, 0, 0, &method)?;
            Ok(Value::string(s.to_lowercase()))
        }
        "Trim" => {
            ensure_arity(args, 0, 0, &method)?;
            Ok(Value::string(s.trim()))
        }
        "TrimStart" => {
            ensure_arity(args, 0, 0, &method)?;
            Ok(Value::string(s.trim_start()))
        }
        "TrimEnd" => {
            ensure_arity(args, 0, 0, &method)?;
            Ok(Value::string(s.trim_end()))
        }
        "Contains" => {
            ensure_arity(args, 1, 1, &method)?;
            Ok(Value::bool(s.contains(needle(&args[0], &method)?.as_str())))
        }
        "StartsWith" => {
            ensure_arity(args, 1, 1, &method)?;
            Ok(Value::bool(s.starts_with(needle(&args[0], &method)?.as_str())))
        }
        "EndsWith" => {
            ensure_arity(args, 1, 1, &method)?;
            Ok(Value::bool(s.ends_with(needle(&args[0], &method)?.as_str())))
        }
        "IndexOf" => {
            ensure_arity(args, 1, 1, &method)?;
            let needle = needle(&args[0], &method)?;
            let index = s
                .find(needle.as_str())
                .map_or(-1, |byte| s[..byte].chars().count() as i64);
            Ok(Value::int(index))
        }
        "Substring" => {
            ensure_arity(args, 1, 2, &method)?;
            let chars: Vec<char> = s.chars().collect();
            let start = expect_int(&args[0], &method)?;
            let length = match args.get(1) {
                Some(length) => expect_int(length, &method)?,
                None => chars.len() as i64 - start,
            };
            if start < 0 || start > chars.len() as i64 {
                return Err(runtime_error(
                    "startIndex cannot be larger than length of string.",
                ));
            }
            if length < 0 || start.checked_add(length).map_or(true, |end| end > chars.len() as i64) {
                return Err(runtime_error(
                    "Index and length must refer to a location within the string.",
                ));
            }
            let (start, length) = (start as usize, length as usize);
            Ok(Value::string(chars[start..start + length].iter().collect::<String>()))
        }
        "Replace" => {
            ensure_arity(args, 2, 2, &method)?;
            let from = needle(&args[0], &method)?;
            if from.is_empty() {
                return Err(runtime_error("String cannot be of zero length."));
            }
            let to = if args[1].is_null() {
                String::new()
            } else {
                needle(&args[1], &method)?
            };
            Ok(Value::string(s.replace(&from, &to)))
        }
        "Split" => {
            ensure_arity(args, 0, 1, &method)?;
            let parts: Vec<Value> = match args.first() {
                Some(separator) => {
                    let separator = needle(separator, &method)?;
                    s.split(separator.as_str()).map(Value::string).collect()
                }
                None => s.split(char::is_whitespace).map(Value::string).collect(),
            };
            Ok(Value::array(parts))
        }
        "PadLeft" | "PadRight" => {
            ensure_arity(args, 1, 2, &method)?;
            let width = expect_int(&args[0], &method)?.max(0) as usize;
            let fill = match args.get(1) {
                Some(fill) => expect_char(fill, &method)?,
                None => ' ',
            };
            let missing = width.saturating_sub(s.chars().count());
            let padding: String = std::iter::repeat(fill).take(missing).collect();
            if name == "PadLeft" {
                Ok(Value::string(format!("{padding}{s}")))
            } else {
                Ok(Value::string(format!("{s}{padding}")))
            }
        }
        "ToCharArray" => {
            ensure_arity(args, 0, 0, &method)?;
            Ok(Value::array(s.chars().map(Value::char).collect()))
        }
        _ => Err(runtime_error(format!(
            "`string` does not contain a definition for `{name}`"
        ))),
    }
}

/// Ordering used by `Array.Sort` and `CompareTo`: numeric, ordinal for
/// strings, `None` for incomparable kinds.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left.kind(), right.kind()) {
        (ValueKind::String(a), ValueKind::String(b)) => Some(a.cmp(b)),
        (ValueKind::Bool(a), ValueKind::Bool(b)) => Some(a.cmp(b)),
        (ValueKind::Date(a), ValueKind::Date(b)) => Some(a.cmp(b)),
        _ => Some(left.as_f64()?.total_cmp(&right.as_f64()?)),
    }
}

fn ensure_arity(args: &[Value], min: usize, max: usize, name: &str) -> Result<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else if max == VARIADIC {
            format!("at least {min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(runtime_error(format!(
            "`{name}` expected {expected} arguments but received {}",
            args.len()
        )));
    }
    Ok(())
}

fn runtime_error(message: impl Into<String>) -> SharplingError {
    SharplingError::from(Diagnostic::runtime(message))
}

fn null_reference() -> SharplingError {
    runtime_error("Object reference not set to an instance of an object.")
}

fn missing_member(receiver: &Value, name: &str) -> SharplingError {
    runtime_error(format!(
        "`{}` does not contain a definition for `{name}`",
        receiver.type_name()
    ))
}

fn expect_string(value: &Value, name: &str) -> Result<String> {
    match value.kind() {
        ValueKind::String(s) => Ok(s.clone()),
        _ => Err(runtime_error(format!(
            "`{name}` expected string but found {}",
            value.type_name()
        ))),
    }
}

/// String or char argument of a search method, as text.
fn needle(value: &Value, name: &str) -> Result<String> {
    match value.kind() {
        ValueKind::Char(c) => Ok(c.to_string()),
        _ => expect_string(value, name),
    }
}

fn expect_number(value: &Value, name: &str) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        runtime_error(format!(
            "`{name}` expected a number but found {}",
            value.type_name()
        ))
    })
}

fn expect_int(value: &Value, name: &str) -> Result<i64> {
    value.as_i64().ok_or_else(|| {
        runtime_error(format!(
            "`{name}` expected int but found {}",
            value.type_name()
        ))
    })
}

fn expect_char(value: &Value, name: &str) -> Result<char> {
    match value.kind() {
        ValueKind::Char(c) => Ok(*c),
        _ => Err(runtime_error(format!(
            "`{name}` expected char but found {}",
            value.type_name()
        ))),
    }
}

fn expect_array<'v>(value: &'v Value, name: &str) -> Result<&'v RefCell<Vec<Value>>> {
    match value.kind() {
        ValueKind::Array(items) => Ok(items),
        ValueKind::Null => Err(runtime_error("Value cannot be null. (Parameter 'array')")),
        _ => Err(runtime_error(format!(
            "`{name}` expected an array but found {}",
            value.type_name()
        ))),
    }
}

fn parse_input(value: &Value, name: &str) -> Result<String> {
    if value.is_null() {
        return Err(runtime_error("Value cannot be null. (Parameter 's')"));
    }
    Ok(expect_string(value, name)?.trim().to_string())
}

fn parse_integral(text: &str, bits: u32) -> Result<i64> {
    let parsed = text.parse::<i64>().map_err(|err| match err.kind() {
        std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow => {
            overflow(bits)
        }
        _ => invalid_format(),
    })?;
    check_range(parsed, bits)
}

fn check_range(value: i64, bits: u32) -> Result<i64> {
    if bits == 32 && i32::try_from(value).is_err() {
        return Err(overflow(bits));
    }
    Ok(value)
}

fn overflow(bits: u32) -> SharplingError {
    runtime_error(format!(
        "Value was either too large or too small for an Int{bits}."
    ))
}

fn parse_floating(text: &str) -> Result<f64> {
    match text {
        "NaN" => Ok(f64::NAN),
        "Infinity" | "∞" => Ok(f64::INFINITY),
        "-Infinity" | "-∞" => Ok(f64::NEG_INFINITY),
        _ if text.chars().any(|ch| ch.is_ascii_alphabetic() && !matches!(ch, 'e' | 'E')) => {
            Err(invalid_format())
        }
        _ => text.parse::<f64>().map_err(|_| invalid_format()),
    }
}

fn parse_boolean(text: &str) -> Result<bool> {
    if text.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if text.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(runtime_error(format!(
            "String '{text}' was not recognized as a valid Boolean."
        )))
    }
}

fn int_parse(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let text = parse_input(&args[0], "int.Parse")?;
    Ok(Value::int(parse_integral(&text, 32)?))
}

fn long_parse(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let text = parse_input(&args[0], "long.Parse")?;
    Ok(Value::int(parse_integral(&text, 64)?))
}

fn double_parse(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let text = parse_input(&args[0], "double.Parse")?;
    Ok(Value::double(parse_floating(&text)?))
}

fn bool_parse(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let text = parse_input(&args[0], "bool.Parse")?;
    Ok(Value::bool(parse_boolean(&text)?))
}

fn single_char(value: &Value, name: &str) -> Result<char> {
    if value.is_null() {
        return Err(runtime_error("Value cannot be null. (Parameter 's')"));
    }
    let text = expect_string(value, name)?;
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(ch),
        _ => Err(runtime_error("String must be exactly one character long.")),
    }
}

fn char_parse(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::char(single_char(&args[0], "char.Parse")?))
}

fn int_max_value(_: &mut dyn Console, _: &[Value]) -> Result<Value> {
    Ok(Value::int(i64::from(i32::MAX)))
}

fn int_min_value(_: &mut dyn Console, _: &[Value]) -> Result<Value> {
    Ok(Value::int(i64::from(i32::MIN)))
}

/// `char.IsX(c)` or `char.IsX(s, index)`.
fn char_argument(args: &[Value], name: &str) -> Result<char> {
    match args {
        [value] => expect_char(value, name),
        [text, index] => {
            let text = expect_string(text, name)?;
            let index = expect_int(index, name)?;
            usize::try_from(index)
                .ok()
                .and_then(|index| text.chars().nth(index))
                .ok_or_else(|| runtime_error("Index was out of range. Must be non-negative and less than the size of the collection."))
        }
        _ => Err(runtime_error(format!("`{name}` expected a char"))),
    }
}

fn char_is_digit(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::bool(char_argument(args, "char.IsDigit")?.is_ascii_digit()))
}

fn char_is_letter(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::bool(char_argument(args, "char.IsLetter")?.is_alphabetic()))
}

fn char_is_white_space(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::bool(char_argument(args, "char.IsWhiteSpace")?.is_whitespace()))
}

fn char_is_upper(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::bool(char_argument(args, "char.IsUpper")?.is_uppercase()))
}

fn char_is_lower(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::bool(char_argument(args, "char.IsLower")?.is_lowercase()))
}

fn char_to_upper(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let ch = expect_char(&args[0], "char.ToUpper")?;
    Ok(Value::char(ch.to_uppercase().next().unwrap_or(ch)))
}

fn char_to_lower(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let ch = expect_char(&args[0], "char.ToLower")?;
    Ok(Value::char(ch.to_lowercase().next().unwrap_or(ch)))
}

fn convert_integral(value: &Value, bits: u32, name: &str) -> Result<i64> {
    match value.kind() {
        ValueKind::Null => Ok(0),
        ValueKind::Int(n) => check_range(*n, bits),
        ValueKind::Char(c) => Ok(i64::from(u32::from(*c))),
        ValueKind::Bool(b) => Ok(i64::from(*b)),
        ValueKind::Double(n) => {
            let rounded = n.round_ties_even();
            if !rounded.is_finite() || rounded.abs() >= 9.2e18 {
                return Err(overflow(bits));
            }
            check_range(rounded as i64, bits)
        }
        ValueKind::String(s) => parse_integral(s.trim(), bits),
        _ => Err(runtime_error(format!(
            "`{name}` cannot convert {} to an integer",
            value.type_name()
        ))),
    }
}

fn convert_to_int32(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::int(convert_integral(&args[0], 32, "Convert.ToInt32")?))
}

fn convert_to_int64(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::int(convert_integral(&args[0], 64, "Convert.ToInt64")?))
}

fn convert_to_double(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let value = &args[0];
    let converted = match value.kind() {
        ValueKind::Null => 0.0,
        ValueKind::Bool(b) => f64::from(u8::from(*b)),
        ValueKind::String(s) => parse_floating(s.trim())?,
        _ => expect_number(value, "Convert.ToDouble")?,
    };
    Ok(Value::double(converted))
}

fn convert_to_string(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::string(args[0].to_string()))
}

fn convert_to_boolean(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let value = &args[0];
    let converted = match value.kind() {
        ValueKind::Null => false,
        ValueKind::Bool(b) => *b,
        ValueKind::String(s) => parse_boolean(s.trim())?,
        _ => expect_number(value, "Convert.ToBoolean")? != 0.0,
    };
    Ok(Value::bool(converted))
}

fn convert_to_char(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let value = &args[0];
    match value.kind() {
        ValueKind::Char(c) => Ok(Value::char(*c)),
        ValueKind::Int(n) => u32::try_from(*n)
            .ok()
            .and_then(char::from_u32)
            .map(Value::char)
            .ok_or_else(|| runtime_error("Value was either too large or too small for a character.")),
        ValueKind::String(_) => Ok(Value::char(single_char(value, "Convert.ToChar")?)),
        _ => Err(runtime_error(format!(
            "Invalid cast from '{}' to 'Char'.",
            value.type_name()
        ))),
    }
}

fn math_pow(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let base = expect_number(&args[0], "Math.Pow")?;
    let exponent = expect_number(&args[1], "Math.Pow")?;
    Ok(Value::double(base.powf(exponent)))
}

fn math_sqrt(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::double(expect_number(&args[0], "Math.Sqrt")?.sqrt()))
}

fn math_abs(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    match args[0].kind() {
        ValueKind::Int(n) => n
            .checked_abs()
            .map(Value::int)
            .ok_or_else(|| runtime_error("Negating the minimum value of a twos complement number is invalid.")),
        _ => Ok(Value::double(expect_number(&args[0], "Math.Abs")?.abs())),
    }
}

fn math_floor(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::double(expect_number(&args[0], "Math.Floor")?.floor()))
}

fn math_ceiling(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::double(expect_number(&args[0], "Math.Ceiling")?.ceil()))
}

fn math_round(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let number = expect_number(&args[0], "Math.Round")?;
    let digits = match args.get(1) {
        Some(digits) => expect_int(digits, "Math.Round")?,
        None => 0,
    };
    if !(0..=15).contains(&digits) {
        return Err(runtime_error(
            "Rounding digits must be between 0 and 15, inclusive.",
        ));
    }
    let scale = 10f64.powi(digits as i32);
    Ok(Value::double((number * scale).round_ties_even() / scale))
}

fn both_integral(args: &[Value]) -> Option<(i64, i64)> {
    match (args[0].kind(), args[1].kind()) {
        (ValueKind::Int(a), ValueKind::Int(b)) => Some((*a, *b)),
        _ => None,
    }
}

fn math_min(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    if let Some((a, b)) = both_integral(args) {
        return Ok(Value::int(a.min(b)));
    }
    let a = expect_number(&args[0], "Math.Min")?;
    let b = expect_number(&args[1], "Math.Min")?;
    Ok(Value::double(a.min(b)))
}

fn math_max(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    if let Some((a, b)) = both_integral(args) {
        return Ok(Value::int(a.max(b)));
    }
    let a = expect_number(&args[0], "Math.Max")?;
    let b = expect_number(&args[1], "Math.Max")?;
    Ok(Value::double(a.max(b)))
}

fn math_sign(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let number = expect_number(&args[0], "Math.Sign")?;
    if number.is_nan() {
        return Err(runtime_error(
            "Function does not accept floating point Not-a-Number values.",
        ));
    }
    let sign = match number.partial_cmp(&0.0) {
        Some(Ordering::Greater) => 1,
        Some(Ordering::Less) => -1,
        _ => 0,
    };
    Ok(Value::int(sign))
}

fn math_truncate(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::double(expect_number(&args[0], "Math.Truncate")?.trunc()))
}

fn math_log(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::double(expect_number(&args[0], "Math.Log")?.ln()))
}

fn math_log10(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::double(expect_number(&args[0], "Math.Log10")?.log10()))
}

fn math_exp(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    Ok(Value::double(expect_number(&args[0], "Math.Exp")?.exp()))
}

fn math_pi(_: &mut dyn Console, _: &[Value]) -> Result<Value> {
    Ok(Value::double(consts::PI))
}

fn math_e(_: &mut dyn Console, _: &[Value]) -> Result<Value> {
    Ok(Value::double(consts::E))
}

fn string_is_null_or_empty(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let empty = match args[0].kind() {
        ValueKind::Null => true,
        _ => expect_string(&args[0], "String.IsNullOrEmpty")?.is_empty(),
    };
    Ok(Value::bool(empty))
}

fn string_is_null_or_white_space(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let blank = match args[0].kind() {
        ValueKind::Null => true,
        _ => expect_string(&args[0], "String.IsNullOrWhiteSpace")?
            .trim()
            .is_empty(),
    };
    Ok(Value::bool(blank))
}

/// Joins with `separator`, either over one array argument or over the
/// remaining arguments.
fn string_join(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let separator = needle(&args[0], "String.Join")?;
    let joined = match &args[1..] {
        [single] if matches!(single.kind(), ValueKind::Array(_)) => {
            let items = expect_array(single, "String.Join")?.borrow();
            join(&items, &separator)
        }
        rest => join(rest, &separator),
    };
    Ok(Value::string(joined))
}

fn join(values: &[Value], separator: &str) -> String {
    values
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

fn string_format(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let format = expect_string(&args[0], "String.Format")?;
    Ok(Value::string(format_composite(&format, &args[1..])?))
}

fn string_concat(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let joined = match args {
        [single] if matches!(single.kind(), ValueKind::Array(_)) => {
            let items = expect_array(single, "String.Concat")?.borrow();
            join(&items, "")
        }
        rest => join(rest, ""),
    };
    Ok(Value::string(joined))
}

fn string_empty(_: &mut dyn Console, _: &[Value]) -> Result<Value> {
    Ok(Value::string(""))
}

fn array_index_of(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let items = expect_array(&args[0], "Array.IndexOf")?.borrow();
    let index = items
        .iter()
        .position(|item| item.strict_eq(&args[1]))
        .map_or(-1, |idx| idx as i64);
    Ok(Value::int(index))
}

fn array_last_index_of(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let items = expect_array(&args[0], "Array.LastIndexOf")?.borrow();
    let index = items
        .iter()
        .rposition(|item| item.strict_eq(&args[1]))
        .map_or(-1, |idx| idx as i64);
    Ok(Value::int(index))
}

fn array_copy(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let length = expect_int(&args[2], "Array.Copy")?;
    let length = usize::try_from(length)
        .map_err(|_| runtime_error("Non-negative number required. (Parameter 'length')"))?;
    let copied: Vec<Value> = {
        let source = expect_array(&args[0], "Array.Copy")?.borrow();
        if source.len() < length {
            return Err(runtime_error("Source array was not long enough."));
        }
        source[..length].to_vec()
    };
    let mut destination = expect_array(&args[1], "Array.Copy")?.borrow_mut();
    if destination.len() < length {
        return Err(runtime_error("Destination array was not long enough."));
    }
    destination[..length].clone_from_slice(&copied);
    Ok(Value::null())
}

fn array_sort(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let mut items = expect_array(&args[0], "Array.Sort")?.borrow_mut();
    let comparable = items
        .windows(2)
        .all(|pair| compare(&pair[0], &pair[1]).is_some());
    if !comparable {
        return Err(runtime_error("Failed to compare two elements in the array."));
    }
    items.sort_by(|a, b| compare(a, b).unwrap_or(Ordering::Equal));
    Ok(Value::null())
}

fn array_reverse(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    expect_array(&args[0], "Array.Reverse")?.borrow_mut().reverse();
    Ok(Value::null())
}

fn console_write_line(console: &mut dyn Console, args: &[Value]) -> Result<Value> {
    console.write_line(&console_text(args)?)?;
    Ok(Value::null())
}

fn console_write(console: &mut dyn Console, args: &[Value]) -> Result<Value> {
    console.write(&console_text(args)?)?;
    Ok(Value::null())
}

fn console_read_line(console: &mut dyn Console, _: &[Value]) -> Result<Value> {
    Ok(console.read_line()?.map_or_else(Value::null, Value::string))
}

fn console_read_key(console: &mut dyn Console, _: &[Value]) -> Result<Value> {
    Ok(console.read_key()?.map_or_else(Value::null, Value::key_info))
}

fn console_clear(console: &mut dyn Console, _: &[Value]) -> Result<Value> {
    console.clear()?;
    Ok(Value::null())
}

fn date_now(_: &mut dyn Console, _: &[Value]) -> Result<Value> {
    Ok(Value::date(Local::now().naive_local()))
}

fn date_today(_: &mut dyn Console, _: &[Value]) -> Result<Value> {
    Ok(Value::date(Local::now().date_naive().and_time(NaiveTime::MIN)))
}

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

fn date_parse(_: &mut dyn Console, args: &[Value]) -> Result<Value> {
    let text = parse_input(&args[0], "DateTime.Parse")?;
    let parsed = DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(&text, format).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .ok_or_else(|| {
            runtime_error(format!(
                "String '{text}' was not recognized as a valid DateTime."
            ))
        })?;
    Ok(Value::date(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::BufferConsole;

    fn call(name: &str, args: &[Value]) -> Result<Value> {
        let builtin = lookup(name).expect("builtin exists");
        builtin.call(&mut BufferConsole::new(), args)
    }

    #[test]
    fn qualified_names_fold_aliases() {
        assert_eq!(qualified_name("Int32", "Parse"), "int.Parse");
        assert_eq!(qualified_name("string", "Join"), "String.Join");
        assert!(lookup(&qualified_name("Double", "Parse")).is_some());
        assert!(lookup("int.TryParse").is_none());
    }

    #[test]
    fn composite_format_handles_alignment_and_escapes() {
        let rendered = format_composite(
            "{{{0,4}|{1:F1}}}",
            &[Value::int(7), Value::double(2.3)],
        )
        .expect("format");
        assert_eq!(rendered, "{   7|2.3}");
    }

    #[test]
    fn arity_is_checked_before_dispatch() {
        let err = call("Math.Pow", &[Value::int(2)]).expect_err("arity");
        assert!(err.to_string().contains("expected 2 arguments"));
    }
}
