use std::{cell::RefCell, fmt, rc::Rc};

use chrono::NaiveDateTime;

use crate::diagnostics::{Diagnostic, SourceSpan};

#[derive(Clone)]
pub struct Value(pub Rc<ValueKind>);

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn null() -> Self {
        Self::new(ValueKind::Null)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ValueKind::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        Self::new(ValueKind::Int(value))
    }

    pub fn double(value: f64) -> Self {
        Self::new(ValueKind::Double(value))
    }

    pub fn char(value: char) -> Self {
        Self::new(ValueKind::Char(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::String(value.into()))
    }

    pub fn array(values: Vec<Value>) -> Self {
        Self::new(ValueKind::Array(RefCell::new(values)))
    }

    pub fn date(value: NaiveDateTime) -> Self {
        Self::new(ValueKind::Date(value))
    }

    pub fn key_info(key: char) -> Self {
        Self::new(ValueKind::KeyInfo(key))
    }

    /// Zero value for a declared type name, used for declarations without an
    /// initializer.
    pub fn default_for(type_name: &str) -> Self {
        match type_name {
            "int" | "long" | "short" | "byte" | "Int32" | "Int64" => Value::int(0),
            "double" | "float" | "decimal" | "Double" | "Single" | "Decimal" => {
                Value::double(0.0)
            }
            "string" | "String" => Value::string(""),
            "bool" | "Boolean" => Value::bool(false),
            "char" | "Char" => Value::char('\0'),
            _ => Value::null(),
        }
    }

    pub fn kind(&self) -> &ValueKind {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        matches!(&*self.0, ValueKind::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match &*self.0 {
            ValueKind::Null => "null",
            ValueKind::Bool(_) => "bool",
            ValueKind::Int(_) => "int",
            ValueKind::Double(_) => "double",
            ValueKind::Char(_) => "char",
            ValueKind::String(_) => "string",
            ValueKind::Array(_) => "array",
            ValueKind::Date(_) => "DateTime",
            ValueKind::KeyInfo(_) => "ConsoleKeyInfo",
        }
    }

    pub fn expect_bool(&self, span: SourceSpan) -> Result<bool, Diagnostic> {
        match &*self.0 {
            ValueKind::Bool(b) => Ok(*b),
            _ => Err(Diagnostic::runtime(format!(
                "cannot implicitly convert type `{}` to `bool`",
                self.type_name()
            ))
            .with_span(span)),
        }
    }

    /// Numeric view of ints, doubles and chars.
    pub fn as_f64(&self) -> Option<f64> {
        match &*self.0 {
            ValueKind::Int(n) => Some(*n as f64),
            ValueKind::Double(n) => Some(*n),
            ValueKind::Char(c) => Some(u32::from(*c) as f64),
            _ => None,
        }
    }

    /// Integral view of ints and chars.
    pub fn as_i64(&self) -> Option<i64> {
        match &*self.0 {
            ValueKind::Int(n) => Some(*n),
            ValueKind::Char(c) => Some(i64::from(u32::from(*c))),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &*self.0 {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    /// `==` without implicit conversions beyond numeric promotion.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (&*self.0, &*other.0) {
            (ValueKind::Null, ValueKind::Null) => true,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            (ValueKind::Char(a), ValueKind::Char(b)) => a == b,
            (ValueKind::KeyInfo(a), ValueKind::KeyInfo(b)) => a == b,
            (ValueKind::Date(a), ValueKind::Date(b)) => a == b,
            (ValueKind::Array(_), ValueKind::Array(_)) => Rc::ptr_eq(&self.0, &other.0),
            (ValueKind::Int(a), ValueKind::Int(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Renders the value through a .NET-style format specifier such as
    /// `F2`, `N0`, `D3`, `P1` or a custom `0.00` pattern.
    pub fn format_with(&self, spec: &str) -> Result<String, Diagnostic> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Ok(self.to_string());
        }
        let number = match &*self.0 {
            ValueKind::Int(n) => *n as f64,
            ValueKind::Double(n) => *n,
            ValueKind::Date(date) => return Ok(date.format(&date_pattern(spec)).to_string()),
            _ => return Ok(self.to_string()),
        };
        if spec.starts_with(['0', '#']) {
            return custom_number(number, spec);
        }
        let mut chars = spec.chars();
        let letter = chars.next().map(|ch| ch.to_ascii_uppercase());
        let digits = chars.as_str();
        let precision = if digits.is_empty() {
            None
        } else {
            Some(
                digits
                    .parse::<usize>()
                    .map_err(|_| Diagnostic::runtime(format!("format specifier `{spec}` is invalid")))?,
            )
        };
        if precision.is_some_and(|digits| digits > MAX_FORMAT_WIDTH) {
            return Err(too_wide("precision"));
        }
        let rendered = match letter {
            Some('F') => format!("{:.*}", precision.unwrap_or(2), number),
            Some('N') => group_thousands(&format!("{:.*}", precision.unwrap_or(2), number)),
            Some('C') => format!("¤{}", group_thousands(&format!("{:.*}", precision.unwrap_or(2), number))),
            Some('P') => format!("{:.*} %", precision.unwrap_or(2), number * 100.0),
            Some('E') => scientific(number, precision.unwrap_or(6)),
            Some('G') | Some('R') => self.to_string(),
            Some('D') => {
                let ValueKind::Int(n) = &*self.0 else {
                    return Err(Diagnostic::runtime(format!(
                        "format specifier `{spec}` requires an integral value"
                    )));
                };
                let width = precision.unwrap_or(0);
                let sign = if *n < 0 { "-" } else { "" };
                format!("{sign}{:0width$}", n.unsigned_abs())
            }
            Some('X') => {
                let ValueKind::Int(n) = &*self.0 else {
                    return Err(Diagnostic::runtime(format!(
                        "format specifier `{spec}` requires an integral value"
                    )));
                };
                let width = precision.unwrap_or(0);
                if spec.starts_with('x') {
                    format!("{n:0width$x}")
                } else {
                    format!("{n:0width$X}")
                }
            }
            _ => {
                return Err(Diagnostic::runtime(format!(
                    "format specifier `{spec}` is invalid"
                )))
            }
        };
        Ok(rendered)
    }
}

/// Largest precision or alignment accepted in a format item.
const MAX_FORMAT_WIDTH: usize = u16::MAX as usize;

fn too_wide(what: &str) -> Diagnostic {
    Diagnostic::runtime(format!(
        "format {what} must not exceed {MAX_FORMAT_WIDTH}"
    ))
}

/// Pads `text` to `alignment` columns: right-aligned when positive,
/// left-aligned when negative.
pub fn align(text: String, alignment: Option<i64>) -> Result<String, Diagnostic> {
    let Some(alignment) = alignment else {
        return Ok(text);
    };
    let width = usize::try_from(alignment.unsigned_abs())
        .ok()
        .filter(|width| *width <= MAX_FORMAT_WIDTH)
        .ok_or_else(|| too_wide("alignment"))?;
    if alignment < 0 {
        Ok(format!("{text:<width$}"))
    } else {
        Ok(format!("{text:>width$}"))
    }
}

/// Shortest round-trip rendering, mirroring how .NET prints a `double`.
pub fn format_double(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "∞" } else { "-∞" }.to_string();
    }
    let magnitude = n.abs();
    if n == n.trunc() && magnitude < 1e15 {
        return format!("{}", n as i64);
    }
    if magnitude >= 1e15 || magnitude < 1e-5 {
        let rendered = format!("{n:E}");
        return match rendered.split_once('E') {
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exponent),
                };
                format!("{mantissa}E{sign}{digits:0>2}")
            }
            None => rendered,
        };
    }
    format!("{n}")
}

fn scientific(number: f64, precision: usize) -> String {
    let rendered = format!("{number:.precision$E}");
    match rendered.split_once('E') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}E{sign}{digits:0>3}")
        }
        None => rendered,
    }
}

fn group_thousands(rendered: &str) -> String {
    let (sign, unsigned) = match rendered.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rendered),
    };
    let (integral, fraction) = match unsigned.split_once('.') {
        Some((integral, fraction)) => (integral, Some(fraction)),
        None => (unsigned, None),
    };
    let mut grouped = String::new();
    for (idx, digit) in integral.chars().enumerate() {
        if idx > 0 && (integral.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}

fn custom_number(number: f64, pattern: &str) -> Result<String, Diagnostic> {
    let (integral_pattern, fraction_pattern) = match pattern.split_once('.') {
        Some((integral, fraction)) => (integral, fraction),
        None => (pattern, ""),
    };
    let required = fraction_pattern.chars().filter(|ch| *ch == '0').count();
    let optional = fraction_pattern.chars().filter(|ch| *ch == '#').count();
    if required + optional > MAX_FORMAT_WIDTH {
        return Err(too_wide("precision"));
    }
    let mut rendered = format!("{:.*}", required + optional, number);
    if optional > 0 {
        if let Some(dot) = rendered.find('.') {
            let keep = dot + 1 + required;
            while rendered.len() > keep && rendered.ends_with('0') {
                rendered.pop();
            }
            if rendered.ends_with('.') {
                rendered.pop();
            }
        }
    }
    let min_integral = integral_pattern.chars().filter(|ch| *ch == '0').count();
    let (sign, unsigned) = match rendered.strip_prefix('-') {
        Some(rest) => ("-", rest.to_string()),
        None => ("", rendered.clone()),
    };
    let integral_len = unsigned.find('.').unwrap_or(unsigned.len());
    let mut padded = if integral_len < min_integral {
        format!("{}{unsigned}", "0".repeat(min_integral - integral_len))
    } else {
        unsigned
    };
    if min_integral == 0 && padded.starts_with("0.") {
        padded.remove(0);
    }
    let body = if integral_pattern.contains(',') {
        group_thousands(&padded)
    } else {
        padded
    };
    Ok(format!("{sign}{body}"))
}

/// Translates the common .NET date tokens into a `chrono` pattern.
fn date_pattern(spec: &str) -> String {
    match spec {
        "d" => return "%m/%d/%Y".to_string(),
        "t" => return "%H:%M".to_string(),
        "T" => return "%H:%M:%S".to_string(),
        "D" => return "%A, %d %B %Y".to_string(),
        _ => {}
    }
    spec.replace("yyyy", "%Y")
        .replace("MM", "%m")
        .replace("dd", "%d")
        .replace("HH", "%H")
        .replace("mm", "%M")
        .replace("ss", "%S")
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::Null => write!(f, "null"),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::Int(n) => write!(f, "{n}"),
            ValueKind::Double(n) => write!(f, "{n:?}"),
            ValueKind::Char(c) => write!(f, "{c:?}"),
            ValueKind::String(s) => write!(f, "{s:?}"),
            ValueKind::Array(values) => f.debug_list().entries(values.borrow().iter()).finish(),
            ValueKind::Date(date) => write!(f, "{date}"),
            ValueKind::KeyInfo(key) => write!(f, "KeyInfo({key:?})"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::Null => Ok(()),
            ValueKind::Bool(true) => write!(f, "True"),
            ValueKind::Bool(false) => write!(f, "False"),
            ValueKind::Int(n) => write!(f, "{n}"),
            ValueKind::Double(n) => write!(f, "{}", format_double(*n)),
            ValueKind::Char(c) => write!(f, "{c}"),
            ValueKind::String(s) => write!(f, "{s}"),
            ValueKind::Array(values) => {
                for (idx, value) in values.borrow().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{value}")?;
                }
                Ok(())
            }
            ValueKind::Date(date) => write!(f, "{}", date.format("%m/%d/%Y %H:%M:%S")),
            ValueKind::KeyInfo(_) => write!(f, "System.ConsoleKeyInfo"),
        }
    }
}

pub enum ValueKind {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Char(char),
    String(String),
    /// Arrays are shared by reference, as in C#.
    Array(RefCell<Vec<Value>>),
    Date(NaiveDateTime),
    KeyInfo(char),
}
