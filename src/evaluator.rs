use crate::{
    ast::{AssignOp, BinaryOp, Expr, ExprKind, Literal, LogicalOp, Segment, TypeName, UnaryOp},
    console::Console,
    diagnostics::{Diagnostic, Result, SharplingError, SourceSpan},
    runtime::{unbound, Interpreter},
    stack::ensure_sufficient_stack,
    stdlib,
    value::{align, Value, ValueKind},
};

impl<C: Console> Interpreter<C> {
    pub(crate) fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        ensure_sufficient_stack(|| self.evaluate_expr(expr))
    }

    fn evaluate_expr(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::Int(n) => Value::int(*n),
                Literal::Double(n) => Value::double(*n),
                Literal::Char(c) => Value::char(*c),
                Literal::String(s) => Value::string(s.clone()),
                Literal::Bool(b) => Value::bool(*b),
                Literal::Null => Value::null(),
            }),
            ExprKind::Interpolated(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(text) => out.push_str(text),
                        Segment::Hole {
                            expr,
                            alignment,
                            format,
                        } => {
                            let value = self.evaluate(expr)?;
                            let text = match format {
                                Some(spec) => value
                                    .format_with(spec)
                                    .map_err(|diag| diag.or_span(expr.span))?,
                                None => value.to_string(),
                            };
                            out.push_str(&align(text, *alignment).map_err(|diag| diag.or_span(expr.span))?);
                        }
                    }
                }
                Ok(Value::string(out))
            }
            ExprKind::Variable(name) => Ok(self.scopes.get(self.frame, name, expr.span)?),
            ExprKind::Unary { op, expr: operand } => {
                let value = self.evaluate(operand)?;
                unary(*op, &value).ok_or_else(|| {
                    Diagnostic::runtime(format!(
                        "operator `{}` cannot be applied to operand of type `{}`",
                        match op {
                            UnaryOp::Negate => "-",
                            UnaryOp::Plus => "+",
                            UnaryOp::Not => "!",
                        },
                        value.type_name()
                    ))
                    .with_span(expr.span)
                    .into()
                })
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                Ok(binary(*op, &left, &right).map_err(|diag| diag.or_span(expr.span))?)
            }
            ExprKind::Logical { op, left, right } => {
                let left_value = self.evaluate(left)?.expect_bool(left.span)?;
                let short_circuit = match op {
                    LogicalOp::And => !left_value,
                    LogicalOp::Or => left_value,
                };
                if short_circuit {
                    return Ok(Value::bool(left_value));
                }
                Ok(Value::bool(self.evaluate(right)?.expect_bool(right.span)?))
            }
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.expect_bool(condition.span)? {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }
            ExprKind::Coalesce { value, fallback } => {
                let value = self.evaluate(value)?;
                if value.is_null() {
                    self.evaluate(fallback)
                } else {
                    Ok(value)
                }
            }
            ExprKind::Cast { ty, expr: operand } => {
                let value = self.evaluate(operand)?;
                Ok(cast(ty, value).map_err(|diag| diag.or_span(expr.span))?)
            }
            ExprKind::Builtin { name, args } => {
                let builtin = stdlib::lookup(name).ok_or_else(|| {
                    Diagnostic::unsupported(format!("`{name}` is not available"))
                        .with_span(expr.span)
                })?;
                let values = self.evaluate_all(args)?;
                builtin
                    .call(&mut self.console, &values)
                    .map_err(|err| with_span(err, expr.span))
            }
            ExprKind::Property { target, name } => {
                let value = self.evaluate(target)?;
                stdlib::property(&value, name).map_err(|err| with_span(err, expr.span))
            }
            ExprKind::Method { target, name, args } => {
                let value = self.evaluate(target)?;
                let values = self.evaluate_all(args)?;
                stdlib::call_method(&value, name, &values).map_err(|err| with_span(err, expr.span))
            }
            ExprKind::Index { target, index } => {
                let target = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                Ok(index_value(&target, &index).map_err(|diag| diag.or_span(expr.span))?)
            }
            ExprKind::ArrayLiteral(elements) => Ok(Value::array(self.evaluate_all(elements)?)),
            ExprKind::NewArray { element, size } => {
                let size_value = self.evaluate(size)?;
                let length = size_value
                    .as_i64()
                    .ok_or_else(|| {
                        Diagnostic::runtime(format!(
                            "cannot implicitly convert type `{}` to `int`",
                            size_value.type_name()
                        ))
                        .with_span(size.span)
                    })
                    .and_then(|n| {
                        usize::try_from(n).map_err(|_| {
                            Diagnostic::runtime("Arithmetic operation resulted in an overflow.")
                                .with_span(size.span)
                        })
                    })?;
                let fill = if element.rank > 0 {
                    Value::null()
                } else {
                    Value::default_for(&element.name)
                };
                Ok(Value::array(vec![fill; length]))
            }
            ExprKind::Assign { target, op, value } => {
                let value = self.evaluate(value)?;
                self.assign_to(target, *op, value)
            }
            ExprKind::Increment {
                target,
                delta,
                prefix,
            } => {
                let old = self.evaluate(target)?;
                let new = step(&old, *delta).ok_or_else(|| {
                    Diagnostic::runtime(format!(
                        "operator `{}` cannot be applied to operand of type `{}`",
                        if *delta > 0 { "++" } else { "--" },
                        old.type_name()
                    ))
                    .with_span(expr.span)
                })?;
                self.store(target, new.clone())?;
                Ok(if *prefix { new } else { old })
            }
            ExprKind::UserCall(call) => {
                if self.functions.contains_key(&call.name) {
                    Err(Diagnostic::unsupported(format!(
                        "call to `{}` must be a whole statement or the entire right-hand side of a declaration, assignment or return",
                        call.name
                    ))
                    .with_span(call.span)
                    .with_note("store the result in a variable first")
                    .into())
                } else if let Some(builtin) = self.imported_builtin(&call.name) {
                    self.call_imported(builtin, call)
                } else {
                    Err(unbound(&call.name, call.span).into())
                }
            }
        }
    }

    fn evaluate_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>> {
        exprs.iter().map(|expr| self.evaluate(expr)).collect()
    }

    /// Applies `target op= value` and returns the stored value.
    pub(crate) fn assign_to(&mut self, target: &Expr, op: AssignOp, value: Value) -> Result<Value> {
        let value = match op.binary() {
            None => value,
            Some(bin) => {
                let current = self.evaluate(target)?;
                binary(bin, &current, &value).map_err(|diag| diag.or_span(target.span))?
            }
        };
        self.store(target, value)
    }

    fn store(&mut self, target: &Expr, value: Value) -> Result<Value> {
        match &target.kind {
            ExprKind::Variable(name) => {
                self.scopes.assign(self.frame, name, value, target.span)?;
                Ok(self.scopes.get(self.frame, name, target.span)?)
            }
            ExprKind::Index {
                target: container,
                index,
            } => {
                let container_value = self.evaluate(container)?;
                let index_value = self.evaluate(index)?;
                match container_value.kind() {
                    ValueKind::Array(items) => {
                        let mut items = items.borrow_mut();
                        let slot = position(&index_value, items.len())
                            .map_err(|diag| diag.or_span(target.span))?;
                        items[slot] = value.clone();
                        Ok(value)
                    }
                    ValueKind::String(_) => Err(Diagnostic::runtime(
                        "property or indexer `string.this[int]` cannot be assigned to, it is read only",
                    )
                    .with_span(target.span)
                    .into()),
                    ValueKind::Null => Err(null_reference(target.span)),
                    _ => Err(not_indexable(&container_value, target.span)),
                }
            }
            _ => Err(Diagnostic::unsupported("only variables and array elements can be assigned")
                .with_span(target.span)
                .into()),
        }
    }
}

fn with_span(err: SharplingError, span: SourceSpan) -> SharplingError {
    match err {
        SharplingError::Diagnostic(diag) => SharplingError::Diagnostic(diag.or_span(span)),
        other => other,
    }
}

const NULL_REFERENCE: &str = "Object reference not set to an instance of an object.";

fn null_reference(span: SourceSpan) -> SharplingError {
    Diagnostic::runtime(NULL_REFERENCE).with_span(span).into()
}

fn not_indexable(value: &Value, span: SourceSpan) -> SharplingError {
    Diagnostic::runtime(format!(
        "cannot apply indexing with [] to an expression of type `{}`",
        value.type_name()
    ))
    .with_span(span)
    .into()
}

fn unary(op: UnaryOp, value: &Value) -> Option<Value> {
    match (op, value.kind()) {
        (UnaryOp::Not, ValueKind::Bool(b)) => Some(Value::bool(!b)),
        (UnaryOp::Negate, ValueKind::Double(n)) => Some(Value::double(-n)),
        (UnaryOp::Negate, ValueKind::Int(_) | ValueKind::Char(_)) => {
            Some(Value::int(value.as_i64()?.wrapping_neg()))
        }
        (UnaryOp::Plus, ValueKind::Double(_)) => Some(value.clone()),
        (UnaryOp::Plus, ValueKind::Int(_) | ValueKind::Char(_)) => Some(Value::int(value.as_i64()?)),
        _ => None,
    }
}

/// `++`/`--`: ints and doubles keep their kind, chars step through code points.
fn step(value: &Value, delta: i64) -> Option<Value> {
    match value.kind() {
        ValueKind::Int(n) => Some(Value::int(n.wrapping_add(delta))),
        ValueKind::Double(n) => Some(Value::double(n + delta as f64)),
        ValueKind::Char(c) => {
            let code = i64::from(u32::from(*c)) + delta;
            u32::try_from(code).ok().and_then(char::from_u32).map(Value::char)
        }
        _ => None,
    }
}

pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> std::result::Result<Value, Diagnostic> {
    match op {
        BinaryOp::Equal => return Ok(Value::bool(left.strict_eq(right))),
        BinaryOp::NotEqual => return Ok(Value::bool(!left.strict_eq(right))),
        BinaryOp::Add
            if matches!(left.kind(), ValueKind::String(_))
                || matches!(right.kind(), ValueKind::String(_)) =>
        {
            return Ok(Value::string(format!("{left}{right}")));
        }
        _ => {}
    }

    let mismatch = || {
        Diagnostic::runtime(format!(
            "operator `{}` cannot be applied to operands of type `{}` and `{}`",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))
    };

    let integral = |value: &Value| match value.kind() {
        ValueKind::Int(_) | ValueKind::Char(_) => value.as_i64(),
        _ => None,
    };
    if let (Some(a), Some(b)) = (integral(left), integral(right)) {
        return match op {
            BinaryOp::Add => Ok(Value::int(a.wrapping_add(b))),
            BinaryOp::Sub => Ok(Value::int(a.wrapping_sub(b))),
            BinaryOp::Mul => Ok(Value::int(a.wrapping_mul(b))),
            BinaryOp::Div | BinaryOp::Mod if b == 0 => {
                Err(Diagnostic::runtime("Attempted to divide by zero."))
            }
            BinaryOp::Div => Ok(Value::int(a.wrapping_div(b))),
            BinaryOp::Mod => Ok(Value::int(a.wrapping_rem(b))),
            BinaryOp::Less => Ok(Value::bool(a < b)),
            BinaryOp::LessEqual => Ok(Value::bool(a <= b)),
            BinaryOp::Greater => Ok(Value::bool(a > b)),
            BinaryOp::GreaterEqual => Ok(Value::bool(a >= b)),
            BinaryOp::Equal | BinaryOp::NotEqual => Err(mismatch()),
        };
    }

    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(mismatch());
    };
    match op {
        BinaryOp::Add => Ok(Value::double(a + b)),
        BinaryOp::Sub => Ok(Value::double(a - b)),
        BinaryOp::Mul => Ok(Value::double(a * b)),
        BinaryOp::Div => Ok(Value::double(a / b)),
        BinaryOp::Mod => Ok(Value::double(a % b)),
        BinaryOp::Less => Ok(Value::bool(a < b)),
        BinaryOp::LessEqual => Ok(Value::bool(a <= b)),
        BinaryOp::Greater => Ok(Value::bool(a > b)),
        BinaryOp::GreaterEqual => Ok(Value::bool(a >= b)),
        BinaryOp::Equal | BinaryOp::NotEqual => Err(mismatch()),
    }
}

/// Explicit conversion `(type)value`.
fn cast(ty: &TypeName, value: Value) -> std::result::Result<Value, Diagnostic> {
    if ty.rank > 0 {
        return Ok(value);
    }
    let invalid = || {
        Diagnostic::runtime(format!(
            "cannot convert type `{}` to `{}`",
            value.type_name(),
            ty.name
        ))
    };
    match ty.name.as_str() {
        "int" | "long" | "short" | "byte" => {
            let whole = match value.kind() {
                ValueKind::Int(n) => *n,
                ValueKind::Char(c) => i64::from(u32::from(*c)),
                ValueKind::Double(n) => n.trunc() as i64,
                _ => return Err(invalid()),
            };
            let narrowed = match ty.name.as_str() {
                "int" => i64::from(whole as i32),
                "short" => i64::from(whole as i16),
                "byte" => i64::from(whole as u8),
                _ => whole,
            };
            Ok(Value::int(narrowed))
        }
        "double" | "float" | "decimal" => value
            .as_f64()
            .map(Value::double)
            .ok_or_else(invalid),
        "char" => match value.kind() {
            ValueKind::Char(_) => Ok(value.clone()),
            ValueKind::Int(n) => u32::try_from(*n)
                .ok()
                .and_then(char::from_u32)
                .map(Value::char)
                .ok_or_else(invalid),
            _ => Err(invalid()),
        },
        "string" => match value.kind() {
            ValueKind::String(_) | ValueKind::Null => Ok(value.clone()),
            _ => Err(invalid()),
        },
        "bool" => match value.kind() {
            ValueKind::Bool(_) => Ok(value.clone()),
            _ => Err(invalid()),
        },
        _ => Ok(value.clone()),
    }
}

fn position(index: &Value, len: usize) -> std::result::Result<usize, Diagnostic> {
    let Some(index) = index.as_i64() else {
        return Err(Diagnostic::runtime(format!(
            "cannot implicitly convert type `{}` to `int`",
            index.type_name()
        )));
    };
    usize::try_from(index)
        .ok()
        .filter(|idx| *idx < len)
        .ok_or_else(|| Diagnostic::runtime("Index was outside the bounds of the array."))
}

fn index_value(target: &Value, index: &Value) -> std::result::Result<Value, Diagnostic> {
    match target.kind() {
        ValueKind::Array(items) => {
            let items = items.borrow();
            let slot = position(index, items.len())?;
            Ok(items[slot].clone())
        }
        ValueKind::String(text) => {
            let chars: Vec<char> = text.chars().collect();
            let slot = position(index, chars.len())?;
            Ok(Value::char(chars[slot]))
        }
        ValueKind::Null => Err(Diagnostic::runtime(NULL_REFERENCE)),
        _ => Err(Diagnostic::runtime(format!(
            "cannot apply indexing with [] to an expression of type `{}`",
            target.type_name()
        ))),
    }
}
