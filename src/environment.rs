use indexmap::IndexMap;

use crate::{
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    value::{Value, ValueKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameId(usize);

/// Numeric category a binding was declared with; assignments convert into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Any,
    Integral,
    Floating,
}

impl Slot {
    pub fn for_type(type_name: &str, rank: usize) -> Self {
        if rank > 0 {
            return Slot::Any;
        }
        match type_name {
            "int" | "long" | "short" | "byte" | "Int32" | "Int64" => Slot::Integral,
            "double" | "float" | "decimal" | "Double" | "Single" | "Decimal" => Slot::Floating,
            _ => Slot::Any,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Slot::Any => "object",
            Slot::Integral => "int",
            Slot::Floating => "double",
        }
    }

    pub fn coerce(self, value: Value) -> Result<Value, Diagnostic> {
        match (self, value.kind()) {
            (Slot::Any, _) | (Slot::Integral, ValueKind::Int(_)) | (Slot::Floating, ValueKind::Double(_)) => {
                Ok(value)
            }
            (Slot::Floating, ValueKind::Int(_) | ValueKind::Char(_)) => {
                Ok(Value::double(value.as_f64().unwrap_or_default()))
            }
            (Slot::Integral, ValueKind::Char(c)) => Ok(Value::int(i64::from(u32::from(*c)))),
            (Slot::Integral, ValueKind::Double(_)) => Err(Diagnostic::runtime(
                "cannot implicitly convert type `double` to `int`",
            )
            .with_note("use an explicit cast such as `(int)value` or `Convert.ToInt32`")),
            (slot, _) => Err(Diagnostic::runtime(format!(
                "cannot implicitly convert type `{}` to `{}`",
                value.type_name(),
                slot.label()
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
    pub slot: Slot,
}

#[derive(Debug, Default)]
struct Frame {
    parent: Option<FrameId>,
    bindings: IndexMap<String, Binding>,
}

/// Arena of scope frames. Frames are entered and left in LIFO order, so
/// leaving a frame truncates the arena back to it.
#[derive(Debug)]
pub struct Scopes {
    frames: Vec<Frame>,
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

impl Scopes {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    pub fn root(&self) -> FrameId {
        FrameId(0)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self, parent: FrameId) -> FrameId {
        self.frames.push(Frame {
            parent: Some(parent),
            bindings: IndexMap::new(),
        });
        FrameId(self.frames.len() - 1)
    }

    /// Drops `frame` and every frame entered after it. The root frame is kept.
    pub fn pop(&mut self, frame: FrameId) {
        self.frames.truncate(frame.0.max(1));
    }

    pub fn define(&mut self, frame: FrameId, name: impl Into<String>, binding: Binding) {
        if let Some(scope) = self.frames.get_mut(frame.0) {
            scope.bindings.insert(name.into(), binding);
        }
    }

    fn resolve(&self, frame: FrameId, name: &str) -> Option<FrameId> {
        let mut cursor = Some(frame);
        while let Some(id) = cursor {
            let scope = self.frames.get(id.0)?;
            if scope.bindings.contains_key(name) {
                return Some(id);
            }
            cursor = scope.parent;
        }
        None
    }

    pub fn contains(&self, frame: FrameId, name: &str) -> bool {
        self.resolve(frame, name).is_some()
    }

    pub fn get(&self, frame: FrameId, name: &str, span: SourceSpan) -> Result<Value, Diagnostic> {
        self.resolve(frame, name)
            .and_then(|owner| self.frames[owner.0].bindings.get(name))
            .map(|binding| binding.value.clone())
            .ok_or_else(|| unbound(name, span))
    }

    /// Updates the frame that owns `name`, converting into its declared slot.
    pub fn assign(
        &mut self,
        frame: FrameId,
        name: &str,
        value: Value,
        span: SourceSpan,
    ) -> Result<(), Diagnostic> {
        let owner = self.resolve(frame, name).ok_or_else(|| unbound(name, span))?;
        let Some(binding) = self.frames[owner.0].bindings.get_mut(name) else {
            return Err(unbound(name, span));
        };
        if !binding.mutable {
            return Err(Diagnostic::runtime(format!(
                "cannot assign to constant `{name}`"
            ))
            .with_span(span));
        }
        binding.value = binding.slot.coerce(value).map_err(|diag| diag.or_span(span))?;
        Ok(())
    }

    /// Names visible from `frame`, innermost first.
    pub fn visible_names(&self, frame: FrameId) -> Vec<String> {
        let mut names = Vec::new();
        let mut cursor = Some(frame);
        while let Some(id) = cursor {
            let Some(scope) = self.frames.get(id.0) else {
                break;
            };
            for name in scope.bindings.keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            cursor = scope.parent;
        }
        names
    }
}

fn unbound(name: &str, span: SourceSpan) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::UnboundVariable,
        format!("the name `{name}` does not exist in the current context"),
    )
    .with_span(span)
}
