use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    ast::{ConsoleOp, Expr, Invocation, Operand, Stmt, StmtKind, SwitchSection},
    config::RunConfig,
    console::Console,
    declarations::{self, Entry, FunctionDef, Program},
    diagnostics::{Diagnostic, DiagnosticKind, Result, SharplingError, SourceSpan},
    environment::{Binding, FrameId, Scopes, Slot},
    parser,
    stack::ensure_sufficient_stack,
    stdlib::{self, NativeFunction},
    value::{Value, ValueKind},
};

#[derive(Debug)]
pub enum RunOutcome {
    /// Every statement ran; `value` is what a top-level `return` produced.
    Completed { value: Option<Value> },
    /// A fatal diagnostic stopped the run. Output written before it is kept.
    Aborted(Diagnostic),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

#[derive(Debug)]
pub enum CallOutcome {
    /// The body ran to its end without `return`.
    Completed,
    /// `return;`
    ReturnedVoid,
    Returned(Value),
}

impl CallOutcome {
    /// Value seen by a caller: functions that return nothing yield null.
    pub fn into_value(self) -> Value {
        match self {
            CallOutcome::Returned(value) => value,
            CallOutcome::Completed | CallOutcome::ReturnedVoid => Value::null(),
        }
    }
}

pub(crate) enum Flow {
    Next,
    Return(Option<Value>),
    Break,
    Continue,
}

pub struct Interpreter<C: Console> {
    pub(crate) console: C,
    config: RunConfig,
    /// Text every span refers to: the program, or the REPL session so far.
    source: String,
    pub(crate) functions: IndexMap<String, Rc<FunctionDef>>,
    static_imports: Vec<String>,
    pub(crate) scopes: Scopes,
    pub(crate) frame: FrameId,
    depth: usize,
}

impl<C: Console> Interpreter<C> {
    pub fn new(console: C) -> Self {
        Self::with_config(console, RunConfig::default())
    }

    pub fn with_config(console: C, config: RunConfig) -> Self {
        let scopes = Scopes::new();
        let frame = scopes.root();
        Self {
            console,
            config,
            source: String::new(),
            functions: IndexMap::new(),
            static_imports: Vec::new(),
            scopes,
            frame,
            depth: 0,
        }
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn into_console(self) -> C {
        self.console
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Forgets every function and variable of the session.
    pub fn reset(&mut self) {
        self.source.clear();
        self.functions.clear();
        self.static_imports.clear();
        self.scopes = Scopes::new();
        self.frame = self.scopes.root();
        self.depth = 0;
    }

    /// Runs a complete program against fresh state.
    ///
    /// Bracket mismatches and a missing entry point are returned as errors
    /// before anything is written to the console.
    pub fn run(&mut self, source: &str) -> Result<RunOutcome> {
        self.reset();
        self.source.push_str(source);
        let program = declarations::extract(&self.source)?;
        tracing::debug!(
            bytes = source.len(),
            functions = program.functions.len(),
            "starting run"
        );
        let outcome = self.execute_program(program)?;
        tracing::debug!(completed = outcome.is_completed(), "run finished");
        Ok(outcome)
    }

    /// Runs `snippet` on top of the current session: its functions are
    /// added and its statements run in the root frame.
    pub fn execute_snippet(&mut self, snippet: &str) -> Result<RunOutcome> {
        let start = self.source.len();
        self.source.push_str(snippet);
        self.source.push('\n');
        let span = SourceSpan::new(start, self.source.len());
        let program = declarations::extract_fragment(&self.source, span)?;
        self.execute_program(program)
    }

    pub fn evaluate_source(&mut self, expression: &str) -> Result<Value> {
        let expr = parser::parse_expression(expression)?;
        self.evaluate(&expr)
    }

    pub fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<CallOutcome> {
        let function = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| unbound(name, SourceSpan::default()))?;
        self.call(&function, args, function.span)
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.scopes
            .get(self.scopes.root(), name, SourceSpan::default())
            .ok()
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    pub fn visible_names(&self) -> Vec<String> {
        self.scopes.visible_names(self.frame)
    }

    fn execute_program(&mut self, program: Program) -> Result<RunOutcome> {
        let Program {
            functions,
            initializers,
            entry,
            static_imports,
        } = program;
        self.functions.extend(functions);
        for owner in static_imports {
            if !self.static_imports.contains(&owner) {
                self.static_imports.push(owner);
            }
        }
        self.frame = self.scopes.root();
        match self.execute_entry(&initializers, entry.as_ref()) {
            Ok(value) => Ok(RunOutcome::Completed { value }),
            Err(SharplingError::Diagnostic(diag)) => {
                if !diag.fatal {
                    self.report(&diag)?;
                }
                tracing::debug!(error = %diag, "run aborted");
                Ok(RunOutcome::Aborted(diag))
            }
            Err(err) => Err(err),
        }
    }

    fn execute_entry(&mut self, initializers: &[Stmt], entry: Option<&Entry>) -> Result<Option<Value>> {
        if let Some(value) = top_level(self.execute_block(initializers)?)? {
            return Ok(value);
        }
        match entry {
            None => Ok(None),
            Some(Entry::Statements(stmts)) => {
                Ok(top_level(self.execute_block(stmts)?)?.flatten())
            }
            Some(Entry::Main(main)) => {
                let args = if main.params.is_empty() {
                    Vec::new()
                } else {
                    vec![Value::array(Vec::new())]
                };
                match self.call(main, args, main.span)? {
                    CallOutcome::Returned(value) => Ok(Some(value)),
                    CallOutcome::Completed | CallOutcome::ReturnedVoid => Ok(None),
                }
            }
        }
    }

    /// Runs statements in order. A non-fatal failure is written to the
    /// console and execution continues with the next statement; fatal
    /// diagnostics and I/O errors propagate.
    pub(crate) fn execute_block(&mut self, stmts: &[Stmt]) -> Result<Flow> {
        for stmt in stmts {
            match self.execute(stmt) {
                Ok(Flow::Next) => {}
                Ok(flow) => return Ok(flow),
                Err(SharplingError::Diagnostic(diag)) if !diag.fatal => {
                    self.report(&diag.or_span(stmt.span))?;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(Flow::Next)
    }

    /// Runs `body` in a fresh frame whose parent is `parent`.
    pub(crate) fn in_frame<T>(
        &mut self,
        parent: FrameId,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let frame = self.scopes.push(parent);
        let prev = std::mem::replace(&mut self.frame, frame);
        let result = body(self);
        self.frame = prev;
        self.scopes.pop(frame);
        result
    }

    fn nested_block(&mut self, stmts: &[Stmt]) -> Result<Flow> {
        let parent = self.frame;
        self.in_frame(parent, |this| this.execute_block(stmts))
    }

    fn report(&mut self, diag: &Diagnostic) -> Result<()> {
        let line = diag.render_line(&self.source);
        tracing::debug!(kind = diag.kind.label(), message = %diag.message, "reporting diagnostic");
        self.console.write_line(&line)?;
        Ok(())
    }

    fn execute(&mut self, stmt: &Stmt) -> Result<Flow> {
        ensure_sufficient_stack(|| self.execute_stmt(stmt))
    }

    fn execute_stmt(&mut self, stmt: &Stmt) -> Result<Flow> {
        tracing::trace!(start = stmt.span.start, end = stmt.span.end, "executing statement");
        match &stmt.kind {
            StmtKind::Declare {
                ty,
                constant,
                declarators,
            } => {
                for declarator in declarators {
                    let value = match &declarator.initializer {
                        Some(operand) => self.operand(operand)?,
                        None if ty.rank > 0 => Value::null(),
                        None => Value::default_for(&ty.name),
                    };
                    let slot = if ty.is_var() {
                        Slot::for_type(value.type_name(), 0)
                    } else {
                        Slot::for_type(&ty.name, ty.rank)
                    };
                    let value = slot
                        .coerce(value)
                        .map_err(|diag| diag.or_span(declarator.span))?;
                    self.scopes.define(
                        self.frame,
                        declarator.name.clone(),
                        Binding {
                            value,
                            mutable: !constant,
                            slot,
                        },
                    );
                }
                Ok(Flow::Next)
            }
            StmtKind::Console { op, args } => {
                self.console_statement(*op, args)?;
                Ok(Flow::Next)
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.condition(condition)? {
                    self.nested_block(then_branch)
                } else if let Some(branch) = else_branch {
                    self.nested_block(branch)
                } else {
                    Ok(Flow::Next)
                }
            }
            StmtKind::For {
                init,
                condition,
                step,
                body,
            } => {
                let parent = self.frame;
                self.in_frame(parent, |this| {
                    for stmt in init {
                        this.execute(stmt)?;
                    }
                    loop {
                        if let Some(condition) = condition {
                            if !this.condition(condition)? {
                                break;
                            }
                        }
                        match this.nested_block(body)? {
                            Flow::Break => break,
                            Flow::Return(value) => return Ok(Flow::Return(value)),
                            Flow::Next | Flow::Continue => {}
                        }
                        for expr in step {
                            this.evaluate(expr)?;
                        }
                    }
                    Ok(Flow::Next)
                })
            }
            StmtKind::Foreach {
                ty,
                binding,
                collection,
                body,
            } => {
                let items = self.foreach_items(collection)?;
                let slot = Slot::for_type(&ty.name, ty.rank);
                for item in items {
                    let value = slot.coerce(item).map_err(|diag| diag.or_span(stmt.span))?;
                    let parent = self.frame;
                    let flow = self.in_frame(parent, |this| {
                        this.scopes.define(
                            this.frame,
                            binding.clone(),
                            Binding {
                                value,
                                mutable: false,
                                slot,
                            },
                        );
                        this.execute_block(body)
                    })?;
                    match flow {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Next | Flow::Continue => {}
                    }
                }
                Ok(Flow::Next)
            }
            StmtKind::While { condition, body } => {
                while self.condition(condition)? {
                    match self.nested_block(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Next | Flow::Continue => {}
                    }
                }
                Ok(Flow::Next)
            }
            StmtKind::DoWhile { body, condition } => {
                loop {
                    match self.nested_block(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Next | Flow::Continue => {}
                    }
                    if !self.condition(condition)? {
                        break;
                    }
                }
                Ok(Flow::Next)
            }
            StmtKind::Switch { subject, sections } => {
                let subject = self.evaluate(subject)?;
                let Some(section) = self.select_section(&subject, sections)? else {
                    return Ok(Flow::Next);
                };
                match self.nested_block(&section.body)? {
                    Flow::Break | Flow::Next => Ok(Flow::Next),
                    flow => Ok(flow),
                }
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(operand) => Some(self.operand(operand)?),
                    None => None,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Invoke(call) => {
                self.invoke(call)?;
                Ok(Flow::Next)
            }
            StmtKind::Assign { target, op, value } => {
                let value = self.operand(value)?;
                self.assign_to(target, *op, value)?;
                Ok(Flow::Next)
            }
            StmtKind::Expr(expr) => {
                self.evaluate(expr)?;
                Ok(Flow::Next)
            }
            StmtKind::Block(stmts) => self.nested_block(stmts),
            StmtKind::Invalid(diag) => {
                if diag.fatal {
                    self.report(diag)?;
                }
                Err(diag.clone().into())
            }
        }
    }

    fn condition(&mut self, expr: &Expr) -> Result<bool> {
        Ok(self.evaluate(expr)?.expect_bool(expr.span)?)
    }

    fn console_statement(&mut self, op: ConsoleOp, args: &[Expr]) -> Result<()> {
        let values = args
            .iter()
            .map(|arg| self.evaluate(arg))
            .collect::<Result<Vec<_>>>()?;
        match op {
            ConsoleOp::WriteLine => self.console.write_line(&stdlib::console_text(&values)?)?,
            ConsoleOp::Write => self.console.write(&stdlib::console_text(&values)?)?,
            ConsoleOp::ReadLine => {
                self.console.read_line()?;
            }
            ConsoleOp::ReadKey => {
                self.console.read_key()?;
            }
            ConsoleOp::Clear => self.console.clear()?,
        }
        Ok(())
    }

    fn foreach_items(&mut self, collection: &Expr) -> Result<Vec<Value>> {
        let value = self.evaluate(collection)?;
        match value.kind() {
            ValueKind::Array(items) => Ok(items.borrow().clone()),
            ValueKind::String(text) => Ok(text.chars().map(Value::char).collect()),
            ValueKind::Null => Err(Diagnostic::runtime(
                "Object reference not set to an instance of an object.",
            )
            .with_span(collection.span)
            .into()),
            _ => Err(Diagnostic::runtime(format!(
                "foreach statement cannot operate on variables of type `{}`",
                value.type_name()
            ))
            .with_span(collection.span)
            .into()),
        }
    }

    fn select_section<'s>(
        &mut self,
        subject: &Value,
        sections: &'s [SwitchSection],
    ) -> Result<Option<&'s SwitchSection>> {
        let mut fallback = None;
        for section in sections {
            for label in &section.labels {
                match label {
                    Some(label) => {
                        if self.evaluate(label)?.strict_eq(subject) {
                            return Ok(Some(section));
                        }
                    }
                    None => fallback = Some(section),
                }
            }
        }
        Ok(fallback)
    }

    /// Right-hand side of a declaration, assignment or return.
    pub(crate) fn operand(&mut self, operand: &Operand) -> Result<Value> {
        match operand {
            Operand::Expr(expr) => self.evaluate(expr),
            Operand::Call(call) => Ok(self.invoke(call)?.into_value()),
        }
    }

    fn invoke(&mut self, call: &Invocation) -> Result<CallOutcome> {
        let function = match self.functions.get(&call.name).cloned() {
            Some(function) => function,
            None => {
                let builtin = self
                    .imported_builtin(&call.name)
                    .ok_or_else(|| unbound(&call.name, call.span))?;
                return Ok(CallOutcome::Returned(self.call_imported(builtin, call)?));
            }
        };
        let args = call
            .args
            .iter()
            .map(|arg| self.evaluate(arg))
            .collect::<Result<Vec<_>>>()?;
        self.call(&function, args, call.span)
    }

    /// Builtin reachable by its bare name through a `using static` directive.
    pub(crate) fn imported_builtin(&self, name: &str) -> Option<&'static NativeFunction> {
        self.static_imports
            .iter()
            .find_map(|owner| stdlib::lookup(&stdlib::qualified_name(owner, name)))
    }

    pub(crate) fn call_imported(
        &mut self,
        builtin: &NativeFunction,
        call: &Invocation,
    ) -> Result<Value> {
        let args = call
            .args
            .iter()
            .map(|arg| self.evaluate(arg))
            .collect::<Result<Vec<_>>>()?;
        builtin.call(&mut self.console, &args).map_err(|err| match err {
            SharplingError::Diagnostic(diag) => diag.or_span(call.span).into(),
            other => other,
        })
    }

    #[tracing::instrument(level = "debug", skip_all, fields(function = %function.name, depth = self.depth))]
    fn call(
        &mut self,
        function: &Rc<FunctionDef>,
        args: Vec<Value>,
        span: SourceSpan,
    ) -> Result<CallOutcome> {
        ensure_sufficient_stack(|| self.call_in_frame(function, args, span))
    }

    /// Binds parameters in a child of the caller's frame: the body sees the
    /// caller's variables and assignments to them are visible afterwards,
    /// while parameters and locals shadow and are dropped on return.
    fn call_in_frame(
        &mut self,
        function: &Rc<FunctionDef>,
        args: Vec<Value>,
        span: SourceSpan,
    ) -> Result<CallOutcome> {
        if self.depth >= self.config.max_call_depth {
            return Err(Diagnostic::runtime(format!(
                "call depth limit of {} exceeded while calling `{}`",
                self.config.max_call_depth, function.name
            ))
            .with_span(span)
            .with_note("raise it with `--max-call-depth`")
            .into());
        }
        if args.len() > function.params.len() {
            return Err(Diagnostic::runtime(format!(
                "no overload for method `{}` takes {} arguments",
                function.name,
                args.len()
            ))
            .with_span(span)
            .into());
        }

        let caller = self.frame;
        self.depth += 1;
        let flow = self.in_frame(caller, |this| {
            for (idx, param) in function.params.iter().enumerate() {
                let value = match (args.get(idx), &param.default) {
                    (Some(value), _) => value.clone(),
                    (None, Some(default)) => this.evaluate(default)?,
                    (None, None) => continue,
                };
                let slot = Slot::for_type(&param.declared_type.name, param.declared_type.rank);
                let value = slot.coerce(value).map_err(|diag| diag.or_span(span))?;
                this.scopes.define(
                    this.frame,
                    param.name.clone(),
                    Binding {
                        value,
                        mutable: true,
                        slot,
                    },
                );
            }
            this.execute_block(&function.body)
        });
        self.depth -= 1;

        match flow? {
            Flow::Next => Ok(CallOutcome::Completed),
            Flow::Return(None) => Ok(CallOutcome::ReturnedVoid),
            Flow::Return(Some(value)) => {
                let slot = Slot::for_type(&function.return_type.name, function.return_type.rank);
                let value = slot.coerce(value).map_err(|diag| diag.or_span(span))?;
                Ok(CallOutcome::Returned(value))
            }
            Flow::Break | Flow::Continue => Err(stray_jump().with_span(function.span).into()),
        }
    }
}

/// Top-level control flow: `Some(value)` when a `return` ended the block.
fn top_level(flow: Flow) -> Result<Option<Option<Value>>> {
    match flow {
        Flow::Next => Ok(None),
        Flow::Return(value) => Ok(Some(value)),
        Flow::Break | Flow::Continue => Err(stray_jump().into()),
    }
}

fn stray_jump() -> Diagnostic {
    Diagnostic::syntax("no enclosing loop out of which to break or continue")
}

pub(crate) fn unbound(name: &str, span: SourceSpan) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::UnboundVariable,
        format!("the name `{name}` does not exist in the current context"),
    )
    .with_span(span)
}
