use crate::diagnostics::{Diagnostic, SourceSpan};

#[derive(Debug, Clone, PartialEq)]
pub struct TypeName {
    pub name: String,
    /// Number of `[]` suffixes.
    pub rank: usize,
}

impl TypeName {
    pub fn is_var(&self) -> bool {
        self.name == "var" && self.rank == 0
    }
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Declare {
        ty: TypeName,
        constant: bool,
        declarators: Vec<Declarator>,
    },
    Console {
        op: ConsoleOp,
        args: Vec<Expr>,
    },
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    For {
        init: Vec<Stmt>,
        condition: Option<Expr>,
        step: Vec<Expr>,
        body: Vec<Stmt>,
    },
    Foreach {
        ty: TypeName,
        binding: String,
        collection: Expr,
        body: Vec<Stmt>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    DoWhile {
        body: Vec<Stmt>,
        condition: Expr,
    },
    Switch {
        subject: Expr,
        sections: Vec<SwitchSection>,
    },
    Return(Option<Operand>),
    Break,
    Continue,
    Invoke(Invocation),
    Assign {
        target: Expr,
        op: AssignOp,
        value: Operand,
    },
    Expr(Expr),
    Block(Vec<Stmt>),
    /// A unit that failed to parse; executing it reports the diagnostic.
    Invalid(Diagnostic),
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: String,
    pub initializer: Option<Operand>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleOp {
    WriteLine,
    Write,
    ReadLine,
    ReadKey,
    Clear,
}

impl ConsoleOp {
    pub fn from_member(member: &str) -> Option<Self> {
        match member {
            "WriteLine" => Some(ConsoleOp::WriteLine),
            "Write" => Some(ConsoleOp::Write),
            "ReadLine" => Some(ConsoleOp::ReadLine),
            "ReadKey" => Some(ConsoleOp::ReadKey),
            "Clear" => Some(ConsoleOp::Clear),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SwitchSection {
    /// `None` marks the `default` label.
    pub labels: Vec<Option<Expr>>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub name: String,
    pub args: Vec<Expr>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum Operand {
    Expr(Expr),
    Call(Invocation),
}

impl Operand {
    pub fn span(&self) -> SourceSpan {
        match self {
            Operand::Expr(expr) => expr.span,
            Operand::Call(call) => call.span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl AssignOp {
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Interpolated(Vec<Segment>),
    Variable(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// `value ?? fallback`
    Coalesce {
        value: Box<Expr>,
        fallback: Box<Expr>,
    },
    Cast {
        ty: TypeName,
        expr: Box<Expr>,
    },
    /// Builtin library entry keyed by its qualified name, e.g. `Math.Round`.
    Builtin {
        name: String,
        args: Vec<Expr>,
    },
    Property {
        target: Box<Expr>,
        name: String,
    },
    Method {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    ArrayLiteral(Vec<Expr>),
    NewArray {
        element: TypeName,
        size: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        op: AssignOp,
        value: Box<Expr>,
    },
    Increment {
        target: Box<Expr>,
        delta: i64,
        prefix: bool,
    },
    /// User-function call nested inside a larger expression.
    UserCall(Invocation),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Double(f64),
    Char(char),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone)]
pub enum Segment {
    Text(String),
    Hole {
        expr: Expr,
        alignment: Option<i64>,
        format: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}
