use crate::compiler::lexer::Span;

/// A sequence of expressions; the value of the last one is the value of the
/// block. A whole program is a block.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub exprs: Vec<Expr>,
    pub span: Span,
}

/// A function definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FnDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub span: Span,
}

/// One `handle effect(param) { ... }` clause of a `try`.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleClause {
    pub effect: String,
    pub param: String,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    /// `nil`
    Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident {
        name: String,
        span: Span,
    },
    Literal {
        value: Literal,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    /// `target = value`. Only identifier targets compile.
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
        span: Span,
    },
    FnDef(FnDef),
    Block(Block),
    If {
        condition: Box<Expr>,
        then_block: Block,
        /// Either another `If` or a `Block`.
        else_branch: Option<Box<Expr>>,
        span: Span,
    },
    While {
        condition: Box<Expr>,
        body: Block,
        span: Span,
    },
    Try {
        body: Block,
        handlers: Vec<HandleClause>,
        span: Span,
    },
    Do {
        effect: String,
        payload: Option<Box<Expr>>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Ident { span, .. }
            | Expr::Literal { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Call { span, .. }
            | Expr::Assign { span, .. }
            | Expr::If { span, .. }
            | Expr::While { span, .. }
            | Expr::Try { span, .. }
            | Expr::Do { span, .. } => *span,
            Expr::FnDef(def) => def.span,
            Expr::Block(block) => block.span,
        }
    }

    /// Short description used in compile errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Ident { .. } => "identifier",
            Expr::Literal { .. } => "literal",
            Expr::Binary { .. } => "binary expression",
            Expr::Unary { .. } => "unary expression",
            Expr::Call { .. } => "call",
            Expr::Assign { .. } => "assignment",
            Expr::FnDef(_) => "function definition",
            Expr::Block(_) => "block",
            Expr::If { .. } => "if expression",
            Expr::While { .. } => "while loop",
            Expr::Try { .. } => "try expression",
            Expr::Do { .. } => "do expression",
        }
    }
}
