//! Abstract syntax tree for the restricted code-evaluation grammar.
//!
//! The tree is a plain enum, not a trait-object graph: evaluation is a
//! recursive tree-walk, and control flow (`return`/`break`/`continue`/the
//! final-answer sentinel) is modeled as ordinary enum variants threaded
//! through `Result`, never as Rust panics or exceptions.

#[derive(Debug, Clone)]
pub enum Expr {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// An f-string: alternating literal and expression parts, concatenated.
    FString(Vec<FStringPart>),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CompareOp>,
        comparators: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    /// `[expr for target in iter if cond]`
    ListComp {
        element: Box<Expr>,
        target: String,
        iter: Box<Expr>,
        condition: Option<Box<Expr>>,
    },
    /// `{key: value for target in iter if cond}`
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        target: String,
        iter: Box<Expr>,
        condition: Option<Box<Expr>>,
    },
    Tuple(Vec<Expr>),
    /// `{expr, ...}` — evaluates to a [`super::value::Value::List`]; the
    /// sandbox does not model a distinct set type, so membership/order
    /// semantics are list semantics, not set semantics.
    Set(Vec<Expr>),
    /// `{expr for target in iter if cond}`, same list-backed simplification
    /// as [`Expr::Set`].
    SetComp {
        element: Box<Expr>,
        target: String,
        iter: Box<Expr>,
        condition: Option<Box<Expr>>,
    },
    /// `body if test else orelse`
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    /// Awaits `inner`; a no-op at evaluation time since every tool
    /// invocation is already awaited regardless of this wrapper.
    Await(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum FStringPart {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
}

/// An assignment target: a plain name, an attribute path, or a subscript.
#[derive(Debug, Clone)]
pub enum Target {
    Name(String),
    Subscript { value: Expr, index: Expr },
    /// `a, b = ...` destructuring
    Tuple(Vec<Target>),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Assign {
        target: Target,
        value: Expr,
    },
    AugAssign {
        target: Target,
        op: BinaryOp,
        value: Expr,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    FunctionDef(std::sync::Arc<FunctionDef>),
    Return(Option<Expr>),
    Break,
    Continue,
    Pass,
    /// `raise expr` / bare `raise`. A call-style expression like
    /// `ValueError("bad")` naming an undefined callable is rendered as
    /// `"ValueError: bad"` rather than failing as an undefined name — that
    /// string is what an `except` clause matches against.
    Raise(Option<Expr>),
    Assert {
        test: Expr,
        message: Option<Expr>,
    },
    Import {
        module: String,
        alias: Option<String>,
    },
    ImportFrom {
        module: String,
        names: Vec<(String, Option<String>)>,
    },
    /// `final_answer(expr)` — not a reserved keyword in the grammar, but
    /// recognized by the parser as a call to the sentinel name so it can
    /// short-circuit the step without treating it as a generic function call.
    FinalAnswer(Expr),
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    /// `with expr as name: body` — single context manager, no nesting via
    /// comma-separated items. `__enter__`/`__exit__` are not modeled: the
    /// context expression's value is bound directly as `name`, and `body`
    /// always runs once with no suppression of exceptions by `__exit__`.
    With {
        context: Expr,
        binding: Option<String>,
        body: Vec<Stmt>,
    },
}

/// One `except [Type [as name]]:` clause. `exc_type` is matched against the
/// raised error's display name by substring (the sandbox has no real
/// exception class hierarchy); `None` matches anything, like a bare `except:`.
#[derive(Debug, Clone)]
pub struct ExceptHandler {
    pub exc_type: Option<String>,
    pub binding: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub defaults: Vec<(String, Expr)>,
    pub body: Vec<Stmt>,
    pub is_async: bool,
}
