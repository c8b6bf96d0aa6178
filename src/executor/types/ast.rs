//! Abstract Syntax Tree node types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Source location span for error reporting and tracebacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    /// Byte offsets into the normalized source
    pub start: usize,
    pub end: usize,
    /// Lines and columns count from zero; columns are in chars
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Smallest span containing both
    pub fn merge(&self, other: &Span) -> Span {
        let first = if self.start <= other.start { self } else { other };
        let last = if self.end >= other.end { self } else { other };
        Span {
            start: first.start,
            end: last.end,
            start_line: first.start_line,
            start_col: first.start_col,
            end_line: last.end_line,
            end_col: last.end_col,
        }
    }

    /// 1-based line number of the first character
    pub fn line_no(&self) -> usize {
        self.start_line + 1
    }
}

/* ===================== Operators ===================== */

/// Arithmetic and bitwise binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "** or pow()",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::LShift => "<<",
            BinOp::RShift => ">>",
        }
    }

    /// Name of the dunder method implementing the operator
    pub fn dunder(&self) -> &'static str {
        match self {
            BinOp::Add => "__add__",
            BinOp::Sub => "__sub__",
            BinOp::Mul => "__mul__",
            BinOp::Div => "__truediv__",
            BinOp::FloorDiv => "__floordiv__",
            BinOp::Mod => "__mod__",
            BinOp::Pow => "__pow__",
            BinOp::BitAnd => "__and__",
            BinOp::BitOr => "__or__",
            BinOp::BitXor => "__xor__",
            BinOp::LShift => "__lshift__",
            BinOp::RShift => "__rshift__",
        }
    }

    /// Name of the reflected dunder method
    pub fn reflected_dunder(&self) -> &'static str {
        match self {
            BinOp::Add => "__radd__",
            BinOp::Sub => "__rsub__",
            BinOp::Mul => "__rmul__",
            BinOp::Div => "__rtruediv__",
            BinOp::FloorDiv => "__rfloordiv__",
            BinOp::Mod => "__rmod__",
            BinOp::Pow => "__rpow__",
            BinOp::BitAnd => "__rand__",
            BinOp::BitOr => "__ror__",
            BinOp::BitXor => "__rxor__",
            BinOp::LShift => "__rlshift__",
            BinOp::RShift => "__rrshift__",
        }
    }

    /// Name of the in-place dunder method used by augmented assignment
    pub fn inplace_dunder(&self) -> &'static str {
        match self {
            BinOp::Add => "__iadd__",
            BinOp::Sub => "__isub__",
            BinOp::Mul => "__imul__",
            BinOp::Div => "__itruediv__",
            BinOp::FloorDiv => "__ifloordiv__",
            BinOp::Mod => "__imod__",
            BinOp::Pow => "__ipow__",
            BinOp::BitAnd => "__iand__",
            BinOp::BitOr => "__ior__",
            BinOp::BitXor => "__ixor__",
            BinOp::LShift => "__ilshift__",
            BinOp::RShift => "__irshift__",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Pos,
    Invert,
    Not,
}

/// Comparison operators (chainable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}

/// Short-circuit boolean operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
}

/* ===================== Functions ===================== */

/// How a parameter receives its argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    /// Positional-or-keyword parameter
    Positional,
    /// `*args`
    VarArgs,
    /// Parameter after `*` or `*args`
    KeywordOnly,
    /// `**kwargs`
    VarKeywords,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<Expr>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// A function body together with its statically resolved scope information.
///
/// Shared between the defining statement and every function object created
/// from it, so the AST node is reference counted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    /// Always a `Stmt::Block`
    pub body: Box<Stmt>,
    /// Names assigned anywhere in the body (excluding global/nonlocal declarations)
    pub local_names: BTreeSet<String>,
    pub globals: BTreeSet<String>,
    pub nonlocals: BTreeSet<String>,
    /// True for `lambda` expressions
    #[serde(default)]
    pub is_lambda: bool,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/* ===================== Targets ===================== */

/// Assignment target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Target {
    Name {
        name: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Attribute {
        object: Box<Expr>,
        attr: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// Tuple or list unpacking target
    Unpack {
        elements: Vec<Target>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Starred {
        inner: Box<Target>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Target {
    pub fn span(&self) -> Span {
        match self {
            Target::Name { span, .. } => *span,
            Target::Attribute { span, .. } => *span,
            Target::Subscript { span, .. } => *span,
            Target::Unpack { span, .. } => *span,
            Target::Starred { span, .. } => *span,
        }
    }

    /// Collect the plain names this target binds
    pub fn bound_names(&self, out: &mut Vec<String>) {
        match self {
            Target::Name { name, .. } => out.push(name.clone()),
            Target::Unpack { elements, .. } => {
                for element in elements {
                    element.bound_names(out);
                }
            }
            Target::Starred { inner, .. } => inner.bound_names(out),
            Target::Attribute { .. } | Target::Subscript { .. } => {}
        }
    }
}

/* ===================== Statements ===================== */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptHandler {
    /// Exception class expression (`None` for a bare `except:`)
    pub kind: Option<Expr>,
    pub name: Option<String>,
    pub body: Box<Stmt>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportAlias {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportAlias {
    /// Name bound in the importing namespace
    pub fn binding(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }
}

/// Statement AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Stmt {
    Block {
        body: Arc<[Stmt]>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Expr {
        expr: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Assign {
        targets: Vec<Target>,
        value: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    AugAssign {
        target: Target,
        op: BinOp,
        value: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    If {
        test: Expr,
        then_s: Box<Stmt>,
        else_s: Option<Box<Stmt>>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
        else_s: Option<Box<Stmt>>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    For {
        target: Target,
        iterable: Expr,
        body: Box<Stmt>,
        else_s: Option<Box<Stmt>>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    FunctionDef {
        def: Arc<FunctionDef>,
        decorators: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    ClassDef {
        name: String,
        bases: Vec<Expr>,
        body: Box<Stmt>,
        decorators: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Return {
        value: Option<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Raise {
        exc: Option<Expr>,
        cause: Option<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Try {
        body: Box<Stmt>,
        handlers: Vec<ExceptHandler>,
        else_s: Option<Box<Stmt>>,
        finally_s: Option<Box<Stmt>>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Assert {
        test: Expr,
        msg: Option<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Delete {
        targets: Vec<Target>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Global {
        names: Vec<String>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Nonlocal {
        names: Vec<String>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Import {
        names: Vec<ImportAlias>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    ImportFrom {
        module: String,
        /// Empty for `from m import *`
        names: Vec<ImportAlias>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Pass {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Break {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Continue {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// Syntax the grammar recognises but the interpreter does not run
    Unsupported {
        feature: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Stmt {
    /// Get the span of this statement
    pub fn span(&self) -> Span {
        match self {
            Stmt::Block { span, .. } => *span,
            Stmt::Expr { span, .. } => *span,
            Stmt::Assign { span, .. } => *span,
            Stmt::AugAssign { span, .. } => *span,
            Stmt::If { span, .. } => *span,
            Stmt::While { span, .. } => *span,
            Stmt::For { span, .. } => *span,
            Stmt::FunctionDef { span, .. } => *span,
            Stmt::ClassDef { span, .. } => *span,
            Stmt::Return { span, .. } => *span,
            Stmt::Raise { span, .. } => *span,
            Stmt::Try { span, .. } => *span,
            Stmt::Assert { span, .. } => *span,
            Stmt::Delete { span, .. } => *span,
            Stmt::Global { span, .. } => *span,
            Stmt::Nonlocal { span, .. } => *span,
            Stmt::Import { span, .. } => *span,
            Stmt::ImportFrom { span, .. } => *span,
            Stmt::Pass { span } => *span,
            Stmt::Break { span } => *span,
            Stmt::Continue { span } => *span,
            Stmt::Unsupported { span, .. } => *span,
        }
    }

    /// Statements of a block, or the statement itself as a one-element slice
    pub fn block_body(&self) -> &[Stmt] {
        match self {
            Stmt::Block { body, .. } => &body[..],
            other => std::slice::from_ref(other),
        }
    }
}

/* ===================== Expressions ===================== */

/// Piece of an f-string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum FStringPart {
    Literal {
        v: String,
    },
    Field {
        expr: Box<Expr>,
        /// `!r`, `!s` or `!a`
        conversion: Option<char>,
        spec: Vec<FStringPart>,
        /// Text emitted before the value for the `{expr=}` form
        debug_text: Option<String>,
    },
}

/// Argument at a call site
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Argument {
    Positional { value: Expr },
    Star { value: Expr },
    Keyword { name: String, value: Expr },
    DoubleStar { value: Expr },
}

/// Entry of a dict display
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum DictItem {
    Pair { key: Expr, value: Expr },
    Unpack { value: Expr },
}

/// One `for ... in ... if ...` clause of a comprehension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comprehension {
    pub target: Target,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
}

/// Expression AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    LitNone {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitBool {
        v: bool,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitInt {
        v: i64,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// Integer literal that does not fit in 64 bits, as decimal digits
    LitBigInt {
        digits: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitFloat {
        v: f64,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitStr {
        v: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitEllipsis {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    FString {
        parts: Vec<FStringPart>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Name {
        name: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    List {
        elements: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Tuple {
        elements: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Set {
        elements: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Dict {
        items: Vec<DictItem>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Starred {
        inner: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    ListComp {
        element: Box<Expr>,
        generators: Vec<Comprehension>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    SetComp {
        element: Box<Expr>,
        generators: Vec<Comprehension>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// Generator expression, evaluated eagerly into an iterator
    GeneratorExp {
        element: Box<Expr>,
        generators: Vec<Comprehension>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Attribute {
        object: Box<Expr>,
        attr: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Argument>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LogicalOp {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<(CmpOp, Expr)>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Ternary {
        condition: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Lambda {
        def: Arc<FunctionDef>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Expr {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expr::LitNone { span } => *span,
            Expr::LitBool { span, .. } => *span,
            Expr::LitInt { span, .. } => *span,
            Expr::LitBigInt { span, .. } => *span,
            Expr::LitFloat { span, .. } => *span,
            Expr::LitStr { span, .. } => *span,
            Expr::LitEllipsis { span } => *span,
            Expr::FString { span, .. } => *span,
            Expr::Name { span, .. } => *span,
            Expr::List { span, .. } => *span,
            Expr::Tuple { span, .. } => *span,
            Expr::Set { span, .. } => *span,
            Expr::Dict { span, .. } => *span,
            Expr::Starred { span, .. } => *span,
            Expr::ListComp { span, .. } => *span,
            Expr::SetComp { span, .. } => *span,
            Expr::GeneratorExp { span, .. } => *span,
            Expr::DictComp { span, .. } => *span,
            Expr::Attribute { span, .. } => *span,
            Expr::Subscript { span, .. } => *span,
            Expr::Slice { span, .. } => *span,
            Expr::Call { span, .. } => *span,
            Expr::BinaryOp { span, .. } => *span,
            Expr::UnaryOp { span, .. } => *span,
            Expr::LogicalOp { span, .. } => *span,
            Expr::Compare { span, .. } => *span,
            Expr::Ternary { span, .. } => *span,
            Expr::Lambda { span, .. } => *span,
        }
    }

    /// Short description used in "cannot assign to ..." diagnostics
    pub fn describe(&self) -> &'static str {
        match self {
            Expr::LitNone { .. } | Expr::LitBool { .. } | Expr::LitEllipsis { .. } => "literal",
            Expr::LitInt { .. }
            | Expr::LitBigInt { .. }
            | Expr::LitFloat { .. }
            | Expr::LitStr { .. } => "literal",
            Expr::FString { .. } => "f-string expression",
            Expr::Call { .. } => "function call",
            Expr::Lambda { .. } => "lambda",
            Expr::Dict { .. } => "dict literal",
            Expr::Set { .. } => "set display",
            Expr::ListComp { .. } => "list comprehension",
            Expr::SetComp { .. } => "set comprehension",
            Expr::DictComp { .. } => "dict comprehension",
            Expr::GeneratorExp { .. } => "generator expression",
            Expr::Compare { .. } => "comparison",
            Expr::Ternary { .. } => "conditional expression",
            _ => "expression",
        }
    }
}

/// Helper function for serde to skip serializing default spans
fn is_default_span(span: &Span) -> bool {
    *span == Span::default()
}
