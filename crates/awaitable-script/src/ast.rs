//! Expression tree for script functions.
//! There is no parser: programs are assembled with [`AstBuilder`], lowered
//! by the compiler, and printed back with `Display`.

use crate::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an expression within one builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExprId(pub u32);

impl ExprId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(id: ExprId, kind: ExprKind) -> Self {
        Self { id, kind }
    }

    pub fn tag(&self) -> ExprTag {
        self.kind.tag()
    }

    /// Pre-order traversal over this node and all of its children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Variable(_) => {}
            ExprKind::Block { bindings, output } => {
                for (_, value) in bindings {
                    value.walk(visit);
                }
                output.walk(visit);
            }
            ExprKind::Call(_, args)
            | ExprKind::Construct(_, args)
            | ExprKind::Awaitable(_, args)
            | ExprKind::Tuple(args)
            | ExprKind::List(args) => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            ExprKind::GetAttr(receiver, _) => receiver.walk(visit),
            ExprKind::SetAttr(receiver, _, value) => {
                receiver.walk(visit);
                value.walk(visit);
            }
            ExprKind::CallMethod(receiver, _, args) => {
                receiver.walk(visit);
                for arg in args {
                    arg.walk(visit);
                }
            }
            ExprKind::AwaitableNoWait(inner)
            | ExprKind::Wait(inner)
            | ExprKind::IsAwait(inner)
            | ExprKind::Assert(inner, _)
            | ExprKind::Annotate(inner, _) => inner.walk(visit),
        }
    }

    /// Number of nodes of the given kind in this tree.
    pub fn count(&self, tag: ExprTag) -> usize {
        let mut count = 0;
        self.walk(&mut |expr| {
            if expr.tag() == tag {
                count += 1;
            }
        });
        count
    }

    pub fn max_id(&self) -> u32 {
        let mut max = 0;
        self.walk(&mut |expr| max = max.max(expr.id.0));
        max
    }
}

/// Expression kinds
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// 42, 1.5, "hello", True, None
    Literal(Literal),

    /// x
    Variable(String),

    /// BLOCK { bindings, output }
    Block {
        bindings: Vec<(String, Expr)>,
        output: Box<Expr>,
    },

    /// Builtin, native or script function call: foo(a, b)
    Call(String, Vec<Expr>),

    /// Class instantiation: C(a, b)
    Construct(String, Vec<Expr>),

    /// expr.field
    GetAttr(Box<Expr>, String),

    /// expr.field = value
    SetAttr(Box<Expr>, String, Box<Expr>),

    /// expr.method(args)
    CallMethod(Box<Expr>, String, Vec<Expr>),

    /// awaitable(function, args...)
    Awaitable(String, Vec<Expr>),

    /// awaitable_nowait(expr)
    AwaitableNoWait(Box<Expr>),

    /// wait(expr)
    Wait(Box<Expr>),

    /// isinstance(expr, Await)
    IsAwait(Box<Expr>),

    /// assert expr, message
    Assert(Box<Expr>, String),

    /// annotate(type, expr)
    Annotate(Box<Expr>, Type),

    /// (a, b)
    Tuple(Vec<Expr>),

    /// [a, b]
    List(Vec<Expr>),
}

impl ExprKind {
    pub fn tag(&self) -> ExprTag {
        match self {
            ExprKind::Literal(_) => ExprTag::Literal,
            ExprKind::Variable(_) => ExprTag::Variable,
            ExprKind::Block { .. } => ExprTag::Block,
            ExprKind::Call(..) => ExprTag::Call,
            ExprKind::Construct(..) => ExprTag::Construct,
            ExprKind::GetAttr(..) => ExprTag::GetAttr,
            ExprKind::SetAttr(..) => ExprTag::SetAttr,
            ExprKind::CallMethod(..) => ExprTag::CallMethod,
            ExprKind::Awaitable(..) => ExprTag::Awaitable,
            ExprKind::AwaitableNoWait(_) => ExprTag::AwaitableNoWait,
            ExprKind::Wait(_) => ExprTag::Wait,
            ExprKind::IsAwait(_) => ExprTag::IsAwait,
            ExprKind::Assert(..) => ExprTag::Assert,
            ExprKind::Annotate(..) => ExprTag::Annotate,
            ExprKind::Tuple(_) => ExprTag::Tuple,
            ExprKind::List(_) => ExprTag::List,
        }
    }
}

/// Node kind without payload, for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprTag {
    Literal,
    Variable,
    Block,
    Call,
    Construct,
    GetAttr,
    SetAttr,
    CallMethod,
    Awaitable,
    AwaitableNoWait,
    Wait,
    IsAwait,
    Assert,
    Annotate,
    Tuple,
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Unit,
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::Int(_) => Type::Int,
            Literal::Float(_) => Type::Float,
            Literal::String(_) => Type::Text,
            Literal::Bool(_) => Type::Bool,
            Literal::Unit => Type::Unit,
        }
    }
}

/// Builder for constructing expressions programmatically
pub struct AstBuilder {
    next_id: u32,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Continues numbering after ids handed out elsewhere.
    pub fn starting_at(next_id: u32) -> Self {
        Self { next_id }
    }

    fn next_id(&mut self) -> ExprId {
        let id = self.next_id;
        self.next_id += 1;
        ExprId(id)
    }

    pub fn expr(&mut self, kind: ExprKind) -> Expr {
        Expr::new(self.next_id(), kind)
    }

    pub fn int(&mut self, value: i64) -> Expr {
        self.expr(ExprKind::Literal(Literal::Int(value)))
    }

    pub fn float(&mut self, value: f64) -> Expr {
        self.expr(ExprKind::Literal(Literal::Float(value)))
    }

    pub fn bool(&mut self, value: bool) -> Expr {
        self.expr(ExprKind::Literal(Literal::Bool(value)))
    }

    pub fn string(&mut self, value: impl Into<String>) -> Expr {
        self.expr(ExprKind::Literal(Literal::String(value.into())))
    }

    pub fn unit(&mut self) -> Expr {
        self.expr(ExprKind::Literal(Literal::Unit))
    }

    pub fn var(&mut self, name: impl Into<String>) -> Expr {
        self.expr(ExprKind::Variable(name.into()))
    }

    pub fn block(&mut self, bindings: Vec<(impl Into<String>, Expr)>, output: Expr) -> Expr {
        self.expr(ExprKind::Block {
            bindings: bindings.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            output: Box::new(output),
        })
    }

    pub fn call(&mut self, name: impl Into<String>, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call(name.into(), args))
    }

    pub fn construct(&mut self, class: impl Into<String>, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Construct(class.into(), args))
    }

    pub fn get_attr(&mut self, receiver: Expr, field: impl Into<String>) -> Expr {
        self.expr(ExprKind::GetAttr(Box::new(receiver), field.into()))
    }

    pub fn set_attr(&mut self, receiver: Expr, field: impl Into<String>, value: Expr) -> Expr {
        self.expr(ExprKind::SetAttr(
            Box::new(receiver),
            field.into(),
            Box::new(value),
        ))
    }

    pub fn call_method(&mut self, receiver: Expr, method: impl Into<String>, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::CallMethod(Box::new(receiver), method.into(), args))
    }

    pub fn awaitable(&mut self, function: impl Into<String>, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Awaitable(function.into(), args))
    }

    pub fn awaitable_nowait(&mut self, value: Expr) -> Expr {
        self.expr(ExprKind::AwaitableNoWait(Box::new(value)))
    }

    pub fn wait(&mut self, value: Expr) -> Expr {
        self.expr(ExprKind::Wait(Box::new(value)))
    }

    pub fn is_await(&mut self, value: Expr) -> Expr {
        self.expr(ExprKind::IsAwait(Box::new(value)))
    }

    pub fn assert(&mut self, condition: Expr, message: impl Into<String>) -> Expr {
        self.expr(ExprKind::Assert(Box::new(condition), message.into()))
    }

    pub fn annotate(&mut self, ty: Type, value: Expr) -> Expr {
        self.expr(ExprKind::Annotate(Box::new(value), ty))
    }

    pub fn tuple(&mut self, items: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Tuple(items))
    }

    pub fn list(&mut self, items: Vec<Expr>) -> Expr {
        self.expr(ExprKind::List(items))
    }

    /// `add(a, b)`
    pub fn add(&mut self, a: Expr, b: Expr) -> Expr {
        self.call("add", vec![a, b])
    }

    /// `mul(a, b)`
    pub fn mul(&mut self, a: Expr, b: Expr) -> Expr {
        self.call("mul", vec![a, b])
    }
}

impl Default for AstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::Unit => write!(f, "None"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self, 0)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr], indent: usize) -> fmt::Result {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write_expr(f, item, indent)?;
    }
    Ok(())
}

fn write_expr(f: &mut fmt::Formatter<'_>, expr: &Expr, indent: usize) -> fmt::Result {
    match &expr.kind {
        ExprKind::Literal(literal) => write!(f, "{literal}"),
        ExprKind::Variable(name) => write!(f, "{name}"),
        ExprKind::Block { bindings, output } => {
            let pad = "    ".repeat(indent + 1);
            writeln!(f, "BLOCK {{")?;
            for (name, value) in bindings {
                write!(f, "{pad}{name} = ")?;
                write_expr(f, value, indent + 1)?;
                writeln!(f)?;
            }
            write!(f, "{pad}")?;
            write_expr(f, output, indent + 1)?;
            write!(f, "\n{}}}", "    ".repeat(indent))
        }
        ExprKind::Call(name, args) => {
            write!(f, "{name}(")?;
            write_list(f, args, indent)?;
            write!(f, ")")
        }
        ExprKind::Construct(class, args) => {
            write!(f, "{class}(")?;
            write_list(f, args, indent)?;
            write!(f, ")")
        }
        ExprKind::GetAttr(receiver, field) => {
            write_expr(f, receiver, indent)?;
            write!(f, ".{field}")
        }
        ExprKind::SetAttr(receiver, field, value) => {
            write_expr(f, receiver, indent)?;
            write!(f, ".{field} = ")?;
            write_expr(f, value, indent)
        }
        ExprKind::CallMethod(receiver, method, args) => {
            write_expr(f, receiver, indent)?;
            write!(f, ".{method}(")?;
            write_list(f, args, indent)?;
            write!(f, ")")
        }
        ExprKind::Awaitable(function, args) => {
            write!(f, "awaitable({function}")?;
            for arg in args {
                write!(f, ", ")?;
                write_expr(f, arg, indent)?;
            }
            write!(f, ")")
        }
        ExprKind::AwaitableNoWait(value) => {
            write!(f, "awaitable_nowait(")?;
            write_expr(f, value, indent)?;
            write!(f, ")")
        }
        ExprKind::Wait(value) => {
            write!(f, "wait(")?;
            write_expr(f, value, indent)?;
            write!(f, ")")
        }
        ExprKind::IsAwait(value) => {
            write!(f, "isinstance(")?;
            write_expr(f, value, indent)?;
            write!(f, ", Await)")
        }
        ExprKind::Assert(condition, message) => {
            write!(f, "assert ")?;
            write_expr(f, condition, indent)?;
            write!(f, ", {message:?}")
        }
        ExprKind::Annotate(value, ty) => {
            write!(f, "annotate({ty}, ")?;
            write_expr(f, value, indent)?;
            write!(f, ")")
        }
        ExprKind::Tuple(items) => {
            write!(f, "(")?;
            write_list(f, items, indent)?;
            if items.len() == 1 {
                write!(f, ",")?;
            }
            write!(f, ")")
        }
        ExprKind::List(items) => {
            write!(f, "[")?;
            write_list(f, items, indent)?;
            write!(f, "]")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_waits() {
        let mut b = AstBuilder::new();
        let aw = b.var("aw");
        let inner = b.wait(aw);
        let outer = b.wait(inner);
        let x = b.var("x");
        let body = b.add(outer, x);
        assert_eq!(body.count(ExprTag::Wait), 2);
        assert_eq!(body.count(ExprTag::Variable), 2);
        assert_eq!(body.max_id(), 4);
    }

    #[test]
    fn display_block() {
        let mut b = AstBuilder::new();
        let arg = b.int(13);
        let aw = b.awaitable("foo", vec![arg]);
        let var = b.var("aw");
        let out = b.wait(var);
        let block = b.block(vec![("aw", aw)], out);
        assert_eq!(
            block.to_string(),
            "BLOCK {\n    aw = awaitable(foo, 13)\n    wait(aw)\n}"
        );
    }
}
