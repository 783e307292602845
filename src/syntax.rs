//! Surface syntax of `.hole` files.

use std::ops::ControlFlow;

use crate::lex::Span;
use crate::tt::{Name, Type};

#[derive(Debug, Clone)]
pub struct Module {
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone)]
pub enum Decl {
    Data(DeclData),
    Opaque(DeclOpaque),
    Class(DeclClass),
    Instance(DeclInstance),
    Extension(DeclExtension),
    Sig(DeclSig),
    Equation(Equation),
}

#[derive(Debug, Clone)]
pub struct DeclData {
    pub name: Name,
    pub params: Vec<Name>,
    pub ctors: Vec<(Name, Vec<Type>)>,
}

/// `type Int` declares a type without constructors.
#[derive(Debug, Clone)]
pub struct DeclOpaque {
    pub name: Name,
}

#[derive(Debug, Clone)]
pub struct DeclClass {
    pub name: Name,
    pub param: Name,
    pub methods: Vec<(Name, Type)>,
}

#[derive(Debug, Clone)]
pub struct DeclInstance {
    pub class: Name,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct DeclExtension {
    pub name: Name,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct DeclSig {
    pub name: Name,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct Equation {
    pub name: Name,
    pub pats: Vec<Pat>,
    pub rhs: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Pat {
    Var(Name, Span),
    Wildcard(Span),
    Ctor(PatCtor),
}

#[derive(Debug, Clone)]
pub struct PatCtor {
    pub ctor: Name,
    pub args: Vec<Pat>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Var(Name, Span),
    /// `_` or any identifier with the `_` prefix.
    Hole(Name, Span),
    NumLit(String, Span),
    App(Box<ExprApp>),
    BinOp(Box<ExprBinOp>),
    Lam(Box<ExprLam>),
    Ann(Box<ExprAnn>),
}

#[derive(Debug, Clone)]
pub struct ExprApp {
    pub fun: Expr,
    pub arg: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ExprBinOp {
    pub op: Name,
    pub lhs: Expr,
    pub rhs: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ExprLam {
    pub binders: Vec<Name>,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ExprAnn {
    pub expr: Expr,
    pub ty: Type,
    pub span: Span,
}

pub const HOLE_PREFIX: &str = "_";

pub fn is_hole_name(name: &str) -> bool {
    name.starts_with(HOLE_PREFIX)
}

impl Pat {
    pub fn span(&self) -> &Span {
        match self {
            Pat::Var(_, span) | Pat::Wildcard(span) => span,
            Pat::Ctor(inner) => &inner.span,
        }
    }
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Var(_, span) | Expr::Hole(_, span) | Expr::NumLit(_, span) => span,
            Expr::App(inner) => &inner.span,
            Expr::BinOp(inner) => &inner.span,
            Expr::Lam(inner) => &inner.span,
            Expr::Ann(inner) => &inner.span,
        }
    }
}

/// The syntax nodes a query can stop at.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Equation(&'a Equation),
    Pat(&'a Pat),
    Expr(&'a Expr),
}

impl<'a> Node<'a> {
    fn walk<B>(self, f: &mut impl FnMut(Node<'a>) -> ControlFlow<B>) -> ControlFlow<B> {
        f(self)?;
        match self {
            Node::Equation(eq) => {
                for pat in &eq.pats {
                    Node::Pat(pat).walk(f)?;
                }
                Node::Expr(&eq.rhs).walk(f)
            }
            Node::Pat(Pat::Ctor(inner)) => {
                for pat in &inner.args {
                    Node::Pat(pat).walk(f)?;
                }
                ControlFlow::Continue(())
            }
            Node::Pat(_) => ControlFlow::Continue(()),
            Node::Expr(expr) => match expr {
                Expr::Var(..) | Expr::Hole(..) | Expr::NumLit(..) => ControlFlow::Continue(()),
                Expr::App(inner) => {
                    Node::Expr(&inner.fun).walk(f)?;
                    Node::Expr(&inner.arg).walk(f)
                }
                Expr::BinOp(inner) => {
                    Node::Expr(&inner.lhs).walk(f)?;
                    Node::Expr(&inner.rhs).walk(f)
                }
                Expr::Lam(inner) => Node::Expr(&inner.body).walk(f),
                Expr::Ann(inner) => Node::Expr(&inner.expr).walk(f),
            },
        }
    }
}

impl Module {
    pub fn equations(&self) -> impl Iterator<Item = &Equation> {
        self.decls.iter().filter_map(|decl| match decl {
            Decl::Equation(eq) => Some(eq),
            _ => None,
        })
    }

    /// Pre-order search over every equation; the first match wins.
    pub fn find_map<'a, T>(&'a self, mut f: impl FnMut(Node<'a>) -> Option<T>) -> Option<T> {
        for eq in self.equations() {
            let flow = Node::Equation(eq).walk(&mut |node| match f(node) {
                Some(found) => ControlFlow::Break(found),
                None => ControlFlow::Continue(()),
            });
            if let ControlFlow::Break(found) = flow {
                return Some(found);
            }
        }
        None
    }

    /// Pre-order collection over every equation.
    pub fn collect<'a, T>(&'a self, mut f: impl FnMut(Node<'a>) -> Option<T>) -> Vec<T> {
        let mut found = vec![];
        for eq in self.equations() {
            let _ = Node::Equation(eq).walk(&mut |node| -> ControlFlow<()> {
                found.extend(f(node));
                ControlFlow::Continue(())
            });
        }
        found
    }

    /// Every hole in source order, with the annotation of its innermost
    /// enclosing `(_ : T)` when it has one.
    pub fn holes(&self) -> Vec<(Span, Option<Type>)> {
        let mut holes = self.collect(|node| match node {
            Node::Expr(Expr::Hole(_, span)) => Some((span.clone(), None)),
            Node::Expr(Expr::Ann(inner)) => match &inner.expr {
                Expr::Hole(_, span) => Some((span.clone(), Some(inner.ty.clone()))),
                _ => None,
            },
            _ => None,
        });
        // an annotated hole is visited twice, annotation first
        holes.dedup_by(|later, earlier| later.0 == earlier.0);
        holes
    }

    /// The equation whose span contains `span`.
    pub fn enclosing_equation(&self, span: &Span) -> Option<&Equation> {
        self.find_map(|node| match node {
            Node::Equation(eq) if eq.span.contains(span) => Some(eq),
            _ => None,
        })
    }

    /// The top-level equation whose right-hand side is exactly the hole at
    /// `span`.
    pub fn top_hole_equation(&self, span: &Span) -> Option<&Equation> {
        self.find_map(|node| match node {
            Node::Equation(eq) if eq.span.contains(span) => match &eq.rhs {
                Expr::Hole(name, hole_span) if is_hole_name(name.as_str()) && hole_span == span => {
                    Some(eq)
                }
                _ => None,
            },
            _ => None,
        })
    }
}
