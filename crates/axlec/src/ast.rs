//! The structured unit the resolution core consumes.
//!
//! Every node keeps the JSON pointer it was loaded from; that pointer is the
//! node's identity in diagnostics and in the output tables.

use crate::lattice::{Primitive, Staging};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutQualifier {
    Const,
    Mut,
    AnyMut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeExpr {
    pub ptr: String,
    pub kind: TypeExprKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExprKind {
    Prim(Primitive),
    TypeValue,
    Literal,
    Unit,
    /// A struct name.
    Adt(String),
    Mutability(MutQualifier, Box<TypeExpr>),
    Staging(Staging, Box<TypeExpr>),
    Pointer(Box<TypeExpr>),
    Array { len: u64, elem: Box<TypeExpr> },
    Tuple(Vec<TypeExpr>),
    Function { params: Vec<TypeExpr>, ret: Box<TypeExpr> },
}

impl TypeExpr {
    pub fn node_count(&self) -> usize {
        1 + match &self.kind {
            TypeExprKind::Prim(_)
            | TypeExprKind::TypeValue
            | TypeExprKind::Literal
            | TypeExprKind::Unit
            | TypeExprKind::Adt(_) => 0,
            TypeExprKind::Mutability(_, inner)
            | TypeExprKind::Staging(_, inner)
            | TypeExprKind::Pointer(inner) => inner.node_count(),
            TypeExprKind::Array { elem, .. } => elem.node_count(),
            TypeExprKind::Tuple(items) => items.iter().map(TypeExpr::node_count).sum(),
            TypeExprKind::Function { params, ret } => {
                params.iter().map(TypeExpr::node_count).sum::<usize>() + ret.node_count()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Const,
    Mut,
    Compiletime,
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "+" => Some(BinOp::Add),
            "-" => Some(BinOp::Sub),
            "*" => Some(BinOp::Mul),
            "/" => Some(BinOp::Div),
            "%" => Some(BinOp::Rem),
            "==" => Some(BinOp::Eq),
            "!=" => Some(BinOp::Ne),
            "<" => Some(BinOp::Lt),
            "<=" => Some(BinOp::Le),
            ">" => Some(BinOp::Gt),
            ">=" => Some(BinOp::Ge),
            _ => None,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub ptr: String,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    Int(i64),
    Bool(bool),
    Char(char),
    Float(String),
    Str(String),
    Ident(String),
    Uninit,
    Deref(Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Field(Box<Expr>, usize),
    Addr(Box<Expr>),
    /// `&base[lo..hi]`
    Slice {
        base: Box<Expr>,
        lo: Box<Expr>,
        hi: Box<Expr>,
    },
    Call { callee: String, args: Vec<Expr> },
    Coerce(Coercion, Box<Expr>),
    Array(Vec<Expr>),
    Tuple(Vec<Expr>),
    Cast(Box<Expr>, TypeExpr),
    TypeOf(TypeExpr),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn node_count(&self) -> usize {
        1 + match &self.kind {
            ExprKind::Int(_)
            | ExprKind::Bool(_)
            | ExprKind::Char(_)
            | ExprKind::Float(_)
            | ExprKind::Str(_)
            | ExprKind::Ident(_)
            | ExprKind::Uninit => 0,
            ExprKind::Deref(e) | ExprKind::Addr(e) | ExprKind::Field(e, _) => e.node_count(),
            ExprKind::Coerce(_, e) => e.node_count(),
            ExprKind::Index(a, b) | ExprKind::Binary(_, a, b) => a.node_count() + b.node_count(),
            ExprKind::Slice { base, lo, hi } => {
                base.node_count() + lo.node_count() + hi.node_count()
            }
            ExprKind::Call { args, .. } | ExprKind::Array(args) | ExprKind::Tuple(args) => {
                args.iter().map(Expr::node_count).sum()
            }
            ExprKind::Cast(e, ty) => e.node_count() + ty.node_count(),
            ExprKind::TypeOf(ty) => ty.node_count(),
        }
    }

    /// Length of the array a literal initializer produces, used to fix `_` lengths.
    pub fn literal_len(&self) -> Option<u64> {
        match &self.kind {
            ExprKind::Str(s) => Some(s.len() as u64),
            ExprKind::Array(items) => Some(items.len() as u64),
            ExprKind::Coerce(_, e) => e.literal_len(),
            _ => None,
        }
    }

    /// Visits every call expression in evaluation order.
    pub fn for_each_call<'a>(&'a self, f: &mut dyn FnMut(&'a str)) {
        match &self.kind {
            ExprKind::Call { callee, args } => {
                for a in args {
                    a.for_each_call(f);
                }
                f(callee);
            }
            ExprKind::Deref(e)
            | ExprKind::Addr(e)
            | ExprKind::Field(e, _)
            | ExprKind::Coerce(_, e)
            | ExprKind::Cast(e, _) => e.for_each_call(f),
            ExprKind::Index(a, b) | ExprKind::Binary(_, a, b) => {
                a.for_each_call(f);
                b.for_each_call(f);
            }
            ExprKind::Slice { base, lo, hi } => {
                base.for_each_call(f);
                lo.for_each_call(f);
                hi.for_each_call(f);
            }
            ExprKind::Array(items) | ExprKind::Tuple(items) => {
                for e in items {
                    e.for_each_call(f);
                }
            }
            ExprKind::Int(_)
            | ExprKind::Bool(_)
            | ExprKind::Char(_)
            | ExprKind::Float(_)
            | ExprKind::Str(_)
            | ExprKind::Ident(_)
            | ExprKind::Uninit
            | ExprKind::TypeOf(_) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub ptr: String,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    Let {
        name: String,
        ty: Option<TypeExpr>,
        init: Expr,
    },
    Static {
        name: String,
        ty: TypeExpr,
        init: Expr,
    },
    Set { place: Expr, value: Expr },
    Return(Expr),
    Expr(Expr),
}

impl Stmt {
    pub fn node_count(&self) -> usize {
        1 + match &self.kind {
            StmtKind::Let { ty, init, .. } => {
                ty.as_ref().map_or(0, TypeExpr::node_count) + init.node_count()
            }
            StmtKind::Static { ty, init, .. } => ty.node_count() + init.node_count(),
            StmtKind::Set { place, value } => place.node_count() + value.node_count(),
            StmtKind::Return(e) | StmtKind::Expr(e) => e.node_count(),
        }
    }

    pub fn for_each_call<'a>(&'a self, f: &mut dyn FnMut(&'a str)) {
        match &self.kind {
            StmtKind::Let { init, .. } | StmtKind::Static { init, .. } => init.for_each_call(f),
            StmtKind::Set { place, value } => {
                place.for_each_call(f);
                value.for_each_call(f);
            }
            StmtKind::Return(e) | StmtKind::Expr(e) => e.for_each_call(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Let,
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalDecl {
    pub ptr: String,
    pub name: String,
    pub storage: Storage,
    pub ty: Option<TypeExpr>,
    pub init: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub ptr: String,
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub ptr: String,
    pub name: String,
    pub params: Vec<Param>,
    pub result: TypeExpr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    pub ptr: String,
    pub name: String,
    pub fields: Vec<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternDecl {
    pub ptr: String,
    pub name: String,
    pub params: Vec<Param>,
    pub result: TypeExpr,
    /// Present when the extern is defined in this compilation.
    pub body: Option<Vec<Stmt>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decl {
    Global(GlobalDecl),
    Function(FunctionDecl),
    Struct(StructDecl),
    Extern(ExternDecl),
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Global(d) => &d.name,
            Decl::Function(d) => &d.name,
            Decl::Struct(d) => &d.name,
            Decl::Extern(d) => &d.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub schema_version: String,
    pub name: String,
    pub decls: Vec<Decl>,
    pub body: Vec<Stmt>,
}

impl Unit {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn structs(&self) -> impl Iterator<Item = &StructDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Struct(s) => Some(s),
            _ => None,
        })
    }

    pub fn externs(&self) -> impl Iterator<Item = &ExternDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Extern(e) => Some(e),
            _ => None,
        })
    }

    pub fn globals(&self) -> impl Iterator<Item = &GlobalDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Global(g) => Some(g),
            _ => None,
        })
    }

    /// Total size of the unit's type and expression trees.
    pub fn node_count(&self) -> usize {
        let stmts = |body: &[Stmt]| body.iter().map(Stmt::node_count).sum::<usize>();
        let params = |ps: &[Param]| ps.iter().map(|p| p.ty.node_count()).sum::<usize>();
        let decls: usize = self
            .decls
            .iter()
            .map(|d| match d {
                Decl::Global(g) => {
                    g.ty.as_ref().map_or(0, TypeExpr::node_count) + g.init.node_count()
                }
                Decl::Function(f) => params(&f.params) + f.result.node_count() + stmts(&f.body),
                Decl::Struct(s) => s.fields.iter().map(TypeExpr::node_count).sum(),
                Decl::Extern(e) => {
                    params(&e.params)
                        + e.result.node_count()
                        + e.body.as_deref().map_or(0, stmts)
                }
            })
            .sum();
        decls + stmts(&self.body)
    }

    /// Every statement list in the unit: function bodies, extern bodies and the unit body.
    pub fn all_bodies(&self) -> Vec<&[Stmt]> {
        let mut out: Vec<&[Stmt]> = Vec::new();
        for d in &self.decls {
            match d {
                Decl::Function(f) => out.push(&f.body),
                Decl::Extern(e) => {
                    if let Some(body) = &e.body {
                        out.push(body);
                    }
                }
                Decl::Global(_) | Decl::Struct(_) => {}
            }
        }
        out.push(&self.body);
        out
    }

    /// Number of syntactic call sites naming each callee, including calls in
    /// global initializers.
    pub fn call_counts(&self) -> std::collections::BTreeMap<String, usize> {
        let mut counts = std::collections::BTreeMap::new();
        let mut bump = |name: &str| *counts.entry(name.to_string()).or_insert(0usize) += 1;
        for g in self.globals() {
            g.init.for_each_call(&mut bump);
        }
        for body in self.all_bodies() {
            for s in body {
                s.for_each_call(&mut bump);
            }
        }
        counts
    }
}
