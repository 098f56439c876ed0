//! Constraint collection.
//!
//! Functions and structs are generics: each is collected once into a template
//! whose variables occupy a private range, and every use site appends a copy of
//! that template with the range moved to fresh variables. Mutually recursive
//! functions share one template and call each other monomorphically. Externs
//! and globals are never copied; every copy refers to the same slots.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::json;
use tracing::{debug, trace};

use crate::ast::{
    Coercion, Expr, ExprKind, ExternDecl, FunctionDecl, MutQualifier, Stmt, StmtKind, Storage,
    StructDecl, TypeExpr, TypeExprKind, Unit,
};
use crate::compile::{CompileErrorKind, CompilerError};
use crate::constraints::{ConstraintSet, DefaultPriority, Origin, OriginKind, StagingCheck};
use crate::diagnostics::{Diagnostic, Stage};
use crate::lattice::{
    Axis, LatticeValue, Mutability, Primitive, Shift, Staging, TermKind, TypeTerm, VarId,
};
use crate::slice::{self, SliceSite};

pub const TYPE_UNKNOWN_IDENT: &str = "AXL-TYPE-0001";
pub const TYPE_MISMATCH: &str = "AXL-TYPE-0002";
pub const TYPE_PLACE_EXPECTED: &str = "AXL-TYPE-0003";
pub const CALL_UNKNOWN_CALLEE: &str = "AXL-CALL-0001";
pub const CALL_ARITY: &str = "AXL-CALL-0002";
pub const ARRAY_HETEROGENEOUS: &str = "AXL-ARRAY-0001";

/// A declared name and its term, reported in the resolved tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTerm {
    pub ptr: String,
    pub name: Option<String>,
    pub term: TypeTerm,
}

impl NodeTerm {
    fn renamed(&self, mutability: Shift, staging: Shift) -> Self {
        Self {
            ptr: self.ptr.clone(),
            name: self.name.clone(),
            term: self.term.renamed(mutability, staging),
        }
    }
}

/// One use of a generic, with the copy of its signature the use site relates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub generic: String,
    pub ptr: String,
    /// Function params followed by the result, or struct fields.
    pub signature: Vec<TypeTerm>,
    pub nested: Vec<Site>,
    pub nodes: Vec<NodeTerm>,
    pub slices: Vec<SliceSite>,
    /// A call inside a recursive component; its callees are the component's own sites.
    pub recursive: bool,
}

impl Site {
    fn renamed(&self, mutability: Shift, staging: Shift) -> Self {
        Self {
            generic: self.generic.clone(),
            ptr: self.ptr.clone(),
            signature: self
                .signature
                .iter()
                .map(|t| t.renamed(mutability, staging))
                .collect(),
            nested: self
                .nested
                .iter()
                .map(|s| s.renamed(mutability, staging))
                .collect(),
            nodes: self
                .nodes
                .iter()
                .map(|n| n.renamed(mutability, staging))
                .collect(),
            slices: self
                .slices
                .iter()
                .map(|s| s.renamed(mutability, staging))
                .collect(),
            recursive: self.recursive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenericKind {
    Function,
    Struct,
}

/// A generic's constraints in its own variable range, kept for the
/// caller-independent conflict check.
#[derive(Debug, Clone)]
pub struct Template {
    pub kind: GenericKind,
    pub members: Vec<String>,
    pub constraints: ConstraintSet,
}

#[derive(Debug, Clone)]
pub struct ExternInfo {
    pub name: String,
    pub ptr: String,
    pub signature: Vec<TypeTerm>,
    /// Defined here with a single call site, so the boundary rule does not apply.
    pub exempt: bool,
    pub nodes: Vec<NodeTerm>,
    pub slices: Vec<SliceSite>,
}

#[derive(Debug, Clone)]
pub struct Collected {
    pub constraints: ConstraintSet,
    pub mut_vars: u32,
    pub stage_vars: u32,
    pub sites: Vec<Site>,
    pub nodes: Vec<NodeTerm>,
    pub slices: Vec<SliceSite>,
    pub externs: Vec<ExternInfo>,
    pub templates: Vec<Template>,
    pub diagnostics: Vec<Diagnostic>,
}

struct Component {
    kind: GenericKind,
    members: Vec<String>,
    mut_range: (u32, u32),
    stage_range: (u32, u32),
    constraints: ConstraintSet,
    sites: Vec<Site>,
    signatures: BTreeMap<String, Vec<TypeTerm>>,
    nodes: BTreeMap<String, Vec<NodeTerm>>,
    slices: BTreeMap<String, Vec<SliceSite>>,
}

#[derive(Debug, Clone)]
struct Local {
    term: TypeTerm,
    literal: bool,
}

#[derive(Debug, Clone)]
struct Val {
    term: TypeTerm,
    /// Literal origin: eligible for `runtime` coercion.
    literal: bool,
    /// Names existing storage rather than a temporary.
    place: bool,
}

impl Val {
    fn temp(term: TypeTerm, literal: bool) -> Self {
        Self {
            term,
            literal,
            place: false,
        }
    }
}

#[derive(Default)]
struct Body {
    constraints: ConstraintSet,
    sites: Vec<Site>,
    nodes: Vec<NodeTerm>,
    slices: Vec<SliceSite>,
    scope: BTreeMap<String, Local>,
    ret: Option<TypeTerm>,
    component: Option<usize>,
}

struct ExternSig {
    params: Vec<TypeTerm>,
    ret: TypeTerm,
}

fn is_literal_value(term: &TypeTerm) -> bool {
    match &term.kind {
        TermKind::LiteralType => true,
        TermKind::Array { elem, .. } => elem.is_literal_kind(),
        _ => false,
    }
}

/// The outermost `const`/`mut` coercion wrapping `e`, if any.
fn explicit_mutability(e: &Expr) -> Option<Mutability> {
    match &e.kind {
        ExprKind::Coerce(Coercion::Const, _) => Some(Mutability::Const),
        ExprKind::Coerce(Coercion::Mut, _) => Some(Mutability::Mut),
        ExprKind::Coerce(_, inner) => explicit_mutability(inner),
        _ => None,
    }
}

/// Nodes stored by value inside `term`, i.e. not reached through a pointer.
fn by_value_nodes(term: &TypeTerm) -> Vec<&TypeTerm> {
    let mut out = Vec::new();
    term.walk(&mut |t, shared| {
        if !shared {
            out.push(t);
        }
    });
    out
}

/// Prints the shape of a term without its slots.
fn shape(term: &TypeTerm) -> String {
    match &term.kind {
        TermKind::Primitive { prim } => prim.as_str().to_string(),
        TermKind::Pointer { pointee } => format!("*{}", shape(pointee)),
        TermKind::Array { len, elem } => format!("[{len} {}]", shape(elem)),
        TermKind::Tuple { elements } => format!(
            "({})",
            elements.iter().map(shape).collect::<Vec<_>>().join(", ")
        ),
        TermKind::TypeValue => "type".to_string(),
        TermKind::LiteralType => "literal".to_string(),
        TermKind::Unit => "unit".to_string(),
        TermKind::Function { params, ret } => format!(
            "fn({}) -> {}",
            params.iter().map(shape).collect::<Vec<_>>().join(", "),
            shape(ret)
        ),
    }
}

/// Strongly connected components of the call graph, callees before callers.
fn call_graph_components<'u>(functions: &[&'u FunctionDecl]) -> Vec<Vec<&'u str>> {
    struct Tarjan {
        edges: Vec<Vec<usize>>,
        index: Vec<Option<usize>>,
        low: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        next: usize,
        out: Vec<Vec<usize>>,
    }

    impl Tarjan {
        fn visit(&mut self, v: usize) {
            self.index[v] = Some(self.next);
            self.low[v] = self.next;
            self.next += 1;
            self.stack.push(v);
            self.on_stack[v] = true;
            for i in 0..self.edges[v].len() {
                let w = self.edges[v][i];
                match self.index[w] {
                    None => {
                        self.visit(w);
                        self.low[v] = self.low[v].min(self.low[w]);
                    }
                    Some(wi) if self.on_stack[w] => self.low[v] = self.low[v].min(wi),
                    Some(_) => {}
                }
            }
            if Some(self.low[v]) == self.index[v] {
                let mut comp = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w] = false;
                    comp.push(w);
                    if w == v {
                        break;
                    }
                }
                comp.sort_unstable();
                self.out.push(comp);
            }
        }
    }

    let by_name: BTreeMap<&str, usize> = functions
        .iter()
        .enumerate()
        .map(|(i, f)| (f.name.as_str(), i))
        .collect();
    let edges = functions
        .iter()
        .map(|f| {
            let mut callees = BTreeSet::new();
            for s in &f.body {
                s.for_each_call(&mut |callee| {
                    if let Some(&j) = by_name.get(callee) {
                        callees.insert(j);
                    }
                });
            }
            callees.into_iter().collect()
        })
        .collect();
    let n = functions.len();
    let mut t = Tarjan {
        edges,
        index: vec![None; n],
        low: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        next: 0,
        out: Vec::new(),
    };
    for v in 0..n {
        if t.index[v].is_none() {
            t.visit(v);
        }
    }
    t.out
        .into_iter()
        .map(|c| c.into_iter().map(|i| functions[i].name.as_str()).collect())
        .collect()
}

struct Collector<'u> {
    max_vars: usize,
    next_mut: u32,
    next_stage: u32,
    functions: BTreeMap<&'u str, &'u FunctionDecl>,
    structs: BTreeMap<&'u str, &'u StructDecl>,
    externs: BTreeMap<&'u str, ExternSig>,
    globals: BTreeMap<String, Local>,
    /// Function or struct name to component index.
    component_of: BTreeMap<&'u str, usize>,
    component_members: Vec<Vec<&'u str>>,
    component_kinds: Vec<GenericKind>,
    components: BTreeMap<usize, Component>,
    building: BTreeMap<usize, BTreeMap<String, Vec<TypeTerm>>>,
    diagnostics: Vec<Diagnostic>,
}

impl<'u> Collector<'u> {
    fn fresh(&mut self) -> (LatticeValue<Mutability>, LatticeValue<Staging>) {
        let m = VarId(self.next_mut);
        let s = VarId(self.next_stage);
        self.next_mut += 1;
        self.next_stage += 1;
        (LatticeValue::Variable(m), LatticeValue::Variable(s))
    }

    fn check_budget(&self) -> Result<(), CompilerError> {
        let used = self.next_mut as usize + self.next_stage as usize;
        if used > self.max_vars {
            return Err(CompilerError::new(
                CompileErrorKind::Budget,
                format!(
                    "lattice variable budget exceeded: {used} > {} (raise AXLE_MAX_VARS)",
                    self.max_vars
                ),
            ));
        }
        Ok(())
    }

    fn diag(&mut self, d: Diagnostic) {
        self.diagnostics.push(d);
    }

    fn mismatch(&mut self, ptr: &str, dst: &TypeTerm, src: &TypeTerm) {
        let (expected, got) = (shape(dst), shape(src));
        self.diag(
            Diagnostic::error(
                TYPE_MISMATCH,
                Stage::Collect,
                ptr,
                format!("type mismatch: expected {expected} got {got}"),
            )
            .with_data("expected", json!(expected))
            .with_data("got", json!(got)),
        );
    }

    fn fresh_like(&mut self, t: &TypeTerm) -> TypeTerm {
        let (m, s) = self.fresh();
        let kind = match &t.kind {
            TermKind::Array { len, elem } => TermKind::Array {
                len: *len,
                elem: Box::new(self.fresh_like(elem)),
            },
            TermKind::Tuple { elements } => TermKind::Tuple {
                elements: elements.iter().map(|e| self.fresh_like(e)).collect(),
            },
            other => other.clone(),
        };
        TypeTerm::new(kind, m, s)
    }

    /// Relates a destination slot to a value stored into it. By value the
    /// staging flows from source to destination; beneath a pointer both
    /// sides are the same storage and unify.
    fn relate(&mut self, body: &mut Body, dst: &TypeTerm, src: &TypeTerm, ptr: &str) {
        if !self.relate_inner(body, dst, src, false, ptr) {
            self.mismatch(ptr, dst, src);
        }
    }

    fn relate_inner(
        &mut self,
        body: &mut Body,
        dst: &TypeTerm,
        src: &TypeTerm,
        shared: bool,
        ptr: &str,
    ) -> bool {
        if shared {
            body.constraints.unify_mut(
                dst.mutability,
                src.mutability,
                Origin::new(OriginKind::SharedStorage, ptr),
            );
            body.constraints.unify_stage(
                dst.staging,
                src.staging,
                Origin::new(OriginKind::SharedStorage, ptr),
            );
        } else {
            body.constraints
                .flow_stage(src.staging, dst.staging, Origin::new(OriginKind::Flow, ptr));
        }
        match (&dst.kind, &src.kind) {
            (TermKind::Primitive { prim: a }, TermKind::Primitive { prim: b }) => a == b,
            (TermKind::Primitive { .. }, TermKind::LiteralType) => !shared,
            (TermKind::LiteralType, TermKind::LiteralType)
            | (TermKind::TypeValue, TermKind::TypeValue)
            | (TermKind::Unit, TermKind::Unit) => true,
            (TermKind::Pointer { pointee: p }, TermKind::Pointer { pointee: q }) => {
                self.relate_inner(body, p, q, true, ptr)
            }
            (
                TermKind::Array { len: l1, elem: e1 },
                TermKind::Array { len: l2, elem: e2 },
            ) => l1 == l2 && self.relate_inner(body, e1, e2, shared, ptr),
            (TermKind::Tuple { elements: a }, TermKind::Tuple { elements: b }) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b)
                        .all(|(x, y)| self.relate_inner(body, x, y, shared, ptr))
            }
            (
                TermKind::Function {
                    params: pa,
                    ret: ra,
                },
                TermKind::Function {
                    params: pb,
                    ret: rb,
                },
            ) => {
                pa.len() == pb.len()
                    && pa
                        .iter()
                        .zip(pb)
                        .all(|(x, y)| self.relate_inner(body, x, y, true, ptr))
                    && self.relate_inner(body, ra, rb, true, ptr)
            }
            _ => false,
        }
    }

    /// The term stored when a value is copied somewhere: temporaries move in
    /// as they are, places are copied into fresh slots.
    fn value_copy(&mut self, body: &mut Body, v: Val, ptr: &str) -> TypeTerm {
        if v.place {
            let copy = self.fresh_like(&v.term);
            self.relate(body, &copy, &v.term, ptr);
            copy
        } else {
            v.term
        }
    }

    fn lower_type(&mut self, body: &mut Body, t: &TypeExpr) -> Result<TypeTerm, CompilerError> {
        let mut quals: Vec<(Option<MutQualifier>, Option<Staging>, &str)> = Vec::new();
        let mut cur = t;
        loop {
            match &cur.kind {
                TypeExprKind::Mutability(q, inner) => {
                    quals.push((Some(*q), None, cur.ptr.as_str()));
                    cur = inner;
                }
                TypeExprKind::Staging(s, inner) => {
                    quals.push((None, Some(*s), cur.ptr.as_str()));
                    cur = inner;
                }
                _ => break,
            }
        }

        let (m, s) = self.fresh();
        let kind = match &cur.kind {
            TypeExprKind::Prim(prim) => TermKind::Primitive { prim: *prim },
            TypeExprKind::TypeValue | TypeExprKind::Literal => {
                body.constraints.unify_stage(
                    s,
                    LatticeValue::Concrete(Staging::Compiletime),
                    Origin::new(OriginKind::CompiletimeKind, &cur.ptr),
                );
                if matches!(cur.kind, TypeExprKind::Literal) {
                    TermKind::LiteralType
                } else {
                    TermKind::TypeValue
                }
            }
            TypeExprKind::Unit => TermKind::Unit,
            TypeExprKind::Adt(name) => match self.instantiate(body, name, &cur.ptr)? {
                Some(fields) => TermKind::Tuple { elements: fields },
                None => TermKind::Unit,
            },
            TypeExprKind::Pointer(inner) => TermKind::Pointer {
                pointee: Box::new(self.lower_type(body, inner)?),
            },
            TypeExprKind::Array { len, elem } => TermKind::Array {
                len: *len,
                elem: Box::new(self.lower_type(body, elem)?),
            },
            TypeExprKind::Tuple(items) => TermKind::Tuple {
                elements: items
                    .iter()
                    .map(|i| self.lower_type(body, i))
                    .collect::<Result<Vec<_>, _>>()?,
            },
            TypeExprKind::Function { params, ret } => TermKind::Function {
                params: params
                    .iter()
                    .map(|p| self.lower_type(body, p))
                    .collect::<Result<Vec<_>, _>>()?,
                ret: Box::new(self.lower_type(body, ret)?),
            },
            TypeExprKind::Mutability(..) | TypeExprKind::Staging(..) => {
                return Err(CompilerError::new(
                    CompileErrorKind::Internal,
                    "internal error: qualifier left after unwrapping".to_string(),
                ))
            }
        };

        for (mq, sq, ptr) in quals {
            match mq {
                Some(MutQualifier::Const) => body.constraints.unify_mut(
                    m,
                    LatticeValue::Concrete(Mutability::Const),
                    Origin::new(OriginKind::Annotation, ptr),
                ),
                Some(MutQualifier::Mut) => body.constraints.unify_mut(
                    m,
                    LatticeValue::Concrete(Mutability::Mut),
                    Origin::new(OriginKind::Annotation, ptr),
                ),
                Some(MutQualifier::AnyMut) | None => {}
            }
            if let Some(stage) = sq {
                body.constraints.unify_stage(
                    s,
                    LatticeValue::Concrete(stage),
                    Origin::new(OriginKind::Annotation, ptr),
                );
            }
        }
        Ok(TypeTerm::new(kind, m, s))
    }

    /// Instantiates the generic `name` at a use site and returns its copied
    /// signature, or `None` after reporting an unknown or recursive name.
    fn instantiate(
        &mut self,
        body: &mut Body,
        name: &str,
        ptr: &str,
    ) -> Result<Option<Vec<TypeTerm>>, CompilerError> {
        let Some(&ci) = self.component_of.get(name) else {
            self.diag(Diagnostic::error(
                TYPE_UNKNOWN_IDENT,
                Stage::Collect,
                ptr,
                format!("unknown generic: {name:?}"),
            ));
            return Ok(None);
        };

        if let Some(sigs) = self.building.get(&ci) {
            if self.component_kinds[ci] == GenericKind::Struct {
                self.diag(Diagnostic::error(
                    TYPE_MISMATCH,
                    Stage::Collect,
                    ptr,
                    format!("recursive type {name:?} has infinite size"),
                ));
                return Ok(None);
            }
            if body.component != Some(ci) {
                self.diag(Diagnostic::error(
                    TYPE_MISMATCH,
                    Stage::Collect,
                    ptr,
                    format!("{name:?} is used recursively through a function value"),
                ));
                return Ok(None);
            }
            let signature = sigs.get(name).cloned().ok_or_else(|| {
                CompilerError::new(
                    CompileErrorKind::Internal,
                    format!("internal error: missing signature for {name:?}"),
                )
            })?;
            body.sites.push(Site {
                generic: name.to_string(),
                ptr: ptr.to_string(),
                signature: signature.clone(),
                nested: Vec::new(),
                nodes: Vec::new(),
                slices: Vec::new(),
                recursive: true,
            });
            return Ok(Some(signature));
        }

        self.ensure_component(ci)?;
        let (mshift, sshift) = {
            let c = self.components.get(&ci).ok_or_else(|| {
                CompilerError::new(
                    CompileErrorKind::Internal,
                    "internal error: missing generic template".to_string(),
                )
            })?;
            (
                Shift {
                    start: c.mut_range.0,
                    end: c.mut_range.1,
                    base: self.next_mut,
                },
                Shift {
                    start: c.stage_range.0,
                    end: c.stage_range.1,
                    base: self.next_stage,
                },
            )
        };
        self.next_mut += mshift.len();
        self.next_stage += sshift.len();
        self.check_budget()?;

        let Some(c) = self.components.get(&ci) else {
            return Ok(None);
        };
        let rename = |ts: &[TypeTerm]| -> Vec<TypeTerm> {
            ts.iter().map(|t| t.renamed(mshift, sshift)).collect()
        };
        body.constraints.extend_renamed(&c.constraints, mshift, sshift);
        let signature = c.signatures.get(name).map(|s| rename(s)).unwrap_or_default();
        let site = Site {
            generic: name.to_string(),
            ptr: ptr.to_string(),
            signature: signature.clone(),
            nested: c.sites.iter().map(|s| s.renamed(mshift, sshift)).collect(),
            nodes: c
                .nodes
                .get(name)
                .map(|ns| ns.iter().map(|n| n.renamed(mshift, sshift)).collect())
                .unwrap_or_default(),
            slices: c
                .slices
                .get(name)
                .map(|ss| ss.iter().map(|s| s.renamed(mshift, sshift)).collect())
                .unwrap_or_default(),
            recursive: false,
        };
        trace!(generic = name, ptr, base = mshift.base, "instantiate");
        body.sites.push(site);
        Ok(Some(signature))
    }

    fn ensure_component(&mut self, ci: usize) -> Result<(), CompilerError> {
        if self.components.contains_key(&ci) || self.building.contains_key(&ci) {
            return Ok(());
        }
        let kind = self.component_kinds[ci];
        let members = self.component_members[ci].clone();
        let mut_start = self.next_mut;
        let stage_start = self.next_stage;
        let mut body = Body {
            component: Some(ci),
            ..Body::default()
        };
        let mut signatures: BTreeMap<String, Vec<TypeTerm>> = BTreeMap::new();
        let mut nodes: BTreeMap<String, Vec<NodeTerm>> = BTreeMap::new();
        let mut slices: BTreeMap<String, Vec<SliceSite>> = BTreeMap::new();

        match kind {
            GenericKind::Struct => {
                self.building.insert(ci, BTreeMap::new());
                for name in &members {
                    let Some(decl) = self.structs.get(name).copied() else {
                        continue;
                    };
                    let fields = decl
                        .fields
                        .iter()
                        .map(|f| self.lower_type(&mut body, f))
                        .collect::<Result<Vec<_>, _>>()?;
                    signatures.insert(name.to_string(), fields);
                }
            }
            GenericKind::Function => {
                let decls: Vec<&FunctionDecl> = members
                    .iter()
                    .filter_map(|n| self.functions.get(n).copied())
                    .collect();
                for f in &decls {
                    let mut sig = f
                        .params
                        .iter()
                        .map(|p| self.lower_type(&mut body, &p.ty))
                        .collect::<Result<Vec<_>, _>>()?;
                    sig.push(self.lower_type(&mut body, &f.result)?);
                    signatures.insert(f.name.clone(), sig);
                }
                self.building.insert(ci, signatures.clone());
                for f in &decls {
                    let sig = signatures.get(&f.name).cloned().unwrap_or_default();
                    self.collect_function_body(&mut body, f, &sig)?;
                    nodes.insert(f.name.clone(), std::mem::take(&mut body.nodes));
                    slices.insert(f.name.clone(), std::mem::take(&mut body.slices));
                }
            }
        }

        self.building.remove(&ci);
        for site in body.sites.iter_mut().filter(|s| s.recursive) {
            site.nodes = nodes.get(&site.generic).cloned().unwrap_or_default();
            site.slices = slices.get(&site.generic).cloned().unwrap_or_default();
        }
        debug!(
            generic = members.join(",").as_str(),
            mut_vars = self.next_mut - mut_start,
            stage_vars = self.next_stage - stage_start,
            constraints = body.constraints.len(),
            "built generic template"
        );
        self.components.insert(
            ci,
            Component {
                kind,
                members: members.iter().map(|m| m.to_string()).collect(),
                mut_range: (mut_start, self.next_mut),
                stage_range: (stage_start, self.next_stage),
                constraints: body.constraints,
                sites: body.sites,
                signatures,
                nodes,
                slices,
            },
        );
        Ok(())
    }

    fn collect_function_body(
        &mut self,
        body: &mut Body,
        f: &FunctionDecl,
        sig: &[TypeTerm],
    ) -> Result<(), CompilerError> {
        body.scope.clear();
        for (p, term) in f.params.iter().zip(sig) {
            body.nodes.push(NodeTerm {
                ptr: p.ptr.clone(),
                name: Some(p.name.clone()),
                term: term.clone(),
            });
            body.scope.insert(
                p.name.clone(),
                Local {
                    term: term.clone(),
                    literal: is_literal_value(term),
                },
            );
        }
        body.ret = sig.last().cloned();
        for s in &f.body {
            self.collect_stmt(body, s)?;
        }
        Ok(())
    }

    fn bind_local(&mut self, body: &mut Body, name: &str, ptr: &str, term: TypeTerm) {
        body.nodes.push(NodeTerm {
            ptr: ptr.to_string(),
            name: Some(name.to_string()),
            term: term.clone(),
        });
        let literal = is_literal_value(&term);
        body.scope.insert(name.to_string(), Local { term, literal });
    }

    /// Declares a `let`/`static` and returns its term.
    fn declare(
        &mut self,
        body: &mut Body,
        storage: Storage,
        ty: Option<&TypeExpr>,
        init: &Expr,
        ptr: &str,
    ) -> Result<Option<TypeTerm>, CompilerError> {
        let dst = match ty {
            Some(t) => {
                let dst = self.lower_type(body, t)?;
                if let Some(v) = self.infer_expr(body, init, Some(&dst))? {
                    self.relate(body, &dst, &v.term, &init.ptr);
                }
                dst
            }
            None => {
                let Some(v) = self.infer_expr(body, init, None)? else {
                    if matches!(init.kind, ExprKind::Uninit) {
                        self.diag(Diagnostic::error(
                            TYPE_MISMATCH,
                            Stage::Collect,
                            ptr,
                            "uninit needs a type annotation",
                        ));
                    }
                    return Ok(None);
                };
                let dst = self.fresh_like(&v.term);
                self.relate(body, &dst, &v.term, &init.ptr);
                dst
            }
        };
        if let Some(m) = explicit_mutability(init) {
            for node in by_value_nodes(&dst) {
                body.constraints.unify_mut(
                    node.mutability,
                    LatticeValue::Concrete(m),
                    Origin::new(OriginKind::ExplicitCoercion, &init.ptr),
                );
            }
        }
        if storage == Storage::Static {
            for node in by_value_nodes(&dst) {
                body.constraints.default_stage(
                    node.staging,
                    Staging::Runtime,
                    DefaultPriority::Static,
                    Origin::new(OriginKind::StaticStorage, ptr),
                );
                body.constraints.check(StagingCheck::NotCompiletime {
                    slot: node.staging,
                    origin: Origin::new(OriginKind::StaticStorage, ptr),
                });
            }
        }
        self.check_budget()?;
        Ok(Some(dst))
    }

    fn collect_stmt(&mut self, body: &mut Body, s: &Stmt) -> Result<(), CompilerError> {
        match &s.kind {
            StmtKind::Let { name, ty, init } => {
                if let Some(term) = self.declare(body, Storage::Let, ty.as_ref(), init, &s.ptr)? {
                    self.bind_local(body, name, &s.ptr, term);
                }
            }
            StmtKind::Static { name, ty, init } => {
                if let Some(term) = self.declare(body, Storage::Static, Some(ty), init, &s.ptr)? {
                    self.bind_local(body, name, &s.ptr, term);
                }
            }
            StmtKind::Set { place, value } => {
                let target = self.infer_expr(body, place, None)?;
                match target {
                    Some(t) if t.place => {
                        body.constraints.unify_mut(
                            t.term.mutability,
                            LatticeValue::Concrete(Mutability::Mut),
                            Origin::new(OriginKind::WriteThrough, &s.ptr),
                        );
                        if let Some(v) = self.infer_expr(body, value, Some(&t.term))? {
                            self.relate(body, &t.term, &v.term, &value.ptr);
                        }
                    }
                    _ => {
                        self.diag(Diagnostic::error(
                            TYPE_PLACE_EXPECTED,
                            Stage::Collect,
                            &place.ptr,
                            "assignment target is not a place",
                        ));
                        self.infer_expr(body, value, None)?;
                    }
                }
            }
            StmtKind::Return(e) => match body.ret.clone() {
                Some(ret) => {
                    if let Some(v) = self.infer_expr(body, e, Some(&ret))? {
                        self.relate(body, &ret, &v.term, &e.ptr);
                    }
                }
                None => {
                    self.diag(Diagnostic::error(
                        TYPE_MISMATCH,
                        Stage::Collect,
                        &s.ptr,
                        "return outside of a function",
                    ));
                }
            },
            StmtKind::Expr(e) => {
                self.infer_expr(body, e, None)?;
            }
        }
        Ok(())
    }

    fn literal(&mut self, body: &mut Body, ptr: &str) -> Val {
        let (m, s) = self.fresh();
        body.constraints.default_stage(
            s,
            Staging::Compiletime,
            DefaultPriority::Literal,
            Origin::new(OriginKind::LiteralDefault, ptr),
        );
        Val::temp(TypeTerm::new(TermKind::LiteralType, m, s), true)
    }

    fn lookup(&self, body: &Body, name: &str) -> Option<Local> {
        body.scope
            .get(name)
            .or_else(|| self.globals.get(name))
            .cloned()
    }

    fn infer_expr(
        &mut self,
        body: &mut Body,
        e: &Expr,
        want: Option<&TypeTerm>,
    ) -> Result<Option<Val>, CompilerError> {
        let val = match &e.kind {
            ExprKind::Int(_) | ExprKind::Bool(_) | ExprKind::Char(_) | ExprKind::Float(_) => {
                self.literal(body, &e.ptr)
            }
            ExprKind::Str(s) => {
                let lit = self.literal(body, &e.ptr);
                let (m, _) = self.fresh();
                let term = TypeTerm::new(
                    TermKind::Array {
                        len: s.len() as u64,
                        elem: Box::new(lit.term.clone()),
                    },
                    m,
                    lit.term.staging,
                );
                Val::temp(term, true)
            }
            ExprKind::Uninit => return Ok(None),
            ExprKind::Ident(name) => {
                if let Some(local) = self.lookup(body, name) {
                    Val {
                        term: local.term,
                        literal: local.literal,
                        place: true,
                    }
                } else if let Some(sig) = self.externs.get(name.as_str()) {
                    let kind = TermKind::Function {
                        params: sig.params.clone(),
                        ret: Box::new(sig.ret.clone()),
                    };
                    let (m, s) = self.fresh();
                    Val::temp(TypeTerm::new(kind, m, s), false)
                } else if self.functions.contains_key(name.as_str()) {
                    let Some(mut sig) = self.instantiate(body, name, &e.ptr)? else {
                        return Ok(None);
                    };
                    let ret = sig.pop().unwrap_or_else(|| {
                        TypeTerm::new(
                            TermKind::Unit,
                            LatticeValue::Concrete(Mutability::Const),
                            LatticeValue::Concrete(Staging::Runtime),
                        )
                    });
                    let (m, s) = self.fresh();
                    let kind = TermKind::Function {
                        params: sig,
                        ret: Box::new(ret),
                    };
                    Val::temp(TypeTerm::new(kind, m, s), false)
                } else {
                    self.diag(Diagnostic::error(
                        TYPE_UNKNOWN_IDENT,
                        Stage::Collect,
                        &e.ptr,
                        format!("unknown identifier: {name:?}"),
                    ));
                    return Ok(None);
                }
            }
            ExprKind::Deref(inner) => {
                let Some(v) = self.infer_expr(body, inner, None)? else {
                    return Ok(None);
                };
                match v.term.pointee() {
                    Some(p) => Val {
                        term: p.clone(),
                        literal: is_literal_value(p),
                        place: true,
                    },
                    None => {
                        self.diag(Diagnostic::error(
                            TYPE_MISMATCH,
                            Stage::Collect,
                            &e.ptr,
                            format!("cannot dereference {}", shape(&v.term)),
                        ));
                        return Ok(None);
                    }
                }
            }
            ExprKind::Index(base, idx) => {
                self.infer_expr(body, idx, None)?;
                let Some(v) = self.infer_expr(body, base, None)? else {
                    return Ok(None);
                };
                let elem = match slice::backing_array(&v.term) {
                    Some((_, elem)) => Some(elem.clone()),
                    None => match &v.term.kind {
                        TermKind::Tuple { elements } if elements.len() == 2 => {
                            elements[0].pointee().cloned()
                        }
                        _ => None,
                    },
                };
                match elem {
                    Some(elem) => Val {
                        literal: elem.is_literal_kind(),
                        term: elem,
                        place: true,
                    },
                    None => {
                        self.diag(Diagnostic::error(
                            TYPE_MISMATCH,
                            Stage::Collect,
                            &e.ptr,
                            format!("cannot index {}", shape(&v.term)),
                        ));
                        return Ok(None);
                    }
                }
            }
            ExprKind::Field(base, n) => {
                let Some(v) = self.infer_expr(body, base, None)? else {
                    return Ok(None);
                };
                let tuple = v.term.pointee().unwrap_or(&v.term);
                match &tuple.kind {
                    TermKind::Tuple { elements } if *n < elements.len() => Val {
                        term: elements[*n].clone(),
                        literal: is_literal_value(&elements[*n]),
                        place: true,
                    },
                    _ => {
                        self.diag(Diagnostic::error(
                            TYPE_MISMATCH,
                            Stage::Collect,
                            &e.ptr,
                            format!("no field {n} on {}", shape(&v.term)),
                        ));
                        return Ok(None);
                    }
                }
            }
            ExprKind::Addr(inner) => {
                let Some(v) = self.infer_expr(body, inner, None)? else {
                    return Ok(None);
                };
                let (m, s) = self.fresh();
                body.constraints.flow_stage(
                    v.term.staging,
                    s,
                    Origin::new(OriginKind::Flow, &e.ptr),
                );
                Val::temp(TypeTerm::pointer(v.term, m, s), false)
            }
            ExprKind::Slice { base, lo, hi } => {
                let bound = |x: &Expr| match x.kind {
                    ExprKind::Int(i) => u64::try_from(i).ok(),
                    _ => None,
                };
                self.infer_expr(body, lo, None)?;
                self.infer_expr(body, hi, None)?;
                let Some(v) = self.infer_expr(body, base, None)? else {
                    return Ok(None);
                };
                let mut fresh_slots = Vec::new();
                let shape_out = slice::build_shape(&v.term, want, &mut || {
                    let slots = self.fresh();
                    fresh_slots.push(slots.1);
                    slots
                });
                let Some(sh) = shape_out else {
                    self.diag(
                        Diagnostic::error(
                            slice::SLICE_BASE_NOT_SEQUENCE,
                            Stage::Collect,
                            &e.ptr,
                            format!("cannot slice {}", shape(&v.term)),
                        )
                        .with_data("base", json!(shape(&v.term))),
                    );
                    return Ok(None);
                };
                for s in fresh_slots {
                    body.constraints.flow_stage(
                        v.term.staging,
                        s,
                        Origin::new(OriginKind::Flow, &e.ptr),
                    );
                }
                body.slices.push(SliceSite {
                    ptr: e.ptr.clone(),
                    term: sh.term.clone(),
                    backing_len: sh.backing_len,
                    lo: bound(lo),
                    hi: bound(hi),
                });
                Val::temp(sh.term, false)
            }
            ExprKind::Call { callee, args } => return self.infer_call(body, e, callee, args),
            ExprKind::Coerce(c, inner) => {
                let Some(v) = self.infer_expr(body, inner, want)? else {
                    return Ok(None);
                };
                self.coerce(body, *c, v, &e.ptr)
            }
            ExprKind::Array(items) => {
                let elem_want = match want.map(|w| &w.kind) {
                    Some(TermKind::Array { elem, .. }) => Some(elem.as_ref().clone()),
                    _ => None,
                };
                let mut terms = Vec::with_capacity(items.len());
                let mut explicit = Vec::with_capacity(items.len());
                for item in items {
                    let Some(v) = self.infer_expr(body, item, elem_want.as_ref())? else {
                        if !matches!(item.kind, ExprKind::Uninit) {
                            return Ok(None);
                        }
                        explicit.push(None);
                        continue;
                    };
                    let term = self.value_copy(body, v, &item.ptr);
                    let mut stated = term.clone();
                    if let Some(m) = explicit_mutability(item) {
                        stated.mutability = LatticeValue::Concrete(m);
                    }
                    explicit.push(Some(stated));
                    terms.push((term, item.ptr.as_str()));
                }
                let template = match (terms.first(), elem_want) {
                    (Some((first, _)), _) => self.fresh_like(&first.clone()),
                    (None, Some(w)) => self.fresh_like(&w),
                    (None, None) => {
                        let message = if items.is_empty() {
                            "empty array literal needs a type annotation"
                        } else {
                            "array of uninit elements needs a type annotation"
                        };
                        self.diag(Diagnostic::error(
                            TYPE_MISMATCH,
                            Stage::Collect,
                            &e.ptr,
                            message,
                        ));
                        return Ok(None);
                    }
                };
                let (m, s) = self.fresh();
                let array = match TypeTerm::array_from_elements(template, &explicit, m, s) {
                    Ok(a) => a,
                    Err(het) => {
                        let at = items.get(het.index).map_or(e.ptr.as_str(), |i| i.ptr.as_str());
                        self.diag(
                            Diagnostic::error(
                                ARRAY_HETEROGENEOUS,
                                Stage::Collect,
                                at,
                                format!(
                                    "array elements must share one mutability: {} and {} (wrap elements in a tuple)",
                                    het.first.as_str(),
                                    het.second.as_str()
                                ),
                            )
                            .with_related(&e.ptr),
                        );
                        return Ok(None);
                    }
                };
                if let TermKind::Array { elem, .. } = &array.kind {
                    let mut literal = true;
                    for (t, ptr) in &terms {
                        literal &= is_literal_value(t);
                        self.relate(body, elem, t, ptr);
                    }
                    body.constraints.flow_stage(
                        elem.staging,
                        s,
                        Origin::new(OriginKind::Flow, &e.ptr),
                    );
                    let literal = literal && !terms.is_empty() && terms.len() == items.len();
                    return Ok(Some(Val::temp(array.clone(), literal)));
                }
                Val::temp(array, false)
            }
            ExprKind::Tuple(items) => {
                let wants: Vec<Option<&TypeTerm>> = match want.map(|w| &w.kind) {
                    Some(TermKind::Tuple { elements }) if elements.len() == items.len() => {
                        elements.iter().map(Some).collect()
                    }
                    _ => vec![None; items.len()],
                };
                let mut elements = Vec::with_capacity(items.len());
                for (item, w) in items.iter().zip(wants) {
                    match self.infer_expr(body, item, w)? {
                        Some(v) => elements.push(self.value_copy(body, v, &item.ptr)),
                        None if !matches!(item.kind, ExprKind::Uninit) => return Ok(None),
                        None => {
                            let Some(w) = w else {
                                self.diag(Diagnostic::error(
                                    TYPE_MISMATCH,
                                    Stage::Collect,
                                    &item.ptr,
                                    "uninit tuple element needs a type annotation",
                                ));
                                return Ok(None);
                            };
                            elements.push(self.fresh_like(w));
                        }
                    }
                }
                let (m, s) = self.fresh();
                for el in &elements {
                    body.constraints
                        .flow_stage(el.staging, s, Origin::new(OriginKind::Flow, &e.ptr));
                }
                Val::temp(TypeTerm::tuple(elements, m, s), false)
            }
            ExprKind::Cast(inner, ty) => {
                let v = self.infer_expr(body, inner, None)?;
                let t = self.lower_type(body, ty)?;
                if let Some(v) = v {
                    body.constraints.flow_stage(
                        v.term.staging,
                        t.staging,
                        Origin::new(OriginKind::Flow, &e.ptr),
                    );
                }
                let literal = t.is_literal_kind();
                Val::temp(t, literal)
            }
            ExprKind::TypeOf(ty) => {
                self.lower_type(body, ty)?;
                let (m, s) = self.fresh();
                body.constraints.unify_stage(
                    s,
                    LatticeValue::Concrete(Staging::Compiletime),
                    Origin::new(OriginKind::CompiletimeKind, &e.ptr),
                );
                Val::temp(TypeTerm::new(TermKind::TypeValue, m, s), false)
            }
            ExprKind::Binary(op, a, b) => {
                let va = self.infer_expr(body, a, None)?;
                let vb = self.infer_expr(body, b, None)?;
                let (Some(va), Some(vb)) = (va, vb) else {
                    return Ok(None);
                };
                let origin = || Origin::new(OriginKind::Flow, &e.ptr);
                if va.literal && vb.literal {
                    let (m, s) = self.fresh();
                    body.constraints.flow_stage(va.term.staging, s, origin());
                    body.constraints.flow_stage(vb.term.staging, s, origin());
                    Val::temp(TypeTerm::new(TermKind::LiteralType, m, s), true)
                } else if op.is_comparison() {
                    let (m, s) = self.fresh();
                    body.constraints.flow_stage(va.term.staging, s, origin());
                    body.constraints.flow_stage(vb.term.staging, s, origin());
                    Val::temp(TypeTerm::primitive(Primitive::Bool, m, s), false)
                } else {
                    let base = if va.literal { &vb.term } else { &va.term };
                    let result = self.fresh_like(base);
                    self.relate(body, &result, &va.term, &a.ptr);
                    self.relate(body, &result, &vb.term, &b.ptr);
                    Val::temp(result, false)
                }
            }
        };
        self.check_budget()?;
        Ok(Some(val))
    }

    fn coerce(
        &mut self,
        body: &mut Body,
        c: Coercion,
        v: Val,
        ptr: &str,
    ) -> Val {
        let origin = || Origin::new(OriginKind::ExplicitCoercion, ptr);
        match c {
            Coercion::Const | Coercion::Mut => {
                let value = if c == Coercion::Const {
                    Mutability::Const
                } else {
                    Mutability::Mut
                };
                for node in by_value_nodes(&v.term) {
                    body.constraints.unify_mut(
                        node.mutability,
                        LatticeValue::Concrete(value),
                        origin(),
                    );
                }
                v
            }
            Coercion::Compiletime => {
                for node in by_value_nodes(&v.term) {
                    body.constraints.unify_stage(
                        node.staging,
                        LatticeValue::Concrete(Staging::Compiletime),
                        origin(),
                    );
                }
                v
            }
            Coercion::Runtime if v.literal => {
                let target = if v.place {
                    let copy = self.fresh_like(&v.term);
                    self.relate(body, &copy, &v.term, ptr);
                    copy
                } else {
                    v.term
                };
                for node in by_value_nodes(&target) {
                    body.constraints.unify_stage(
                        node.staging,
                        LatticeValue::Concrete(Staging::Runtime),
                        origin(),
                    );
                }
                Val::temp(target, true)
            }
            Coercion::Runtime => {
                body.constraints.check(StagingCheck::RuntimeEligible {
                    slot: v.term.staging,
                    origin: Origin::new(OriginKind::RuntimeCoercion, ptr),
                });
                v
            }
        }
    }

    fn infer_call(
        &mut self,
        body: &mut Body,
        e: &Expr,
        callee: &str,
        args: &[Expr],
    ) -> Result<Option<Val>, CompilerError> {
        let (params, ret, construct) = if let Some(sig) = self.externs.get(callee) {
            (sig.params.clone(), Some(sig.ret.clone()), false)
        } else if self.functions.contains_key(callee) {
            let Some(mut sig) = self.instantiate(body, callee, &e.ptr)? else {
                return Ok(None);
            };
            let ret = sig.pop();
            (sig, ret, false)
        } else if self.structs.contains_key(callee) {
            let Some(fields) = self.instantiate(body, callee, &e.ptr)? else {
                return Ok(None);
            };
            (fields, None, true)
        } else {
            self.diag(Diagnostic::error(
                CALL_UNKNOWN_CALLEE,
                Stage::Collect,
                &e.ptr,
                format!("unknown callee: {callee:?}"),
            ));
            for a in args {
                self.infer_expr(body, a, None)?;
            }
            return Ok(None);
        };

        if params.len() != args.len() {
            self.diag(
                Diagnostic::error(
                    CALL_ARITY,
                    Stage::Collect,
                    &e.ptr,
                    format!(
                        "{callee:?} expects {} argument(s) got {}",
                        params.len(),
                        args.len()
                    ),
                )
                .with_data("expected", json!(params.len()))
                .with_data("got", json!(args.len())),
            );
        }
        for (i, a) in args.iter().enumerate() {
            let want = params.get(i);
            let Some(v) = self.infer_expr(body, a, want)? else {
                continue;
            };
            if let Some(p) = want {
                self.relate(body, p, &v.term, &a.ptr);
            }
        }

        if construct {
            let (m, s) = self.fresh();
            for p in &params {
                body.constraints
                    .flow_stage(p.staging, s, Origin::new(OriginKind::Flow, &e.ptr));
            }
            return Ok(Some(Val::temp(TypeTerm::tuple(params, m, s), false)));
        }
        Ok(ret.map(|r| Val::temp(r, false)))
    }

    fn collect_extern_signature(
        &mut self,
        body: &mut Body,
        decl: &ExternDecl,
        exempt: bool,
    ) -> Result<Vec<TypeTerm>, CompilerError> {
        let mut sig = decl
            .params
            .iter()
            .map(|p| self.lower_type(body, &p.ty))
            .collect::<Result<Vec<_>, _>>()?;
        sig.push(self.lower_type(body, &decl.result)?);
        if !exempt {
            for t in &sig {
                t.walk(&mut |node, _| {
                    body.constraints.unify_stage(
                        node.staging,
                        LatticeValue::Concrete(Staging::Runtime),
                        Origin::new(OriginKind::ExternBoundary, &decl.ptr),
                    );
                });
            }
        }
        Ok(sig)
    }
}

/// Collects every constraint of `unit` into one set for the unit scope.
pub fn collect_unit(unit: &Unit, max_vars: usize) -> Result<Collected, CompilerError> {
    let functions: Vec<&FunctionDecl> = unit.functions().collect();
    let structs: Vec<&StructDecl> = unit.structs().collect();

    let mut component_of = BTreeMap::new();
    let mut component_members = Vec::new();
    let mut component_kinds = Vec::new();
    for s in &structs {
        component_of.insert(s.name.as_str(), component_members.len());
        component_members.push(vec![s.name.as_str()]);
        component_kinds.push(GenericKind::Struct);
    }
    let fn_components = call_graph_components(&functions);
    let first_fn_component = component_members.len();
    for comp in fn_components {
        for name in &comp {
            component_of.insert(*name, component_members.len());
        }
        component_members.push(comp);
        component_kinds.push(GenericKind::Function);
    }

    let mut c = Collector {
        max_vars,
        next_mut: 0,
        next_stage: 0,
        functions: functions.iter().map(|f| (f.name.as_str(), *f)).collect(),
        structs: structs.iter().map(|s| (s.name.as_str(), *s)).collect(),
        externs: BTreeMap::new(),
        globals: BTreeMap::new(),
        component_of,
        component_members,
        component_kinds,
        components: BTreeMap::new(),
        building: BTreeMap::new(),
        diagnostics: Vec::new(),
    };

    for ci in 0..first_fn_component {
        c.ensure_component(ci)?;
    }

    let mut main = Body::default();
    let call_counts = unit.call_counts();
    let mut extern_decls = Vec::new();
    for decl in unit.externs() {
        let exempt = decl.body.is_some() && call_counts.get(&decl.name) == Some(&1);
        let mut sig = c.collect_extern_signature(&mut main, decl, exempt)?;
        let ret = sig.pop().unwrap_or_else(|| {
            TypeTerm::new(
                TermKind::Unit,
                LatticeValue::Concrete(Mutability::Const),
                LatticeValue::Concrete(Staging::Runtime),
            )
        });
        c.externs.insert(
            decl.name.as_str(),
            ExternSig {
                params: sig,
                ret,
            },
        );
        extern_decls.push((decl, exempt));
    }

    for g in unit.globals() {
        if let Some(term) = c.declare(&mut main, g.storage, g.ty.as_ref(), &g.init, &g.ptr)? {
            main.nodes.push(NodeTerm {
                ptr: g.ptr.clone(),
                name: Some(g.name.clone()),
                term: term.clone(),
            });
            let literal = is_literal_value(&term);
            c.globals.insert(g.name.clone(), Local { term, literal });
        }
    }

    for ci in first_fn_component..c.component_members.len() {
        c.ensure_component(ci)?;
    }

    let mut externs = Vec::new();
    for (decl, exempt) in extern_decls {
        let signature = c
            .externs
            .get(decl.name.as_str())
            .map(|s| {
                let mut all = s.params.clone();
                all.push(s.ret.clone());
                all
            })
            .unwrap_or_default();
        let mut info = ExternInfo {
            name: decl.name.clone(),
            ptr: decl.ptr.clone(),
            signature: signature.clone(),
            exempt,
            nodes: Vec::new(),
            slices: Vec::new(),
        };
        if let Some(stmts) = &decl.body {
            let mut b = Body::default();
            let as_fn = FunctionDecl {
                ptr: decl.ptr.clone(),
                name: decl.name.clone(),
                params: decl.params.clone(),
                result: decl.result.clone(),
                body: stmts.clone(),
            };
            c.collect_function_body(&mut b, &as_fn, &signature)?;
            main.constraints
                .extend_renamed(&b.constraints, Shift::identity(), Shift::identity());
            main.sites.append(&mut b.sites);
            info.nodes = b.nodes;
            info.slices = b.slices;
        }
        externs.push(info);
    }

    for s in &unit.body {
        c.collect_stmt(&mut main, s)?;
    }

    let templates = c
        .components
        .values()
        .map(|comp| Template {
            kind: comp.kind,
            members: comp.members.clone(),
            constraints: comp.constraints.clone(),
        })
        .collect();

    debug!(
        unit = unit.name.as_str(),
        mut_vars = c.next_mut,
        stage_vars = c.next_stage,
        constraints = main.constraints.len(),
        sites = main.sites.len(),
        "collected unit"
    );

    Ok(Collected {
        constraints: main.constraints,
        mut_vars: c.next_mut,
        stage_vars: c.next_stage,
        sites: main.sites,
        nodes: main.nodes,
        slices: main.slices,
        externs,
        templates,
        diagnostics: c.diagnostics,
    })
}
