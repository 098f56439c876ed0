//! Type terms whose mutability and staging slots are lattice values.
//!
//! Every node of a [`TypeTerm`] carries its own mutability and staging slot.
//! For a pointer node those are the address slots (`ptr_mut`/`ptr_stage`) and
//! the pointee keeps its own; for an array node the element node's slots are
//! `elem_mut`/`elem_stage` and apply to every element uniformly.

use std::collections::BTreeSet;
use std::fmt;

use axle_targets::PointerWidth;
use serde::Serialize;

pub trait Axis: Copy + Eq + Ord + fmt::Debug + Serialize + Send + Sync + 'static {
    const NAME: &'static str;
    /// Value given to a variable that no constraint reaches.
    const FALLBACK: Self;

    fn as_str(self) -> &'static str;

    /// Combines two values flowing into the same slot.
    fn join(self, other: Self) -> Self;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutability {
    Const,
    Mut,
}

impl Axis for Mutability {
    const NAME: &'static str = "mutability";
    const FALLBACK: Self = Mutability::Const;

    fn as_str(self) -> &'static str {
        match self {
            Mutability::Const => "const",
            Mutability::Mut => "mut",
        }
    }

    fn join(self, other: Self) -> Self {
        if self == Mutability::Mut || other == Mutability::Mut {
            Mutability::Mut
        } else {
            Mutability::Const
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Staging {
    Compiletime,
    Runtime,
}

impl Axis for Staging {
    const NAME: &'static str = "staging";
    const FALLBACK: Self = Staging::Runtime;

    fn as_str(self) -> &'static str {
        match self {
            Staging::Compiletime => "compiletime",
            Staging::Runtime => "runtime",
        }
    }

    fn join(self, other: Self) -> Self {
        if self == Staging::Runtime || other == Staging::Runtime {
            Staging::Runtime
        } else {
            Staging::Compiletime
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct VarId(pub u32);

/// Moves the variables allocated in `[start, end)` so that `start` lands on
/// `base`. Variables outside the range are left alone; they belong to
/// declarations shared by every copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shift {
    pub start: u32,
    pub end: u32,
    pub base: u32,
}

impl Shift {
    pub fn identity() -> Self {
        Self {
            start: 0,
            end: 0,
            base: 0,
        }
    }

    pub fn len(self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(self) -> bool {
        self.end == self.start
    }

    pub fn apply(self, v: VarId) -> VarId {
        if v.0 >= self.start && v.0 < self.end {
            VarId(v.0 - self.start + self.base)
        } else {
            v
        }
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatticeValue<D> {
    Concrete(D),
    Variable(VarId),
}

impl<D: Axis> LatticeValue<D> {
    pub fn as_concrete(self) -> Option<D> {
        match self {
            LatticeValue::Concrete(v) => Some(v),
            LatticeValue::Variable(_) => None,
        }
    }

    pub fn as_var(self) -> Option<VarId> {
        match self {
            LatticeValue::Variable(id) => Some(id),
            LatticeValue::Concrete(_) => None,
        }
    }

    pub fn renamed(self, shift: Shift) -> Self {
        match self {
            LatticeValue::Variable(id) => LatticeValue::Variable(shift.apply(id)),
            c => c,
        }
    }
}

/// Outcome of unifying two lattice values that are already class representatives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unified<D> {
    Same,
    Bind { var: VarId, to: LatticeValue<D> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueMismatch<D> {
    pub lhs: D,
    pub rhs: D,
}

/// Decides how two lattice values unify. There is no occurs check: axis values
/// are never recursive.
pub fn unify_values<D: Axis>(
    a: LatticeValue<D>,
    b: LatticeValue<D>,
) -> Result<Unified<D>, ValueMismatch<D>> {
    match (a, b) {
        (LatticeValue::Concrete(x), LatticeValue::Concrete(y)) => {
            if x == y {
                Ok(Unified::Same)
            } else {
                Err(ValueMismatch { lhs: x, rhs: y })
            }
        }
        (LatticeValue::Variable(x), LatticeValue::Variable(y)) if x == y => Ok(Unified::Same),
        (LatticeValue::Variable(var), to) => Ok(Unified::Bind { var, to }),
        (to, LatticeValue::Variable(var)) => Ok(Unified::Bind { var, to }),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Bool,
    Usize,
    Isize,
}

impl Primitive {
    pub fn parse_named(name: &str) -> Option<Self> {
        match name {
            "u8" => Some(Primitive::U8),
            "u16" => Some(Primitive::U16),
            "u32" => Some(Primitive::U32),
            "u64" => Some(Primitive::U64),
            "i8" => Some(Primitive::I8),
            "i16" => Some(Primitive::I16),
            "i32" => Some(Primitive::I32),
            "i64" => Some(Primitive::I64),
            "f32" => Some(Primitive::F32),
            "f64" => Some(Primitive::F64),
            "bool" => Some(Primitive::Bool),
            "usize" => Some(Primitive::Usize),
            "isize" => Some(Primitive::Isize),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
            Primitive::Bool => "bool",
            Primitive::Usize => "usize",
            Primitive::Isize => "isize",
        }
    }

    pub fn is_pointer_sized(self) -> bool {
        matches!(self, Primitive::Usize | Primitive::Isize)
    }

    pub fn is_unsigned_int(self) -> bool {
        matches!(
            self,
            Primitive::U8 | Primitive::U16 | Primitive::U32 | Primitive::U64 | Primitive::Usize
        )
    }

    /// Bit width; pointer-sized integers need the target width.
    pub fn bits(self, pointer_width: Option<PointerWidth>) -> Option<u8> {
        match self {
            Primitive::U8 | Primitive::I8 | Primitive::Bool => Some(8),
            Primitive::U16 | Primitive::I16 => Some(16),
            Primitive::U32 | Primitive::I32 | Primitive::F32 => Some(32),
            Primitive::U64 | Primitive::I64 | Primitive::F64 => Some(64),
            Primitive::Usize | Primitive::Isize => pointer_width.map(PointerWidth::bits),
        }
    }

    /// The fixed-width integer a pointer-sized one becomes on a target.
    pub fn with_pointer_width(self, pointer_width: PointerWidth) -> Self {
        match (self, pointer_width) {
            (Primitive::Usize, PointerWidth::W32) => Primitive::U32,
            (Primitive::Usize, PointerWidth::W64) => Primitive::U64,
            (Primitive::Isize, PointerWidth::W32) => Primitive::I32,
            (Primitive::Isize, PointerWidth::W64) => Primitive::I64,
            (p, _) => p,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TermKind {
    Primitive { prim: Primitive },
    Pointer { pointee: Box<TypeTerm> },
    Array { len: u64, elem: Box<TypeTerm> },
    Tuple { elements: Vec<TypeTerm> },
    TypeValue,
    LiteralType,
    Unit,
    Function { params: Vec<TypeTerm>, ret: Box<TypeTerm> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TypeTerm {
    pub mutability: LatticeValue<Mutability>,
    pub staging: LatticeValue<Staging>,
    #[serde(flatten)]
    pub kind: TermKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeterogeneousArrayMutability {
    pub first: Mutability,
    pub second: Mutability,
    pub index: usize,
}

impl TypeTerm {
    pub fn new(
        kind: TermKind,
        mutability: LatticeValue<Mutability>,
        staging: LatticeValue<Staging>,
    ) -> Self {
        Self {
            mutability,
            staging,
            kind,
        }
    }

    pub fn primitive(
        prim: Primitive,
        mutability: LatticeValue<Mutability>,
        staging: LatticeValue<Staging>,
    ) -> Self {
        Self::new(TermKind::Primitive { prim }, mutability, staging)
    }

    pub fn pointer(
        pointee: TypeTerm,
        ptr_mut: LatticeValue<Mutability>,
        ptr_stage: LatticeValue<Staging>,
    ) -> Self {
        Self::new(
            TermKind::Pointer {
                pointee: Box::new(pointee),
            },
            ptr_mut,
            ptr_stage,
        )
    }

    pub fn tuple(
        elements: Vec<TypeTerm>,
        mutability: LatticeValue<Mutability>,
        staging: LatticeValue<Staging>,
    ) -> Self {
        Self::new(TermKind::Tuple { elements }, mutability, staging)
    }

    /// Builds the array type of an array literal. `elem` is the element slot
    /// shared by every element; it adopts the elements' explicit mutability.
    /// `None` marks an `uninit` element, which only takes the shared slot.
    pub fn array_from_elements(
        mut elem: TypeTerm,
        elements: &[Option<TypeTerm>],
        mutability: LatticeValue<Mutability>,
        staging: LatticeValue<Staging>,
    ) -> Result<Self, HeterogeneousArrayMutability> {
        if let Some(m) = explicit_element_mutability(elements)? {
            elem.mutability = LatticeValue::Concrete(m);
        }
        Ok(Self::new(
            TermKind::Array {
                len: elements.len() as u64,
                elem: Box::new(elem),
            },
            mutability,
            staging,
        ))
    }

    pub fn is_literal_kind(&self) -> bool {
        matches!(self.kind, TermKind::LiteralType)
    }

    pub fn pointee(&self) -> Option<&TypeTerm> {
        match &self.kind {
            TermKind::Pointer { pointee } => Some(pointee),
            _ => None,
        }
    }

    /// Visits every node; the flag is true for nodes reached through a pointer
    /// or a function signature, whose storage is shared rather than copied.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a TypeTerm, bool)) {
        fn go<'a>(t: &'a TypeTerm, shared: bool, f: &mut dyn FnMut(&'a TypeTerm, bool)) {
            f(t, shared);
            match &t.kind {
                TermKind::Pointer { pointee } => go(pointee, true, f),
                TermKind::Array { elem, .. } => go(elem, shared, f),
                TermKind::Tuple { elements } => {
                    for e in elements {
                        go(e, shared, f);
                    }
                }
                TermKind::Function { params, ret } => {
                    for p in params {
                        go(p, true, f);
                    }
                    go(ret, true, f);
                }
                TermKind::Primitive { .. }
                | TermKind::TypeValue
                | TermKind::LiteralType
                | TermKind::Unit => {}
            }
        }
        go(self, false, f)
    }

    pub fn free_mutability_vars(&self) -> BTreeSet<VarId> {
        let mut out = BTreeSet::new();
        self.walk(&mut |t, _| {
            if let Some(v) = t.mutability.as_var() {
                out.insert(v);
            }
        });
        out
    }

    pub fn free_staging_vars(&self) -> BTreeSet<VarId> {
        let mut out = BTreeSet::new();
        self.walk(&mut |t, _| {
            if let Some(v) = t.staging.as_var() {
                out.insert(v);
            }
        });
        out
    }

    /// Mutability and staging slots in pre-order, the order binding tuples use.
    pub fn slots(&self) -> (Vec<LatticeValue<Mutability>>, Vec<LatticeValue<Staging>>) {
        let mut muts = Vec::new();
        let mut stages = Vec::new();
        self.walk(&mut |t, _| {
            muts.push(t.mutability);
            stages.push(t.staging);
        });
        (muts, stages)
    }

    pub fn is_concrete(&self) -> bool {
        self.free_mutability_vars().is_empty() && self.free_staging_vars().is_empty()
    }

    pub fn mentions_pointer_sized(&self) -> bool {
        let mut found = false;
        self.walk(&mut |t, _| {
            if let TermKind::Primitive { prim } = t.kind {
                found |= prim.is_pointer_sized();
            }
        });
        found
    }

    /// Rebuilds the term with every slot passed through the given maps.
    pub fn map_values(
        &self,
        fm: &mut dyn FnMut(LatticeValue<Mutability>) -> LatticeValue<Mutability>,
        fs: &mut dyn FnMut(LatticeValue<Staging>) -> LatticeValue<Staging>,
    ) -> TypeTerm {
        let kind = match &self.kind {
            TermKind::Primitive { prim } => TermKind::Primitive { prim: *prim },
            TermKind::Pointer { pointee } => TermKind::Pointer {
                pointee: Box::new(pointee.map_values(fm, fs)),
            },
            TermKind::Array { len, elem } => TermKind::Array {
                len: *len,
                elem: Box::new(elem.map_values(fm, fs)),
            },
            TermKind::Tuple { elements } => TermKind::Tuple {
                elements: elements.iter().map(|e| e.map_values(fm, fs)).collect(),
            },
            TermKind::TypeValue => TermKind::TypeValue,
            TermKind::LiteralType => TermKind::LiteralType,
            TermKind::Unit => TermKind::Unit,
            TermKind::Function { params, ret } => TermKind::Function {
                params: params.iter().map(|p| p.map_values(fm, fs)).collect(),
                ret: Box::new(ret.map_values(fm, fs)),
            },
        };
        TypeTerm {
            mutability: fm(self.mutability),
            staging: fs(self.staging),
            kind,
        }
    }

    pub fn renamed(&self, mutability: Shift, staging: Shift) -> TypeTerm {
        self.map_values(&mut |m| m.renamed(mutability), &mut |s| s.renamed(staging))
    }

    /// Replaces resolved variables with their concrete values.
    pub fn substitute(
        &self,
        mutability: &dyn Fn(VarId) -> Option<Mutability>,
        staging: &dyn Fn(VarId) -> Option<Staging>,
    ) -> TypeTerm {
        self.map_values(
            &mut |m| match m {
                LatticeValue::Variable(v) => mutability(v).map_or(m, LatticeValue::Concrete),
                c => c,
            },
            &mut |s| match s {
                LatticeValue::Variable(v) => staging(v).map_or(s, LatticeValue::Concrete),
                c => c,
            },
        )
    }

    /// Replaces `isize`/`usize` with the target's fixed-width integers.
    pub fn bind_pointer_width(&self, pointer_width: PointerWidth) -> TypeTerm {
        let mut out = self.clone();
        fn go(t: &mut TypeTerm, w: PointerWidth) {
            match &mut t.kind {
                TermKind::Primitive { prim } => *prim = prim.with_pointer_width(w),
                TermKind::Pointer { pointee } => go(pointee, w),
                TermKind::Array { elem, .. } => go(elem, w),
                TermKind::Tuple { elements } => elements.iter_mut().for_each(|e| go(e, w)),
                TermKind::Function { params, ret } => {
                    params.iter_mut().for_each(|p| go(p, w));
                    go(ret, w);
                }
                TermKind::TypeValue | TermKind::LiteralType | TermKind::Unit => {}
            }
        }
        go(&mut out, pointer_width);
        out
    }
}

/// The single explicit mutability shared by array elements, if any element
/// states one. Two differing explicit values cannot share one element slot.
fn explicit_element_mutability(
    elements: &[Option<TypeTerm>],
) -> Result<Option<Mutability>, HeterogeneousArrayMutability> {
    let mut seen: Option<Mutability> = None;
    for (index, e) in elements.iter().enumerate() {
        let Some(m) = e.as_ref().and_then(|e| e.mutability.as_concrete()) else {
            continue;
        };
        match seen {
            None => seen = Some(m),
            Some(first) if first != m => {
                return Err(HeterogeneousArrayMutability {
                    first,
                    second: m,
                    index,
                })
            }
            Some(_) => {}
        }
    }
    Ok(seen)
}

impl fmt::Display for LatticeValue<Mutability> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatticeValue::Concrete(m) => f.write_str(m.as_str()),
            LatticeValue::Variable(v) => write!(f, "anymut{v}"),
        }
    }
}

impl fmt::Display for LatticeValue<Staging> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatticeValue::Concrete(s) => f.write_str(s.as_str()),
            LatticeValue::Variable(v) => write!(f, "anystage{v}"),
        }
    }
}

impl fmt::Display for TypeTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.mutability, self.staging)?;
        match &self.kind {
            TermKind::Primitive { prim } => f.write_str(prim.as_str()),
            TermKind::Pointer { pointee } => write!(f, "*({pointee})"),
            TermKind::Array { len, elem } => write!(f, "[{len} {elem}]"),
            TermKind::Tuple { elements } => {
                f.write_str("(")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_str(")")
            }
            TermKind::TypeValue => f.write_str("type"),
            TermKind::LiteralType => f.write_str("literal"),
            TermKind::Unit => f.write_str("()"),
            TermKind::Function { params, ret } => {
                f.write_str("fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {ret}")
            }
        }
    }
}
