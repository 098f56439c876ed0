//! Constraint vocabulary shared by the collector and the resolver.
//!
//! Each axis gets three kinds of facts: hard unifications, low-priority default
//! bindings, and staging-style flows from a source slot into a destination
//! slot. Staging additionally carries post-resolution checks.

use serde::Serialize;

use crate::lattice::{Axis, LatticeValue, Mutability, Shift, Staging, VarId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    /// A `const`/`mut`/`compiletime`/`runtime` qualifier written in a type.
    Annotation,
    /// `literal` and `type` values never exist at runtime.
    CompiletimeKind,
    WriteThrough,
    ExplicitCoercion,
    LiteralDefault,
    StaticStorage,
    ExternBoundary,
    /// Both sides name the same storage, e.g. two pointees.
    SharedStorage,
    Flow,
    RuntimeCoercion,
}

impl OriginKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OriginKind::Annotation => "annotation",
            OriginKind::CompiletimeKind => "compiletime_kind",
            OriginKind::WriteThrough => "write_through",
            OriginKind::ExplicitCoercion => "explicit_coercion",
            OriginKind::LiteralDefault => "literal_default",
            OriginKind::StaticStorage => "static_storage",
            OriginKind::ExternBoundary => "extern_boundary",
            OriginKind::SharedStorage => "shared_storage",
            OriginKind::Flow => "flow",
            OriginKind::RuntimeCoercion => "runtime_coercion",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Origin {
    pub kind: OriginKind,
    pub ptr: String,
}

impl Origin {
    pub fn new(kind: OriginKind, ptr: &str) -> Self {
        Self {
            kind,
            ptr: ptr.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unify<D> {
    pub lhs: LatticeValue<D>,
    pub rhs: LatticeValue<D>,
    pub origin: Origin,
}

/// Ordering matters: a higher priority default wins inside one class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPriority {
    Literal,
    Static,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefaultBinding<D> {
    pub var: VarId,
    pub value: D,
    pub priority: DefaultPriority,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Flow<D> {
    pub src: LatticeValue<D>,
    pub dst: LatticeValue<D>,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StagingCheck {
    /// Static storage must not resolve `Compiletime`.
    NotCompiletime {
        slot: LatticeValue<Staging>,
        origin: Origin,
    },
    /// `runtime e` where `e` has no literal origin: fine when `e` is already runtime.
    RuntimeEligible {
        slot: LatticeValue<Staging>,
        origin: Origin,
    },
}

impl StagingCheck {
    fn renamed(&self, shift: Shift) -> Self {
        match self {
            StagingCheck::NotCompiletime { slot, origin } => StagingCheck::NotCompiletime {
                slot: slot.renamed(shift),
                origin: origin.clone(),
            },
            StagingCheck::RuntimeEligible { slot, origin } => StagingCheck::RuntimeEligible {
                slot: slot.renamed(shift),
                origin: origin.clone(),
            },
        }
    }

    pub fn slot(&self) -> LatticeValue<Staging> {
        match self {
            StagingCheck::NotCompiletime { slot, .. }
            | StagingCheck::RuntimeEligible { slot, .. } => *slot,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AxisConstraints<D> {
    pub hard: Vec<Unify<D>>,
    pub defaults: Vec<DefaultBinding<D>>,
    pub flows: Vec<Flow<D>>,
}

impl<D> Default for AxisConstraints<D> {
    fn default() -> Self {
        Self {
            hard: Vec::new(),
            defaults: Vec::new(),
            flows: Vec::new(),
        }
    }
}

impl<D: Axis> AxisConstraints<D> {
    pub fn len(&self) -> usize {
        self.hard.len() + self.defaults.len() + self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn extend_renamed(&mut self, other: &AxisConstraints<D>, shift: Shift) {
        self.hard.extend(other.hard.iter().map(|u| Unify {
            lhs: u.lhs.renamed(shift),
            rhs: u.rhs.renamed(shift),
            origin: u.origin.clone(),
        }));
        self.defaults
            .extend(other.defaults.iter().map(|d| DefaultBinding {
                var: shift.apply(d.var),
                value: d.value,
                priority: d.priority,
                origin: d.origin.clone(),
            }));
        self.flows.extend(other.flows.iter().map(|f| Flow {
            src: f.src.renamed(shift),
            dst: f.dst.renamed(shift),
            origin: f.origin.clone(),
        }));
    }
}

/// All constraints of one scope: the unit body, or one generic template.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    pub mutability: AxisConstraints<Mutability>,
    pub staging: AxisConstraints<Staging>,
    pub checks: Vec<StagingCheck>,
}

impl ConstraintSet {
    pub fn len(&self) -> usize {
        self.mutability.len() + self.staging.len() + self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unify_mut(
        &mut self,
        lhs: LatticeValue<Mutability>,
        rhs: LatticeValue<Mutability>,
        origin: Origin,
    ) {
        if lhs != rhs {
            self.mutability.hard.push(Unify { lhs, rhs, origin });
        }
    }

    pub fn unify_stage(
        &mut self,
        lhs: LatticeValue<Staging>,
        rhs: LatticeValue<Staging>,
        origin: Origin,
    ) {
        if lhs != rhs {
            self.staging.hard.push(Unify { lhs, rhs, origin });
        }
    }

    pub fn default_stage(
        &mut self,
        slot: LatticeValue<Staging>,
        value: Staging,
        priority: DefaultPriority,
        origin: Origin,
    ) {
        if let Some(var) = slot.as_var() {
            self.staging.defaults.push(DefaultBinding {
                var,
                value,
                priority,
                origin,
            });
        }
    }

    pub fn flow_stage(
        &mut self,
        src: LatticeValue<Staging>,
        dst: LatticeValue<Staging>,
        origin: Origin,
    ) {
        if src != dst {
            self.staging.flows.push(Flow { src, dst, origin });
        }
    }

    pub fn check(&mut self, check: StagingCheck) {
        self.checks.push(check);
    }

    /// Appends a copy of `other` with its local variables moved by the shifts.
    pub fn extend_renamed(&mut self, other: &ConstraintSet, mutability: Shift, staging: Shift) {
        self.mutability.extend_renamed(&other.mutability, mutability);
        self.staging.extend_renamed(&other.staging, staging);
        self.checks.extend(other.checks.iter().map(|c| c.renamed(staging)));
    }
}
