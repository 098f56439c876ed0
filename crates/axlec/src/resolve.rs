//! Union-find resolution of one constraint set.
//!
//! Both axes run the same algorithm: hard unifications close the partition,
//! then unbound classes take their highest-priority default, then flows
//! propagate into classes that are still open, then everything left takes the
//! axis fallback. Conflicted classes stay conflicted; they never default.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, trace};

use crate::constraints::{AxisConstraints, ConstraintSet, Origin, OriginKind, StagingCheck};
use crate::lattice::{
    unify_values, Axis, LatticeValue, Mutability, Staging, TypeTerm, Unified, VarId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ConflictId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Mutability,
    Staging,
    ExternStaging,
    StaticStage,
    InvalidRuntimeCoercion,
    RuntimeIntoCompiletime,
}

impl ConflictKind {
    pub fn code(self) -> &'static str {
        match self {
            ConflictKind::Mutability => "AXL-MUT-0001",
            ConflictKind::Staging => "AXL-STAGE-0001",
            ConflictKind::StaticStage => "AXL-STAGE-0002",
            ConflictKind::InvalidRuntimeCoercion => "AXL-STAGE-0003",
            ConflictKind::RuntimeIntoCompiletime => "AXL-STAGE-0004",
            ConflictKind::ExternStaging => "AXL-EXTERN-0001",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ConflictKind::Mutability => "mutability conflict",
            ConflictKind::Staging => "staging conflict",
            ConflictKind::StaticStage => "static storage cannot be compiletime",
            ConflictKind::InvalidRuntimeCoercion => {
                "runtime coercion of a compiletime value without literal origin"
            }
            ConflictKind::RuntimeIntoCompiletime => "runtime value flows into a compiletime slot",
            ConflictKind::ExternStaging => "compiletime-only value at an extern boundary",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Evidence {
    pub value: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConflictRecord {
    pub id: ConflictId,
    pub kind: ConflictKind,
    pub axis: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub var: Option<VarId>,
    pub first: Evidence,
    pub second: Evidence,
    pub at: Origin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    Hard,
    Default,
    Flow,
    Fallback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Binding<D> {
    Resolved { value: D, by: ResolvedBy },
    Conflicted { conflict: ConflictId },
}

/// Axis-specific conflict classification.
pub trait AxisRules: Axis {
    fn conflict_kind(first: &Evidence, second: &Evidence, at: &Origin) -> ConflictKind;
}

impl AxisRules for Mutability {
    fn conflict_kind(_: &Evidence, _: &Evidence, _: &Origin) -> ConflictKind {
        ConflictKind::Mutability
    }
}

impl AxisRules for Staging {
    fn conflict_kind(first: &Evidence, second: &Evidence, at: &Origin) -> ConflictKind {
        let extern_origin = |e: &Evidence| {
            e.origin
                .as_ref()
                .is_some_and(|o| o.kind == OriginKind::ExternBoundary)
        };
        if extern_origin(first) || extern_origin(second) || at.kind == OriginKind::ExternBoundary {
            ConflictKind::ExternStaging
        } else {
            ConflictKind::Staging
        }
    }
}

#[derive(Clone, Debug)]
struct Bound<D> {
    value: D,
    by: ResolvedBy,
    origin: Option<Origin>,
}

impl<D: Axis> Bound<D> {
    fn evidence(&self) -> Evidence {
        Evidence {
            value: self.value.as_str(),
            origin: self.origin.clone(),
        }
    }
}

/// One axis worth of union-find state. Concrete values live on class roots.
struct AxisTable<D> {
    parent: Vec<u32>,
    rank: Vec<u8>,
    bound: Vec<Option<Bound<D>>>,
    conflicted: Vec<Option<ConflictId>>,
}

impl<D: AxisRules> AxisTable<D> {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len as u32).collect(),
            rank: vec![0; len],
            bound: vec![None; len],
            conflicted: vec![None; len],
        }
    }

    fn ensure(&mut self, v: VarId) {
        let need = v.0 as usize + 1;
        while self.parent.len() < need {
            self.parent.push(self.parent.len() as u32);
            self.rank.push(0);
            self.bound.push(None);
            self.conflicted.push(None);
        }
    }

    fn find(&mut self, v: VarId) -> usize {
        self.ensure(v);
        let mut x = v.0 as usize;
        while self.parent[x] as usize != x {
            let grand = self.parent[self.parent[x] as usize];
            self.parent[x] = grand;
            x = grand as usize;
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let (root, child) = match self.rank[a].cmp(&self.rank[b]) {
            std::cmp::Ordering::Less => (b, a),
            std::cmp::Ordering::Greater => (a, b),
            std::cmp::Ordering::Equal => {
                self.rank[a] += 1;
                (a, b)
            }
        };
        self.parent[child] = root as u32;
        root
    }

    fn value_of(&mut self, lv: LatticeValue<D>) -> Option<D> {
        match lv {
            LatticeValue::Concrete(v) => Some(v),
            LatticeValue::Variable(x) => {
                let r = self.find(x);
                if self.conflicted[r].is_some() {
                    return None;
                }
                self.bound[r].as_ref().map(|b| b.value)
            }
        }
    }

    fn binding(&mut self, v: VarId) -> Binding<D> {
        let r = self.find(v);
        if let Some(conflict) = self.conflicted[r] {
            return Binding::Conflicted { conflict };
        }
        match &self.bound[r] {
            Some(b) => Binding::Resolved {
                value: b.value,
                by: b.by,
            },
            None => Binding::Resolved {
                value: D::FALLBACK,
                by: ResolvedBy::Fallback,
            },
        }
    }
}

struct Conflicts {
    records: Vec<ConflictRecord>,
}

impl Conflicts {
    fn push(
        &mut self,
        kind: ConflictKind,
        axis: &'static str,
        var: Option<VarId>,
        first: Evidence,
        second: Evidence,
        at: Origin,
    ) -> ConflictId {
        let id = ConflictId(self.records.len() as u32);
        debug!(
            conflict = id.0,
            code = kind.code(),
            axis,
            ptr = at.ptr.as_str(),
            first = first.value,
            second = second.value,
            "conflict"
        );
        self.records.push(ConflictRecord {
            id,
            kind,
            axis,
            var,
            first,
            second,
            at,
        });
        id
    }
}

fn apply_hard<D: AxisRules>(
    table: &mut AxisTable<D>,
    cons: &AxisConstraints<D>,
    conflicts: &mut Conflicts,
) {
    for u in &cons.hard {
        let lhs = match u.lhs {
            LatticeValue::Variable(x) => LatticeValue::Variable(VarId(table.find(x) as u32)),
            c => c,
        };
        let rhs = match u.rhs {
            LatticeValue::Variable(x) => LatticeValue::Variable(VarId(table.find(x) as u32)),
            c => c,
        };
        let here = || Evidence {
            value: "",
            origin: Some(u.origin.clone()),
        };
        match unify_values(lhs, rhs) {
            Ok(Unified::Same) => {}
            Err(mismatch) => {
                let first = Evidence {
                    value: mismatch.lhs.as_str(),
                    ..here()
                };
                let second = Evidence {
                    value: mismatch.rhs.as_str(),
                    ..here()
                };
                let kind = D::conflict_kind(&first, &second, &u.origin);
                conflicts.push(kind, D::NAME, None, first, second, u.origin.clone());
            }
            Ok(Unified::Bind { var, to }) => {
                let r = var.0 as usize;
                match to {
                    LatticeValue::Concrete(value) => {
                        if table.conflicted[r].is_some() {
                            trace!(axis = D::NAME, var = r, "skip conflicted class");
                            continue;
                        }
                        match &table.bound[r] {
                            None => {
                                table.bound[r] = Some(Bound {
                                    value,
                                    by: ResolvedBy::Hard,
                                    origin: Some(u.origin.clone()),
                                });
                            }
                            Some(b) if b.value == value => {}
                            Some(b) => {
                                let first = b.evidence();
                                let second = Evidence {
                                    value: value.as_str(),
                                    ..here()
                                };
                                let kind = D::conflict_kind(&first, &second, &u.origin);
                                let id = conflicts.push(
                                    kind,
                                    D::NAME,
                                    Some(var),
                                    first,
                                    second,
                                    u.origin.clone(),
                                );
                                table.conflicted[r] = Some(id);
                            }
                        }
                    }
                    LatticeValue::Variable(other) => {
                        let o = other.0 as usize;
                        let conflicted = table.conflicted[r].or(table.conflicted[o]);
                        let a = table.bound[r].take();
                        let b = table.bound[o].take();
                        let root = table.union(r, o);
                        if let Some(id) = conflicted {
                            table.conflicted[root] = Some(id);
                            continue;
                        }
                        match (a, b) {
                            (Some(x), Some(y)) if x.value != y.value => {
                                let first = x.evidence();
                                let second = y.evidence();
                                let kind = D::conflict_kind(&first, &second, &u.origin);
                                let id = conflicts.push(
                                    kind,
                                    D::NAME,
                                    Some(VarId(root as u32)),
                                    first,
                                    second,
                                    u.origin.clone(),
                                );
                                table.conflicted[root] = Some(id);
                            }
                            (x, y) => table.bound[root] = x.or(y),
                        }
                    }
                }
            }
        }
    }
}

fn apply_defaults<D: AxisRules>(table: &mut AxisTable<D>, cons: &AxisConstraints<D>) {
    let mut chosen: BTreeMap<usize, usize> = BTreeMap::new();
    for (i, d) in cons.defaults.iter().enumerate() {
        let r = table.find(d.var);
        if table.conflicted[r].is_some() || table.bound[r].is_some() {
            continue;
        }
        match chosen.get(&r) {
            Some(&j) if cons.defaults[j].priority >= d.priority => {}
            _ => {
                chosen.insert(r, i);
            }
        }
    }
    for (r, i) in chosen {
        let d = &cons.defaults[i];
        trace!(axis = D::NAME, class = r, value = d.value.as_str(), "default");
        table.bound[r] = Some(Bound {
            value: d.value,
            by: ResolvedBy::Default,
            origin: Some(d.origin.clone()),
        });
    }
}

fn apply_flows<D: AxisRules>(table: &mut AxisTable<D>, cons: &AxisConstraints<D>) {
    let mut incoming: BTreeMap<usize, Vec<(LatticeValue<D>, &Origin)>> = BTreeMap::new();
    for f in &cons.flows {
        let LatticeValue::Variable(dst) = f.dst else {
            continue;
        };
        let r = table.find(dst);
        incoming.entry(r).or_default().push((f.src, &f.origin));
    }

    let open = |table: &AxisTable<D>, r: usize| {
        table.bound[r].is_none() && table.conflicted[r].is_none()
    };

    loop {
        let mut changed = false;

        // Strict pass: a class is fixed once every source is.
        loop {
            let mut strict_changed = false;
            for (&r, srcs) in &incoming {
                if !open(table, r) {
                    continue;
                }
                let mut acc: Option<D> = None;
                let mut complete = true;
                for (src, _) in srcs {
                    match table.value_of(*src) {
                        Some(v) => acc = Some(acc.map_or(v, |a| a.join(v))),
                        None => {
                            complete = false;
                            break;
                        }
                    }
                }
                if let (true, Some(value)) = (complete, acc) {
                    table.bound[r] = Some(Bound {
                        value,
                        by: ResolvedBy::Flow,
                        origin: srcs.first().map(|(_, o)| (*o).clone()),
                    });
                    strict_changed = true;
                }
            }
            if !strict_changed {
                break;
            }
            changed = true;
        }

        // Relaxed pass: cycles and conflicted sources; join whatever is known.
        let mut relaxed: Vec<(usize, D, Origin)> = Vec::new();
        for (&r, srcs) in &incoming {
            if !open(table, r) {
                continue;
            }
            let mut acc: Option<(D, &Origin)> = None;
            for (src, origin) in srcs {
                if let Some(v) = table.value_of(*src) {
                    acc = Some(match acc {
                        None => (v, *origin),
                        Some((a, o)) => (a.join(v), o),
                    });
                }
            }
            if let Some((value, origin)) = acc {
                relaxed.push((r, value, origin.clone()));
            }
        }
        for (r, value, origin) in relaxed {
            table.bound[r] = Some(Bound {
                value,
                by: ResolvedBy::Flow,
                origin: Some(origin),
            });
            changed = true;
        }

        if !changed {
            break;
        }
    }
}

fn apply_fallback<D: AxisRules>(table: &mut AxisTable<D>) {
    for v in 0..table.parent.len() {
        let r = table.find(VarId(v as u32));
        if table.conflicted[r].is_none() && table.bound[r].is_none() {
            table.bound[r] = Some(Bound {
                value: D::FALLBACK,
                by: ResolvedBy::Fallback,
                origin: None,
            });
        }
    }
}

fn run_staging_checks(
    table: &mut AxisTable<Staging>,
    set: &ConstraintSet,
    conflicts: &mut Conflicts,
) {
    for f in &set.staging.flows {
        let (Some(Staging::Runtime), Some(Staging::Compiletime)) =
            (table.value_of(f.src), table.value_of(f.dst))
        else {
            continue;
        };
        let (var, first) = match f.dst {
            LatticeValue::Variable(v) => {
                let r = table.find(v);
                let first = table.bound[r].as_ref().map(Bound::evidence);
                (Some((v, r)), first)
            }
            LatticeValue::Concrete(_) => (None, None),
        };
        let first = first.unwrap_or(Evidence {
            value: Staging::Compiletime.as_str(),
            origin: None,
        });
        let second = Evidence {
            value: Staging::Runtime.as_str(),
            origin: Some(f.origin.clone()),
        };
        let id = conflicts.push(
            ConflictKind::RuntimeIntoCompiletime,
            Staging::NAME,
            var.map(|(v, _)| v),
            first,
            second,
            f.origin.clone(),
        );
        if let Some((_, r)) = var {
            table.conflicted[r] = Some(id);
        }
    }

    for check in &set.checks {
        let (kind, origin) = match check {
            StagingCheck::NotCompiletime { origin, .. } => (ConflictKind::StaticStage, origin),
            StagingCheck::RuntimeEligible { origin, .. } => {
                (ConflictKind::InvalidRuntimeCoercion, origin)
            }
        };
        let slot = check.slot();
        if table.value_of(slot) != Some(Staging::Compiletime) {
            continue;
        }
        let (var, first) = match slot {
            LatticeValue::Variable(v) => {
                let r = table.find(v);
                (Some((v, r)), table.bound[r].as_ref().map(Bound::evidence))
            }
            LatticeValue::Concrete(_) => (None, None),
        };
        let first = first.unwrap_or(Evidence {
            value: Staging::Compiletime.as_str(),
            origin: None,
        });
        let second = Evidence {
            value: match kind {
                ConflictKind::StaticStage => "static",
                _ => Staging::Runtime.as_str(),
            },
            origin: Some(origin.clone()),
        };
        let id = conflicts.push(
            kind,
            Staging::NAME,
            var.map(|(v, _)| v),
            first,
            second,
            origin.clone(),
        );
        if let Some((_, r)) = var {
            table.conflicted[r] = Some(id);
        }
    }
}

/// Binding table of one resolved constraint set, indexed by variable id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub mutability: Vec<Binding<Mutability>>,
    pub staging: Vec<Binding<Staging>>,
    pub conflicts: Vec<ConflictRecord>,
}

impl Resolution {
    pub fn mutability_of(&self, v: VarId) -> Binding<Mutability> {
        self.mutability
            .get(v.0 as usize)
            .copied()
            .unwrap_or(Binding::Resolved {
                value: Mutability::FALLBACK,
                by: ResolvedBy::Fallback,
            })
    }

    pub fn staging_of(&self, v: VarId) -> Binding<Staging> {
        self.staging
            .get(v.0 as usize)
            .copied()
            .unwrap_or(Binding::Resolved {
                value: Staging::FALLBACK,
                by: ResolvedBy::Fallback,
            })
    }

    pub fn resolve_mut(&self, lv: LatticeValue<Mutability>) -> Result<Mutability, ConflictId> {
        match lv {
            LatticeValue::Concrete(m) => Ok(m),
            LatticeValue::Variable(v) => match self.mutability_of(v) {
                Binding::Resolved { value, .. } => Ok(value),
                Binding::Conflicted { conflict } => Err(conflict),
            },
        }
    }

    pub fn resolve_stage(&self, lv: LatticeValue<Staging>) -> Result<Staging, ConflictId> {
        match lv {
            LatticeValue::Concrete(s) => Ok(s),
            LatticeValue::Variable(v) => match self.staging_of(v) {
                Binding::Resolved { value, .. } => Ok(value),
                Binding::Conflicted { conflict } => Err(conflict),
            },
        }
    }

    /// Replaces every resolved slot; conflicted slots stay variables.
    pub fn substitute(&self, term: &TypeTerm) -> TypeTerm {
        term.substitute(
            &|v| self.resolve_mut(LatticeValue::Variable(v)).ok(),
            &|v| self.resolve_stage(LatticeValue::Variable(v)).ok(),
        )
    }
}

/// Resolves a whole constraint set: hard unification, defaults, flows,
/// fallback, then the staging checks.
pub fn resolve(set: &ConstraintSet, mut_vars: u32, stage_vars: u32) -> Resolution {
    let mut conflicts = Conflicts {
        records: Vec::new(),
    };

    let mut muts: AxisTable<Mutability> = AxisTable::new(mut_vars as usize);
    apply_hard(&mut muts, &set.mutability, &mut conflicts);
    apply_defaults(&mut muts, &set.mutability);
    apply_flows(&mut muts, &set.mutability);
    apply_fallback(&mut muts);

    let mut stages: AxisTable<Staging> = AxisTable::new(stage_vars as usize);
    apply_hard(&mut stages, &set.staging, &mut conflicts);
    apply_defaults(&mut stages, &set.staging);
    apply_flows(&mut stages, &set.staging);
    apply_fallback(&mut stages);
    run_staging_checks(&mut stages, set, &mut conflicts);

    let mutability = (0..muts.parent.len())
        .map(|v| muts.binding(VarId(v as u32)))
        .collect();
    let staging = (0..stages.parent.len())
        .map(|v| stages.binding(VarId(v as u32)))
        .collect();
    debug!(
        mutability_vars = muts.parent.len(),
        staging_vars = stages.parent.len(),
        conflicts = conflicts.records.len(),
        "resolved constraint set"
    );
    Resolution {
        mutability,
        staging,
        conflicts: conflicts.records,
    }
}

/// Applies only the hard constraints and reports their conflicts. Used to
/// check a generic's own body independently of any caller.
pub fn hard_conflicts(set: &ConstraintSet) -> Vec<ConflictRecord> {
    let mut conflicts = Conflicts {
        records: Vec::new(),
    };
    let mut muts: AxisTable<Mutability> = AxisTable::new(0);
    apply_hard(&mut muts, &set.mutability, &mut conflicts);
    let mut stages: AxisTable<Staging> = AxisTable::new(0);
    apply_hard(&mut stages, &set.staging, &mut conflicts);
    conflicts.records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{DefaultPriority, OriginKind};

    fn mv(id: u32) -> LatticeValue<Mutability> {
        LatticeValue::Variable(VarId(id))
    }

    fn sv(id: u32) -> LatticeValue<Staging> {
        LatticeValue::Variable(VarId(id))
    }

    fn o(kind: OriginKind, ptr: &str) -> Origin {
        Origin::new(kind, ptr)
    }

    fn resolved<D: Copy>(b: Binding<D>) -> D {
        match b {
            Binding::Resolved { value, .. } => value,
            Binding::Conflicted { conflict } => panic!("unexpected conflict {conflict:?}"),
        }
    }

    #[test]
    fn unconstrained_mutability_defaults_to_const() {
        let r = resolve(&ConstraintSet::default(), 3, 0);
        for v in 0..3 {
            assert_eq!(resolved(r.mutability_of(VarId(v))), Mutability::Const);
        }
    }

    #[test]
    fn write_through_a_shared_class_makes_it_mut() {
        let mut set = ConstraintSet::default();
        set.unify_mut(mv(0), mv(1), o(OriginKind::SharedStorage, "/body/1"));
        set.unify_mut(
            mv(1),
            LatticeValue::Concrete(Mutability::Mut),
            o(OriginKind::WriteThrough, "/body/2"),
        );
        let r = resolve(&set, 2, 0);
        assert_eq!(resolved(r.mutability_of(VarId(0))), Mutability::Mut);
        assert!(r.conflicts.is_empty());
    }

    #[test]
    fn conflicting_hard_constraints_are_local() {
        let mut set = ConstraintSet::default();
        set.unify_mut(
            mv(0),
            LatticeValue::Concrete(Mutability::Const),
            o(OriginKind::ExplicitCoercion, "/body/0"),
        );
        set.unify_mut(
            mv(0),
            LatticeValue::Concrete(Mutability::Mut),
            o(OriginKind::WriteThrough, "/body/1"),
        );
        set.unify_mut(
            mv(1),
            LatticeValue::Concrete(Mutability::Mut),
            o(OriginKind::WriteThrough, "/body/2"),
        );
        let r = resolve(&set, 2, 0);
        assert_eq!(r.conflicts.len(), 1);
        assert_eq!(r.conflicts[0].kind, ConflictKind::Mutability);
        assert_eq!(r.conflicts[0].at.ptr, "/body/1");
        assert!(matches!(r.mutability_of(VarId(0)), Binding::Conflicted { .. }));
        assert_eq!(resolved(r.mutability_of(VarId(1))), Mutability::Mut);
    }

    #[test]
    fn conflict_is_reported_regardless_of_order() {
        let constraints = [
            (mv(0), mv(1)),
            (mv(1), LatticeValue::Concrete(Mutability::Mut)),
            (mv(0), LatticeValue::Concrete(Mutability::Const)),
        ];
        for rotate in 0..constraints.len() {
            let mut set = ConstraintSet::default();
            for i in 0..constraints.len() {
                let (a, b) = constraints[(i + rotate) % constraints.len()];
                set.unify_mut(a, b, o(OriginKind::Annotation, "/x"));
            }
            let r = resolve(&set, 2, 0);
            assert_eq!(r.conflicts.len(), 1, "rotation {rotate}");
        }
    }

    #[test]
    fn literal_defaults_compiletime_and_static_default_wins() {
        let mut set = ConstraintSet::default();
        set.default_stage(
            sv(0),
            Staging::Compiletime,
            DefaultPriority::Literal,
            o(OriginKind::LiteralDefault, "/a"),
        );
        set.unify_stage(sv(1), sv(2), o(OriginKind::SharedStorage, "/b"));
        set.default_stage(
            sv(1),
            Staging::Compiletime,
            DefaultPriority::Literal,
            o(OriginKind::LiteralDefault, "/b"),
        );
        set.default_stage(
            sv(2),
            Staging::Runtime,
            DefaultPriority::Static,
            o(OriginKind::StaticStorage, "/c"),
        );
        let r = resolve(&set, 0, 3);
        assert_eq!(resolved(r.staging_of(VarId(0))), Staging::Compiletime);
        assert_eq!(resolved(r.staging_of(VarId(1))), Staging::Runtime);
    }

    #[test]
    fn explicit_coercion_overrides_literal_default() {
        let mut set = ConstraintSet::default();
        set.default_stage(
            sv(0),
            Staging::Compiletime,
            DefaultPriority::Literal,
            o(OriginKind::LiteralDefault, "/a"),
        );
        set.unify_stage(
            sv(0),
            LatticeValue::Concrete(Staging::Runtime),
            o(OriginKind::ExplicitCoercion, "/a"),
        );
        let r = resolve(&set, 0, 1);
        assert_eq!(resolved(r.staging_of(VarId(0))), Staging::Runtime);
    }

    #[test]
    fn flows_join_towards_runtime_and_fall_back_to_runtime() {
        let mut set = ConstraintSet::default();
        set.default_stage(
            sv(0),
            Staging::Compiletime,
            DefaultPriority::Literal,
            o(OriginKind::LiteralDefault, "/lit"),
        );
        set.unify_stage(
            sv(1),
            LatticeValue::Concrete(Staging::Runtime),
            o(OriginKind::Annotation, "/rt"),
        );
        set.flow_stage(sv(0), sv(2), o(OriginKind::Flow, "/x"));
        set.flow_stage(sv(0), sv(3), o(OriginKind::Flow, "/y"));
        set.flow_stage(sv(1), sv(3), o(OriginKind::Flow, "/y"));
        // cycle with no bound source
        set.flow_stage(sv(4), sv(5), o(OriginKind::Flow, "/z"));
        set.flow_stage(sv(5), sv(4), o(OriginKind::Flow, "/z"));
        let r = resolve(&set, 0, 6);
        assert_eq!(resolved(r.staging_of(VarId(2))), Staging::Compiletime);
        assert_eq!(resolved(r.staging_of(VarId(3))), Staging::Runtime);
        assert_eq!(resolved(r.staging_of(VarId(4))), Staging::Runtime);
        assert!(r.conflicts.is_empty());
    }

    #[test]
    fn runtime_flow_into_compiletime_slot_is_reported() {
        let mut set = ConstraintSet::default();
        set.unify_stage(
            sv(0),
            LatticeValue::Concrete(Staging::Runtime),
            o(OriginKind::Annotation, "/src"),
        );
        set.unify_stage(
            sv(1),
            LatticeValue::Concrete(Staging::Compiletime),
            o(OriginKind::Annotation, "/dst"),
        );
        set.flow_stage(sv(0), sv(1), o(OriginKind::Flow, "/let"));
        let r = resolve(&set, 0, 2);
        assert_eq!(r.conflicts.len(), 1);
        assert_eq!(r.conflicts[0].kind, ConflictKind::RuntimeIntoCompiletime);
        assert_eq!(r.conflicts[0].at.ptr, "/let");
    }

    #[test]
    fn static_slot_resolving_compiletime_is_a_conflict() {
        let mut set = ConstraintSet::default();
        set.unify_stage(
            sv(0),
            LatticeValue::Concrete(Staging::Compiletime),
            o(OriginKind::Annotation, "/ty"),
        );
        set.default_stage(
            sv(0),
            Staging::Runtime,
            DefaultPriority::Static,
            o(OriginKind::StaticStorage, "/s"),
        );
        set.check(StagingCheck::NotCompiletime {
            slot: sv(0),
            origin: o(OriginKind::StaticStorage, "/s"),
        });
        let r = resolve(&set, 0, 1);
        assert_eq!(r.conflicts.len(), 1);
        assert_eq!(r.conflicts[0].kind, ConflictKind::StaticStage);
        assert!(matches!(r.staging_of(VarId(0)), Binding::Conflicted { .. }));
    }

    #[test]
    fn extern_boundary_conflicts_are_classified() {
        let mut set = ConstraintSet::default();
        set.unify_stage(
            sv(0),
            LatticeValue::Concrete(Staging::Compiletime),
            o(OriginKind::CompiletimeKind, "/decls/0/params/0/ty"),
        );
        set.unify_stage(
            sv(0),
            LatticeValue::Concrete(Staging::Runtime),
            o(OriginKind::ExternBoundary, "/decls/0"),
        );
        let conflicts = hard_conflicts(&set);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::ExternStaging);
        assert_eq!(conflicts[0].kind.code(), "AXL-EXTERN-0001");
    }
}
