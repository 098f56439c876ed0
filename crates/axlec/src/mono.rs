use std::collections::{BTreeMap, BTreeSet};

use axle_contracts::AXLE_MONO_MAP_SCHEMA_VERSION;
use axle_targets::PointerWidth;
use serde::Serialize;
use serde_json::json;
use sha2::Digest as _;
use tracing::{debug, info};

use crate::collect::{Collected, GenericKind, NodeTerm, Site};
use crate::diagnostics::{Diagnostic, Stage};
use crate::lattice::{Mutability, Staging, TypeTerm};
use crate::resolve::{ConflictId, Resolution};
use crate::slice::SliceSite;

pub const MONO_NAME_MARKER: &str = "__axle_mono_v1__";

pub const MONO_CONFLICTED_BINDING: &str = "AXL-MONO-0001";
pub const MONO_BUDGET_EXCEEDED: &str = "AXL-MONO-0002";

const MAX_SITES_PER_ITEM: usize = 8;
const MAX_PRETTY_LEN: usize = 48;

/// Resolved signature slots of one use site, in pre-order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BindingTuple {
    pub mutability: Vec<Mutability>,
    pub staging: Vec<Staging>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer_width: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictedSlot {
    pub axis: &'static str,
    pub index: usize,
    pub conflict: ConflictId,
}

impl BindingTuple {
    pub fn empty() -> Self {
        Self {
            mutability: Vec::new(),
            staging: Vec::new(),
            pointer_width: None,
        }
    }

    pub fn of_signature(
        signature: &[TypeTerm],
        resolution: &Resolution,
        pointer_width: PointerWidth,
    ) -> Result<Self, ConflictedSlot> {
        let mut mutability = Vec::new();
        let mut staging = Vec::new();
        let mut sized = false;
        for t in signature {
            let (ms, ss) = t.slots();
            for m in ms {
                let index = mutability.len();
                mutability.push(resolution.resolve_mut(m).map_err(|conflict| ConflictedSlot {
                    axis: "mutability",
                    index,
                    conflict,
                })?);
            }
            for s in ss {
                let index = staging.len();
                staging.push(resolution.resolve_stage(s).map_err(|conflict| ConflictedSlot {
                    axis: "staging",
                    index,
                    conflict,
                })?);
            }
            sized |= t.mentions_pointer_sized();
        }
        Ok(Self {
            mutability,
            staging,
            pointer_width: sized.then(|| pointer_width.bits()),
        })
    }

    /// Readable part of a specialized name, e.g. `m_cm__s_rr__w64`.
    pub fn pretty(&self) -> String {
        if self.mutability.is_empty() && self.staging.is_empty() {
            return "no_slots".to_string();
        }
        let m: String = self
            .mutability
            .iter()
            .map(|m| match m {
                Mutability::Const => 'c',
                Mutability::Mut => 'm',
            })
            .collect();
        let s: String = self
            .staging
            .iter()
            .map(|s| match s {
                Staging::Compiletime => 'c',
                Staging::Runtime => 'r',
            })
            .collect();
        let mut out = format!("m_{m}__s_{s}");
        out.truncate(MAX_PRETTY_LEN);
        if let Some(w) = self.pointer_width {
            out.push_str(&format!("__w{w}"));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct InstantiationKey {
    pub generic: String,
    pub bindings: BindingTuple,
}

pub fn mangle_specialized_name(generic: &str, bindings: &BindingTuple) -> String {
    let pretty = bindings.pretty();
    let hash8 = sha256_hex8(&serde_json::to_vec(bindings).unwrap_or_default());
    format!("{generic}{MONO_NAME_MARKER}{pretty}__h{hash8}")
}

fn sha256_hex8(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    let mut out = String::new();
    for b in digest.iter().take(4) {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Function,
    Struct,
    Extern,
}

impl From<GenericKind> for ItemKind {
    fn from(k: GenericKind) -> Self {
        match k {
            GenericKind::Function => ItemKind::Function,
            GenericKind::Struct => ItemKind::Struct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonoSite {
    pub scope: String,
    pub ptr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedNode {
    pub ptr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub ty: TypeTerm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonoItem {
    pub id: u32,
    pub kind: ItemKind,
    pub generic: String,
    pub specialized: String,
    pub bindings: BindingTuple,
    pub signature: Vec<TypeTerm>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub nodes: Vec<ResolvedNode>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sites: Vec<MonoSite>,
    pub sites_total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonoScope {
    pub name: String,
    pub nodes: Vec<ResolvedNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonoLimits {
    pub max_specializations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonoStats {
    pub generics_defined: usize,
    pub generics_instantiated: usize,
    pub specializations_emitted: usize,
    pub sites_total: usize,
    pub memo_hits: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonoMap {
    pub schema_version: String,
    pub pointer_width: u8,
    pub limits: MonoLimits,
    pub stats: MonoStats,
    pub scopes: Vec<MonoScope>,
    pub items: Vec<MonoItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    Existing(usize),
    Created(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetExceeded {
    pub max_specializations: usize,
}

/// Memo of emitted instances keyed by `(generic, binding tuple)`.
#[derive(Debug, Clone)]
pub struct MonoTable {
    index: BTreeMap<InstantiationKey, usize>,
    items: Vec<MonoItem>,
    max_specializations: usize,
    specializations: usize,
    memo_hits: usize,
    sites_total: usize,
}

impl MonoTable {
    pub fn new(max_specializations: usize) -> Self {
        Self {
            index: BTreeMap::new(),
            items: Vec::new(),
            max_specializations,
            specializations: 0,
            memo_hits: 0,
            sites_total: 0,
        }
    }

    pub fn items(&self) -> &[MonoItem] {
        &self.items
    }

    /// Returns the entry for `key`, building it with `make` only on the first
    /// request. Later requests record the site and return the same entry.
    pub fn ensure(
        &mut self,
        key: InstantiationKey,
        kind: ItemKind,
        site: MonoSite,
        make: impl FnOnce() -> (Vec<TypeTerm>, Vec<ResolvedNode>),
    ) -> Result<Ensured, BudgetExceeded> {
        self.sites_total += 1;
        if let Some(&i) = self.index.get(&key) {
            self.memo_hits += 1;
            let item = &mut self.items[i];
            item.sites_total += 1;
            if item.sites.len() < MAX_SITES_PER_ITEM {
                item.sites.push(site);
            }
            return Ok(Ensured::Existing(i));
        }

        if kind != ItemKind::Extern {
            if self.specializations >= self.max_specializations {
                self.sites_total -= 1;
                return Err(BudgetExceeded {
                    max_specializations: self.max_specializations,
                });
            }
            self.specializations += 1;
        }

        let specialized = match kind {
            ItemKind::Extern => key.generic.clone(),
            _ => mangle_specialized_name(&key.generic, &key.bindings),
        };
        let (signature, nodes) = make();
        let i = self.items.len();
        debug!(
            generic = key.generic.as_str(),
            specialized = specialized.as_str(),
            "new instance"
        );
        self.items.push(MonoItem {
            id: i as u32,
            kind,
            generic: key.generic.clone(),
            specialized,
            bindings: key.bindings.clone(),
            signature,
            nodes,
            sites: vec![site],
            sites_total: 1,
        });
        self.index.insert(key, i);
        Ok(Ensured::Created(i))
    }
}

#[derive(Debug, Clone)]
pub struct MonoOutput {
    pub map: MonoMap,
    /// Slice sites to synthesize, with the scope each one belongs to.
    pub slices: Vec<(String, SliceSite)>,
    pub diagnostics: Vec<Diagnostic>,
}

pub const MAIN_SCOPE: &str = "main";

struct Walker<'a> {
    resolution: &'a Resolution,
    pointer_width: PointerWidth,
    kinds: BTreeMap<&'a str, GenericKind>,
    table: MonoTable,
    slices: Vec<(String, SliceSite)>,
    diagnostics: Vec<Diagnostic>,
    budget_reported: bool,
}

impl Walker<'_> {
    fn concrete(&self, t: &TypeTerm) -> TypeTerm {
        self.resolution
            .substitute(t)
            .bind_pointer_width(self.pointer_width)
    }

    fn resolved_nodes(&self, nodes: &[NodeTerm]) -> Vec<ResolvedNode> {
        nodes
            .iter()
            .map(|n| ResolvedNode {
                ptr: n.ptr.clone(),
                name: n.name.clone(),
                ty: self.concrete(&n.term),
            })
            .collect()
    }

    fn visit(&mut self, site: &Site, scope: &str) {
        let bindings = match BindingTuple::of_signature(
            &site.signature,
            self.resolution,
            self.pointer_width,
        ) {
            Ok(b) => b,
            Err(slot) => {
                self.diagnostics.push(
                    Diagnostic::error(
                        MONO_CONFLICTED_BINDING,
                        Stage::Mono,
                        &site.ptr,
                        format!(
                            "cannot monomorphize {:?}: {} slot {} of its signature is conflicted",
                            site.generic, slot.axis, slot.index
                        ),
                    )
                    .with_data("generic", json!(site.generic))
                    .with_data("axis", json!(slot.axis))
                    .with_data("slot", json!(slot.index))
                    .with_data("conflict", json!(slot.conflict)),
                );
                return;
            }
        };

        let kind = self
            .kinds
            .get(site.generic.as_str())
            .copied()
            .map_or(ItemKind::Function, ItemKind::from);
        let key = InstantiationKey {
            generic: site.generic.clone(),
            bindings,
        };
        let mono_site = MonoSite {
            scope: scope.to_string(),
            ptr: site.ptr.clone(),
        };
        let signature: Vec<TypeTerm> = site.signature.iter().map(|t| self.concrete(t)).collect();
        let nodes = self.resolved_nodes(&site.nodes);
        let ensured = match self
            .table
            .ensure(key, kind, mono_site, move || (signature, nodes))
        {
            Ok(e) => e,
            Err(budget) => {
                if !self.budget_reported {
                    self.budget_reported = true;
                    self.diagnostics.push(
                        Diagnostic::error(
                            MONO_BUDGET_EXCEEDED,
                            Stage::Mono,
                            &site.ptr,
                            format!(
                                "monomorphization explosion: max_specializations={}",
                                budget.max_specializations
                            ),
                        )
                        .with_data("max_specializations", json!(budget.max_specializations))
                        .with_note("raise AXLE_MAX_SPECIALIZATIONS"),
                    );
                }
                return;
            }
        };
        let Ensured::Created(i) = ensured else {
            return;
        };
        let specialized = self.table.items()[i].specialized.clone();
        for s in &site.slices {
            self.slices.push((specialized.clone(), s.clone()));
        }
        for nested in &site.nested {
            self.visit(nested, &specialized);
        }
    }
}

/// Emits one instance per distinct `(generic, binding tuple)`, walking use
/// sites depth-first in collection order.
pub fn monomorphize(
    collected: &Collected,
    resolution: &Resolution,
    pointer_width: PointerWidth,
    max_specializations: usize,
) -> MonoOutput {
    let kinds: BTreeMap<&str, GenericKind> = collected
        .templates
        .iter()
        .flat_map(|t| t.members.iter().map(move |m| (m.as_str(), t.kind)))
        .collect();
    let generics_defined = kinds.len();
    let mut w = Walker {
        resolution,
        pointer_width,
        kinds,
        table: MonoTable::new(max_specializations),
        slices: Vec::new(),
        diagnostics: Vec::new(),
        budget_reported: false,
    };

    let mut scopes = vec![MonoScope {
        name: MAIN_SCOPE.to_string(),
        nodes: w.resolved_nodes(&collected.nodes),
    }];
    for s in &collected.slices {
        w.slices.push((MAIN_SCOPE.to_string(), s.clone()));
    }

    for ext in &collected.externs {
        let signature: Vec<TypeTerm> = ext.signature.iter().map(|t| w.concrete(t)).collect();
        let key = InstantiationKey {
            generic: ext.name.clone(),
            bindings: BindingTuple::empty(),
        };
        let site = MonoSite {
            scope: MAIN_SCOPE.to_string(),
            ptr: ext.ptr.clone(),
        };
        let nodes = w.resolved_nodes(&ext.nodes);
        // Externs are outside the budget; `ensure` cannot fail for them.
        let _ = w
            .table
            .ensure(key, ItemKind::Extern, site, move || (signature, nodes));
        if !ext.nodes.is_empty() {
            scopes.push(MonoScope {
                name: ext.name.clone(),
                nodes: w.resolved_nodes(&ext.nodes),
            });
        }
        for s in &ext.slices {
            w.slices.push((ext.name.clone(), s.clone()));
        }
    }

    for site in &collected.sites {
        w.visit(site, MAIN_SCOPE);
    }

    let instantiated: BTreeSet<&str> = w
        .table
        .items()
        .iter()
        .filter(|i| i.kind != ItemKind::Extern)
        .map(|i| i.generic.as_str())
        .collect();
    let stats = MonoStats {
        generics_defined,
        generics_instantiated: instantiated.len(),
        specializations_emitted: w.table.specializations,
        sites_total: w.table.sites_total,
        memo_hits: w.table.memo_hits,
    };
    info!(
        instances = stats.specializations_emitted,
        memo_hits = stats.memo_hits,
        "monomorphized"
    );

    MonoOutput {
        map: MonoMap {
            schema_version: AXLE_MONO_MAP_SCHEMA_VERSION.to_string(),
            pointer_width: pointer_width.bits(),
            limits: MonoLimits {
                max_specializations,
            },
            stats,
            scopes,
            items: w.table.items,
        },
        slices: w.slices,
        diagnostics: w.diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ConstraintSet, Origin, OriginKind};
    use crate::lattice::{LatticeValue, Primitive, VarId};
    use crate::resolve::resolve;

    fn u8_var(m: u32, s: u32) -> TypeTerm {
        TypeTerm::primitive(
            Primitive::U8,
            LatticeValue::Variable(VarId(m)),
            LatticeValue::Variable(VarId(s)),
        )
    }

    fn key(generic: &str, m: Mutability) -> InstantiationKey {
        InstantiationKey {
            generic: generic.to_string(),
            bindings: BindingTuple {
                mutability: vec![m],
                staging: vec![Staging::Runtime],
                pointer_width: None,
            },
        }
    }

    fn site(ptr: &str) -> MonoSite {
        MonoSite {
            scope: MAIN_SCOPE.to_string(),
            ptr: ptr.to_string(),
        }
    }

    #[test]
    fn ensure_returns_the_memoized_entry() {
        let mut table = MonoTable::new(16);
        let a = table
            .ensure(key("id", Mutability::Const), ItemKind::Function, site("/body/0"), || {
                (Vec::new(), Vec::new())
            })
            .expect("budget");
        let b = table
            .ensure(key("id", Mutability::Const), ItemKind::Function, site("/body/1"), || {
                panic!("memoized entry rebuilt")
            })
            .expect("budget");
        assert_eq!(a, Ensured::Created(0));
        assert_eq!(b, Ensured::Existing(0));
        assert_eq!(table.items().len(), 1);
        assert_eq!(table.items()[0].sites.len(), 2);

        let c = table
            .ensure(key("id", Mutability::Mut), ItemKind::Function, site("/body/2"), || {
                (Vec::new(), Vec::new())
            })
            .expect("budget");
        assert_eq!(c, Ensured::Created(1));
        assert_ne!(table.items()[0].specialized, table.items()[1].specialized);
    }

    #[test]
    fn site_list_is_capped() {
        let mut table = MonoTable::new(16);
        for i in 0..20 {
            table
                .ensure(
                    key("id", Mutability::Const),
                    ItemKind::Function,
                    site(&format!("/body/{i}")),
                    || (Vec::new(), Vec::new()),
                )
                .expect("budget");
        }
        let item = &table.items()[0];
        assert_eq!(item.sites.len(), MAX_SITES_PER_ITEM);
        assert_eq!(item.sites_total, 20);
    }

    #[test]
    fn budget_counts_distinct_instances_only() {
        let mut table = MonoTable::new(1);
        let mk = || (Vec::new(), Vec::new());
        assert!(table
            .ensure(key("f", Mutability::Const), ItemKind::Function, site("/a"), mk)
            .is_ok());
        assert!(table
            .ensure(key("f", Mutability::Const), ItemKind::Function, site("/b"), mk)
            .is_ok());
        let err = table
            .ensure(key("f", Mutability::Mut), ItemKind::Function, site("/c"), mk)
            .expect_err("over budget");
        assert_eq!(err.max_specializations, 1);
        assert!(table
            .ensure(key("ext", Mutability::Mut), ItemKind::Extern, site("/d"), mk)
            .is_ok());
    }

    #[test]
    fn mangled_names_are_stable_and_marked() {
        let b = key("id", Mutability::Mut).bindings;
        let a = mangle_specialized_name("id", &b);
        assert_eq!(a, mangle_specialized_name("id", &b));
        assert!(a.starts_with("id__axle_mono_v1__m_m__s_r__h"));
        assert_eq!(a.len(), "id__axle_mono_v1__m_m__s_r__h".len() + 8);
    }

    #[test]
    fn binding_tuple_reads_resolved_slots_and_width() {
        let mut set = ConstraintSet::default();
        set.unify_mut(
            LatticeValue::Variable(VarId(1)),
            LatticeValue::Concrete(Mutability::Mut),
            Origin::new(OriginKind::WriteThrough, "/x"),
        );
        let r = resolve(&set, 2, 2);
        let sized = TypeTerm::primitive(
            Primitive::Usize,
            LatticeValue::Variable(VarId(0)),
            LatticeValue::Variable(VarId(0)),
        );
        let t = BindingTuple::of_signature(&[sized, u8_var(1, 1)], &r, PointerWidth::W32)
            .expect("no conflicts");
        assert_eq!(t.mutability, vec![Mutability::Const, Mutability::Mut]);
        assert_eq!(t.staging, vec![Staging::Runtime, Staging::Runtime]);
        assert_eq!(t.pointer_width, Some(32));

        let t = BindingTuple::of_signature(&[u8_var(0, 0)], &r, PointerWidth::W32)
            .expect("no conflicts");
        assert_eq!(t.pointer_width, None);
    }

    #[test]
    fn conflicted_signature_slot_is_reported() {
        let mut set = ConstraintSet::default();
        for m in [Mutability::Const, Mutability::Mut] {
            set.unify_mut(
                LatticeValue::Variable(VarId(0)),
                LatticeValue::Concrete(m),
                Origin::new(OriginKind::Annotation, "/x"),
            );
        }
        let r = resolve(&set, 1, 1);
        let err = BindingTuple::of_signature(&[u8_var(0, 0)], &r, PointerWidth::W64)
            .expect_err("conflicted");
        assert_eq!(err.axis, "mutability");
        assert_eq!(err.index, 0);
    }
}
