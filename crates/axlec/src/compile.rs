use std::collections::BTreeMap;
use std::fmt;

use axle_contracts::{AXLE_BINDINGS_SCHEMA_VERSION, AXLE_WIDE_POINTERS_SCHEMA_VERSION};
use axle_targets::TargetProfile;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::axleast;
use crate::collect::{self, Collected};
use crate::diagnostics::{Diagnostic, Location, Report, Stage};
use crate::fingerprint;
use crate::language;
use crate::lattice::{Mutability, Staging, VarId};
use crate::mono::{self, MonoMap};
use crate::resolve::{self, Binding, ConflictRecord, Resolution};
use crate::slice::{self, WidePointerTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limits {
    pub max_type_nodes: usize,
    pub max_vars: usize,
    pub max_specializations: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_type_nodes: language::limits::max_type_nodes(),
            max_vars: language::limits::max_vars(),
            max_specializations: language::limits::max_specializations(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    pub target: TargetProfile,
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    Parse,
    Budget,
    Internal,
}

#[derive(Debug, Clone)]
pub struct CompilerError {
    pub kind: CompileErrorKind,
    pub message: String,
}

impl CompilerError {
    pub fn new(kind: CompileErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CompilerError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VarBinding<D> {
    pub var: VarId,
    pub binding: Binding<D>,
}

/// Final value of every lattice variable of the unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingTable {
    pub schema_version: String,
    pub mutability: Vec<VarBinding<Mutability>>,
    pub staging: Vec<VarBinding<Staging>>,
    pub conflicts: Vec<ConflictRecord>,
}

impl BindingTable {
    fn from_resolution(resolution: &Resolution) -> Self {
        Self {
            schema_version: AXLE_BINDINGS_SCHEMA_VERSION.to_string(),
            mutability: resolution
                .mutability
                .iter()
                .enumerate()
                .map(|(i, b)| VarBinding {
                    var: VarId(i as u32),
                    binding: *b,
                })
                .collect(),
            staging: resolution
                .staging
                .iter()
                .enumerate()
                .map(|(i, b)| VarBinding {
                    var: VarId(i as u32),
                    binding: *b,
                })
                .collect(),
            conflicts: resolution.conflicts.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolveOutput {
    pub unit: String,
    pub report: Report,
    pub bindings: BindingTable,
    pub mono: MonoMap,
    pub wide_pointers: WidePointerTable,
    /// SHA-256 over the three tables; equal inputs give equal fingerprints.
    pub fingerprint: String,
}

impl ResolveOutput {
    pub fn ok(&self) -> bool {
        self.report.ok
    }
}

/// Turns a conflict record into a diagnostic. Messages name values and
/// locations only, so the copies of one generic produce identical messages.
pub fn conflict_diagnostic(rec: &ConflictRecord) -> Diagnostic {
    let mut d = Diagnostic::error(
        rec.kind.code(),
        Stage::Resolve,
        &rec.at.ptr,
        format!(
            "{}: {} vs {}",
            rec.kind.title(),
            rec.first.value,
            rec.second.value
        ),
    )
    .with_data("axis", json!(rec.axis))
    .with_data("first", json!(rec.first))
    .with_data("second", json!(rec.second))
    .with_data("origin", json!(rec.at.kind.as_str()));
    for e in [&rec.first, &rec.second] {
        if let Some(o) = &e.origin {
            if o.ptr != rec.at.ptr && !d.related.iter().any(|r| r == &loc(&o.ptr)) {
                d = d.with_related(&o.ptr);
            }
        }
    }
    d
}

fn loc(ptr: &str) -> Location {
    Location::AxleUnit {
        ptr: ptr.to_string(),
    }
}

fn template_diagnostics(collected: &Collected) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for t in &collected.templates {
        for rec in resolve::hard_conflicts(&t.constraints) {
            out.push(conflict_diagnostic(&rec).with_data("generic", json!(t.members.join(","))));
        }
    }
    out
}

pub fn resolve_unit(
    bytes: &[u8],
    options: &ResolveOptions,
) -> Result<ResolveOutput, CompilerError> {
    if bytes.len() > language::limits::MAX_SOURCE_BYTES {
        return Err(CompilerError::new(
            CompileErrorKind::Budget,
            format!(
                "unit too large: {} bytes (max {})",
                bytes.len(),
                language::limits::MAX_SOURCE_BYTES
            ),
        ));
    }
    let unit = axleast::parse_axle_unit_json(bytes)
        .map_err(|e| CompilerError::new(CompileErrorKind::Parse, e.to_string()))?;
    let nodes = unit.node_count();
    if nodes > options.limits.max_type_nodes {
        return Err(CompilerError::new(
            CompileErrorKind::Budget,
            format!(
                "unit {:?} has {nodes} nodes (max {}, raise AXLE_MAX_TYPE_NODES)",
                unit.name, options.limits.max_type_nodes
            ),
        ));
    }

    let collected = collect::collect_unit(&unit, options.limits.max_vars)?;
    let resolution = resolve::resolve(
        &collected.constraints,
        collected.mut_vars,
        collected.stage_vars,
    );
    debug!(
        unit = unit.name.as_str(),
        conflicts = resolution.conflicts.len(),
        "resolution done"
    );

    let mut diagnostics = collected.diagnostics.clone();
    diagnostics.extend(template_diagnostics(&collected));
    diagnostics.extend(resolution.conflicts.iter().map(conflict_diagnostic));

    let pointer_width = options.target.pointer_width;
    let mono_out = mono::monomorphize(
        &collected,
        &resolution,
        pointer_width,
        options.limits.max_specializations,
    );
    diagnostics.extend(mono_out.diagnostics);

    let mut items = Vec::new();
    for (scope, site) in &mono_out.slices {
        match slice::synthesize(scope, site, &resolution, pointer_width) {
            Ok(wp) => items.push(wp),
            Err(d) => diagnostics.push(d),
        }
    }
    let wide_pointers = WidePointerTable {
        schema_version: AXLE_WIDE_POINTERS_SCHEMA_VERSION.to_string(),
        pointer_width: pointer_width.bits(),
        items,
    };

    let bindings = BindingTable::from_resolution(&resolution);
    let fingerprint = fingerprint::tables_fingerprint(&bindings, &mono_out.map, &wide_pointers);

    let mut report = Report::ok().with_diagnostics(diagnostics);
    report.meta = BTreeMap::from([
        ("lang_id".to_string(), json!(language::LANG_ID)),
        ("unit".to_string(), json!(unit.name)),
        ("target".to_string(), json!(options.target.id.as_str())),
        ("pointer_width".to_string(), json!(pointer_width.bits())),
        ("fingerprint".to_string(), json!(fingerprint)),
    ]);
    info!(
        unit = unit.name.as_str(),
        ok = report.ok,
        diagnostics = report.diagnostics.len(),
        instances = mono_out.map.items.len(),
        "resolved unit"
    );

    Ok(ResolveOutput {
        unit: unit.name,
        report,
        bindings,
        mono: mono_out.map,
        wide_pointers,
        fingerprint,
    })
}

/// Resolves independent units in parallel. Results keep the input order.
pub fn resolve_units(
    units: &[Vec<u8>],
    options: &ResolveOptions,
) -> Vec<Result<ResolveOutput, CompilerError>> {
    units
        .par_iter()
        .map(|bytes| resolve_unit(bytes, options))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axle_targets::{PointerWidth, TargetId};

    fn unit(body: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "schema_version": "axle.unit@0.1.0",
            "unit": "main",
            "decls": [],
            "body": body,
        }))
        .expect("serialize")
    }

    #[test]
    fn oversized_unit_is_a_budget_error() {
        let options = ResolveOptions {
            target: TargetProfile::default(),
            limits: Limits {
                max_type_nodes: 2,
                max_vars: 1000,
                max_specializations: 8,
            },
        };
        let bytes = unit(json!([["let", "x", "u8", 1], ["let", "y", "u8", 2]]));
        let err = resolve_unit(&bytes, &options).expect_err("budget");
        assert_eq!(err.kind, CompileErrorKind::Budget);
    }

    #[test]
    fn variable_budget_is_enforced() {
        let options = ResolveOptions {
            target: TargetProfile::default(),
            limits: Limits {
                max_type_nodes: 1000,
                max_vars: 3,
                max_specializations: 8,
            },
        };
        let err = resolve_unit(
            &unit(json!([["let", "x", ["tuple", "u8", "u8", "u8"], ["tuple", 1, 2, 3]]])),
            &options,
        )
        .expect_err("budget");
        assert_eq!(err.kind, CompileErrorKind::Budget);
    }

    #[test]
    fn malformed_input_is_a_parse_error() {
        let err = resolve_unit(b"{}", &ResolveOptions::default()).expect_err("parse");
        assert_eq!(err.kind, CompileErrorKind::Parse);
    }

    #[test]
    fn report_meta_names_target() {
        let options = ResolveOptions {
            target: TargetId::Wasm32.profile(),
            limits: Limits::default(),
        };
        let out = resolve_unit(&unit(json!([["let", "x", "u8", 1]])), &options).expect("resolve");
        assert!(out.ok());
        assert_eq!(out.report.meta["target"], json!("wasm32"));
        assert_eq!(out.wide_pointers.pointer_width, PointerWidth::W32.bits());
    }

    #[test]
    fn parallel_resolution_keeps_order() {
        let units = vec![
            unit(json!([["let", "a", "u8", 1]])),
            b"not json".to_vec(),
            unit(json!([["let", "b", "u8", 2]])),
        ];
        let out = resolve_units(&units, &ResolveOptions::default());
        assert_eq!(out.len(), 3);
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
        assert!(out[2].is_ok());
    }
}
