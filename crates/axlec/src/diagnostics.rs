use std::collections::{BTreeMap, BTreeSet};

use axle_contracts::AXLE_DIAG_SCHEMA_VERSION;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Collect,
    Resolve,
    Mono,
    Slice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    AxleUnit { ptr: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<Location>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

impl Diagnostic {
    pub fn error(code: &str, stage: Stage, ptr: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            severity: Severity::Error,
            stage,
            message: message.into(),
            loc: Some(Location::AxleUnit {
                ptr: ptr.to_string(),
            }),
            notes: Vec::new(),
            related: Vec::new(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_related(mut self, ptr: &str) -> Self {
        self.related.push(Location::AxleUnit {
            ptr: ptr.to_string(),
        });
        self
    }

    pub fn ptr(&self) -> &str {
        match &self.loc {
            Some(Location::AxleUnit { ptr }) => ptr.as_str(),
            None => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub schema_version: String,
    pub ok: bool,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
}

impl Report {
    pub fn ok() -> Self {
        Self {
            schema_version: AXLE_DIAG_SCHEMA_VERSION.to_string(),
            ok: true,
            diagnostics: Vec::new(),
            meta: BTreeMap::new(),
        }
    }

    /// Sorts by location, code and message, dropping repeats of the same
    /// `(code, ptr, message, axis)` that arise from copied generic bodies.
    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        let mut seen: BTreeSet<(String, String, String, String)> = BTreeSet::new();
        let mut diagnostics: Vec<Diagnostic> = diagnostics
            .into_iter()
            .filter(|d| {
                let axis = d.data.get("axis").map(Value::to_string).unwrap_or_default();
                seen.insert((d.code.clone(), d.ptr().to_string(), d.message.clone(), axis))
            })
            .collect();
        diagnostics.sort_by(|a, b| {
            a.ptr()
                .cmp(b.ptr())
                .then_with(|| a.code.cmp(&b.code))
                .then_with(|| a.message.cmp(&b.message))
        });
        self.ok = diagnostics.iter().all(|d| d.severity != Severity::Error);
        self.diagnostics = diagnostics;
        self
    }

    pub fn codes(&self) -> Vec<&str> {
        self.diagnostics.iter().map(|d| d.code.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_sorts_and_merges_repeats() {
        let d = |code: &str, ptr: &str| Diagnostic::error(code, Stage::Resolve, ptr, "m");
        let report = Report::ok().with_diagnostics(vec![
            d("AXL-MUT-0001", "/body/2"),
            d("AXL-STAGE-0001", "/body/1"),
            d("AXL-MUT-0001", "/body/2").with_data("var", Value::from(7)),
        ]);
        assert!(!report.ok);
        assert_eq!(report.codes(), vec!["AXL-STAGE-0001", "AXL-MUT-0001"]);
    }

    #[test]
    fn same_text_on_different_axes_is_kept() {
        let d = |axis: &str| {
            Diagnostic::error("AXL-TYPE-0002", Stage::Resolve, "/body/0", "mismatch")
                .with_data("axis", Value::from(axis))
        };
        let report =
            Report::ok().with_diagnostics(vec![d("mutability"), d("staging"), d("staging")]);
        assert_eq!(report.diagnostics.len(), 2);
    }

    #[test]
    fn empty_report_is_ok() {
        let report = Report::ok().with_diagnostics(Vec::new());
        assert!(report.ok);
        assert_eq!(report.schema_version, AXLE_DIAG_SCHEMA_VERSION);
    }
}
