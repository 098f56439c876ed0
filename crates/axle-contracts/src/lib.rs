//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in machine-readable I/O of the axle resolution core and its driver.

pub const AXLE_UNIT_SCHEMA_VERSION: &str = "axle.unit@0.1.0";
pub const AXLE_UNIT_SCHEMA_VERSIONS_SUPPORTED: &[&str] = &[AXLE_UNIT_SCHEMA_VERSION];

pub const AXLE_DIAG_SCHEMA_VERSION: &str = "axle.diag@0.1.0";
pub const AXLE_BINDINGS_SCHEMA_VERSION: &str = "axle.bindings@0.1.0";
pub const AXLE_MONO_MAP_SCHEMA_VERSION: &str = "axle.mono-map@0.1.0";
pub const AXLE_WIDE_POINTERS_SCHEMA_VERSION: &str = "axle.wide-pointers@0.1.0";

pub const AXLEC_REPORT_SCHEMA_VERSION: &str = "axlec.report@0.1.0";
