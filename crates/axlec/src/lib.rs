pub mod ast;
pub mod axleast;
pub mod collect;
pub mod compile;
pub mod constraints;
pub mod diagnostics;
pub mod language;
pub mod lattice;
pub mod mono;
pub mod resolve;
pub mod slice;
pub mod validate;

mod fingerprint;
