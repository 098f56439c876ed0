//! Wide pointers produced by `&seq[a..b]`.
//!
//! The shape is always `(pointer to element, metadata)`. The element term is
//! shared with the backing sequence, so writes through the slice are writes to
//! the sequence. Width checks wait until the target pointer width is known.

use axle_targets::PointerWidth;
use serde::Serialize;

use crate::diagnostics::{Diagnostic, Stage};
use crate::lattice::{LatticeValue, Mutability, Primitive, Shift, Staging, TermKind, TypeTerm};
use crate::resolve::Resolution;

pub const SLICE_METADATA_TOO_NARROW: &str = "AXL-SLICE-0001";
pub const SLICE_BASE_NOT_SEQUENCE: &str = "AXL-SLICE-0002";

/// A slice expression recorded during collection, finished after monomorphization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceSite {
    pub ptr: String,
    pub term: TypeTerm,
    pub backing_len: u64,
    pub lo: Option<u64>,
    pub hi: Option<u64>,
}

impl SliceSite {
    pub fn renamed(&self, mutability: Shift, staging: Shift) -> Self {
        Self {
            ptr: self.ptr.clone(),
            term: self.term.renamed(mutability, staging),
            backing_len: self.backing_len,
            lo: self.lo,
            hi: self.hi,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceShape {
    pub term: TypeTerm,
    pub backing_len: u64,
}

/// The array a slice reads from: an array value or a pointer to one.
pub fn backing_array(base: &TypeTerm) -> Option<(u64, &TypeTerm)> {
    match &base.kind {
        TermKind::Array { len, elem } => Some((*len, elem)),
        TermKind::Pointer { pointee } => match &pointee.kind {
            TermKind::Array { len, elem } => Some((*len, elem)),
            _ => None,
        },
        _ => None,
    }
}

/// Metadata primitive requested by the destination: the second element of an
/// expected 2-tuple when it is an unsigned integer, `usize` otherwise.
pub fn metadata_primitive(want: Option<&TypeTerm>) -> Primitive {
    let Some(TermKind::Tuple { elements }) = want.map(|w| &w.kind) else {
        return Primitive::Usize;
    };
    match elements.as_slice() {
        [_, meta] => match meta.kind {
            TermKind::Primitive { prim } if prim.is_unsigned_int() => prim,
            _ => Primitive::Usize,
        },
        _ => Primitive::Usize,
    }
}

/// Smallest fixed-width unsigned integer able to hold `len`.
pub fn narrowest_unsigned(len: u64) -> Primitive {
    if len <= u64::from(u8::MAX) {
        Primitive::U8
    } else if len <= u64::from(u16::MAX) {
        Primitive::U16
    } else if len <= u64::from(u32::MAX) {
        Primitive::U32
    } else {
        Primitive::U64
    }
}

fn max_for_bits(bits: u8) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Builds the wide-pointer term for a slice of `base`. `fresh` hands out new
/// slots for the pointer, the metadata and the tuple itself, in that order.
pub fn build_shape(
    base: &TypeTerm,
    want: Option<&TypeTerm>,
    fresh: &mut dyn FnMut() -> (LatticeValue<Mutability>, LatticeValue<Staging>),
) -> Option<SliceShape> {
    let (backing_len, elem) = backing_array(base)?;
    let (ptr_mut, ptr_stage) = fresh();
    let pointer = TypeTerm::pointer(elem.clone(), ptr_mut, ptr_stage);
    let (meta_mut, meta_stage) = fresh();
    let metadata = TypeTerm::primitive(metadata_primitive(want), meta_mut, meta_stage);
    let (tuple_mut, tuple_stage) = fresh();
    Some(SliceShape {
        term: TypeTerm::tuple(vec![pointer, metadata], tuple_mut, tuple_stage),
        backing_len,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundsWindow {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RequestedBounds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lo: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hi: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidePointer {
    pub scope: String,
    pub ptr: String,
    pub ty: TypeTerm,
    pub pointer: TypeTerm,
    pub metadata: Primitive,
    pub metadata_bits: u8,
    pub backing_len: u64,
    /// `[0, backing_len)` relative to the pointer's current address.
    pub window: BoundsWindow,
    pub requested: RequestedBounds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidePointerTable {
    pub schema_version: String,
    pub pointer_width: u8,
    pub items: Vec<WidePointer>,
}

/// Materializes one recorded slice with resolved slots and a bound pointer width.
pub fn synthesize(
    scope: &str,
    site: &SliceSite,
    resolution: &Resolution,
    pointer_width: PointerWidth,
) -> Result<WidePointer, Diagnostic> {
    let ty = resolution
        .substitute(&site.term)
        .bind_pointer_width(pointer_width);
    let TermKind::Tuple { elements } = &ty.kind else {
        return Err(internal_shape(site));
    };
    let [pointer, meta] = elements.as_slice() else {
        return Err(internal_shape(site));
    };
    let TermKind::Primitive { prim: metadata } = meta.kind else {
        return Err(internal_shape(site));
    };
    let metadata_bits = metadata
        .bits(Some(pointer_width))
        .ok_or_else(|| internal_shape(site))?;
    if site.backing_len > max_for_bits(metadata_bits) {
        let needed = narrowest_unsigned(site.backing_len);
        return Err(Diagnostic::error(
            SLICE_METADATA_TOO_NARROW,
            Stage::Slice,
            &site.ptr,
            format!(
                "slice metadata {} cannot represent backing length {}",
                metadata.as_str(),
                site.backing_len
            ),
        )
        .with_data("metadata", serde_json::json!(metadata.as_str()))
        .with_data("metadata_bits", serde_json::json!(metadata_bits))
        .with_data("backing_len", serde_json::json!(site.backing_len))
        .with_note(format!("use {} or wider", needed.as_str())));
    }
    Ok(WidePointer {
        scope: scope.to_string(),
        ptr: site.ptr.clone(),
        pointer: pointer.clone(),
        ty: ty.clone(),
        metadata,
        metadata_bits,
        backing_len: site.backing_len,
        window: BoundsWindow {
            start: 0,
            end: site.backing_len,
        },
        requested: RequestedBounds {
            lo: site.lo,
            hi: site.hi,
        },
    })
}

fn internal_shape(site: &SliceSite) -> Diagnostic {
    Diagnostic::error(
        SLICE_BASE_NOT_SEQUENCE,
        Stage::Slice,
        &site.ptr,
        "slice does not have a wide-pointer shape",
    )
}
