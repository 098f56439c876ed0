use axle_targets::TargetId;
use axlec::compile::{resolve_unit, Limits, ResolveOptions};
use axlec::lattice::{Mutability, Primitive};
use serde_json::json;

mod axle_unit;

use axle_unit::{array_elem, codes, extern_decl, main_node, mutability, resolve, unit};

#[test]
fn compiletime_only_parameter_at_extern_boundary_is_rejected() {
    let emit = extern_decl("emit", &[("v", json!("literal"))], None);
    let out = resolve(&unit(vec![emit], json!([])));
    assert!(!out.ok());
    let d = out
        .report
        .diagnostics
        .iter()
        .find(|d| d.code == "AXL-EXTERN-0001")
        .expect("extern boundary diagnostic");
    assert_eq!(d.ptr(), "/decls/0");
}

#[test]
fn defined_extern_with_single_call_is_exempt() {
    let emit = extern_decl("emit", &[("v", json!("literal"))], Some(json!([])));
    let once = resolve(&unit(vec![emit.clone()], json!([["call", "emit", 1]])));
    assert!(once.ok(), "{:?}", once.report.diagnostics);

    let twice = resolve(&unit(
        vec![emit],
        json!([["call", "emit", 1], ["call", "emit", 2]]),
    ));
    assert!(codes(&twice).contains(&"AXL-EXTERN-0001"), "{:?}", codes(&twice));
}

fn sliced_array(len: u64, slice_ty: serde_json::Value) -> Vec<u8> {
    unit(
        Vec::new(),
        json!([
            ["let", "a", ["array", len, "u8"], "uninit"],
            ["let", "s", slice_ty, ["slice", "a", 0, 10]],
            ["set", ["index", "s", 0], 5]
        ]),
    )
}

#[test]
fn slice_is_pointer_and_length_over_the_backing_array() {
    let out = resolve(&sliced_array(300, json!("_")));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    assert_eq!(out.wide_pointers.items.len(), 1);
    let wp = &out.wide_pointers.items[0];
    assert_eq!(wp.scope, "main");
    assert_eq!(wp.ptr, "/body/1/3");
    assert_eq!(wp.backing_len, 300);
    assert_eq!(wp.metadata_bits, 64);
    assert_eq!(wp.window.end, 300);
    assert_eq!(wp.requested.lo, Some(0));
    assert_eq!(wp.requested.hi, Some(10));
    // Writes through the slice land in the array.
    let a = main_node(&out, "a");
    assert_eq!(mutability(array_elem(&a.ty)), Mutability::Mut);
}

#[test]
fn slice_metadata_follows_target_pointer_width() {
    let options = ResolveOptions {
        target: TargetId::Wasm32.profile(),
        limits: Limits::default(),
    };
    let out = resolve_unit(&sliced_array(300, json!("_")), &options).expect("resolve");
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    assert_eq!(out.wide_pointers.items[0].metadata_bits, 32);
    assert_eq!(out.wide_pointers.items[0].metadata, Primitive::U32);
}

#[test]
fn narrow_metadata_annotation_must_hold_the_length() {
    let narrow = json!(["tuple", ["ptr", "u8"], "u8"]);
    let fits = resolve(&sliced_array(200, narrow.clone()));
    assert!(fits.ok(), "{:?}", fits.report.diagnostics);
    assert_eq!(fits.wide_pointers.items[0].metadata, Primitive::U8);

    let out = resolve(&sliced_array(300, narrow));
    assert!(!out.ok());
    let d = out
        .report
        .diagnostics
        .iter()
        .find(|d| d.code == "AXL-SLICE-0001")
        .expect("metadata too narrow");
    assert_eq!(d.ptr(), "/body/1/3");
    assert_eq!(d.data["backing_len"], json!(300));
    assert!(out.wide_pointers.items.is_empty());
}

#[test]
fn slicing_a_scalar_is_rejected() {
    let out = resolve(&unit(
        Vec::new(),
        json!([
            ["let", "x", "u8", 1],
            ["let", "s", "_", ["slice", "x", 0, 1]]
        ]),
    ));
    assert!(codes(&out).contains(&"AXL-SLICE-0002"), "{:?}", codes(&out));
}

#[test]
fn slices_inside_generics_are_synthesized_per_instance() {
    let first = axle_unit::func(
        "first",
        &[("p", json!(["ptr", ["array", 8, "u8"]]))],
        json!("u8"),
        json!([
            ["let", "s", "_", ["slice", "p", 0, 8]],
            ["return", ["index", "s", 0]]
        ]),
    );
    let out = resolve(&unit(
        vec![first],
        json!([
            ["let", "buf", ["array", 8, "u8"], "uninit"],
            ["let", "v", "_", ["call", "first", ["addr", "buf"]]]
        ]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    assert_eq!(out.wide_pointers.items.len(), 1);
    let wp = &out.wide_pointers.items[0];
    assert!(wp.scope.starts_with("first__axle_mono_v1__"), "{}", wp.scope);
    assert_eq!(wp.backing_len, 8);
}
