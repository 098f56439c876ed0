use axlec::lattice::{Mutability, Staging, TermKind};
use serde_json::json;

mod axle_unit;

use axle_unit::{array_elem, codes, main_node, mutability, resolve, staging, unit};

#[test]
fn unwritten_local_defaults_to_const() {
    let out = resolve(&unit(Vec::new(), json!([["let", "x", "u8", 1]])));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    let x = main_node(&out, "x");
    assert_eq!(mutability(&x.ty), Mutability::Const);
}

#[test]
fn assignment_makes_the_target_mut() {
    let out = resolve(&unit(
        Vec::new(),
        json!([
            ["let", "x", "u8", 0],
            ["let", "y", "u8", 0],
            ["set", "x", 1]
        ]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    assert_eq!(mutability(&main_node(&out, "x").ty), Mutability::Mut);
    assert_eq!(mutability(&main_node(&out, "y").ty), Mutability::Const);
}

#[test]
fn literal_initializer_stays_compiletime() {
    let out = resolve(&unit(
        Vec::new(),
        json!([
            ["let", "x", "u8", 1],
            ["let", "y", "_", ["+", 1, 2]]
        ]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    assert_eq!(staging(&main_node(&out, "x").ty), Staging::Compiletime);
    assert_eq!(staging(&main_node(&out, "y").ty), Staging::Compiletime);
}

#[test]
fn explicit_runtime_overrides_literal_default() {
    let out = resolve(&unit(
        Vec::new(),
        json!([
            ["let", "a", ["runtime", "u8"], 1],
            ["let", "b", "_", ["runtime", 2]]
        ]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    assert_eq!(staging(&main_node(&out, "a").ty), Staging::Runtime);
    assert_eq!(staging(&main_node(&out, "b").ty), Staging::Runtime);
}

#[test]
fn runtime_taints_arithmetic_results() {
    let out = resolve(&unit(
        Vec::new(),
        json!([
            ["let", "r", ["runtime", "u8"], 1],
            ["let", "q", "_", ["+", "r", 1]],
            ["let", "z", "_", ["runtime", ["+", "r", 2]]]
        ]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    assert_eq!(staging(&main_node(&out, "q").ty), Staging::Runtime);
    assert_eq!(staging(&main_node(&out, "z").ty), Staging::Runtime);
}

#[test]
fn static_storage_is_runtime() {
    let out = resolve(&unit(
        vec![axle_unit::global("static", "counter", json!("u32"), json!(0))],
        json!([["static", "g", "u8", 1]]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    assert_eq!(staging(&main_node(&out, "counter").ty), Staging::Runtime);
    assert_eq!(staging(&main_node(&out, "g").ty), Staging::Runtime);
}

#[test]
fn static_of_compiletime_only_type_is_rejected() {
    let out = resolve(&unit(
        Vec::new(),
        json!([
            ["static", "t", "literal", 1],
            ["static", "h", ["compiletime", "u8"], 2]
        ]),
    ));
    assert!(!out.ok());
    let found: Vec<&str> = out
        .report
        .diagnostics
        .iter()
        .filter(|d| d.code == "AXL-STAGE-0002")
        .map(|d| d.ptr())
        .collect();
    assert_eq!(found, vec!["/body/0", "/body/1"]);
}

#[test]
fn write_to_const_annotation_is_a_conflict() {
    let out = resolve(&unit(
        Vec::new(),
        json!([
            ["let", "x", ["const", "u8"], 1],
            ["set", "x", 2]
        ]),
    ));
    assert!(!out.ok());
    let d = out
        .report
        .diagnostics
        .iter()
        .find(|d| d.code == "AXL-MUT-0001")
        .expect("mutability conflict");
    assert_eq!(d.ptr(), "/body/1");
    assert_eq!(d.data["axis"], json!("mutability"));
    assert!(d.message.contains("const") && d.message.contains("mut"), "{}", d.message);
    assert_eq!(out.bindings.conflicts.len(), 1);
}

#[test]
fn const_coerced_initializer_rejects_later_write() {
    let out = resolve(&unit(
        Vec::new(),
        json!([
            ["let", "x", "_", ["const", 1]],
            ["set", "x", 2]
        ]),
    ));
    assert!(!out.ok());
    assert!(codes(&out).contains(&"AXL-MUT-0001"), "{:?}", codes(&out));
    assert_eq!(out.bindings.conflicts.len(), 1);
}

#[test]
fn mut_coerced_initializer_makes_binding_mut() {
    let out = resolve(&unit(
        Vec::new(),
        json!([
            ["let", "x", "_", ["mut", 1]],
            ["let", "y", "u8", ["mut", ["runtime", 2]]]
        ]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    assert_eq!(mutability(&main_node(&out, "x").ty), Mutability::Mut);
    assert_eq!(mutability(&main_node(&out, "y").ty), Mutability::Mut);
    assert_eq!(staging(&main_node(&out, "y").ty), Staging::Runtime);
}

#[test]
fn char_literal_binding_is_compiletime() {
    let out = resolve(&unit(
        Vec::new(),
        json!([["let", "h", "literal", ["char", "h"]]]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    assert_eq!(staging(&main_node(&out, "h").ty), Staging::Compiletime);
}

#[test]
fn runtime_string_literal_is_runtime_throughout() {
    let out = resolve(&unit(
        Vec::new(),
        json!([["let", "s", ["array", "_", "u8"], ["runtime", ["str", "abc"]]]]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    let s = &main_node(&out, "s").ty;
    assert_eq!(staging(s), Staging::Runtime);
    assert_eq!(staging(array_elem(s)), Staging::Runtime);
}

#[test]
fn runtime_value_cannot_enter_compiletime_slot() {
    let out = resolve(&unit(
        Vec::new(),
        json!([
            ["let", "r", ["runtime", "u8"], 1],
            ["let", "c", ["compiletime", "u8"], "r"]
        ]),
    ));
    assert!(codes(&out).contains(&"AXL-STAGE-0004"), "{:?}", codes(&out));
}

#[test]
fn runtime_coercion_requires_literal_origin() {
    let out = resolve(&unit(
        Vec::new(),
        json!([["let", "t", "_", ["runtime", ["type", "u8"]]]]),
    ));
    assert!(!out.ok());
    assert!(codes(&out).contains(&"AXL-STAGE-0003"), "{:?}", codes(&out));
}

#[test]
fn array_elements_share_one_mutability() {
    let ok = resolve(&unit(
        Vec::new(),
        json!([
            ["let", "a", "_", ["array", ["mut", 1], ["mut", 2]]],
            ["let", "b", "_", ["array", 1, ["const", 2], 3]]
        ]),
    ));
    assert!(ok.ok(), "{:?}", ok.report.diagnostics);

    let bad = resolve(&unit(
        Vec::new(),
        json!([["let", "a", "_", ["array", ["const", 1], ["mut", 2]]]]),
    ));
    let d = bad
        .report
        .diagnostics
        .iter()
        .find(|d| d.code == "AXL-ARRAY-0001")
        .expect("heterogeneous array");
    assert_eq!(d.ptr(), "/body/0/3/2");
    assert!(d.message.contains("tuple"), "{}", d.message);
}

#[test]
fn uninit_array_element_takes_the_shared_slot() {
    let out = resolve(&unit(
        Vec::new(),
        json!([["let", "a", ["array", 2, "u8"], ["array", 1, "uninit"]]]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    let TermKind::Array { len, .. } = main_node(&out, "a").ty.kind else {
        panic!("expected array");
    };
    assert_eq!(len, 2);

    let bad = resolve(&unit(
        Vec::new(),
        json!([[
            "let",
            "a",
            ["array", 3, "u8"],
            ["array", "uninit", ["const", 1], ["mut", 2]]
        ]]),
    ));
    let d = bad
        .report
        .diagnostics
        .iter()
        .find(|d| d.code == "AXL-ARRAY-0001")
        .expect("heterogeneous array");
    assert_eq!(d.ptr(), "/body/0/3/3");
}

#[test]
fn uninit_tuple_element_follows_annotation() {
    let out = resolve(&unit(
        Vec::new(),
        json!([
            ["let", "t", ["tuple", "u8", "u8"], ["tuple", 1, "uninit"]],
            ["set", ["field", "t", 1], 4]
        ]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    let TermKind::Tuple { elements } = &main_node(&out, "t").ty.kind else {
        panic!("expected tuple");
    };
    assert_eq!(elements.len(), 2);
    assert_eq!(mutability(&elements[1]), Mutability::Mut);

    let bad = resolve(&unit(
        Vec::new(),
        json!([["let", "t", "_", ["tuple", 1, "uninit"]]]),
    ));
    let d = bad
        .report
        .diagnostics
        .iter()
        .find(|d| d.code == "AXL-TYPE-0002")
        .expect("uninit without annotation");
    assert_eq!(d.ptr(), "/body/0/3/2");
    assert!(d.message.contains("uninit"), "{}", d.message);
}

#[test]
fn struct_fields_resolve_independently() {
    let pair = json!({"kind": "struct", "name": "Pair", "fields": ["u8", "u8"]});
    let out = resolve(&unit(
        vec![pair],
        json!([
            ["let", "p", "_", ["call", "Pair", 1, 2]],
            ["set", ["field", "p", 0], 3]
        ]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    let TermKind::Tuple { elements } = &main_node(&out, "p").ty.kind else {
        panic!("struct value must lower to a tuple");
    };
    assert_eq!(mutability(&elements[0]), Mutability::Mut);
    assert_eq!(mutability(&elements[1]), Mutability::Const);
}

#[test]
fn directly_recursive_struct_is_rejected() {
    let node = json!({"kind": "struct", "name": "Node", "fields": ["u8", "Node"]});
    let out = resolve(&unit(vec![node], json!([])));
    assert!(!out.ok());
    assert!(out
        .report
        .diagnostics
        .iter()
        .any(|d| d.code == "AXL-TYPE-0002" && d.message.contains("infinite size")));
}

#[test]
fn unknown_names_are_reported() {
    let out = resolve(&unit(
        Vec::new(),
        json!([
            ["let", "a", "_", "missing"],
            ["call", "nowhere", 1]
        ]),
    ));
    let got = codes(&out);
    assert!(got.contains(&"AXL-TYPE-0001"), "{got:?}");
    assert!(got.contains(&"AXL-CALL-0001"), "{got:?}");
}

#[test]
fn call_arity_is_checked() {
    let id = axle_unit::func(
        "id",
        &[("x", json!("u8"))],
        json!("u8"),
        json!([["return", "x"]]),
    );
    let out = resolve(&unit(vec![id], json!([["call", "id", 1, 2]])));
    let d = out
        .report
        .diagnostics
        .iter()
        .find(|d| d.code == "AXL-CALL-0002")
        .expect("arity diagnostic");
    assert_eq!(d.data["expected"], json!(1));
    assert_eq!(d.data["got"], json!(2));
}
