use axlec::compile::{resolve_unit, resolve_units, Limits, ResolveOptions};
use axlec::lattice::{Mutability, Staging, TermKind};
use axlec::mono::{ItemKind, MONO_NAME_MARKER};
use serde_json::json;

mod axle_unit;

use axle_unit::{codes, func, items_of, main_node, mutability, resolve, staging, unit};

fn id_fn() -> serde_json::Value {
    func("id", &[("x", json!("u8"))], json!("u8"), json!([["return", "x"]]))
}

#[test]
fn equal_binding_tuples_share_one_instance() {
    let out = resolve(&unit(
        vec![id_fn()],
        json!([
            ["let", "a", "_", ["call", "id", 1]],
            ["let", "b", "_", ["call", "id", 2]]
        ]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    let items = items_of(&out, "id");
    assert_eq!(items.len(), 1, "{items:?}");
    assert_eq!(items[0].kind, ItemKind::Function);
    assert_eq!(items[0].sites_total, 2);
    assert_eq!(items[0].sites.len(), 2);
    assert_eq!(out.mono.stats.memo_hits, 1);
    assert!(items[0]
        .specialized
        .starts_with(&format!("id{MONO_NAME_MARKER}")));
}

#[test]
fn distinct_staging_gives_distinct_instances() {
    let out = resolve(&unit(
        vec![id_fn()],
        json!([
            ["let", "a", "_", ["call", "id", 1]],
            ["let", "b", "_", ["call", "id", ["runtime", 2]]]
        ]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    let items = items_of(&out, "id");
    assert_eq!(items.len(), 2, "{items:?}");
    assert_ne!(items[0].specialized, items[1].specialized);
    let mut stagings: Vec<Staging> = items.iter().map(|it| staging(&it.signature[0])).collect();
    stagings.sort();
    assert_eq!(stagings, vec![Staging::Compiletime, Staging::Runtime]);
    assert_eq!(staging(&main_node(&out, "a").ty), Staging::Compiletime);
    assert_eq!(staging(&main_node(&out, "b").ty), Staging::Runtime);
}

#[test]
fn write_through_pointer_parameter_reaches_the_caller() {
    let bump = func(
        "bump",
        &[("p", json!(["ptr", "u8"]))],
        json!("unit"),
        json!([["set", ["deref", "p"], 1]]),
    );
    let out = resolve(&unit(
        vec![bump],
        json!([
            ["let", "x", "u8", 0],
            ["call", "bump", ["addr", "x"]]
        ]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    assert_eq!(mutability(&main_node(&out, "x").ty), Mutability::Mut);
    let items = items_of(&out, "bump");
    assert_eq!(items.len(), 1);
    let TermKind::Pointer { pointee } = &items[0].signature[0].kind else {
        panic!("bump takes a pointer");
    };
    assert_eq!(mutability(pointee), Mutability::Mut);
}

#[test]
fn conflicted_signature_slot_blocks_the_instance() {
    let poke = func(
        "poke",
        &[("p", json!(["ptr", "u8"]))],
        json!("unit"),
        json!([["set", ["deref", "p"], 1]]),
    );
    let out = resolve(&unit(
        vec![poke],
        json!([
            ["let", "x", ["const", "u8"], 0],
            ["call", "poke", ["addr", "x"]]
        ]),
    ));
    assert!(!out.ok());
    let got = codes(&out);
    assert!(got.contains(&"AXL-MUT-0001"), "{got:?}");
    assert!(got.contains(&"AXL-MONO-0001"), "{got:?}");
    assert!(items_of(&out, "poke").is_empty());
}

#[test]
fn recursion_is_monomorphic_within_a_component() {
    let count = func(
        "count",
        &[("n", json!("u8"))],
        json!("u8"),
        json!([["return", ["call", "count", "n"]]]),
    );
    let even = func(
        "even",
        &[("n", json!("u8"))],
        json!("bool"),
        json!([["return", ["call", "odd", "n"]]]),
    );
    let odd = func(
        "odd",
        &[("n", json!("u8"))],
        json!("bool"),
        json!([["return", ["call", "even", "n"]]]),
    );
    let out = resolve(&unit(
        vec![count, even, odd],
        json!([
            ["let", "c", "_", ["call", "count", 3]],
            ["let", "e", "_", ["call", "even", 4]]
        ]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    assert_eq!(items_of(&out, "count").len(), 1);
    assert_eq!(items_of(&out, "count")[0].sites_total, 2);
    assert_eq!(items_of(&out, "even").len(), 1);
    assert_eq!(items_of(&out, "odd").len(), 1);
}

#[test]
fn specialization_budget_is_reported_once() {
    let options = ResolveOptions {
        limits: Limits {
            max_specializations: 1,
            ..Limits::default()
        },
        ..ResolveOptions::default()
    };
    let bytes = unit(
        vec![id_fn()],
        json!([
            ["let", "a", "_", ["call", "id", 1]],
            ["let", "b", "_", ["call", "id", ["runtime", 2]]],
            ["let", "c", "_", ["call", "id", ["runtime", 3]]]
        ]),
    );
    let out = resolve_unit(&bytes, &options).expect("resolve");
    assert!(!out.ok());
    let budget: Vec<_> = out
        .report
        .diagnostics
        .iter()
        .filter(|d| d.code == "AXL-MONO-0002")
        .collect();
    assert_eq!(budget.len(), 1);
    assert_eq!(budget[0].data["max_specializations"], json!(1));
    assert_eq!(out.mono.items.len(), 1);
}

#[test]
fn resolution_is_deterministic() {
    let bytes = unit(
        vec![id_fn()],
        json!([
            ["let", "a", "_", ["call", "id", 1]],
            ["let", "b", "_", ["call", "id", ["runtime", 2]]],
            ["let", "arr", ["array", 4, "u8"], ["array", 1, 2, 3, 4]],
            ["let", "s", "_", ["slice", "arr", 1, 3]]
        ]),
    );
    let first = resolve(&bytes);
    for _ in 0..5 {
        let again = resolve(&bytes);
        assert_eq!(first.fingerprint, again.fingerprint);
        assert_eq!(first.mono, again.mono);
        assert_eq!(first.bindings, again.bindings);
        assert_eq!(first.wide_pointers, again.wide_pointers);
    }

    let batch = resolve_units(
        &[bytes.clone(), bytes.clone(), bytes],
        &ResolveOptions::default(),
    );
    for r in batch {
        assert_eq!(r.expect("resolve").fingerprint, first.fingerprint);
    }
}

#[test]
fn externs_are_emitted_under_their_own_name() {
    let put = axle_unit::extern_decl("put", &[("v", json!("u8"))], None);
    let out = resolve(&unit(
        vec![put],
        json!([["call", "put", 1], ["call", "put", 2]]),
    ));
    assert!(out.ok(), "{:?}", out.report.diagnostics);
    let items = items_of(&out, "put");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, ItemKind::Extern);
    assert_eq!(items[0].specialized, "put");
    assert_eq!(staging(&items[0].signature[0]), Staging::Runtime);
}
