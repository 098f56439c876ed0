#![allow(dead_code)]

use axlec::compile::{resolve_unit, ResolveOptions, ResolveOutput};
use axlec::lattice::{LatticeValue, Mutability, Staging, TermKind, TypeTerm};
use axlec::mono::{MonoItem, ResolvedNode};
use serde_json::{json, Value};

pub fn unit(decls: Vec<Value>, body: Value) -> Vec<u8> {
    unit_named("main", decls, body)
}

pub fn unit_named(name: &str, decls: Vec<Value>, body: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "schema_version": "axle.unit@0.1.0",
        "unit": name,
        "decls": decls,
        "body": body,
    }))
    .expect("encode axle unit JSON")
}

pub fn func(name: &str, params: &[(&str, Value)], result: Value, body: Value) -> Value {
    let params: Vec<Value> = params
        .iter()
        .map(|(n, ty)| json!({"name": n, "ty": ty}))
        .collect();
    json!({
        "kind": "fn",
        "name": name,
        "params": params,
        "result": result,
        "body": body,
    })
}

pub fn extern_decl(name: &str, params: &[(&str, Value)], body: Option<Value>) -> Value {
    let params: Vec<Value> = params
        .iter()
        .map(|(n, ty)| json!({"name": n, "ty": ty}))
        .collect();
    let mut d = json!({
        "kind": "extern",
        "name": name,
        "params": params,
    });
    if let Some(b) = body {
        d["body"] = b;
    }
    d
}

pub fn global(storage: &str, name: &str, ty: Value, init: Value) -> Value {
    json!({
        "kind": storage,
        "name": name,
        "ty": ty,
        "init": init,
    })
}

pub fn resolve(bytes: &[u8]) -> ResolveOutput {
    resolve_unit(bytes, &ResolveOptions::default()).expect("unit must resolve without a hard error")
}

pub fn codes(out: &ResolveOutput) -> Vec<&str> {
    out.report.codes()
}

/// A node of the unit scope by declared name.
pub fn main_node<'a>(out: &'a ResolveOutput, name: &str) -> &'a ResolvedNode {
    out.mono
        .scopes
        .iter()
        .find(|s| s.name == "main")
        .and_then(|s| s.nodes.iter().find(|n| n.name.as_deref() == Some(name)))
        .unwrap_or_else(|| panic!("no node named {name:?} in main scope"))
}

pub fn items_of<'a>(out: &'a ResolveOutput, generic: &str) -> Vec<&'a MonoItem> {
    out.mono
        .items
        .iter()
        .filter(|it| it.generic == generic)
        .collect()
}

pub fn mutability(t: &TypeTerm) -> Mutability {
    match t.mutability {
        LatticeValue::Concrete(m) => m,
        LatticeValue::Variable(v) => panic!("mutability left unresolved: {v:?}"),
    }
}

pub fn staging(t: &TypeTerm) -> Staging {
    match t.staging {
        LatticeValue::Concrete(s) => s,
        LatticeValue::Variable(v) => panic!("staging left unresolved: {v:?}"),
    }
}

pub fn array_elem(t: &TypeTerm) -> &TypeTerm {
    match &t.kind {
        TermKind::Array { elem, .. } => elem,
        other => panic!("expected array, got {other:?}"),
    }
}
