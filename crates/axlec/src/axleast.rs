use std::collections::BTreeSet;
use std::fmt::Display;

use axle_contracts::AXLE_UNIT_SCHEMA_VERSIONS_SUPPORTED;
use serde_json::Value;

use crate::ast::{
    BinOp, Coercion, Decl, Expr, ExprKind, ExternDecl, FunctionDecl, GlobalDecl, MutQualifier,
    Param, Stmt, StmtKind, Storage, StructDecl, TypeExpr, TypeExprKind, Unit,
};
use crate::lattice::{Primitive, Staging};
use crate::validate;

#[derive(Debug, Clone)]
pub struct AxleAstError {
    pub message: String,
    pub ptr: String,
}

impl std::error::Error for AxleAstError {}

impl Display for AxleAstError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.ptr)
    }
}

fn err<T>(ptr: &str, message: impl Into<String>) -> Result<T, AxleAstError> {
    Err(AxleAstError {
        message: message.into(),
        ptr: ptr.to_string(),
    })
}

pub fn parse_axle_unit_json(bytes: &[u8]) -> Result<Unit, AxleAstError> {
    let doc: Value = serde_json::from_slice(bytes).map_err(|e| AxleAstError {
        message: e.to_string(),
        ptr: "".to_string(),
    })?;
    parse_unit_value(&doc)
}

pub fn parse_unit_value(root: &Value) -> Result<Unit, AxleAstError> {
    let root_obj = root.as_object().ok_or_else(|| AxleAstError {
        message: "unit root must be an object".to_string(),
        ptr: "".to_string(),
    })?;

    let schema_version = get_required_string(root_obj, "/schema_version", "schema_version")?;
    if !AXLE_UNIT_SCHEMA_VERSIONS_SUPPORTED
        .iter()
        .any(|&v| v == schema_version)
    {
        return err(
            "/schema_version",
            format!(
                "unsupported schema_version: got {schema_version:?} (supported: {})",
                AXLE_UNIT_SCHEMA_VERSIONS_SUPPORTED.join(", ")
            ),
        );
    }

    let name = get_required_string(root_obj, "/unit", "unit")?;
    validate::validate_unit_name(&name).map_err(|message| AxleAstError {
        message,
        ptr: "/unit".to_string(),
    })?;

    let mut decls = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    if let Some(decls_v) = root_obj.get("decls") {
        let decls_a = decls_v.as_array().ok_or_else(|| AxleAstError {
            message: "decls must be an array".to_string(),
            ptr: "/decls".to_string(),
        })?;
        for (idx, d) in decls_a.iter().enumerate() {
            let ptr = format!("/decls/{idx}");
            let decl = parse_decl(d, &ptr)?;
            if !seen.insert(decl.name().to_string()) {
                return err(
                    &format!("{ptr}/name"),
                    format!("duplicate declaration name: {:?}", decl.name()),
                );
            }
            decls.push(decl);
        }
    }

    let body = match root_obj.get("body") {
        Some(v) => parse_block(v, "/body")?,
        None => Vec::new(),
    };

    Ok(Unit {
        schema_version,
        name,
        decls,
        body,
    })
}

fn parse_decl(v: &Value, ptr: &str) -> Result<Decl, AxleAstError> {
    let dobj = v.as_object().ok_or_else(|| AxleAstError {
        message: "decl must be an object".to_string(),
        ptr: ptr.to_string(),
    })?;
    let kind = get_required_string(dobj, &format!("{ptr}/kind"), "kind")?;
    match kind.as_str() {
        "let" | "static" => {
            let name = parse_symbol(dobj, ptr)?;
            let init_v = get_required(dobj, ptr, "init")?;
            let init = parse_expr(init_v, &format!("{ptr}/init"))?;
            let storage = if kind == "static" {
                Storage::Static
            } else {
                Storage::Let
            };
            let ty = match dobj.get("ty") {
                None => None,
                Some(Value::String(s)) if s == "_" => None,
                Some(t) => Some(parse_type(t, &format!("{ptr}/ty"), init.literal_len())?),
            };
            if storage == Storage::Static && ty.is_none() {
                return err(&format!("{ptr}/ty"), "static declarations need a type");
            }
            Ok(Decl::Global(GlobalDecl {
                ptr: ptr.to_string(),
                name,
                storage,
                ty,
                init,
            }))
        }
        "fn" => {
            let name = parse_symbol(dobj, ptr)?;
            let params = parse_params(dobj, ptr)?;
            let result = parse_result(dobj, ptr)?;
            let body_v = get_required(dobj, ptr, "body")?;
            let body = parse_block(body_v, &format!("{ptr}/body"))?;
            Ok(Decl::Function(FunctionDecl {
                ptr: ptr.to_string(),
                name,
                params,
                result,
                body,
            }))
        }
        "struct" => {
            let name = get_required_string(dobj, &format!("{ptr}/name"), "name")?;
            validate::validate_type_name(&name).map_err(|message| AxleAstError {
                message,
                ptr: format!("{ptr}/name"),
            })?;
            let fields_v = get_required(dobj, ptr, "fields")?;
            let fields_a = fields_v.as_array().ok_or_else(|| AxleAstError {
                message: "fields must be an array".to_string(),
                ptr: format!("{ptr}/fields"),
            })?;
            let fields = fields_a
                .iter()
                .enumerate()
                .map(|(i, f)| parse_type(f, &format!("{ptr}/fields/{i}"), None))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Decl::Struct(StructDecl {
                ptr: ptr.to_string(),
                name,
                fields,
            }))
        }
        "extern" => {
            let name = parse_symbol(dobj, ptr)?;
            let params = parse_params(dobj, ptr)?;
            let result = parse_result(dobj, ptr)?;
            let body = match dobj.get("body") {
                Some(b) => Some(parse_block(b, &format!("{ptr}/body"))?),
                None => None,
            };
            Ok(Decl::Extern(ExternDecl {
                ptr: ptr.to_string(),
                name,
                params,
                result,
                body,
            }))
        }
        other => err(
            &format!("{ptr}/kind"),
            format!("unknown decl kind: {other:?}"),
        ),
    }
}

fn parse_symbol(
    dobj: &serde_json::Map<String, Value>,
    ptr: &str,
) -> Result<String, AxleAstError> {
    let name = get_required_string(dobj, &format!("{ptr}/name"), "name")?;
    validate::validate_symbol(&name).map_err(|message| AxleAstError {
        message,
        ptr: format!("{ptr}/name"),
    })?;
    Ok(name)
}

fn parse_params(
    dobj: &serde_json::Map<String, Value>,
    ptr: &str,
) -> Result<Vec<Param>, AxleAstError> {
    let Some(params_v) = dobj.get("params") else {
        return Ok(Vec::new());
    };
    let params_a = params_v.as_array().ok_or_else(|| AxleAstError {
        message: "params must be an array".to_string(),
        ptr: format!("{ptr}/params"),
    })?;
    let mut out = Vec::with_capacity(params_a.len());
    for (i, p) in params_a.iter().enumerate() {
        let pptr = format!("{ptr}/params/{i}");
        let pobj = p.as_object().ok_or_else(|| AxleAstError {
            message: "param must be an object".to_string(),
            ptr: pptr.clone(),
        })?;
        let name = get_required_string(pobj, &format!("{pptr}/name"), "name")?;
        validate::validate_local_name(&name).map_err(|message| AxleAstError {
            message,
            ptr: format!("{pptr}/name"),
        })?;
        let ty_v = get_required(pobj, &pptr, "ty")?;
        let ty = parse_type(ty_v, &format!("{pptr}/ty"), None)?;
        out.push(Param {
            ptr: pptr.clone(),
            name,
            ty,
        });
    }
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for (i, p) in out.iter().enumerate() {
        if !names.insert(p.name.as_str()) {
            return err(
                &format!("{ptr}/params/{i}/name"),
                format!("duplicate param name: {:?}", p.name),
            );
        }
    }
    Ok(out)
}

fn parse_result(
    dobj: &serde_json::Map<String, Value>,
    ptr: &str,
) -> Result<TypeExpr, AxleAstError> {
    match dobj.get("result") {
        Some(v) => parse_type(v, &format!("{ptr}/result"), None),
        None => Ok(TypeExpr {
            ptr: format!("{ptr}/result"),
            kind: TypeExprKind::Unit,
        }),
    }
}

/// Parses a type expression. `hole_len` fills a top-level `_` array length.
pub fn parse_type(v: &Value, ptr: &str, hole_len: Option<u64>) -> Result<TypeExpr, AxleAstError> {
    let kind = match v {
        Value::String(s) => match s.as_str() {
            "type" => TypeExprKind::TypeValue,
            "literal" => TypeExprKind::Literal,
            "unit" => TypeExprKind::Unit,
            name => match Primitive::parse_named(name) {
                Some(p) => TypeExprKind::Prim(p),
                None => {
                    validate::validate_type_name(name).map_err(|message| AxleAstError {
                        message: format!("unknown type: {message}"),
                        ptr: ptr.to_string(),
                    })?;
                    TypeExprKind::Adt(name.to_string())
                }
            },
        },
        Value::Array(items) => {
            let head = items.first().and_then(Value::as_str).ok_or_else(|| AxleAstError {
                message: "type list must start with a head string".to_string(),
                ptr: ptr.to_string(),
            })?;
            let arg = |i: usize| -> Result<&Value, AxleAstError> {
                items.get(i).ok_or_else(|| AxleAstError {
                    message: format!("{head} type is missing operand {i}"),
                    ptr: ptr.to_string(),
                })
            };
            let exact = |n: usize| -> Result<(), AxleAstError> {
                if items.len() != n {
                    return err(
                        ptr,
                        format!("{head} type expects {} operand(s) got {}", n - 1, items.len() - 1),
                    );
                }
                Ok(())
            };
            match head {
                "const" | "mut" | "anymut" => {
                    exact(2)?;
                    let q = match head {
                        "const" => MutQualifier::Const,
                        "mut" => MutQualifier::Mut,
                        _ => MutQualifier::AnyMut,
                    };
                    let inner = parse_type(arg(1)?, &format!("{ptr}/1"), hole_len)?;
                    TypeExprKind::Mutability(q, Box::new(inner))
                }
                "compiletime" | "runtime" => {
                    exact(2)?;
                    let s = if head == "compiletime" {
                        Staging::Compiletime
                    } else {
                        Staging::Runtime
                    };
                    let inner = parse_type(arg(1)?, &format!("{ptr}/1"), hole_len)?;
                    TypeExprKind::Staging(s, Box::new(inner))
                }
                "ptr" => {
                    exact(2)?;
                    TypeExprKind::Pointer(Box::new(parse_type(arg(1)?, &format!("{ptr}/1"), None)?))
                }
                "array" => {
                    exact(3)?;
                    let len = match arg(1)? {
                        Value::String(s) if s == "_" => hole_len.ok_or_else(|| AxleAstError {
                            message: "array length `_` needs a literal initializer".to_string(),
                            ptr: format!("{ptr}/1"),
                        })?,
                        Value::Number(n) => n.as_u64().ok_or_else(|| AxleAstError {
                            message: format!("array length must be a non-negative integer: {n}"),
                            ptr: format!("{ptr}/1"),
                        })?,
                        other => {
                            return err(
                                &format!("{ptr}/1"),
                                format!("array length must be a number or \"_\": {other}"),
                            )
                        }
                    };
                    let elem = parse_type(arg(2)?, &format!("{ptr}/2"), None)?;
                    TypeExprKind::Array {
                        len,
                        elem: Box::new(elem),
                    }
                }
                "tuple" => TypeExprKind::Tuple(
                    items
                        .iter()
                        .enumerate()
                        .skip(1)
                        .map(|(i, t)| parse_type(t, &format!("{ptr}/{i}"), None))
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                "fn" => {
                    exact(3)?;
                    let params_a = arg(1)?.as_array().ok_or_else(|| AxleAstError {
                        message: "fn type params must be an array".to_string(),
                        ptr: format!("{ptr}/1"),
                    })?;
                    let params = params_a
                        .iter()
                        .enumerate()
                        .map(|(i, t)| parse_type(t, &format!("{ptr}/1/{i}"), None))
                        .collect::<Result<Vec<_>, _>>()?;
                    let ret = parse_type(arg(2)?, &format!("{ptr}/2"), None)?;
                    TypeExprKind::Function {
                        params,
                        ret: Box::new(ret),
                    }
                }
                other => return err(ptr, format!("unknown type head: {other:?}")),
            }
        }
        other => return err(ptr, format!("unsupported JSON value in type: {other}")),
    };
    Ok(TypeExpr {
        ptr: ptr.to_string(),
        kind,
    })
}

fn parse_block(v: &Value, ptr: &str) -> Result<Vec<Stmt>, AxleAstError> {
    let items = v.as_array().ok_or_else(|| AxleAstError {
        message: "block must be an array of statements".to_string(),
        ptr: ptr.to_string(),
    })?;
    items
        .iter()
        .enumerate()
        .map(|(i, s)| parse_stmt(s, &format!("{ptr}/{i}")))
        .collect()
}

fn parse_stmt(v: &Value, ptr: &str) -> Result<Stmt, AxleAstError> {
    let head = v
        .as_array()
        .and_then(|items| items.first())
        .and_then(Value::as_str);
    let items = v.as_array().map(Vec::as_slice).unwrap_or(&[]);
    let kind = match head {
        Some(h @ ("let" | "static")) => {
            if items.len() != 4 {
                return err(ptr, format!("{h} expects [\"{h}\", name, type, init]"));
            }
            let name = items[1].as_str().ok_or_else(|| AxleAstError {
                message: format!("{h} name must be a string"),
                ptr: format!("{ptr}/1"),
            })?;
            validate::validate_local_name(name).map_err(|message| AxleAstError {
                message,
                ptr: format!("{ptr}/1"),
            })?;
            let init = parse_expr(&items[3], &format!("{ptr}/3"))?;
            let ty = match &items[2] {
                Value::String(s) if s == "_" => None,
                t => Some(parse_type(t, &format!("{ptr}/2"), init.literal_len())?),
            };
            if h == "static" {
                let ty = ty.ok_or_else(|| AxleAstError {
                    message: "static statements need a type".to_string(),
                    ptr: format!("{ptr}/2"),
                })?;
                StmtKind::Static {
                    name: name.to_string(),
                    ty,
                    init,
                }
            } else {
                StmtKind::Let {
                    name: name.to_string(),
                    ty,
                    init,
                }
            }
        }
        Some("set") => {
            if items.len() != 3 {
                return err(ptr, "set expects [\"set\", place, value]");
            }
            StmtKind::Set {
                place: parse_expr(&items[1], &format!("{ptr}/1"))?,
                value: parse_expr(&items[2], &format!("{ptr}/2"))?,
            }
        }
        Some("return") => {
            if items.len() != 2 {
                return err(ptr, "return expects [\"return\", value]");
            }
            StmtKind::Return(parse_expr(&items[1], &format!("{ptr}/1"))?)
        }
        _ => StmtKind::Expr(parse_expr(v, ptr)?),
    };
    Ok(Stmt {
        ptr: ptr.to_string(),
        kind,
    })
}

pub fn parse_expr(v: &Value, ptr: &str) -> Result<Expr, AxleAstError> {
    let kind = match v {
        Value::Number(n) => match n.as_i64() {
            Some(i) => ExprKind::Int(i),
            None if n.is_f64() => ExprKind::Float(n.to_string()),
            None => return err(ptr, format!("integer literal out of range: {n}")),
        },
        Value::Bool(b) => ExprKind::Bool(*b),
        Value::String(s) => {
            if s == "uninit" {
                ExprKind::Uninit
            } else {
                validate::validate_local_name(s).map_err(|message| AxleAstError {
                    message,
                    ptr: ptr.to_string(),
                })?;
                ExprKind::Ident(s.to_string())
            }
        }
        Value::Array(items) => parse_list_expr(items, ptr)?,
        other => return err(ptr, format!("unsupported JSON value in expr: {other}")),
    };
    Ok(Expr {
        ptr: ptr.to_string(),
        kind,
    })
}

fn parse_list_expr(items: &[Value], ptr: &str) -> Result<ExprKind, AxleAstError> {
    let head = items.first().and_then(Value::as_str).ok_or_else(|| AxleAstError {
        message: "expression list must start with a head string".to_string(),
        ptr: ptr.to_string(),
    })?;
    let exact = |n: usize| -> Result<(), AxleAstError> {
        if items.len() != n + 1 {
            return err(
                ptr,
                format!("{head} expects {n} operand(s) got {}", items.len() - 1),
            );
        }
        Ok(())
    };
    let sub = |i: usize| parse_expr(&items[i], &format!("{ptr}/{i}"));
    let string_operand = |what: &str| -> Result<&str, AxleAstError> {
        items[1].as_str().ok_or_else(|| AxleAstError {
            message: format!("{what} operand must be a string"),
            ptr: format!("{ptr}/1"),
        })
    };

    if let Some(op) = BinOp::parse(head) {
        exact(2)?;
        return Ok(ExprKind::Binary(op, Box::new(sub(1)?), Box::new(sub(2)?)));
    }

    let kind = match head {
        "char" => {
            exact(1)?;
            let s = string_operand("char")?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => ExprKind::Char(c),
                _ => return err(&format!("{ptr}/1"), "char literal must be one character"),
            }
        }
        "float" => {
            exact(1)?;
            let s = string_operand("float")?;
            if s.parse::<f64>().is_err() {
                return err(&format!("{ptr}/1"), format!("invalid float literal: {s:?}"));
            }
            ExprKind::Float(s.to_string())
        }
        "str" => {
            exact(1)?;
            ExprKind::Str(string_operand("str")?.to_string())
        }
        "deref" => {
            exact(1)?;
            ExprKind::Deref(Box::new(sub(1)?))
        }
        "addr" => {
            exact(1)?;
            ExprKind::Addr(Box::new(sub(1)?))
        }
        "index" => {
            exact(2)?;
            ExprKind::Index(Box::new(sub(1)?), Box::new(sub(2)?))
        }
        "field" => {
            exact(2)?;
            let n = items[2].as_u64().ok_or_else(|| AxleAstError {
                message: "field index must be a non-negative integer".to_string(),
                ptr: format!("{ptr}/2"),
            })?;
            ExprKind::Field(Box::new(sub(1)?), n as usize)
        }
        "slice" => {
            exact(3)?;
            ExprKind::Slice {
                base: Box::new(sub(1)?),
                lo: Box::new(sub(2)?),
                hi: Box::new(sub(3)?),
            }
        }
        "call" => {
            if items.len() < 2 {
                return err(ptr, "call expects [\"call\", callee, args...]");
            }
            let callee = string_operand("call")?;
            if validate::validate_symbol(callee).is_err()
                && validate::validate_type_name(callee).is_err()
            {
                return err(&format!("{ptr}/1"), format!("invalid callee name: {callee:?}"));
            }
            let args = (2..items.len()).map(sub).collect::<Result<Vec<_>, _>>()?;
            ExprKind::Call {
                callee: callee.to_string(),
                args,
            }
        }
        "const" | "mut" | "compiletime" | "runtime" => {
            exact(1)?;
            let c = match head {
                "const" => Coercion::Const,
                "mut" => Coercion::Mut,
                "compiletime" => Coercion::Compiletime,
                _ => Coercion::Runtime,
            };
            ExprKind::Coerce(c, Box::new(sub(1)?))
        }
        "array" => ExprKind::Array((1..items.len()).map(sub).collect::<Result<Vec<_>, _>>()?),
        "tuple" => ExprKind::Tuple((1..items.len()).map(sub).collect::<Result<Vec<_>, _>>()?),
        "cast" => {
            exact(2)?;
            let ty = parse_type(&items[2], &format!("{ptr}/2"), None)?;
            ExprKind::Cast(Box::new(sub(1)?), ty)
        }
        "type" => {
            exact(1)?;
            ExprKind::TypeOf(parse_type(&items[1], &format!("{ptr}/1"), None)?)
        }
        other => return err(ptr, format!("unknown expression head: {other:?}")),
    };
    Ok(kind)
}

fn get_required<'a>(
    obj: &'a serde_json::Map<String, Value>,
    ptr: &str,
    key: &str,
) -> Result<&'a Value, AxleAstError> {
    obj.get(key).ok_or_else(|| AxleAstError {
        message: format!("missing required field: {key}"),
        ptr: ptr.to_string(),
    })
}

fn get_required_string(
    obj: &serde_json::Map<String, Value>,
    ptr: &str,
    key: &str,
) -> Result<String, AxleAstError> {
    let v = obj.get(key).ok_or_else(|| AxleAstError {
        message: format!("missing required field: {key}"),
        ptr: ptr
            .rsplit_once('/')
            .map(|(p, _)| p)
            .unwrap_or("")
            .to_string(),
    })?;
    v.as_str().map(str::to_string).ok_or_else(|| AxleAstError {
        message: format!("{key} must be a string"),
        ptr: ptr.to_string(),
    })
}
