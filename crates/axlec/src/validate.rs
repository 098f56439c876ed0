use crate::lattice::Primitive;

/// Words the surface language reserves; no declaration or local may take them.
pub const RESERVED_WORDS: &[&str] = &[
    "anymut",
    "compiletime",
    "runtime",
    "static",
    "extern",
    "uninit",
    "literal",
    "type",
    "cast",
    "mut",
    "const",
    "let",
    "fn",
    "true",
    "false",
    "unit",
];

fn check_reserved(name: &str, what: &str) -> Result<(), String> {
    if RESERVED_WORDS.contains(&name) || Primitive::parse_named(name).is_some() {
        return Err(format!("{what} must not be a reserved word: {name:?}"));
    }
    Ok(())
}

pub fn validate_unit_name(unit: &str) -> Result<(), String> {
    let unit = unit.trim();
    if unit.is_empty() {
        return Err("unit name must not be empty".to_string());
    }
    for seg in unit.split('.') {
        if seg.is_empty() {
            return Err(format!("invalid unit name (empty segment): {unit:?}"));
        }
        let mut chars = seg.chars();
        let first = chars.next().unwrap_or('_');
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(format!(
                "invalid unit name segment start (must be [A-Za-z_]): {unit:?} segment={seg:?}"
            ));
        }
        for c in chars {
            if !(c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                return Err(format!(
                    "invalid unit name segment char (allowed [A-Za-z0-9_-]): {unit:?} segment={seg:?}"
                ));
            }
        }
    }
    Ok(())
}

/// Function, extern and global names.
pub fn validate_symbol(sym: &str) -> Result<(), String> {
    validate_local_name(sym)
}

pub fn validate_local_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("local name must be non-empty".to_string());
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('_');
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(format!(
            "invalid local name start (must be [A-Za-z_]): {name:?}"
        ));
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!(
                "invalid local name char (allowed [A-Za-z0-9_]): {name:?}"
            ));
        }
    }
    check_reserved(name, "local name")
}

/// Struct names start with an uppercase letter so they never shadow primitives.
pub fn validate_type_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("type name must be non-empty".to_string());
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('_');
    if !first.is_ascii_uppercase() {
        return Err(format!(
            "invalid type name start (must be [A-Z]): {name:?}"
        ));
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!(
                "invalid type name char (allowed [A-Za-z0-9_]): {name:?}"
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_words_are_rejected() {
        for w in ["anymut", "runtime", "u8", "usize", "literal"] {
            assert!(validate_local_name(w).is_err(), "{w} should be reserved");
        }
        validate_local_name("counter_2").expect("plain local");
    }

    #[test]
    fn type_names_need_uppercase_start() {
        validate_type_name("Pair").expect("struct name");
        assert!(validate_type_name("pair").is_err());
        assert!(validate_type_name("Pa-ir").is_err());
    }

    #[test]
    fn unit_names_allow_dotted_segments() {
        validate_unit_name("app.core-io").expect("dotted unit");
        assert!(validate_unit_name("app..core").is_err());
        assert!(validate_unit_name("").is_err());
    }
}
