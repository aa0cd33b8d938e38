//! Type compatibility
//!
//! `types_compatible(inferred, declared)` decides whether an inferred
//! return type satisfies a declared one. Both sides are canonical type
//! strings. The rules are tried in order and the first that applies wins.

use crate::types::{
    normalize_type, split_generic, split_union, strip_nullable, NIL, NUMERIC_WIDENING, OBJECT, UNTYPED, VOID,
};

pub fn types_compatible(inferred: &str, declared: &str) -> bool {
    let inferred = normalize_type(Some(inferred));
    let declared = normalize_type(Some(declared));

    if inferred == declared {
        return true;
    }
    if inferred == UNTYPED || declared == UNTYPED {
        return true;
    }
    if declared == VOID {
        return true;
    }
    if inferred == NIL && declared.ends_with('?') {
        return true;
    }
    if subtype_of(&inferred, &declared) {
        return true;
    }

    let declared_members = split_union(&declared);
    if declared_members.len() > 1
        && (declared_members.contains(&inferred)
            || declared_members.iter().any(|member| types_compatible(&inferred, member)))
    {
        return true;
    }

    // an inferred union is checked member by member against the whole
    // declared type, so `Integer|String` fits `String|Integer`
    let inferred_members = split_union(&inferred);
    if inferred_members.len() > 1 {
        return inferred_members
            .iter()
            .all(|member| types_compatible(member, &declared));
    }

    false
}

/// Structural subtyping over type strings
pub fn subtype_of(sub: &str, sup: &str) -> bool {
    if sup == OBJECT {
        return true;
    }
    if let Some(inner) = strip_nullable(sup) {
        if sub == inner || types_compatible(sub, inner) {
            return true;
        }
    }
    if NUMERIC_WIDENING
        .iter()
        .any(|(narrow, wide)| sub == *narrow && sup == *wide)
    {
        return true;
    }

    match (split_generic(sub), split_generic(sup)) {
        (Some((sub_base, sub_args)), Some((sup_base, sup_args))) => {
            sub_base == sup_base
                && sub_args.len() == sup_args.len()
                && sub_args
                    .iter()
                    .zip(&sup_args)
                    .all(|(sub_arg, sup_arg)| types_compatible(sub_arg, sup_arg))
        }
        // a raw base matches any parameterization of itself
        (Some((sub_base, _)), None) => sub_base == sup,
        (None, Some((sup_base, _))) => sup_base == sub,
        (None, None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TYPES: &[&str] = &[
        "Integer",
        "String?",
        "String|Integer",
        "Array<Hash<Symbol, String>>",
        "(Integer) -> String",
        "{ name: String }",
        "nil",
        "Boolean",
    ];

    #[test]
    fn test_reflexive_and_gradual() {
        for ty in SAMPLE_TYPES {
            assert!(types_compatible(ty, ty), "{ty}");
            assert!(types_compatible(ty, "void"), "{ty}");
            assert!(types_compatible("untyped", ty), "{ty}");
            assert!(types_compatible(ty, "untyped"), "{ty}");
        }
    }

    #[test]
    fn test_declared_union() {
        assert!(types_compatible("String", "String|Integer"));
        assert!(types_compatible("Integer", "String|Integer"));
        assert!(types_compatible("String|Integer", "String|Integer"));
        assert!(types_compatible("Integer|String", "String|Integer"));
        assert!(!types_compatible("Float", "String|Integer"));
    }

    #[test]
    fn test_inferred_union_must_fit_entirely() {
        assert!(types_compatible("Integer|Float", "Numeric"));
        assert!(!types_compatible("Integer|String", "Integer"));
        assert!(types_compatible("String|nil", "String?"));
    }

    #[test]
    fn test_nullable() {
        assert!(types_compatible("nil", "String?"));
        assert!(types_compatible("String", "String?"));
        assert!(types_compatible("Integer", "(Integer|String)?"));
        assert!(!types_compatible("nil", "String"));
        assert!(!types_compatible("String?", "String"));
    }

    #[test]
    fn test_widening_and_object() {
        assert!(types_compatible("Integer", "Numeric"));
        assert!(types_compatible("Float", "Numeric"));
        assert!(!types_compatible("Numeric", "Integer"));
        assert!(types_compatible("User", "Object"));
        assert!(!types_compatible("Integer", "Float"));
    }

    #[test]
    fn test_generics() {
        assert!(types_compatible("Array<Integer>", "Array<Numeric>"));
        assert!(types_compatible("Array<untyped>", "Array<String>"));
        assert!(!types_compatible("Array<String>", "Array<Integer>"));
        assert!(types_compatible("Array<String>", "Array"));
        assert!(types_compatible("Hash", "Hash<Symbol, String>"));
        assert!(!types_compatible("Hash", "Array<String>"));
    }

    #[test]
    fn test_boolean_spellings() {
        assert!(types_compatible("Boolean", "bool"));
        assert!(types_compatible("TrueClass", "Boolean"));
    }
}
