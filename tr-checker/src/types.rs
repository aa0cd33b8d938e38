//! Type names and helpers shared by inference and compatibility
//!
//! Inferred and declared types are compared in their canonical string form
//! (the `Display` rendering of `TypeExpr`). The helpers here split those
//! strings at top-level `|` and `,` using the character combinators, so
//! nested generics and function types are never cut in the middle.

use tr_parser::combinator::{char_parser, choice, end_of_input, lazy, many, many1, satisfy, sep_by1, Parser};

/// Gradual-typing marker: compatible with everything
pub const UNTYPED: &str = "untyped";
/// Declared return type whose value is never checked
pub const VOID: &str = "void";
/// The absence of a value
pub const NIL: &str = "nil";
pub const BOOLEAN: &str = "Boolean";
/// Every type is a subtype of this
pub const OBJECT: &str = "Object";
pub const INTEGER: &str = "Integer";
pub const FLOAT: &str = "Float";
pub const NUMERIC: &str = "Numeric";
pub const STRING: &str = "String";
pub const SYMBOL: &str = "Symbol";
pub const ARRAY: &str = "Array";
pub const HASH: &str = "Hash";

/// Names that are always known without a declaration
pub const BUILTIN_TYPES: &[&str] = &[
    "untyped",
    "void",
    "nil",
    "self",
    "bool",
    "Boolean",
    "TrueClass",
    "FalseClass",
    "NilClass",
    "Object",
    "BasicObject",
    "Integer",
    "Float",
    "Numeric",
    "Rational",
    "Complex",
    "BigDecimal",
    "String",
    "Symbol",
    "Array",
    "Hash",
    "Set",
    "Range",
    "Proc",
    "Method",
    "Regexp",
    "Time",
    "Date",
    "IO",
    "File",
    "Struct",
    "Class",
    "Module",
    "Comparable",
    "Enumerable",
    "Enumerator",
    "Kernel",
    "Exception",
    "StandardError",
];

/// Fixed widening table: (narrow, wide)
pub const NUMERIC_WIDENING: &[(&str, &str)] = &[(INTEGER, NUMERIC), (FLOAT, NUMERIC)];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_TYPES.contains(&name)
}

/// Map every boolean spelling to `Boolean`; a missing type is `nil`
pub fn normalize_type(ty: Option<&str>) -> String {
    match ty.map(str::trim) {
        None => NIL.to_string(),
        Some("true" | "false" | "TrueClass" | "FalseClass" | "bool" | "Boolean") => BOOLEAN.to_string(),
        Some(other) => other.to_string(),
    }
}

pub fn is_nullable(ty: &str) -> bool {
    ty.ends_with('?')
}

/// `String?` → `String`, `(A|B)?` → `A|B`
pub fn strip_nullable(ty: &str) -> Option<&str> {
    let inner = ty.strip_suffix('?')?;
    Some(strip_group(inner))
}

/// Remove one pair of parentheses wrapping the whole type, if any
fn strip_group(ty: &str) -> &str {
    match ty.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) {
        Some(inner) if is_single_group(ty) && split_top_level(inner, ',').len() == 1 => inner,
        _ => ty,
    }
}

fn is_open(c: char) -> bool {
    matches!(c, '<' | '(' | '{' | '[')
}

fn is_close(c: char) -> bool {
    matches!(c, '>' | ')' | '}' | ']')
}

/// True when `ty` is exactly one balanced bracketed group
fn is_single_group(ty: &str) -> bool {
    let chars: Vec<char> = ty.chars().collect();
    group().then_skip(end_of_input()).parse(&chars, 0).is_ok()
}

/// A bracketed group with anything (including separators) inside
fn group<'a>() -> Parser<'a, [char], String> {
    let plain = satisfy::<[char], _>("character", |c: &char| !is_open(*c) && !is_close(*c)).map(String::from);
    let nested = choice(vec![arrow(), lazy(group), plain]);

    choice(vec![
        bracketed('<', '>', nested.clone()),
        bracketed('(', ')', nested.clone()),
        bracketed('{', '}', nested.clone()),
        bracketed('[', ']', nested),
    ])
}

/// `->` belongs to function types, not to a `>` closing bracket
fn arrow<'a>() -> Parser<'a, [char], String> {
    char_parser('-').then(char_parser('>')).map(|_| "->".to_string())
}

fn bracketed<'a>(open: char, close: char, item: Parser<'a, [char], String>) -> Parser<'a, [char], String> {
    char_parser(open)
        .skip_then(many(item))
        .then_skip(char_parser(close))
        .map(move |parts| format!("{open}{}{close}", parts.concat()))
}

/// Split `ty` at `separator` characters that are not nested in brackets.
/// Unbalanced input is returned whole.
pub fn split_top_level(ty: &str, separator: char) -> Vec<String> {
    let chars: Vec<char> = ty.chars().collect();
    let plain = satisfy::<[char], _>("character", move |c: &char| {
        *c != separator && !is_open(*c) && !is_close(*c)
    })
    .map(String::from);
    let member = many1(choice(vec![arrow(), group(), plain])).map(|parts| parts.concat().trim().to_string());

    match sep_by1(member, char_parser(separator))
        .then_skip(end_of_input())
        .parse(&chars, 0)
    {
        Ok(result) => result.value,
        Err(_) => vec![ty.trim().to_string()],
    }
}

/// Members of a union type string; a non-union yields itself
pub fn split_union(ty: &str) -> Vec<String> {
    split_top_level(ty, '|')
}

/// `Hash<Symbol, String>` → (`Hash`, [`Symbol`, `String`])
pub fn split_generic(ty: &str) -> Option<(String, Vec<String>)> {
    let open = ty.find('<')?;
    let base = &ty[..open];
    if base.is_empty() || base.contains(['(', '{', '|']) || !is_single_group(&ty[open..]) {
        return None;
    }
    let inner = ty[open + 1..].strip_suffix('>')?;
    Some((base.to_string(), split_top_level(inner, ',')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_type() {
        for spelling in ["true", "false", "TrueClass", "FalseClass", "bool", "Boolean"] {
            assert_eq!(normalize_type(Some(spelling)), "Boolean");
        }
        assert_eq!(normalize_type(None), "nil");
        assert_eq!(normalize_type(Some("Integer")), "Integer");
    }

    #[test]
    fn test_split_union_respects_nesting() {
        assert_eq!(split_union("String|Integer"), vec!["String", "Integer"]);
        assert_eq!(split_union("Hash<String, A|B>|nil"), vec!["Hash<String, A|B>", "nil"]);
        assert_eq!(split_union("(Integer) -> String|nil"), vec!["(Integer) -> String", "nil"]);
        assert_eq!(split_union("Integer"), vec!["Integer"]);
        assert_eq!(split_union("Array<"), vec!["Array<"]);
    }

    #[test]
    fn test_split_generic() {
        let (base, args) = split_generic("Hash<Symbol, Array<String>>").unwrap();
        assert_eq!(base, "Hash");
        assert_eq!(args, vec!["Symbol", "Array<String>"]);
        assert!(split_generic("Integer").is_none());
        assert!(split_generic("Hash<A, B>|Array<C>").is_none());
    }

    #[test]
    fn test_strip_nullable() {
        assert_eq!(strip_nullable("String?"), Some("String"));
        assert_eq!(strip_nullable("(String|Integer)?"), Some("String|Integer"));
        assert_eq!(strip_nullable("((Integer) -> String)?"), Some("(Integer) -> String"));
        assert_eq!(strip_nullable("(A)|(B)?"), Some("(A)|(B)"));
        assert_eq!(strip_nullable("String"), None);
    }
}
