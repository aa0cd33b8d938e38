//! Return type inference
//!
//! Only the value of a method's final statement is inferred. Earlier
//! statements contribute local variable types through assignments. What
//! cannot be inferred is `untyped`, which the compatibility check accepts.

use crate::types::{normalize_type, ARRAY, BOOLEAN, FLOAT, HASH, INTEGER, NIL, STRING, SYMBOL, UNTYPED};
use std::collections::HashMap;
use tr_parser::{BinaryOp, ClassDecl, Expr, Literal, MethodDef, ParameterKind, UnaryOp};

/// Methods whose result type does not depend on the receiver
const WELL_KNOWN_RESULTS: &[(&str, &str)] = &[
    ("to_s", STRING),
    ("inspect", STRING),
    ("to_str", STRING),
    ("to_i", INTEGER),
    ("to_int", INTEGER),
    ("to_f", FLOAT),
    ("to_sym", SYMBOL),
    ("length", INTEGER),
    ("size", INTEGER),
    ("count", INTEGER),
    ("hash", INTEGER),
    ("to_a", "Array<untyped>"),
    ("to_h", HASH),
    ("nil?", BOOLEAN),
];

/// Methods that return a String when called on a String
const STRING_METHODS: &[&str] = &[
    "upcase",
    "downcase",
    "capitalize",
    "swapcase",
    "strip",
    "lstrip",
    "rstrip",
    "chomp",
    "chop",
    "squeeze",
    "reverse",
    "succ",
];

/// What a method body can see while its return type is inferred
pub struct InferenceContext<'a> {
    class: Option<&'a ClassDecl>,
    /// Explicit return types of methods in the same file
    method_returns: &'a HashMap<String, String>,
    locals: HashMap<String, String>,
}

impl<'a> InferenceContext<'a> {
    pub fn new(method: &MethodDef, class: Option<&'a ClassDecl>, method_returns: &'a HashMap<String, String>) -> Self {
        let locals = method
            .params
            .iter()
            .map(|param| {
                let ty = match param.type_annotation() {
                    Some(ty) => {
                        let ty = normalize_type(Some(&ty.to_string()));
                        match param.kind {
                            ParameterKind::Rest => format!("{ARRAY}<{ty}>"),
                            ParameterKind::KeyRest => format!("{HASH}<{SYMBOL}, {ty}>"),
                            _ => ty,
                        }
                    }
                    None => UNTYPED.to_string(),
                };
                (param.name.clone(), ty)
            })
            .collect();

        InferenceContext {
            class,
            method_returns,
            locals,
        }
    }

    pub fn infer_expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Literal(literal) => literal_type(literal).to_string(),
            Expr::Array(elements) => self.array_type(elements),
            Expr::Hash(_) => HASH.to_string(),
            Expr::Variable(name) => self.variable_type(name),
            Expr::InstanceVariable(name) => self
                .class
                .and_then(|class| class.instance_var(name))
                .map(|ivar| normalize_type(Some(&ivar.ty.to_string())))
                .unwrap_or_else(|| UNTYPED.to_string()),
            Expr::SelfRef => self
                .class
                .map(|class| class.name.clone())
                .unwrap_or_else(|| UNTYPED.to_string()),
            Expr::Assignment { value, .. } => self.infer_expr(value),
            Expr::Unary { op: UnaryOp::Not, .. } => BOOLEAN.to_string(),
            Expr::Unary { op: UnaryOp::Neg, operand } => {
                let ty = self.infer_expr(operand);
                if ty == INTEGER || ty == FLOAT {
                    ty
                } else {
                    UNTYPED.to_string()
                }
            }
            Expr::Binary { op, left, right } => self.binary_type(*op, left, right),
            Expr::Call { receiver, method, .. } => self.call_type(receiver.as_deref(), method),
            Expr::Return(Some(value)) => self.infer_expr(value),
            Expr::Return(None) => NIL.to_string(),
            Expr::Opaque { .. } => UNTYPED.to_string(),
        }
    }

    fn variable_type(&self, name: &str) -> String {
        if let Some(ty) = self.locals.get(name) {
            return ty.clone();
        }
        // a bare name that is not a local may be a call to a sibling method
        self.method_returns
            .get(name)
            .cloned()
            .unwrap_or_else(|| UNTYPED.to_string())
    }

    fn array_type(&self, elements: &[Expr]) -> String {
        let types: Vec<String> = elements.iter().map(|element| self.infer_expr(element)).collect();
        let element = match types.split_first() {
            Some((first, rest)) if rest.iter().all(|ty| ty == first) => first.clone(),
            _ => UNTYPED.to_string(),
        };
        format!("{ARRAY}<{element}>")
    }

    fn binary_type(&self, op: BinaryOp, left: &Expr, right: &Expr) -> String {
        if op.is_comparison() {
            return BOOLEAN.to_string();
        }

        let left = self.infer_expr(left);
        let right = self.infer_expr(right);
        let result = match op {
            BinaryOp::Cmp => Some(INTEGER),
            BinaryOp::And | BinaryOp::Or if left == BOOLEAN && right == BOOLEAN => Some(BOOLEAN),
            _ if op.is_arithmetic() => arithmetic_type(op, &left, &right),
            _ => None,
        };

        match result {
            Some(ty) => ty.to_string(),
            // `Array<T> + Array<T>`
            None if op == BinaryOp::Add && left == right && left.starts_with("Array<") => left,
            None => UNTYPED.to_string(),
        }
    }

    fn call_type(&self, receiver: Option<&Expr>, method: &str) -> String {
        let Some(receiver) = receiver else {
            if let Some(ty) = self.method_returns.get(method) {
                return ty.clone();
            }
            return if method.ends_with('?') {
                BOOLEAN.to_string()
            } else {
                UNTYPED.to_string()
            };
        };

        if let Some((_, ty)) = WELL_KNOWN_RESULTS.iter().find(|(name, _)| *name == method) {
            return ty.to_string();
        }
        if method.ends_with('?') {
            return BOOLEAN.to_string();
        }
        if method == "new" {
            if let Expr::Variable(name) = receiver {
                if name.starts_with(|c: char| c.is_ascii_uppercase()) {
                    return name.clone();
                }
            }
        }
        if let Expr::SelfRef = receiver {
            if let Some(ty) = self.method_returns.get(method) {
                return ty.clone();
            }
        }

        let receiver_type = self.infer_expr(receiver);
        if receiver_type == STRING && STRING_METHODS.contains(&method) {
            return STRING.to_string();
        }
        UNTYPED.to_string()
    }
}

fn literal_type(literal: &Literal) -> &'static str {
    match literal {
        Literal::Integer(_) => INTEGER,
        Literal::Float(_) => FLOAT,
        Literal::String(_) => STRING,
        Literal::Symbol(_) => SYMBOL,
        Literal::Boolean(_) => BOOLEAN,
        Literal::Nil => NIL,
    }
}

fn arithmetic_type(op: BinaryOp, left: &str, right: &str) -> Option<&'static str> {
    match (left, right) {
        (INTEGER, INTEGER) => Some(INTEGER),
        (FLOAT, INTEGER | FLOAT) | (INTEGER, FLOAT) => Some(FLOAT),
        (STRING, STRING) if op == BinaryOp::Add => Some(STRING),
        (STRING, INTEGER) if op == BinaryOp::Mul => Some(STRING),
        // format operator
        (STRING, _) if op == BinaryOp::Mod => Some(STRING),
        _ => None,
    }
}

/// Infer the type of the value `method` returns.
///
/// `method_returns` maps the names of methods in the same file to their
/// explicit return types; calls to them take that type.
pub fn infer_return_type(
    method: &MethodDef,
    class: Option<&ClassDecl>,
    method_returns: &HashMap<String, String>,
) -> String {
    let mut context = InferenceContext::new(method, class, method_returns);
    let Some((last, earlier)) = method.body.statements.split_last() else {
        return NIL.to_string();
    };

    for statement in earlier {
        if let Expr::Assignment { target, value } = statement {
            if let Expr::Variable(name) = target.as_ref() {
                let ty = context.infer_expr(value);
                context.locals.insert(name.clone(), ty);
            }
        }
    }
    context.infer_expr(last)
}
