//! Intermediate representation
//!
//! Declarations, parameters and type expressions as closed enums. Method
//! bodies keep just enough structure for last-expression inference; anything
//! the body grammar does not model is kept verbatim as `Expr::Opaque`.

use crate::span::{HasSpan, Location, Span};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// A parsed compilation unit. Declaration order is source order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Declaration {
    Method(MethodDef),
    Class(ClassDecl),
    Module(ModuleDecl),
    TypeAlias(TypeAlias),
    Interface(Interface),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Method(method) => &method.name,
            Declaration::Class(class) => &class.name,
            Declaration::Module(module) => &module.name,
            Declaration::TypeAlias(alias) => &alias.name,
            Declaration::Interface(interface) => &interface.name,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            Declaration::Method(method) => method.location,
            Declaration::Class(class) => class.location,
            Declaration::Module(module) => module.location,
            Declaration::TypeAlias(alias) => alias.location,
            Declaration::Interface(interface) => interface.location,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Declaration::Method(_) => "method",
            Declaration::Class(_) => "class",
            Declaration::Module(_) => "module",
            Declaration::TypeAlias(_) => "type alias",
            Declaration::Interface(_) => "interface",
        }
    }
}

impl HasSpan for Declaration {
    fn span(&self) -> Span {
        match self {
            Declaration::Method(method) => method.span,
            Declaration::Class(class) => class.span,
            Declaration::Module(module) => module.span,
            Declaration::TypeAlias(alias) => alias.span,
            Declaration::Interface(interface) => interface.span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Protected,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
            Visibility::Protected => write!(f, "protected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_slot: TypeSlot,
    pub body: MethodBody,
    pub visibility: Visibility,
    /// `def self.name`
    pub singleton: bool,
    pub span: Span,
    pub location: Location,
}

impl MethodDef {
    pub fn return_type(&self) -> Option<&TypeExpr> {
        self.return_slot.explicit()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub superclass: Option<String>,
    pub body: Vec<Declaration>,
    pub instance_vars: Vec<InstanceVarDecl>,
    pub span: Span,
    pub location: Location,
}

impl ClassDecl {
    pub fn instance_var(&self, name: &str) -> Option<&InstanceVarDecl> {
        self.instance_vars.iter().find(|ivar| ivar.name == name)
    }
}

/// `@name: Type` inside a class body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceVarDecl {
    /// Name without the `@`
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDecl {
    pub name: String,
    pub body: Vec<Declaration>,
    pub span: Span,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAlias {
    pub name: String,
    pub definition: TypeExpr,
    pub span: Span,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    pub members: Vec<InterfaceMember>,
    pub span: Span,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceMember {
    pub name: String,
    pub type_signature: TypeExpr,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    Required,
    Optional,
    Rest,
    Keyword,
    KeyRest,
    Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub slot: TypeSlot,
    /// Raw source text of the default value; never parsed
    pub default_value: Option<String>,
    pub kind: ParameterKind,
    /// Interface annotating a whole `{ ... }: Iface` keyword group
    #[serde(with = "once_cell_serde")]
    pub interface_ref: OnceCell<TypeExpr>,
    /// The whole `{ ... }[: Iface]` group a keyword parameter came from
    pub group_span: Option<Span>,
    pub span: Span,
}

impl Parameter {
    pub fn type_annotation(&self) -> Option<&TypeExpr> {
        self.slot.explicit()
    }

    pub fn interface_ref(&self) -> Option<&TypeExpr> {
        self.interface_ref.get()
    }

    /// Attach the group interface. Only the first call has an effect.
    pub fn set_interface_ref(&self, interface: TypeExpr) -> bool {
        self.interface_ref.set(interface).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKind {
    Parameter,
    Return,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("type slot at {0} is already resolved")]
    AlreadyResolved(Location),

    #[error("type slot at {0} has an explicit annotation")]
    ExplicitlyAnnotated(Location),
}

/// A parameter or return position. Either carries an explicit annotation,
/// or is resolved exactly once later on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSlot {
    pub kind: SlotKind,
    explicit: Option<TypeExpr>,
    /// From the colon through the end of the annotation
    pub annotation_span: Option<Span>,
    pub location: Location,
    #[serde(with = "once_cell_serde")]
    resolved: OnceCell<TypeExpr>,
}

impl TypeSlot {
    pub fn annotated(kind: SlotKind, ty: TypeExpr, annotation_span: Span, location: Location) -> Self {
        TypeSlot {
            kind,
            explicit: Some(ty),
            annotation_span: Some(annotation_span),
            location,
            resolved: OnceCell::new(),
        }
    }

    pub fn unannotated(kind: SlotKind, location: Location) -> Self {
        TypeSlot {
            kind,
            explicit: None,
            annotation_span: None,
            location,
            resolved: OnceCell::new(),
        }
    }

    pub fn explicit(&self) -> Option<&TypeExpr> {
        self.explicit.as_ref()
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit.is_some()
    }

    pub fn resolved_type(&self) -> Option<&TypeExpr> {
        self.resolved.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// The annotation if there is one, else whatever the resolver decided
    pub fn effective_type(&self) -> Option<&TypeExpr> {
        self.explicit.as_ref().or_else(|| self.resolved.get())
    }

    /// Write-once resolution of an unannotated slot
    pub fn resolve(&self, ty: TypeExpr) -> Result<(), SlotError> {
        if self.explicit.is_some() {
            return Err(SlotError::ExplicitlyAnnotated(self.location));
        }
        self.resolved
            .set(ty)
            .map_err(|_| SlotError::AlreadyResolved(self.location))
    }
}

mod once_cell_serde {
    use once_cell::sync::OnceCell;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T: Serialize, S: Serializer>(cell: &OnceCell<T>, serializer: S) -> Result<S::Ok, S::Error> {
        cell.get().serialize(serializer)
    }

    pub fn deserialize<'de, T: Deserialize<'de>, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<OnceCell<T>, D::Error> {
        let value = Option::<T>::deserialize(deserializer)?;
        let cell = OnceCell::new();
        if let Some(value) = value {
            let _ = cell.set(value);
        }
        Ok(cell)
    }
}

/// Type expressions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeExpr {
    Simple { name: String },
    Generic { base: String, args: Vec<TypeExpr> },
    Union { types: Vec<TypeExpr> },
    Nullable { inner: Box<TypeExpr> },
    Function { params: Vec<TypeExpr>, return_type: Box<TypeExpr> },
    Tuple { elements: Vec<TypeExpr> },
    HashLiteral { fields: Vec<HashField> },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashField {
    pub name: String,
    pub ty: TypeExpr,
}

impl TypeExpr {
    pub fn simple(name: impl Into<String>) -> Self {
        TypeExpr::Simple { name: name.into() }
    }

    pub fn generic(base: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        TypeExpr::Generic {
            base: base.into(),
            args,
        }
    }

    pub fn nullable(inner: TypeExpr) -> Self {
        TypeExpr::Nullable { inner: Box::new(inner) }
    }

    /// Every simple name and generic base mentioned, in order of appearance
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'t>(&'t self, names: &mut Vec<&'t str>) {
        match self {
            TypeExpr::Simple { name } => names.push(name),
            TypeExpr::Generic { base, args } => {
                names.push(base);
                for arg in args {
                    arg.collect_names(names);
                }
            }
            TypeExpr::Union { types } => {
                for ty in types {
                    ty.collect_names(names);
                }
            }
            TypeExpr::Nullable { inner } => inner.collect_names(names),
            TypeExpr::Function { params, return_type } => {
                for param in params {
                    param.collect_names(names);
                }
                return_type.collect_names(names);
            }
            TypeExpr::Tuple { elements } => {
                for element in elements {
                    element.collect_names(names);
                }
            }
            TypeExpr::HashLiteral { fields } => {
                for field in fields {
                    field.ty.collect_names(names);
                }
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[TypeExpr], separator: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Simple { name } => f.write_str(name),
            TypeExpr::Generic { base, args } => {
                write!(f, "{base}<")?;
                write_list(f, args, ", ")?;
                f.write_str(">")
            }
            TypeExpr::Union { types } => write_list(f, types, "|"),
            TypeExpr::Nullable { inner } => match **inner {
                TypeExpr::Union { .. } | TypeExpr::Function { .. } => write!(f, "({inner})?"),
                _ => write!(f, "{inner}?"),
            },
            TypeExpr::Function { params, return_type } => {
                f.write_str("(")?;
                write_list(f, params, ", ")?;
                write!(f, ") -> {return_type}")
            }
            TypeExpr::Tuple { elements } => {
                f.write_str("(")?;
                write_list(f, elements, ", ")?;
                f.write_str(")")
            }
            TypeExpr::HashLiteral { fields } => {
                f.write_str("{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.ty)?;
                }
                f.write_str(" }")
            }
        }
    }
}

/// Statements of a method body
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MethodBody {
    pub statements: Vec<Expr>,
    pub span: Span,
}

impl MethodBody {
    pub fn last_expression(&self) -> Option<&Expr> {
        self.statements.last()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Integer(String),
    Float(String),
    String(String),
    Symbol(String),
    Boolean(bool),
    Nil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Cmp,
    And,
    Or,
    Match,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Pow
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Array(Vec<Expr>),
    Hash(Vec<(Expr, Expr)>),
    Variable(String),
    /// Name without the `@`
    InstanceVariable(String),
    SelfRef,
    Assignment {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        receiver: Option<Box<Expr>>,
        method: String,
        args: Vec<Expr>,
    },
    Return(Option<Box<Expr>>),
    /// Host-language code the body grammar does not model
    Opaque {
        text: String,
    },
}

/// A method together with the class/module path that encloses it
#[derive(Debug, Clone, Copy)]
pub struct MethodRef<'p> {
    pub owner: Option<&'p str>,
    pub class: Option<&'p ClassDecl>,
    pub method: &'p MethodDef,
}

impl MethodRef<'_> {
    /// `Class#method`, `Class.method` for singletons, or just `method`
    pub fn qualified_name(&self) -> String {
        match self.owner {
            Some(owner) if self.method.singleton => format!("{owner}.{}", self.method.name),
            Some(owner) => format!("{owner}#{}", self.method.name),
            None if self.method.singleton => format!("self.{}", self.method.name),
            None => self.method.name.clone(),
        }
    }
}

impl Program {
    pub fn new(declarations: Vec<Declaration>) -> Self {
        Program { declarations }
    }

    /// Every method, including those nested in classes and modules
    pub fn methods(&self) -> Vec<MethodRef<'_>> {
        let mut methods = Vec::new();
        collect_methods(&self.declarations, None, None, &mut methods);
        methods
    }

    /// Every declaration, depth first, in source order
    pub fn walk(&self) -> Vec<&Declaration> {
        fn visit<'p>(declarations: &'p [Declaration], out: &mut Vec<&'p Declaration>) {
            for declaration in declarations {
                out.push(declaration);
                match declaration {
                    Declaration::Class(class) => visit(&class.body, out),
                    Declaration::Module(module) => visit(&module.body, out),
                    _ => {}
                }
            }
        }

        let mut out = Vec::new();
        visit(&self.declarations, &mut out);
        out
    }

    /// Type-level names this program declares: aliases, interfaces, classes, modules
    pub fn declared_symbols(&self) -> BTreeSet<String> {
        self.walk()
            .into_iter()
            .filter(|declaration| !matches!(declaration, Declaration::Method(_)))
            .map(|declaration| declaration.name().to_string())
            .collect()
    }

    /// Every type name mentioned by an annotation anywhere in the program
    pub fn referenced_symbols(&self) -> BTreeSet<String> {
        self.annotations()
            .into_iter()
            .flat_map(|(ty, _)| ty.referenced_names())
            .map(str::to_string)
            .collect()
    }

    /// All written type annotations with their locations
    pub fn annotations(&self) -> Vec<(&TypeExpr, Location)> {
        let mut out = Vec::new();
        for declaration in self.walk() {
            match declaration {
                Declaration::Method(method) => {
                    let mut group = None;
                    for param in &method.params {
                        if let Some(ty) = param.type_annotation() {
                            out.push((ty, param.slot.location));
                        }
                        // one interface annotation per keyword group
                        if let Some(ty) = param.interface_ref() {
                            if param.group_span != group {
                                out.push((ty, param.slot.location));
                            }
                        }
                        group = param.group_span;
                    }
                    if let Some(ty) = method.return_type() {
                        out.push((ty, method.return_slot.location));
                    }
                }
                Declaration::Class(class) => {
                    for ivar in &class.instance_vars {
                        out.push((&ivar.ty, ivar.location));
                    }
                }
                Declaration::TypeAlias(alias) => out.push((&alias.definition, alias.location)),
                Declaration::Interface(interface) => {
                    for member in &interface.members {
                        out.push((&member.type_signature, member.location));
                    }
                }
                Declaration::Module(_) => {}
            }
        }
        out
    }
}

fn collect_methods<'p>(
    declarations: &'p [Declaration],
    owner: Option<&'p str>,
    class: Option<&'p ClassDecl>,
    out: &mut Vec<MethodRef<'p>>,
) {
    for declaration in declarations {
        match declaration {
            Declaration::Method(method) => out.push(MethodRef { owner, class, method }),
            Declaration::Class(inner) => collect_methods(&inner.body, Some(&inner.name), Some(inner), out),
            Declaration::Module(module) => collect_methods(&module.body, Some(&module.name), None, out),
            Declaration::TypeAlias(_) | Declaration::Interface(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str) -> MethodDef {
        MethodDef {
            name: name.to_string(),
            params: Vec::new(),
            return_slot: TypeSlot::unannotated(SlotKind::Return, Location::new(1, 1)),
            body: MethodBody::default(),
            visibility: Visibility::Public,
            singleton: false,
            span: Span::default(),
            location: Location::new(1, 1),
        }
    }

    #[test]
    fn test_type_display() {
        let ty = TypeExpr::Union {
            types: vec![TypeExpr::simple("String"), TypeExpr::simple("Integer")],
        };
        assert_eq!(ty.to_string(), "String|Integer");

        let ty = TypeExpr::generic("Hash", vec![TypeExpr::simple("Symbol"), TypeExpr::nullable(TypeExpr::simple("String"))]);
        assert_eq!(ty.to_string(), "Hash<Symbol, String?>");

        let ty = TypeExpr::Function {
            params: vec![TypeExpr::simple("Integer")],
            return_type: Box::new(TypeExpr::simple("Boolean")),
        };
        assert_eq!(ty.to_string(), "(Integer) -> Boolean");

        let ty = TypeExpr::HashLiteral {
            fields: vec![HashField {
                name: "name".into(),
                ty: TypeExpr::simple("String"),
            }],
        };
        assert_eq!(ty.to_string(), "{ name: String }");
    }

    #[test]
    fn test_referenced_names() {
        let ty = TypeExpr::generic(
            "Array",
            vec![TypeExpr::Union {
                types: vec![TypeExpr::simple("User"), TypeExpr::nullable(TypeExpr::simple("Admin"))],
            }],
        );
        assert_eq!(ty.referenced_names(), vec!["Array", "User", "Admin"]);
    }

    #[test]
    fn test_slot_resolves_once() {
        let slot = TypeSlot::unannotated(SlotKind::Parameter, Location::new(3, 9));
        assert!(!slot.is_resolved());
        slot.resolve(TypeExpr::simple("untyped")).unwrap();
        assert_eq!(slot.resolved_type(), Some(&TypeExpr::simple("untyped")));
        assert_eq!(
            slot.resolve(TypeExpr::simple("Integer")),
            Err(SlotError::AlreadyResolved(Location::new(3, 9)))
        );
        assert_eq!(slot.resolved_type(), Some(&TypeExpr::simple("untyped")));
    }

    #[test]
    fn test_explicit_slot_cannot_be_resolved() {
        let slot = TypeSlot::annotated(SlotKind::Return, TypeExpr::simple("Integer"), Span::new(0, 9), Location::new(1, 1));
        assert!(matches!(slot.resolve(TypeExpr::simple("untyped")), Err(SlotError::ExplicitlyAnnotated(_))));
        assert_eq!(slot.effective_type(), Some(&TypeExpr::simple("Integer")));
    }

    #[test]
    fn test_interface_ref_set_once() {
        let param = Parameter {
            name: "name".into(),
            slot: TypeSlot::unannotated(SlotKind::Parameter, Location::new(1, 1)),
            default_value: None,
            kind: ParameterKind::Keyword,
            interface_ref: OnceCell::new(),
            group_span: None,
            span: Span::default(),
        };
        assert!(param.set_interface_ref(TypeExpr::simple("Options")));
        assert!(!param.set_interface_ref(TypeExpr::simple("Other")));
        assert_eq!(param.interface_ref(), Some(&TypeExpr::simple("Options")));
    }

    #[test]
    fn test_methods_are_collected_with_owner() {
        let mut singleton = method("build");
        singleton.singleton = true;
        let program = Program::new(vec![
            Declaration::Method(method("top")),
            Declaration::Module(ModuleDecl {
                name: "Util".into(),
                body: vec![Declaration::Class(ClassDecl {
                    name: "Point".into(),
                    superclass: None,
                    body: vec![Declaration::Method(method("norm")), Declaration::Method(singleton)],
                    instance_vars: Vec::new(),
                    span: Span::default(),
                    location: Location::new(1, 1),
                })],
                span: Span::default(),
                location: Location::new(1, 1),
            }),
        ]);

        let names: Vec<_> = program.methods().iter().map(|m| m.qualified_name()).collect();
        assert_eq!(names, vec!["top", "Point#norm", "Point.build"]);
        assert_eq!(
            program.declared_symbols().into_iter().collect::<Vec<_>>(),
            vec!["Point".to_string(), "Util".to_string()]
        );
    }

    #[test]
    fn test_serde_keeps_resolution() {
        let slot = TypeSlot::unannotated(SlotKind::Return, Location::new(2, 1));
        slot.resolve(TypeExpr::simple("untyped")).unwrap();
        let json = serde_json::to_string(&slot).unwrap();
        let back: TypeSlot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.resolved_type(), Some(&TypeExpr::simple("untyped")));
    }
}
