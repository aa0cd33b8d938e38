//! Type alias and interface registry
//!
//! One `TypeAliasRegistry` per compilation unit records the type-level
//! names a file declares. Alias definitions become edges in a directed
//! graph (alias → every non-builtin name it mentions) so that cycles are
//! found at registration time. The engine merges many registries into a
//! read-only `GlobalRegistry` before checking files against it.

use crate::error_reporting::TypeError;
use crate::types::is_builtin;
use petgraph::algo::{astar, has_path_connecting, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tr_parser::{Declaration, Location, Program, TypeExpr};
use tracing::{debug, warn};

/// Name resolution used by the checker
pub trait TypeLookup {
    /// Declared alias, interface, class or module
    fn is_known(&self, name: &str) -> bool;

    fn alias_definition(&self, name: &str) -> Option<&TypeExpr>;

    fn is_circular(&self, name: &str) -> bool;

    fn valid_type_name(&self, name: &str) -> bool {
        if is_builtin(name) || self.is_known(name) {
            return true;
        }
        // `Outer::Inner` resolves by its last segment
        match name.rsplit_once("::") {
            Some((_, last)) => is_builtin(last) || self.is_known(last),
            None => false,
        }
    }

    /// Names in `ty` that do not resolve, in order of appearance.
    /// Generic arguments are not looked up, only the base.
    fn unknown_names<'t>(&self, ty: &'t TypeExpr) -> Vec<&'t str> {
        let mut unknown = Vec::new();
        collect_unknown(self, ty, &mut unknown);
        unknown
    }

    fn valid_type(&self, ty: &TypeExpr) -> bool {
        self.unknown_names(ty).is_empty()
    }

    /// Replace alias names by their definitions. Circular aliases stay as
    /// written.
    fn expand_aliases(&self, ty: &TypeExpr) -> TypeExpr {
        expand(self, ty, &mut Vec::new())
    }

    /// True when `ty` mentions a circular alias, directly or through other aliases
    fn touches_circular(&self, ty: &TypeExpr) -> bool {
        touches(self, ty, &mut Vec::new())
    }
}

fn collect_unknown<'t, L: TypeLookup + ?Sized>(lookup: &L, ty: &'t TypeExpr, out: &mut Vec<&'t str>) {
    match ty {
        TypeExpr::Simple { name } | TypeExpr::Generic { base: name, .. } => {
            if !lookup.valid_type_name(name) && !out.contains(&name.as_str()) {
                out.push(name);
            }
        }
        TypeExpr::Union { types } | TypeExpr::Tuple { elements: types } => {
            for ty in types {
                collect_unknown(lookup, ty, out);
            }
        }
        TypeExpr::Nullable { inner } => collect_unknown(lookup, inner, out),
        TypeExpr::Function { params, return_type } => {
            for param in params {
                collect_unknown(lookup, param, out);
            }
            collect_unknown(lookup, return_type, out);
        }
        TypeExpr::HashLiteral { fields } => {
            for field in fields {
                collect_unknown(lookup, &field.ty, out);
            }
        }
    }
}

fn expand<L: TypeLookup + ?Sized>(lookup: &L, ty: &TypeExpr, visiting: &mut Vec<String>) -> TypeExpr {
    let expand_all = |types: &[TypeExpr], visiting: &mut Vec<String>| -> Vec<TypeExpr> {
        types.iter().map(|ty| expand(lookup, ty, visiting)).collect()
    };

    match ty {
        TypeExpr::Simple { name } => match lookup.alias_definition(name) {
            Some(definition) if !lookup.is_circular(name) && !visiting.contains(name) => {
                visiting.push(name.clone());
                let expanded = expand(lookup, definition, visiting);
                visiting.pop();
                expanded
            }
            _ => ty.clone(),
        },
        TypeExpr::Generic { base, args } => TypeExpr::Generic {
            base: base.clone(),
            args: expand_all(args, visiting),
        },
        TypeExpr::Union { types } => {
            // nested unions from expanded aliases are flattened
            let mut flat = Vec::new();
            for member in expand_all(types, visiting) {
                match member {
                    TypeExpr::Union { types } => flat.extend(types),
                    other => flat.push(other),
                }
            }
            TypeExpr::Union { types: flat }
        }
        TypeExpr::Nullable { inner } => TypeExpr::nullable(expand(lookup, inner, visiting)),
        TypeExpr::Function { params, return_type } => TypeExpr::Function {
            params: expand_all(params, visiting),
            return_type: Box::new(expand(lookup, return_type, visiting)),
        },
        TypeExpr::Tuple { elements } => TypeExpr::Tuple {
            elements: expand_all(elements, visiting),
        },
        TypeExpr::HashLiteral { fields } => TypeExpr::HashLiteral {
            fields: fields
                .iter()
                .map(|field| tr_parser::HashField {
                    name: field.name.clone(),
                    ty: expand(lookup, &field.ty, visiting),
                })
                .collect(),
        },
    }
}

fn touches<L: TypeLookup + ?Sized>(lookup: &L, ty: &TypeExpr, visiting: &mut Vec<String>) -> bool {
    ty.referenced_names().into_iter().any(|name| {
        if lookup.is_circular(name) {
            return true;
        }
        if visiting.iter().any(|seen| seen == name) {
            return false;
        }
        match lookup.alias_definition(name) {
            Some(definition) => {
                visiting.push(name.to_string());
                let found = touches(lookup, definition, visiting);
                visiting.pop();
                found
            }
            None => false,
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasEntry {
    pub definition: TypeExpr,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceEntry {
    pub members: Vec<String>,
    pub location: Location,
}

/// Alias → referenced-name graph
#[derive(Debug, Clone, Default)]
struct AliasGraph {
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl AliasGraph {
    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(index) = self.nodes.get(name) {
            return *index;
        }
        let index = self.graph.add_node(name.to_string());
        self.nodes.insert(name.to_string(), index);
        index
    }

    /// Add `alias → name` for every non-builtin name in `definition`
    fn add_alias(&mut self, alias: &str, definition: &TypeExpr) -> Vec<NodeIndex> {
        let from = self.node(alias);
        let mut targets = Vec::new();
        for name in definition.referenced_names() {
            if is_builtin(name) {
                continue;
            }
            let to = self.node(name);
            if !targets.contains(&to) {
                self.graph.add_edge(from, to, ());
                targets.push(to);
            }
        }
        targets
    }

    /// `alias -> ... -> alias`, if `alias` lies on a cycle
    fn cycle_through(&self, alias: &str, targets: &[NodeIndex]) -> Option<String> {
        let start = *self.nodes.get(alias)?;
        let closing = targets
            .iter()
            .copied()
            .find(|target| has_path_connecting(&self.graph, *target, start, None))?;
        let (_, path) = astar(&self.graph, closing, |node| node == start, |_| 1, |_| 0)?;
        let mut chain = vec![alias.to_string()];
        chain.extend(path.into_iter().map(|node| self.graph[node].clone()));
        Some(chain.join(" -> "))
    }

    /// Every name on some cycle, self loops included
    fn cyclic_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for component in tarjan_scc(&self.graph) {
            let self_loop = component.len() == 1 && self.graph.contains_edge(component[0], component[0]);
            if component.len() > 1 || self_loop {
                names.extend(component.into_iter().map(|node| self.graph[node].clone()));
            }
        }
        names
    }
}

/// Type-level declarations of one compilation unit
#[derive(Debug, Clone, Default)]
pub struct TypeAliasRegistry {
    aliases: BTreeMap<String, AliasEntry>,
    interfaces: BTreeMap<String, InterfaceEntry>,
    classes: BTreeMap<String, Location>,
    modules: BTreeMap<String, Location>,
    graph: AliasGraph,
    circular: BTreeSet<String>,
}

impl TypeAliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every type-level declaration of `program`, collecting
    /// duplicate and circular alias errors instead of stopping at the first
    pub fn from_program(program: &Program) -> (Self, Vec<TypeError>) {
        let mut registry = Self::new();
        let mut errors = Vec::new();
        for declaration in program.walk() {
            let result = match declaration {
                Declaration::TypeAlias(alias) => {
                    registry.register_alias(&alias.name, alias.definition.clone(), alias.location)
                }
                Declaration::Interface(interface) => registry.register_interface(
                    &interface.name,
                    interface.members.iter().map(|member| member.name.clone()).collect(),
                    interface.location,
                ),
                Declaration::Class(class) => {
                    registry.register_class(&class.name, class.location);
                    Ok(())
                }
                Declaration::Module(module) => {
                    registry.register_module(&module.name, module.location);
                    Ok(())
                }
                Declaration::Method(_) => Ok(()),
            };
            if let Err(error) = result {
                errors.push(error);
            }
        }
        (registry, errors)
    }

    /// Aliases and interfaces share one namespace
    fn original_line(&self, name: &str) -> Option<u32> {
        self.aliases
            .get(name)
            .map(|entry| entry.location.line)
            .or_else(|| self.interfaces.get(name).map(|entry| entry.location.line))
    }

    pub fn register_alias(&mut self, name: &str, definition: TypeExpr, location: Location) -> Result<(), TypeError> {
        if let Some(original_line) = self.original_line(name) {
            warn!("Duplicate type alias '{}' at {} (first on line {})", name, location, original_line);
            return Err(TypeError::duplicate("type alias", name, original_line, location));
        }

        let targets = self.graph.add_alias(name, &definition);
        self.aliases.insert(name.to_string(), AliasEntry { definition, location });

        if let Some(chain) = self.graph.cycle_through(name, &targets) {
            self.circular = self.graph.cyclic_names();
            warn!("Circular type alias at {}: {}", location, chain);
            return Err(TypeError::CircularTypeAlias {
                name: name.to_string(),
                chain,
                location,
            });
        }
        debug!("Registered type alias '{}'", name);
        Ok(())
    }

    pub fn register_interface(&mut self, name: &str, members: Vec<String>, location: Location) -> Result<(), TypeError> {
        if let Some(original_line) = self.original_line(name) {
            warn!("Duplicate interface '{}' at {} (first on line {})", name, location, original_line);
            return Err(TypeError::duplicate("interface", name, original_line, location));
        }
        self.interfaces
            .insert(name.to_string(), InterfaceEntry { members, location });
        Ok(())
    }

    /// Classes may be reopened; the first location is kept
    pub fn register_class(&mut self, name: &str, location: Location) {
        self.classes.entry(name.to_string()).or_insert(location);
    }

    pub fn register_module(&mut self, name: &str, location: Location) {
        self.modules.entry(name.to_string()).or_insert(location);
    }

    pub fn alias(&self, name: &str) -> Option<&AliasEntry> {
        self.aliases.get(name)
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceEntry> {
        self.interfaces.get(name)
    }

    pub fn circular_aliases(&self) -> &BTreeSet<String> {
        &self.circular
    }

    pub fn alias_names(&self) -> impl Iterator<Item = &str> {
        self.aliases.keys().map(String::as_str)
    }

    /// `name -> ... -> name` when `name` is a circular alias
    pub fn cycle_chain(&self, name: &str) -> Option<String> {
        if !self.circular.contains(name) {
            return None;
        }
        let start = *self.graph.nodes.get(name)?;
        let targets: Vec<NodeIndex> = self.graph.graph.neighbors(start).collect();
        self.graph.cycle_through(name, &targets)
    }

    /// Every name this unit declares
    pub fn declared_names(&self) -> BTreeSet<String> {
        self.aliases
            .keys()
            .chain(self.interfaces.keys())
            .chain(self.classes.keys())
            .chain(self.modules.keys())
            .cloned()
            .collect()
    }
}

impl TypeLookup for TypeAliasRegistry {
    fn is_known(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
            || self.interfaces.contains_key(name)
            || self.classes.contains_key(name)
            || self.modules.contains_key(name)
    }

    fn alias_definition(&self, name: &str) -> Option<&TypeExpr> {
        self.aliases.get(name).map(|entry| &entry.definition)
    }

    fn is_circular(&self, name: &str) -> bool {
        self.circular.contains(name)
    }
}

/// Read-only merge of many registries; the first file to declare a name wins
#[derive(Debug, Clone, Default)]
pub struct GlobalRegistry {
    merged: TypeAliasRegistry,
    declared_in: BTreeMap<String, PathBuf>,
}

impl GlobalRegistry {
    pub fn build<'r, P>(units: impl IntoIterator<Item = (P, &'r TypeAliasRegistry)>) -> Self
    where
        P: AsRef<Path>,
    {
        let mut merged = TypeAliasRegistry::new();
        let mut declared_in = BTreeMap::new();

        for (path, unit) in units {
            let path = path.as_ref();
            for (name, entry) in &unit.aliases {
                if merged.original_line(name).is_none() {
                    merged.graph.add_alias(name, &entry.definition);
                    merged.aliases.insert(name.clone(), entry.clone());
                }
            }
            for (name, entry) in &unit.interfaces {
                if merged.original_line(name).is_none() {
                    merged.interfaces.insert(name.clone(), entry.clone());
                }
            }
            for (name, location) in &unit.classes {
                merged.register_class(name, *location);
            }
            for (name, location) in &unit.modules {
                merged.register_module(name, *location);
            }
            for name in unit.declared_names() {
                declared_in.entry(name).or_insert_with(|| path.to_path_buf());
            }
        }

        merged.circular = merged.graph.cyclic_names();
        debug!(
            "Global registry: {} names, {} circular",
            declared_in.len(),
            merged.circular.len()
        );
        GlobalRegistry { merged, declared_in }
    }

    /// File that declared `name` first
    pub fn declaring_file(&self, name: &str) -> Option<&Path> {
        self.declared_in.get(name).map(PathBuf::as_path)
    }

    pub fn cycle_chain(&self, name: &str) -> Option<String> {
        self.merged.cycle_chain(name)
    }

    pub fn len(&self) -> usize {
        self.declared_in.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared_in.is_empty()
    }
}

impl TypeLookup for GlobalRegistry {
    fn is_known(&self, name: &str) -> bool {
        self.merged.is_known(name)
    }

    fn alias_definition(&self, name: &str) -> Option<&TypeExpr> {
        self.merged.alias_definition(name)
    }

    fn is_circular(&self, name: &str) -> bool {
        self.merged.is_circular(name)
    }
}
