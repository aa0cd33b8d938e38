//! Interface signature sidecar
//!
//! Built from the IR alone: the erased declarations paired with their
//! types. Unannotated positions are written as `untyped`.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use tr_checker::types::UNTYPED;
use tr_parser::{Declaration, MethodDef, Parameter, ParameterKind, Program, TypeSlot, Visibility};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSignature {
    pub name: String,
    pub kind: ParameterKind,
    pub ty: String,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignatureEntry {
    Alias {
        name: String,
        definition: String,
    },
    Interface {
        name: String,
        members: Vec<(String, String)>,
    },
    Class {
        name: String,
        superclass: Option<String>,
        instance_vars: Vec<(String, String)>,
        entries: Vec<SignatureEntry>,
    },
    Module {
        name: String,
        entries: Vec<SignatureEntry>,
    },
    Method {
        name: String,
        singleton: bool,
        visibility: Visibility,
        params: Vec<ParamSignature>,
        returns: String,
    },
}

/// The sidecar for one compilation unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signatures {
    pub entries: Vec<SignatureEntry>,
}

impl Signatures {
    pub fn from_program(program: &Program) -> Self {
        Signatures {
            entries: entries(&program.declarations),
        }
    }
}

fn entries(declarations: &[Declaration]) -> Vec<SignatureEntry> {
    declarations.iter().map(entry).collect()
}

fn entry(declaration: &Declaration) -> SignatureEntry {
    match declaration {
        Declaration::Method(method) => method_entry(method),
        Declaration::Class(class) => SignatureEntry::Class {
            name: class.name.clone(),
            superclass: class.superclass.clone(),
            instance_vars: class
                .instance_vars
                .iter()
                .map(|ivar| (ivar.name.clone(), ivar.ty.to_string()))
                .collect(),
            entries: entries(&class.body),
        },
        Declaration::Module(module) => SignatureEntry::Module {
            name: module.name.clone(),
            entries: entries(&module.body),
        },
        Declaration::TypeAlias(alias) => SignatureEntry::Alias {
            name: alias.name.clone(),
            definition: alias.definition.to_string(),
        },
        Declaration::Interface(interface) => SignatureEntry::Interface {
            name: interface.name.clone(),
            members: interface
                .members
                .iter()
                .map(|member| (member.name.clone(), member.type_signature.to_string()))
                .collect(),
        },
    }
}

fn slot_type(slot: &TypeSlot) -> String {
    slot.effective_type()
        .map(ToString::to_string)
        .unwrap_or_else(|| UNTYPED.to_string())
}

fn param_signature(param: &Parameter) -> ParamSignature {
    ParamSignature {
        name: param.name.clone(),
        kind: param.kind,
        ty: slot_type(&param.slot),
        optional: param.default_value.is_some(),
    }
}

fn method_entry(method: &MethodDef) -> SignatureEntry {
    SignatureEntry::Method {
        name: method.name.clone(),
        singleton: method.singleton,
        visibility: method.visibility,
        params: method.params.iter().map(param_signature).collect(),
        returns: slot_type(&method.return_slot),
    }
}

impl fmt::Display for ParamSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let optional = if self.optional { "?" } else { "" };
        match self.kind {
            ParameterKind::Required | ParameterKind::Optional => {
                write!(f, "{optional}{} {}", self.ty, self.name)
            }
            ParameterKind::Rest => write!(f, "*{} {}", self.ty, self.name),
            ParameterKind::Keyword => write!(f, "{optional}{}: {}", self.name, self.ty),
            ParameterKind::KeyRest => write!(f, "**{} {}", self.ty, self.name),
            ParameterKind::Block => write!(f, "&{} {}", self.ty, self.name),
        }
    }
}

fn render(out: &mut String, entries: &[SignatureEntry], depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    for entry in entries {
        match entry {
            SignatureEntry::Alias { name, definition } => {
                writeln!(out, "{indent}type {name} = {definition}")?;
            }
            SignatureEntry::Interface { name, members } => {
                writeln!(out, "{indent}interface {name}")?;
                for (member, ty) in members {
                    writeln!(out, "{indent}  {member}: {ty}")?;
                }
                writeln!(out, "{indent}end")?;
            }
            SignatureEntry::Class {
                name,
                superclass,
                instance_vars,
                entries,
            } => {
                match superclass {
                    Some(superclass) => writeln!(out, "{indent}class {name} < {superclass}")?,
                    None => writeln!(out, "{indent}class {name}")?,
                }
                for (ivar, ty) in instance_vars {
                    writeln!(out, "{indent}  @{ivar}: {ty}")?;
                }
                render(out, entries, depth + 1)?;
                writeln!(out, "{indent}end")?;
            }
            SignatureEntry::Module { name, entries } => {
                writeln!(out, "{indent}module {name}")?;
                render(out, entries, depth + 1)?;
                writeln!(out, "{indent}end")?;
            }
            SignatureEntry::Method {
                name,
                singleton,
                visibility,
                params,
                returns,
            } => {
                let visibility = match visibility {
                    Visibility::Public => String::new(),
                    other => format!("{other} "),
                };
                let receiver = if *singleton { "self." } else { "" };
                let params = params.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
                writeln!(out, "{indent}{visibility}def {receiver}{name}: ({params}) -> {returns}")?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for Signatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        render(&mut out, &self.entries, 0)?;
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tr_parser::parse_to_ir;

    #[test]
    fn test_render_signatures() {
        let source = "\
type Id = Integer

interface Named
  name: String
end

class User < Base
  @id: Id

  def initialize(id: Id, name = nil)
  end

  def self.find(id: Id): User?
    nil
  end

  private

  def secret({ token: String, ttl: Integer = 60 }, *rest, &block): void
  end
end
";
        let (program, errors) = parse_to_ir(source);
        assert!(errors.is_empty(), "{errors:?}");
        let expected = "\
type Id = Integer
interface Named
  name: String
end
class User < Base
  @id: Id
  def initialize: (Id id, ?untyped name) -> untyped
  def self.find: (Id id) -> User?
  private def secret: (token: String, ?ttl: Integer, *untyped rest, &untyped block) -> void
end
";
        assert_eq!(Signatures::from_program(&program).to_string(), expected);
    }

    #[test]
    fn test_signatures_serialize() {
        let (program, _) = parse_to_ir("module Util\n  def self.now: Integer\n    0\n  end\nend\n");
        let json = serde_json::to_value(Signatures::from_program(&program)).unwrap();
        assert_eq!(json["entries"][0]["kind"], "module");
        assert_eq!(json["entries"][0]["entries"][0]["returns"], "Integer");
    }
}
