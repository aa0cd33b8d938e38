//! Type slot resolution
//!
//! Unannotated parameter and return positions fall back to `untyped`, the
//! gradual-typing marker that is compatible with everything.

use crate::types::UNTYPED;
use serde::{Deserialize, Serialize};
use tr_parser::{Program, SlotError, TypeExpr, TypeSlot};

/// Every parameter and return slot without an annotation that has not
/// been resolved yet, including methods nested in classes and modules
pub fn collect_unresolved_slots(program: &Program) -> Vec<&TypeSlot> {
    all_slots(program)
        .filter(|slot| !slot.is_explicit() && !slot.is_resolved())
        .collect()
}

fn all_slots(program: &Program) -> impl Iterator<Item = &TypeSlot> {
    program.methods().into_iter().flat_map(|method| {
        let def = method.method;
        def.params
            .iter()
            .map(|param| &param.slot)
            .chain(std::iter::once(&def.return_slot))
    })
}

pub fn resolve_to_untyped(slot: &TypeSlot) -> Result<(), SlotError> {
    slot.resolve(TypeExpr::simple(UNTYPED))
}

/// Resolve every pending slot; returns how many were resolved
pub fn resolve_all_untyped(program: &Program) -> usize {
    collect_unresolved_slots(program)
        .into_iter()
        .filter(|slot| resolve_to_untyped(slot).is_ok())
        .count()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub total: usize,
    pub explicit: usize,
    pub needs_inference: usize,
}

pub fn slot_summary(program: &Program) -> SlotSummary {
    all_slots(program).fold(SlotSummary::default(), |mut summary, slot| {
        summary.total += 1;
        if slot.is_explicit() {
            summary.explicit += 1;
        } else if !slot.is_resolved() {
            summary.needs_inference += 1;
        }
        summary
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tr_parser::parse_to_ir;

    const SOURCE: &str = "\
def greet(name: String, times)
  name * times
end

class Counter
  def increment(by)
    by
  end
end
";

    #[test]
    fn test_collect_unresolved_slots() {
        let (program, errors) = parse_to_ir(SOURCE);
        assert!(errors.is_empty());
        // times, greet's return, by, increment's return
        assert_eq!(collect_unresolved_slots(&program).len(), 4);
    }

    #[test]
    fn test_resolve_all_untyped() {
        let (program, _) = parse_to_ir(SOURCE);
        assert_eq!(resolve_all_untyped(&program), 4);
        assert!(collect_unresolved_slots(&program).is_empty());
        assert_eq!(resolve_all_untyped(&program), 0);

        let method = program.methods()[0].method;
        assert_eq!(method.params[1].slot.effective_type(), Some(&TypeExpr::simple("untyped")));
    }

    #[test]
    fn test_resolve_twice_fails() {
        let (program, _) = parse_to_ir(SOURCE);
        let slot = &program.methods()[0].method.params[1].slot;
        resolve_to_untyped(slot).unwrap();
        assert!(matches!(resolve_to_untyped(slot), Err(SlotError::AlreadyResolved(_))));

        let annotated = &program.methods()[0].method.params[0].slot;
        assert!(matches!(resolve_to_untyped(annotated), Err(SlotError::ExplicitlyAnnotated(_))));
    }

    #[test]
    fn test_slot_summary() {
        let (program, _) = parse_to_ir(SOURCE);
        let summary = slot_summary(&program);
        assert_eq!(
            summary,
            SlotSummary {
                total: 5,
                explicit: 1,
                needs_inference: 4,
            }
        );
    }
}
