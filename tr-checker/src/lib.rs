//! tr Language Type Checker
//!
//! Type alias registry, return type inference and the compatibility
//! relation used to check annotated methods. Every entry point returns its
//! findings as values; nothing is accumulated across calls.

pub mod checker;
pub mod compatibility;
pub mod error_reporting;
pub mod inference;
pub mod registry;
pub mod slots;
pub mod types;

// Re-export core types
pub use checker::{check, check_with_registry, method_duplicates, type_check, CheckResult, Strictness, TypeChecker};
pub use compatibility::{subtype_of, types_compatible};
pub use error_reporting::{Diagnostic, Severity, SlotError, TypeCheckError, TypeError};
pub use inference::infer_return_type;
pub use registry::{GlobalRegistry, TypeAliasRegistry, TypeLookup};
pub use slots::{collect_unresolved_slots, resolve_all_untyped, resolve_to_untyped, slot_summary, SlotSummary};
pub use types::normalize_type;
