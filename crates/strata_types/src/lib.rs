//! # strata-types
//!
//! The type table: canonicalized [`TypeInfo`] descriptors assigned stable
//! indices, plus the struct/union layout pass. Aliases and polymorph
//! placeholders are tracked in side-tables and never take a table index,
//! matching the rule that only concrete types are indexable.

pub mod info;
pub mod table;

pub use info::{DeclRef, StructMember, TypeInfo};
pub use table::{AliasId, PlaceholderId, Target, TypeId, TypeRef, TypeTable};
