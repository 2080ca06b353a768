//! The type descriptor kinds that populate the type table.

use strata_base::Atom;

use crate::table::TypeId;

/// One member of a struct or union.
///
/// Union members all carry `offset == 0`; `element_index` is the member's
/// position for codegen-time bitcast, independent of byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructMember {
    pub name: Atom,
    pub ty: TypeId,
    pub offset: u64,
    pub element_index: u32,
}

/// A declaration the struct/enum owner refers back to. Stored as an opaque
/// atom (the declared name) rather than a raw AST pointer, so this crate
/// does not need to depend on the AST crate.
pub type DeclRef = Atom;

/// A canonicalized type descriptor.
///
/// `Alias` and `PolymorphPlaceholder` are never stored in the indexed part
/// of the type table; see [`crate::table::TypeTable`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeInfo {
    Void,
    Integer { bits: u32, signed: bool },
    Bool,
    Float { bits: u32 },
    String,
    Pointer { of: TypeId },
    Array { element: TypeId, count: i64, dynamic: bool },
    Struct { decl: DeclRef, members: Vec<StructMember>, is_union: bool, parent: Option<TypeId> },
    Enum { decl: DeclRef, base: TypeId },
    Function { params: Vec<TypeId>, ret: TypeId, is_c_function: bool, is_c_varargs: bool },
    /// The type of a type at compile time (the value-level result of `typeof`).
    Type,
}

impl TypeInfo {
    pub fn is_struct(&self) -> bool {
        matches!(self, TypeInfo::Struct { .. })
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, TypeInfo::Struct { .. } | TypeInfo::Array { .. })
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, TypeInfo::Integer { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self, TypeInfo::Float { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeInfo::Pointer { .. })
    }
}
