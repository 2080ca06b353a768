//! The type table: canonicalizes concrete types by structural equality and
//! computes struct/union layout. Aliases and polymorph placeholders live in
//! side-tables and are never assigned a table index (§3.4).

use std::collections::HashMap;

use strata_base::Atom;

use crate::info::{StructMember, TypeInfo};

/// Index of a concrete type in the type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Index of an alias in the alias side-table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AliasId(pub u32);

/// Index of a polymorph placeholder in the placeholder side-table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaceholderId(pub u32);

/// Anywhere a type is referenced (a parameter, a variable, a struct member)
/// may name a concrete type, an alias, or an unbound polymorph placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Concrete(TypeId),
    Alias(AliasId),
    Placeholder(PlaceholderId),
}

impl From<TypeId> for TypeRef {
    fn from(id: TypeId) -> Self {
        TypeRef::Concrete(id)
    }
}

struct AliasEntry {
    #[allow(dead_code)]
    name: Atom,
    of: TypeRef,
}

/// Pointer width of the compilation target. Only pointer size is needed by
/// the frontend's layout pass; full target descriptors live in the backend.
#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub pointer_size: u64,
    pub pointer_align: u64,
}

impl Default for Target {
    fn default() -> Self {
        Target { pointer_size: 8, pointer_align: 8 }
    }
}

#[derive(Default)]
pub struct TypeTable {
    target: Target,
    concrete: Vec<TypeInfo>,
    interned: HashMap<TypeInfo, TypeId>,
    aliases: Vec<AliasEntry>,
    placeholders: Vec<Atom>,
    placeholder_by_name: HashMap<Atom, PlaceholderId>,
}

fn align_up(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    (value + align - 1) / align * align
}

impl TypeTable {
    pub fn new(target: Target) -> Self {
        TypeTable { target, ..Default::default() }
    }

    /// Interns a structurally-compared type (everything except struct/enum,
    /// which are nominal and inserted via [`TypeTable::declare_struct`] /
    /// [`TypeTable::declare_enum`]), returning its existing or new index.
    pub fn intern(&mut self, info: TypeInfo) -> TypeId {
        debug_assert!(!matches!(info, TypeInfo::Struct { .. } | TypeInfo::Enum { .. }));
        if let Some(&id) = self.interned.get(&info) {
            return id;
        }
        let id = TypeId(self.concrete.len() as u32);
        self.interned.insert(info.clone(), id);
        self.concrete.push(info);
        id
    }

    /// Inserts a nominal struct/union type and computes its layout.
    ///
    /// `members` are laid out left-to-right in declaration order, including
    /// the flattened, ancestor-first members of `parent` when present.
    pub fn declare_struct(
        &mut self,
        decl: Atom,
        mut own_members: Vec<(Atom, TypeId)>,
        is_union: bool,
        parent: Option<TypeId>,
    ) -> TypeId {
        let mut members = Vec::new();
        let mut element_index = 0u32;
        let mut cursor = 0u64;
        let mut max_align = 1u64;

        if let Some(parent_id) = parent {
            if let TypeInfo::Struct { members: parent_members, .. } = self.get(parent_id) {
                for m in parent_members.clone() {
                    max_align = max_align.max(self.alignment_of(m.ty));
                    members.push(m);
                    element_index += 1;
                }
                cursor = members.last().map(|m| m.offset + self.size_of(m.ty)).unwrap_or(0);
            }
        }

        for (name, ty) in own_members.drain(..) {
            let align = self.alignment_of(ty);
            max_align = max_align.max(align);
            let offset = if is_union { 0 } else { align_up(cursor, align) };
            members.push(StructMember { name, ty, offset, element_index });
            element_index += 1;
            if !is_union {
                cursor = offset + self.size_of(ty);
            } else {
                cursor = cursor.max(self.size_of(ty));
            }
        }

        members.sort_by_key(|m| m.offset);

        let info = TypeInfo::Struct { decl, members, is_union, parent };
        let id = TypeId(self.concrete.len() as u32);
        self.concrete.push(info);
        let _ = max_align;
        id
    }

    pub fn declare_enum(&mut self, decl: Atom, base: TypeId) -> TypeId {
        let info = TypeInfo::Enum { decl, base };
        let id = TypeId(self.concrete.len() as u32);
        self.concrete.push(info);
        id
    }

    pub fn declare_alias(&mut self, name: Atom, of: TypeRef) -> AliasId {
        let id = AliasId(self.aliases.len() as u32);
        self.aliases.push(AliasEntry { name, of });
        id
    }

    pub fn placeholder(&mut self, name: Atom) -> PlaceholderId {
        if let Some(&id) = self.placeholder_by_name.get(&name) {
            return id;
        }
        let id = PlaceholderId(self.placeholders.len() as u32);
        self.placeholders.push(name);
        self.placeholder_by_name.insert(name, id);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeInfo {
        &self.concrete[id.0 as usize]
    }

    pub fn alias_target(&self, id: AliasId) -> TypeRef {
        self.aliases[id.0 as usize].of
    }

    /// Strips alias indirection and asserts no placeholder remains.
    ///
    /// # Panics
    ///
    /// Panics if `r` resolves to an unbound polymorph placeholder — callers
    /// must only invoke this after polymorphic instantiation has completed.
    pub fn get_underlying_final_type(&self, r: TypeRef) -> TypeId {
        match r {
            TypeRef::Concrete(id) => id,
            TypeRef::Alias(a) => self.get_underlying_final_type(self.alias_target(a)),
            TypeRef::Placeholder(_) => panic!("unbound polymorph placeholder reached codegen boundary"),
        }
    }

    pub fn size_of(&self, id: TypeId) -> u64 {
        match self.get(id) {
            TypeInfo::Void => 0,
            TypeInfo::Integer { bits, .. } => (*bits as u64).div_ceil(8),
            TypeInfo::Bool => 1,
            TypeInfo::Float { bits } => (*bits as u64) / 8,
            TypeInfo::String => self.target.pointer_size * 2, // (ptr, len)
            TypeInfo::Pointer { .. } => self.target.pointer_size,
            TypeInfo::Array { element, count, dynamic } => {
                if *dynamic || *count < 0 {
                    self.target.pointer_size * 2
                } else {
                    self.size_of(*element) * (*count as u64)
                }
            }
            TypeInfo::Struct { members, .. } => {
                let align = self.alignment_of(id);
                let end = members.iter().map(|m| m.offset + self.size_of(m.ty)).max().unwrap_or(0);
                align_up(end, align)
            }
            TypeInfo::Enum { base, .. } => self.size_of(*base),
            TypeInfo::Function { .. } => self.target.pointer_size,
            TypeInfo::Type => self.target.pointer_size,
        }
    }

    pub fn alignment_of(&self, id: TypeId) -> u64 {
        match self.get(id) {
            TypeInfo::Void => 1,
            TypeInfo::Integer { bits, .. } => ((*bits as u64).div_ceil(8)).next_power_of_two().max(1),
            TypeInfo::Bool => 1,
            TypeInfo::Float { bits } => (*bits as u64 / 8).max(1),
            TypeInfo::String => self.target.pointer_align,
            TypeInfo::Pointer { .. } => self.target.pointer_align,
            TypeInfo::Array { element, dynamic, count, .. } => {
                if *dynamic || *count < 0 {
                    self.target.pointer_align
                } else {
                    self.alignment_of(*element)
                }
            }
            TypeInfo::Struct { members, .. } => members.iter().map(|m| self.alignment_of(m.ty)).max().unwrap_or(1),
            TypeInfo::Enum { base, .. } => self.alignment_of(*base),
            TypeInfo::Function { .. } => self.target.pointer_align,
            TypeInfo::Type => self.target.pointer_align,
        }
    }

    pub fn stride_of(&self, id: TypeId) -> u64 {
        align_up(self.size_of(id), self.alignment_of(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int32(table: &mut TypeTable) -> TypeId {
        table.intern(TypeInfo::Integer { bits: 32, signed: true })
    }

    fn int64(table: &mut TypeTable) -> TypeId {
        table.intern(TypeInfo::Integer { bits: 64, signed: true })
    }

    #[test]
    fn interning_deduplicates_structural_types() {
        let mut table = TypeTable::new(Target::default());
        let a = int32(&mut table);
        let b = int32(&mut table);
        assert_eq!(a, b);
    }

    #[test]
    fn pointer_types_intern_separately_per_pointee() {
        let mut table = TypeTable::new(Target::default());
        let i32_ty = int32(&mut table);
        let i64_ty = int64(&mut table);
        let p1 = table.intern(TypeInfo::Pointer { of: i32_ty });
        let p2 = table.intern(TypeInfo::Pointer { of: i64_ty });
        assert_ne!(p1, p2);
    }

    #[test]
    fn struct_layout_matches_testable_property_example() {
        // struct S { a: int32; b: int64; } -> size 16, a.offset 0, b.offset 8
        let mut table = TypeTable::new(Target::default());
        let i32_ty = int32(&mut table);
        let i64_ty = int64(&mut table);
        let decl = Atom::default();
        let s = table.declare_struct(decl, vec![(Atom::default(), i32_ty), (Atom::default(), i64_ty)], false, None);
        assert_eq!(table.size_of(s), 16);
        if let TypeInfo::Struct { members, .. } = table.get(s) {
            assert_eq!(members[0].offset, 0);
            assert_eq!(members[1].offset, 8);
        } else {
            panic!("expected struct");
        }
    }

    #[test]
    fn union_members_all_share_offset_zero() {
        let mut table = TypeTable::new(Target::default());
        let i32_ty = int32(&mut table);
        let i64_ty = int64(&mut table);
        let u = table.declare_struct(Atom::default(), vec![(Atom::default(), i32_ty), (Atom::default(), i64_ty)], true, None);
        if let TypeInfo::Struct { members, .. } = table.get(u) {
            assert!(members.iter().all(|m| m.offset == 0));
        } else {
            panic!("expected union");
        }
        assert_eq!(table.size_of(u), 8);
    }

    #[test]
    fn struct_inheritance_flattens_ancestor_first() {
        let mut table = TypeTable::new(Target::default());
        let i32_ty = int32(&mut table);
        let parent = table.declare_struct(Atom::default(), vec![(Atom::default(), i32_ty)], false, None);
        let i64_ty = int64(&mut table);
        let child = table.declare_struct(Atom::default(), vec![(Atom::default(), i64_ty)], false, Some(parent));
        if let TypeInfo::Struct { members, .. } = table.get(child) {
            assert_eq!(members.len(), 2);
            assert_eq!(members[1].offset, 8); // after 4-byte parent member, aligned to 8
        } else {
            panic!("expected struct");
        }
    }

    #[test]
    fn round_trip_alignment_size_stride_relation() {
        let mut table = TypeTable::new(Target::default());
        let i32_ty = int32(&mut table);
        let align = table.alignment_of(i32_ty);
        let size = table.size_of(i32_ty);
        let stride = table.stride_of(i32_ty);
        assert!(align <= size || size <= stride);
        assert_eq!(stride % align, 0);
    }

    #[test]
    fn alias_resolves_through_get_underlying_final_type() {
        let mut table = TypeTable::new(Target::default());
        let i32_ty = int32(&mut table);
        let alias = table.declare_alias(Atom::default(), TypeRef::Concrete(i32_ty));
        let resolved = table.get_underlying_final_type(TypeRef::Alias(alias));
        assert_eq!(resolved, i32_ty);
    }

    #[test]
    #[should_panic]
    fn unbound_placeholder_panics_on_resolution() {
        let mut table = TypeTable::new(Target::default());
        let ph = table.placeholder(Atom::default());
        table.get_underlying_final_type(TypeRef::Placeholder(ph));
    }
}
