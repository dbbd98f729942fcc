//! Type sizes and field layouts
//!
//! Primitive types have fixed sizes. A composite value type is its instance
//! fields laid out back to back with no padding, so its size is the sum of
//! its fields' sizes and a field's offset is the sum of the sizes before it.
//! Pointers stored in RAM are always short (one byte).

use super::ir::PointerWidth;
use crate::bytecode::{AssemblySet, TypeRef};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// A field with its resolved position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    /// The name of the field
    pub name: String,
    /// The type of the field
    pub ty: TypeRef,
    /// The byte offset of this field from the start of the value
    pub offset: u16,
    /// Size of the field in bytes
    pub size: u16,
}

/// A type with every instance field resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeLayout {
    /// The type being described
    pub ty: TypeRef,
    /// Instance fields in declaration order
    pub fields: Vec<FieldLayout>,
    /// The total size of the type in bytes
    pub total_size: u16,
}

impl TypeLayout {
    /// Looks up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Memoizing layout resolver over one type universe
pub struct LayoutTable<'a> {
    assemblies: &'a AssemblySet,
    cache: HashMap<TypeRef, TypeLayout>,
}

impl<'a> LayoutTable<'a> {
    /// Creates an empty table
    pub fn new(assemblies: &'a AssemblySet) -> Self {
        Self {
            assemblies,
            cache: HashMap::new(),
        }
    }

    /// Size of a value of `ty` in bytes
    pub fn size_of(&mut self, ty: &TypeRef) -> Result<u16> {
        if ty.is_pointer() {
            return Ok(PointerWidth::Short.bytes() as u16);
        }
        Ok(self.layout_of(ty)?.total_size)
    }

    /// Full layout of a non-pointer type
    pub fn layout_of(&mut self, ty: &TypeRef) -> Result<&TypeLayout> {
        if !self.cache.contains_key(ty) {
            let mut visiting = Vec::new();
            let layout = self.compute(ty, &mut visiting)?;
            self.cache.insert(ty.clone(), layout);
        }
        self.cache.get(ty).ok_or_else(|| Error::MissingType {
            ty: ty.to_string(),
        })
    }

    fn compute(&mut self, ty: &TypeRef, visiting: &mut Vec<TypeRef>) -> Result<TypeLayout> {
        if let Some(layout) = self.cache.get(ty) {
            return Ok(layout.clone());
        }
        if visiting.contains(ty) {
            return Err(Error::RecursiveLayout { ty: ty.to_string() });
        }

        let assemblies = self.assemblies;
        let def = assemblies.find_type(ty)?;
        if let Some(size) = def.primitive_size {
            return Ok(TypeLayout {
                ty: ty.clone(),
                fields: Vec::new(),
                total_size: size,
            });
        }

        let instance_fields: Vec<(String, TypeRef)> = def
            .fields
            .iter()
            .filter(|f| !f.is_static)
            .map(|f| (f.name.clone(), f.ty.clone()))
            .collect();

        visiting.push(ty.clone());
        let mut fields = Vec::with_capacity(instance_fields.len());
        let mut offset = 0u16;
        for (name, field_ty) in instance_fields {
            let size = if field_ty.is_pointer() {
                PointerWidth::Short.bytes() as u16
            } else {
                let nested = self.compute(&field_ty, visiting)?;
                let size = nested.total_size;
                self.cache.insert(field_ty.clone(), nested);
                size
            };
            fields.push(FieldLayout {
                name,
                ty: field_ty,
                offset,
                size,
            });
            offset = offset
                .checked_add(size)
                .ok_or_else(|| Error::LayoutTooLarge { ty: ty.to_string() })?;
        }
        visiting.pop();

        Ok(TypeLayout {
            ty: ty.clone(),
            fields,
            total_size: offset,
        })
    }
}
