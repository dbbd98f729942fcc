//! Label resolution
//!
//! Runs once over every compiled routine and turns each referenced label into
//! an assembler assignment. Addresses come from the [`MemoryAllocator`] in a
//! fixed order:
//!
//! 1. The two scratch registers used by the macro library
//! 2. Static fields, grouped by declaring type in declaration order and
//!    sorted by name within a type
//! 3. Per routine, in discovery order with the entry point first, then
//!    routines seen only through inlining: arguments, locals, return value
//!
//! Type ids start at 100 and step by two so a pointer's id is `id | 1`.
//! Positional labels (instructions, branch targets, functions, ROM data) and
//! hardware symbols need no assignment.

use super::ir::{AssemblyEntry, Constant, Function, Label, PointerWidth, PseudoOp};
use super::layout::LayoutTable;
use super::memory::{Allocation, MemoryAllocator, MemoryLayout};
use crate::bytecode::{AssemblySet, MethodRef, TypeRef};
use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Prefix every inline-assembly alias must carry
pub const ALIAS_PREFIX: &str = "ALIAS_";

const FIRST_TYPE_ID: u16 = 100;
const RESERVED_REGISTERS: u8 = 2;

/// Output of label resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLabels {
    /// `LABEL = value` lines, in emission order
    pub assignments: Vec<AssemblyEntry>,
    /// RAM placements, in allocation order
    pub allocations: Vec<Allocation>,
    /// First RAM address left unused
    pub next_free: u16,
}

pub struct LabelResolver<'a> {
    assemblies: &'a AssemblySet,
    layouts: LayoutTable<'a>,
    memory: MemoryAllocator,
}

impl<'a> LabelResolver<'a> {
    pub fn new(assemblies: &'a AssemblySet, layout: MemoryLayout) -> Self {
        Self {
            assemblies,
            layouts: LayoutTable::new(assemblies),
            memory: MemoryAllocator::new(layout),
        }
    }

    /// Resolves every label referenced by `functions`, entry point first
    pub fn resolve(mut self, functions: &[Function]) -> Result<ResolvedLabels> {
        let mut referenced: Vec<Label> = Vec::new();
        let mut seen = HashSet::new();
        for function in functions {
            let labels = function.referenced_labels().into_iter().chain(function.lifted_locals.iter());
            for label in labels {
                if seen.insert(label.clone()) {
                    referenced.push(label.clone());
                }
            }
        }

        let mut assignments = Vec::new();
        self.allocate_reserved(&mut assignments)?;
        self.allocate_globals(&seen, &mut assignments)?;
        self.allocate_routines(functions, &referenced, &seen, &mut assignments)?;
        assignments.extend(self.aliases()?);
        assignments.extend(self.types(&referenced)?);

        info!(
            labels = assignments.len(),
            next_free = self.memory.next_free(),
            "Resolved labels"
        );
        Ok(ResolvedLabels {
            assignments,
            next_free: self.memory.next_free(),
            allocations: self.memory.allocations().to_vec(),
        })
    }

    fn place(&mut self, label: Label, size: u16, out: &mut Vec<AssemblyEntry>) -> Result<()> {
        let address = self.memory.allocate(label.clone(), size)?;
        out.push(AssemblyEntry::PseudoOp(PseudoOp::LabelAssign(
            label,
            Constant::Address(address).into(),
        )));
        Ok(())
    }

    fn allocate_reserved(&mut self, out: &mut Vec<AssemblyEntry>) -> Result<()> {
        for index in 0..RESERVED_REGISTERS {
            self.place(Label::Reserved(index), 1, out)?;
        }
        Ok(())
    }

    fn allocate_globals(&mut self, referenced: &HashSet<Label>, out: &mut Vec<AssemblyEntry>) -> Result<()> {
        let assemblies = self.assemblies;
        for ty in assemblies.types() {
            let mut fields: Vec<_> = ty
                .fields
                .iter()
                .filter(|f| f.is_static && f.rom_data.is_none())
                .filter(|f| !f.aliases.is_empty() || referenced.contains(&Label::Global(ty.field_ref(&f.name))))
                .collect();
            fields.sort_by(|a, b| a.name.cmp(&b.name));
            for field in fields {
                let size = self.layouts.size_of(&field.ty)?;
                self.place(Label::Global(ty.field_ref(&field.name)), size, out)?;
            }
        }
        Ok(())
    }

    fn allocate_routines(
        &mut self,
        functions: &[Function],
        referenced: &[Label],
        seen: &HashSet<Label>,
        out: &mut Vec<AssemblyEntry>,
    ) -> Result<()> {
        let compiled = functions.iter().map(|f| &f.method);
        let inlined = referenced.iter().filter_map(Label::owning_method);
        let mut routines: Vec<&MethodRef> = Vec::new();
        for method in compiled.chain(inlined) {
            if !routines.contains(&method) {
                routines.push(method);
            }
        }

        let assemblies = self.assemblies;
        for method in routines {
            let def = assemblies.find_method(method)?;
            let mut slots = Vec::new();
            for (index, parameter) in def.parameters.iter().enumerate() {
                let label = Label::Argument {
                    method: method.clone(),
                    index: index as u16,
                };
                slots.push((label, &parameter.ty));
            }
            for (index, ty) in def.locals.iter().enumerate() {
                let label = Label::Local {
                    method: method.clone(),
                    index: index as u16,
                };
                slots.push((label, ty));
            }
            slots.push((Label::ReturnValue(method.clone()), &def.return_type));

            for (label, ty) in slots {
                if seen.contains(&label) {
                    let size = self.layouts.size_of(ty)?;
                    self.place(label, size, out)?;
                }
            }
        }
        Ok(())
    }

    fn aliases(&self) -> Result<Vec<AssemblyEntry>> {
        let mut taken: HashMap<&str, String> = HashMap::new();
        let mut out = Vec::new();
        for ty in self.assemblies.types() {
            for field in &ty.fields {
                for alias in &field.aliases {
                    let field_ref = ty.field_ref(&field.name);
                    if !field.is_static || field.rom_data.is_some() {
                        return Err(Error::InvalidAlias {
                            alias: alias.clone(),
                            reason: format!("{} is not a static RAM field", field_ref),
                        });
                    }
                    if !alias.starts_with(ALIAS_PREFIX) {
                        return Err(Error::InvalidAlias {
                            alias: alias.clone(),
                            reason: format!("aliases must begin with {}", ALIAS_PREFIX),
                        });
                    }
                    if let Some(existing) = taken.get(alias.as_str()) {
                        return Err(Error::InvalidAlias {
                            alias: alias.clone(),
                            reason: format!("already aliases {}, can't alias {} too", existing, field_ref),
                        });
                    }
                    taken.insert(alias.as_str(), field_ref.to_string());
                    out.push(AssemblyEntry::PseudoOp(PseudoOp::AliasAssign(
                        alias.clone(),
                        Label::Global(field_ref),
                    )));
                }
            }
        }
        Ok(out)
    }

    /// Type ids and sizes for the built-ins and every referenced type
    fn types(&mut self, referenced: &[Label]) -> Result<Vec<AssemblyEntry>> {
        let mut types = vec![TypeRef::byte(), TypeRef::boolean(), TypeRef::nothing()];
        let mut known: BTreeSet<TypeRef> = types.iter().cloned().collect();
        for label in referenced {
            let ty = match label {
                Label::Type(ty) | Label::PointerType(ty) | Label::Size(ty) => ty.element_type(),
                _ => continue,
            };
            if known.insert(ty.clone()) {
                types.push(ty);
            }
        }
        debug!(count = types.len(), "Numbering types");

        let mut out = Vec::with_capacity(types.len() * 3 + 2);
        for (n, ty) in types.into_iter().enumerate() {
            let id = FIRST_TYPE_ID + 2 * n as u16;
            let size = self.layouts.size_of(&ty)?;
            out.push(assign(Label::Type(ty.clone()), id));
            out.push(assign(Label::PointerType(ty.clone()), id | 1));
            out.push(assign(Label::Size(ty), size));
        }
        for width in [PointerWidth::Short, PointerWidth::Long] {
            out.push(assign(Label::PointerSize(width), width.bytes() as u16));
        }
        Ok(out)
    }
}

fn assign(label: Label, value: u16) -> AssemblyEntry {
    AssemblyEntry::PseudoOp(PseudoOp::LabelAssign(label, Constant::Number(value).into()))
}
