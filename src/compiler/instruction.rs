//! Instruction selection: one bytecode instruction to zero or more IR entries
//!
//! Handlers are plain functions looked up in a table keyed by opcode. The
//! table is built once from an exhaustive match, so adding an opcode without
//! deciding how to compile it is a build error.

use super::ir::{AssemblyEntry, Constant, Label, MacroOp, PointerWidth, Preprocessed};
use super::layout::LayoutTable;
use super::method::MethodCompiler;
use super::CompileContext;
use crate::bytecode::{
    CallMarker, FieldDef, FieldRef, Instruction, Intrinsic, MethodDef, MethodRef, Opcode, Operand,
    Register, TypeRef,
};
use crate::error::{Error, Result};
use lazy_static::lazy_static;
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

type Handler = fn(&mut InstructionCompiler<'_>, &Instruction) -> Result<Vec<AssemblyEntry>>;

lazy_static! {
    static ref DISPATCH: HashMap<Opcode, Handler> = Opcode::ALL
        .iter()
        .map(|&opcode| (opcode, handler_for(opcode)))
        .collect();
}

fn handler_for(opcode: Opcode) -> Handler {
    use Opcode::*;
    match opcode {
        Nop | ConvU1 | ConvU | ConvI => nothing,
        LdcI4M1 | LdcI4_0 | LdcI4_1 | LdcI4_2 | LdcI4_3 | LdcI4_4 | LdcI4_5 | LdcI4_6
        | LdcI4_7 | LdcI4_8 | LdcI4S | LdcI4 => load_constant,
        Ldstr => load_string,
        Ldloc0 | Ldloc1 | Ldloc2 | Ldloc3 | LdlocS | Ldloc => load_local,
        Stloc0 | Stloc1 | Stloc2 | Stloc3 | StlocS | Stloc => store_local,
        LdlocaS | Ldloca => load_local_address,
        Ldarg0 | Ldarg1 | Ldarg2 | Ldarg3 | LdargS | Ldarg => load_argument,
        Ldsfld => load_static_field,
        Stsfld => store_static_field,
        Ldsflda => load_static_field_address,
        Ldfld => load_field,
        Stfld => store_field,
        Ldflda => load_field_address,
        LdindU1 => load_indirect_byte,
        StindI1 => store_indirect_byte,
        Ldobj => load_object,
        Initobj => initialize_object,
        Add => add,
        Sub => subtract,
        Or => bitwise_or,
        Ceq => compare_equal,
        Dup => duplicate,
        Pop => pop,
        Br | BrS => branch,
        Brtrue | BrtrueS => branch_true,
        Brfalse | BrfalseS => branch_false,
        Blt | BltS => branch_if_less_than,
        Call => call,
        Ret => ret,
        Mul | Div | Rem | And | Xor | Shl | Shr | Neg | Not | Cgt | Clt | Beq | BeqS | BneUn
        | BneUnS | Bgt | BgtS | Ble | BleS | Bge | BgeS | Switch | Starg | StargS | Ldnull
        | Newobj | Newarr | Callvirt | Ldelem | Stelem | Box | Throw | ConvI4 => unsupported,
    }
}

/// Compiles the instructions of one routine
pub struct InstructionCompiler<'a> {
    ctx: CompileContext<'a>,
    method: MethodRef,
    def: &'a MethodDef,
    inline_chain: &'a [MethodRef],
    layouts: LayoutTable<'a>,
    lifted_locals: BTreeSet<Label>,
}

impl<'a> InstructionCompiler<'a> {
    /// Creates a compiler for `method`; `inline_chain` ends with `method`
    pub fn new(
        ctx: CompileContext<'a>,
        method: MethodRef,
        def: &'a MethodDef,
        inline_chain: &'a [MethodRef],
    ) -> Self {
        Self {
            ctx,
            method,
            def,
            inline_chain,
            layouts: LayoutTable::new(ctx.assemblies),
            lifted_locals: BTreeSet::new(),
        }
    }

    /// Compiles one instruction
    pub fn compile(&mut self, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
        trace!(method = %self.method, "{}", instruction);
        let handler = DISPATCH
            .get(&instruction.opcode)
            .copied()
            .unwrap_or(unsupported);
        handler(self, instruction)
    }

    /// Locals whose address was taken, including those of inlined callees
    pub fn into_lifted_locals(self) -> BTreeSet<Label> {
        self.lifted_locals
    }

    fn invalid(&self, instruction: &Instruction, reason: impl Into<String>) -> Error {
        Error::invalid_instruction(instruction.offset, self.method.to_string(), reason)
    }

    fn slot_operand(&self, instruction: &Instruction, implied: &[Opcode]) -> Result<u16> {
        if let Some(slot) = implied.iter().position(|&op| op == instruction.opcode) {
            return Ok(slot as u16);
        }
        match instruction.operand {
            Operand::Local(slot) | Operand::Arg(slot) => Ok(slot),
            Operand::Int(slot) if (0..=u16::MAX as i64).contains(&slot) => Ok(slot as u16),
            _ => Err(self.invalid(instruction, "expected a slot operand")),
        }
    }

    fn local(&self, instruction: &Instruction, implied: &[Opcode]) -> Result<(Label, TypeRef)> {
        let index = self.slot_operand(instruction, implied)?;
        let ty = self
            .def
            .locals
            .get(index as usize)
            .cloned()
            .ok_or_else(|| self.invalid(instruction, format!("no local in slot {}", index)))?;
        Ok((
            Label::Local {
                method: self.method.clone(),
                index,
            },
            ty,
        ))
    }

    fn field_operand(&self, instruction: &Instruction) -> Result<FieldRef> {
        match &instruction.operand {
            Operand::Field(field) => Ok(field.clone()),
            _ => Err(self.invalid(instruction, "expected a field operand")),
        }
    }

    fn type_operand(&self, instruction: &Instruction) -> Result<TypeRef> {
        match &instruction.operand {
            Operand::Type(ty) => Ok(ty.clone()),
            _ => Err(self.invalid(instruction, "expected a type operand")),
        }
    }

    fn branch_label(&self, instruction: &Instruction) -> Result<Label> {
        instruction
            .branch_target()
            .map(Label::Instruction)
            .ok_or_else(|| self.invalid(instruction, "expected a branch target"))
    }

    /// Offset, type and size of an instance field
    fn field_layout(&mut self, instruction: &Instruction) -> Result<(Constant, TypeRef)> {
        let field = self.field_operand(instruction)?;
        let layout = self.layouts.layout_of(field.declaring_type())?;
        let slot = layout
            .field(field.name())
            .cloned()
            .ok_or_else(|| Error::MissingField {
                field: field.to_string(),
            })?;
        let offset = u8::try_from(slot.offset)
            .map_err(|_| self.invalid(instruction, format!("field offset {} exceeds a byte", slot.offset)))?;
        Ok((Constant::Byte(offset), slot.ty))
    }

    fn static_field(&self, instruction: &Instruction) -> Result<(FieldRef, &'a FieldDef)> {
        let field = self.field_operand(instruction)?;
        let assemblies = self.ctx.assemblies;
        let def = assemblies.find_field(&field)?;
        if !def.is_static {
            return Err(self.invalid(instruction, format!("{} is not static", field)));
        }
        Ok((field, def))
    }
}

fn byte_type() -> (Label, Label) {
    (Label::Type(TypeRef::byte()), Label::Size(TypeRef::byte()))
}

fn one(op: MacroOp, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    Ok(vec![AssemblyEntry::instr(op, instruction)])
}

fn nothing(_: &mut InstructionCompiler<'_>, _: &Instruction) -> Result<Vec<AssemblyEntry>> {
    Ok(Vec::new())
}

fn unsupported(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    Err(Error::UnsupportedOpcode {
        opcode: instruction.opcode.mnemonic().to_string(),
        offset: instruction.offset,
        method: c.method.to_string(),
    })
}

fn load_constant(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    use Opcode::*;
    let value: i64 = match instruction.opcode {
        LdcI4M1 => -1,
        LdcI4_0 => 0,
        LdcI4_1 => 1,
        LdcI4_2 => 2,
        LdcI4_3 => 3,
        LdcI4_4 => 4,
        LdcI4_5 => 5,
        LdcI4_6 => 6,
        LdcI4_7 => 7,
        LdcI4_8 => 8,
        _ => match instruction.operand {
            Operand::Int(value) => value,
            _ => return Err(c.invalid(instruction, "expected an integer operand")),
        },
    };
    let value = u8::try_from(value)
        .map_err(|_| c.invalid(instruction, format!("constant {} does not fit in a byte", value)))?;
    let (ty, size) = byte_type();
    one(
        MacroOp::PushConstant {
            value: Constant::Byte(value),
            ty,
            size,
        },
        instruction,
    )
}

fn load_string(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    match &instruction.operand {
        Operand::String(text) => Ok(vec![AssemblyEntry::Preprocessed(Preprocessed::LoadString {
            instruction: instruction.clone(),
            text: text.clone(),
        })]),
        _ => Err(c.invalid(instruction, "expected a string operand")),
    }
}

const LDLOC: &[Opcode] = &[Opcode::Ldloc0, Opcode::Ldloc1, Opcode::Ldloc2, Opcode::Ldloc3];
const STLOC: &[Opcode] = &[Opcode::Stloc0, Opcode::Stloc1, Opcode::Stloc2, Opcode::Stloc3];
const LDARG: &[Opcode] = &[Opcode::Ldarg0, Opcode::Ldarg1, Opcode::Ldarg2, Opcode::Ldarg3];

fn load_local(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let (local, ty) = c.local(instruction, LDLOC)?;
    one(
        MacroOp::PushGlobal {
            global: local,
            ty: Label::type_of(&ty),
            size: Label::size_of(&ty),
        },
        instruction,
    )
}

fn store_local(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let (local, ty) = c.local(instruction, STLOC)?;
    one(
        MacroOp::PopToGlobal {
            global: local,
            ty: Label::type_of(&ty),
            size: Label::size_of(&ty),
        },
        instruction,
    )
}

fn load_local_address(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let (local, ty) = c.local(instruction, &[])?;
    c.lifted_locals.insert(local.clone());
    one(
        MacroOp::PushAddressOfLocal {
            local,
            ty: Label::type_of(&ty.pointer_to()),
            size: Label::PointerSize(PointerWidth::Short),
        },
        instruction,
    )
}

fn load_argument(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let index = c.slot_operand(instruction, LDARG)?;
    let ty = c
        .def
        .parameters
        .get(index as usize)
        .map(|p| p.ty.clone())
        .ok_or_else(|| c.invalid(instruction, format!("no parameter in slot {}", index)))?;
    one(
        MacroOp::PushGlobal {
            global: Label::Argument {
                method: c.method.clone(),
                index,
            },
            ty: Label::type_of(&ty),
            size: Label::size_of(&ty),
        },
        instruction,
    )
}

fn load_static_field(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let (field, def) = c.static_field(instruction)?;
    if def.rom_data.is_some() {
        return Err(c.invalid(instruction, format!("ROM data field {} can only be accessed by address", field)));
    }
    one(
        MacroOp::PushGlobal {
            global: Label::Global(field),
            ty: Label::type_of(&def.ty),
            size: Label::size_of(&def.ty),
        },
        instruction,
    )
}

fn store_static_field(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let (field, def) = c.static_field(instruction)?;
    if def.rom_data.is_some() {
        return Err(c.invalid(instruction, format!("ROM data field {} is read-only", field)));
    }
    one(
        MacroOp::PopToGlobal {
            global: Label::Global(field),
            ty: Label::type_of(&def.ty),
            size: Label::size_of(&def.ty),
        },
        instruction,
    )
}

fn load_static_field_address(
    c: &mut InstructionCompiler<'_>,
    instruction: &Instruction,
) -> Result<Vec<AssemblyEntry>> {
    let (field, def) = c.static_field(instruction)?;
    let op = match &def.rom_data {
        Some(rom) => MacroOp::PushAddressOfGlobal {
            global: Label::RomData(field),
            ty: Label::PointerType(rom.element_type.clone()),
            size: Label::PointerSize(PointerWidth::Long),
        },
        None => MacroOp::PushAddressOfGlobal {
            global: Label::Global(field),
            ty: Label::type_of(&def.ty.pointer_to()),
            size: Label::PointerSize(PointerWidth::Short),
        },
    };
    one(op, instruction)
}

fn load_field(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let (offset, ty) = c.field_layout(instruction)?;
    one(
        MacroOp::PushFieldFromStack {
            offset,
            ty: Label::type_of(&ty),
            size: Label::size_of(&ty),
        },
        instruction,
    )
}

fn store_field(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let (offset, ty) = c.field_layout(instruction)?;
    one(
        MacroOp::PopToFieldFromStack {
            offset,
            ty: Label::type_of(&ty),
            size: Label::size_of(&ty),
        },
        instruction,
    )
}

fn load_field_address(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let (offset, ty) = c.field_layout(instruction)?;
    one(
        MacroOp::PushAddressOfField {
            offset,
            ty: Label::type_of(&ty.pointer_to()),
            size: Label::PointerSize(PointerWidth::Short),
        },
        instruction,
    )
}

fn load_indirect_byte(_: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let (ty, size) = byte_type();
    one(MacroOp::PushDereferenceFromStack { ty, size }, instruction)
}

fn store_indirect_byte(_: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let (ty, size) = byte_type();
    one(MacroOp::PopToAddressFromStack { ty, size }, instruction)
}

fn load_object(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let ty = c.type_operand(instruction)?;
    one(
        MacroOp::PushDereferenceFromStack {
            ty: Label::type_of(&ty),
            size: Label::size_of(&ty),
        },
        instruction,
    )
}

fn initialize_object(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let ty = c.type_operand(instruction)?;
    one(
        MacroOp::InitializeObject {
            size: Label::size_of(&ty),
        },
        instruction,
    )
}

fn add(_: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    one(MacroOp::AddFromStack, instruction)
}

fn subtract(_: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    one(MacroOp::SubFromStack, instruction)
}

fn bitwise_or(_: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    one(MacroOp::OrFromStack, instruction)
}

fn compare_equal(_: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    one(MacroOp::CompareEqualToFromStack, instruction)
}

fn duplicate(_: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    one(MacroOp::Duplicate, instruction)
}

fn pop(_: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    one(MacroOp::PopStack, instruction)
}

fn branch(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let target = c.branch_label(instruction)?;
    one(MacroOp::Branch { target }, instruction)
}

fn branch_true(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let target = c.branch_label(instruction)?;
    one(MacroOp::BranchTrueFromStack { target }, instruction)
}

fn branch_false(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let target = c.branch_label(instruction)?;
    one(MacroOp::BranchFalseFromStack { target }, instruction)
}

fn branch_if_less_than(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let target = c.branch_label(instruction)?;
    one(MacroOp::BranchIfLessThanFromStack { target }, instruction)
}

fn ret(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let return_type = &c.def.return_type;
    if return_type.is_void() {
        return one(MacroOp::ReturnVoid, instruction);
    }
    one(
        MacroOp::ReturnNonVoid {
            retval: Label::ReturnValue(c.method.clone()),
            ty: Label::type_of(return_type),
            size: Label::size_of(return_type),
        },
        instruction,
    )
}

/// How a call site is compiled, in priority order
enum CallResolution<'m> {
    Ignore,
    StoreToSymbol(&'m str),
    LoadFromSymbol(&'m str),
    LoadToRegister(Register),
    Replace(Intrinsic),
    Inline,
    Normal,
}

fn resolve_call(callee: &MethodDef, inline_all: bool) -> CallResolution<'_> {
    match &callee.marker {
        Some(CallMarker::IgnoreCall) => CallResolution::Ignore,
        Some(CallMarker::StoreToSymbol { symbol }) => CallResolution::StoreToSymbol(symbol),
        Some(CallMarker::LoadFromSymbol { symbol }) => CallResolution::LoadFromSymbol(symbol),
        Some(CallMarker::LoadToRegister { register }) => CallResolution::LoadToRegister(*register),
        Some(CallMarker::ReplaceWithEntry { intrinsic }) => CallResolution::Replace(*intrinsic),
        Some(CallMarker::AlwaysInline) => CallResolution::Inline,
        None if inline_all => CallResolution::Inline,
        None => CallResolution::Normal,
    }
}

fn arity_mismatch(callee: &MethodRef, def: &MethodDef, expected: usize) -> Error {
    Error::ArityMismatch {
        method: callee.to_string(),
        marker: def.marker.as_ref().map(|m| m.describe()).unwrap_or("call").to_string(),
        expected,
        actual: def.arity(),
    }
}

fn call(c: &mut InstructionCompiler<'_>, instruction: &Instruction) -> Result<Vec<AssemblyEntry>> {
    let callee = match &instruction.operand {
        Operand::Method(method) => method.clone(),
        _ => return Err(c.invalid(instruction, "expected a method operand")),
    };
    let assemblies = c.ctx.assemblies;
    let def = assemblies.find_method(&callee)?;

    match resolve_call(def, c.ctx.options.inline_all_calls) {
        CallResolution::Ignore => Ok(Vec::new()),
        CallResolution::StoreToSymbol(symbol) => match def.parameters.as_slice() {
            [] => one(
                MacroOp::StoreTo {
                    symbol: Label::Predefined(symbol.to_string()),
                },
                instruction,
            ),
            [value] => one(
                MacroOp::PopToGlobal {
                    global: Label::Predefined(symbol.to_string()),
                    ty: Label::type_of(&value.ty),
                    size: Label::size_of(&value.ty),
                },
                instruction,
            ),
            _ => Err(arity_mismatch(&callee, def, 1)),
        },
        CallResolution::LoadFromSymbol(symbol) => {
            if def.arity() != 0 {
                return Err(arity_mismatch(&callee, def, 0));
            }
            one(
                MacroOp::PushGlobal {
                    global: Label::Predefined(symbol.to_string()),
                    ty: Label::type_of(&def.return_type),
                    size: Label::size_of(&def.return_type),
                },
                instruction,
            )
        }
        CallResolution::LoadToRegister(register) => {
            if def.arity() != 1 {
                return Err(arity_mismatch(&callee, def, 1));
            }
            one(MacroOp::PopToRegister { register }, instruction)
        }
        CallResolution::Replace(intrinsic) => {
            let instruction = instruction.clone();
            let marker = match intrinsic {
                Intrinsic::InlineAssembly => Preprocessed::InlineAssemblyCall(instruction),
                Intrinsic::RomDataLength => Preprocessed::RomDataLengthCall(instruction),
                Intrinsic::RomDataStride => Preprocessed::RomDataStrideCall(instruction),
                Intrinsic::RomDataGetter => Preprocessed::RomDataGetterCall(instruction),
            };
            Ok(vec![AssemblyEntry::Preprocessed(marker)])
        }
        CallResolution::Inline => {
            if def.arity() != 0 || !def.return_type.is_void() {
                return Err(Error::UnsupportedSignature {
                    method: callee.to_string(),
                    action: "inline".into(),
                    reason: "only parameterless void methods can be inlined".into(),
                });
            }
            if c.inline_chain.contains(&callee) {
                let chain: Vec<String> = c.inline_chain.iter().map(|m| m.to_string()).collect();
                return Err(Error::RecursiveInline {
                    method: callee.to_string(),
                    chain: chain.join(" -> "),
                });
            }
            let inlined = MethodCompiler::new(c.ctx).compile_inline(&callee, c.inline_chain)?;
            c.lifted_locals.extend(inlined.lifted_locals);

            let mut entries = Vec::with_capacity(inlined.body.len() + 1);
            entries.push(AssemblyEntry::InlineFunction {
                method: callee,
                call_site: Some(instruction.clone()),
            });
            entries.extend(inlined.body);
            Ok(entries)
        }
        CallResolution::Normal => {
            if def.arity() != 0 {
                return Err(Error::UnsupportedSignature {
                    method: callee.to_string(),
                    action: "call".into(),
                    reason: format!("calls with {} parameter(s) are not supported", def.arity()),
                });
            }
            let function = Label::Function(callee);
            let op = if def.return_type.is_void() {
                MacroOp::CallVoid { function }
            } else {
                MacroOp::CallNonVoid {
                    function,
                    ty: Label::type_of(&def.return_type),
                    size: Label::size_of(&def.return_type),
                }
            };
            one(op, instruction)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Assembly, AssemblySet, TypeDef};
    use crate::compiler::CompileOptions;

    fn program() -> AssemblySet {
        let main = MethodDef::new("Main")
            .with_locals(vec![TypeRef::byte(), TypeRef::new("Game.Point")])
            .with_parameter("unused", TypeRef::byte());
        let point = TypeDef::new("Game.Point")
            .with_field(FieldDef::instance("x", TypeRef::byte()))
            .with_field(FieldDef::instance("y", TypeRef::byte()));
        let program = TypeDef::new("Game.Program")
            .with_field(FieldDef::global("score", TypeRef::byte()))
            .with_method(main)
            .with_method(MethodDef::new("Tick"))
            .with_method(MethodDef::new("Read").returning(TypeRef::byte()))
            .with_method(MethodDef::new("Add").with_parameter("a", TypeRef::byte()))
            .with_method(
                MethodDef::new("Poke")
                    .with_parameter("a", TypeRef::byte())
                    .with_parameter("b", TypeRef::byte())
                    .with_marker(CallMarker::StoreToSymbol { symbol: "COLUP0".into() }),
            )
            .with_method(
                MethodDef::new("Peek")
                    .with_parameter("a", TypeRef::byte())
                    .returning(TypeRef::byte())
                    .with_marker(CallMarker::LoadFromSymbol { symbol: "INPT4".into() }),
            )
            .with_method(MethodDef::new("LoadX").with_marker(CallMarker::LoadToRegister { register: Register::X }));
        AssemblySet::new(Assembly::new("Game").with_type(point).with_type(program))
    }

    fn compile_one(set: &AssemblySet, options: &CompileOptions, instruction: Instruction) -> Result<Vec<AssemblyEntry>> {
        let main = MethodRef::parse("Game.Program::Main").unwrap();
        let def = set.find_method(&main).unwrap();
        let chain = vec![main.clone()];
        let ctx = CompileContext {
            assemblies: set,
            options,
        };
        let mut compiler = InstructionCompiler::new(ctx, main, def, &chain);
        compiler.compile(&instruction)
    }

    fn single_op(entries: &[AssemblyEntry]) -> &MacroOp {
        assert_eq!(entries.len(), 1, "expected one entry, got {:?}", entries);
        &entries[0].as_macro().expect("macro entry").op
    }

    fn call_of(name: &str) -> Instruction {
        Instruction::new(0, Opcode::Call, Operand::Method(MethodRef::parse(name).unwrap()))
    }

    #[test]
    fn test_every_opcode_has_a_handler() {
        for opcode in Opcode::ALL {
            assert!(DISPATCH.contains_key(opcode), "no handler for {}", opcode);
        }
    }

    #[test]
    fn test_constants() {
        let set = program();
        let options = CompileOptions::default();
        let entries = compile_one(&set, &options, Instruction::simple(0, Opcode::LdcI4_7)).unwrap();
        assert!(matches!(
            single_op(&entries),
            MacroOp::PushConstant { value: Constant::Byte(7), .. }
        ));

        let entries =
            compile_one(&set, &options, Instruction::new(0, Opcode::LdcI4S, Operand::Int(255))).unwrap();
        assert!(matches!(
            single_op(&entries),
            MacroOp::PushConstant { value: Constant::Byte(255), .. }
        ));

        for bad in [Instruction::new(0, Opcode::LdcI4, Operand::Int(256)), Instruction::simple(0, Opcode::LdcI4M1)] {
            assert!(matches!(
                compile_one(&set, &options, bad),
                Err(Error::InvalidInstruction { .. })
            ));
        }
    }

    #[test]
    fn test_locals_collapse_to_one_handler() {
        let set = program();
        let options = CompileOptions::default();
        let short = compile_one(&set, &options, Instruction::simple(0, Opcode::Ldloc0)).unwrap();
        let long = compile_one(&set, &options, Instruction::new(0, Opcode::LdlocS, Operand::Local(0))).unwrap();
        assert_eq!(single_op(&short), single_op(&long));

        let missing = compile_one(&set, &options, Instruction::simple(0, Opcode::Ldloc3));
        assert!(matches!(missing, Err(Error::InvalidInstruction { .. })));
    }

    #[test]
    fn test_address_of_local_is_lifted() {
        let set = program();
        let options = CompileOptions::default();
        let main = MethodRef::parse("Game.Program::Main").unwrap();
        let def = set.find_method(&main).unwrap();
        let chain = vec![main.clone()];
        let ctx = CompileContext {
            assemblies: &set,
            options: &options,
        };
        let mut compiler = InstructionCompiler::new(ctx, main.clone(), def, &chain);
        let entries = compiler
            .compile(&Instruction::new(0, Opcode::LdlocaS, Operand::Local(1)))
            .unwrap();
        match single_op(&entries) {
            MacroOp::PushAddressOfLocal { ty, .. } => {
                assert_eq!(ty.to_string(), "TYPE_Game_Point_PTR")
            }
            other => panic!("unexpected {:?}", other),
        }
        let lifted = compiler.into_lifted_locals();
        assert!(lifted.contains(&Label::Local { method: main, index: 1 }));
    }

    #[test]
    fn test_instance_field_offsets() {
        let set = program();
        let options = CompileOptions::default();
        let y = Instruction::new(0, Opcode::Ldfld, Operand::Field(FieldRef::parse("Game.Point::y").unwrap()));
        let entries = compile_one(&set, &options, y).unwrap();
        assert!(matches!(
            single_op(&entries),
            MacroOp::PushFieldFromStack { offset: Constant::Byte(1), .. }
        ));
    }

    #[test]
    fn test_store_to_symbol_by_arity() {
        let set = program();
        let options = CompileOptions::default();
        let entries = compile_one(&set, &options, call_of("VCSFramework.Registers::WSync")).unwrap();
        assert_eq!(
            single_op(&entries),
            &MacroOp::StoreTo {
                symbol: Label::Predefined("WSYNC".into())
            }
        );

        let entries = compile_one(&set, &options, call_of("VCSFramework.Registers::set_ColuBk")).unwrap();
        assert!(matches!(single_op(&entries), MacroOp::PopToGlobal { global: Label::Predefined(s), .. } if s == "COLUBK"));
    }

    #[test]
    fn test_load_overrides() {
        let set = program();
        let options = CompileOptions::default();
        let entries = compile_one(&set, &options, call_of("VCSFramework.Registers::get_InTim")).unwrap();
        assert!(matches!(single_op(&entries), MacroOp::PushGlobal { global: Label::Predefined(s), .. } if s == "INTIM"));

        let entries = compile_one(&set, &options, call_of("VCSFramework.Registers::set_Y")).unwrap();
        assert_eq!(
            single_op(&entries),
            &MacroOp::PopToRegister {
                register: Register::Y
            }
        );
    }

    #[test]
    fn test_marker_arity_is_checked() {
        let set = program();
        let options = CompileOptions::default();

        let err = compile_one(&set, &options, call_of("Game.Program::Poke")).unwrap_err();
        assert!(matches!(err, Error::ArityMismatch { expected: 1, actual: 2, .. }));

        let err = compile_one(&set, &options, call_of("Game.Program::Peek")).unwrap_err();
        assert!(matches!(err, Error::ArityMismatch { expected: 0, actual: 1, .. }));

        let err = compile_one(&set, &options, call_of("Game.Program::LoadX")).unwrap_err();
        assert!(matches!(err, Error::ArityMismatch { expected: 1, actual: 0, .. }));
        assert!(!err.is_internal());
    }

    #[test]
    fn test_normal_calls() {
        let set = program();
        let options = CompileOptions::default();
        let entries = compile_one(&set, &options, call_of("Game.Program::Tick")).unwrap();
        assert!(matches!(single_op(&entries), MacroOp::CallVoid { .. }));
        assert_eq!(single_op(&entries).effect().pushes, 0);

        let entries = compile_one(&set, &options, call_of("Game.Program::Read")).unwrap();
        assert!(matches!(single_op(&entries), MacroOp::CallNonVoid { .. }));
        assert_eq!(single_op(&entries).effect().pushes, 1);

        assert!(matches!(
            compile_one(&set, &options, call_of("Game.Program::Add")),
            Err(Error::UnsupportedSignature { .. })
        ));
        assert!(matches!(
            compile_one(&set, &options, call_of("Game.Program::Missing")),
            Err(Error::MissingMethod { .. })
        ));
    }

    #[test]
    fn test_inline_all_mode() {
        let set = program();
        let options = CompileOptions {
            inline_all_calls: true,
            ..CompileOptions::default()
        };
        let entries = compile_one(&set, &options, call_of("Game.Program::Tick")).unwrap();
        assert!(matches!(entries[0], AssemblyEntry::InlineFunction { .. }));
        assert!(entries.contains(&AssemblyEntry::PseudoOp(crate::compiler::ir::PseudoOp::BeginBlock)));

        assert!(matches!(
            compile_one(&set, &options, call_of("Game.Program::Read")),
            Err(Error::UnsupportedSignature { .. })
        ));
    }

    #[test]
    fn test_unsupported_opcode() {
        let set = program();
        let options = CompileOptions::default();
        let err = compile_one(&set, &options, Instruction::simple(3, Opcode::Mul)).unwrap_err();
        assert_eq!(
            err,
            Error::UnsupportedOpcode {
                opcode: "mul".into(),
                offset: 3,
                method: "Game.Program::Main".into()
            }
        );
    }
}
