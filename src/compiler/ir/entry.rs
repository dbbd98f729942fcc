//! Assembly entries: the unit of the compiler's IR stream

use super::expression::{Expression, Label, StackArray};
use super::macros::{MacroCall, MacroOp};
use crate::bytecode::{Instruction, MethodRef};
use std::collections::BTreeSet;
use std::fmt;

/// Assembler directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoOp {
    /// `.block`
    BeginBlock,
    /// `.endblock`
    EndBlock,
    /// `.byte $XX`
    Byte(u8),
    /// `.word LABEL`
    Word(Label),
    /// `.cpu "6502"`
    Cpu(String),
    /// `.include "file"`
    Include(String),
    /// `* = $XXXX`
    ProgramCounter(u16),
    /// `.let STACK_TYPEOF = [a, b]`
    ArrayLet {
        array: StackArray,
        elements: Vec<Expression>,
    },
    /// `LABEL = value`
    LabelAssign(Label, Expression),
    /// `ALIAS = LABEL`
    AliasAssign(String, Label),
}

impl fmt::Display for PseudoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PseudoOp::BeginBlock => f.write_str(".block"),
            PseudoOp::EndBlock => f.write_str(".endblock"),
            PseudoOp::Byte(b) => write!(f, ".byte ${:02X}", b),
            PseudoOp::Word(label) => write!(f, ".word {}", label),
            PseudoOp::Cpu(cpu) => write!(f, ".cpu \"{}\"", cpu),
            PseudoOp::Include(file) => write!(f, ".include \"{}\"", file),
            PseudoOp::ProgramCounter(pc) => write!(f, "* = ${:04X}", pc),
            PseudoOp::ArrayLet { array, elements } => {
                let elements: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, ".let {} = [{}]", array, elements.join(", "))
            }
            PseudoOp::LabelAssign(label, value) => write!(f, "{} = {}", label, value),
            PseudoOp::AliasAssign(alias, label) => write!(f, "{} = {}", alias, label),
        }
    }
}

/// Placeholder that a mandatory rewrite rule must consume
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preprocessed {
    /// `ldstr` awaiting an inline-assembly call
    LoadString { instruction: Instruction, text: String },
    /// Call of the inline-assembly intrinsic
    InlineAssemblyCall(Instruction),
    /// Call of the ROM data length accessor
    RomDataLengthCall(Instruction),
    /// Call of the ROM data stride accessor
    RomDataStrideCall(Instruction),
    /// Call of the ROM data indexer
    RomDataGetterCall(Instruction),
}

impl Preprocessed {
    /// Instruction that produced the marker
    pub fn instruction(&self) -> &Instruction {
        match self {
            Preprocessed::LoadString { instruction, .. }
            | Preprocessed::InlineAssemblyCall(instruction)
            | Preprocessed::RomDataLengthCall(instruction)
            | Preprocessed::RomDataStrideCall(instruction)
            | Preprocessed::RomDataGetterCall(instruction) => instruction,
        }
    }
}

impl fmt::Display for Preprocessed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Preprocessed::LoadString { .. } => "LoadString",
            Preprocessed::InlineAssemblyCall(_) => "InlineAssemblyCall",
            Preprocessed::RomDataLengthCall(_) => "RomDataLengthCall",
            Preprocessed::RomDataStrideCall(_) => "RomDataStrideCall",
            Preprocessed::RomDataGetterCall(_) => "RomDataGetterCall",
        };
        write!(f, "{} ({})", kind, self.instruction())
    }
}

/// One entry of the IR stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyEntry {
    /// Macro invocation
    Macro(MacroCall),
    /// Label definition
    Label(Label),
    /// Assembler directive
    PseudoOp(PseudoOp),
    /// Must be rewritten away before code generation
    Preprocessed(Preprocessed),
    /// Verbatim assembly lines
    InlineAssembly(Vec<String>),
    /// `// text`
    Comment(String),
    /// Empty line
    Blank,
    /// Start of an inlined routine body
    InlineFunction {
        method: MethodRef,
        call_site: Option<Instruction>,
    },
    /// End of a routine body
    EndFunction,
}

impl AssemblyEntry {
    /// Wraps a macro derived from one instruction
    pub fn instr(op: MacroOp, instruction: &Instruction) -> Self {
        AssemblyEntry::Macro(MacroCall::new(op, instruction))
    }

    /// Wraps a macro with no source instruction
    pub fn synthetic(op: MacroOp) -> Self {
        AssemblyEntry::Macro(MacroCall::synthetic(op))
    }

    /// Creates a comment
    pub fn comment(text: impl Into<String>) -> Self {
        AssemblyEntry::Comment(text.into())
    }

    /// The macro call, if this entry is one
    pub fn as_macro(&self) -> Option<&MacroCall> {
        match self {
            AssemblyEntry::Macro(call) => Some(call),
            _ => None,
        }
    }

    /// Labels referenced by operands (not labels defined by the entry)
    pub fn referenced_labels(&self) -> Vec<&Label> {
        match self {
            AssemblyEntry::Macro(call) => referenced_by_op(&call.op),
            AssemblyEntry::PseudoOp(PseudoOp::Word(label)) => vec![label],
            AssemblyEntry::PseudoOp(PseudoOp::ArrayLet { elements, .. }) => {
                elements.iter().flat_map(|e| e.labels()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn referenced_by_op(op: &MacroOp) -> Vec<&Label> {
    match op {
        MacroOp::PushConstant { ty, size, .. }
        | MacroOp::PushAddressOfField { ty, size, .. }
        | MacroOp::PushFieldFromStack { ty, size, .. }
        | MacroOp::PushDereferenceFromStack { ty, size }
        | MacroOp::PopToFieldFromStack { ty, size, .. }
        | MacroOp::PopToAddressFromStack { ty, size } => vec![ty, size],
        MacroOp::PushGlobal { global, ty, size }
        | MacroOp::PushAddressOfGlobal { global, ty, size }
        | MacroOp::PushAddressOfLocal {
            local: global,
            ty,
            size,
        }
        | MacroOp::PopToGlobal { global, ty, size }
        | MacroOp::IncrementGlobal { global, ty, size }
        | MacroOp::PushAddressOfRomDataElementFromConstant {
            rom_data: global,
            ty,
            size,
            ..
        }
        | MacroOp::PushAddressOfRomDataElementFromStack {
            rom_data: global,
            ty,
            size,
        }
        | MacroOp::CallNonVoid {
            function: global,
            ty,
            size,
        }
        | MacroOp::ReturnNonVoid {
            retval: global,
            ty,
            size,
        } => vec![global, ty, size],
        MacroOp::StoreTo { symbol: label }
        | MacroOp::InitializeObject { size: label }
        | MacroOp::Branch { target: label }
        | MacroOp::BranchTrueFromStack { target: label }
        | MacroOp::BranchFalseFromStack { target: label }
        | MacroOp::BranchIfLessThanFromStack { target: label }
        | MacroOp::CallVoid { function: label } => vec![label],
        MacroOp::AssignConstantToGlobal { global, size, .. } => vec![global, size],
        MacroOp::CopyGlobalToGlobal {
            from,
            from_size,
            to,
            to_size,
        } => vec![from, from_size, to, to_size],
        MacroOp::AddFromGlobalAndConstant {
            global,
            global_type,
            global_size,
            constant_type,
            constant_size,
            ..
        } => vec![global, global_type, global_size, constant_type, constant_size],
        MacroOp::AddFromGlobalAndConstantToGlobal {
            global,
            global_type,
            global_size,
            constant_type,
            constant_size,
            target,
            target_type,
            target_size,
            ..
        } => vec![
            global,
            global_type,
            global_size,
            constant_type,
            constant_size,
            target,
            target_type,
            target_size,
        ],
        MacroOp::PopToRegister { .. }
        | MacroOp::PopStack
        | MacroOp::AddFromStack
        | MacroOp::SubFromStack
        | MacroOp::OrFromStack
        | MacroOp::CompareEqualToFromStack
        | MacroOp::Duplicate
        | MacroOp::ReturnVoid
        | MacroOp::EntryPoint => Vec::new(),
    }
}

impl fmt::Display for AssemblyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyEntry::Macro(call) => {
                let params: Vec<String> = call.op.parameters().iter().map(|p| p.to_string()).collect();
                if params.is_empty() {
                    write!(f, ".{}", call.op.name())
                } else {
                    write!(f, ".{} {}", call.op.name(), params.join(", "))
                }
            }
            AssemblyEntry::Label(label) => write!(f, "{}", label),
            AssemblyEntry::PseudoOp(op) => write!(f, "{}", op),
            AssemblyEntry::Preprocessed(marker) => write!(f, "// PREPROCESSED {}", marker),
            AssemblyEntry::InlineAssembly(lines) => f.write_str(&lines.join("\n")),
            AssemblyEntry::Comment(text) => write!(f, "// {}", text),
            AssemblyEntry::Blank | AssemblyEntry::EndFunction => Ok(()),
            AssemblyEntry::InlineFunction { method, .. } => write!(f, "// Inline {}", method),
        }
    }
}

/// A compiled routine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// Routine identity
    pub method: MethodRef,
    /// Finished entry stream
    pub body: Vec<AssemblyEntry>,
    /// Local labels whose address escapes, including those of inlined routines
    pub lifted_locals: BTreeSet<Label>,
}

impl Function {
    /// Every label referenced by the body, first occurrence first
    pub fn referenced_labels(&self) -> Vec<&Label> {
        let mut seen = BTreeSet::new();
        self.body
            .iter()
            .flat_map(|e| e.referenced_labels())
            .filter(|l| seen.insert(*l))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{FieldRef, Opcode, TypeRef};
    use crate::compiler::ir::Constant;

    #[test]
    fn test_macro_rendering() {
        let entry = AssemblyEntry::instr(
            MacroOp::AssignConstantToGlobal {
                value: Constant::Byte(5),
                global: Label::Global(FieldRef::parse("Game.Program::score").unwrap()),
                size: Label::Size(TypeRef::byte()),
            },
            &Instruction::simple(0, Opcode::LdcI4_5),
        );
        assert_eq!(
            entry.to_string(),
            ".assignConstantToGlobal 5, GLOBAL_Game_Program_score, SIZE_System_Byte"
        );
        assert_eq!(AssemblyEntry::synthetic(MacroOp::ReturnVoid).to_string(), ".returnVoid");
    }

    #[test]
    fn test_pseudo_op_rendering() {
        assert_eq!(PseudoOp::Byte(0x0a).to_string(), ".byte $0A");
        assert_eq!(PseudoOp::ProgramCounter(0xF000).to_string(), "* = $F000");
        assert_eq!(PseudoOp::Cpu("6502".into()).to_string(), ".cpu \"6502\"");
        assert_eq!(
            PseudoOp::ArrayLet {
                array: StackArray::SizeOf,
                elements: vec![Expression::stack_size(0), Label::Size(TypeRef::byte()).into()],
            }
            .to_string(),
            ".let STACK_SIZEOF = [STACK_SIZEOF[0], SIZE_System_Byte]"
        );
    }

    #[test]
    fn test_referenced_labels_dedup() {
        let score = Label::Global(FieldRef::parse("Game.Program::score").unwrap());
        let push = AssemblyEntry::synthetic(MacroOp::PushGlobal {
            global: score.clone(),
            ty: Label::Type(TypeRef::byte()),
            size: Label::Size(TypeRef::byte()),
        });
        let function = Function {
            method: crate::bytecode::MethodRef::parse("Game.Program::Main").unwrap(),
            body: vec![push.clone(), push],
            lifted_locals: BTreeSet::new(),
        };
        let labels = function.referenced_labels();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels[0], &score);
    }
}
