//! Bytecode opcodes, operands and instructions

use super::refs::{FieldRef, InstRef, MethodRef, TypeRef};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opcodes {
    ($($(#[$doc:meta])* $variant:ident => $mnemonic:literal,)*) => {
        /// Stack-machine opcode as emitted by the front end
        ///
        /// Serialized by mnemonic (`"ldc.i4.s"`). Opcodes the target can't
        /// express are still listed so they fail with a precise error instead
        /// of a parse failure.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "&'static str")]
        pub enum Opcode {
            $($(#[$doc])* $variant,)*
        }

        impl Opcode {
            /// Every opcode, in declaration order
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            /// Textual mnemonic
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                }
            }

            /// Looks up an opcode by mnemonic
            pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
                match mnemonic {
                    $($mnemonic => Some(Opcode::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    Nop => "nop",

    // Constants
    LdcI4M1 => "ldc.i4.m1",
    LdcI4_0 => "ldc.i4.0",
    LdcI4_1 => "ldc.i4.1",
    LdcI4_2 => "ldc.i4.2",
    LdcI4_3 => "ldc.i4.3",
    LdcI4_4 => "ldc.i4.4",
    LdcI4_5 => "ldc.i4.5",
    LdcI4_6 => "ldc.i4.6",
    LdcI4_7 => "ldc.i4.7",
    LdcI4_8 => "ldc.i4.8",
    LdcI4S => "ldc.i4.s",
    LdcI4 => "ldc.i4",
    Ldstr => "ldstr",

    // Locals
    Ldloc0 => "ldloc.0",
    Ldloc1 => "ldloc.1",
    Ldloc2 => "ldloc.2",
    Ldloc3 => "ldloc.3",
    LdlocS => "ldloc.s",
    Ldloc => "ldloc",
    Stloc0 => "stloc.0",
    Stloc1 => "stloc.1",
    Stloc2 => "stloc.2",
    Stloc3 => "stloc.3",
    StlocS => "stloc.s",
    Stloc => "stloc",
    LdlocaS => "ldloca.s",
    Ldloca => "ldloca",

    // Arguments
    Ldarg0 => "ldarg.0",
    Ldarg1 => "ldarg.1",
    Ldarg2 => "ldarg.2",
    Ldarg3 => "ldarg.3",
    LdargS => "ldarg.s",
    Ldarg => "ldarg",

    // Fields and memory
    Ldsfld => "ldsfld",
    Stsfld => "stsfld",
    Ldsflda => "ldsflda",
    Ldfld => "ldfld",
    Stfld => "stfld",
    Ldflda => "ldflda",
    LdindU1 => "ldind.u1",
    StindI1 => "stind.i1",
    Ldobj => "ldobj",
    Initobj => "initobj",

    // Arithmetic and logic
    Add => "add",
    Sub => "sub",
    Or => "or",
    Ceq => "ceq",
    Dup => "dup",
    Pop => "pop",
    ConvU1 => "conv.u1",
    ConvU => "conv.u",
    ConvI => "conv.i",

    // Control flow
    Br => "br",
    BrS => "br.s",
    Brtrue => "brtrue",
    BrtrueS => "brtrue.s",
    Brfalse => "brfalse",
    BrfalseS => "brfalse.s",
    Blt => "blt",
    BltS => "blt.s",
    Call => "call",
    Ret => "ret",

    // Recognized, no target support
    Mul => "mul",
    Div => "div",
    Rem => "rem",
    And => "and",
    Xor => "xor",
    Shl => "shl",
    Shr => "shr",
    Neg => "neg",
    Not => "not",
    Cgt => "cgt",
    Clt => "clt",
    Beq => "beq",
    BeqS => "beq.s",
    BneUn => "bne.un",
    BneUnS => "bne.un.s",
    Bgt => "bgt",
    BgtS => "bgt.s",
    Ble => "ble",
    BleS => "ble.s",
    Bge => "bge",
    BgeS => "bge.s",
    Switch => "switch",
    Starg => "starg",
    StargS => "starg.s",
    Ldnull => "ldnull",
    Newobj => "newobj",
    Newarr => "newarr",
    Callvirt => "callvirt",
    Ldelem => "ldelem",
    Stelem => "stelem",
    Box => "box",
    Throw => "throw",
    ConvI4 => "conv.i4",
}

impl Opcode {
    /// Whether the opcode transfers control to an operand target
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::Br
                | Opcode::BrS
                | Opcode::Brtrue
                | Opcode::BrtrueS
                | Opcode::Brfalse
                | Opcode::BrfalseS
                | Opcode::Blt
                | Opcode::BltS
                | Opcode::Beq
                | Opcode::BeqS
                | Opcode::BneUn
                | Opcode::BneUnS
                | Opcode::Bgt
                | Opcode::BgtS
                | Opcode::Ble
                | Opcode::BleS
                | Opcode::Bge
                | Opcode::BgeS
        )
    }
}

impl TryFrom<String> for Opcode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Opcode::from_mnemonic(&value).ok_or_else(|| format!("unknown opcode '{}'", value))
    }
}

impl From<Opcode> for &'static str {
    fn from(value: Opcode) -> Self {
        value.mnemonic()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Operand {
    /// No operand
    #[default]
    None,
    /// Integer literal
    Int(i64),
    /// Local variable slot
    Local(u16),
    /// Parameter slot
    Arg(u16),
    /// Branch target offset
    Target(u32),
    /// Field token
    Field(FieldRef),
    /// Method token
    Method(MethodRef),
    /// Type token
    Type(TypeRef),
    /// String literal
    String(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Int(v) => write!(f, "{}", v),
            Operand::Local(i) => write!(f, "V_{}", i),
            Operand::Arg(i) => write!(f, "A_{}", i),
            Operand::Target(t) => write!(f, "{}", InstRef(*t)),
            Operand::Field(field) => write!(f, "{}", field),
            Operand::Method(method) => write!(f, "{}", method),
            Operand::Type(ty) => write!(f, "{}", ty),
            Operand::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// One bytecode instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Offset within the method body
    pub offset: u32,
    /// Operation
    pub opcode: Opcode,
    /// Operand, if the opcode takes one
    #[serde(default)]
    pub operand: Operand,
}

impl Instruction {
    /// Creates an instruction
    pub fn new(offset: u32, opcode: Opcode, operand: Operand) -> Self {
        Self {
            offset,
            opcode,
            operand,
        }
    }

    /// Creates an instruction without an operand
    pub fn simple(offset: u32, opcode: Opcode) -> Self {
        Self::new(offset, opcode, Operand::None)
    }

    /// Value-equality handle for this instruction
    pub fn inst_ref(&self) -> InstRef {
        InstRef(self.offset)
    }

    /// Branch target, if this is a branch
    pub fn branch_target(&self) -> Option<InstRef> {
        match (self.opcode.is_branch(), &self.operand) {
            (true, Operand::Target(target)) => Some(InstRef(*target)),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.inst_ref(), self.opcode)?;
        if self.operand != Operand::None {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}
