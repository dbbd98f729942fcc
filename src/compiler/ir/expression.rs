//! Labels, constants and expressions used as macro operands

use crate::bytecode::{FieldRef, InstRef, MethodRef, TypeRef};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    static ref NON_IDENTIFIER: Regex = Regex::new(r"[^A-Za-z0-9_]").expect("static regex");
}

/// Replaces every character that can't appear in an assembler symbol
pub fn mangle(name: &str) -> String {
    NON_IDENTIFIER.replace_all(name, "_").into_owned()
}

fn type_part(ty: &TypeRef) -> String {
    mangle(ty.element_type().full_name())
}

fn method_part(method: &MethodRef) -> String {
    format!("{}_{}", type_part(method.declaring_type()), mangle(method.name()))
}

fn field_part(field: &FieldRef) -> String {
    format!("{}_{}", type_part(field.declaring_type()), mangle(field.name()))
}

/// Pointer width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PointerWidth {
    /// Zero-page pointer into RAM
    Short,
    /// Full 16-bit pointer, needed for ROM
    Long,
}

impl PointerWidth {
    /// Size in bytes
    pub fn bytes(self) -> u8 {
        match self {
            PointerWidth::Short => 1,
            PointerWidth::Long => 2,
        }
    }
}

/// Symbolic reference resolved to an address or literal in a later pass
///
/// Labels are plain values: two labels of the same kind built from the same
/// data are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    /// Compiler-generated branch target
    BranchTarget(String),
    /// Position of a bytecode instruction
    Instruction(InstRef),
    /// Entry of a called routine
    Function(MethodRef),
    /// Global backing a routine parameter
    Argument {
        /// Owning routine
        method: MethodRef,
        /// Parameter slot
        index: u16,
    },
    /// Global backing a routine local
    Local {
        /// Owning routine
        method: MethodRef,
        /// Local slot
        index: u16,
    },
    /// Static field
    Global(FieldRef),
    /// Symbol defined by the hardware header
    Predefined(String),
    /// Scratch register used by the macro library
    Reserved(u8),
    /// Global staging a routine's return value
    ReturnValue(MethodRef),
    /// Start of a ROM data block
    RomData(FieldRef),
    /// Numeric id of a type
    Type(TypeRef),
    /// Numeric id of a pointer to a type
    PointerType(TypeRef),
    /// Size of a type in bytes
    Size(TypeRef),
    /// Size of a pointer
    PointerSize(PointerWidth),
}

impl Label {
    /// Type label, choosing the pointer form for pointer types
    pub fn type_of(ty: &TypeRef) -> Label {
        if ty.is_pointer() {
            Label::PointerType(ty.element_type())
        } else {
            Label::Type(ty.clone())
        }
    }

    /// Size label, choosing the short-pointer size for pointer types
    pub fn size_of(ty: &TypeRef) -> Label {
        if ty.is_pointer() {
            Label::PointerSize(PointerWidth::Short)
        } else {
            Label::Size(ty.clone())
        }
    }

    /// Routine owning a parameter, local or return-value label
    pub fn owning_method(&self) -> Option<&MethodRef> {
        match self {
            Label::Argument { method, .. }
            | Label::Local { method, .. }
            | Label::ReturnValue(method) => Some(method),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::BranchTarget(name) => f.write_str(name),
            Label::Instruction(inst) => write!(f, "{}", inst),
            Label::Function(method) => write!(f, "FUNCTION_{}", method_part(method)),
            Label::Argument { method, index } => write!(f, "ARG_{}_{}", method_part(method), index),
            Label::Local { method, index } => write!(f, "LOCAL_{}_{}", method_part(method), index),
            Label::Global(field) => write!(f, "GLOBAL_{}", field_part(field)),
            Label::Predefined(symbol) => f.write_str(symbol),
            Label::Reserved(index) => write!(f, "INTERNAL_RESERVED_{}", index),
            Label::ReturnValue(method) => write!(f, "RETVAL_{}", method_part(method)),
            Label::RomData(field) => write!(f, "ROMDATA_{}", field_part(field)),
            Label::Type(ty) => write!(f, "TYPE_{}", type_part(ty)),
            Label::PointerType(ty) => write!(f, "TYPE_{}_PTR", type_part(ty)),
            Label::Size(ty) => write!(f, "SIZE_{}", type_part(ty)),
            Label::PointerSize(PointerWidth::Short) => f.write_str("SIZE_SHORT_POINTER"),
            Label::PointerSize(PointerWidth::Long) => f.write_str("SIZE_LONG_POINTER"),
        }
    }
}

/// Literal value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Constant {
    /// Byte rendered in decimal
    Byte(u8),
    /// Wider number rendered in decimal
    Number(u16),
    /// Address rendered as `$XX`
    Address(u16),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Byte(v) => write!(f, "{}", v),
            Constant::Number(v) => write!(f, "{}", v),
            Constant::Address(v) if *v <= 0xFF => write!(f, "${:02X}", v),
            Constant::Address(v) => write!(f, "${:04X}", v),
        }
    }
}

/// The two parallel arrays maintained by the stack tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StackArray {
    /// `STACK_TYPEOF`
    TypeOf,
    /// `STACK_SIZEOF`
    SizeOf,
}

impl fmt::Display for StackArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackArray::TypeOf => f.write_str("STACK_TYPEOF"),
            StackArray::SizeOf => f.write_str("STACK_SIZEOF"),
        }
    }
}

/// Macro operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expression {
    /// Symbolic label
    Label(Label),
    /// Literal
    Constant(Constant),
    /// `STACK_TYPEOF[i]` or `STACK_SIZEOF[i]`
    ArrayAccess {
        /// Array being indexed
        array: StackArray,
        /// Slot, 0 is the top of the stack
        index: u8,
    },
    /// Assembler function evaluated at assembly time
    Call {
        /// Function name from the macro library
        function: &'static str,
        /// Arguments
        args: Vec<Expression>,
    },
}

impl Expression {
    /// `STACK_TYPEOF[index]`
    pub fn stack_type(index: u8) -> Self {
        Expression::ArrayAccess {
            array: StackArray::TypeOf,
            index,
        }
    }

    /// `STACK_SIZEOF[index]`
    pub fn stack_size(index: u8) -> Self {
        Expression::ArrayAccess {
            array: StackArray::SizeOf,
            index,
        }
    }

    /// Labels referenced anywhere in the expression
    pub fn labels(&self) -> Vec<&Label> {
        match self {
            Expression::Label(label) => vec![label],
            Expression::Call { args, .. } => args.iter().flat_map(|a| a.labels()).collect(),
            Expression::Constant(_) | Expression::ArrayAccess { .. } => Vec::new(),
        }
    }
}

impl From<Label> for Expression {
    fn from(label: Label) -> Self {
        Expression::Label(label)
    }
}

impl From<Constant> for Expression {
    fn from(constant: Constant) -> Self {
        Expression::Constant(constant)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Label(label) => write!(f, "{}", label),
            Expression::Constant(constant) => write!(f, "{}", constant),
            Expression::ArrayAccess { array, index } => write!(f, "{}[{}]", array, index),
            Expression::Call { function, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", function, args.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main() -> MethodRef {
        MethodRef::parse("Game.Program::Main").unwrap()
    }

    #[test]
    fn test_label_rendering() {
        let score = FieldRef::parse("Game.Program::score").unwrap();
        assert_eq!(Label::Global(score.clone()).to_string(), "GLOBAL_Game_Program_score");
        assert_eq!(Label::RomData(score).to_string(), "ROMDATA_Game_Program_score");
        assert_eq!(
            Label::Local { method: main(), index: 2 }.to_string(),
            "LOCAL_Game_Program_Main_2"
        );
        assert_eq!(
            Label::Argument { method: main(), index: 0 }.to_string(),
            "ARG_Game_Program_Main_0"
        );
        assert_eq!(Label::Function(main()).to_string(), "FUNCTION_Game_Program_Main");
        assert_eq!(Label::ReturnValue(main()).to_string(), "RETVAL_Game_Program_Main");
        assert_eq!(Label::Instruction(InstRef(0x1f)).to_string(), "IL_001F");
        assert_eq!(Label::Reserved(1).to_string(), "INTERNAL_RESERVED_1");
        assert_eq!(Label::Predefined("WSYNC".into()).to_string(), "WSYNC");
    }

    #[test]
    fn test_type_labels_follow_pointers() {
        let ptr = TypeRef::new("System.Byte*");
        assert_eq!(Label::type_of(&ptr).to_string(), "TYPE_System_Byte_PTR");
        assert_eq!(Label::size_of(&ptr).to_string(), "SIZE_SHORT_POINTER");
        assert_eq!(Label::type_of(&TypeRef::byte()).to_string(), "TYPE_System_Byte");
        assert_eq!(Label::size_of(&TypeRef::byte()).to_string(), "SIZE_System_Byte");
        assert_eq!(
            Label::Type(TypeRef::new("Game.Pair`2")).to_string(),
            "TYPE_Game_Pair_2"
        );
    }

    #[test]
    fn test_labels_compare_by_value() {
        let a = Label::Local { method: main(), index: 0 };
        let b = Label::Local {
            method: MethodRef::new(TypeRef::new("Game.Program"), "Main"),
            index: 0,
        };
        assert_eq!(a, b);
        assert_ne!(a, Label::Local { method: main(), index: 1 });
    }

    #[test]
    fn test_expression_rendering() {
        let call = Expression::Call {
            function: "getAddResultType",
            args: vec![Expression::stack_type(1), Expression::stack_type(0)],
        };
        assert_eq!(
            call.to_string(),
            "getAddResultType(STACK_TYPEOF[1], STACK_TYPEOF[0])"
        );
        assert_eq!(Expression::from(Constant::Address(0x80)).to_string(), "$80");
        assert_eq!(Expression::from(Constant::Address(0xF000)).to_string(), "$F000");
        assert_eq!(Expression::from(Constant::Byte(200)).to_string(), "200");
    }
}
