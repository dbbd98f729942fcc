//! Macro calls from the VIL macro library
//!
//! Each [`MacroOp`] variant is one macro. Its name, operand list and stack
//! effect are fixed by the variant, never by operand values.

use super::expression::{Constant, Expression, Label};
use crate::bytecode::{Instruction, Register, TypeRef};

/// Declared operand-stack effect of a macro
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackEffect {
    /// Entries removed
    pub pops: u8,
    /// Entries added after popping
    pub pushes: u8,
}

impl StackEffect {
    const NONE: StackEffect = StackEffect { pops: 0, pushes: 0 };

    const fn new(pops: u8, pushes: u8) -> Self {
        Self { pops, pushes }
    }

    /// Change in stack depth
    pub fn net(self) -> i32 {
        self.pushes as i32 - self.pops as i32
    }
}

/// One VIL macro with its operands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroOp {
    // Stack pushes
    /// Push a literal
    PushConstant { value: Constant, ty: Label, size: Label },
    /// Push the contents of a global
    PushGlobal { global: Label, ty: Label, size: Label },
    /// Push the address of a global
    PushAddressOfGlobal { global: Label, ty: Label, size: Label },
    /// Push the address of a local, which is then lifted to static storage
    PushAddressOfLocal { local: Label, ty: Label, size: Label },
    /// Replace a pointer on the stack with a pointer to one of its fields
    PushAddressOfField { offset: Constant, ty: Label, size: Label },
    /// Replace a pointer on the stack with the value of one of its fields
    PushFieldFromStack { offset: Constant, ty: Label, size: Label },
    /// Replace a pointer on the stack with the value it points to
    PushDereferenceFromStack { ty: Label, size: Label },
    /// Push the address of a ROM element at a constant index
    PushAddressOfRomDataElementFromConstant {
        rom_data: Label,
        ty: Label,
        size: Label,
        index: Constant,
    },
    /// Replace an index on the stack with the address of that ROM element
    PushAddressOfRomDataElementFromStack { rom_data: Label, ty: Label, size: Label },

    // Stack pops
    /// Pop into a global
    PopToGlobal { global: Label, ty: Label, size: Label },
    /// Pop a value, then a pointer, and store the value into a field
    PopToFieldFromStack { offset: Constant, ty: Label, size: Label },
    /// Pop a value, then a pointer, and store the value through the pointer
    PopToAddressFromStack { ty: Label, size: Label },
    /// Pop into a CPU register
    PopToRegister { register: Register },
    /// Discard the top of the stack
    PopStack,
    /// Strobe a hardware register
    StoreTo { symbol: Label },
    /// Zero the object a pointer on the stack points to
    InitializeObject { size: Label },

    // Arithmetic
    /// Add the two topmost entries
    AddFromStack,
    /// Subtract the top entry from the one below it
    SubFromStack,
    /// Bitwise-or the two topmost entries
    OrFromStack,
    /// Compare the two topmost entries for equality
    CompareEqualToFromStack,
    /// Duplicate the top entry
    Duplicate,

    // Control flow
    /// Unconditional jump
    Branch { target: Label },
    /// Pop and jump when non-zero
    BranchTrueFromStack { target: Label },
    /// Pop and jump when zero
    BranchFalseFromStack { target: Label },
    /// Pop two and jump when the lower is less than the top
    BranchIfLessThanFromStack { target: Label },
    /// Call a routine without a result
    CallVoid { function: Label },
    /// Reserve a result slot, then call a routine
    CallNonVoid { function: Label, ty: Label, size: Label },
    /// Return from a void routine
    ReturnVoid,
    /// Stage the top entry as the result and return
    ReturnNonVoid { retval: Label, ty: Label, size: Label },
    /// Hardware initialization at the program start
    EntryPoint,

    // Composites produced by the optimizer
    /// `pushConstant` + `popToGlobal`
    AssignConstantToGlobal { value: Constant, global: Label, size: Label },
    /// `pushGlobal` + `popToGlobal`
    CopyGlobalToGlobal {
        from: Label,
        from_size: Label,
        to: Label,
        to_size: Label,
    },
    /// `pushGlobal` + `pushConstant` + `addFromStack`, in either push order
    AddFromGlobalAndConstant {
        global: Label,
        global_type: Label,
        global_size: Label,
        value: Constant,
        constant_type: Label,
        constant_size: Label,
    },
    /// `addFromGlobalAndConstant` + `popToGlobal`
    AddFromGlobalAndConstantToGlobal {
        global: Label,
        global_type: Label,
        global_size: Label,
        value: Constant,
        constant_type: Label,
        constant_size: Label,
        target: Label,
        target_type: Label,
        target_size: Label,
    },
    /// Add one to a global in place
    IncrementGlobal { global: Label, ty: Label, size: Label },
}

fn add_result_type(first: Expression, second: Expression) -> Expression {
    Expression::Call {
        function: "getAddResultType",
        args: vec![first, second],
    }
}

fn size_of_builtin(ty: Expression) -> Expression {
    Expression::Call {
        function: "getSizeFromBuiltInType",
        args: vec![ty],
    }
}

fn binary_operands() -> Vec<Expression> {
    vec![
        Expression::stack_type(1),
        Expression::stack_size(1),
        Expression::stack_type(0),
        Expression::stack_size(0),
    ]
}

impl MacroOp {
    /// Macro name in the library
    pub fn name(&self) -> &'static str {
        match self {
            MacroOp::PushConstant { .. } => "pushConstant",
            MacroOp::PushGlobal { .. } => "pushGlobal",
            MacroOp::PushAddressOfGlobal { .. } => "pushAddressOfGlobal",
            MacroOp::PushAddressOfLocal { .. } => "pushAddressOfLocal",
            MacroOp::PushAddressOfField { .. } => "pushAddressOfField",
            MacroOp::PushFieldFromStack { .. } => "pushFieldFromStack",
            MacroOp::PushDereferenceFromStack { .. } => "pushDereferenceFromStack",
            MacroOp::PushAddressOfRomDataElementFromConstant { .. } => {
                "pushAddressOfRomDataElementFromConstant"
            }
            MacroOp::PushAddressOfRomDataElementFromStack { .. } => {
                "pushAddressOfRomDataElementFromStack"
            }
            MacroOp::PopToGlobal { .. } => "popToGlobal",
            MacroOp::PopToFieldFromStack { .. } => "popToFieldFromStack",
            MacroOp::PopToAddressFromStack { .. } => "popToAddressFromStack",
            MacroOp::PopToRegister { .. } => "popToRegister",
            MacroOp::PopStack => "popStack",
            MacroOp::StoreTo { .. } => "storeTo",
            MacroOp::InitializeObject { .. } => "initializeObject",
            MacroOp::AddFromStack => "addFromStack",
            MacroOp::SubFromStack => "subFromStack",
            MacroOp::OrFromStack => "orFromStack",
            MacroOp::CompareEqualToFromStack => "compareEqualToFromStack",
            MacroOp::Duplicate => "duplicate",
            MacroOp::Branch { .. } => "branch",
            MacroOp::BranchTrueFromStack { .. } => "branchTrueFromStack",
            MacroOp::BranchFalseFromStack { .. } => "branchFalseFromStack",
            MacroOp::BranchIfLessThanFromStack { .. } => "branchIfLessThanFromStack",
            MacroOp::CallVoid { .. } => "callVoid",
            MacroOp::CallNonVoid { .. } => "callNonVoid",
            MacroOp::ReturnVoid => "returnVoid",
            MacroOp::ReturnNonVoid { .. } => "returnNonVoid",
            MacroOp::EntryPoint => "entryPoint",
            MacroOp::AssignConstantToGlobal { .. } => "assignConstantToGlobal",
            MacroOp::CopyGlobalToGlobal { .. } => "copyGlobalToGlobal",
            MacroOp::AddFromGlobalAndConstant { .. } => "addFromGlobalAndConstant",
            MacroOp::AddFromGlobalAndConstantToGlobal { .. } => {
                "addFromGlobalAndConstantToGlobal"
            }
            MacroOp::IncrementGlobal { .. } => "incrementGlobal",
        }
    }

    /// Declared stack effect
    pub fn effect(&self) -> StackEffect {
        match self {
            MacroOp::PushConstant { .. }
            | MacroOp::PushGlobal { .. }
            | MacroOp::PushAddressOfGlobal { .. }
            | MacroOp::PushAddressOfLocal { .. }
            | MacroOp::PushAddressOfRomDataElementFromConstant { .. }
            | MacroOp::Duplicate
            | MacroOp::CallNonVoid { .. }
            | MacroOp::AddFromGlobalAndConstant { .. } => StackEffect::new(0, 1),

            MacroOp::PushAddressOfField { .. }
            | MacroOp::PushFieldFromStack { .. }
            | MacroOp::PushDereferenceFromStack { .. }
            | MacroOp::PushAddressOfRomDataElementFromStack { .. } => StackEffect::new(1, 1),

            MacroOp::PopToGlobal { .. }
            | MacroOp::PopToRegister { .. }
            | MacroOp::PopStack
            | MacroOp::InitializeObject { .. }
            | MacroOp::BranchTrueFromStack { .. }
            | MacroOp::BranchFalseFromStack { .. }
            | MacroOp::ReturnNonVoid { .. } => StackEffect::new(1, 0),

            MacroOp::PopToFieldFromStack { .. }
            | MacroOp::PopToAddressFromStack { .. }
            | MacroOp::BranchIfLessThanFromStack { .. } => StackEffect::new(2, 0),

            MacroOp::AddFromStack
            | MacroOp::SubFromStack
            | MacroOp::OrFromStack
            | MacroOp::CompareEqualToFromStack => StackEffect::new(2, 1),

            MacroOp::StoreTo { .. }
            | MacroOp::Branch { .. }
            | MacroOp::CallVoid { .. }
            | MacroOp::ReturnVoid
            | MacroOp::EntryPoint
            | MacroOp::AssignConstantToGlobal { .. }
            | MacroOp::CopyGlobalToGlobal { .. }
            | MacroOp::AddFromGlobalAndConstantToGlobal { .. }
            | MacroOp::IncrementGlobal { .. } => StackEffect::NONE,
        }
    }

    /// Type and size expressions of the pushed entry, if the macro pushes
    ///
    /// `STACK_TYPEOF[i]` here refers to the stack as it was before the macro.
    pub fn pushed(&self) -> Option<(Expression, Expression)> {
        match self {
            MacroOp::PushConstant { ty, size, .. }
            | MacroOp::PushGlobal { ty, size, .. }
            | MacroOp::PushAddressOfGlobal { ty, size, .. }
            | MacroOp::PushAddressOfLocal { ty, size, .. }
            | MacroOp::PushAddressOfField { ty, size, .. }
            | MacroOp::PushFieldFromStack { ty, size, .. }
            | MacroOp::PushDereferenceFromStack { ty, size }
            | MacroOp::PushAddressOfRomDataElementFromConstant { ty, size, .. }
            | MacroOp::PushAddressOfRomDataElementFromStack { ty, size, .. }
            | MacroOp::CallNonVoid { ty, size, .. } => {
                Some((ty.clone().into(), size.clone().into()))
            }
            MacroOp::AddFromStack | MacroOp::SubFromStack => {
                let ty = add_result_type(Expression::stack_type(1), Expression::stack_type(0));
                Some((ty.clone(), size_of_builtin(ty)))
            }
            MacroOp::OrFromStack => {
                let ty = Expression::Call {
                    function: "getBitOpResultType",
                    args: vec![Expression::stack_type(1), Expression::stack_type(0)],
                };
                Some((ty.clone(), size_of_builtin(ty)))
            }
            MacroOp::CompareEqualToFromStack => Some((
                Label::Type(TypeRef::boolean()).into(),
                Label::Size(TypeRef::boolean()).into(),
            )),
            MacroOp::Duplicate => Some((Expression::stack_type(0), Expression::stack_size(0))),
            MacroOp::AddFromGlobalAndConstant {
                global_type,
                constant_type,
                ..
            } => {
                let ty = add_result_type(global_type.clone().into(), constant_type.clone().into());
                Some((ty.clone(), size_of_builtin(ty)))
            }
            _ => None,
        }
    }

    /// Operands in the order the macro declares them
    pub fn parameters(&self) -> Vec<Expression> {
        use Expression as E;
        match self {
            MacroOp::PushConstant { value, ty, size } => {
                vec![E::from(*value), ty.clone().into(), size.clone().into()]
            }
            MacroOp::PushGlobal { global, ty, size }
            | MacroOp::PushAddressOfGlobal { global, ty, size }
            | MacroOp::PushAddressOfLocal { local: global, ty, size }
            | MacroOp::IncrementGlobal { global, ty, size } => {
                vec![global.clone().into(), ty.clone().into(), size.clone().into()]
            }
            MacroOp::PushAddressOfField { offset, ty, size } => {
                vec![E::from(*offset), ty.clone().into(), size.clone().into()]
            }
            MacroOp::PushFieldFromStack { offset, ty, size }
            | MacroOp::PopToFieldFromStack { offset, ty, size } => vec![
                E::from(*offset),
                ty.clone().into(),
                size.clone().into(),
                E::stack_type(0),
                E::stack_size(0),
            ],
            MacroOp::PushDereferenceFromStack { ty, size }
            | MacroOp::PopToAddressFromStack { ty, size } => {
                vec![ty.clone().into(), size.clone().into()]
            }
            MacroOp::PushAddressOfRomDataElementFromConstant {
                rom_data,
                ty,
                size,
                index,
            } => vec![
                rom_data.clone().into(),
                ty.clone().into(),
                size.clone().into(),
                E::from(*index),
            ],
            MacroOp::PushAddressOfRomDataElementFromStack { rom_data, ty, size } => {
                vec![rom_data.clone().into(), ty.clone().into(), size.clone().into()]
            }
            MacroOp::PopToGlobal { global, ty, size } => vec![
                global.clone().into(),
                ty.clone().into(),
                size.clone().into(),
                E::stack_type(0),
                E::stack_size(0),
            ],
            MacroOp::PopToRegister { register } => vec![
                E::from(Constant::Byte(register.index())),
                E::stack_size(0),
            ],
            MacroOp::PopStack => vec![E::stack_size(0)],
            MacroOp::StoreTo { symbol } => vec![symbol.clone().into()],
            MacroOp::InitializeObject { size } => vec![size.clone().into(), E::stack_size(0)],
            MacroOp::AddFromStack
            | MacroOp::SubFromStack
            | MacroOp::OrFromStack
            | MacroOp::CompareEqualToFromStack => binary_operands(),
            MacroOp::Duplicate => vec![E::stack_type(0), E::stack_size(0)],
            MacroOp::Branch { target }
            | MacroOp::BranchTrueFromStack { target }
            | MacroOp::BranchFalseFromStack { target }
            | MacroOp::BranchIfLessThanFromStack { target } => vec![target.clone().into()],
            MacroOp::CallVoid { function } => vec![function.clone().into()],
            MacroOp::CallNonVoid { function, ty, size } => {
                vec![function.clone().into(), ty.clone().into(), size.clone().into()]
            }
            MacroOp::ReturnNonVoid { retval, ty, size } => {
                vec![retval.clone().into(), ty.clone().into(), size.clone().into()]
            }
            MacroOp::ReturnVoid | MacroOp::EntryPoint => Vec::new(),
            MacroOp::AssignConstantToGlobal {
                value,
                global,
                size,
            } => vec![E::from(*value), global.clone().into(), size.clone().into()],
            MacroOp::CopyGlobalToGlobal {
                from,
                from_size,
                to,
                to_size,
            } => vec![
                from.clone().into(),
                from_size.clone().into(),
                to.clone().into(),
                to_size.clone().into(),
            ],
            MacroOp::AddFromGlobalAndConstant {
                global,
                global_type,
                global_size,
                value,
                constant_type,
                constant_size,
            } => vec![
                global.clone().into(),
                global_type.clone().into(),
                global_size.clone().into(),
                E::from(*value),
                constant_type.clone().into(),
                constant_size.clone().into(),
            ],
            MacroOp::AddFromGlobalAndConstantToGlobal {
                global,
                global_type,
                global_size,
                value,
                constant_type,
                constant_size,
                target,
                target_type,
                target_size,
            } => vec![
                global.clone().into(),
                global_type.clone().into(),
                global_size.clone().into(),
                E::from(*value),
                constant_type.clone().into(),
                constant_size.clone().into(),
                target.clone().into(),
                target_type.clone().into(),
                target_size.clone().into(),
            ],
        }
    }

    /// Whether control may not fall through to the next entry
    pub fn ends_block(&self) -> bool {
        matches!(
            self,
            MacroOp::Branch { .. }
                | MacroOp::BranchTrueFromStack { .. }
                | MacroOp::BranchFalseFromStack { .. }
                | MacroOp::BranchIfLessThanFromStack { .. }
                | MacroOp::ReturnVoid
                | MacroOp::ReturnNonVoid { .. }
        )
    }

    /// Branch target, if the macro jumps
    pub fn branch_target(&self) -> Option<&Label> {
        match self {
            MacroOp::Branch { target }
            | MacroOp::BranchTrueFromStack { target }
            | MacroOp::BranchFalseFromStack { target }
            | MacroOp::BranchIfLessThanFromStack { target } => Some(target),
            _ => None,
        }
    }
}

/// A macro invocation together with the instructions it was derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroCall {
    /// The macro and its operands
    pub op: MacroOp,
    /// Source instructions, in order
    pub instructions: Vec<Instruction>,
}

impl MacroCall {
    /// Creates a call derived from one instruction
    pub fn new(op: MacroOp, instruction: &Instruction) -> Self {
        Self {
            op,
            instructions: vec![instruction.clone()],
        }
    }

    /// Creates a call derived from several instructions, kept in order
    pub fn merged<'a>(op: MacroOp, sources: impl IntoIterator<Item = &'a Instruction>) -> Self {
        Self {
            op,
            instructions: sources.into_iter().cloned().collect(),
        }
    }

    /// Creates a call with no source instruction
    pub fn synthetic(op: MacroOp) -> Self {
        Self {
            op,
            instructions: Vec::new(),
        }
    }
}
