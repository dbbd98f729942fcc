//! # Bytecode Input Model
//!
//! The front end lowers source programs to a stack-machine instruction stream
//! and describes every type, field and method it references. This module is
//! the compiler's view of that output:
//!
//! - [`Opcode`], [`Operand`], [`Instruction`]: the instruction stream
//! - [`TypeDef`], [`FieldDef`], [`MethodDef`], [`CallMarker`]: declarations
//! - [`AssemblySet`]: the user program plus the built-in framework
//! - [`TypeRef`], [`FieldRef`], [`MethodRef`], [`InstRef`]: value-equality
//!   references that the IR stores instead of front-end handles
//!
//! Everything here deserializes from JSON.

pub mod framework;
pub mod metadata;
pub mod opcode;
pub mod refs;

pub use metadata::{
    Assembly, AssemblySet, CallMarker, FieldDef, Intrinsic, MethodDef, Parameter, Register,
    RomData, TypeDef,
};
pub use opcode::{Instruction, Opcode, Operand};
pub use refs::{FieldRef, InstRef, MethodRef, TypeRef};
