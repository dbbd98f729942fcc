//! # vcsc - A Bytecode Compiler for the Atari 2600
//!
//! Compiles stack-machine bytecode (a CIL-like instruction set produced by a
//! front end) ahead of time to VIL, a macro assembly language for the 6502.
//! The output is handed to an external macro assembler, which produces the
//! cartridge image.
//!
//! ## Quick Start
//!
//! ```rust
//! use vcsc::bytecode::{Assembly, AssemblySet, FieldDef, Instruction, MethodDef, Opcode, Operand, TypeDef, TypeRef};
//! use vcsc::{CompileOptions, Compiler};
//!
//! # fn main() -> vcsc::Result<()> {
//! let program = TypeDef::new("Game.Program");
//! let score = program.field_ref("score");
//! let main = program.method_ref("Main");
//! let program = program
//!     .with_field(FieldDef::global("score", TypeRef::byte()))
//!     .with_method(MethodDef::new("Main").with_body(vec![
//!         Instruction::simple(0, Opcode::LdcI4_5),
//!         Instruction::new(1, Opcode::Stsfld, Operand::Field(score)),
//!         Instruction::simple(6, Opcode::Ret),
//!     ]));
//! let assemblies = AssemblySet::new(Assembly::new("Game").with_type(program).with_entry_point(main));
//!
//! let result = Compiler::new(CompileOptions::default()).compile(&assemblies)?;
//! assert!(result.program.contains(".assignConstantToGlobal 5, GLOBAL_Game_Program_score, SIZE_System_Byte"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Bytecode → MethodCompiler → Optimizer → StackTracker → LabelResolver → template → .asm
//! ```
//!
//! ### Main Components
//!
//! - [`bytecode`] - Input model, deserialized from JSON
//! - [`compiler::instruction`] - One handler per opcode
//! - [`compiler::optimizer`] - Windowed rewrite rules run to a fixpoint
//! - [`compiler::stack_tracker`] - Compile-time types of operand stack slots
//! - [`compiler::labels`] - Type ids, sizes and static RAM addresses
//! - [`compiler::template`] - Program layout and text rendering

pub mod bytecode;
pub mod compiler;
pub mod error;

/// Version of the compiler
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use compiler::{CompileOptions, CompileResult, Compiler, RomInfo, SourceAnnotation};
pub use error::{Error, Result};
