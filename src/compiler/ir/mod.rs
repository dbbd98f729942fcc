//! # Intermediate Representation (IR) for VIL Emission
//!
//! Routines compile to a flat stream of [`AssemblyEntry`] values. Entries are
//! produced by the instruction compiler, replaced (never mutated) by the
//! optimizer, annotated by the stack tracker and finally rendered as VIL
//! macro assembly.
//!
//! ## Module Structure
//!
//! ```text
//! ir/
//! ├── mod.rs          # This file - module definition and re-exports
//! ├── expression.rs   # Label, Constant, Expression, name mangling
//! ├── macros.rs       # MacroOp (one variant per VIL macro), StackEffect
//! └── entry.rs        # AssemblyEntry, PseudoOp, Preprocessed, Function
//! ```
//!
//! ## Entry Kinds
//!
//! | Kind | Rendered as |
//! |------|-------------|
//! | Macro | `.pushConstant 5, TYPE_System_Byte, SIZE_System_Byte` |
//! | Label | `IL_0004` |
//! | Pseudo-op | `.block`, `.byte $0A`, `* = $F000`, `.let STACK_TYPEOF = [...]` |
//! | Preprocessed | never rendered; consumed by mandatory rewrite rules |
//! | Inline assembly | the user's lines, verbatim |
//!
//! Every macro declares a constant stack effect. The stack tracker relies on
//! that to model the operand stack without executing anything.

mod entry;
mod expression;
mod macros;

pub use entry::{AssemblyEntry, Function, PseudoOp, Preprocessed};
pub use expression::{mangle, Constant, Expression, Label, PointerWidth, StackArray};
pub use macros::{MacroCall, MacroOp, StackEffect};
