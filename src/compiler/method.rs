//! Compiles one routine body from bytecode to a finished entry stream

use super::instruction::InstructionCompiler;
use super::ir::{mangle, AssemblyEntry, Function, Label, MacroCall, MacroOp, PseudoOp};
use super::optimizer::Optimizer;
use super::stack_tracker::StackTracker;
use super::CompileContext;
use crate::bytecode::{InstRef, MethodRef};
use crate::error::Result;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Called with `callVoid`/`callNonVoid`
    Routine,
    /// The program entry point
    EntryPoint,
    /// Spliced into a caller
    Inline,
}

/// Drives instruction selection, optimization and stack tracking for a routine
pub struct MethodCompiler<'a> {
    ctx: CompileContext<'a>,
}

impl<'a> MethodCompiler<'a> {
    /// Creates a method compiler
    pub fn new(ctx: CompileContext<'a>) -> Self {
        Self { ctx }
    }

    /// Compiles a routine reached through a normal call
    pub fn compile(&self, method: &MethodRef) -> Result<Function> {
        self.compile_with(method, Mode::Routine, &[])
    }

    /// Compiles the entry point, with every static initializer spliced in front
    pub fn compile_entry_point(&self, method: &MethodRef) -> Result<Function> {
        self.compile_with(method, Mode::EntryPoint, &[])
    }

    /// Compiles a body for splicing into a caller; `chain` is the inline chain so far
    pub fn compile_inline(&self, method: &MethodRef, chain: &[MethodRef]) -> Result<Function> {
        self.compile_with(method, Mode::Inline, chain)
    }

    fn compile_with(&self, method: &MethodRef, mode: Mode, chain: &[MethodRef]) -> Result<Function> {
        let def = self.ctx.assemblies.find_method(method)?;
        debug!(method = %method, ?mode, instructions = def.body.len(), "Compiling method");

        let mut chain = chain.to_vec();
        chain.push(method.clone());

        // Phase 1: Instruction selection
        let targets: HashSet<InstRef> = def.body.iter().filter_map(|i| i.branch_target()).collect();
        let mut compiler = InstructionCompiler::new(self.ctx, method.clone(), def, &chain);
        let mut body = Vec::new();
        for instruction in &def.body {
            if targets.contains(&instruction.inst_ref()) {
                body.push(AssemblyEntry::Label(Label::Instruction(instruction.inst_ref())));
            }
            body.extend(compiler.compile(instruction)?);
        }
        let mut lifted_locals = compiler.into_lifted_locals();

        // Phase 2: Inline wrapping
        if mode == Mode::Inline {
            body = wrap_inline(method, body);
        }

        // Phase 3: Static initializers
        if mode == Mode::EntryPoint {
            let (prefix, lifted) = self.static_initializers(&chain)?;
            lifted_locals.extend(lifted);
            body.splice(0..0, prefix);
        }

        // Phase 4: Optimization
        let mut body = Optimizer::new(self.ctx).optimize(method, body)?;

        // Phase 5: Stack tracking, owned by the caller for inlined bodies
        if mode != Mode::Inline {
            body = StackTracker::track(body)?;
            body.insert(0, AssemblyEntry::Label(Label::Function(method.clone())));
        }

        // Phase 6: Framing
        let what = match mode {
            Mode::Inline => format!("inline call of {}", method),
            _ => method.to_string(),
        };
        body.insert(0, AssemblyEntry::comment(format!("Begin {}", what)));
        body.push(AssemblyEntry::comment(format!("End {}", what)));
        body.push(AssemblyEntry::EndFunction);

        debug!(method = %method, entries = body.len(), "Compiled method");
        Ok(Function {
            method: method.clone(),
            body,
            lifted_locals,
        })
    }

    /// Entry-point marker followed by every inlined static initializer
    ///
    /// Initializers are spliced in no particular order.
    fn static_initializers(&self, chain: &[MethodRef]) -> Result<(Vec<AssemblyEntry>, BTreeSet<Label>)> {
        let mut prefix = vec![AssemblyEntry::synthetic(MacroOp::EntryPoint)];
        let mut lifted = BTreeSet::new();
        for initializer in self.ctx.assemblies.static_initializers() {
            let inlined = self.compile_inline(&initializer, chain)?;
            prefix.push(AssemblyEntry::InlineFunction {
                method: initializer,
                call_site: None,
            });
            prefix.extend(inlined.body);
            lifted.extend(inlined.lifted_locals);
        }
        Ok((prefix, lifted))
    }
}

/// Scopes an inlined body in a block and turns every return into a jump to its end
fn wrap_inline(method: &MethodRef, body: Vec<AssemblyEntry>) -> Vec<AssemblyEntry> {
    let end = Label::BranchTarget(format!("INLINE_RET_{}", mangle(&method.full_name())));

    let mut wrapped = Vec::with_capacity(body.len() + 3);
    wrapped.push(AssemblyEntry::PseudoOp(PseudoOp::BeginBlock));
    wrapped.extend(body.into_iter().map(|entry| match entry {
        AssemblyEntry::Macro(MacroCall {
            op: MacroOp::ReturnVoid,
            instructions,
        }) => AssemblyEntry::Macro(MacroCall {
            op: MacroOp::Branch { target: end.clone() },
            instructions,
        }),
        other => other,
    }));
    wrapped.push(AssemblyEntry::Label(end));
    wrapped.push(AssemblyEntry::PseudoOp(PseudoOp::EndBlock));
    wrapped
}
