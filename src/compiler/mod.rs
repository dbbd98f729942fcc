//! # VCS Compiler - Bytecode to VIL Macro Assembly
//!
//! This module compiles a set of bytecode assemblies to a single program in
//! the VIL macro language, ready for a 6502 macro assembler targeting the
//! Atari 2600.
//!
//! ## Architecture
//!
//! ```text
//! Bytecode → Instruction selection → Optimize → Stack tracking
//!          → Label resolution → Template → .asm → (assembler) → .bin
//! ```
//!
//! The entry point is compiled first. Every routine it calls (directly or
//! through other routines) is then compiled once, in discovery order.
//!
//! ## Usage
//!
//! ```ignore
//! use vcsc::bytecode::{Assembly, AssemblySet};
//! use vcsc::compiler::{CompileOptions, Compiler};
//!
//! let user = Assembly::from_json(&std::fs::read_to_string("game.json")?)?;
//! let compiler = Compiler::new(CompileOptions::default());
//! let result = compiler.compile(&AssemblySet::new(user))?;
//! print!("{}", result.program);
//! ```

pub mod assembler;
pub mod cfg;
pub mod instruction;
pub mod ir;
pub mod labels;
pub mod layout;
pub mod memory;
pub mod method;
pub mod optimizer;
pub mod stack_tracker;
pub mod template;

pub use assembler::{Artifacts, RomInfo};
pub use cfg::ControlFlowGraph;
pub use ir::{AssemblyEntry, Function, Label};
pub use labels::{LabelResolver, ResolvedLabels};
pub use memory::MemoryLayout;
pub use method::MethodCompiler;
pub use optimizer::Optimizer;
pub use template::SourceAnnotation;

use crate::bytecode::{AssemblySet, MethodRef};
use crate::error::Result;
use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use tracing::{debug, info};

/// Compilation options
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Binary path; the `.asm`, `.lst` and `.sym` paths are derived from it
    pub output_path: Option<PathBuf>,
    /// Skip every optional rewrite rule
    pub disable_optimizations: bool,
    /// Optional rewrite rules to skip, by name
    pub disabled_rules: Vec<String>,
    /// Inline every call to a routine that allows it
    pub inline_all_calls: bool,
    /// What to print above each macro
    pub source_annotations: SourceAnnotation,
    /// RAM available to globals, parameters and locals
    pub memory: MemoryLayout,
    /// External assembler; without one the build stops after writing `.asm`
    pub assembler_path: Option<PathBuf>,
    /// Opened on the `.asm` file after a build
    pub text_editor_path: Option<PathBuf>,
    /// Opened on the binary after a successful build
    pub emulator_path: Option<PathBuf>,
    /// Add a `Generated on <date>` header
    pub emit_timestamp: bool,
}

/// What the compiler sees while working on one program
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub assemblies: &'a AssemblySet,
    pub options: &'a CompileOptions,
}

/// Compilation result with metadata
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// The entry point, static initializers included
    pub entry_point: Function,
    /// Every other reachable routine, in discovery order
    pub functions: Vec<Function>,
    /// Label assignments and RAM placements
    pub labels: ResolvedLabels,
    /// Whole program as one entry stream
    pub entries: Vec<AssemblyEntry>,
    /// Rendered program text
    pub program: String,
    /// Basic blocks per routine, entry point first
    pub block_counts: Vec<(MethodRef, usize)>,
}

impl CompileResult {
    /// Entry point followed by every other routine
    pub fn all_functions(&self) -> impl Iterator<Item = &Function> {
        std::iter::once(&self.entry_point).chain(self.functions.iter())
    }
}

/// Bytecode to VIL compiler
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    /// Create a new compiler with options
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile a program to VIL text without touching the file system
    pub fn compile(&self, assemblies: &AssemblySet) -> Result<CompileResult> {
        let ctx = CompileContext {
            assemblies,
            options: &self.options,
        };
        let methods = MethodCompiler::new(ctx);

        // Phase 1: Entry point
        let entry = assemblies.entry_point()?;
        info!(entry_point = %entry, "Compiling program");
        let entry_point = methods.compile_entry_point(&entry)?;

        // Phase 2: Every routine reachable through calls
        let mut seen: HashSet<MethodRef> = HashSet::from([entry.clone()]);
        let mut queue: VecDeque<MethodRef> = VecDeque::new();
        enqueue_callees(&entry_point, &mut seen, &mut queue);
        let mut functions = Vec::new();
        while let Some(method) = queue.pop_front() {
            let function = methods.compile(&method)?;
            enqueue_callees(&function, &mut seen, &mut queue);
            functions.push(function);
        }
        debug!(routines = functions.len() + 1, "Compiled reachable routines");

        let all: Vec<Function> = std::iter::once(entry_point.clone()).chain(functions.iter().cloned()).collect();

        // Phase 3: Labels and RAM
        let labels = LabelResolver::new(assemblies, self.options.memory).resolve(&all)?;
        info!(
            assignments = labels.assignments.len(),
            next_free = labels.next_free,
            "Resolved labels"
        );

        // Phase 4: Program text
        let rom_blocks = template::RomBlock::collect(assemblies, &all)?;
        let timestamp = self.options.emit_timestamp.then(|| chrono::Local::now().to_rfc2822());
        let entries = template::program(
            &entry_point,
            &functions,
            &labels.assignments,
            &rom_blocks,
            timestamp.as_deref(),
        );
        let program = template::render(&entries, self.options.source_annotations);

        let block_counts = all
            .iter()
            .map(|f| (f.method.clone(), ControlFlowGraph::build(&f.body).len()))
            .collect();

        Ok(CompileResult {
            entry_point,
            functions,
            labels,
            entries,
            program,
            block_counts,
        })
    }

    /// Compile, write the program, then run the assembler and any configured tools
    ///
    /// Without an output path the files go to the system temporary directory.
    pub fn build(&self, assemblies: &AssemblySet) -> Result<(CompileResult, RomInfo)> {
        let result = self.compile(assemblies)?;

        let rom = match &self.options.output_path {
            Some(path) => path.clone(),
            None => std::env::temp_dir().join(format!("{}.bin", ir::mangle(&assemblies.user().name))),
        };
        let artifacts = Artifacts::for_rom(rom);
        assembler::write_program(&result.program, &artifacts)?;
        info!(path = %artifacts.assembly.display(), "Wrote program");

        let rom_info = match &self.options.assembler_path {
            Some(assembler_path) => assembler::assemble(assembler_path, &artifacts)?,
            None => RomInfo::unassembled(artifacts.assembly.clone()),
        };

        if let Some(editor) = &self.options.text_editor_path {
            assembler::launch(editor, &rom_info.assembly_path);
        }
        if let (Some(emulator), Some(rom)) = (&self.options.emulator_path, &rom_info.rom_path) {
            assembler::launch(emulator, rom);
        }

        Ok((result, rom_info))
    }
}

fn enqueue_callees(function: &Function, seen: &mut HashSet<MethodRef>, queue: &mut VecDeque<MethodRef>) {
    for label in function.referenced_labels() {
        if let Label::Function(callee) = label {
            if seen.insert(callee.clone()) {
                queue.push_back(callee.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Assembly, Instruction, MethodDef, Opcode, Operand, TypeDef, TypeRef};

    fn program() -> AssemblySet {
        let ty = TypeDef::new("Game.Program");
        let main = ty.method_ref("Main");
        let helper = ty.method_ref("Helper");
        let leaf = ty.method_ref("Leaf");
        let ty = ty
            .with_method(MethodDef::new("Main").with_body(vec![
                Instruction::new(0, Opcode::Call, Operand::Method(helper.clone())),
                Instruction::new(5, Opcode::Call, Operand::Method(helper)),
                Instruction::simple(10, Opcode::Ret),
            ]))
            .with_method(MethodDef::new("Helper").with_body(vec![
                Instruction::new(0, Opcode::Call, Operand::Method(leaf)),
                Instruction::simple(5, Opcode::Ret),
            ]))
            .with_method(MethodDef::new("Leaf").with_body(vec![Instruction::simple(0, Opcode::Ret)]))
            .with_method(MethodDef::new("Unused").returning(TypeRef::byte()));
        AssemblySet::new(Assembly::new("Game").with_type(ty).with_entry_point(main))
    }

    #[test]
    fn test_reachable_routines_in_discovery_order() {
        let result = Compiler::new(CompileOptions::default()).compile(&program()).unwrap();
        let names: Vec<String> = result.functions.iter().map(|f| f.method.to_string()).collect();
        assert_eq!(names, ["Game.Program::Helper", "Game.Program::Leaf"]);
        assert_eq!(result.block_counts.len(), 3);
        assert!(result.program.contains(".callVoid FUNCTION_Game_Program_Helper"));
        assert!(!result.program.contains("Unused"));
    }

    #[test]
    fn test_options_from_partial_json() {
        let options: CompileOptions =
            serde_json::from_str(r#"{"disabled_rules": ["increment_global"], "source_annotations": "bytecode"}"#)
                .unwrap();
        assert_eq!(options.disabled_rules, ["increment_global"]);
        assert_eq!(options.source_annotations, SourceAnnotation::Bytecode);
        assert_eq!(options.memory, MemoryLayout::default());
        assert!(!options.emit_timestamp);
    }

    #[test]
    fn test_build_without_assembler_writes_program() {
        let dir = tempfile::tempdir().unwrap();
        let options = CompileOptions {
            output_path: Some(dir.path().join("game.bin")),
            ..CompileOptions::default()
        };
        let (result, info) = Compiler::new(options).build(&program()).unwrap();
        assert!(!info.is_successful);
        assert_eq!(info.assembly_path, dir.path().join("game.asm"));
        assert_eq!(std::fs::read_to_string(&info.assembly_path).unwrap(), result.program);
    }
}
