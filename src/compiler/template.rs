//! Program layout and text rendering
//!
//! A program is the entry point followed by every other routine, the ROM
//! data blocks, and the reset/interrupt vectors:
//!
//! ```text
//! // Generated on <date>         (optional)
//! .cpu "6502"
//! * = $F000
//! .include "vcs.h"
//! .include "vil.h"
//! <label assignments>
//! START
//! <entry point body>
//! <other routines>
//! <ROM data blocks>
//! * = $FFFC
//! .word START
//! .word START
//! ```

use super::ir::{AssemblyEntry, Function, Label, PseudoOp};
use crate::bytecode::{AssemblySet, FieldRef};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Origin of the cartridge ROM
pub const ROM_ORIGIN: u16 = 0xF000;
/// Location of the reset vector
pub const VECTORS_ORIGIN: u16 = 0xFFFC;
/// Label the reset vector points at
pub const START_LABEL: &str = "START";

const INDENT: &str = "    ";

/// What to print above each macro
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceAnnotation {
    /// Nothing
    #[default]
    None,
    /// The bytecode instructions the macro came from
    Bytecode,
}

/// Bytes backing one ROM data field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomBlock {
    pub field: FieldRef,
    pub bytes: Vec<u8>,
}

impl RomBlock {
    /// Collects the ROM data referenced by `functions`, first reference first
    pub fn collect(assemblies: &AssemblySet, functions: &[Function]) -> Result<Vec<RomBlock>> {
        let mut seen = BTreeSet::new();
        let mut blocks = Vec::new();
        for label in functions.iter().flat_map(|f| f.referenced_labels()) {
            let Label::RomData(field) = label else { continue };
            if !seen.insert(field.clone()) {
                continue;
            }
            let bytes = assemblies
                .find_field(field)?
                .rom_data
                .as_ref()
                .map(|rom| rom.bytes.clone())
                .unwrap_or_default();
            blocks.push(RomBlock {
                field: field.clone(),
                bytes,
            });
        }
        Ok(blocks)
    }
}

/// Builds the whole program as one entry stream
///
/// `timestamp` becomes a leading comment when present.
pub fn program(
    entry_point: &Function,
    functions: &[Function],
    label_assignments: &[AssemblyEntry],
    rom_blocks: &[RomBlock],
    timestamp: Option<&str>,
) -> Vec<AssemblyEntry> {
    let mut program = Vec::new();
    if let Some(timestamp) = timestamp {
        program.push(AssemblyEntry::comment(format!("Generated on {}", timestamp)));
        program.push(AssemblyEntry::Blank);
    }

    program.extend([
        AssemblyEntry::PseudoOp(PseudoOp::Cpu("6502".into())),
        AssemblyEntry::PseudoOp(PseudoOp::ProgramCounter(ROM_ORIGIN)),
        AssemblyEntry::Blank,
        AssemblyEntry::PseudoOp(PseudoOp::Include("vcs.h".into())),
        AssemblyEntry::PseudoOp(PseudoOp::Include("vil.h".into())),
        AssemblyEntry::Blank,
    ]);
    program.extend(label_assignments.iter().cloned());
    program.push(AssemblyEntry::Blank);

    program.push(AssemblyEntry::Label(Label::Predefined(START_LABEL.into())));
    program.extend(entry_point.body.iter().cloned());
    for function in functions {
        program.push(AssemblyEntry::Blank);
        program.extend(function.body.iter().cloned());
    }

    for block in rom_blocks {
        program.push(AssemblyEntry::Blank);
        program.push(AssemblyEntry::Label(Label::RomData(block.field.clone())));
        program.extend(block.bytes.iter().map(|&b| AssemblyEntry::PseudoOp(PseudoOp::Byte(b))));
    }

    let start = Label::Predefined(START_LABEL.into());
    program.extend([
        AssemblyEntry::Blank,
        AssemblyEntry::PseudoOp(PseudoOp::ProgramCounter(VECTORS_ORIGIN)),
        AssemblyEntry::PseudoOp(PseudoOp::Word(start.clone())),
        AssemblyEntry::PseudoOp(PseudoOp::Word(start)),
    ]);
    program
}

/// Renders an entry stream as assembler source
///
/// Labels sit in column 0. Everything else is indented one level per open
/// routine: a function label or inline marker opens one, `EndFunction`
/// closes it.
pub fn render(entries: &[AssemblyEntry], annotation: SourceAnnotation) -> String {
    let mut out = String::new();
    let mut depth = 0usize;

    for entry in entries {
        match entry {
            AssemblyEntry::EndFunction => {
                depth = depth.saturating_sub(1);
            }
            AssemblyEntry::Blank => out.push('\n'),
            AssemblyEntry::Label(label) => {
                let _ = writeln!(out, "{}", label);
                if matches!(label, Label::Function(_)) {
                    depth += 1;
                }
            }
            AssemblyEntry::InlineFunction { .. } => {
                line(&mut out, depth, &entry.to_string());
                depth += 1;
            }
            AssemblyEntry::InlineAssembly(lines) => {
                for text in lines {
                    line(&mut out, depth, text);
                }
            }
            AssemblyEntry::Macro(call) => {
                if annotation == SourceAnnotation::Bytecode {
                    for instruction in &call.instructions {
                        line(&mut out, depth, &format!("// {}", instruction));
                    }
                }
                line(&mut out, depth, &entry.to_string());
            }
            _ => line(&mut out, depth, &entry.to_string()),
        }
    }
    out
}

fn line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(text);
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Instruction, MethodRef, Opcode, TypeRef};
    use crate::compiler::ir::{Constant, Expression, MacroOp};
    use std::collections::BTreeSet;

    fn main_function() -> Function {
        let main = MethodRef::parse("Game.Program::Main").unwrap();
        Function {
            method: main.clone(),
            body: vec![
                AssemblyEntry::Label(Label::Function(main)),
                AssemblyEntry::instr(
                    MacroOp::AssignConstantToGlobal {
                        value: Constant::Byte(5),
                        global: Label::Global(FieldRef::parse("Game.Program::score").unwrap()),
                        size: Label::Size(TypeRef::byte()),
                    },
                    &Instruction::simple(0, Opcode::LdcI4_5),
                ),
                AssemblyEntry::synthetic(MacroOp::ReturnVoid),
                AssemblyEntry::EndFunction,
            ],
            lifted_locals: BTreeSet::new(),
        }
    }

    #[test]
    fn test_program_layout() {
        let assign = AssemblyEntry::PseudoOp(PseudoOp::LabelAssign(
            Label::Global(FieldRef::parse("Game.Program::score").unwrap()),
            Expression::Constant(Constant::Address(0x82)),
        ));
        let rom = RomBlock {
            field: FieldRef::parse("Game.Program::Sprite").unwrap(),
            bytes: vec![0x18, 0x3C],
        };
        let text = render(
            &program(&main_function(), &[], &[assign], &[rom], Some("today")),
            SourceAnnotation::None,
        );
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "// Generated on today");
        assert_eq!(lines[2], ".cpu \"6502\"");
        assert_eq!(lines[3], "* = $F000");
        assert!(lines.contains(&".include \"vil.h\""));
        assert!(lines.contains(&"GLOBAL_Game_Program_score = $82"));

        let start = lines.iter().position(|l| *l == "START").unwrap();
        assert_eq!(lines[start + 1], "FUNCTION_Game_Program_Main");
        assert_eq!(
            lines[start + 2],
            "    .assignConstantToGlobal 5, GLOBAL_Game_Program_score, SIZE_System_Byte"
        );

        let rom = lines.iter().position(|l| *l == "ROMDATA_Game_Program_Sprite").unwrap();
        assert_eq!(lines[rom + 1], ".byte $18");
        assert_eq!(lines[rom + 2], ".byte $3C");
        assert!(rom > start);

        assert_eq!(lines[lines.len() - 3..], ["* = $FFFC", ".word START", ".word START"]);
    }

    #[test]
    fn test_no_timestamp_without_request() {
        let text = render(&program(&main_function(), &[], &[], &[], None), SourceAnnotation::None);
        assert!(text.starts_with(".cpu \"6502\"\n"));
    }

    #[test]
    fn test_bytecode_annotations() {
        let text = render(&main_function().body, SourceAnnotation::Bytecode);
        assert!(text.contains("    // IL_0000: ldc.i4.5\n    .assignConstantToGlobal"));
        // Synthetic macros carry no annotation.
        assert!(text.ends_with(".assignConstantToGlobal 5, GLOBAL_Game_Program_score, SIZE_System_Byte\n    .returnVoid\n"));
    }

    #[test]
    fn test_inline_bodies_nest() {
        let callee = MethodRef::parse("Game.Program::Helper").unwrap();
        let entries = vec![
            AssemblyEntry::Label(Label::Function(MethodRef::parse("Game.Program::Main").unwrap())),
            AssemblyEntry::InlineFunction {
                method: callee,
                call_site: None,
            },
            AssemblyEntry::PseudoOp(PseudoOp::BeginBlock),
            AssemblyEntry::PseudoOp(PseudoOp::EndBlock),
            AssemblyEntry::EndFunction,
            AssemblyEntry::synthetic(MacroOp::ReturnVoid),
            AssemblyEntry::EndFunction,
            AssemblyEntry::comment("after"),
        ];
        let text = render(&entries, SourceAnnotation::None);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "    // Inline Game.Program::Helper");
        assert_eq!(lines[2], "        .block");
        assert_eq!(lines[4], "    .returnVoid");
        assert_eq!(lines[5], "// after");
    }
}
