//! # Rewrite-rule optimizer
//!
//! A rule looks at a fixed-size window of consecutive entries and either
//! replaces the whole window or leaves it alone. Two rule lists run in order:
//! - Mandatory rules consume preprocessed markers and must always run
//! - Optional rules fuse common macro sequences into cheaper composites
//!
//! One pass runs every rule over the whole stream. Passes repeat until a pass
//! leaves the stream unchanged.

use super::ir::{AssemblyEntry, Constant, Label, MacroCall, MacroOp, PointerWidth, Preprocessed};
use super::layout::LayoutTable;
use super::CompileContext;
use crate::bytecode::{AssemblySet, FieldRef, Instruction, MethodRef, TypeRef};
use crate::error::{Error, Result};
use tracing::{debug, trace};

/// State a rule may consult while matching
pub struct RuleContext<'a> {
    assemblies: &'a AssemblySet,
    layouts: LayoutTable<'a>,
}

type Apply = fn(&mut RuleContext<'_>, &[&AssemblyEntry]) -> Result<Option<Vec<AssemblyEntry>>>;

/// A named rewrite over a window of entries
#[derive(Clone, Copy)]
pub struct Rule {
    /// Name used to disable the rule
    pub name: &'static str,
    /// Number of entries inspected
    pub window: usize,
    apply: Apply,
}

const MANDATORY_RULES: &[Rule] = &[
    Rule {
        name: "inline_assembly",
        window: 2,
        apply: inline_assembly,
    },
    Rule {
        name: "rom_data_length",
        window: 2,
        apply: rom_data_length,
    },
    Rule {
        name: "rom_data_stride",
        window: 2,
        apply: rom_data_stride,
    },
    Rule {
        name: "rom_data_element_from_constant",
        window: 3,
        apply: rom_data_element_from_constant,
    },
    Rule {
        name: "rom_data_element_from_stack",
        window: 3,
        apply: rom_data_element_from_stack,
    },
];

const OPTIONAL_RULES: &[Rule] = &[
    Rule {
        name: "assign_constant_to_global",
        window: 2,
        apply: assign_constant_to_global,
    },
    Rule {
        name: "copy_global_to_global",
        window: 2,
        apply: copy_global_to_global,
    },
    Rule {
        name: "add_from_global_and_constant",
        window: 3,
        apply: add_from_global_and_constant,
    },
    Rule {
        name: "add_from_global_and_constant_to_global",
        window: 2,
        apply: add_from_global_and_constant_to_global,
    },
    Rule {
        name: "increment_global",
        window: 1,
        apply: increment_global,
    },
    Rule {
        name: "remove_branch_to_next",
        window: 2,
        apply: remove_branch_to_next,
    },
];

/// Names of every rule that can be disabled
pub fn optional_rule_names() -> impl Iterator<Item = &'static str> {
    OPTIONAL_RULES.iter().map(|r| r.name)
}

/// Arena-backed singly linked list; splicing a window is O(1) in the list
struct EntryList {
    nodes: Vec<Node>,
    head: Option<usize>,
}

struct Node {
    entry: AssemblyEntry,
    next: Option<usize>,
}

impl EntryList {
    fn new(entries: Vec<AssemblyEntry>) -> Self {
        let count = entries.len();
        let nodes = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| Node {
                entry,
                next: (i + 1 < count).then_some(i + 1),
            })
            .collect();
        Self {
            nodes,
            head: (count > 0).then_some(0),
        }
    }

    fn next(&self, index: usize) -> Option<usize> {
        self.nodes[index].next
    }

    /// Indices of `len` consecutive nodes starting at `anchor`
    fn window(&self, anchor: usize, len: usize) -> Option<Vec<usize>> {
        let mut indices = Vec::with_capacity(len);
        let mut cursor = Some(anchor);
        for _ in 0..len {
            let index = cursor?;
            indices.push(index);
            cursor = self.next(index);
        }
        Some(indices)
    }

    /// Replaces the window ending at `last` with `replacement`
    ///
    /// Returns the first replacement node, or the node after the window when
    /// the replacement is empty.
    fn splice(&mut self, prev: Option<usize>, last: usize, replacement: Vec<AssemblyEntry>) -> Option<usize> {
        let after = self.next(last);
        let mut first = after;
        for entry in replacement.into_iter().rev() {
            self.nodes.push(Node { entry, next: first });
            first = Some(self.nodes.len() - 1);
        }
        match prev {
            Some(prev) => self.nodes[prev].next = first,
            None => self.head = first,
        }
        first
    }

    fn into_vec(mut self) -> Vec<AssemblyEntry> {
        let mut order = Vec::new();
        let mut cursor = self.head;
        while let Some(index) = cursor {
            order.push(index);
            cursor = self.nodes[index].next;
        }
        order
            .into_iter()
            .map(|i| std::mem::replace(&mut self.nodes[i].entry, AssemblyEntry::Blank))
            .collect()
    }
}

/// Fixpoint driver over the rule tables
pub struct Optimizer<'a> {
    ctx: CompileContext<'a>,
}

impl<'a> Optimizer<'a> {
    /// Creates an optimizer honoring the rule switches in the options
    pub fn new(ctx: CompileContext<'a>) -> Self {
        Self { ctx }
    }

    fn rules(&self) -> Vec<Rule> {
        let options = self.ctx.options;
        let optional = OPTIONAL_RULES.iter().filter(|rule| {
            !options.disable_optimizations && !options.disabled_rules.iter().any(|name| name == rule.name)
        });
        MANDATORY_RULES.iter().chain(optional).copied().collect()
    }

    /// Rewrites `entries` until a full pass changes nothing
    pub fn optimize(&self, method: &MethodRef, mut entries: Vec<AssemblyEntry>) -> Result<Vec<AssemblyEntry>> {
        let rules = self.rules();
        let mut ctx = RuleContext {
            assemblies: self.ctx.assemblies,
            layouts: LayoutTable::new(self.ctx.assemblies),
        };
        let before = entries.len();

        let mut passes = 0;
        loop {
            passes += 1;
            let output = run_pass(&rules, &mut ctx, entries.clone())?;
            if output == entries {
                break;
            }
            entries = output;
        }

        let leftovers: Vec<String> = entries
            .iter()
            .filter_map(|e| match e {
                AssemblyEntry::Preprocessed(marker) => Some(marker.to_string()),
                _ => None,
            })
            .collect();
        if !leftovers.is_empty() {
            return Err(Error::LeftoverPreprocessedEntries {
                method: method.to_string(),
                entries: leftovers,
            });
        }

        debug!(method = %method, passes, before, after = entries.len(), "Optimized");
        Ok(entries)
    }
}

fn run_pass(rules: &[Rule], ctx: &mut RuleContext<'_>, entries: Vec<AssemblyEntry>) -> Result<Vec<AssemblyEntry>> {
    let mut list = EntryList::new(entries);
    for rule in rules {
        let mut prev = None;
        let mut cursor = list.head;
        while let Some(anchor) = cursor {
            let Some(window) = list.window(anchor, rule.window) else {
                break;
            };
            let matched = {
                let view: Vec<&AssemblyEntry> = window.iter().map(|&i| &list.nodes[i].entry).collect();
                (rule.apply)(ctx, &view)?
            };
            match matched {
                Some(replacement) => {
                    trace!(rule = rule.name, "Rewrite");
                    let last = window[window.len() - 1];
                    cursor = list.splice(prev, last, replacement);
                }
                None => {
                    prev = Some(anchor);
                    cursor = list.next(anchor);
                }
            }
        }
    }
    Ok(list.into_vec())
}

fn op<'e>(entry: &'e AssemblyEntry) -> Option<&'e MacroOp> {
    entry.as_macro().map(|m| &m.op)
}

/// Source instructions carried by one entry
fn sources(entry: &AssemblyEntry) -> &[Instruction] {
    match entry {
        AssemblyEntry::Macro(call) => &call.instructions,
        AssemblyEntry::Preprocessed(marker) => std::slice::from_ref(marker.instruction()),
        _ => &[],
    }
}

fn fused(op: MacroOp, window: &[&AssemblyEntry]) -> AssemblyEntry {
    AssemblyEntry::Macro(MacroCall::merged(op, window.iter().flat_map(|entry| sources(*entry))))
}

fn byte_constant(value: u8, window: &[&AssemblyEntry]) -> AssemblyEntry {
    fused(
        MacroOp::PushConstant {
            value: Constant::Byte(value),
            ty: Label::Type(TypeRef::byte()),
            size: Label::Size(TypeRef::byte()),
        },
        window,
    )
}

// Mandatory rules

fn inline_assembly(_: &mut RuleContext<'_>, window: &[&AssemblyEntry]) -> Result<Option<Vec<AssemblyEntry>>> {
    let [AssemblyEntry::Preprocessed(Preprocessed::LoadString { text, .. }), AssemblyEntry::Preprocessed(Preprocessed::InlineAssemblyCall(_))] =
        window
    else {
        return Ok(None);
    };
    let lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    Ok(Some(vec![
        AssemblyEntry::comment("Begin inline assembly"),
        AssemblyEntry::InlineAssembly(lines),
        AssemblyEntry::comment("End inline assembly"),
    ]))
}

/// The ROM field behind a `pushAddressOfGlobal` of a ROM data label
fn rom_field(entry: &AssemblyEntry) -> Option<&FieldRef> {
    match op(entry)? {
        MacroOp::PushAddressOfGlobal {
            global: Label::RomData(field),
            ..
        } => Some(field),
        _ => None,
    }
}

/// Element count and stride of a ROM data field
fn rom_shape(ctx: &mut RuleContext<'_>, field: &FieldRef, at: &Instruction) -> Result<(usize, u16)> {
    let assemblies = ctx.assemblies;
    let rom = assemblies
        .find_field(field)?
        .rom_data
        .as_ref()
        .ok_or_else(|| Error::invalid_instruction(at.offset, field.to_string(), "field has no ROM data"))?;
    let stride = ctx.layouts.size_of(&rom.element_type)?;
    if stride == 0 {
        return Err(Error::invalid_instruction(
            at.offset,
            field.to_string(),
            "ROM data elements have zero size",
        ));
    }
    Ok((rom.bytes.len() / stride as usize, stride))
}

fn fit_byte(value: usize, field: &FieldRef, at: &Instruction, what: &str) -> Result<u8> {
    u8::try_from(value).map_err(|_| {
        Error::invalid_instruction(at.offset, field.to_string(), format!("ROM data {} {} exceeds a byte", what, value))
    })
}

fn rom_data_length(ctx: &mut RuleContext<'_>, window: &[&AssemblyEntry]) -> Result<Option<Vec<AssemblyEntry>>> {
    let [address, AssemblyEntry::Preprocessed(call @ Preprocessed::RomDataLengthCall(_))] = window else {
        return Ok(None);
    };
    let Some(field) = rom_field(address) else {
        return Ok(None);
    };
    let (length, _) = rom_shape(ctx, field, call.instruction())?;
    let length = fit_byte(length, field, call.instruction(), "length")?;
    Ok(Some(vec![byte_constant(length, window)]))
}

fn rom_data_stride(ctx: &mut RuleContext<'_>, window: &[&AssemblyEntry]) -> Result<Option<Vec<AssemblyEntry>>> {
    let [address, AssemblyEntry::Preprocessed(call @ Preprocessed::RomDataStrideCall(_))] = window else {
        return Ok(None);
    };
    let Some(field) = rom_field(address) else {
        return Ok(None);
    };
    let (_, stride) = rom_shape(ctx, field, call.instruction())?;
    let stride = fit_byte(stride as usize, field, call.instruction(), "stride")?;
    Ok(Some(vec![byte_constant(stride, window)]))
}

fn rom_data_element_from_constant(
    _: &mut RuleContext<'_>,
    window: &[&AssemblyEntry],
) -> Result<Option<Vec<AssemblyEntry>>> {
    let [address, index, AssemblyEntry::Preprocessed(Preprocessed::RomDataGetterCall(_))] = window else {
        return Ok(None);
    };
    let (Some(MacroOp::PushAddressOfGlobal { global, ty, .. }), Some(MacroOp::PushConstant { value, .. })) =
        (op(address), op(index))
    else {
        return Ok(None);
    };
    if rom_field(address).is_none() {
        return Ok(None);
    }
    Ok(Some(vec![fused(
        MacroOp::PushAddressOfRomDataElementFromConstant {
            rom_data: global.clone(),
            ty: ty.clone(),
            size: Label::PointerSize(PointerWidth::Long),
            index: *value,
        },
        window,
    )]))
}

fn rom_data_element_from_stack(
    _: &mut RuleContext<'_>,
    window: &[&AssemblyEntry],
) -> Result<Option<Vec<AssemblyEntry>>> {
    let [address, index, getter @ AssemblyEntry::Preprocessed(Preprocessed::RomDataGetterCall(_))] = window else {
        return Ok(None);
    };
    let (Some(MacroOp::PushAddressOfGlobal { global, ty, .. }), Some(MacroOp::PushGlobal { .. })) =
        (op(address), op(index))
    else {
        return Ok(None);
    };
    if rom_field(address).is_none() {
        return Ok(None);
    }
    Ok(Some(vec![
        (*index).clone(),
        fused(
            MacroOp::PushAddressOfRomDataElementFromStack {
                rom_data: global.clone(),
                ty: ty.clone(),
                size: Label::PointerSize(PointerWidth::Long),
            },
            &[*address, *getter],
        ),
    ]))
}

// Optional rules

fn assign_constant_to_global(
    _: &mut RuleContext<'_>,
    window: &[&AssemblyEntry],
) -> Result<Option<Vec<AssemblyEntry>>> {
    let [first, second] = window else {
        return Ok(None);
    };
    let (Some(MacroOp::PushConstant { value, .. }), Some(MacroOp::PopToGlobal { global, size, .. })) =
        (op(first), op(second))
    else {
        return Ok(None);
    };
    Ok(Some(vec![fused(
        MacroOp::AssignConstantToGlobal {
            value: *value,
            global: global.clone(),
            size: size.clone(),
        },
        window,
    )]))
}

fn copy_global_to_global(_: &mut RuleContext<'_>, window: &[&AssemblyEntry]) -> Result<Option<Vec<AssemblyEntry>>> {
    let [first, second] = window else {
        return Ok(None);
    };
    let (
        Some(MacroOp::PushGlobal {
            global: from,
            size: from_size,
            ..
        }),
        Some(MacroOp::PopToGlobal {
            global: to,
            size: to_size,
            ..
        }),
    ) = (op(first), op(second))
    else {
        return Ok(None);
    };
    Ok(Some(vec![fused(
        MacroOp::CopyGlobalToGlobal {
            from: from.clone(),
            from_size: from_size.clone(),
            to: to.clone(),
            to_size: to_size.clone(),
        },
        window,
    )]))
}

fn add_from_global_and_constant(
    _: &mut RuleContext<'_>,
    window: &[&AssemblyEntry],
) -> Result<Option<Vec<AssemblyEntry>>> {
    let [first, second, third] = window else {
        return Ok(None);
    };
    if op(third) != Some(&MacroOp::AddFromStack) {
        return Ok(None);
    }
    let (global, constant) = match (op(first), op(second)) {
        (Some(g @ MacroOp::PushGlobal { .. }), Some(c @ MacroOp::PushConstant { .. }))
        | (Some(c @ MacroOp::PushConstant { .. }), Some(g @ MacroOp::PushGlobal { .. })) => (g, c),
        _ => return Ok(None),
    };
    let (
        MacroOp::PushGlobal {
            global,
            ty: global_type,
            size: global_size,
        },
        MacroOp::PushConstant {
            value,
            ty: constant_type,
            size: constant_size,
        },
    ) = (global, constant)
    else {
        return Ok(None);
    };
    Ok(Some(vec![fused(
        MacroOp::AddFromGlobalAndConstant {
            global: global.clone(),
            global_type: global_type.clone(),
            global_size: global_size.clone(),
            value: *value,
            constant_type: constant_type.clone(),
            constant_size: constant_size.clone(),
        },
        window,
    )]))
}

fn add_from_global_and_constant_to_global(
    _: &mut RuleContext<'_>,
    window: &[&AssemblyEntry],
) -> Result<Option<Vec<AssemblyEntry>>> {
    let [first, second] = window else {
        return Ok(None);
    };
    let (
        Some(MacroOp::AddFromGlobalAndConstant {
            global,
            global_type,
            global_size,
            value,
            constant_type,
            constant_size,
        }),
        Some(MacroOp::PopToGlobal {
            global: target,
            ty: target_type,
            size: target_size,
        }),
    ) = (op(first), op(second))
    else {
        return Ok(None);
    };
    Ok(Some(vec![fused(
        MacroOp::AddFromGlobalAndConstantToGlobal {
            global: global.clone(),
            global_type: global_type.clone(),
            global_size: global_size.clone(),
            value: *value,
            constant_type: constant_type.clone(),
            constant_size: constant_size.clone(),
            target: target.clone(),
            target_type: target_type.clone(),
            target_size: target_size.clone(),
        },
        window,
    )]))
}

fn increment_global(_: &mut RuleContext<'_>, window: &[&AssemblyEntry]) -> Result<Option<Vec<AssemblyEntry>>> {
    let [entry] = window else {
        return Ok(None);
    };
    let Some(MacroOp::AddFromGlobalAndConstantToGlobal {
        global,
        global_type,
        global_size,
        value,
        target,
        target_type,
        ..
    }) = op(entry)
    else {
        return Ok(None);
    };
    let one = matches!(value, Constant::Byte(1) | Constant::Number(1));
    if !one || global != target || global_type != target_type {
        return Ok(None);
    }
    Ok(Some(vec![fused(
        MacroOp::IncrementGlobal {
            global: global.clone(),
            ty: global_type.clone(),
            size: global_size.clone(),
        },
        window,
    )]))
}

fn remove_branch_to_next(_: &mut RuleContext<'_>, window: &[&AssemblyEntry]) -> Result<Option<Vec<AssemblyEntry>>> {
    let [branch, label @ AssemblyEntry::Label(defined)] = window else {
        return Ok(None);
    };
    match op(branch) {
        Some(MacroOp::Branch { target }) if target == defined => Ok(Some(vec![(*label).clone()])),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Assembly, FieldDef, InstRef, Opcode, RomData, TypeDef};
    use crate::compiler::CompileOptions;

    fn set() -> AssemblySet {
        let mut sprites = FieldDef::global("sprites", TypeRef::byte());
        sprites.rom_data = Some(RomData {
            element_type: TypeRef::new("Game.Pair"),
            bytes: vec![1, 2, 3, 4, 5, 6],
        });
        let pair = TypeDef::new("Game.Pair")
            .with_field(FieldDef::instance("a", TypeRef::byte()))
            .with_field(FieldDef::instance("b", TypeRef::byte()));
        let program = TypeDef::new("Game.Program")
            .with_field(FieldDef::global("score", TypeRef::byte()))
            .with_field(sprites);
        AssemblySet::new(Assembly::new("Game").with_type(pair).with_type(program))
    }

    fn main() -> MethodRef {
        MethodRef::parse("Game.Program::Main").unwrap()
    }

    fn optimize_with(options: &CompileOptions, entries: Vec<AssemblyEntry>) -> Result<Vec<AssemblyEntry>> {
        let set = set();
        let ctx = CompileContext {
            assemblies: &set,
            options,
        };
        Optimizer::new(ctx).optimize(&main(), entries)
    }

    fn optimize(entries: Vec<AssemblyEntry>) -> Vec<AssemblyEntry> {
        optimize_with(&CompileOptions::default(), entries).unwrap()
    }

    fn score() -> Label {
        Label::Global(FieldRef::parse("Game.Program::score").unwrap())
    }

    fn at(offset: u32) -> Instruction {
        Instruction::simple(offset, Opcode::Nop)
    }

    fn push_constant(value: u8) -> AssemblyEntry {
        AssemblyEntry::instr(
            MacroOp::PushConstant {
                value: Constant::Byte(value),
                ty: Label::Type(TypeRef::byte()),
                size: Label::Size(TypeRef::byte()),
            },
            &at(0),
        )
    }

    fn push_global(global: Label) -> AssemblyEntry {
        AssemblyEntry::instr(
            MacroOp::PushGlobal {
                global,
                ty: Label::Type(TypeRef::byte()),
                size: Label::Size(TypeRef::byte()),
            },
            &at(1),
        )
    }

    fn pop_to_global(global: Label) -> AssemblyEntry {
        AssemblyEntry::instr(
            MacroOp::PopToGlobal {
                global,
                ty: Label::Type(TypeRef::byte()),
                size: Label::Size(TypeRef::byte()),
            },
            &at(2),
        )
    }

    fn add() -> AssemblyEntry {
        AssemblyEntry::instr(MacroOp::AddFromStack, &at(3))
    }

    fn ops(entries: &[AssemblyEntry]) -> Vec<&MacroOp> {
        entries.iter().filter_map(op).collect()
    }

    fn rom_address() -> AssemblyEntry {
        AssemblyEntry::instr(
            MacroOp::PushAddressOfGlobal {
                global: Label::RomData(FieldRef::parse("Game.Program::sprites").unwrap()),
                ty: Label::PointerType(TypeRef::new("Game.Pair")),
                size: Label::PointerSize(PointerWidth::Long),
            },
            &at(4),
        )
    }

    #[test]
    fn test_assign_constant_to_global() {
        let out = optimize(vec![push_constant(5), pop_to_global(score())]);
        assert_eq!(
            ops(&out),
            vec![&MacroOp::AssignConstantToGlobal {
                value: Constant::Byte(5),
                global: score(),
                size: Label::Size(TypeRef::byte()),
            }]
        );
        assert_eq!(out.len(), 1);
        let offsets: Vec<u32> = out[0].as_macro().unwrap().instructions.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 2]);
    }

    #[test]
    fn test_copy_global_to_global() {
        let other = Label::Predefined("COLUBK".into());
        let out = optimize(vec![push_global(score()), pop_to_global(other.clone())]);
        assert!(matches!(ops(&out)[..], [MacroOp::CopyGlobalToGlobal { to, .. }] if *to == other));
    }

    #[test]
    fn test_add_from_global_and_constant_either_order() {
        for input in [
            vec![push_global(score()), push_constant(3), add()],
            vec![push_constant(3), push_global(score()), add()],
        ] {
            let out = optimize(input);
            assert!(matches!(
                ops(&out)[..],
                [MacroOp::AddFromGlobalAndConstant { value: Constant::Byte(3), .. }]
            ));
        }
    }

    #[test]
    fn test_increment_global() {
        let out = optimize(vec![push_global(score()), push_constant(1), add(), pop_to_global(score())]);
        assert_eq!(out.len(), 1);
        assert!(matches!(ops(&out)[..], [MacroOp::IncrementGlobal { global, .. }] if *global == score()));
    }

    #[test]
    fn test_add_to_other_global_is_not_an_increment() {
        let other = Label::Predefined("COLUPF".into());
        let out = optimize(vec![push_global(score()), push_constant(1), add(), pop_to_global(other)]);
        assert!(matches!(ops(&out)[..], [MacroOp::AddFromGlobalAndConstantToGlobal { .. }]));
    }

    #[test]
    fn test_branch_to_next_label() {
        let target = Label::Instruction(InstRef(8));
        let out = optimize(vec![
            AssemblyEntry::instr(MacroOp::Branch { target: target.clone() }, &at(6)),
            AssemblyEntry::Label(target.clone()),
        ]);
        assert_eq!(out, vec![AssemblyEntry::Label(target)]);

        let elsewhere = vec![
            AssemblyEntry::instr(
                MacroOp::Branch {
                    target: Label::Instruction(InstRef(0)),
                },
                &at(6),
            ),
            AssemblyEntry::Label(Label::Instruction(InstRef(8))),
        ];
        assert_eq!(optimize(elsewhere.clone()), elsewhere);
    }

    #[test]
    fn test_disabled_rules() {
        let input = vec![push_constant(5), pop_to_global(score())];
        let all_off = CompileOptions {
            disable_optimizations: true,
            ..CompileOptions::default()
        };
        assert_eq!(optimize_with(&all_off, input.clone()).unwrap(), input);

        let one_off = CompileOptions {
            disabled_rules: vec!["assign_constant_to_global".into()],
            ..CompileOptions::default()
        };
        assert_eq!(optimize_with(&one_off, input.clone()).unwrap(), input);
    }

    #[test]
    fn test_inline_assembly_is_mandatory() {
        let options = CompileOptions {
            disable_optimizations: true,
            ..CompileOptions::default()
        };
        let out = optimize_with(
            &options,
            vec![
                AssemblyEntry::Preprocessed(Preprocessed::LoadString {
                    instruction: at(0),
                    text: "  lda #1\n\n  sta COLUBK  \n".into(),
                }),
                AssemblyEntry::Preprocessed(Preprocessed::InlineAssemblyCall(at(5))),
            ],
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                AssemblyEntry::comment("Begin inline assembly"),
                AssemblyEntry::InlineAssembly(vec!["lda #1".into(), "sta COLUBK".into()]),
                AssemblyEntry::comment("End inline assembly"),
            ]
        );
    }

    #[test]
    fn test_rom_data_rules() {
        let length = optimize(vec![
            rom_address(),
            AssemblyEntry::Preprocessed(Preprocessed::RomDataLengthCall(at(9))),
        ]);
        assert!(matches!(ops(&length)[..], [MacroOp::PushConstant { value: Constant::Byte(3), .. }]));

        let stride = optimize(vec![
            rom_address(),
            AssemblyEntry::Preprocessed(Preprocessed::RomDataStrideCall(at(9))),
        ]);
        assert!(matches!(ops(&stride)[..], [MacroOp::PushConstant { value: Constant::Byte(2), .. }]));

        let constant = optimize(vec![
            rom_address(),
            push_constant(2),
            AssemblyEntry::Preprocessed(Preprocessed::RomDataGetterCall(at(9))),
        ]);
        assert!(matches!(
            ops(&constant)[..],
            [MacroOp::PushAddressOfRomDataElementFromConstant { index: Constant::Byte(2), .. }]
        ));

        let stack = optimize(vec![
            rom_address(),
            push_global(score()),
            AssemblyEntry::Preprocessed(Preprocessed::RomDataGetterCall(at(9))),
        ]);
        assert!(matches!(
            ops(&stack)[..],
            [MacroOp::PushGlobal { .. }, MacroOp::PushAddressOfRomDataElementFromStack { .. }]
        ));
    }

    #[test]
    fn test_leftover_markers_are_fatal() {
        let err = optimize_with(
            &CompileOptions::default(),
            vec![AssemblyEntry::Preprocessed(Preprocessed::RomDataLengthCall(at(9)))],
        )
        .unwrap_err();
        assert!(matches!(err, Error::LeftoverPreprocessedEntries { ref entries, .. } if entries.len() == 1));
        assert!(err.is_internal());
    }

    #[test]
    fn test_idempotent() {
        let input = vec![
            push_global(score()),
            push_constant(1),
            add(),
            pop_to_global(score()),
            push_constant(4),
            pop_to_global(score()),
        ];
        let once = optimize(input);
        assert_eq!(optimize(once.clone()), once);
    }

    #[test]
    fn test_entry_list_splice() {
        let mut list = EntryList::new(vec![
            AssemblyEntry::comment("a"),
            AssemblyEntry::comment("b"),
            AssemblyEntry::comment("c"),
        ]);
        let window = list.window(1, 2).unwrap();
        assert_eq!(window, vec![1, 2]);
        assert!(list.window(2, 2).is_none());
        let first = list.splice(Some(0), 2, vec![AssemblyEntry::comment("x")]);
        assert!(first.is_some());
        assert_eq!(
            list.into_vec(),
            vec![AssemblyEntry::comment("a"), AssemblyEntry::comment("x")]
        );
    }
}
