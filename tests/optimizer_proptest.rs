//! Property tests for the rewrite-rule optimizer
//!
//! Random macro streams built from the shapes the optional rules look for:
//! 1. A second optimization changes nothing
//! 2. With optimizations disabled, marker-free streams pass through untouched
//! 3. No stream grows

use proptest::prelude::*;
use vcsc::bytecode::{Assembly, AssemblySet, FieldRef, InstRef, MethodRef, TypeRef};
use vcsc::compiler::ir::{AssemblyEntry, Constant, Label, MacroOp};
use vcsc::compiler::{CompileContext, Optimizer};
use vcsc::CompileOptions;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

fn global() -> impl Strategy<Value = Label> {
    prop_oneof![Just("score"), Just("lives"), Just("level")]
        .prop_map(|name| Label::Global(FieldRef::parse(&format!("Game.Program::{}", name)).unwrap()))
}

fn branch_target() -> impl Strategy<Value = Label> {
    (0u32..3).prop_map(|offset| Label::Instruction(InstRef(offset * 4)))
}

fn entry() -> impl Strategy<Value = AssemblyEntry> {
    let byte = || Label::Type(TypeRef::byte());
    let size = || Label::Size(TypeRef::byte());
    prop_oneof![
        (0u8..4).prop_map(move |v| AssemblyEntry::synthetic(MacroOp::PushConstant {
            value: Constant::Byte(v),
            ty: byte(),
            size: size(),
        })),
        global().prop_map(move |global| AssemblyEntry::synthetic(MacroOp::PushGlobal {
            global,
            ty: byte(),
            size: size(),
        })),
        global().prop_map(move |global| AssemblyEntry::synthetic(MacroOp::PopToGlobal {
            global,
            ty: byte(),
            size: size(),
        })),
        Just(AssemblyEntry::synthetic(MacroOp::AddFromStack)),
        Just(AssemblyEntry::synthetic(MacroOp::Duplicate)),
        branch_target().prop_map(|target| AssemblyEntry::synthetic(MacroOp::Branch { target })),
        branch_target().prop_map(AssemblyEntry::Label),
        Just(AssemblyEntry::comment("note")),
    ]
}

fn stream() -> impl Strategy<Value = Vec<AssemblyEntry>> {
    prop::collection::vec(entry(), 0..40)
}

fn optimize(options: &CompileOptions, entries: Vec<AssemblyEntry>) -> Vec<AssemblyEntry> {
    let assemblies = AssemblySet::new(Assembly::new("Game"));
    let ctx = CompileContext {
        assemblies: &assemblies,
        options,
    };
    let method = MethodRef::parse("Game.Program::Main").unwrap();
    Optimizer::new(ctx).optimize(&method, entries).unwrap()
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_optimization_is_idempotent(entries in stream()) {
        let options = CompileOptions::default();
        let once = optimize(&options, entries);
        let twice = optimize(&options, once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_disabled_optimizer_is_identity(entries in stream()) {
        let options = CompileOptions {
            disable_optimizations: true,
            ..CompileOptions::default()
        };
        prop_assert_eq!(optimize(&options, entries.clone()), entries);
    }

    #[test]
    fn prop_optimization_never_grows(entries in stream()) {
        let options = CompileOptions::default();
        let len = entries.len();
        let optimized = optimize(&options, entries);
        prop_assert!(optimized.len() <= len);
        prop_assert!(!optimized.iter().any(|e| matches!(e, AssemblyEntry::Preprocessed(_))));
    }

    #[test]
    fn prop_each_rule_can_be_disabled(entries in stream(), skip in 0usize..6) {
        let rules: Vec<&str> = vcsc::compiler::optimizer::optional_rule_names().collect();
        let options = CompileOptions {
            disabled_rules: vec![rules[skip % rules.len()].to_string()],
            ..CompileOptions::default()
        };
        let once = optimize(&options, entries);
        prop_assert_eq!(optimize(&options, once.clone()), once);
    }
}
