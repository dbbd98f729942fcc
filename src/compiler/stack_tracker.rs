//! Operand-stack type and size reconstruction
//!
//! The macro library needs the type and size of every live stack slot at
//! assembly time. The tracker replays each macro's declared stack effect over
//! a fixed-width model and, whenever the model changes, emits `.let`
//! assignments for the `STACK_SIZEOF` and `STACK_TYPEOF` arrays. After each
//! emission the model goes back to placeholders (`STACK_TYPEOF[i]`), so later
//! entries are relative to what the assembler already holds.
//!
//! `STACK_SIZEOF` is assigned first: size expressions may read
//! `STACK_TYPEOF`, but type expressions never read `STACK_SIZEOF`.

use super::ir::{AssemblyEntry, Expression, Label, PseudoOp, StackArray};
use crate::bytecode::TypeRef;
use crate::error::{Error, Result};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    ty: Expression,
    size: Expression,
}

impl Slot {
    fn nothing() -> Self {
        Self {
            ty: Label::Type(TypeRef::nothing()).into(),
            size: Label::Size(TypeRef::nothing()).into(),
        }
    }

    fn placeholder(index: u8) -> Self {
        Self {
            ty: Expression::stack_type(index),
            size: Expression::stack_size(index),
        }
    }
}

/// Fixed-width model of the operand stack
#[derive(Debug, Clone)]
pub struct StackTracker {
    slots: Vec<Slot>,
}

impl StackTracker {
    /// Creates a model `depth` slots wide, holding placeholders
    pub fn new(depth: usize) -> Result<Self> {
        if depth > u8::MAX as usize {
            return Err(Error::StackDepth);
        }
        Ok(Self {
            slots: placeholders(depth),
        })
    }

    /// Deepest the stack gets, replaying declared effects in order
    pub fn max_depth(entries: &[AssemblyEntry]) -> usize {
        let mut depth = 0usize;
        let mut max = 0usize;
        for call in entries.iter().filter_map(AssemblyEntry::as_macro) {
            let effect = call.op.effect();
            depth = depth.saturating_sub(effect.pops as usize) + effect.pushes as usize;
            max = max.max(depth);
        }
        max
    }

    /// Width of the model
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    fn check_depth(&self) -> Result<()> {
        if self.slots.is_empty() {
            return Err(Error::StackDepth);
        }
        Ok(())
    }

    /// Pushes a slot, dropping the bottom one
    pub fn push(&mut self, ty: Expression, size: Expression) -> Result<()> {
        self.check_depth()?;
        self.slots.rotate_right(1);
        self.slots[0] = Slot { ty, size };
        Ok(())
    }

    /// Pops `amount` slots, filling the bottom with the nothing sentinel
    pub fn pop(&mut self, amount: usize) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.check_depth()?;
        for _ in 0..amount {
            self.slots.remove(0);
            self.slots.push(Slot::nothing());
        }
        Ok(())
    }

    /// Whether the model differs from what the assembler holds
    pub fn is_dirty(&self) -> bool {
        self.slots != placeholders(self.slots.len())
    }

    /// `.let` entries declaring an empty stack of this width
    pub fn initialization_entries(&self) -> Vec<AssemblyEntry> {
        if self.slots.is_empty() {
            return Vec::new();
        }
        let nothing = vec![Slot::nothing(); self.slots.len()];
        array_lets(&nothing)
    }

    /// `.let` entries capturing the model, which then resets to placeholders
    pub fn take_setters(&mut self) -> Vec<AssemblyEntry> {
        let entries = array_lets(&self.slots);
        self.slots = placeholders(self.slots.len());
        entries
    }

    /// Annotates a finished routine body with stack state
    pub fn track(entries: Vec<AssemblyEntry>) -> Result<Vec<AssemblyEntry>> {
        let depth = Self::max_depth(&entries);
        let mut tracker = Self::new(depth)?;
        debug!(depth, "Tracking operand stack");

        let mut output = tracker.initialization_entries();
        output.reserve(entries.len());
        for entry in entries {
            let Some(call) = entry.as_macro() else {
                output.push(entry);
                continue;
            };
            let effect = call.op.effect();
            let pushed = call.op.pushed();

            tracker.pop(effect.pops as usize)?;
            for (ty, size) in pushed.into_iter().take(effect.pushes as usize) {
                tracker.push(ty, size)?;
            }
            output.push(entry);
            if tracker.is_dirty() {
                output.extend(tracker.take_setters());
            }
        }
        Ok(output)
    }
}

fn placeholders(depth: usize) -> Vec<Slot> {
    (0..depth).map(|i| Slot::placeholder(i as u8)).collect()
}

fn array_lets(slots: &[Slot]) -> Vec<AssemblyEntry> {
    vec![
        AssemblyEntry::PseudoOp(PseudoOp::ArrayLet {
            array: StackArray::SizeOf,
            elements: slots.iter().map(|s| s.size.clone()).collect(),
        }),
        AssemblyEntry::PseudoOp(PseudoOp::ArrayLet {
            array: StackArray::TypeOf,
            elements: slots.iter().map(|s| s.ty.clone()).collect(),
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::FieldRef;
    use crate::compiler::ir::{Constant, MacroOp};

    fn byte() -> (Expression, Expression) {
        (
            Label::Type(TypeRef::byte()).into(),
            Label::Size(TypeRef::byte()).into(),
        )
    }

    fn push_constant() -> AssemblyEntry {
        AssemblyEntry::synthetic(MacroOp::PushConstant {
            value: Constant::Byte(1),
            ty: Label::Type(TypeRef::byte()),
            size: Label::Size(TypeRef::byte()),
        })
    }

    fn pop_to_global() -> AssemblyEntry {
        AssemblyEntry::synthetic(MacroOp::PopToGlobal {
            global: Label::Global(FieldRef::parse("Game.Program::score").unwrap()),
            ty: Label::Type(TypeRef::byte()),
            size: Label::Size(TypeRef::byte()),
        })
    }

    fn lets(entries: &[AssemblyEntry]) -> Vec<String> {
        entries
            .iter()
            .filter(|e| matches!(e, AssemblyEntry::PseudoOp(PseudoOp::ArrayLet { .. })))
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn test_zero_width_rejects_everything() {
        let mut tracker = StackTracker::new(0).unwrap();
        let (ty, size) = byte();
        assert_eq!(tracker.pop(1), Err(Error::StackDepth));
        assert_eq!(tracker.push(ty, size), Err(Error::StackDepth));
        assert!(tracker.pop(0).is_ok());
        assert!(tracker.initialization_entries().is_empty());
    }

    #[test]
    fn test_max_depth_is_cumulative() {
        let body = vec![
            push_constant(),
            push_constant(),
            AssemblyEntry::synthetic(MacroOp::AddFromStack),
            pop_to_global(),
        ];
        assert_eq!(StackTracker::max_depth(&body), 2);
        assert_eq!(StackTracker::max_depth(&[pop_to_global()]), 0);
    }

    #[test]
    fn test_push_and_pop_shift() {
        let mut tracker = StackTracker::new(2).unwrap();
        let (ty, size) = byte();
        tracker.push(ty.clone(), size.clone()).unwrap();
        assert_eq!(tracker.slots[0].ty, ty);
        assert_eq!(tracker.slots[1], Slot::placeholder(0));
        tracker.pop(1).unwrap();
        assert_eq!(tracker.slots[0], Slot::placeholder(0));
        assert_eq!(tracker.slots[1], Slot::nothing());
    }

    #[test]
    fn test_track_emits_relative_state() {
        let body = vec![
            push_constant(),
            push_constant(),
            AssemblyEntry::synthetic(MacroOp::AddFromStack),
            pop_to_global(),
        ];
        let tracked = StackTracker::track(body).unwrap();
        let lets = lets(&tracked);
        assert_eq!(
            lets[..2],
            [
                ".let STACK_SIZEOF = [SIZE_VCSFramework_Nothing, SIZE_VCSFramework_Nothing]",
                ".let STACK_TYPEOF = [TYPE_VCSFramework_Nothing, TYPE_VCSFramework_Nothing]",
            ]
        );
        assert_eq!(lets[3], ".let STACK_TYPEOF = [TYPE_System_Byte, STACK_TYPEOF[0]]");
        assert_eq!(
            lets[7],
            ".let STACK_TYPEOF = [getAddResultType(STACK_TYPEOF[1], STACK_TYPEOF[0]), TYPE_VCSFramework_Nothing]"
        );
        assert_eq!(lets[9], ".let STACK_TYPEOF = [STACK_TYPEOF[1], TYPE_VCSFramework_Nothing]");
        assert_eq!(lets.len(), 10);

        // Setters follow the macro they describe.
        let add = tracked
            .iter()
            .position(|e| e.as_macro().map(|m| &m.op) == Some(&MacroOp::AddFromStack))
            .unwrap();
        assert!(matches!(
            tracked[add + 1],
            AssemblyEntry::PseudoOp(PseudoOp::ArrayLet { array: StackArray::SizeOf, .. })
        ));
    }

    #[test]
    fn test_stackless_body_is_untouched() {
        let body = vec![
            AssemblyEntry::comment("nothing to see"),
            AssemblyEntry::synthetic(MacroOp::ReturnVoid),
        ];
        assert_eq!(StackTracker::track(body.clone()).unwrap(), body);
    }

    #[test]
    fn test_pop_without_depth_fails() {
        assert_eq!(StackTracker::track(vec![pop_to_global()]), Err(Error::StackDepth));
    }
}
