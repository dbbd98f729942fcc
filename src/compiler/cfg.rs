//! # Basic Blocks
//!
//! Leader-based partition of a routine's entry stream. Leaders are the first
//! entry, every label definition, and every entry following a macro that can
//! transfer control. The graph is an analysis aid; nothing downstream
//! depends on it.

use super::ir::{AssemblyEntry, Label, MacroOp};
use std::collections::{BTreeSet, HashMap};

/// A maximal run of entries entered only at its first entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Block ID, in stream order
    pub id: usize,
    /// Index of the first entry
    pub start: usize,
    /// One past the index of the last entry
    pub end: usize,
    /// Successor block IDs
    pub successors: Vec<usize>,
    /// Predecessor block IDs
    pub predecessors: Vec<usize>,
    /// Label defined at the top of the block, if any
    pub label: Option<Label>,
}

/// Basic blocks of one routine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlFlowGraph {
    /// Blocks in stream order
    pub blocks: Vec<BasicBlock>,
    /// Blocks that end in a return
    pub exits: Vec<usize>,
}

impl ControlFlowGraph {
    /// Partitions `entries` into basic blocks and links them
    pub fn build(entries: &[AssemblyEntry]) -> Self {
        let mut cfg = ControlFlowGraph::default();
        if entries.is_empty() {
            return cfg;
        }

        // Step 1: Find block leaders
        let mut leaders = BTreeSet::new();
        leaders.insert(0);
        for (i, entry) in entries.iter().enumerate() {
            match entry {
                AssemblyEntry::Label(_) => {
                    leaders.insert(i);
                }
                AssemblyEntry::Macro(call) if call.op.ends_block() && i + 1 < entries.len() => {
                    leaders.insert(i + 1);
                }
                _ => {}
            }
        }

        // Step 2: Create blocks
        let starts: Vec<usize> = leaders.into_iter().collect();
        let mut label_to_block: HashMap<&Label, usize> = HashMap::new();
        for (id, &start) in starts.iter().enumerate() {
            let end = starts.get(id + 1).copied().unwrap_or(entries.len());
            let label = match &entries[start] {
                AssemblyEntry::Label(label) => {
                    label_to_block.insert(label, id);
                    Some(label.clone())
                }
                _ => None,
            };
            cfg.blocks.push(BasicBlock {
                id,
                start,
                end,
                successors: Vec::new(),
                predecessors: Vec::new(),
                label,
            });
        }

        // Step 3: Build edges from each block's last macro
        for id in 0..cfg.blocks.len() {
            let (start, end) = (cfg.blocks[id].start, cfg.blocks[id].end);
            let last = entries[start..end].iter().rev().find_map(AssemblyEntry::as_macro);
            let falls_through = match last.map(|m| &m.op) {
                Some(MacroOp::ReturnVoid) | Some(MacroOp::ReturnNonVoid { .. }) => {
                    cfg.exits.push(id);
                    false
                }
                Some(op) => {
                    if let Some(&target) = op.branch_target().and_then(|t| label_to_block.get(t)) {
                        cfg.add_edge(id, target);
                    }
                    !matches!(op, MacroOp::Branch { .. })
                }
                None => true,
            };
            if falls_through && id + 1 < cfg.blocks.len() {
                cfg.add_edge(id, id + 1);
            }
        }

        cfg
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        if !self.blocks[from].successors.contains(&to) {
            self.blocks[from].successors.push(to);
        }
        if !self.blocks[to].predecessors.contains(&from) {
            self.blocks[to].predecessors.push(from);
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks with no path from the first block
    pub fn unreachable(&self) -> Vec<usize> {
        let mut reached = vec![false; self.blocks.len()];
        let mut work = vec![0];
        while let Some(id) = work.pop() {
            if id >= reached.len() || reached[id] {
                continue;
            }
            reached[id] = true;
            work.extend(self.blocks[id].successors.iter().copied());
        }
        reached
            .iter()
            .enumerate()
            .filter(|(_, &r)| !r)
            .map(|(id, _)| id)
            .collect()
    }
}
