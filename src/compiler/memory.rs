//! Static RAM allocation
//!
//! The console has 128 bytes of RAM shared with the hardware stack, so every
//! global, parameter and local gets one fixed address handed out by a bump
//! allocator. The top of RAM is kept free for the stack.

use super::ir::Label;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

/// Bounds of allocatable RAM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryLayout {
    /// First RAM address
    pub ram_start: u16,
    /// One past the last RAM address
    pub ram_end: u16,
    /// Bytes at the top of RAM left to the hardware stack
    pub stack_reserve: u16,
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self {
            ram_start: 0x80,
            ram_end: 0x100,
            stack_reserve: 0x10,
        }
    }
}

impl MemoryLayout {
    /// First address the allocator may not hand out
    pub fn limit(&self) -> u16 {
        self.ram_end.saturating_sub(self.stack_reserve).max(self.ram_start)
    }

    /// Bytes available to the allocator
    pub fn capacity(&self) -> u16 {
        self.limit() - self.ram_start
    }
}

/// One placed label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub label: Label,
    pub address: u16,
    pub size: u16,
}

/// Bump allocator over [`MemoryLayout`]
#[derive(Debug)]
pub struct MemoryAllocator {
    layout: MemoryLayout,
    next: u16,
    allocations: Vec<Allocation>,
    index: HashMap<Label, usize>,
}

impl MemoryAllocator {
    pub fn new(layout: MemoryLayout) -> Self {
        Self {
            layout,
            next: layout.ram_start,
            allocations: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Places `label`, or returns its address if already placed
    pub fn allocate(&mut self, label: Label, size: u16) -> Result<u16> {
        if let Some(&i) = self.index.get(&label) {
            return Ok(self.allocations[i].address);
        }

        let limit = self.layout.limit();
        let end = self.next as u32 + size as u32;
        if end > limit as u32 {
            return Err(Error::RamExhausted {
                label: label.to_string(),
                requested: size,
                next: self.next,
                limit,
            });
        }

        let address = self.next;
        self.next = end as u16;
        trace!(label = %label, address, size, "Allocated");
        self.index.insert(label.clone(), self.allocations.len());
        self.allocations.push(Allocation { label, address, size });
        Ok(address)
    }

    pub fn address_of(&self, label: &Label) -> Option<u16> {
        self.index.get(label).map(|&i| self.allocations[i].address)
    }

    /// Next address that would be handed out
    pub fn next_free(&self) -> u16 {
        self.next
    }

    pub fn remaining(&self) -> u16 {
        self.layout.limit() - self.next
    }

    /// Placements in allocation order
    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }
}
