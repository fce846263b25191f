//! Debugger hooks consulted by the execution cycle.

use std::collections::HashMap;

use crate::breakpoint::{BreakpointError, BreakpointInfo};

/// Supplies breakpoints to the execution cycle.
///
/// The cycle only looks breakpoints up in debugger mode, once per
/// instruction boundary, and is the only caller that counts hits.
pub trait DebugInfoProvider: Send {
    /// Breakpoint at `address`, if any.
    fn breakpoint_mut(&mut self, address: u16) -> Option<&mut BreakpointInfo>;
}

/// Address-keyed breakpoint map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointTable {
    breakpoints: HashMap<u16, BreakpointInfo>,
}

impl BreakpointTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the breakpoint at `address`.
    pub fn insert(&mut self, address: u16, breakpoint: BreakpointInfo) -> Option<BreakpointInfo> {
        self.breakpoints.insert(address, breakpoint)
    }

    /// Add a CPU breakpoint with optional condition text.
    pub fn insert_conditional(
        &mut self,
        address: u16,
        condition: Option<&str>,
    ) -> Result<(), BreakpointError> {
        self.breakpoints
            .insert(address, BreakpointInfo::parse(condition)?);
        Ok(())
    }

    pub fn remove(&mut self, address: u16) -> Option<BreakpointInfo> {
        self.breakpoints.remove(&address)
    }

    #[must_use]
    pub fn get(&self, address: u16) -> Option<&BreakpointInfo> {
        self.breakpoints.get(&address)
    }

    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }

    pub fn reset_hit_counts(&mut self) {
        for breakpoint in self.breakpoints.values_mut() {
            breakpoint.reset_hit_count();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}

impl DebugInfoProvider for BreakpointTable {
    fn breakpoint_mut(&mut self, address: u16) -> Option<&mut BreakpointInfo> {
        self.breakpoints.get_mut(&address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::HitType;

    #[test]
    fn lookup_by_address() {
        let mut table = BreakpointTable::new();
        table.insert_conditional(0x8004, Some("*8")).unwrap();
        table.insert(0x8007, BreakpointInfo::minimum());

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0x8004).map(|bp| bp.hit_type), Some(HitType::Multiple));
        assert!(table.breakpoint_mut(0x8005).is_none());
    }

    #[test]
    fn bad_condition_is_not_inserted() {
        let mut table = BreakpointTable::new();
        assert!(table.insert_conditional(0x8000, Some("?1")).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn hit_counts_reset() {
        let mut table = BreakpointTable::new();
        table.insert(0x8000, BreakpointInfo::minimum());
        if let Some(bp) = table.breakpoint_mut(0x8000) {
            bp.hit();
        }
        assert_eq!(table.get(0x8000).map(|bp| bp.current_hit_count), Some(1));
        table.reset_hit_counts();
        assert_eq!(table.get(0x8000).map(|bp| bp.current_hit_count), Some(0));
        table.remove(0x8000);
        table.clear();
        assert!(table.is_empty());
    }
}
