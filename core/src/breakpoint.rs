//! Breakpoint arming state, layered on top of [`crate::flash::Flash`]'s
//! sentinel side-table.
//!
//! The armed/disarmed address set itself lives in [`Flash`], since that's
//! also what the executor's normal fetch path and GDB's raw-memory-read path
//! both need to agree on. This type only adds the *disabled* flag: the
//! stepper temporarily disables every breakpoint after a hit so the very
//! next single-step can execute through the sentinel instead of halting
//! again immediately.

use crate::flash::Flash;
use avrsim_arch::Error;

#[derive(Debug, Default)]
pub struct BreakpointSet {
    disabled: bool,
}

impl BreakpointSet {
    pub fn insert(&self, flash: &mut Flash, addr: u32) -> Result<(), Error> {
        flash.insert_break(addr)
    }

    pub fn remove(&self, flash: &mut Flash, addr: u32) {
        flash.remove_break(addr);
    }

    /// Whether `addr` should be treated as armed right now. Always `false`
    /// while the set is disabled, regardless of what's armed in flash.
    #[must_use]
    pub fn contains(&self, flash: &Flash, addr: u32) -> bool {
        !self.disabled && flash.is_break(addr)
    }

    pub fn disable_all(&mut self) {
        self.disabled = true;
    }

    pub fn enable_all(&mut self) {
        self.disabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_set_behaves_as_empty() {
        let mut flash = Flash::new(4);
        let mut bps = BreakpointSet::default();
        bps.insert(&mut flash, 0).unwrap();
        assert!(bps.contains(&flash, 0));
        bps.disable_all();
        assert!(!bps.contains(&flash, 0));
        bps.enable_all();
        assert!(bps.contains(&flash, 0));
    }
}
