//! Outcome types shared by the stepper and the RSP dispatcher.

use thiserror::Error;

/// Result of driving the core through one instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepResult {
    /// Instruction executed normally; carries the cycle count consumed.
    Ok(u32),
    /// The instruction about to execute is an armed breakpoint.
    Break,
}

/// Errors a [`CoreOps`](crate::CoreOps) implementation may report back to the
/// RSP dispatcher. These never unwind the process; they're encoded as `E<hh>`
/// replies or translated into GDB stop signals.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// GDB addressed a region outside flash/SRAM/EEPROM.
    #[error("address not mapped to any memory space")]
    Unmapped,
    /// A breakpoint was requested at a PC beyond the device's flash.
    #[error("address out of range for this device")]
    OutOfRange,
    /// The opcode at the faulting PC could not be decoded.
    #[error("illegal opcode at pc={pc:#06x}")]
    IllegalOpcode { pc: u32 },
}
