//! The `CoreOps` capability interface.
//!
//! This re-casts the original simulator's `GdbComm` struct of function
//! pointers (plus an opaque `user_data`) as a trait: the RSP server is
//! generic over any `impl CoreOps`, so a test double can stand in for the
//! real virtual core in unit tests.

use crate::step::{Error, StepResult};

/// Operations the GDB RSP server needs from a simulated core.
pub trait CoreOps {
    /// Reads one of the 32 general-purpose registers.
    fn read_reg(&self, num: u8) -> u8;
    /// Writes one of the 32 general-purpose registers.
    fn write_reg(&mut self, num: u8, val: u8);

    /// Reads the status register.
    fn read_sreg(&self) -> u8;
    /// Writes the status register.
    fn write_sreg(&mut self, val: u8);

    /// Reads the program counter, in words.
    fn read_pc(&self) -> u32;
    /// Writes the program counter, in words.
    fn write_pc(&mut self, val: u32);
    /// Number of addressable words in flash (exclusive upper bound for PC).
    fn max_pc(&self) -> u32;

    /// Reads a byte from the unified data-memory address space.
    fn read_sram(&self, addr: u32) -> u8;
    /// Writes a byte to the unified data-memory address space.
    fn write_sram(&mut self, addr: u32, val: u8);

    /// Reads a raw (breakpoint-transparent) flash word.
    fn read_flash(&self, addr: u32) -> u16;
    /// Writes a full flash word.
    fn write_flash(&mut self, addr: u32, val: u16);
    /// Writes only the low byte of a flash word.
    fn write_flash_lo8(&mut self, addr: u32, val: u8);
    /// Writes only the high byte of a flash word.
    fn write_flash_hi8(&mut self, addr: u32, val: u8);

    /// Reads a byte from EEPROM.
    fn read_eeprom(&self, addr: u32) -> u8;
    /// Writes a byte to EEPROM.
    fn write_eeprom(&mut self, addr: u32, val: u8);
    /// Number of addressable EEPROM bytes.
    fn eeprom_len(&self) -> u32;

    /// Arms a breakpoint at the given flash word address.
    fn insert_break(&mut self, addr: u32) -> Result<(), Error>;
    /// Disarms a breakpoint at the given flash word address.
    fn remove_break(&mut self, addr: u32);
    /// Temporarily disarms every breakpoint (used to step past a hit).
    fn disable_breakpts(&mut self);
    /// Re-arms every previously-disarmed breakpoint.
    fn enable_breakpts(&mut self);

    /// Executes exactly one instruction, runs interrupt dispatch, and probes
    /// the breakpoint set.
    fn step(&mut self) -> Result<StepResult, Error>;
    /// Resets registers, SREG, PC, and pending interrupts. Does not erase
    /// flash or EEPROM.
    fn reset(&mut self);

    /// Fetches the value and display name of the I/O register at `addr`
    /// (offset into the I/O window, i.e. not yet added to `0x20`).
    fn io_fetch(&self, addr: u32) -> (u8, &str);
    /// Number of I/O registers this device exposes.
    fn io_reg_count(&self) -> u32;

    /// Marks interrupt vector `n` as pending.
    fn irq_raise(&mut self, n: u32);
}
