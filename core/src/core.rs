//! The virtual core: owns every backing store and drives the fetch/decode
//! /execute/interrupt loop behind [`avrsim_arch::CoreOps`].

use avrsim_arch::{CoreOps, Error, StepResult};
use log::{debug, trace};

use crate::breakpoint::BreakpointSet;
use crate::device::DeviceVariant;
use crate::eeprom::Eeprom;
use crate::flash::Flash;
use crate::interrupt::InterruptDispatcher;
use crate::io::IoBank;
use crate::isa::decode::decode;
use crate::mem;
use crate::regs::{Registers, Sreg};

/// Data-memory offset of `SPL`/`SPH`, the stack-pointer I/O registers.
const SPL_OFFSET: usize = 0x5d - 0x20;
const SPH_OFFSET: usize = 0x5e - 0x20;

/// A complete simulated MCU: registers, SREG, PC, flash, SRAM, EEPROM, the
/// I/O window, interrupts, and breakpoints.
pub struct Core {
    pub(crate) device: DeviceVariant,
    pub(crate) flash: Flash,
    pub(crate) sram: Vec<u8>,
    pub(crate) io: IoBank,
    pub(crate) eeprom: Eeprom,
    pub(crate) regs: Registers,
    pub(crate) sreg: Sreg,
    pub(crate) pc: u32,
    pub(crate) interrupts: InterruptDispatcher,
    pub(crate) breakpoints: BreakpointSet,
}

impl Core {
    #[must_use]
    pub fn new(device: DeviceVariant) -> Self {
        let flash = Flash::new(device.flash_words);
        let sram = vec![0; device.sram_len];
        let mut io = IoBank::new(crate::io::IO_REGS);
        for &(offset, name) in device.io_regs {
            io.bind(offset, name, None, None);
        }
        let eeprom = Eeprom::new(device.eeprom_len);
        let interrupts = InterruptDispatcher::new(device.vectors.clone());
        Self {
            device,
            flash,
            sram,
            io,
            eeprom,
            regs: Registers::default(),
            sreg: Sreg::new(),
            pc: 0,
            interrupts,
            breakpoints: BreakpointSet::default(),
        }
    }

    /// Loads a raw firmware image into flash.
    pub fn load_flash(&mut self, image: &[u8]) {
        self.flash.load(image);
    }

    /// Loads a raw image into EEPROM.
    pub fn load_eeprom(&mut self, image: &[u8]) {
        self.eeprom.load(image);
    }

    #[must_use]
    pub fn device(&self) -> &DeviceVariant {
        &self.device
    }

    pub(crate) fn mem_read(&self, addr: u32) -> u8 {
        mem::read(
            addr,
            &self.regs,
            u8::from(self.sreg),
            &self.io,
            &self.sram,
            self.device.sram_start,
        )
    }

    pub(crate) fn mem_write(&mut self, addr: u32, val: u8) {
        let mut sreg_byte = u8::from(self.sreg);
        mem::write(
            addr,
            val,
            &mut self.regs,
            &mut sreg_byte,
            &mut self.io,
            &mut self.sram,
            self.device.sram_start,
        );
        self.sreg = Sreg::from(sreg_byte);
    }

    pub(crate) fn sp(&self) -> u16 {
        u16::from(self.io.raw(SPL_OFFSET)) | (u16::from(self.io.raw(SPH_OFFSET)) << 8)
    }

    pub(crate) fn set_sp(&mut self, sp: u16) {
        self.io.set_raw(SPL_OFFSET, sp as u8);
        self.io.set_raw(SPH_OFFSET, (sp >> 8) as u8);
    }

    pub(crate) fn push_byte(&mut self, val: u8) {
        let sp = self.sp().wrapping_sub(1);
        self.mem_write(u32::from(sp), val);
        self.set_sp(sp);
    }

    pub(crate) fn pop_byte(&mut self) -> u8 {
        let sp = self.sp();
        let val = self.mem_read(u32::from(sp));
        self.set_sp(sp.wrapping_add(1));
        val
    }

    /// Pushes the program counter onto the stack, low byte first, per the
    /// device's PC width (2 bytes for a one-word PC, 3 for a two-word PC).
    pub(crate) fn push_pc(&mut self, pc: u32) {
        let nbytes = if self.device.pc_width == 1 { 2 } else { 3 };
        for i in 0..nbytes {
            self.push_byte((pc >> (8 * i)) as u8);
        }
    }

    pub(crate) fn pop_pc(&mut self) -> u32 {
        let nbytes = if self.device.pc_width == 1 { 2 } else { 3 };
        let mut pc = 0u32;
        for i in (0..nbytes).rev() {
            pc |= u32::from(self.pop_byte()) << (8 * i);
        }
        pc
    }

    /// Fetches the word at `pc`, advancing `pc` by one (wrapping within
    /// flash).
    pub(crate) fn fetch_word(&mut self) -> u16 {
        let word = self.flash.read_word(self.pc);
        self.advance_pc(1);
        word
    }

    pub(crate) fn advance_pc(&mut self, n: u32) {
        let len = self.flash.len() as u32;
        if len == 0 {
            return;
        }
        self.pc = (self.pc + n) % len;
    }

    pub(crate) fn set_pc_wrapping(&mut self, pc: i64) {
        let len = i64::from(self.flash.len() as u32);
        if len == 0 {
            self.pc = 0;
            return;
        }
        self.pc = pc.rem_euclid(len) as u32;
    }

    fn dispatch_interrupt(&mut self) {
        if !self.sreg.i() {
            return;
        }
        let Some((n, vector)) = self.interrupts.highest_pending() else {
            return;
        };
        self.interrupts.ack(n);
        self.sreg = self.sreg.with_i(false);
        let ret_pc = self.pc;
        self.push_pc(ret_pc);
        self.pc = vector;
        debug!("dispatched interrupt {n} -> vector {vector:#06x}");
    }
}

impl CoreOps for Core {
    fn read_reg(&self, num: u8) -> u8 {
        self.regs.get(num)
    }

    fn write_reg(&mut self, num: u8, val: u8) {
        self.regs.set(num, val);
    }

    fn read_sreg(&self) -> u8 {
        u8::from(self.sreg)
    }

    fn write_sreg(&mut self, val: u8) {
        self.sreg = Sreg::from(val);
    }

    fn read_pc(&self) -> u32 {
        self.pc
    }

    fn write_pc(&mut self, val: u32) {
        self.pc = val;
    }

    fn max_pc(&self) -> u32 {
        self.flash.len() as u32
    }

    fn read_sram(&self, addr: u32) -> u8 {
        self.mem_read(addr)
    }

    fn write_sram(&mut self, addr: u32, val: u8) {
        self.mem_write(addr, val);
    }

    fn read_flash(&self, addr: u32) -> u16 {
        self.flash.read_raw(addr)
    }

    fn write_flash(&mut self, addr: u32, val: u16) {
        let _ = self.flash.write_word(addr, val);
    }

    fn write_flash_lo8(&mut self, addr: u32, val: u8) {
        let _ = self.flash.write_lo(addr, val);
    }

    fn write_flash_hi8(&mut self, addr: u32, val: u8) {
        let _ = self.flash.write_hi(addr, val);
    }

    fn read_eeprom(&self, addr: u32) -> u8 {
        self.eeprom.read(addr)
    }

    fn write_eeprom(&mut self, addr: u32, val: u8) {
        self.eeprom.write(addr, val);
    }

    fn eeprom_len(&self) -> u32 {
        self.eeprom.len() as u32
    }

    fn insert_break(&mut self, addr: u32) -> Result<(), Error> {
        self.breakpoints.insert(&mut self.flash, addr)
    }

    fn remove_break(&mut self, addr: u32) {
        self.breakpoints.remove(&mut self.flash, addr);
    }

    fn disable_breakpts(&mut self) {
        self.breakpoints.disable_all();
    }

    fn enable_breakpts(&mut self) {
        self.breakpoints.enable_all();
    }

    fn step(&mut self) -> Result<StepResult, Error> {
        if self.breakpoints.contains(&self.flash, self.pc) {
            return Ok(StepResult::Break);
        }
        let pc_at_fetch = self.pc;
        let opcode = self.fetch_word();
        let insn = decode(opcode).ok_or(Error::IllegalOpcode { pc: pc_at_fetch })?;
        trace!("pc={pc_at_fetch:#06x} opcode={opcode:#06x} insn={insn:?}");
        let cycles = crate::isa::exec::exec(insn, self);
        self.dispatch_interrupt();
        Ok(StepResult::Ok(cycles))
    }

    fn reset(&mut self) {
        self.regs.reset();
        self.sreg = Sreg::new();
        self.pc = 0;
        self.interrupts.reset();
        self.io.reset();
    }

    fn io_fetch(&self, addr: u32) -> (u8, &str) {
        self.io.fetch(addr as usize)
    }

    fn io_reg_count(&self) -> u32 {
        self.io.len() as u32
    }

    fn irq_raise(&mut self, n: u32) {
        self.interrupts.request(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device;

    fn test_core() -> Core {
        Core::new(device::lookup("attiny2313").unwrap())
    }

    #[test]
    fn add_sets_carry_and_zero() {
        let mut core = test_core();
        core.write_reg(0, 0xff);
        core.write_reg(1, 0x01);
        core.load_flash(&[0x01, 0x0c]); // add r0, r1 -> 0x0c01
        core.step().unwrap();
        assert_eq!(core.read_reg(0), 0x00);
        let sreg = core.read_sreg();
        assert_eq!(sreg & 0b0000_0001, 1, "carry should be set");
        assert_eq!(sreg & 0b0000_0010, 0b10, "zero should be set");
    }

    #[test]
    fn breakpoint_halts_before_executing() {
        let mut core = test_core();
        core.load_flash(&[0x00, 0x00, 0x0c, 0x01]); // nop; add r0,r1
        core.insert_break(1).unwrap();
        assert_eq!(core.step().unwrap(), StepResult::Ok(1));
        assert_eq!(core.step().unwrap(), StepResult::Break);
        assert_eq!(core.read_pc(), 1);
    }

    #[test]
    fn reset_preserves_flash_clears_registers() {
        let mut core = test_core();
        core.write_reg(5, 0x42);
        core.load_flash(&[0xab, 0xcd]);
        core.reset();
        assert_eq!(core.read_reg(5), 0);
        assert_eq!(core.read_flash(0), 0xcdab);
    }

    #[test]
    fn io_fetch_reports_bound_register_names() {
        let core = test_core();
        let (_, name) = core.io_fetch(0x25 - 0x20);
        assert_eq!(name, "PORTB");
        let (_, name) = core.io_fetch(0x5d - 0x20);
        assert_eq!(name, "SPL");
    }

    #[test]
    fn rjmp_branches_relative_to_next_pc() {
        let mut core = test_core();
        // rjmp .+4 (2 words forward) encoded as 0xc002
        core.load_flash(&[0x02, 0xc0]);
        core.step().unwrap();
        assert_eq!(core.read_pc(), 3);
    }

    #[test]
    fn call_and_ret_round_trip_through_the_stack() {
        let mut core = test_core();
        core.set_sp(0x9f);
        // rcall .+2 (skip the inline nop at pc=1); target pc=2 via k=1
        core.load_flash(&[0x01, 0xd0, 0x00, 0x00, 0x08, 0x95]); // rcall +1; nop; ret
        core.step().unwrap();
        assert_eq!(core.read_pc(), 2);
        core.step().unwrap(); // ret
        assert_eq!(core.read_pc(), 1);
    }
}
