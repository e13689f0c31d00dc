//! Unified data-memory address space: registers, I/O window, and SRAM under
//! one flat byte address.

use log::warn;

use crate::io::IoBank;
use crate::regs::Registers;

/// Data-memory address `0x5F`: SREG, mapped into the same flat space GDB and
/// `LD`/`ST`/`IN`/`OUT` instructions see.
pub const SREG_ADDR: u32 = 0x5f;
/// Start of the I/O register window.
pub const IO_BASE: u32 = 0x20;

/// Which backing store a data-memory address resolves to.
#[derive(Debug, Eq, PartialEq)]
pub enum Region {
    Gpr(u8),
    Sreg,
    Io(usize),
    Sram(u32),
    Unmapped,
}

/// Classifies a data-memory address given the I/O window size and SRAM
/// bounds.
#[must_use]
pub fn classify(addr: u32, io_len: usize, sram_start: u32, sram_end: u32) -> Region {
    if addr < 0x20 {
        Region::Gpr(addr as u8)
    } else if addr == SREG_ADDR {
        Region::Sreg
    } else if addr < IO_BASE + io_len as u32 {
        Region::Io((addr - IO_BASE) as usize)
    } else if addr >= sram_start && addr < sram_end {
        Region::Sram(addr - sram_start)
    } else {
        Region::Unmapped
    }
}

/// Reads a byte through the unified decoder. Side-effect hooks fire only on
/// the I/O path; register and SRAM accesses never invoke hooks.
#[must_use]
pub fn read(
    addr: u32,
    regs: &Registers,
    sreg: u8,
    io: &IoBank,
    sram: &[u8],
    sram_start: u32,
) -> u8 {
    let sram_end = sram_start + sram.len() as u32;
    match classify(addr, io.len(), sram_start, sram_end) {
        Region::Gpr(n) => regs.get(n),
        Region::Sreg => sreg,
        Region::Io(i) => io.read(i),
        Region::Sram(off) => sram[off as usize],
        Region::Unmapped => {
            warn!("data memory read out of range: {addr:#06x}");
            0xff
        }
    }
}

/// Writes a byte through the unified decoder.
pub fn write(
    addr: u32,
    val: u8,
    regs: &mut Registers,
    sreg: &mut u8,
    io: &mut IoBank,
    sram: &mut [u8],
    sram_start: u32,
) {
    let sram_end = sram_start + sram.len() as u32;
    match classify(addr, io.len(), sram_start, sram_end) {
        Region::Gpr(n) => regs.set(n, val),
        Region::Sreg => *sreg = val,
        Region::Io(i) => io.write(i, val),
        Region::Sram(off) => sram[off as usize] = val,
        Region::Unmapped => warn!("data memory write out of range: {addr:#06x} <- {val:#04x}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_across_every_region() {
        let mut regs = Registers::default();
        let mut sreg = 0u8;
        let mut io = IoBank::new(64);
        let mut sram = vec![0u8; 16];

        for addr in [0x05, 0x5f, 0x21, 0x100] {
            write(addr, 0xa5, &mut regs, &mut sreg, &mut io, &mut sram, 0x100);
            assert_eq!(
                read(addr, &regs, sreg, &io, &sram, 0x100),
                0xa5,
                "addr {addr:#x}"
            );
        }
    }

    #[test]
    fn unmapped_read_returns_ff() {
        let regs = Registers::default();
        let io = IoBank::new(64);
        let sram = vec![0u8; 16];
        assert_eq!(read(0x9999, &regs, 0, &io, &sram, 0x100), 0xff);
    }
}
