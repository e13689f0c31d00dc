//! GDB's flat 32-bit address space, unioned across flash, SRAM, and EEPROM.

/// Data in flash has this offset from GDB's perspective.
pub const FLASH_OFFSET: u32 = 0x0000_0000;
/// Data in SRAM has this offset from GDB's perspective.
pub const SRAM_OFFSET: u32 = 0x0080_0000;
/// Data in EEPROM has this offset from GDB's perspective.
pub const EEPROM_OFFSET: u32 = 0x0081_0000;

/// Discriminated memory space a GDB address resolves into.
///
/// Kept as a variant rather than scattering `addr >= SRAM_OFFSET` comparisons
/// at every call site.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddrSpace {
    /// Word-addressed program memory; `addr` is a *byte* offset into flash.
    Flash { addr: u32 },
    /// Byte-addressed data memory.
    Sram { addr: u32 },
    /// Byte-addressed persistent memory.
    Eeprom { addr: u32 },
    /// Address doesn't belong to any known space.
    Unmapped,
}

/// Classifies a GDB address into the region it addresses.
#[must_use]
pub fn classify(gdb_addr: u32) -> AddrSpace {
    if gdb_addr >= EEPROM_OFFSET {
        AddrSpace::Eeprom {
            addr: gdb_addr - EEPROM_OFFSET,
        }
    } else if gdb_addr >= SRAM_OFFSET {
        AddrSpace::Sram {
            addr: gdb_addr - SRAM_OFFSET,
        }
    } else if gdb_addr < 0x0010_0000 {
        // Anything below the SRAM window and under a megaword of flash
        // (generous upper bound; real devices are far smaller) is flash.
        AddrSpace::Flash { addr: gdb_addr }
    } else {
        AddrSpace::Unmapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_flash() {
        assert_eq!(classify(0x0000_0000), AddrSpace::Flash { addr: 0 });
        assert_eq!(classify(0x0000_0042), AddrSpace::Flash { addr: 0x42 });
    }

    #[test]
    fn classifies_sram() {
        assert_eq!(
            classify(0x0080_0060),
            AddrSpace::Sram { addr: 0x60 }
        );
    }

    #[test]
    fn classifies_eeprom() {
        assert_eq!(classify(0x0081_0000), AddrSpace::Eeprom { addr: 0 });
    }
}
