//! Built-in device-variant table.
//!
//! Grounded in the original simulator's per-device tables (flash/SRAM
//! sizes, PC width, vector table), trimmed to a couple of representative
//! profiles: one 1-word-PC device, one 2-word-PC device, so both PC-width
//! code paths get exercised. All three have a small EEPROM, unlike some
//! real classic-AVR parts.

/// Baseline named I/O registers shared by every built-in device: the
/// classic-AVR port B/C/D (`PIN`/`DDR`/`PORT`) triplets and the stack
/// pointer, at their well-known classic-AVR data-memory offsets. A real
/// per-device table would vary this by part; this crate's devices all
/// share one layout for simplicity.
pub const BASELINE_IO_REGS: &[(usize, &str)] = &[
    (0x23 - 0x20, "PINB"),
    (0x24 - 0x20, "DDRB"),
    (0x25 - 0x20, "PORTB"),
    (0x26 - 0x20, "PINC"),
    (0x27 - 0x20, "DDRC"),
    (0x28 - 0x20, "PORTC"),
    (0x29 - 0x20, "PIND"),
    (0x2a - 0x20, "DDRD"),
    (0x2b - 0x20, "PORTD"),
    (0x5d - 0x20, "SPL"),
    (0x5e - 0x20, "SPH"),
];

/// A named MCU profile.
#[derive(Clone, Debug)]
pub struct DeviceVariant {
    pub name: &'static str,
    pub flash_words: usize,
    pub sram_start: u32,
    pub sram_len: usize,
    pub eeprom_len: usize,
    /// 1 or 2 flash words per program-counter unit of addressing.
    pub pc_width: u32,
    /// Interrupt vector table, flash word addresses, lowest index highest
    /// priority. Index 0 is always the reset vector.
    pub vectors: Vec<u32>,
    /// Named I/O registers, as `(offset from 0x20, name)`, bound into the
    /// I/O bank at device-setup time.
    pub io_regs: &'static [(usize, &'static str)],
}

impl DeviceVariant {
    #[must_use]
    pub fn sram_end(&self) -> u32 {
        self.sram_start + self.sram_len as u32
    }
}

/// Looks up a device by name (case-insensitive).
#[must_use]
pub fn lookup(name: &str) -> Option<DeviceVariant> {
    table().into_iter().find(|d| d.name.eq_ignore_ascii_case(name))
}

/// Every built-in device, in listing order (for `-L`).
#[must_use]
pub fn table() -> Vec<DeviceVariant> {
    vec![
        DeviceVariant {
            name: "attiny2313",
            flash_words: 1024,
            sram_start: 0x60,
            sram_len: 128,
            eeprom_len: 128,
            pc_width: 1,
            vectors: (0..17).map(|n: u32| n * 2).collect(),
            io_regs: BASELINE_IO_REGS,
        },
        DeviceVariant {
            name: "atmega8",
            flash_words: 4096,
            sram_start: 0x60,
            sram_len: 1024,
            eeprom_len: 512,
            pc_width: 1,
            vectors: (0..18).map(|n: u32| n * 2).collect(),
            io_regs: BASELINE_IO_REGS,
        },
        DeviceVariant {
            name: "atmega328p",
            flash_words: 16384,
            sram_start: 0x100,
            sram_len: 2048,
            eeprom_len: 1024,
            pc_width: 2,
            vectors: (0..26).map(|n: u32| n * 2).collect(),
            io_regs: BASELINE_IO_REGS,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup("ATmega8").is_some());
        assert!(lookup("bogus-device").is_none());
    }
}
