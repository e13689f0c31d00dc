//! Textual core-dump writer: a hex dump of every backing store, ordered
//! flash words, SRAM bytes, EEPROM bytes, registers, SREG, SP, PC.

use std::fmt::Write as _;

use crate::core::Core;

/// Renders a full textual snapshot of `core`, the way `-C` asks for on
/// exit.
#[must_use]
pub fn render(core: &Core) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "; flash ({} words)", core.flash.len());
    for addr in 0..core.flash.len() as u32 {
        let word = core.flash.read_raw(addr);
        let _ = writeln!(out, "{addr:06x}: {word:04x}");
    }

    let _ = writeln!(out, "; sram ({} bytes)", core.sram.len());
    for (off, byte) in core.sram.iter().enumerate() {
        let _ = writeln!(out, "{off:06x}: {byte:02x}");
    }

    let _ = writeln!(out, "; eeprom ({} bytes)", core.eeprom.len());
    for addr in 0..core.eeprom.len() as u32 {
        let _ = writeln!(out, "{addr:06x}: {:02x}", core.eeprom.read(addr));
    }

    let _ = writeln!(out, "; registers");
    for n in 0..32u8 {
        let _ = writeln!(out, "r{n}: {:02x}", core.regs.get(n));
    }

    let _ = writeln!(out, "sreg: {:02x}", u8::from(core.sreg));
    let _ = writeln!(out, "sp: {:04x}", core.sp());
    let _ = writeln!(out, "pc: {:06x}", core.pc);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device;

    #[test]
    fn render_includes_every_region_header() {
        let core = Core::new(device::lookup("attiny2313").unwrap());
        let text = render(&core);
        assert!(text.contains("; flash"));
        assert!(text.contains("; sram"));
        assert!(text.contains("; eeprom"));
        assert!(text.contains("; registers"));
        assert!(text.contains("sreg:"));
        assert!(text.contains("pc:"));
    }
}
