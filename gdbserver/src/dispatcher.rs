//! Translates GDB remote serial protocol commands into [`CoreOps`] calls.
//!
//! Mirrors the original simulator's monolithic packet-parsing switch, but as
//! a value-returning [`Dispatcher::dispatch`] rather than inline I/O: the
//! server decides what to do with the [`Action`] it gets back.

use std::io::{self, Read};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};

use avrsim_arch::{classify, AddrSpace, CoreOps, StepResult};
use log::warn;

use crate::hex::{decode_hex, encode_byte, parse_hex_num, split_at_byte};

/// GDB's flat address for `SPL`/`SPH`; same constant the original used.
const SPL_ADDR: u32 = 0x5d;
const SPH_ADDR: u32 = 0x5e;

/// GDB's I/O register count reply. The original reports this fixed value
/// regardless of device; per-device extended I/O is left unresolved rather
/// than invented here.
const IO_REG_COUNT_REPLY: &[u8] = b"40";

/// What the server should do after a packet has been dispatched.
pub enum Action {
    /// Send this reply payload.
    Reply(Vec<u8>),
    /// Enter the run loop (`c`/`s`, possibly after signal processing).
    Run { single_step: bool },
    /// Send this reply, then close the session.
    Close(Vec<u8>),
}

/// Per-session dispatcher state.
#[derive(Default)]
pub struct Dispatcher {
    /// Set after a `c`/`s` stops on an armed breakpoint. The next resume
    /// must step past it (breakpoints disabled) before resuming normally.
    at_breakpoint: bool,
}

impl Dispatcher {
    /// Dispatches one packet payload (without the `$...#cc` framing).
    pub fn dispatch(&mut self, core: &mut impl CoreOps, packet: &[u8]) -> Action {
        let Some((&cmd, rest)) = packet.split_first() else {
            return Action::Reply(Vec::new());
        };
        match cmd {
            b'?' => Action::Reply(b"S05".to_vec()),
            b'g' => Action::Reply(read_registers(core)),
            b'G' => Action::Reply(write_registers(core, rest)),
            b'p' => Action::Reply(read_register(core, rest)),
            b'P' => Action::Reply(write_register(core, rest)),
            b'm' => Action::Reply(read_memory(core, rest)),
            b'M' => Action::Reply(write_memory(core, rest)),
            b'z' | b'Z' => Action::Reply(breakpoint(core, cmd, rest)),
            b'q' => Action::Reply(query(core, rest)),
            b'k' | b'D' => {
                core.reset();
                Action::Close(b"OK".to_vec())
            }
            b'c' | b's' => resume(rest, cmd == b's'),
            b'C' | b'S' => resume_with_signal(core, rest, cmd == b'S'),
            _ => Action::Reply(Vec::new()),
        }
    }

    /// Drives `c`/`s` to completion: steps the core until a breakpoint,
    /// illegal opcode, or cancellation, polling the connection for an
    /// out-of-band `0x03` between instructions in continue mode.
    pub fn run(
        &mut self,
        core: &mut impl CoreOps,
        stream: &mut TcpStream,
        cancel: &AtomicBool,
        single_step: bool,
    ) -> io::Result<Vec<u8>> {
        if self.at_breakpoint {
            core.disable_breakpts();
            let stepped = core.step();
            core.enable_breakpts();
            self.at_breakpoint = false;
            match stepped {
                Err(_) => return Ok(stop_reply(core, 4)),
                Ok(_) if single_step => return Ok(stop_reply(core, 5)),
                Ok(_) => {}
            }
        }

        if single_step {
            return Ok(self.drive(core, stream, cancel, true));
        }

        stream.set_nonblocking(true)?;
        let reply = self.drive(core, stream, cancel, false);
        stream.set_nonblocking(false)?;
        Ok(reply)
    }

    fn drive(
        &mut self,
        core: &mut impl CoreOps,
        stream: &mut TcpStream,
        cancel: &AtomicBool,
        single_step: bool,
    ) -> Vec<u8> {
        loop {
            match core.step() {
                Ok(StepResult::Break) => {
                    self.at_breakpoint = true;
                    return stop_reply(core, 5);
                }
                Ok(StepResult::Ok(_)) => {
                    if single_step {
                        return stop_reply(core, 5);
                    }
                }
                Err(e) => {
                    warn!("stepper error at pc={:#06x}: {e}", core.read_pc());
                    return stop_reply(core, 4);
                }
            }
            if cancel.swap(false, Ordering::SeqCst) {
                return stop_reply(core, 2);
            }
            match poll_break(stream) {
                Ok(true) => return stop_reply(core, 2),
                Ok(false) => {}
                Err(_) => return stop_reply(core, 2),
            }
        }
    }
}

/// Non-blockingly checks for an out-of-band `0x03` on `stream`. Any other
/// byte (or no data at all) is ignored; a closed peer is reported as an
/// interrupt so the run loop can stop cleanly.
fn poll_break(stream: &mut TcpStream) -> io::Result<bool> {
    let mut b = [0u8; 1];
    match stream.read(&mut b) {
        Ok(0) => Ok(true),
        Ok(_) => Ok(b[0] == 0x03),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}

fn resume(rest: &[u8], single_step: bool) -> Action {
    if rest.is_empty() {
        Action::Run { single_step }
    } else {
        // "resume at other than current address" is not supported.
        Action::Reply(Vec::new())
    }
}

fn resume_with_signal(core: &mut impl CoreOps, rest: &[u8], single_step: bool) -> Action {
    if rest.len() < 2 {
        return Action::Reply(Vec::new());
    }
    let Some(signo) = parse_hex_num(&rest[..2]) else {
        return Action::Reply(Vec::new());
    };
    if rest.len() > 3 || (rest.len() == 3 && rest[2] != b';') {
        // a trailing resume address was given; unsupported, as with c/s.
        return Action::Reply(Vec::new());
    }

    match signo {
        1 => {
            // SIGHUP: simulate a hardware reset, answering as if stopped by
            // the trap gdb sees on first connection.
            core.reset();
            return Action::Reply(b"S05".to_vec());
        }
        n if n >= 94 => core.irq_raise(n - 94),
        _ => {}
    }
    resume(&[], single_step)
}

fn read_registers(core: &impl CoreOps) -> Vec<u8> {
    let mut out = Vec::with_capacity((32 + 1 + 2 + 4) * 2);
    for n in 0..32u8 {
        encode_byte(core.read_reg(n), &mut out);
    }
    encode_byte(core.read_sreg(), &mut out);
    encode_byte(core.read_sram(SPL_ADDR), &mut out);
    encode_byte(core.read_sram(SPH_ADDR), &mut out);
    for b in core.read_pc().wrapping_mul(2).to_le_bytes() {
        encode_byte(b, &mut out);
    }
    out
}

fn write_registers(core: &mut impl CoreOps, hex: &[u8]) -> Vec<u8> {
    let Some(bytes) = decode_hex(hex) else {
        return Vec::new();
    };
    if bytes.len() < 39 {
        return Vec::new();
    }
    for (n, &b) in bytes[..32].iter().enumerate() {
        core.write_reg(n as u8, b);
    }
    core.write_sreg(bytes[32]);
    core.write_sram(SPL_ADDR, bytes[33]);
    core.write_sram(SPH_ADDR, bytes[34]);
    let pc = u32::from_le_bytes([bytes[35], bytes[36], bytes[37], bytes[38]]);
    core.write_pc(pc / 2);
    b"OK".to_vec()
}

fn read_register(core: &impl CoreOps, rest: &[u8]) -> Vec<u8> {
    let Some(reg) = parse_hex_num(rest) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    match reg {
        0..=31 => encode_byte(core.read_reg(reg as u8), &mut out),
        32 => encode_byte(core.read_sreg(), &mut out),
        33 => {
            encode_byte(core.read_sram(SPL_ADDR), &mut out);
            encode_byte(core.read_sram(SPH_ADDR), &mut out);
        }
        34 => {
            for b in core.read_pc().wrapping_mul(2).to_le_bytes() {
                encode_byte(b, &mut out);
            }
        }
        _ => return b"E00".to_vec(),
    }
    out
}

fn write_register(core: &mut impl CoreOps, rest: &[u8]) -> Vec<u8> {
    let Some((reg_s, val_s)) = split_at_byte(rest, b'=') else {
        return Vec::new();
    };
    let Some(reg) = parse_hex_num(reg_s) else {
        return Vec::new();
    };
    let Some(bytes) = decode_hex(val_s) else {
        return Vec::new();
    };
    match reg {
        0..=31 if !bytes.is_empty() => core.write_reg(reg as u8, bytes[0]),
        32 if !bytes.is_empty() => core.write_sreg(bytes[0]),
        33 if bytes.len() >= 2 => {
            core.write_sram(SPL_ADDR, bytes[0]);
            core.write_sram(SPH_ADDR, bytes[1]);
        }
        34 if bytes.len() >= 4 => {
            let pc = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            core.write_pc(pc / 2);
        }
        _ => return b"E00".to_vec(),
    }
    b"OK".to_vec()
}

fn errno(n: u8) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(b'E');
    encode_byte(n, &mut out);
    out
}

fn read_memory(core: &impl CoreOps, rest: &[u8]) -> Vec<u8> {
    let Some((addr_s, len_s)) = split_at_byte(rest, b',') else {
        return Vec::new();
    };
    let (Some(addr), Some(len)) = (parse_hex_num(addr_s), parse_hex_num(len_s)) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    match classify(addr) {
        AddrSpace::Flash { addr } => read_flash_bytes(core, addr, len, &mut out),
        AddrSpace::Sram { addr } => {
            for i in 0..len {
                encode_byte(core.read_sram(addr + i), &mut out);
            }
        }
        AddrSpace::Eeprom { addr } => {
            for i in 0..len {
                encode_byte(core.read_eeprom(addr + i), &mut out);
            }
        }
        AddrSpace::Unmapped => return errno(5),
    }
    out
}

fn read_flash_bytes(core: &impl CoreOps, mut addr: u32, mut len: u32, out: &mut Vec<u8>) {
    if len == 0 {
        return;
    }
    if addr % 2 == 1 {
        let hi = (core.read_flash(addr / 2) >> 8) as u8;
        encode_byte(hi, out);
        addr += 1;
        len -= 1;
    }
    while len > 1 {
        let word = core.read_flash(addr / 2);
        encode_byte((word & 0xff) as u8, out);
        encode_byte((word >> 8) as u8, out);
        addr += 2;
        len -= 2;
    }
    if len == 1 {
        let lo = (core.read_flash(addr / 2) & 0xff) as u8;
        encode_byte(lo, out);
    }
}

fn write_memory(core: &mut impl CoreOps, rest: &[u8]) -> Vec<u8> {
    let Some((addr_s, rest)) = split_at_byte(rest, b',') else {
        return Vec::new();
    };
    let Some((len_s, data)) = split_at_byte(rest, b':') else {
        return Vec::new();
    };
    let (Some(addr), Some(len)) = (parse_hex_num(addr_s), parse_hex_num(len_s)) else {
        return Vec::new();
    };
    let Some(bytes) = decode_hex(data) else {
        return Vec::new();
    };
    if (bytes.len() as u32) < len {
        return Vec::new();
    }
    match classify(addr) {
        AddrSpace::Flash { addr } => write_flash_bytes(core, addr, len, &bytes),
        AddrSpace::Sram { addr } => {
            for i in 0..len {
                core.write_sram(addr + i, bytes[i as usize]);
            }
        }
        AddrSpace::Eeprom { addr } => {
            for i in 0..len {
                core.write_eeprom(addr + i, bytes[i as usize]);
            }
        }
        AddrSpace::Unmapped => return errno(5),
    }
    b"OK".to_vec()
}

fn write_flash_bytes(core: &mut impl CoreOps, mut addr: u32, mut len: u32, data: &[u8]) {
    if len == 0 {
        return;
    }
    let mut i = 0usize;
    if addr % 2 == 1 {
        core.write_flash_hi8(addr / 2, data[i]);
        i += 1;
        addr += 1;
        len -= 1;
    }
    while len > 1 {
        let word = u16::from(data[i]) | (u16::from(data[i + 1]) << 8);
        core.write_flash(addr / 2, word);
        i += 2;
        addr += 2;
        len -= 2;
    }
    if len == 1 {
        core.write_flash_lo8(addr / 2, data[i]);
    }
}

fn breakpoint(core: &mut impl CoreOps, cmd: u8, rest: &[u8]) -> Vec<u8> {
    let Some((&t, rest)) = rest.split_first() else {
        return Vec::new();
    };
    if t != b'0' {
        // hardware breakpoints and watchpoints are not supported.
        return Vec::new();
    }
    let Some(rest) = rest.strip_prefix(b",") else {
        return Vec::new();
    };
    let Some((addr_s, _len_s)) = split_at_byte(rest, b',') else {
        return Vec::new();
    };
    let Some(addr) = parse_hex_num(addr_s) else {
        return Vec::new();
    };
    let word = addr / 2;
    if cmd == b'Z' {
        match core.insert_break(word) {
            Ok(()) => b"OK".to_vec(),
            Err(_) => b"E01".to_vec(),
        }
    } else {
        core.remove_break(word);
        b"OK".to_vec()
    }
}

fn query(core: &impl CoreOps, rest: &[u8]) -> Vec<u8> {
    let Some((&b'R', rest)) = rest.split_first() else {
        return Vec::new();
    };
    let Some(suffix) = rest.strip_prefix(&b"avr.io_reg"[..]) else {
        return Vec::new();
    };
    if suffix.is_empty() {
        return IO_REG_COUNT_REPLY.to_vec();
    }
    let Some(args) = suffix.strip_prefix(b":") else {
        return b"E01".to_vec();
    };
    let Some((addr_s, len_s)) = split_at_byte(args, b',') else {
        return b"E01".to_vec();
    };
    let (Some(addr), Some(len)) = (parse_hex_num(addr_s), parse_hex_num(len_s)) else {
        return b"E01".to_vec();
    };
    let mut out = Vec::new();
    for i in 0..len {
        let (val, name) = core.io_fetch(addr + i);
        out.extend_from_slice(name.as_bytes());
        out.push(b',');
        out.extend_from_slice(format!("{val:x}").as_bytes());
        out.push(b';');
    }
    out
}

fn stop_reply(core: &impl CoreOps, sig: u8) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(b'T');
    encode_byte(sig, &mut out);
    out.extend_from_slice(b"20:");
    encode_byte(core.read_sreg(), &mut out);
    out.extend_from_slice(b";21:");
    encode_byte(core.read_sram(SPL_ADDR), &mut out);
    encode_byte(core.read_sram(SPH_ADDR), &mut out);
    out.extend_from_slice(b";22:");
    for b in core.read_pc().wrapping_mul(2).to_le_bytes() {
        encode_byte(b, &mut out);
    }
    out.push(b';');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockCore {
        regs: [u8; 32],
        sreg: u8,
        sram: std::collections::HashMap<u32, u8>,
        flash: std::collections::HashMap<u32, u16>,
        eeprom: std::collections::HashMap<u32, u8>,
        pc: u32,
        breaks: std::collections::HashSet<u32>,
    }

    impl CoreOps for MockCore {
        fn read_reg(&self, num: u8) -> u8 {
            self.regs[num as usize]
        }
        fn write_reg(&mut self, num: u8, val: u8) {
            self.regs[num as usize] = val;
        }
        fn read_sreg(&self) -> u8 {
            self.sreg
        }
        fn write_sreg(&mut self, val: u8) {
            self.sreg = val;
        }
        fn read_pc(&self) -> u32 {
            self.pc
        }
        fn write_pc(&mut self, val: u32) {
            self.pc = val;
        }
        fn max_pc(&self) -> u32 {
            u32::MAX
        }
        fn read_sram(&self, addr: u32) -> u8 {
            *self.sram.get(&addr).unwrap_or(&0)
        }
        fn write_sram(&mut self, addr: u32, val: u8) {
            self.sram.insert(addr, val);
        }
        fn read_flash(&self, addr: u32) -> u16 {
            *self.flash.get(&addr).unwrap_or(&0)
        }
        fn write_flash(&mut self, addr: u32, val: u16) {
            self.flash.insert(addr, val);
        }
        fn write_flash_lo8(&mut self, addr: u32, val: u8) {
            let cur = self.read_flash(addr);
            self.flash.insert(addr, (cur & 0xff00) | u16::from(val));
        }
        fn write_flash_hi8(&mut self, addr: u32, val: u8) {
            let cur = self.read_flash(addr);
            self.flash
                .insert(addr, (cur & 0x00ff) | (u16::from(val) << 8));
        }
        fn read_eeprom(&self, addr: u32) -> u8 {
            *self.eeprom.get(&addr).unwrap_or(&0)
        }
        fn write_eeprom(&mut self, addr: u32, val: u8) {
            self.eeprom.insert(addr, val);
        }
        fn eeprom_len(&self) -> u32 {
            1024
        }
        fn insert_break(&mut self, addr: u32) -> Result<(), avrsim_arch::Error> {
            self.breaks.insert(addr);
            Ok(())
        }
        fn remove_break(&mut self, addr: u32) {
            self.breaks.remove(&addr);
        }
        fn disable_breakpts(&mut self) {}
        fn enable_breakpts(&mut self) {}
        fn step(&mut self) -> Result<StepResult, avrsim_arch::Error> {
            self.pc += 1;
            Ok(StepResult::Ok(1))
        }
        fn reset(&mut self) {
            self.regs = [0; 32];
            self.sreg = 0;
            self.pc = 0;
        }
        fn io_fetch(&self, addr: u32) -> (u8, &str) {
            (addr as u8, "PORTB")
        }
        fn io_reg_count(&self) -> u32 {
            64
        }
        fn irq_raise(&mut self, n: u32) {
            self.pc = 1000 + n;
        }
    }

    #[test]
    fn question_mark_replies_trap() {
        let mut core = MockCore::default();
        let mut disp = Dispatcher::default();
        let Action::Reply(r) = disp.dispatch(&mut core, b"?") else {
            panic!("expected Reply")
        };
        assert_eq!(r, b"S05");
    }

    #[test]
    fn g_and_capital_g_round_trip() {
        let mut core = MockCore::default();
        core.write_reg(5, 0x42);
        core.write_pc(0x1234);
        let mut disp = Dispatcher::default();
        let Action::Reply(dump) = disp.dispatch(&mut core, b"g") else {
            panic!()
        };
        let mut packet = vec![b'G'];
        packet.extend_from_slice(&dump);
        let mut core2 = MockCore::default();
        let Action::Reply(r) = disp.dispatch(&mut core2, &packet) else {
            panic!()
        };
        assert_eq!(r, b"OK");
        assert_eq!(core2.read_reg(5), 0x42);
        assert_eq!(core2.read_pc(), 0x1234);
    }

    #[test]
    fn p_register_34_is_pc_in_bytes() {
        let mut core = MockCore::default();
        core.write_pc(0x12345678 / 2);
        let mut disp = Dispatcher::default();
        let Action::Reply(r) = disp.dispatch(&mut core, b"p22") else {
            panic!()
        };
        assert_eq!(r, b"78563412");
    }

    #[test]
    fn write_register_via_capital_p_sets_pc() {
        let mut core = MockCore::default();
        let mut disp = Dispatcher::default();
        let Action::Reply(r) = disp.dispatch(&mut core, b"P22=78563412") else {
            panic!()
        };
        assert_eq!(r, b"OK");
        assert_eq!(core.read_pc(), 0x12345678 / 2);
    }

    #[test]
    fn m_reads_sram_with_offset_stripped() {
        let mut core = MockCore::default();
        core.write_sram(0x60, 0xab);
        let mut disp = Dispatcher::default();
        let Action::Reply(r) = disp.dispatch(&mut core, b"m00800060,1") else {
            panic!()
        };
        assert_eq!(r, b"ab");
    }

    #[test]
    fn m_unmapped_address_is_an_error() {
        let mut core = MockCore::default();
        let mut disp = Dispatcher::default();
        let Action::Reply(r) = disp.dispatch(&mut core, b"m00200000,1") else {
            panic!()
        };
        assert_eq!(r, b"E05");
    }

    #[test]
    fn z_and_capital_z_arm_and_disarm() {
        let mut core = MockCore::default();
        let mut disp = Dispatcher::default();
        let Action::Reply(r) = disp.dispatch(&mut core, b"Z0,0000,2") else {
            panic!()
        };
        assert_eq!(r, b"OK");
        assert!(core.breaks.contains(&0));
        let Action::Reply(r) = disp.dispatch(&mut core, b"z0,0000,2") else {
            panic!()
        };
        assert_eq!(r, b"OK");
        assert!(!core.breaks.contains(&0));
    }

    #[test]
    fn sighup_resets_and_replies_trap() {
        let mut core = MockCore::default();
        core.write_reg(1, 0xff);
        let mut disp = Dispatcher::default();
        let Action::Reply(r) = disp.dispatch(&mut core, b"C01") else {
            panic!()
        };
        assert_eq!(r, b"S05");
        assert_eq!(core.read_reg(1), 0);
    }

    #[test]
    fn signal_94_raises_vector_zero() {
        let mut core = MockCore::default();
        let mut disp = Dispatcher::default();
        match disp.dispatch(&mut core, b"C5e") {
            Action::Run { single_step } => assert!(!single_step),
            _ => panic!("expected Run"),
        }
        assert_eq!(core.pc, 1000);
    }

    #[test]
    fn io_reg_count_is_the_fixed_constant() {
        let mut core = MockCore::default();
        let mut disp = Dispatcher::default();
        let Action::Reply(r) = disp.dispatch(&mut core, b"qRavr.io_reg") else {
            panic!()
        };
        assert_eq!(r, b"40");
    }

    #[test]
    fn kill_resets_and_closes() {
        let mut core = MockCore::default();
        core.write_reg(3, 9);
        let mut disp = Dispatcher::default();
        match disp.dispatch(&mut core, b"k") {
            Action::Close(r) => assert_eq!(r, b"OK"),
            _ => panic!("expected Close"),
        }
        assert_eq!(core.read_reg(3), 0);
    }

    #[test]
    fn unknown_command_is_empty_reply() {
        let mut core = MockCore::default();
        let mut disp = Dispatcher::default();
        let Action::Reply(r) = disp.dispatch(&mut core, b"Zzz") else {
            panic!()
        };
        assert_eq!(r, Vec::<u8>::new());
    }
}
