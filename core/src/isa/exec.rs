//! Executes a decoded instruction against a [`Core`], mutating registers,
//! SREG, PC, memory, and I/O as the real hardware would.

use crate::core::Core;
use crate::regs::{Pair, Sreg};

use super::decode::{Insn, Ptr, PtrMode};

fn bit(v: u8, n: u32) -> bool {
    (v >> n) & 1 != 0
}

fn ptr_pair(p: Ptr) -> Pair {
    match p {
        Ptr::X => Pair::X,
        Ptr::Y => Pair::Y,
        Ptr::Z => Pair::Z,
    }
}

#[allow(clippy::nonminimal_bool)] // kept in textbook truth-table form
fn flags_add(sreg: Sreg, d: u8, r: u8, carry_in: bool) -> (u8, Sreg) {
    let sum = u16::from(d) + u16::from(r) + u16::from(carry_in);
    let result = sum as u8;
    let (d7, r7, rr7) = (bit(d, 7), bit(r, 7), bit(result, 7));
    let (d3, r3, rr3) = (bit(d, 3), bit(r, 3), bit(result, 3));
    let h = (d3 && r3) || (r3 && !rr3) || (d3 && !rr3);
    let v = (d7 && r7 && !rr7) || (!d7 && !r7 && rr7);
    let c = (d7 && r7) || (r7 && !rr7) || (d7 && !rr7);
    let sreg = sreg
        .with_h(h)
        .with_v(v)
        .with_n(rr7)
        .with_c(c)
        .with_z(result == 0)
        .with_sign_from_nv();
    (result, sreg)
}

#[allow(clippy::nonminimal_bool)] // kept in textbook truth-table form
fn flags_sub(sreg: Sreg, d: u8, r: u8, carry_in: bool, sticky_z: bool) -> (u8, Sreg) {
    let diff = i16::from(d) - i16::from(r) - i16::from(carry_in);
    let result = diff as u8;
    let (d7, r7, rr7) = (bit(d, 7), bit(r, 7), bit(result, 7));
    let (d3, r3, rr3) = (bit(d, 3), bit(r, 3), bit(result, 3));
    let h = (!d3 && r3) || (r3 && rr3) || (rr3 && !d3);
    let v = (d7 && !r7 && !rr7) || (!d7 && r7 && rr7);
    let c = (!d7 && r7) || (r7 && rr7) || (rr7 && !d7);
    let z_now = result == 0;
    let z = if sticky_z { sreg.z() && z_now } else { z_now };
    let sreg = sreg
        .with_h(h)
        .with_v(v)
        .with_n(rr7)
        .with_c(c)
        .with_z(z)
        .with_sign_from_nv();
    (result, sreg)
}

fn flags_logic(sreg: Sreg, result: u8) -> Sreg {
    sreg.with_v(false)
        .with_n(bit(result, 7))
        .with_z(result == 0)
        .with_sign_from_nv()
}

fn is_two_word(op: u16) -> bool {
    op & 0xfe0e == 0x940c // JMP
        || op & 0xfe0e == 0x940e // CALL
        || (op & 0xfe0f == 0x9000) // LDS
        || (op & 0xfe0f == 0x9200) // STS
}

fn skip_next(core: &mut Core) -> u32 {
    let next = core.flash.read_word(core.pc);
    if is_two_word(next) {
        core.advance_pc(2);
        3
    } else {
        core.advance_pc(1);
        2
    }
}

/// Executes `insn` against `core`, returning the number of clock cycles
/// consumed.
pub fn exec(insn: Insn, core: &mut Core) -> u32 {
    match insn {
        Insn::Add { d, r } => {
            let (res, sreg) = flags_add(core.sreg, core.regs.get(d), core.regs.get(r), false);
            core.regs.set(d, res);
            core.sreg = sreg;
            1
        }
        Insn::Adc { d, r } => {
            let (res, sreg) =
                flags_add(core.sreg, core.regs.get(d), core.regs.get(r), core.sreg.c());
            core.regs.set(d, res);
            core.sreg = sreg;
            1
        }
        Insn::Sub { d, r } => {
            let (res, sreg) =
                flags_sub(core.sreg, core.regs.get(d), core.regs.get(r), false, false);
            core.regs.set(d, res);
            core.sreg = sreg;
            1
        }
        Insn::Subi { d, k } => {
            let (res, sreg) = flags_sub(core.sreg, core.regs.get(d), k, false, false);
            core.regs.set(d, res);
            core.sreg = sreg;
            1
        }
        Insn::Sbc { d, r } => {
            let (res, sreg) =
                flags_sub(core.sreg, core.regs.get(d), core.regs.get(r), core.sreg.c(), true);
            core.regs.set(d, res);
            core.sreg = sreg;
            1
        }
        Insn::Sbci { d, k } => {
            let (res, sreg) = flags_sub(core.sreg, core.regs.get(d), k, core.sreg.c(), true);
            core.regs.set(d, res);
            core.sreg = sreg;
            1
        }
        Insn::And { d, r } => {
            let res = core.regs.get(d) & core.regs.get(r);
            core.regs.set(d, res);
            core.sreg = flags_logic(core.sreg, res);
            1
        }
        Insn::Andi { d, k } => {
            let res = core.regs.get(d) & k;
            core.regs.set(d, res);
            core.sreg = flags_logic(core.sreg, res);
            1
        }
        Insn::Or { d, r } => {
            let res = core.regs.get(d) | core.regs.get(r);
            core.regs.set(d, res);
            core.sreg = flags_logic(core.sreg, res);
            1
        }
        Insn::Ori { d, k } => {
            let res = core.regs.get(d) | k;
            core.regs.set(d, res);
            core.sreg = flags_logic(core.sreg, res);
            1
        }
        Insn::Eor { d, r } => {
            let res = core.regs.get(d) ^ core.regs.get(r);
            core.regs.set(d, res);
            core.sreg = flags_logic(core.sreg, res);
            1
        }
        Insn::Com { d } => {
            let res = 0xff - core.regs.get(d);
            core.regs.set(d, res);
            core.sreg = flags_logic(core.sreg, res).with_c(true);
            1
        }
        Insn::Neg { d } => {
            let orig = core.regs.get(d);
            let res = 0u8.wrapping_sub(orig);
            let h = bit(res, 3) || bit(orig, 3);
            core.regs.set(d, res);
            core.sreg = core
                .sreg
                .with_c(res != 0)
                .with_v(res == 0x80)
                .with_h(h)
                .with_n(bit(res, 7))
                .with_z(res == 0)
                .with_sign_from_nv();
            1
        }
        Insn::Inc { d } => {
            let orig = core.regs.get(d);
            let res = orig.wrapping_add(1);
            core.regs.set(d, res);
            core.sreg = core
                .sreg
                .with_v(orig == 0x7f)
                .with_n(bit(res, 7))
                .with_z(res == 0)
                .with_sign_from_nv();
            1
        }
        Insn::Dec { d } => {
            let orig = core.regs.get(d);
            let res = orig.wrapping_sub(1);
            core.regs.set(d, res);
            core.sreg = core
                .sreg
                .with_v(orig == 0x80)
                .with_n(bit(res, 7))
                .with_z(res == 0)
                .with_sign_from_nv();
            1
        }
        Insn::Cp { d, r } => {
            let (_, sreg) = flags_sub(core.sreg, core.regs.get(d), core.regs.get(r), false, false);
            core.sreg = sreg;
            1
        }
        Insn::Cpc { d, r } => {
            let (_, sreg) =
                flags_sub(core.sreg, core.regs.get(d), core.regs.get(r), core.sreg.c(), true);
            core.sreg = sreg;
            1
        }
        Insn::Cpi { d, k } => {
            let (_, sreg) = flags_sub(core.sreg, core.regs.get(d), k, false, false);
            core.sreg = sreg;
            1
        }
        Insn::Mul { d, r } => {
            let prod = u16::from(core.regs.get(d)) * u16::from(core.regs.get(r));
            core.regs.set(0, prod as u8);
            core.regs.set(1, (prod >> 8) as u8);
            core.sreg = core.sreg.with_c(bit((prod >> 8) as u8, 7)).with_z(prod == 0);
            2
        }
        Insn::Mov { d, r } => {
            core.regs.set(d, core.regs.get(r));
            1
        }
        Insn::Movw { d, r } => {
            core.regs.set(d, core.regs.get(r));
            core.regs.set(d + 1, core.regs.get(r + 1));
            1
        }
        Insn::Ldi { d, k } => {
            core.regs.set(d, k);
            1
        }

        Insn::LdPtr { d, ptr, mode } => {
            let pair = ptr_pair(ptr);
            let mut addr = core.regs.pair(pair);
            if mode == PtrMode::PreDec {
                addr = addr.wrapping_sub(1);
            }
            let val = core.mem_read(u32::from(addr));
            core.regs.set(d, val);
            match mode {
                PtrMode::PostInc => core.regs.set_pair(pair, addr.wrapping_add(1)),
                PtrMode::PreDec => core.regs.set_pair(pair, addr),
                PtrMode::Plain => {}
            }
            2
        }
        Insn::LddPtr { d, ptr, q } => {
            let addr = core.regs.pair(ptr_pair(ptr)).wrapping_add(u16::from(q));
            let val = core.mem_read(u32::from(addr));
            core.regs.set(d, val);
            2
        }
        Insn::Lds { d } => {
            let addr = core.fetch_word();
            let val = core.mem_read(u32::from(addr));
            core.regs.set(d, val);
            2
        }
        Insn::StPtr { r, ptr, mode } => {
            let pair = ptr_pair(ptr);
            let mut addr = core.regs.pair(pair);
            if mode == PtrMode::PreDec {
                addr = addr.wrapping_sub(1);
            }
            core.mem_write(u32::from(addr), core.regs.get(r));
            match mode {
                PtrMode::PostInc => core.regs.set_pair(pair, addr.wrapping_add(1)),
                PtrMode::PreDec => core.regs.set_pair(pair, addr),
                PtrMode::Plain => {}
            }
            2
        }
        Insn::StdPtr { r, ptr, q } => {
            let addr = core.regs.pair(ptr_pair(ptr)).wrapping_add(u16::from(q));
            core.mem_write(u32::from(addr), core.regs.get(r));
            2
        }
        Insn::Sts { r } => {
            let addr = core.fetch_word();
            core.mem_write(u32::from(addr), core.regs.get(r));
            2
        }
        Insn::Lpm { d, inc } => {
            let z = core.regs.pair(Pair::Z);
            let word = core.flash.read_raw(u32::from(z >> 1));
            let byte = if z & 1 == 0 { word as u8 } else { (word >> 8) as u8 };
            core.regs.set(d.unwrap_or(0), byte);
            if inc {
                core.regs.set_pair(Pair::Z, z.wrapping_add(1));
            }
            3
        }
        Insn::Spm => {
            let z = core.regs.pair(Pair::Z);
            let word = u16::from(core.regs.get(0)) | (u16::from(core.regs.get(1)) << 8);
            let _ = core.flash.write_word(u32::from(z >> 1), word);
            1
        }
        Insn::In { d, a } => {
            let val = core.io.read(a as usize);
            core.regs.set(d, val);
            1
        }
        Insn::Out { a, r } => {
            core.io.write(a as usize, core.regs.get(r));
            1
        }

        Insn::Brbs { s, k } => {
            if (u8::from(core.sreg) >> s) & 1 != 0 {
                core.set_pc_wrapping(i64::from(core.pc) + i64::from(k));
                2
            } else {
                1
            }
        }
        Insn::Brbc { s, k } => {
            if (u8::from(core.sreg) >> s) & 1 == 0 {
                core.set_pc_wrapping(i64::from(core.pc) + i64::from(k));
                2
            } else {
                1
            }
        }

        Insn::Rjmp { k } => {
            core.set_pc_wrapping(i64::from(core.pc) + i64::from(k));
            2
        }
        Insn::Jmp => {
            let target = core.fetch_word();
            core.pc = u32::from(target);
            3
        }
        Insn::Call => {
            let target = core.fetch_word();
            let ret = core.pc;
            core.push_pc(ret);
            core.pc = u32::from(target);
            4
        }
        Insn::Rcall { k } => {
            let ret = core.pc;
            core.push_pc(ret);
            core.set_pc_wrapping(i64::from(core.pc) + i64::from(k));
            3
        }
        Insn::Icall => {
            let ret = core.pc;
            core.push_pc(ret);
            core.pc = u32::from(core.regs.pair(Pair::Z));
            3
        }
        Insn::Ijmp => {
            core.pc = u32::from(core.regs.pair(Pair::Z));
            2
        }
        Insn::Eicall => {
            let ret = core.pc;
            core.push_pc(ret);
            core.pc = u32::from(core.regs.pair(Pair::Z));
            4
        }
        Insn::Eijmp => {
            core.pc = u32::from(core.regs.pair(Pair::Z));
            2
        }
        Insn::Ret => {
            core.pc = core.pop_pc();
            4
        }
        Insn::Reti => {
            core.pc = core.pop_pc();
            core.sreg = core.sreg.with_i(true);
            4
        }

        Insn::Sbi { a, b } => {
            let addr = a as usize;
            let val = core.io.raw(addr) | (1 << b);
            core.io.write(addr, val);
            2
        }
        Insn::Cbi { a, b } => {
            let addr = a as usize;
            let val = core.io.raw(addr) & !(1 << b);
            core.io.write(addr, val);
            2
        }
        Insn::Sbic { a, b } => {
            if core.io.read(a as usize) & (1 << b) == 0 {
                skip_next(core)
            } else {
                1
            }
        }
        Insn::Sbis { a, b } => {
            if core.io.read(a as usize) & (1 << b) != 0 {
                skip_next(core)
            } else {
                1
            }
        }
        Insn::Sbrc { r, b } => {
            if core.regs.get(r) & (1 << b) == 0 {
                skip_next(core)
            } else {
                1
            }
        }
        Insn::Sbrs { r, b } => {
            if core.regs.get(r) & (1 << b) != 0 {
                skip_next(core)
            } else {
                1
            }
        }
        Insn::Bst { d, b } => {
            core.sreg = core.sreg.with_t(core.regs.get(d) & (1 << b) != 0);
            1
        }
        Insn::Bld { d, b } => {
            let mut val = core.regs.get(d);
            if core.sreg.t() {
                val |= 1 << b;
            } else {
                val &= !(1 << b);
            }
            core.regs.set(d, val);
            1
        }
        Insn::Bset { s } => {
            core.sreg = Sreg::from(u8::from(core.sreg) | (1 << s));
            1
        }
        Insn::Bclr { s } => {
            core.sreg = Sreg::from(u8::from(core.sreg) & !(1 << s));
            1
        }

        Insn::Nop => 1,
        Insn::Sleep | Insn::Wdr => 1,
        Insn::Break => 1,
    }
}
