//! Instruction decode for the IOCPU's 18-bit word (§4.3).
//!
//! Top 3 bits are the primary opcode; the source prose names the family
//! list (`MR`, `IO`, `OPR0`/`OPR1`/`OPR3`) but not a bit layout, so the
//! layout below is this implementation's own choice, built the same way
//! `ist66_cpu::decode` lays out the main instruction set: a compact
//! effective-address tail for the memory-reference family, and flag
//! fields for the micro-coded operate group.

fn bits(word: u32, hi: u32, lo: u32) -> u32 {
    let width = hi - lo + 1;
    let mask = if width >= 32 { u32::MAX } else { (1u32 << width) - 1 };
    (word >> lo) & mask
}

fn sign_extend(value: u32, width: u32) -> i32 {
    let shift = 32 - width;
    ((value << shift) as i32) >> shift
}

/// A decoded memory-reference tail: indirect bit, zero-page/index flags,
/// and a 12-bit signed displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EaTail18 {
    pub indirect: bool,
    pub zero_page: bool,
    pub indexed: bool,
    pub disp: i32,
}

fn decode_ea_tail(tail15: u32) -> EaTail18 {
    EaTail18 {
        indirect: bits(tail15, 14, 14) != 0,
        zero_page: bits(tail15, 13, 13) != 0,
        indexed: bits(tail15, 12, 12) != 0,
        disp: sign_extend(bits(tail15, 11, 0), 12),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MrOp {
    And,
    Tad,
    Isz,
    Dca,
    Jms,
    Jmp,
}

/// Group-1-style AC/Link micro-ops (§4.3's `OPR0`), applied in the fixed
/// order clear, complement, increment, rotate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Opr0 {
    pub cla: bool,
    pub cll: bool,
    pub cma: bool,
    pub cml: bool,
    pub iac: bool,
    pub ral: bool,
    pub rar: bool,
}

fn decode_opr0(tail15: u32) -> Opr0 {
    Opr0 {
        cla: bits(tail15, 11, 11) != 0,
        cll: bits(tail15, 10, 10) != 0,
        cma: bits(tail15, 9, 9) != 0,
        cml: bits(tail15, 8, 8) != 0,
        iac: bits(tail15, 7, 7) != 0,
        ral: bits(tail15, 6, 6) != 0,
        rar: bits(tail15, 5, 5) != 0,
    }
}

/// Group-2-style skip micro-ops (§4.3's `OPR1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Opr1 {
    pub sma: bool,
    pub sza: bool,
    pub snl: bool,
    pub reverse: bool,
    pub cla: bool,
}

fn decode_opr1(tail15: u32) -> Opr1 {
    Opr1 {
        sma: bits(tail15, 11, 11) != 0,
        sza: bits(tail15, 10, 10) != 0,
        snl: bits(tail15, 9, 9) != 0,
        reverse: bits(tail15, 8, 8) != 0,
        cla: bits(tail15, 7, 7) != 0,
    }
}

/// The `OPR3` group: the host-facing async interrupt opcode and its
/// companions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opr3 {
    /// Raise an interrupt on the host at the level in `C_IRQ`.
    Api,
    /// `C_IRQ <- AC[3:0]`.
    Ldcirq,
    /// Stop the IOCPU's execution loop.
    Hlt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Mr { op: MrOp, ea: EaTail18 },
    Io { device: u8, ctl: u8, transfer: u8 },
    Opr0(Opr0),
    Opr1(Opr1),
    Opr3(Opr3),
    Illegal,
}

const OP_AND: u32 = 0;
const OP_TAD: u32 = 1;
const OP_ISZ: u32 = 2;
const OP_DCA: u32 = 3;
const OP_JMS: u32 = 4;
const OP_JMP: u32 = 5;
const OP_IO: u32 = 6;
const OP_OPR: u32 = 7;

#[must_use]
pub fn decode(word: u32) -> Instruction {
    let opcode = bits(word, 17, 15);
    let tail = bits(word, 14, 0);

    match opcode {
        OP_AND => Instruction::Mr { op: MrOp::And, ea: decode_ea_tail(tail) },
        OP_TAD => Instruction::Mr { op: MrOp::Tad, ea: decode_ea_tail(tail) },
        OP_ISZ => Instruction::Mr { op: MrOp::Isz, ea: decode_ea_tail(tail) },
        OP_DCA => Instruction::Mr { op: MrOp::Dca, ea: decode_ea_tail(tail) },
        OP_JMS => Instruction::Mr { op: MrOp::Jms, ea: decode_ea_tail(tail) },
        OP_JMP => Instruction::Mr { op: MrOp::Jmp, ea: decode_ea_tail(tail) },
        OP_IO => {
            let device = bits(tail, 14, 8) as u8;
            let ctl = bits(tail, 7, 6) as u8;
            let transfer = bits(tail, 5, 2) as u8;
            Instruction::Io { device, ctl, transfer }
        }
        OP_OPR => {
            let group = bits(tail, 14, 13);
            match group {
                0 => Instruction::Opr0(decode_opr0(tail)),
                1 => Instruction::Opr1(decode_opr1(tail)),
                3 => {
                    let sub = bits(tail, 1, 0);
                    match sub {
                        0 => Instruction::Opr3(Opr3::Api),
                        1 => Instruction::Opr3(Opr3::Ldcirq),
                        2 => Instruction::Opr3(Opr3::Hlt),
                        _ => Instruction::Illegal,
                    }
                }
                _ => Instruction::Illegal,
            }
        }
        _ => unreachable!("3-bit field"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(opcode: u32, tail: u32) -> u32 {
        (opcode << 15) | (tail & 0x7FFF)
    }

    #[test]
    fn decodes_jmp_indirect_zero_page() {
        let tail = (1u32 << 14) | (1 << 13) | 0o17;
        let inst = decode(word(OP_JMP, tail));
        assert_eq!(
            inst,
            Instruction::Mr {
                op: MrOp::Jmp,
                ea: EaTail18 { indirect: true, zero_page: true, indexed: false, disp: 0o17 },
            }
        );
    }

    #[test]
    fn decodes_negative_displacement() {
        let tail = 0o7776; // -2 in 12-bit two's complement
        let inst = decode(word(OP_TAD, tail));
        match inst {
            Instruction::Mr { op: MrOp::Tad, ea } => assert_eq!(ea.disp, -2),
            other => panic!("expected Tad, got {other:?}"),
        }
    }

    #[test]
    fn decodes_io_fields() {
        let tail = (0o12u32 << 8) | (1 << 6) | (4 << 2);
        let inst = decode(word(OP_IO, tail));
        assert_eq!(inst, Instruction::Io { device: 0o12, ctl: 1, transfer: 4 });
    }

    #[test]
    fn decodes_opr0_flags() {
        let tail = (1u32 << 11) | (1 << 7); // CLA, IAC
        let inst = decode(word(OP_OPR, tail));
        assert_eq!(inst, Instruction::Opr0(Opr0 { cla: true, iac: true, ..Default::default() }));
    }

    #[test]
    fn decodes_opr3_api() {
        let tail = (3u32 << 13) | 0;
        let inst = decode(word(OP_OPR, tail));
        assert_eq!(inst, Instruction::Opr3(Opr3::Api));
    }
}
