//! The IST-66 arithmetic/logic unit (§4.1).
//!
//! `compute` is a single pure function: two 36-bit operands, an input
//! carry, and a handful of selectors that are applied in a fixed order —
//! `ci` (carry override) → `op` (the arithmetic/logical operation) →
//! rotate (`rc`, `rt`) → mask (`mk`) → `cond` (the skip predicate). No
//! selector's effect depends on anything evaluated later in the chain.

use ist66_core::WORD_MASK;

/// Which bit width a post-op rotate operates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateWidth {
    /// Rotate the 36-bit result only; the carry bit is unaffected.
    Bits36,
    /// Rotate a 37-bit value formed by prepending the carry bit above the
    /// result, then split the rotated value back into carry and result.
    Bits37,
}

/// One `op` selector's arithmetic/logical operation, ops 8, 9, 11-14 are
/// reserved and behave as [`AluOp::PassA`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AluOp {
    NotA = 0,
    NegA = 1,
    PassA = 2,
    IncA = 3,
    NotAPlusB = 4,
    NegAPlusB = 5,
    Add = 6,
    And = 7,
    Or = 10,
    Xor = 15,
}

impl AluOp {
    #[must_use]
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => AluOp::NotA,
            1 => AluOp::NegA,
            3 => AluOp::IncA,
            4 => AluOp::NotAPlusB,
            5 => AluOp::NegAPlusB,
            6 => AluOp::Add,
            7 => AluOp::And,
            10 => AluOp::Or,
            15 => AluOp::Xor,
            _ => AluOp::PassA,
        }
    }
}

/// The `ci` selector: how to derive the carry the `op` stage consumes from
/// the caller-supplied input carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CarryIn {
    Preserve = 0,
    Clear = 1,
    Set = 2,
    Flip = 3,
}

impl CarryIn {
    #[must_use]
    pub fn from_u8(v: u8) -> Self {
        match v & 0x3 {
            1 => CarryIn::Clear,
            2 => CarryIn::Set,
            3 => CarryIn::Flip,
            _ => CarryIn::Preserve,
        }
    }

    fn apply(self, c: bool) -> bool {
        match self {
            CarryIn::Preserve => c,
            CarryIn::Clear => false,
            CarryIn::Set => true,
            CarryIn::Flip => !c,
        }
    }
}

/// The `cond` selector: the post-op skip predicate over the final carry
/// and the final result's zero-ness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cond {
    Never = 0,
    Carry = 1,
    Zero = 2,
    CarryAndZero = 3,
    NotCarry = 4,
    NotZero = 5,
    CarryOrZero = 6,
    Always = 7,
}

impl Cond {
    #[must_use]
    pub fn from_u8(v: u8) -> Self {
        match v & 0x7 {
            1 => Cond::Carry,
            2 => Cond::Zero,
            3 => Cond::CarryAndZero,
            4 => Cond::NotCarry,
            5 => Cond::NotZero,
            6 => Cond::CarryOrZero,
            7 => Cond::Always,
            _ => Cond::Never,
        }
    }

    fn eval(self, carry: bool, zero: bool) -> bool {
        match self {
            Cond::Never => false,
            Cond::Carry => carry,
            Cond::Zero => zero,
            Cond::CarryAndZero => carry && zero,
            Cond::NotCarry => !carry,
            Cond::NotZero => !zero,
            Cond::CarryOrZero => carry || zero,
            Cond::Always => true,
        }
    }
}

/// All inputs to one ALU evaluation.
#[derive(Debug, Clone, Copy)]
pub struct AluInput {
    pub a: u64,
    pub b: u64,
    pub carry_in: bool,
    pub op: AluOp,
    pub ci: CarryIn,
    pub cond: Cond,
    /// `nl`: when set, the caller must discard the low 36 result bits and
    /// keep only carry/skip. The ALU still computes and returns them; it
    /// is the caller's job to not load them back into a register.
    pub no_load: bool,
    pub rotate_width: RotateWidth,
    /// `rt`: signed rotate amount. Positive rotates left, negative right;
    /// magnitude is taken modulo the rotate width.
    pub rotate_amount: i8,
    /// `mk`: signed mask width. Positive replaces that many MSBs of the
    /// rotated result with the carry bit; negative replaces that many
    /// LSBs; zero masks nothing.
    pub mask: i8,
}

/// One ALU evaluation's outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluOutput {
    /// The 36-bit result, after rotate and mask.
    pub result: u64,
    pub carry: bool,
    pub skip: bool,
}

/// Evaluate the ALU pipeline: `ci` → `op` → rotate → mask → `cond`.
#[must_use]
pub fn compute(input: AluInput) -> AluOutput {
    let a = input.a & WORD_MASK;
    let b = input.b & WORD_MASK;

    let carry0 = input.ci.apply(input.carry_in);
    let (op_result, op_carry) = apply_op(input.op, a, b, carry0);
    let (rotated, carry_after_rotate) =
        apply_rotate(op_result, op_carry, input.rotate_width, input.rotate_amount);
    let masked = apply_mask(rotated, carry_after_rotate, input.mask);

    let zero = masked == 0;
    let skip = input.cond.eval(carry_after_rotate, zero);

    AluOutput {
        result: masked,
        carry: carry_after_rotate,
        skip,
    }
}

fn add36(a: u64, b: u64, carry_in: bool) -> (u64, bool) {
    let sum = a + b + u64::from(carry_in);
    (sum & WORD_MASK, sum > WORD_MASK)
}

fn apply_op(op: AluOp, a: u64, b: u64, carry_in: bool) -> (u64, bool) {
    match op {
        AluOp::NotA => ((!a) & WORD_MASK, carry_in),
        AluOp::NegA => add36((!a) & WORD_MASK, 1, false),
        AluOp::PassA => (a, carry_in),
        AluOp::IncA => add36(a, 1, false),
        AluOp::NotAPlusB => add36((!a) & WORD_MASK, b, false),
        AluOp::NegAPlusB => {
            let (neg_a, _) = add36((!a) & WORD_MASK, 1, false);
            add36(neg_a, b, false)
        }
        AluOp::Add => add36(a, b, carry_in),
        AluOp::And => (a & b, false),
        AluOp::Or => (a | b, false),
        AluOp::Xor => (a ^ b, false),
    }
}

fn rotate36(value: u64, width: u32, amount: i8) -> u64 {
    let width = i64::from(width);
    let amount = ((i64::from(amount) % width) + width) % width;
    if amount == 0 {
        return value;
    }
    let mask = (1u64 << width) - 1;
    let v = value & mask;
    #[allow(clippy::cast_sign_loss)]
    let amount = amount as u32;
    let width = width as u32;
    ((v << amount) | (v >> (width - amount))) & mask
}

fn apply_rotate(result: u64, carry: bool, width: RotateWidth, amount: i8) -> (u64, bool) {
    match width {
        RotateWidth::Bits36 => (rotate36(result & WORD_MASK, 36, amount), carry),
        RotateWidth::Bits37 => {
            let combined = (u64::from(carry) << 36) | (result & WORD_MASK);
            let rotated = rotate36(combined, 37, amount);
            (rotated & WORD_MASK, (rotated >> 36) & 1 != 0)
        }
    }
}

fn apply_mask(value: u64, carry: bool, mk: i8) -> u64 {
    let value = value & WORD_MASK;
    if mk == 0 {
        return value;
    }
    let fill = u64::from(carry);
    if mk > 0 {
        let n = u32::from(mk.unsigned_abs()).min(36);
        let fill_block = if fill == 1 { ((1u64 << n) - 1) << (36 - n) } else { 0 };
        let keep_mask = if n >= 36 { 0 } else { (1u64 << (36 - n)) - 1 };
        (value & keep_mask) | fill_block
    } else {
        let n = u32::from(mk.unsigned_abs()).min(36);
        let fill_block = if fill == 1 { (1u64 << n) - 1 } else { 0 };
        let keep_mask = if n >= 36 { 0 } else { ((1u64 << (36 - n)) - 1) << n };
        (value & keep_mask) | fill_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(a: u64, b: u64, carry_in: bool, op: AluOp) -> AluOutput {
        compute(AluInput {
            a,
            b,
            carry_in,
            op,
            ci: CarryIn::Preserve,
            cond: Cond::Never,
            no_load: false,
            rotate_width: RotateWidth::Bits36,
            rotate_amount: 0,
            mask: 0,
        })
    }

    #[test]
    fn add_matches_modular_sum_and_sets_carry_on_overflow() {
        let a = WORD_MASK;
        let b = 1;
        let out = simple(a, b, false, AluOp::Add);
        assert_eq!(out.result, (a + b) & WORD_MASK);
        assert!(out.carry);

        let out2 = simple(5, 7, false, AluOp::Add);
        assert_eq!(out2.result, 12);
        assert!(!out2.carry);
    }

    #[test]
    fn add_honors_input_carry() {
        let out = simple(1, 1, true, AluOp::Add);
        assert_eq!(out.result, 3);
    }

    #[test]
    fn ci_clear_forces_zero_carry_into_add() {
        let out = compute(AluInput {
            a: 5,
            b: 7,
            carry_in: true,
            op: AluOp::Add,
            ci: CarryIn::Clear,
            cond: Cond::Never,
            no_load: false,
            rotate_width: RotateWidth::Bits36,
            rotate_amount: 0,
            mask: 0,
        });
        assert_eq!(out.result, 12);
    }

    #[test]
    fn ci_set_forces_one_carry_into_add() {
        let out = compute(AluInput {
            a: 5,
            b: 7,
            carry_in: false,
            op: AluOp::Add,
            ci: CarryIn::Set,
            cond: Cond::Never,
            no_load: false,
            rotate_width: RotateWidth::Bits36,
            rotate_amount: 0,
            mask: 0,
        });
        assert_eq!(out.result, 13);
    }

    #[test]
    fn rotate_by_full_width_is_identity() {
        let a = 0o123_456_701_234;
        let out36 = compute(AluInput {
            a,
            b: 0,
            carry_in: false,
            op: AluOp::PassA,
            ci: CarryIn::Preserve,
            cond: Cond::Never,
            no_load: false,
            rotate_width: RotateWidth::Bits36,
            rotate_amount: 36,
            mask: 0,
        });
        assert_eq!(out36.result, a & WORD_MASK);

        let out36_neg = compute(AluInput {
            a,
            b: 0,
            carry_in: false,
            op: AluOp::PassA,
            ci: CarryIn::Preserve,
            cond: Cond::Never,
            no_load: false,
            rotate_width: RotateWidth::Bits36,
            rotate_amount: -36,
            mask: 0,
        });
        assert_eq!(out36_neg.result, a & WORD_MASK);
    }

    #[test]
    fn rotate_left_by_one_moves_msb_to_lsb() {
        let a = 1u64 << 35;
        let out = compute(AluInput {
            a,
            b: 0,
            carry_in: false,
            op: AluOp::PassA,
            ci: CarryIn::Preserve,
            cond: Cond::Never,
            no_load: false,
            rotate_width: RotateWidth::Bits36,
            rotate_amount: 1,
            mask: 0,
        });
        assert_eq!(out.result, 1);
    }

    #[test]
    fn bits37_rotate_carries_the_carry_bit_through() {
        let out = compute(AluInput {
            a: 0,
            b: 0,
            carry_in: true,
            op: AluOp::PassA,
            ci: CarryIn::Preserve,
            cond: Cond::Never,
            no_load: false,
            rotate_width: RotateWidth::Bits37,
            rotate_amount: 1,
            mask: 0,
        });
        assert_eq!(out.result, 1);
        assert!(!out.carry);
    }

    #[test]
    fn positive_mask_replaces_msbs_with_carry() {
        let out = compute(AluInput {
            a: 0,
            b: WORD_MASK,
            carry_in: false,
            op: AluOp::Add,
            ci: CarryIn::Preserve,
            cond: Cond::Never,
            no_load: false,
            rotate_width: RotateWidth::Bits36,
            rotate_amount: 0,
            mask: 4,
        });
        assert!(!out.carry);
        assert_eq!(out.result, WORD_MASK >> 4);
    }

    #[test]
    fn negative_mask_replaces_lsbs_with_carry() {
        let out = compute(AluInput {
            a: WORD_MASK,
            b: 1,
            carry_in: false,
            op: AluOp::Add,
            ci: CarryIn::Preserve,
            cond: Cond::Never,
            no_load: false,
            rotate_width: RotateWidth::Bits36,
            rotate_amount: 0,
            mask: -4,
        });
        assert!(out.carry);
        assert_eq!(out.result, 0b1111);
    }

    #[test]
    fn zero_mask_is_a_no_op() {
        let out = simple(0o17, 0, false, AluOp::PassA);
        assert_eq!(out.result, 0o17);
    }

    #[test]
    fn cond_carry_skips_only_when_carry_set() {
        let out = compute(AluInput {
            a: WORD_MASK,
            b: 1,
            carry_in: false,
            op: AluOp::Add,
            ci: CarryIn::Preserve,
            cond: Cond::Carry,
            no_load: false,
            rotate_width: RotateWidth::Bits36,
            rotate_amount: 0,
            mask: 0,
        });
        assert_eq!(out.result, 0);
        assert!(out.carry);
        assert!(out.skip);
    }

    #[test]
    fn cond_zero_skips_only_when_result_is_zero() {
        let zero_out = simple(5, 0, false, AluOp::NotAPlusB);
        let _ = zero_out;
        let out = compute(AluInput {
            a: 5,
            b: 5,
            carry_in: false,
            op: AluOp::NegAPlusB,
            ci: CarryIn::Preserve,
            cond: Cond::Zero,
            no_load: false,
            rotate_width: RotateWidth::Bits36,
            rotate_amount: 0,
            mask: 0,
        });
        assert_eq!(out.result, 0);
        assert!(out.skip);
    }

    #[test]
    fn and_or_xor_match_bitwise_semantics() {
        let a = 0o1234_5670_1234;
        let b = 0o7654_3210_7654;
        assert_eq!(simple(a, b, false, AluOp::And).result, a & b);
        assert_eq!(simple(a, b, false, AluOp::Or).result, a | b);
        assert_eq!(simple(a, b, false, AluOp::Xor).result, a ^ b);
    }

    #[test]
    fn not_a_is_ones_complement() {
        let out = simple(0, 0, false, AluOp::NotA);
        assert_eq!(out.result, WORD_MASK);
    }

    #[test]
    fn neg_a_is_twos_complement() {
        let out = simple(1, 0, false, AluOp::NegA);
        assert_eq!(out.result, WORD_MASK);
    }

    #[test]
    fn reserved_op_codes_pass_a_through() {
        for code in [8u8, 9, 11, 12, 13, 14] {
            let op = AluOp::from_u8(code);
            assert_eq!(op, AluOp::PassA);
        }
    }
}
