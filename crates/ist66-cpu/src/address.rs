//! Effective-address computation (§4.2), including indirect auto-modify
//! with its deferred write-back.

use crate::decode::EaTail;
use crate::exception::{Cause, Fault};
use ist66_core::{MemResult, MemoryUnit, ADDR_MASK, WORD_MASK};

/// A staged `(address, value)` pair from an indirect auto-modify. Commits
/// only after the issuing instruction completes without fault; discarded
/// on any fault or on interrupt/exception entry.
pub type DeferredWrite = (u32, u64);

fn sign_extend_6(value: u64) -> i64 {
    let v = (value & 0x3F) as i64;
    if v & 0x20 != 0 {
        v - 0x40
    } else {
        v
    }
}

/// Resolve one effective address. `ac` is the register file's general
/// accumulators; `pc`/`direct_page_base` come from `PSW`/`CW`; `key` is
/// the caller's current protection key for the indirect fetch, if any.
#[allow(clippy::too_many_arguments)]
pub fn compute_effective_address(
    ea: EaTail,
    ac: &mut [u64; 16],
    pc: u32,
    direct_page_base: u32,
    key: u8,
    memory: &MemoryUnit,
) -> Result<(u32, Option<DeferredWrite>), Fault> {
    // Indices 14/15 consume the displacement to modify AC13 itself; the
    // effective address is AC13's old/new value with no further
    // displacement applied. Every other index adds the displacement to its
    // base.
    let addr: u32 = match ea.index {
        0 => ea.disp as u32 & ADDR_MASK,
        1 => (direct_page_base << 9).wrapping_add(ea.disp as u32) & ADDR_MASK,
        2 => pc.wrapping_add(ea.disp as u32) & ADDR_MASK,
        3..=13 => {
            let base = (ac[ea.index as usize] & ADDR_MASK as u64) as u32;
            base.wrapping_add(ea.disp as u32) & ADDR_MASK
        }
        14 => {
            let old = ac[13];
            ac[13] = old.wrapping_add(ea.disp as i64 as u64) & WORD_MASK;
            (old & ADDR_MASK as u64) as u32
        }
        15 => {
            let new = ac[13].wrapping_sub(ea.disp as i64 as u64) & WORD_MASK;
            ac[13] = new;
            (new & ADDR_MASK as u64) as u32
        }
        _ => unreachable!("4-bit field"),
    };

    if !ea.indirect {
        return Ok((addr, None));
    }

    let word = match memory.read(key, addr) {
        MemResult::Ok(w) => w,
        MemResult::MemFault => return Err(Fault(Cause::Memx)),
        MemResult::KeyFault => return Err(Fault(Cause::Ppfr)),
    };
    if (word >> 35) & 1 == 0 {
        return Ok((word as u32 & ADDR_MASK, None));
    }

    let mode = (word >> 33) & 0b11;
    let imm = sign_extend_6((word >> 27) & 0x3F);
    let pointer = (word as u32) & ADDR_MASK;
    match mode {
        0 => {
            // post-increment: return the pre-mod pointer, stage pointer+imm
            let final_addr = pointer;
            let new_value = u64::from((pointer as i64 + imm) as u32 & ADDR_MASK);
            Ok((final_addr, Some((addr, new_value))))
        }
        1 => {
            // pre-decrement: stage pointer-imm at the indirect slot, return
            // the post-mod pointer as the final address.
            let new_value = u64::from((pointer as i64 - imm) as u32 & ADDR_MASK);
            let final_addr = new_value as u32;
            Ok((final_addr, Some((addr, new_value))))
        }
        _ => Err(Fault(Cause::Memx)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::EaTail;

    fn mem() -> MemoryUnit {
        MemoryUnit::new(4096)
    }

    #[test]
    fn index_zero_is_absolute() {
        let mut ac = [0u64; 16];
        let m = mem();
        let ea = EaTail { indirect: false, index: 0, disp: 0o17 };
        let (addr, deferred) = compute_effective_address(ea, &mut ac, 0, 0, 0, &m).unwrap();
        assert_eq!(addr, 0o17);
        assert!(deferred.is_none());
    }

    #[test]
    fn index_two_is_pc_relative() {
        let mut ac = [0u64; 16];
        let m = mem();
        let ea = EaTail { indirect: false, index: 2, disp: 5 };
        let (addr, _) = compute_effective_address(ea, &mut ac, 100, 0, 0, &m).unwrap();
        assert_eq!(addr, 105);
    }

    #[test]
    fn index_fourteen_post_increments_ac13() {
        let mut ac = [0u64; 16];
        ac[13] = 0o1000;
        let m = mem();
        let ea = EaTail { indirect: false, index: 14, disp: 4 };
        let (addr, _) = compute_effective_address(ea, &mut ac, 0, 0, 0, &m).unwrap();
        assert_eq!(addr, 0o1000);
        assert_eq!(ac[13], 0o1004);
    }

    #[test]
    fn index_fifteen_pre_decrements_ac13() {
        let mut ac = [0u64; 16];
        ac[13] = 0o1000;
        let m = mem();
        let ea = EaTail { indirect: false, index: 15, disp: 4 };
        let (addr, _) = compute_effective_address(ea, &mut ac, 0, 0, 0, &m).unwrap();
        assert_eq!(addr, 0o774);
        assert_eq!(ac[13], 0o774);
    }

    #[test]
    fn indirect_with_clear_high_bit_is_final_address() {
        let mut ac = [0u64; 16];
        let mut m = mem();
        m.write(0, 10, 0o123);
        let ea = EaTail { indirect: true, index: 0, disp: 10 };
        let (addr, deferred) = compute_effective_address(ea, &mut ac, 0, 0, 0, &m).unwrap();
        assert_eq!(addr, 0o123);
        assert!(deferred.is_none());
    }

    #[test]
    fn indirect_post_increment_stages_a_deferred_write() {
        let mut ac = [0u64; 16];
        let mut m = mem();
        let flagged = (1u64 << 35) | (0u64 << 33) | (2u64 << 27) | 0o100;
        m.write(0, 10, flagged);
        let ea = EaTail { indirect: true, index: 0, disp: 10 };
        let (addr, deferred) = compute_effective_address(ea, &mut ac, 0, 0, 0, &m).unwrap();
        assert_eq!(addr, 0o100);
        assert_eq!(deferred, Some((10, 0o102)));
    }

    #[test]
    fn reserved_auto_mod_mode_faults_memx() {
        let mut ac = [0u64; 16];
        let mut m = mem();
        let flagged = (1u64 << 35) | (2u64 << 33);
        m.write(0, 10, flagged);
        let ea = EaTail { indirect: true, index: 0, disp: 10 };
        let err = compute_effective_address(ea, &mut ac, 0, 0, 0, &m).unwrap_err();
        assert_eq!(err, Fault(Cause::Memx));
    }
}
