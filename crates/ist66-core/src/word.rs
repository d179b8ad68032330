//! Word and address width constants.
//!
//! A word is 36 bits, carried in a `u64` host integer. An address is 27
//! bits. The ALU additionally produces carry (bit 36) and skip (bit 37)
//! annotations on top of a 36-bit result; those live in `ist66-alu`, not
//! here — this module only fixes the storage width every other crate
//! agrees on.

/// Width of a memory word, in bits.
pub const WORD_BITS: u32 = 36;

/// Mask selecting the low 36 bits of a `u64`.
pub const WORD_MASK: u64 = (1u64 << WORD_BITS) - 1;

/// Width of a memory address, in bits.
pub const ADDR_BITS: u32 = 27;

/// Mask selecting the low 27 bits of a `u32` address.
pub const ADDR_MASK: u32 = (1u32 << ADDR_BITS) - 1;
