//! Word-width constants for the 18-bit IOCPU (§4.3).

/// Bits in one IOCPU instruction / arithmetic word.
pub const WORD18_BITS: u32 = 18;
/// Mask for an 18-bit arithmetic word (AC, Link-extended compute).
pub const WORD18_MASK: u32 = (1 << WORD18_BITS) - 1;

/// Size of the IOCPU's local address window; addresses at or below this
/// mask target local memory, addresses above it target the host.
pub const LOCAL_ADDR_MASK: u32 = 0x3_FFFF;
/// First host-mapped address in the IOCPU's 28-bit space.
pub const HOST_BASE: u32 = LOCAL_ADDR_MASK + 1;
/// Mask for the IOCPU's full 28-bit address span.
pub const ADDR28_MASK: u32 = (1 << 28) - 1;

/// Local memory addresses `8..=15` auto-increment their stored contents
/// when dereferenced indirectly (§4.3: "indirect self-incrementing slots
/// fixed at addresses 8..15").
pub const AUTOINDEX_LO: u32 = 8;
pub const AUTOINDEX_HI: u32 = 15;
