//! Shared primitives for the IST-66 emulator.
//!
//! Everything addresses a 36-bit word. All components — the CPU, the IOCPU,
//! and the devices they drive — agree on the word width, the memory
//! protection model, and the interrupt controller defined here.

mod device;
mod interrupt;
mod memory;
mod observable;
mod word;

pub use device::{status_ctl, transfer, xfer_ctl, Device, DeviceError, DeviceTable};
pub use interrupt::InterruptController;
pub use memory::{Key, MemResult, MemoryUnit, PAGE_SIZE};
pub use observable::{Observable, Value};
pub use word::{ADDR_BITS, ADDR_MASK, WORD_BITS, WORD_MASK};
