//! The IOCPU (§4.3): an 18-bit auxiliary I/O processor sharing the host's
//! word memory above its own local address window.

mod address;
mod decode;
mod iocpu;
mod registers;
mod word;

pub use address::LocalMemory;
pub use decode::{decode, EaTail18, Instruction, MrOp, Opr0, Opr1, Opr3};
pub use iocpu::{Iocpu, SharedHostMemory, StepOutcome};
pub use registers::IocpuRegs;
pub use word::{ADDR28_MASK, AUTOINDEX_HI, AUTOINDEX_LO, HOST_BASE, LOCAL_ADDR_MASK, WORD18_MASK};
