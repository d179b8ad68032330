//! The IST-66 CPU interpreter (§4.2): register file, effective-address
//! computation, instruction decode and execution, and the
//! interrupt/exception-driven execution loop.

mod address;
mod cpu;
mod decode;
mod exception;
mod exec;
mod registers;

pub use cpu::{Cpu, SharedMemory, StepOutcome};
pub use decode::{decode, AmOp, EaTail, FpOp, Instruction, MdOp, MrOp, SmiOp};
pub use exception::{Cause, Fault, FaultResult};
pub use registers::{ctl, RegisterFile, AC_COUNT, CTL_COUNT, FAC_COUNT};
