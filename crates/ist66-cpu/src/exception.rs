//! The exception-cause taxonomy (§7) and the fault type internal
//! execution uses to unwind out of a partially-executed instruction.

use std::fmt;

/// The 4-bit cause nibble written into `CW` on exception entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cause {
    User = 0,
    Inst = 1,
    Memx = 2,
    Devx = 3,
    Ppfr = 4,
    Ppfw = 5,
    Ppfs = 6,
    Time = 7,
    Divz = 8,
    Nfpu = 9,
    Mchk = 10,
    Pwrf = 11,
}

impl Cause {
    #[must_use]
    pub fn as_nibble(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cause::User => "USER",
            Cause::Inst => "INST",
            Cause::Memx => "MEMX",
            Cause::Devx => "DEVX",
            Cause::Ppfr => "PPFR",
            Cause::Ppfw => "PPFW",
            Cause::Ppfs => "PPFS",
            Cause::Time => "TIME",
            Cause::Divz => "DIVZ",
            Cause::Nfpu => "NFPU",
            Cause::Mchk => "MCHK",
            Cause::Pwrf => "PWRF",
        };
        write!(f, "{name}")
    }
}

/// Raised by any stage of instruction execution; the execution loop turns
/// every `Fault` into an exception entry at IRQ 0, discarding whatever
/// deferred state the faulting instruction had staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault(pub Cause);

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exception {}", self.0)
    }
}

impl std::error::Error for Fault {}

pub type FaultResult<T> = Result<T, Fault>;
