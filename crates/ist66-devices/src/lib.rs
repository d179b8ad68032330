//! Peripheral devices (§4.7, §5, §6): the generic worker-thread runtime and
//! the concrete PPT/LPT/PCH/TTY devices that plug into an
//! `ist66_core::DeviceTable`.

mod lpt;
mod pch;
mod ppt;
mod telnet;
mod tty;
mod worker;

pub use lpt::LinePrinter;
pub use pch::PaperTapePunch;
pub use ppt::PaperTapeReader;
pub use telnet::{greeting as telnet_greeting, TelnetFilter, OPT_ECHO, OPT_SUPPRESS_GA};
pub use tty::Tty;
pub use worker::WorkerDevice;

/// Reserved device ids from the reference configuration (§6 "I/O device
/// numbering").
pub mod ids {
    pub const PPT: usize = 0o12;
    pub const LPT: usize = 0o13;
    pub const PCH: usize = 0o14;
}
