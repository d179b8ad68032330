//! Error type for system construction. Per-device bind/open failures are
//! not part of this type — §7 "User-visible failure" treats those as
//! non-fatal: a one-line diagnostic on `stderr` and the device is simply
//! left unregistered, not a reason to fail [`crate::System::new`].

use std::fmt;

/// Raised by [`crate::System::new`] when the requested configuration
/// cannot be realized at all (as opposed to a single device failing to
/// bind, which is non-fatal per §7).
#[derive(Debug)]
pub enum SystemError {
    /// A `load_image` deposit named an address outside `memory_words`.
    LoadImageOutOfRange { addr: u32, memory_words: usize },
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemError::LoadImageOutOfRange { addr, memory_words } => {
                write!(f, "load image deposit at address {addr:#o} is outside the {memory_words}-word memory")
            }
        }
    }
}

impl std::error::Error for SystemError {}
