use std::fmt;

/// Errors from decoding a Nineball byte stream.
#[derive(Debug)]
pub enum NineballError {
    /// The underlying stream ended partway through a 9-byte group, after
    /// `bytes_read` of the 9 had already been consumed.
    TruncatedGroup(usize),
    Io(std::io::Error),
}

impl fmt::Display for NineballError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TruncatedGroup(n) => write!(f, "tape stream ended {n} bytes into a 9-byte group"),
            Self::Io(e) => write!(f, "tape stream I/O error: {e}"),
        }
    }
}

impl std::error::Error for NineballError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::TruncatedGroup(_) => None,
        }
    }
}

impl From<std::io::Error> for NineballError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
