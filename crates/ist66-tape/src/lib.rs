//! Nineball `.nbt` tape codec (§6, Glossary "Nineball tape"): a 9-bit
//! symbol stream packed 8 data bytes + 1 extra-bits byte per group, with
//! four in-band control symbols. Consumed by the PPT/PCH devices in
//! `ist66-devices`; the AWS tape format and the `tap2nbt`/`nbt2tap`
//! conversion CLIs remain external per the core spec's Non-goals.

mod error;
mod reader;
mod symbol;
mod writer;

pub use error::NineballError;
pub use reader::NineballReader;
pub use symbol::{NineballSymbol, END_OF_MEDIUM, END_OF_RECORD, ERASE_GAP, GROUP_DATA_BYTES, GROUP_SIZE, TAPE_MARK};
pub use writer::NineballWriter;
