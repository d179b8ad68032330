//! PPT — the paper-tape reader, reserved device id `012` (§6).

use std::io::Read;
use std::sync::Arc;

use ist66_core::{Device, InterruptController};
use ist66_tape::{NineballReader, NineballSymbol};

use crate::worker::WorkerDevice;

/// A paper-tape reader backed by a Nineball-encoded byte source. Each
/// completed input transfer advances one symbol; end of medium repeats
/// `0x00` forever, matching a reader left running past the end of the reel.
pub struct PaperTapeReader {
    inner: WorkerDevice,
}

impl PaperTapeReader {
    pub fn new<R: Read + Send + 'static>(source: R, interrupts: Arc<InterruptController>, irq: u8) -> Self {
        let mut reader = NineballReader::new(source);
        let inner = WorkerDevice::new(interrupts, irq, move |_| match reader.read_symbol() {
            Ok(Some(sym)) => symbol_byte(sym),
            _ => 0,
        });
        Self { inner }
    }
}

fn symbol_byte(sym: NineballSymbol) -> u8 {
    match sym {
        NineballSymbol::Data(byte, _extra) => byte,
        NineballSymbol::EndOfRecord => ist66_tape::END_OF_RECORD,
        NineballSymbol::TapeMark => ist66_tape::TAPE_MARK,
        NineballSymbol::EraseGap => ist66_tape::ERASE_GAP,
        NineballSymbol::EndOfMedium => ist66_tape::END_OF_MEDIUM,
    }
}

impl Device for PaperTapeReader {
    fn op(&mut self, acc_in: u64, ctl: u8, transfer: u8) -> u64 {
        self.inner.op(acc_in, ctl, transfer)
    }
}
