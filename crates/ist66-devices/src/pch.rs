//! PCH — the paper-tape punch, reserved device id `014` (§6).

use std::io::Write;
use std::sync::Arc;

use ist66_core::{Device, InterruptController};
use ist66_tape::{NineballSymbol, NineballWriter};

use crate::worker::WorkerDevice;

/// A paper-tape punch writing Nineball-encoded symbols to a byte sink. A
/// group of 8 symbols is buffered by the codec before a 9-byte group hits
/// the sink; a reel stopped mid-group holds its tail in memory until the
/// punch is dropped, same as `ist66_tape::NineballWriter` itself.
pub struct PaperTapePunch {
    inner: WorkerDevice,
}

impl PaperTapePunch {
    pub fn new<W: Write + Send + 'static>(sink: W, interrupts: Arc<InterruptController>, irq: u8) -> Self {
        let mut writer = NineballWriter::new(sink);
        let inner = WorkerDevice::new(interrupts, irq, move |byte| {
            let _ = writer.write_symbol(NineballSymbol::Data(byte, false));
            0
        });
        Self { inner }
    }
}

impl Device for PaperTapePunch {
    fn op(&mut self, acc_in: u64, ctl: u8, transfer: u8) -> u64 {
        self.inner.op(acc_in, ctl, transfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ist66_core::{transfer as xfer, xfer_ctl};

    #[test]
    fn punches_a_byte_and_reports_done() {
        let ic = Arc::new(InterruptController::new());
        ic.set_mask(0xFFFF);
        let mut dev = PaperTapePunch::new(Vec::new(), ic, 4);
        dev.op(b'Q' as u64, xfer_ctl::START, 1);
        loop {
            if dev.op(0, 2, xfer::STATUS) & 0b10 != 0 {
                break;
            }
            std::thread::yield_now();
        }
    }
}
