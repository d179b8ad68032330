//! LPT — the line printer, reserved device id `013` (§6).

use std::io::Write;
use std::sync::Arc;

use ist66_core::{Device, InterruptController};

use crate::worker::WorkerDevice;

/// A character-at-a-time printer writing raw bytes to a sink (a file, or
/// the process's own stdout for a console session).
pub struct LinePrinter {
    inner: WorkerDevice,
}

impl LinePrinter {
    pub fn new<W: Write + Send + 'static>(mut sink: W, interrupts: Arc<InterruptController>, irq: u8) -> Self {
        let inner = WorkerDevice::new(interrupts, irq, move |byte| {
            let _ = sink.write_all(&[byte]);
            let _ = sink.flush();
            0
        });
        Self { inner }
    }
}

impl Device for LinePrinter {
    fn op(&mut self, acc_in: u64, ctl: u8, transfer: u8) -> u64 {
        self.inner.op(acc_in, ctl, transfer)
    }
}
