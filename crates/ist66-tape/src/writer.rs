use std::io::Write;

use crate::error::NineballError;
use crate::symbol::{NineballSymbol, GROUP_DATA_BYTES, GROUP_SIZE};

/// Encodes symbols into a Nineball byte stream, buffering up to 8 symbols
/// before emitting a 9-byte group (8 data bytes + 1 extra-bits byte).
pub struct NineballWriter<W> {
    inner: W,
    buffered: Vec<NineballSymbol>,
}

impl<W: Write> NineballWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, buffered: Vec::with_capacity(GROUP_DATA_BYTES) }
    }

    fn flush_group(&mut self, pad: bool) -> Result<(), NineballError> {
        if self.buffered.is_empty() {
            return Ok(());
        }
        if pad {
            while self.buffered.len() < GROUP_DATA_BYTES {
                self.buffered.push(NineballSymbol::EraseGap);
            }
        }
        let mut group = [0u8; GROUP_SIZE];
        for (i, sym) in self.buffered.drain(..).enumerate() {
            let (byte, extra) = sym.encode();
            group[i] = byte;
            if extra {
                group[GROUP_DATA_BYTES] |= 1 << i;
            }
        }
        self.inner.write_all(&group)?;
        Ok(())
    }

    pub fn write_symbol(&mut self, symbol: NineballSymbol) -> Result<(), NineballError> {
        self.buffered.push(symbol);
        if self.buffered.len() == GROUP_DATA_BYTES {
            self.flush_group(false)?;
        }
        Ok(())
    }

    /// Flush any buffered symbols as a final group, padding with erase-gap
    /// symbols to fill it out.
    pub fn finish(mut self) -> Result<W, NineballError> {
        self.flush_group(true)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}
