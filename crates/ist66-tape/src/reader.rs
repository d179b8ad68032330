use std::collections::VecDeque;
use std::io::Read;

use crate::error::NineballError;
use crate::symbol::{NineballSymbol, GROUP_DATA_BYTES, GROUP_SIZE};

/// Decodes a Nineball byte stream into symbols, one 9-byte group (8 data
/// bytes + 1 extra-bits byte) at a time.
pub struct NineballReader<R> {
    inner: R,
    pending: VecDeque<NineballSymbol>,
}

impl<R: Read> NineballReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, pending: VecDeque::with_capacity(GROUP_DATA_BYTES) }
    }

    fn fill_group(&mut self) -> Result<bool, NineballError> {
        let mut group = [0u8; GROUP_SIZE];
        let mut read = 0;
        while read < GROUP_SIZE {
            let n = self.inner.read(&mut group[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        if read == 0 {
            return Ok(false);
        }
        if read != GROUP_SIZE {
            return Err(NineballError::TruncatedGroup(read));
        }
        let extra_bits = group[GROUP_DATA_BYTES];
        for (i, &byte) in group[..GROUP_DATA_BYTES].iter().enumerate() {
            let extra = extra_bits & (1 << i) != 0;
            self.pending.push_back(NineballSymbol::decode(byte, extra));
        }
        Ok(true)
    }

    /// Read the next symbol, or `None` at a clean end of stream.
    pub fn read_symbol(&mut self) -> Result<Option<NineballSymbol>, NineballError> {
        if self.pending.is_empty() && !self.fill_group()? {
            return Ok(None);
        }
        Ok(self.pending.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{ERASE_GAP, END_OF_RECORD};

    #[test]
    fn decodes_a_full_group_in_order_with_extra_bits() {
        let mut group = [0u8; GROUP_SIZE];
        group[0] = b'A';
        group[1] = ERASE_GAP;
        group[GROUP_DATA_BYTES] = 0b0000_0001; // extra bit set on symbol 0 only
        let mut r = NineballReader::new(&group[..]);
        assert_eq!(r.read_symbol().unwrap(), Some(NineballSymbol::Data(b'A', true)));
        assert_eq!(r.read_symbol().unwrap(), Some(NineballSymbol::EraseGap));
        for _ in 0..6 {
            r.read_symbol().unwrap();
        }
        assert_eq!(r.read_symbol().unwrap(), None);
    }

    #[test]
    fn truncated_final_group_is_an_error() {
        let bytes = [END_OF_RECORD, 0x02, 0x03];
        let mut r = NineballReader::new(&bytes[..]);
        match r.read_symbol() {
            Err(NineballError::TruncatedGroup(3)) => {}
            other => panic!("expected TruncatedGroup(3), got {other:?}"),
        }
    }

    #[test]
    fn empty_stream_is_clean_eof() {
        let mut r = NineballReader::new(&[][..]);
        assert_eq!(r.read_symbol().unwrap(), None);
    }
}
