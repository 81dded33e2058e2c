use sink_core::SinkData;

use crate::{reject, FormatWriter, Result};

/// BYTES accepts only `Bytes` values (§3, §4.5); raw payloads are
/// concatenated back-to-back with no delimiter.
pub struct BytesWriter {
    buf: Vec<u8>,
}

impl BytesWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }
}

impl FormatWriter for BytesWriter {
    fn write(&mut self, value: &SinkData) -> Result<()> {
        match value {
            SinkData::Bytes(b) => {
                self.buf.extend_from_slice(b);
                Ok(())
            }
            other => Err(reject("bytes", other)),
        }
    }

    fn current_size(&self) -> u64 {
        self.buf.len() as u64
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>> {
        Ok(self.buf)
    }
}
