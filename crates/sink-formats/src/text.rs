use sink_core::SinkData;

use crate::{reject, FormatWriter, Result};

/// TEXT accepts only `String` values (§3, §4.5); each is written
/// followed by a newline.
pub struct TextWriter {
    buf: Vec<u8>,
}

impl TextWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }
}

impl FormatWriter for TextWriter {
    fn write(&mut self, value: &SinkData) -> Result<()> {
        match value {
            SinkData::String(s) => {
                self.buf.extend_from_slice(s.as_bytes());
                self.buf.push(b'\n');
                Ok(())
            }
            other => Err(reject("text", other)),
        }
    }

    fn current_size(&self) -> u64 {
        self.buf.len() as u64
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>> {
        Ok(self.buf)
    }
}
