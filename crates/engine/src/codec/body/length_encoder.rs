use std::io::Write;

use crate::protocol::ResponseError;

/// Passes response data through while holding it to the declared Content-Length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    declared: u64,
    written: u64,
}

impl LengthEncoder {
    pub fn new(declared: u64) -> Self {
        Self { declared, written: 0 }
    }

    pub fn is_finished(&self) -> bool {
        self.written == self.declared
    }

    /// Writes `data` unless it would overshoot the declared length, in which case nothing is
    /// written.
    pub fn encode<W: Write>(&mut self, data: &[u8], dst: &mut W) -> Result<(), ResponseError> {
        let written = self.written + data.len() as u64;
        if written > self.declared {
            return Err(ResponseError::TooManyBytesWritten { written, declared: self.declared });
        }
        dst.write_all(data)?;
        self.written = written;
        Ok(())
    }

    pub fn finish(&self) -> Result<(), ResponseError> {
        if self.written < self.declared {
            return Err(ResponseError::TooFewBytesWritten { written: self.written, declared: self.declared });
        }
        Ok(())
    }
}
