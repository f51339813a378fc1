use std::io::Write;

use crate::protocol::ResponseError;

/// Frames response data as `size-hex CRLF data CRLF`, ending with `0 CRLF CRLF`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { eof: false }
    }

    pub fn encode<W: Write>(&mut self, data: &[u8], dst: &mut W) -> Result<(), ResponseError> {
        // an empty chunk would read as the terminator
        if self.eof || data.is_empty() {
            return Ok(());
        }
        write!(dst, "{:X}\r\n", data.len())?;
        dst.write_all(data)?;
        dst.write_all(b"\r\n")?;
        Ok(())
    }

    /// Writes the terminating chunk once.
    pub fn finish<W: Write>(&mut self, dst: &mut W) -> Result<(), ResponseError> {
        if self.eof {
            return Ok(());
        }
        self.eof = true;
        dst.write_all(b"0\r\n\r\n")?;
        Ok(())
    }
}
