//! The response side of a connection: encodes heads and body framing into the output pipe.

use std::io;

use bytes::{BufMut, BytesMut};
use http::StatusCode;

use crate::buffer::PipeWriter;
use crate::codec::body::PayloadEncoder;
use crate::protocol::{ResponseError, ResponseHead};

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

pub(crate) struct OutputProducer {
    writer: PipeWriter,
    head: BytesMut,
}

impl OutputProducer {
    pub(crate) fn new(writer: PipeWriter) -> Self {
        Self { writer, head: BytesMut::with_capacity(1024) }
    }

    /// Writes the status line, the headers and the blank line.
    ///
    /// The status line always says HTTP/1.1, whatever the request version.
    pub(crate) fn write_head(&mut self, response: &ResponseHead) {
        let head = &mut self.head;
        head.clear();
        write_status_line(head, response.status, response.reason_phrase());
        response.headers.encode(head);
        head.put_slice(b"\r\n");
        self.writer.put_slice(&self.head);
    }

    pub(crate) fn write_continue(&mut self) {
        self.writer.put_slice(CONTINUE);
    }

    pub(crate) fn write_body(&mut self, encoder: &mut PayloadEncoder, data: &[u8]) -> Result<(), ResponseError> {
        encoder.encode(data, &mut self.writer)
    }

    pub(crate) fn finish_body(&mut self, encoder: &mut PayloadEncoder) -> Result<(), ResponseError> {
        encoder.finish(&mut self.writer)
    }

    /// Publishes everything written and waits out backpressure.
    ///
    /// Fails once the transport side is gone.
    pub(crate) async fn flush(&mut self) -> Result<(), ResponseError> {
        let result = self.writer.flush().await;
        if result.is_completed() {
            return Err(ResponseError::Aborted);
        }
        Ok(())
    }

    pub(crate) fn complete(&mut self, error: Option<io::Error>) {
        self.writer.complete(error);
    }
}

fn write_status_line(dst: &mut BytesMut, status: StatusCode, reason: &str) {
    dst.reserve(reason.len() + 15);
    dst.put_slice(b"HTTP/1.1 ");
    dst.put_slice(status.as_str().as_bytes());
    dst.put_u8(b' ');
    dst.put_slice(reason.as_bytes());
    dst.put_slice(b"\r\n");
}
