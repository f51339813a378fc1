use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::buffer::{PipeOptions, PipeReader, PipeWriter, ReadBuffer, pipe};
use crate::config::MinDataRate;
use crate::handler::Handler;
use crate::protocol::HttpError;
use crate::server::EngineContext;
use crate::timeout::{TimeoutControl, TimeoutHandler};

use super::control::ConnectionControl;
use super::http1::Http1Connection;

/// Smallest free space handed to a socket read.
const MIN_READ_SIZE: usize = 2048;

/// An HTTP/1.x connection over a pair of byte streams.
///
/// Processing runs three cooperating tasks on the current task: an input pump copying socket
/// bytes into the input pipe, an output pump copying the output pipe to the socket, and the
/// request loop between them. Both pipes are bounded by the configured buffer limits, which
/// gives backpressure in both directions.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
#[derive(Debug)]
pub struct HttpConnection<R, W> {
    reader: R,
    writer: W,
    engine: Arc<EngineContext>,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, engine: Arc<EngineContext>) -> Self {
        Self { reader, writer, engine }
    }

    /// Serves requests until the connection closes.
    ///
    /// Fails with [`HttpError::ConnectionAborted`] when the connection was torn down instead of
    /// being closed after a complete response.
    pub async fn process<H>(self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler + Sync,
    {
        let Self { reader, writer, engine } = self;
        let limits = &engine.config.limits;

        let id = engine.connections.next_id();
        let (input_writer, input_reader) =
            pipe(engine.pool.clone(), PipeOptions::bounded(limits.max_request_buffer_size));
        let (output_writer, output_reader) =
            pipe(engine.pool.clone(), PipeOptions::bounded(limits.max_response_buffer_size));

        let control = Arc::new(ConnectionControl::new(id, input_reader.canceller()));
        let timeout_handler = Arc::clone(&control) as Arc<dyn TimeoutHandler>;
        let timeout = Arc::new(TimeoutControl::new(
            timeout_handler,
            Arc::clone(&engine.debugger),
            engine.config.heartbeat_interval,
        ));
        let _registration = engine.connections.register(id, Arc::clone(&timeout), Arc::clone(&control));
        debug!(connection_id = id, "connection started");

        let mut connection =
            Http1Connection::new(Arc::clone(&engine), Arc::clone(&control), Arc::clone(&timeout), input_reader, output_writer);
        let requests = async {
            connection.process_requests(handler.as_ref()).await;
            control.close_input();
        };

        tokio::join!(
            read_input(reader, input_writer, &control),
            write_output(writer, output_reader, &control, &timeout, limits.min_response_data_rate),
            requests,
        );

        if control.is_aborted() {
            debug!(connection_id = id, "connection stopped after an abort");
            return Err(HttpError::ConnectionAborted);
        }
        debug!(connection_id = id, "connection stopped");
        Ok(())
    }
}

/// Copies socket bytes into the input pipe until EOF, an error or the request loop is done.
async fn read_input<R>(mut io: R, mut pipe: PipeWriter, control: &ConnectionControl)
where
    R: AsyncRead + Unpin,
{
    let closing = control.closing_token();
    loop {
        let buf = pipe.lease(MIN_READ_SIZE);
        let read = tokio::select! {
            biased;
            () = closing.cancelled() => break,
            read = io.read(buf) => read,
        };

        match read {
            Ok(0) => {
                pipe.complete(None);
                control.on_input_completed();
                return;
            }
            Ok(n) => {
                pipe.advance(n);
                let flushed = tokio::select! {
                    biased;
                    () = closing.cancelled() => break,
                    flushed = pipe.flush() => flushed,
                };
                if flushed.is_completed() {
                    break;
                }
            }
            Err(e) => {
                debug!(connection_id = control.id(), cause = %e, "reading from the transport failed");
                pipe.complete(Some(e));
                control.on_input_completed();
                return;
            }
        }
    }
    pipe.complete(None);
}

/// Copies the output pipe to the socket until the response side completes or the connection
/// is aborted.
async fn write_output<W>(
    mut io: W,
    mut pipe: PipeReader,
    control: &ConnectionControl,
    timeout: &TimeoutControl,
    rate: Option<MinDataRate>,
) where
    W: AsyncWrite + Unpin,
{
    let abort = control.abort_token();
    loop {
        let result = tokio::select! {
            biased;
            () = abort.cancelled() => break,
            result = pipe.read() => result,
        };
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                debug!(connection_id = control.id(), cause = %e, "reading the output pipe failed");
                break;
            }
        };
        let completed = result.is_completed();
        let buffer = result.buffer();
        let len = buffer.len();

        if len > 0 {
            if let Some(rate) = rate {
                timeout.start_timing_write(len, rate);
            }
            let written = tokio::select! {
                biased;
                () = abort.cancelled() => break,
                written = write_segments(&mut io, buffer) => written,
            };
            if rate.is_some() {
                timeout.stop_timing_write();
            }
            if let Err(e) = written {
                debug!(connection_id = control.id(), cause = %e, "writing to the transport failed");
                control.abort();
                break;
            }
        }

        if pipe.advance(len, len).is_err() {
            break;
        }
        if completed {
            if let Err(e) = io.shutdown().await {
                debug!(connection_id = control.id(), cause = %e, "shutting down the transport failed");
            }
            break;
        }
    }
    pipe.complete();
}

async fn write_segments<W>(io: &mut W, buffer: &ReadBuffer) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for segment in buffer.segments() {
        io.write_all(segment).await?;
    }
    io.flush().await
}
