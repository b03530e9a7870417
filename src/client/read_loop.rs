//! Inbound side of a connection.
//!
//! Reads up to `buffer_size` bytes at a time, frames every complete line
//! and publishes it. An unterminated tail stays in the buffer and is
//! completed by the next read, so a line split across reads is delivered
//! once, whole.

use super::{BoxedStream, Client};
use crate::error::ErrorKind;
use bytes::{Buf, BytesMut};
use slirc_proto::framer::{Frames, MAX_LINE_LEN};
use slirc_proto::ProtocolError;
use tokio::io::{AsyncReadExt, ReadHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

impl Client {
    /// Drive transport `id` until end of stream, a read failure, or
    /// cancellation, then release it.
    pub(super) async fn read_loop(
        self,
        id: u64,
        mut reader: ReadHalf<BoxedStream>,
        shutdown: CancellationToken,
    ) {
        let buffer_size = self.config().client.buffer_size.max(1);
        let mut buf = BytesMut::with_capacity(buffer_size);

        loop {
            if buf.capacity() - buf.len() < buffer_size {
                buf.reserve(buffer_size);
            }

            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Read loop cancelled");
                    break;
                }
                read = reader.read_buf(&mut buf) => read,
            };

            match read {
                Ok(0) => {
                    debug!(pending = buf.len(), "End of stream");
                    break;
                }
                Ok(n) => {
                    trace!(bytes = n, "Read chunk");
                    self.dispatch(&mut buf);
                }
                Err(e) => {
                    self.emit_error(ErrorKind::Read, e);
                    break;
                }
            }
        }

        self.close(Some(id)).await;
    }

    /// Publish every complete line in `buf` and drop it from the buffer.
    ///
    /// Malformed lines are reported as `read` errors and skipped. A tail
    /// that has grown past the line limit without a terminator is reported
    /// and discarded.
    fn dispatch(&self, buf: &mut BytesMut) {
        let consumed = {
            let mut frames = Frames::new(&buf[..]);
            for item in frames.by_ref() {
                match item {
                    Ok(message) => self.emit_raw(message),
                    Err(e) => self.emit_error(ErrorKind::Read, e),
                }
            }
            frames.consumed()
        };
        buf.advance(consumed);

        if buf.len() > MAX_LINE_LEN {
            let actual = buf.len();
            buf.clear();
            self.emit_error(
                ErrorKind::Read,
                ProtocolError::MessageTooLong {
                    actual,
                    limit: MAX_LINE_LEN,
                },
            );
        }
    }
}
