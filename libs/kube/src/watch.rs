//! Newline-delimited framing for watch response bodies.

use std::io;

use bytes::Bytes;
use futures_util::{future, Stream, StreamExt, TryStreamExt};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

use crate::api::WatchStream;
use crate::error::KubeError;

/// Longest watch record accepted before the stream is abandoned.
pub(crate) const MAX_WATCH_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Split a chunked body into one item per non-blank line.
///
/// A read error or an over-long line is yielded once and ends the stream.
/// A trailing line without a terminator is flushed when the body ends.
pub(crate) fn split_lines<S, E>(body: S, max_line_bytes: usize) -> WatchStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let reader = StreamReader::new(body.map_err(io::Error::other));

    FramedRead::new(reader, LinesCodec::new_with_max_length(max_line_bytes))
        .filter_map(move |line| {
            future::ready(match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(Ok(Bytes::from(line.trim_end().to_string()))),
                Err(e) => Some(Err(line_error(e, max_line_bytes))),
            })
        })
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        })
        .boxed()
}

fn line_error(e: LinesCodecError, limit: usize) -> KubeError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => KubeError::WatchLineTooLong { limit },
        LinesCodecError::Io(e) => KubeError::WatchRead(e),
    }
}
