use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http_body_util::BodyExt;
use hyper::body::Body;

/// Longest log line relayed to the client, newline excluded.
pub const MAX_LINE_LEN: usize = 1024 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum LineError<E> {
    #[error("{0}")]
    Body(E),

    #[error("log line exceeds {} bytes", MAX_LINE_LEN)]
    TooLong,
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|b| *b == b'\n' || *b == b'\r')
}

/// Splits a streaming body into lines.
///
/// Each item is one line including its newline, so it can be flushed to the
/// client as its own chunk. Blank lines are dropped. The stream ends after
/// the first body error, or once a line grows past [`MAX_LINE_LEN`].
pub fn line_stream<B>(body: B) -> impl Stream<Item = Result<Bytes, LineError<B::Error>>> + Send
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Send,
{
    let chunks = Box::pin(body.into_data_stream());

    futures::stream::unfold(
        (chunks, BytesMut::new(), false),
        |(mut chunks, mut buf, mut done)| async move {
            loop {
                let newline = buf.iter().position(|b| *b == b'\n');
                let pending = newline.unwrap_or(buf.len());
                if pending > MAX_LINE_LEN {
                    buf.clear();
                    return Some((Err(LineError::TooLong), (chunks, buf, true)));
                }

                if let Some(pos) = newline {
                    let line = buf.split_to(pos + 1).freeze();
                    if is_blank(&line) {
                        continue;
                    }
                    return Some((Ok(line), (chunks, buf, done)));
                }

                if done {
                    let rest = buf.split().freeze();
                    if is_blank(&rest) {
                        return None;
                    }
                    return Some((Ok(rest), (chunks, buf, done)));
                }

                match chunks.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        buf.clear();
                        return Some((Err(LineError::Body(e)), (chunks, buf, true)));
                    }
                    None => done = true,
                }
            }
        },
    )
}
