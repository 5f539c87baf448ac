//! Incremental decoding of streamed chat completions
//!
//! The upstream sends newline-delimited `data: ` events. Each carries either
//! the `[DONE]` sentinel or a JSON chunk with `choices[0].delta.content`.

use crate::error::{KbgateError, Result};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;

/// Prefix of lines that carry a payload
pub const DATA_PREFIX: &str = "data: ";

/// Payload marking the end of the stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Lazy, finite, non-restartable sequence of text fragments
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Meaning of one line of the event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    Fragment(String),
    Done,
    Skip,
}

/// Interpret one line of the event stream
///
/// Lines without the data prefix, chunks without delta content and payloads
/// that are not valid JSON are all skipped.
pub fn parse_stream_line(line: &str) -> StreamLine {
    let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return StreamLine::Skip;
    };

    if payload.trim() == DONE_SENTINEL {
        return StreamLine::Done;
    }

    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(chunk) => match chunk
            .pointer("/choices/0/delta/content")
            .and_then(|c| c.as_str())
        {
            Some(text) if !text.is_empty() => StreamLine::Fragment(text.to_string()),
            _ => StreamLine::Skip,
        },
        Err(e) => {
            tracing::debug!("Skipping malformed stream line: {}", e);
            StreamLine::Skip
        }
    }
}

/// Splits raw body chunks into lines
///
/// Bytes are held until a newline arrives, so multi-byte characters split
/// across chunks are decoded intact.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, without its terminator
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.buf.drain(..=pos).collect();
        Some(
            String::from_utf8_lossy(&raw)
                .trim_end_matches(|c| c == '\r' || c == '\n')
                .to_string(),
        )
    }

    /// Whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&raw).into_owned())
    }
}

/// Turn a streamed response body into a stream of text fragments
///
/// Each body read is bounded by `idle_timeout`. The body is owned by the
/// returned stream, so dropping the stream releases the connection.
pub fn fragment_stream<S, B, E>(body: S, idle_timeout: Duration) -> FragmentStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<KbgateError> + Send + 'static,
{
    Box::pin(try_stream! {
        let mut body = Box::pin(body);
        let mut decoder = LineDecoder::default();
        let mut finished = false;

        while !finished {
            let next = tokio::time::timeout(idle_timeout, body.next())
                .await
                .map_err(|_| {
                    KbgateError::Network(format!(
                        "no stream data received within {:?}",
                        idle_timeout
                    ))
                })?;

            let chunk = match next {
                Some(chunk) => chunk.map_err(|e| -> KbgateError { e.into() })?,
                None => break,
            };
            decoder.push(chunk.as_ref());

            while let Some(line) = decoder.next_line() {
                match parse_stream_line(&line) {
                    StreamLine::Fragment(text) => yield text,
                    StreamLine::Done => {
                        finished = true;
                        break;
                    }
                    StreamLine::Skip => {}
                }
            }
        }

        if !finished {
            if let Some(line) = decoder.finish() {
                if let StreamLine::Fragment(text) = parse_stream_line(&line) {
                    yield text;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = std::result::Result<&'static [u8], KbgateError>> {
        stream::iter(
            parts
                .iter()
                .copied()
                .map(|p| Ok::<_, KbgateError>(p.as_bytes()))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(stream: FragmentStream) -> Vec<Result<String>> {
        stream.collect().await
    }

    #[test]
    fn test_parse_delta_line() {
        assert_eq!(
            parse_stream_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            StreamLine::Fragment("Hel".to_string())
        );
    }

    #[test]
    fn test_parse_sentinel() {
        assert_eq!(parse_stream_line("data: [DONE]"), StreamLine::Done);
        assert_eq!(parse_stream_line("data: [DONE]\r"), StreamLine::Done);
    }

    #[test]
    fn test_parse_skips_noise() {
        assert_eq!(parse_stream_line(""), StreamLine::Skip);
        assert_eq!(parse_stream_line(": keep-alive"), StreamLine::Skip);
        assert_eq!(parse_stream_line("event: message"), StreamLine::Skip);
        assert_eq!(parse_stream_line("data: {not json"), StreamLine::Skip);
        assert_eq!(
            parse_stream_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            StreamLine::Skip
        );
        assert_eq!(
            parse_stream_line(r#"data: {"choices":[]}"#),
            StreamLine::Skip
        );
    }

    #[test]
    fn test_line_decoder_handles_split_utf8() {
        let mut decoder = LineDecoder::default();
        let text = "data: привет\n";
        let bytes = text.as_bytes();
        // Split inside the two-byte 'п'
        decoder.push(&bytes[..7]);
        assert_eq!(decoder.next_line(), None);
        decoder.push(&bytes[7..]);
        assert_eq!(decoder.next_line().as_deref(), Some("data: привет"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_line_decoder_crlf_and_remainder() {
        let mut decoder = LineDecoder::default();
        decoder.push(b"one\r\ntwo\nthr");
        assert_eq!(decoder.next_line().as_deref(), Some("one"));
        assert_eq!(decoder.next_line().as_deref(), Some("two"));
        assert_eq!(decoder.next_line(), None);
        assert_eq!(decoder.finish().as_deref(), Some("thr"));
    }

    #[tokio::test]
    async fn test_fragments_in_order_and_stop_at_sentinel() {
        let body = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"con",
            "tent\":\"lo\"}}]}\n\ndata: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]);

        let fragments: Vec<String> = collect(fragment_stream(body, Duration::from_secs(5)))
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_malformed_line_between_valid_deltas() {
        let body = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"first\"}}]}\n",
            "data: {this is not json}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"second\"}}]}\n",
        ]);

        let fragments: Vec<String> = collect(fragment_stream(body, Duration::from_secs(5)))
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(fragments, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let body = chunks(&["data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"]);

        let fragments = collect(fragment_stream(body, Duration::from_secs(5))).await;
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_ref().unwrap(), "tail");
    }

    #[tokio::test]
    async fn test_body_error_surfaces_after_fragments() {
        let body = stream::iter(vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n".as_slice()),
            Err(KbgateError::Network("connection reset".to_string())),
        ]);

        let items = collect(fragment_stream(body, Duration::from_secs(5))).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(matches!(items[1], Err(KbgateError::Network(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout() {
        let body = stream::pending::<std::result::Result<&'static [u8], KbgateError>>();

        let items = collect(fragment_stream(body, Duration::from_secs(60))).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(KbgateError::Network(_))));
    }
}
