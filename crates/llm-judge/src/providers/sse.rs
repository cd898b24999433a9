//! Server-sent events framing.

use std::collections::VecDeque;

use futures::{Stream, StreamExt};

use crate::error::JudgeError;
use crate::Result;

/// Split a byte stream into the payloads of its `data:` lines.
///
/// Chunk boundaries may fall anywhere, including inside a line. Other SSE
/// fields (`event:`, `id:`, comments) are dropped. A transport error ends
/// the stream after being yielded.
pub(crate) fn data_lines<S, B, E>(stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    struct State<S> {
        inner: std::pin::Pin<Box<S>>,
        buf: Vec<u8>,
        pending: VecDeque<String>,
        done: bool,
    }

    fn drain_lines<S>(state: &mut State<S>) {
        while let Some(pos) = state.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = state.buf.drain(..=pos).collect();
            push_data(&mut state.pending, &String::from_utf8_lossy(&line));
        }
    }

    fn push_data(pending: &mut VecDeque<String>, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(data) = line.strip_prefix("data:") {
            pending.push_back(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
    }

    let state = State {
        inner: Box::pin(stream),
        buf: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(data) = state.pending.pop_front() {
                return Some((Ok(data), state));
            }
            if state.done {
                return None;
            }
            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    state.buf.extend_from_slice(chunk.as_ref());
                    drain_lines(&mut state);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(JudgeError::Http(e.to_string())), state));
                }
                None => {
                    state.done = true;
                    let rest = String::from_utf8_lossy(&state.buf).into_owned();
                    state.buf.clear();
                    push_data(&mut state.pending, &rest);
                }
            }
        }
    })
}
