//! Newline-delimited JSON framing for progress events.
//!
//! The engine pushes events into a sink; this module turns that into a pull
//! stream of encoded lines for remote consumers, and decodes such a stream on
//! the receiving side.

use crate::engine::WorkflowEngine;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use kusari_core::{EventSink, ProgressEvent, SinkError, Step};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};

/// Events buffered between a running workflow and a slow consumer.
const EVENT_BUFFER: usize = 64;

/// Encodes one event as a JSON object followed by `\n`.
pub fn encode_event(event: &ProgressEvent) -> Result<Bytes, serde_json::Error> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

/// Incremental decoder for a chunked event stream.
///
/// Partial records are buffered until their newline arrives. Records that do
/// not decode are logged and dropped.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every record it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProgressEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            events.extend(decode_line(&line));
        }
        events
    }

    /// Decodes whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<ProgressEvent> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }

    /// Number of buffered bytes not yet terminated by a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(line: &[u8]) -> Option<ProgressEvent> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(e) => {
            warn!("Dropping progress record that is not UTF-8: {}", e);
            return None;
        }
    };
    if text.is_empty() {
        return None;
    }

    match serde_json::from_str(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Dropping malformed progress record: {}", e);
            None
        }
    }
}

struct DecodeState<S> {
    chunks: std::pin::Pin<Box<S>>,
    decoder: NdjsonDecoder,
    ready: VecDeque<ProgressEvent>,
    done: bool,
}

/// Turns a chunked byte stream into a stream of events.
///
/// A transport error ends the stream.
pub fn decode_stream<S, B, E>(chunks: S) -> impl Stream<Item = ProgressEvent>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let state = DecodeState {
        chunks: Box::pin(chunks),
        decoder: NdjsonDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((event, state));
            }
            if state.done {
                return None;
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(chunk.as_ref());
                    state.ready.extend(events);
                }
                Some(Err(e)) => {
                    warn!("Progress stream interrupted: {}", e);
                    state.done = true;
                }
                None => {
                    let last = state.decoder.finish();
                    state.ready.extend(last);
                    state.done = true;
                }
            }
        }
    })
}

/// Sink that forwards events over a bounded channel.
///
/// Fails with [`SinkError::Closed`] once the receiver is dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Creates a sink together with the receiving end.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: ProgressEvent) -> Result<(), SinkError> {
        self.tx.send(event).await.map_err(|_| SinkError::Closed)
    }
}

/// Starts a run in the background and returns its events as a stream.
///
/// If the run aborts, an `ERROR` event is the last item. The stream ends after
/// the terminal event. Dropping the stream does not stop the run.
pub fn stream_events(
    engine: Arc<WorkflowEngine>,
    name: String,
    steps: Vec<Step>,
) -> impl Stream<Item = ProgressEvent> + Send + 'static {
    let (sink, rx) = ChannelSink::channel(EVENT_BUFFER);

    tokio::spawn(async move {
        if let Err(e) = engine.execute(&name, steps, &sink).await {
            error!("Workflow run aborted: {}", e);
            let message = e.to_string();
            if sink.emit(ProgressEvent::Error { message }).await.is_err() {
                warn!("Consumer left before the error event was delivered");
            }
        }
    });

    ReceiverStream::new(rx)
}

/// Like [`stream_events`], with every event encoded as one NDJSON line.
pub fn stream_run(
    engine: Arc<WorkflowEngine>,
    name: String,
    steps: Vec<Step>,
) -> impl Stream<Item = Bytes> + Send + 'static {
    stream_events(engine, name, steps).filter_map(|event| async move {
        match encode_event(&event) {
            Ok(line) => Some(line),
            Err(e) => {
                error!("Failed to encode {} event: {}", event.kind(), e);
                None
            }
        }
    })
}

/// Writes encoded events to an async writer, flushing after each record.
#[derive(Debug)]
pub struct NdjsonWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_event(&mut self, event: &ProgressEvent) -> std::io::Result<()> {
        let line = encode_event(event)?;
        self.writer.write_all(&line).await?;
        self.writer.flush().await
    }
}
