//! Folds a stream of text fragments into the progressively rendered output.

use crate::{error::Result, models::StreamChunk};
use futures::stream::{Stream, StreamExt};
use serde::Serialize;

/// Appended to every intermediate render while the stream is still open.
pub const CURSOR: &str = "▌";

/// One change to what the page shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "text", rename_all = "lowercase")]
pub enum DisplayUpdate {
    /// Spinner text while waiting on the model.
    Status(String),
    /// Partial output, cursor included.
    Progress(String),
    /// Complete output, no cursor.
    Final(String),
    Warning(String),
    Error(String),
}

impl DisplayUpdate {
    pub fn name(&self) -> &'static str {
        match self {
            DisplayUpdate::Status(_) => "status",
            DisplayUpdate::Progress(_) => "progress",
            DisplayUpdate::Final(_) => "final",
            DisplayUpdate::Warning(_) => "warning",
            DisplayUpdate::Error(_) => "error",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            DisplayUpdate::Status(text)
            | DisplayUpdate::Progress(text)
            | DisplayUpdate::Final(text)
            | DisplayUpdate::Warning(text)
            | DisplayUpdate::Error(text) => text,
        }
    }
}

/// Where display updates go: a page, a terminal, a test recorder.
pub trait Surface: Send {
    fn render(&mut self, update: DisplayUpdate);
}

impl Surface for Vec<DisplayUpdate> {
    fn render(&mut self, update: DisplayUpdate) {
        self.push(update);
    }
}

/// Append-only accumulation of the model's answer.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    text: String,
    fragments: usize,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment and returns the in-progress render.
    pub fn push(&mut self, fragment: &str) -> String {
        self.text.push_str(fragment);
        self.fragments += 1;
        format!("{}{}", self.text, CURSOR)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn finish(self) -> String {
        self.text
    }
}

/// Consumes `stream`, rendering every non-empty fragment as it arrives and the
/// final text once the stream ends or signals completion.
///
/// On error nothing final is rendered and the partial buffer is dropped; the
/// caller decides how to surface the failure.
pub async fn relay_stream<S>(stream: S, surface: &mut dyn Surface) -> Result<String>
where
    S: Stream<Item = Result<StreamChunk>>,
{
    futures::pin_mut!(stream);
    let mut buffer = ResponseBuffer::new();

    while let Some(item) = stream.next().await {
        let chunk = item?;
        if !chunk.chunk.is_empty() {
            surface.render(DisplayUpdate::Progress(buffer.push(&chunk.chunk)));
        }
        if chunk.done {
            if let Some(reason) = chunk.finish_reason {
                log::debug!("Stream finished: {}", reason);
            }
            break;
        }
    }

    log::debug!("Relayed {} fragments", buffer.fragments());
    let text = buffer.finish();
    surface.render(DisplayUpdate::Final(text.clone()));
    Ok(text)
}
