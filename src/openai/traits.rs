use crate::{
    error::Result,
    models::{ChatRequest, StreamChunk},
};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// A chat-completions endpoint that can stream its answer.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream>;
}
