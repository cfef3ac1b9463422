pub mod analyst;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod openai;
pub mod relay;
#[cfg(feature = "server")]
pub mod server;

pub use analyst::{ImageAnalyst, Outcome, Submission, Warning};
pub use config::{Config, ServerConfig};
pub use error::{AnalystError, ErrorKind, Result};
pub use models::*;
pub use openai::{ChatBackend, ChunkStream, OpenAiClient, VisionClient};
pub use relay::{relay_stream, DisplayUpdate, ResponseBuffer, Surface, CURSOR};
