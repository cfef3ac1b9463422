pub mod traits;
pub mod vision_client;

use crate::{config::Config, error::Result};

pub use traits::{ChatBackend, ChunkStream};
pub use vision_client::VisionClient;

#[derive(Clone)]
pub struct OpenAiClient {
    vision_client: VisionClient,
}

impl OpenAiClient {
    pub fn new(config: &Config) -> Result<Self> {
        if config.api_key.is_none() {
            log::warn!("OPENAI_API_KEY is not set; analyses will be refused until it is");
        }

        Ok(Self {
            vision_client: VisionClient::new(config)?,
        })
    }

    pub fn vision(&self) -> &VisionClient {
        &self.vision_client
    }
}
