use crate::error::{AnalystError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// File extensions the upload control accepts.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "png", "jpeg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    /// Sniffs the format from the leading bytes.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageFormat::Png)
        } else {
            None
        }
    }
}

/// Raw bytes handed over by the upload control for one interaction.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
    format: ImageFormat,
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>, file_name: Option<String>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(AnalystError::MissingImage);
        }

        if let Some(name) = file_name.as_deref() {
            let extension = name
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .unwrap_or_default();
            if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
                return Err(AnalystError::UnsupportedImage(format!(
                    "'{}' is not one of {}",
                    name,
                    ACCEPTED_EXTENSIONS.join(", ")
                )));
            }
        }

        let format = ImageFormat::detect(&bytes).ok_or_else(|| {
            AnalystError::UnsupportedImage("content is neither JPEG nor PNG".into())
        })?;

        Ok(Self {
            file_name,
            bytes,
            format,
        })
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn caption(&self) -> &str {
        self.file_name.as_deref().unwrap_or("Uploaded image")
    }

    pub fn encode(&self) -> EncodedImage {
        EncodedImage {
            mime_type: self.format.mime_type().to_string(),
            data: STANDARD.encode(&self.bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String, // Base64 encoded
}

impl EncodedImage {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| AnalystError::SerializationError(e.to_string()))
    }
}
