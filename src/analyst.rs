use crate::{
    config::Config,
    error::AnalystError,
    logger,
    models::{AdditionalDetails, ChatRequest, Prompt, PromptTemplate, UploadedImage},
    openai::ChatBackend,
    relay::{relay_stream, DisplayUpdate, Surface},
};
use uuid::Uuid;

pub const SPINNER_TEXT: &str = "Analysing the image ...";

/// Everything the form holds at the moment the user acts.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub image: Option<Vec<u8>>,
    pub file_name: Option<String>,
    pub details: AdditionalDetails,
    pub template: Option<PromptTemplate>,
    /// Whether the analyse button was pressed.
    pub triggered: bool,
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, bytes: Vec<u8>, file_name: Option<String>) -> Self {
        self.image = Some(bytes).filter(|b| !b.is_empty());
        self.file_name = file_name;
        self
    }

    pub fn with_details(mut self, details: AdditionalDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn triggered(mut self) -> Self {
        self.triggered = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    MissingImage,
    MissingCredential,
    UnsupportedImage(String),
}

impl Warning {
    pub fn message(&self) -> String {
        match self {
            Warning::MissingImage => "Please upload an image.".to_string(),
            Warning::MissingCredential => "Please enter your OpenAI API key.".to_string(),
            Warning::UnsupportedImage(detail) => {
                format!("Please upload a JPG or PNG image ({}).", detail)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to do yet: the button was not pressed.
    Idle,
    /// Preconditions failed; no request was built.
    Warned(Vec<Warning>),
    Completed(String),
    Failed(String),
}

pub struct ImageAnalyst<B> {
    config: Config,
    backend: B,
}

impl<B: ChatBackend> ImageAnalyst<B> {
    pub fn new(config: Config, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Warnings to show for `submission`, or the validated image when the
    /// request may go ahead. `Ok(None)` means stay idle.
    fn check(&self, submission: &Submission) -> Result<Option<UploadedImage>, Vec<Warning>> {
        let mut warnings = Vec::new();

        let image = match (&submission.image, submission.triggered) {
            (None, true) => {
                warnings.push(Warning::MissingImage);
                None
            }
            (Some(bytes), true) => match UploadedImage::new(bytes.clone(), submission.file_name.clone()) {
                Ok(image) => Some(image),
                Err(AnalystError::UnsupportedImage(detail)) => {
                    warnings.push(Warning::UnsupportedImage(detail));
                    None
                }
                Err(_) => {
                    warnings.push(Warning::MissingImage);
                    None
                }
            },
            (_, false) => None,
        };

        if !self.config.has_credential() {
            warnings.push(Warning::MissingCredential);
        }

        if !warnings.is_empty() {
            return Err(warnings);
        }
        Ok(image)
    }

    /// Runs one user-triggered analysis, rendering every state change to
    /// `surface`.
    pub async fn analyze(&self, submission: Submission, surface: &mut dyn Surface) -> Outcome {
        let image = match self.check(&submission) {
            Ok(Some(image)) => image,
            Ok(None) => return Outcome::Idle,
            Err(warnings) => {
                for warning in &warnings {
                    log::warn!("{}", warning.message());
                    surface.render(DisplayUpdate::Warning(warning.message()));
                }
                return Outcome::Warned(warnings);
            }
        };

        let request_id = Uuid::new_v4().to_string();
        let _timer = logger::timer(&format!("analysis {}", request_id));
        surface.render(DisplayUpdate::Status(SPINNER_TEXT.to_string()));

        let encoded = image.encode();
        log::info!(
            "[req:{}] {} ({} bytes, {})",
            request_id,
            image.caption(),
            image.bytes.len(),
            encoded.mime_type
        );

        let template = submission.template.unwrap_or(self.config.template);
        let prompt = Prompt::build(template, &submission.details);
        log::debug!("[req:{}] Prompt ({}):\n{}", request_id, template, prompt.as_str());

        let request = ChatRequest::vision(
            &self.config.model,
            self.config.max_tokens,
            &prompt,
            &encoded,
            true,
        );

        let result = match self.backend.stream_chat(request).await {
            Ok(stream) => relay_stream(stream, surface).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(text) => {
                log::info!("[req:{}] Completed with {} characters", request_id, text.len());
                Outcome::Completed(text)
            }
            Err(e) => {
                log::error!(
                    "[req:{}] Analysis failed ({:?}, status {:?}): {}",
                    request_id,
                    e.kind(),
                    e.remote_status(),
                    e
                );
                let message = format!("An error occurred: {}", e);
                surface.render(DisplayUpdate::Error(message.clone()));
                Outcome::Failed(message)
            }
        }
    }
}
