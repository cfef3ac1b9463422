use crate::{
    config::Config,
    error::{AnalystError, Result},
    models::{
        ChatCompletion, ChatCompletionChunk, ChatRequest, EncodedImage, Prompt, StreamChunk,
        VisionResponse,
    },
    openai::traits::{ChatBackend, ChunkStream},
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client};
use tokio_stream::wrappers::ReceiverStream;

const DONE_MARKER: &str = "[DONE]";

#[derive(Clone)]
pub struct VisionClient {
    client: Client,
    api_key: Option<String>,
    url: String,
    model: String,
    max_tokens: u32,
}

impl VisionClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AnalystError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            url: config.completions_url(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn build_request(&self, prompt: &Prompt, image: &EncodedImage, stream: bool) -> ChatRequest {
        ChatRequest::vision(&self.model, self.max_tokens, prompt, image, stream)
    }

    async fn send(&self, request: &ChatRequest, accept: &str) -> Result<reqwest::Response> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AnalystError::MissingCredential)?;

        log::info!("Invoking model: {} (stream: {})", request.model, request.stream);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .header(header::ACCEPT, accept)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                log::error!("Chat completion request failed: {:?}", e);
                AnalystError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".into());
            log::error!("Chat completion API error {}: {}", status, message);
            return Err(AnalystError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    pub async fn generate(&self, request: ChatRequest) -> Result<VisionResponse> {
        let request = ChatRequest {
            stream: false,
            ..request
        };
        let response = self.send(&request, "application/json").await?;

        let body = response.text().await?;
        let completion: ChatCompletion = serde_json::from_str(&body)
            .map_err(|e| AnalystError::ResponseError(e.to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AnalystError::ResponseError("No choices returned".into()))?;

        Ok(VisionResponse {
            text: choice.message.content.unwrap_or_default(),
            model: completion.model.unwrap_or(request.model),
            finish_reason: choice.finish_reason,
        })
    }

    pub async fn generate_stream(&self, request: ChatRequest) -> Result<ChunkStream> {
        let request = ChatRequest {
            stream: true,
            ..request
        };
        let response = self.send(&request, "text/event-stream").await?;

        let (tx, rx) = tokio::sync::mpsc::channel(100);
        let mut bytes = response.bytes_stream();

        tokio::spawn(async move {
            let mut lines = LineBuffer::default();

            while let Some(next) = bytes.next().await {
                let data = match next {
                    Ok(data) => data,
                    Err(e) => {
                        let _ = tx.send(Err(AnalystError::StreamError(e.to_string()))).await;
                        return;
                    }
                };
                lines.extend(&data);

                while let Some(line) = lines.next_line() {
                    let result = match line {
                        Ok(line) => match Self::parse_sse_line(line.trim()) {
                            Some(result) => result,
                            None => continue,
                        },
                        Err(e) => Err(e),
                    };
                    let finished = matches!(&result, Ok(chunk) if chunk.done) || result.is_err();
                    if tx.send(result).await.is_err() || finished {
                        return;
                    }
                }
            }

            let tail = match lines.finish() {
                Ok(tail) => Self::parse_sse_line(tail.trim()),
                Err(e) => Some(Err(e)),
            };
            if let Some(result) = tail {
                let _ = tx.send(result).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    /// Turns one SSE line into a chunk. Comments, blank lines and non-data
    /// fields yield `None`.
    pub fn parse_sse_line(line: &str) -> Option<Result<StreamChunk>> {
        let payload = line.strip_prefix("data:")?.trim_start();
        if payload == DONE_MARKER {
            return Some(Ok(StreamChunk::finished(None)));
        }

        let parsed: ChatCompletionChunk = match serde_json::from_str(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Some(Err(AnalystError::ResponseError(format!(
                    "Malformed stream chunk: {}",
                    e
                ))))
            }
        };

        let Some(choice) = parsed.choices.into_iter().next() else {
            return Some(Ok(StreamChunk::text("")));
        };

        Some(Ok(StreamChunk {
            chunk: choice.delta.and_then(|d| d.content).unwrap_or_default(),
            done: false,
            finish_reason: choice.finish_reason,
        }))
    }
}

/// Collects raw body bytes and hands out complete lines. A line is only
/// decoded once its terminating newline has arrived, so multi-byte characters
/// split across network reads stay intact.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    fn next_line(&mut self) -> Option<Result<String>> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(Self::decode(&line[..end]))
    }

    fn finish(self) -> Result<String> {
        Self::decode(&self.pending)
    }

    fn decode(bytes: &[u8]) -> Result<String> {
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| AnalystError::StreamError(format!("Invalid UTF-8 in stream: {}", e)))
    }
}

#[async_trait]
impl ChatBackend for VisionClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream> {
        self.generate_stream(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdditionalDetails, ContentPart, PromptTemplate};

    fn chunk_line(content: &str) -> String {
        format!(
            "data: {}",
            serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": content } }] })
        )
    }

    fn sse_body(fragments: &[&str]) -> String {
        let mut body = String::new();
        for fragment in fragments {
            body.push_str(&chunk_line(fragment));
            body.push_str("\n\n");
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn sample_request(client: &VisionClient) -> ChatRequest {
        let prompt = Prompt::build(PromptTemplate::Diagnosis, &AdditionalDetails::disabled());
        let image = EncodedImage {
            mime_type: "image/png".into(),
            data: "iVBORw0KGgo=".into(),
        };
        client.build_request(&prompt, &image, true)
    }

    async fn collect(mut stream: ChunkStream) -> Vec<Result<StreamChunk>> {
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item);
        }
        items
    }

    #[test]
    fn test_parse_sse_lines() {
        let chunk = VisionClient::parse_sse_line(&chunk_line("Viti")).unwrap().unwrap();
        assert_eq!(chunk.chunk, "Viti");
        assert!(!chunk.done);

        let done = VisionClient::parse_sse_line("data: [DONE]").unwrap().unwrap();
        assert!(done.done);

        assert!(VisionClient::parse_sse_line("").is_none());
        assert!(VisionClient::parse_sse_line(": keep-alive").is_none());
        assert!(VisionClient::parse_sse_line("event: message").is_none());
        assert!(VisionClient::parse_sse_line("data: {oops").unwrap().is_err());
    }

    #[test]
    fn test_line_buffer_keeps_split_characters_intact() {
        let line = format!("{}\n", chunk_line("Não sei"));
        let bytes = line.as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut lines = LineBuffer::default();
        lines.extend(&bytes[..split]);
        assert!(lines.next_line().is_none());
        lines.extend(&bytes[split..]);

        let decoded = lines.next_line().unwrap().unwrap();
        let chunk = VisionClient::parse_sse_line(&decoded).unwrap().unwrap();
        assert_eq!(chunk.chunk, "Não sei");
        assert!(lines.next_line().is_none());
        assert_eq!(lines.finish().unwrap(), "");
    }

    #[test]
    fn test_line_buffer_rejects_invalid_utf8() {
        let mut lines = LineBuffer::default();
        lines.extend(b"data: \xC3(\n");
        assert!(matches!(
            lines.next_line(),
            Some(Err(AnalystError::StreamError(_)))
        ));
    }

    #[tokio::test]
    async fn test_generate_stream_relays_accented_text() {
        use std::io::Write;

        let mut server = mockito::Server::new_async().await;
        let body = sse_body(&["Vitiligo segmentar, ", "localizado na mão"]);
        let split = body.as_bytes().iter().position(|&b| b == 0xC3).unwrap() + 1;
        let bytes = body.into_bytes();
        let (head, tail) = (bytes[..split].to_vec(), bytes[split..].to_vec());
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_chunked_body(move |w| {
                w.write_all(&head)?;
                w.flush()?;
                w.write_all(&tail)
            })
            .create_async()
            .await;

        let config = Config::new()
            .with_api_key("sk-test")
            .with_base_url(server.url());
        let client = VisionClient::new(&config).unwrap();
        let items = collect(client.generate_stream(sample_request(&client)).await.unwrap()).await;

        let text: String = items
            .iter()
            .map(|item| item.as_ref().unwrap().chunk.as_str())
            .collect();
        assert_eq!(text, "Vitiligo segmentar, localizado na mão");
    }

    #[test]
    fn test_build_request_places_text_before_image() {
        let client = VisionClient::new(&Config::new().with_api_key("sk-test")).unwrap();
        let request = sample_request(&client);

        assert_eq!(request.max_tokens, 1200);
        assert!(request.stream);
        let parts = &request.messages[0].content;
        assert!(matches!(&parts[0], ContentPart::Text { text } if text == PromptTemplate::Diagnosis.text()));
        assert!(matches!(
            &parts[1],
            ContentPart::ImageUrl { image_url } if image_url.url == "data:image/png;base64,iVBORw0KGgo="
        ));
    }

    #[tokio::test]
    async fn test_generate_stream_yields_fragments_in_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4-vision-preview",
                "max_tokens": 1200,
                "stream": true
            })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body(&["Vitiligo", ", ", "Truncal"]))
            .create_async()
            .await;

        let config = Config::new()
            .with_api_key("sk-test")
            .with_base_url(server.url());
        let client = VisionClient::new(&config).unwrap();
        let stream = client.generate_stream(sample_request(&client)).await.unwrap();
        let items = collect(stream).await;

        let text: Vec<String> = items
            .iter()
            .map(|item| item.as_ref().unwrap().chunk.clone())
            .collect();
        assert_eq!(text, vec!["Vitiligo", ", ", "Truncal", ""]);
        assert!(items.last().unwrap().as_ref().unwrap().done);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_stream_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Incorrect API key provided"}}"#)
            .create_async()
            .await;

        let config = Config::new()
            .with_api_key("sk-bad")
            .with_base_url(server.url());
        let client = VisionClient::new(&config).unwrap();
        let err = match client.generate_stream(sample_request(&client)).await {
            Ok(_) => panic!("expected an API error"),
            Err(err) => err,
        };

        assert_eq!(err.remote_status(), Some(401));
        assert!(err.to_string().contains("Incorrect API key provided"));
    }

    #[tokio::test]
    async fn test_malformed_chunk_ends_stream_with_error() {
        let mut server = mockito::Server::new_async().await;
        let body = format!("{}\n\ndata: {{not json\n\n{}\n\n", chunk_line("Vit"), chunk_line("never"));
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let config = Config::new()
            .with_api_key("sk-test")
            .with_base_url(server.url());
        let client = VisionClient::new(&config).unwrap();
        let items = collect(client.generate_stream(sample_request(&client)).await.unwrap()).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().chunk, "Vit");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_generate_returns_whole_completion() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({ "stream": false })))
            .with_status(200)
            .with_body(
                r#"{"model":"gpt-4-vision-preview","choices":[{"index":0,"message":{"role":"assistant","content":"No Conditions Found, Truncal"},"finish_reason":"stop"}]}"#,
            )
            .create_async()
            .await;

        let config = Config::new()
            .with_api_key("sk-test")
            .with_base_url(server.url());
        let client = VisionClient::new(&config).unwrap();
        let response = client.generate(sample_request(&client)).await.unwrap();

        assert_eq!(response.text, "No Conditions Found, Truncal");
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_missing_key_never_sends() {
        let client = VisionClient::new(&Config::new()).unwrap();
        let result = client.generate_stream(sample_request(&client)).await;
        assert!(matches!(result, Err(AnalystError::MissingCredential)));
    }
}
