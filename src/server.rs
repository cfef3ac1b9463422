use crate::{
    analyst::{ImageAnalyst, Submission},
    models::{AdditionalDetails, PromptTemplate, ACCEPTED_EXTENSIONS},
    openai::ChatBackend,
    relay::{DisplayUpdate, Surface},
};
use actix_web::{http::header, rt, web, App, HttpResponse, HttpServer};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tokio_stream::wrappers::UnboundedReceiverStream;

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    #[serde(default)]
    pub include_details: bool,
    #[serde(default)]
    pub details: String,
    pub template: Option<PromptTemplate>,
    pub file_name: Option<String>,
}

/// Forwards display updates to the open response stream. A closed receiver
/// means the page went away; updates are dropped.
struct ChannelSurface(UnboundedSender<DisplayUpdate>);

impl Surface for ChannelSurface {
    fn render(&mut self, update: DisplayUpdate) {
        let _ = self.0.send(update);
    }
}

pub fn sse_event(update: &DisplayUpdate) -> String {
    format!(
        "event: {}\ndata: {}\n\n",
        update.name(),
        json!({ "text": update.text() })
    )
}

async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

async fn status<B: ChatBackend + 'static>(analyst: web::Data<ImageAnalyst<B>>) -> HttpResponse {
    let config = analyst.config();
    HttpResponse::Ok().json(json!({
        "credential_configured": config.has_credential(),
        "model": config.model,
        "default_template": config.template,
        "templates": PromptTemplate::ALL,
        "accepted_extensions": ACCEPTED_EXTENSIONS,
    }))
}

async fn analyze<B: ChatBackend + 'static>(
    analyst: web::Data<ImageAnalyst<B>>,
    query: web::Query<AnalyzeQuery>,
    body: web::Bytes,
) -> HttpResponse {
    let query = query.into_inner();
    let mut submission = Submission::new()
        .with_image(body.to_vec(), query.file_name)
        .with_details(AdditionalDetails::new(query.include_details, query.details))
        .triggered();
    if let Some(template) = query.template {
        submission = submission.with_template(template);
    }

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let analyst = analyst.into_inner();
    rt::spawn(async move {
        let mut surface = ChannelSurface(tx);
        analyst.analyze(submission, &mut surface).await;
    });

    let events = UnboundedReceiverStream::new(rx)
        .map(|update| Ok::<_, actix_web::Error>(web::Bytes::from(sse_event(&update))));

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(events)
}

pub fn routes<B: ChatBackend + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/status", web::get().to(status::<B>))
        .route("/analyze", web::post().to(analyze::<B>));
}

pub async fn run<B: ChatBackend + 'static>(analyst: ImageAnalyst<B>) -> std::io::Result<()> {
    let address = analyst.config().server.bind_address();
    let upload_limit = analyst.config().server.max_upload_bytes;
    let data = web::Data::new(analyst);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .app_data(web::PayloadConfig::new(upload_limit))
            .configure(routes::<B>)
    })
    .bind(address)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Result;
    use crate::models::{image::tests::tiny_png, ChatRequest, StreamChunk};
    use crate::openai::ChunkStream;
    use actix_web::test as atest;
    use async_trait::async_trait;
    use futures::stream;

    struct AbcBackend;

    #[async_trait]
    impl ChatBackend for AbcBackend {
        async fn stream_chat(&self, _request: ChatRequest) -> Result<ChunkStream> {
            Ok(Box::pin(stream::iter(vec![
                Ok(StreamChunk::text("A")),
                Ok(StreamChunk::text("B")),
                Ok(StreamChunk::text("C")),
                Ok(StreamChunk::finished(None)),
            ])))
        }
    }

    fn app_data(config: Config) -> web::Data<ImageAnalyst<AbcBackend>> {
        web::Data::new(ImageAnalyst::new(config, AbcBackend))
    }

    #[test]
    fn test_sse_event_escapes_newlines() {
        let event = sse_event(&DisplayUpdate::Final("Vitiligo,\nTruncal".into()));
        assert_eq!(event, "event: final\ndata: {\"text\":\"Vitiligo,\\nTruncal\"}\n\n");
    }

    #[actix_web::test]
    async fn test_index_page_is_served() {
        let app = atest::init_service(
            App::new()
                .app_data(app_data(Config::new()))
                .configure(routes::<AbcBackend>),
        )
        .await;

        let resp = atest::call_service(&app, atest::TestRequest::get().uri("/").to_request()).await;
        assert!(resp.status().is_success());
        let body = atest::read_body(resp).await;
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("Vitiligo Presence and Body Part Identification"));
        assert!(html.contains("if (!response.ok)"));
    }

    #[actix_web::test]
    async fn test_rejected_query_is_a_plain_error_status() {
        let app = atest::init_service(
            App::new()
                .app_data(app_data(Config::new().with_api_key("sk-test")))
                .configure(routes::<AbcBackend>),
        )
        .await;

        let req = atest::TestRequest::post()
            .uri("/analyze?template=plain")
            .set_payload(tiny_png())
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert!(resp.status().is_client_error());
        assert_ne!(
            resp.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(&b"text/event-stream"[..])
        );
    }

    #[actix_web::test]
    async fn test_status_reports_missing_credential() {
        let app = atest::init_service(
            App::new()
                .app_data(app_data(Config::new()))
                .configure(routes::<AbcBackend>),
        )
        .await;

        let req = atest::TestRequest::get().uri("/status").to_request();
        let body: serde_json::Value = atest::call_and_read_body_json(&app, req).await;
        assert_eq!(body["credential_configured"], false);
        assert_eq!(body["default_template"], "diagnosis_with_body_part");
    }

    #[actix_web::test]
    async fn test_analyze_streams_events() {
        let app = atest::init_service(
            App::new()
                .app_data(app_data(Config::new().with_api_key("sk-test")))
                .configure(routes::<AbcBackend>),
        )
        .await;

        let req = atest::TestRequest::post()
            .uri("/analyze?include_details=true&details=left%20elbow&file_name=arm.png")
            .set_payload(tiny_png())
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );

        let body = String::from_utf8(atest::read_body(resp).await.to_vec()).unwrap();
        let expected = [
            "event: status\ndata: {\"text\":\"Analysing the image ...\"}",
            "event: progress\ndata: {\"text\":\"A▌\"}",
            "event: progress\ndata: {\"text\":\"AB▌\"}",
            "event: progress\ndata: {\"text\":\"ABC▌\"}",
            "event: final\ndata: {\"text\":\"ABC\"}",
        ];
        let events: Vec<&str> = body.split("\n\n").filter(|e| !e.is_empty()).collect();
        assert_eq!(events, expected);
    }

    #[actix_web::test]
    async fn test_analyze_without_image_warns() {
        let app = atest::init_service(
            App::new()
                .app_data(app_data(Config::new().with_api_key("sk-test")))
                .configure(routes::<AbcBackend>),
        )
        .await;

        let req = atest::TestRequest::post().uri("/analyze").to_request();
        let body = atest::call_and_read_body(&app, req).await;
        assert_eq!(
            String::from_utf8(body.to_vec()).unwrap(),
            "event: warning\ndata: {\"text\":\"Please upload an image.\"}\n\n"
        );
    }
}
