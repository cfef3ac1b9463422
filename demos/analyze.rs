use skin_analyst::{
    AdditionalDetails, Config, DisplayUpdate, ImageAnalyst, OpenAiClient, Outcome, Submission,
    Surface,
};
use std::io::Write;

/// Prints only the newly revealed part of each render.
struct Terminal {
    shown: usize,
}

impl Surface for Terminal {
    fn render(&mut self, update: DisplayUpdate) {
        match update {
            DisplayUpdate::Progress(text) => {
                let text = text.trim_end_matches(skin_analyst::CURSOR);
                print!("{}", &text[self.shown..]);
                let _ = std::io::stdout().flush();
                self.shown = text.len();
            }
            DisplayUpdate::Final(_) => println!(),
            DisplayUpdate::Status(text) => log::info!("{}", text),
            DisplayUpdate::Warning(text) => log::warn!("{}", text),
            DisplayUpdate::Error(text) => log::error!("{}", text),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    match dotenv::dotenv() {
        Ok(_) => log::info!("✅ .env file loaded"),
        Err(_) => log::warn!("⚠️  No .env file found"),
    }
    skin_analyst::logger::init()?;

    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("usage: analyze <image.jpg|png> [context]")?;
    let context = args.collect::<Vec<_>>().join(" ");

    let bytes = std::fs::read(&path)?;
    let config = Config::from_env();
    let client = OpenAiClient::new(&config)?;
    let analyst = ImageAnalyst::new(config, client.vision().clone());

    let submission = Submission::new()
        .with_image(bytes, Some(path))
        .with_details(AdditionalDetails::new(!context.is_empty(), context))
        .triggered();

    match analyst.analyze(submission, &mut Terminal { shown: 0 }).await {
        Outcome::Completed(text) => log::info!("📏 {} characters", text.len()),
        outcome => log::warn!("Finished without an answer: {:?}", outcome),
    }

    Ok(())
}
