use skin_analyst::{
    logger::{self, LogLevel, LoggerConfig},
    Config, ImageAnalyst, OpenAiClient,
};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_loaded = dotenv::dotenv().is_ok();

    logger::init_with_config(
        LoggerConfig::development()
            .with_level(LogLevel::Info)
            .with_prefix(env!("CARGO_PKG_NAME")),
    )?;

    if env_loaded {
        log::info!("✅ .env file loaded successfully");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    let config = Config::from_env();
    logger::log_config_info(&config);

    let client = OpenAiClient::new(&config)?;
    logger::log_startup_info(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        &config.server.host,
        config.server.port,
    );

    let analyst = ImageAnalyst::new(config, client.vision().clone());
    skin_analyst::server::run(analyst).await?;

    Ok(())
}
