use std::sync::Arc;

use gtb_core::{config::Config, personality::PersonalityTable, usage::UsageTracker};
use gtb_gemini::GeminiClient;

#[tokio::main]
async fn main() -> Result<(), gtb_core::Error> {
    gtb_core::logging::init("gtb");

    let cfg = Arc::new(Config::load()?);

    // Personalities and the usage counter share one JSON document; the
    // tracker re-seeds the personality table if it has to rewrite the file.
    let personalities = Arc::new(PersonalityTable::load(
        &cfg.data_file,
        &cfg.default_personality,
    ));
    let usage = Arc::new(UsageTracker::new(
        cfg.data_file.clone(),
        personalities.as_json(),
    ));
    usage.load().await;

    let model = Arc::new(GeminiClient::new(
        cfg.google_api_key.clone(),
        cfg.gemini_base_url.clone(),
        cfg.gemini_timeout,
    )?);

    gtb_telegram::router::run_polling(cfg, model, usage, personalities)
        .await
        .map_err(|e| gtb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
