use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, model::types::ModelTable, Result};

/// Typed configuration, loaded once at startup.
///
/// Platform limits (body/title caps) are configuration constants here, not
/// hardcoded assumptions buried in the delivery code.
#[derive(Clone, Debug)]
pub struct Config {
    // Core credentials
    pub telegram_bot_token: String,
    /// Empty list means the bot answers everyone.
    pub telegram_allowed_users: Vec<i64>,
    pub google_api_key: String,

    // Shared data document (usage counter + personality table)
    pub data_file: PathBuf,

    // Models
    pub models: ModelTable,
    pub default_model: String,
    pub default_personality: String,

    // Delivery limits
    pub body_limit: usize,
    pub title_limit: usize,
    pub segment_delay: Duration,

    // Follow-up affordance
    pub followup_timeout: Duration,
    pub max_context_chars: usize,

    // Gemini HTTP
    pub gemini_base_url: String,
    pub gemini_timeout: Duration,

    // Rate limiting
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let google_api_key = env_str("GOOGLE_API_KEY").unwrap_or_default();
        if google_api_key.trim().is_empty() {
            return Err(Error::Config(
                "GOOGLE_API_KEY environment variable is required".to_string(),
            ));
        }

        let telegram_allowed_users = parse_csv_i64(env_str("TELEGRAM_ALLOWED_USERS"));

        let data_file = PathBuf::from(env_str("DATA_FILE").unwrap_or("data.json".to_string()));

        let models = ModelTable::builtin();
        let default_model = env_str("DEFAULT_MODEL").unwrap_or("3.0 Flash".to_string());
        if models.api_id(&default_model).is_none() {
            return Err(Error::Config(format!(
                "DEFAULT_MODEL '{default_model}' is not a known model"
            )));
        }
        let default_personality =
            env_str("DEFAULT_PERSONALITY").unwrap_or("John Robot".to_string());

        // Telegram caps messages at 4096 chars; leave headroom for the
        // rendered title and footer lines that share the message.
        let body_limit = env_usize("MESSAGE_BODY_LIMIT").unwrap_or(3500);
        let title_limit = env_usize("MESSAGE_TITLE_LIMIT").unwrap_or(256);
        let segment_delay = Duration::from_millis(env_u64("SEGMENT_DELAY_MS").unwrap_or(200));

        let followup_timeout =
            Duration::from_secs(env_u64("FOLLOWUP_TIMEOUT_SECS").unwrap_or(300));
        let max_context_chars = env_usize("MAX_CONTEXT_CHARS").unwrap_or(16_000);

        let gemini_base_url = env_str("GEMINI_BASE_URL")
            .unwrap_or("https://generativelanguage.googleapis.com/v1beta".to_string());
        let gemini_timeout = Duration::from_secs(env_u64("GEMINI_TIMEOUT_SECS").unwrap_or(60));

        let rate_limit_enabled = env_bool("RATE_LIMIT_ENABLED").unwrap_or(true);
        let rate_limit_requests = env_u32("RATE_LIMIT_REQUESTS").unwrap_or(20);
        let rate_limit_window = Duration::from_secs(env_u64("RATE_LIMIT_WINDOW").unwrap_or(60));

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            google_api_key,
            data_file,
            models,
            default_model,
            default_personality,
            body_limit,
            title_limit,
            segment_delay,
            followup_timeout,
            max_context_chars,
            gemini_base_url,
            gemini_timeout,
            rate_limit_enabled,
            rate_limit_requests,
            rate_limit_window,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}
