use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

#[derive(Clone, Debug)]
pub struct AssistantConfig {
    pub base_url: String,
    pub api_key: String,
    pub assistant_id: String,
}

impl AssistantConfig {
    /// For provisioning runs that happen before an assistant exists; only the
    /// API key is required.
    pub fn bootstrap_from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let Some(api_key) = api_key else {
            anyhow::bail!("OPENAI_API_KEY must be set");
        };

        Ok(Self {
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key,
            assistant_id: env::var("ASSISTANT_ID").unwrap_or_default(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct PhraseConfig {
    pub model: String,
    pub max_tokens: usize,
}

#[derive(Clone, Debug)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub max_attempts: usize,
    pub deadline_secs: u64,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub static_dir: PathBuf,
    pub data_files_dir: PathBuf,
    pub assistant: AssistantConfig,
    pub phrase: PhraseConfig,
    pub poll: PollConfig,
    pub feedback_sink_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let Some(api_key) = api_key else {
            anyhow::bail!("OPENAI_API_KEY must be set before serving traffic");
        };

        let assistant_id = env::var("ASSISTANT_ID")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let Some(assistant_id) = assistant_id else {
            anyhow::bail!("ASSISTANT_ID must be set before serving traffic");
        };

        Ok(Self {
            bind_addr: env::var("CITEBOT_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            static_dir: env::var("CITEBOT_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./static")),
            data_files_dir: env::var("CITEBOT_DATA_FILES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data_files")),
            assistant: AssistantConfig {
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                api_key,
                assistant_id,
            },
            phrase: PhraseConfig {
                model: env::var("PHRASE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                max_tokens: env::var("PHRASE_MAX_TOKENS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(100),
            },
            poll: PollConfig {
                interval_ms: env::var("RUN_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1_000),
                max_attempts: env::var("RUN_POLL_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
                deadline_secs: env::var("RUN_POLL_DEADLINE_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            },
            feedback_sink_url: env::var("SHEETDB_URL").ok().filter(|v| !v.trim().is_empty()),
        })
    }

    pub fn index_page(&self) -> PathBuf {
        self.static_dir.join("index.html")
    }
}
