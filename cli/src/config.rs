use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use pantry_core::generation::{DEFAULT_MODEL, GenerationSettings};
use tracing::warn;

pub const DEFAULT_LLM_URL: &str = "https://router.huggingface.co/v1/chat/completions";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub llm: LlmConfig,
    pub server_url: String,
    pub api_key: Option<String>,
}

/// Upstream text-generation endpoint settings.
#[derive(Clone)]
pub struct LlmConfig {
    pub url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub settings: GenerationSettings,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let proj_dirs =
            ProjectDirs::from("", "", "pantry").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path =
            var("PANTRY_DB_PATH").map_or_else(|| data_dir.join("pantry.db"), PathBuf::from);

        let timeout_secs = match var("PANTRY_LLM_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Invalid PANTRY_LLM_TIMEOUT_SECS value '{raw}'"))?,
            None => DEFAULT_LLM_TIMEOUT_SECS,
        };

        let llm = LlmConfig {
            url: var("PANTRY_LLM_URL").unwrap_or_else(|| DEFAULT_LLM_URL.to_string()),
            token: var("HUGGINGFACE_API_TOKEN"),
            timeout: Duration::from_secs(timeout_secs),
            settings: GenerationSettings {
                model: var("PANTRY_LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                ..GenerationSettings::default()
            },
        };

        Ok(Config {
            db_path,
            data_dir,
            llm,
            server_url: var("PANTRY_SERVER_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            api_key: var("PANTRY_API_KEY"),
        })
    }

    /// Load the server API key from the data directory, generating and storing
    /// a new one on first use.
    pub fn load_or_create_api_key(&self) -> Result<String> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok(key);
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Generated new API key: {key}");
        eprintln!("Include in requests: Authorization: Bearer {key}");
        Ok(key)
    }
}

impl LlmConfig {
    pub fn warn_if_unauthenticated(&self) {
        if self.token.is_none() {
            warn!("HUGGINGFACE_API_TOKEN is not set; recipe generation requests will be sent without credentials");
        }
    }
}

// Unset and empty variables are treated the same.
fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
