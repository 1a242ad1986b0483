use crate::utils::{atomic_write, get_interlinked_home};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_domain_id() -> String {
    "chatsurferxmppunclass".to_string()
}

fn default_classification() -> String {
    "UNCLASSIFIED//FOUO".to_string()
}

fn default_instance_id() -> String {
    "unclass-prod".to_string()
}

fn default_translation_endpoint() -> String {
    "https://translation.googleapis.com".to_string()
}

#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Hostname of the chat service, e.g. `chat.example.org`.
    #[serde(default)]
    pub chat_host: String,
    /// API key for session issuance. Overridable via `INTERLINKED_API_KEY`.
    #[serde(default)]
    pub api_key: String,
    /// The bot's own user id — messages from this id are never relayed.
    #[serde(default)]
    pub bot_user_id: String,
    #[serde(default = "default_domain_id")]
    pub domain_id: String,
    #[serde(default = "default_classification")]
    pub classification: String,
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
    /// Client certificate (PEM) for mutual TLS.
    #[serde(default)]
    pub cert_path: PathBuf,
    /// Private key (PEM) for mutual TLS.
    #[serde(default)]
    pub key_path: PathBuf,
    /// CA trust bundle (PEM).
    #[serde(default)]
    pub ca_bundle_path: PathBuf,
    /// Where the registry, language table, and session cache live.
    /// Defaults to `<home>/data`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub translation: TranslationConfig,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationConfig {
    #[serde(default = "default_translation_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub project_id: String,
    /// Bearer token for the translation provider.
    /// Overridable via `INTERLINKED_TRANSLATE_TOKEN`.
    #[serde(default)]
    pub access_token: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_translation_endpoint(),
            project_id: String::new(),
            access_token: String::new(),
        }
    }
}

// Secrets never appear in logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("chat_host", &self.chat_host)
            .field(
                "api_key",
                &if self.api_key.is_empty() {
                    "[empty]"
                } else {
                    "[REDACTED]"
                },
            )
            .field("bot_user_id", &self.bot_user_id)
            .field("domain_id", &self.domain_id)
            .field("cert_path", &self.cert_path)
            .field("key_path", &self.key_path)
            .field("ca_bundle_path", &self.ca_bundle_path)
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn api_base(&self) -> String {
        format!("https://{}", self.chat_host)
    }

    pub fn websocket_url(&self) -> String {
        format!(
            "wss://{}/ws/connect/topic/chat-messages-all/websocket",
            self.chat_host
        )
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(get_interlinked_home()?.join("data")),
        }
    }

    pub fn rooms_file(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("rooms_for_translating.json"))
    }

    pub fn language_codes_file(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("language_codes.json"))
    }

    pub fn session_cache_file(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("session.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.chat_host.is_empty() {
            bail!("chatHost is required");
        }
        if self.api_key.is_empty() {
            bail!("apiKey is required (config or INTERLINKED_API_KEY)");
        }
        if self.bot_user_id.is_empty() {
            bail!("botUserId is required");
        }
        for (name, path) in [
            ("certPath", &self.cert_path),
            ("keyPath", &self.key_path),
            ("caBundlePath", &self.ca_bundle_path),
        ] {
            if path.as_os_str().is_empty() {
                bail!("{name} is required");
            }
        }
        Ok(())
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_interlinked_home()?.join("config.json"))
}

/// Load configuration from disk, applying env-var overrides for secrets.
///
/// A missing file yields defaults (which then fail `validate()` with a
/// pointed message rather than an opaque IO error).
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);
    config
        .validate()
        .with_context(|| "Configuration validation failed")?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(key) = std::env::var("INTERLINKED_API_KEY")
        && !key.is_empty()
    {
        config.api_key = key;
    }
    if let Ok(token) = std::env::var("INTERLINKED_TRANSLATE_TOKEN")
        && !token.is_empty()
    {
        config.translation.access_token = token;
    }
}

pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<()> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    let content = serde_json::to_string_pretty(config)?;
    atomic_write(path, &content)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }

    Ok(())
}
