use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[cfg(feature = "sentry")]
    pub sentry: Option<SentryConfig>,

    #[serde(default)]
    pub http: HTTPConfig,

    #[serde(default)]
    pub line: LineConfig,

    #[serde(default)]
    pub openai: OpenAIConfig,

    #[serde(default)]
    pub prompt: PromptConfig,
}
impl AppConfig {
    /// An explicitly given config path must exist, otherwise `config.toml` is
    /// used when present and built-in defaults when it isn't.
    pub fn load(config_filepath: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_filepath {
            Some(path) => path,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path
            }
        };

        let config_content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;

        Self::from_toml(&config_content)
            .with_context(|| format!("Failed to parse TOML config file: {config_path:?}"))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.prompt.validate()?;
        Ok(config)
    }

    /// Apply environment overrides that deployment platforms commonly set.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            let port = port
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Invalid PORT environment variable: {port:?}"))?;
            self.http.address.set_port(port);
        }
        if let Some(bot_user_id) = lookup("LINE_BOT_USER_ID").filter(|id| !id.is_empty()) {
            self.line.bot_user_id = Some(bot_user_id);
        }
        Ok(())
    }
}

/// Secrets are only ever read from the environment, never the config file.
#[derive(Clone)]
pub struct Credentials {
    pub channel_secret: String,
    pub channel_access_token: String,
    pub openai_api_key: String,
    pub admin_token: Option<String>,
}
impl Credentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| match lookup(key).filter(|v| !v.is_empty()) {
            Some(value) => Ok(value),
            None => Err(anyhow!("Missing required {key} environment variable!")),
        };

        Ok(Self {
            channel_secret: required("LINE_CHANNEL_SECRET")?,
            channel_access_token: required("LINE_CHANNEL_ACCESS_TOKEN")?,
            openai_api_key: required("OPENAI_API_KEY")?,
            admin_token: lookup("RELAY_ADMIN_TOKEN").filter(|v| !v.is_empty()),
        })
    }
}
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("channel_secret", &"<redacted>")
            .field("channel_access_token", &"<redacted>")
            .field("openai_api_key", &"<redacted>")
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(feature = "sentry")]
#[derive(Debug, Deserialize)]
pub struct SentryConfig {
    pub dsn: String,

    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub server_name: Option<String>,

    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_true")]
    pub send_default_pii: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HTTPConfig {
    #[serde(default = "default_http_address")]
    pub address: SocketAddr,

    #[serde(default)]
    pub tls: Option<TLSConfig>,
}
impl Default for HTTPConfig {
    fn default() -> Self {
        Self {
            address: default_http_address(),
            tls: None,
        }
    }
}

#[cfg_attr(
    not(any(feature = "tls-rustls", feature = "tls-native")),
    allow(dead_code)
)]
#[derive(Debug, Clone, Deserialize)]
pub struct TLSConfig {
    #[serde(deserialize_with = "deserialize_existing_file")]
    pub certificate_path: PathBuf,

    #[serde(deserialize_with = "deserialize_existing_file")]
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineConfig {
    #[serde(default = "default_line_api_base_url")]
    pub api_base_url: String,

    /// The bot's own LINE user ID, used to recognise mentions in groups and rooms.
    #[serde(default)]
    pub bot_user_id: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}
impl LineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
impl Default for LineConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_line_api_base_url(),
            bot_user_id: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIConfig {
    #[serde(default = "default_openai_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_openai_model")]
    pub model: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}
impl OpenAIConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptConfig {
    /// Literal prefix selecting the translation instruction, matched exactly.
    #[serde(default = "default_trigger_prefix")]
    pub trigger_prefix: String,

    #[serde(default = "default_translate_instruction")]
    pub translate_instruction: String,

    #[serde(default = "default_translate_temperature")]
    pub translate_temperature: f32,

    #[serde(default = "default_default_instruction")]
    pub default_instruction: String,

    #[serde(default = "default_default_temperature")]
    pub default_temperature: f32,

    /// Sent to the user whenever the completion API fails.
    #[serde(default = "default_fallback_text")]
    pub fallback_text: String,
}
impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            trigger_prefix: default_trigger_prefix(),
            translate_instruction: default_translate_instruction(),
            translate_temperature: default_translate_temperature(),
            default_instruction: default_default_instruction(),
            default_temperature: default_default_temperature(),
            fallback_text: default_fallback_text(),
        }
    }
}

impl PromptConfig {
    /// LINE rejects empty text messages, so the fallback must have content.
    pub fn validate(&self) -> Result<()> {
        if self.fallback_text.trim().is_empty() {
            bail!("prompt.fallback_text must not be empty!");
        }
        Ok(())
    }
}

fn default_http_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5000)
}
fn default_line_api_base_url() -> String {
    "https://api.line.me".to_string()
}
fn default_openai_api_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_trigger_prefix() -> String {
    "翻訳：".to_string()
}
fn default_translate_instruction() -> String {
    "日本語をシンハラ語に翻訳してください。".to_string()
}
fn default_translate_temperature() -> f32 {
    0.2
}
fn default_default_instruction() -> String {
    "シンハラ語で答えてください。".to_string()
}
fn default_default_temperature() -> f32 {
    0.5
}
fn default_fallback_text() -> String {
    "申し訳ありません、エラーが発生しました。".to_string()
}

#[cfg(feature = "sentry")]
fn default_true() -> bool {
    true
}

fn deserialize_existing_file<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let path = PathBuf::deserialize(deserializer)?;
    check_existing_file(&path).map_err(serde::de::Error::custom)?;
    Ok(path)
}

fn check_existing_file(path: &Path) -> std::result::Result<(), String> {
    if !path.exists() {
        return Err(format!("File does not exist: {}", path.display()));
    }
    if !path.is_file() {
        return Err(format!("Path is not a file: {}", path.display()));
    }
    Ok(())
}
