use serde::Deserialize;

/// Loaded once at startup from `MIRRA_*` environment variables layered over
/// an optional `mirra.toml`, then consumed as a plain struct everywhere
/// else in the process.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub enabled: bool,
    pub path: String,
    pub storage: String,
    pub format: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "./recordings".to_string(),
            storage: "file".to_string(),
            format: "jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: String,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub claude: ProviderConfig,
    pub openai: ProviderConfig,
    pub gemini: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub upstream_url: String,
}

fn default_port() -> u16 {
    4567
}

impl AppConfig {
    /// `mirra.toml` (if present, relative to the working directory) layered
    /// under environment variables prefixed `MIRRA__`, double-underscore
    /// separated for nesting (e.g. `MIRRA__PROVIDERS__CLAUDE__UPSTREAM_URL`).
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            .set_default("port", 4567)?
            .set_default("recording.enabled", true)?
            .set_default("recording.path", "./recordings")?
            .set_default("recording.storage", "file")?
            .set_default("recording.format", "jsonl")?
            .set_default("logging.format", "pretty")?
            .set_default("logging.level", "info")?
            .set_default("providers.claude.upstream_url", "https://api.anthropic.com")?
            .set_default("providers.openai.upstream_url", "https://api.openai.com")?
            .set_default(
                "providers.gemini.upstream_url",
                "https://generativelanguage.googleapis.com",
            )?
            .add_source(config::File::with_name("mirra").required(false))
            .add_source(config::Environment::with_prefix("MIRRA").separator("__"));

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}
