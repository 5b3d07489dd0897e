use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/talkto.db?mode=rwc".into(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Shared HMAC secret used to validate bearer tokens issued elsewhere.
    pub jwt_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: generate_random_hex(64),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChatConfig {
    #[serde(default = "default_typing_events_per_minute")]
    pub typing_events_per_minute: u32,
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
    #[serde(default = "default_worker_id")]
    pub worker_id: u16,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            typing_events_per_minute: default_typing_events_per_minute(),
            event_bus_capacity: default_event_bus_capacity(),
            worker_id: default_worker_id(),
        }
    }
}

fn default_max_connections() -> u32 {
    8
}

fn default_typing_events_per_minute() -> u32 {
    120
}

fn default_event_bus_capacity() -> usize {
    256
}

fn default_worker_id() -> u16 {
    1
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Marker fragments found in copied sample configs.
const PLACEHOLDER_MARKERS: &[&str] = &["change_me", "changeme", "replace_me", "replace_with", "your_secret"];

fn generate_random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(HEX_DIGITS[rng.gen_range(0..HEX_DIGITS.len())]))
        .collect()
}

fn looks_like_placeholder_secret(raw: &str) -> bool {
    let secret = raw.trim().to_ascii_lowercase();
    secret.is_empty()
        || secret.starts_with("example")
        || matches!(secret.as_str(), "secret" | "devsecret" | "talkto")
        || PLACEHOLDER_MARKERS.iter().any(|marker| secret.contains(marker))
}

fn validate_secret_configuration(config: &Config) -> Result<()> {
    let jwt_secret = config.auth.jwt_secret.trim();
    if jwt_secret.len() < 32 || looks_like_placeholder_secret(jwt_secret) {
        anyhow::bail!(
            "Invalid auth.jwt_secret: use a strong random secret (at least 32 characters) shared with the token issuer"
        );
    }
    Ok(())
}

fn validate_chat_configuration(config: &Config) -> Result<()> {
    if config.chat.typing_events_per_minute == 0 {
        anyhow::bail!("Invalid chat.typing_events_per_minute: must be greater than zero");
    }
    if config.chat.event_bus_capacity == 0 {
        anyhow::bail!("Invalid chat.event_bus_capacity: must be greater than zero");
    }
    Ok(())
}

/// Generate a commented config file template with the given values filled in.
fn generate_config_template(config: &Config) -> String {
    format!(
        r#"# TalkTo Server Configuration
# Generated automatically on first run. Edit as needed.

[server]
bind_address = "{bind_address}"

[database]
url = "{db_url}"
max_connections = {max_connections}

[auth]
# Must match the secret of the service that issues session tokens.
jwt_secret = "{jwt_secret}"

[chat]
# Typing broadcasts accepted per user per minute; extra signals are dropped.
typing_events_per_minute = {typing_rate}
# Buffered push events per room before slow gateway clients are disconnected.
event_bus_capacity = {bus_capacity}
# Snowflake worker id, unique per server process sharing a database.
worker_id = {worker_id}
"#,
        bind_address = config.server.bind_address,
        db_url = config.database.url,
        max_connections = config.database.max_connections,
        jwt_secret = config.auth.jwt_secret,
        typing_rate = config.chat.typing_events_per_minute,
        bus_capacity = config.chat.event_bus_capacity,
        worker_id = config.chat.worker_id,
    )
}

// ── Config Loading ───────────────────────────────────────────────────────────

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!(
                "Config file not found at '{}', generating defaults...",
                path
            );
            let config = Config::default();

            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }

            let template = generate_config_template(&config);
            fs::write(path, &template)?;
            tracing::info!("Generated default config at '{}'", path);
            config
        };

        // Environment variable overrides
        if let Ok(value) = std::env::var("TALKTO_BIND_ADDRESS") {
            config.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("TALKTO_DATABASE_URL") {
            config.database.url = value;
        }
        if let Ok(value) = std::env::var("TALKTO_DATABASE_MAX_CONNECTIONS") {
            if let Ok(parsed) = value.parse::<u32>() {
                config.database.max_connections = parsed;
            }
        }
        if let Ok(value) = std::env::var("TALKTO_JWT_SECRET") {
            config.auth.jwt_secret = value;
        }
        if let Ok(value) = std::env::var("TALKTO_TYPING_EVENTS_PER_MINUTE") {
            match value.parse::<u32>() {
                Ok(parsed) => config.chat.typing_events_per_minute = parsed,
                Err(_) => tracing::warn!(
                    "Ignoring invalid TALKTO_TYPING_EVENTS_PER_MINUTE value '{}'",
                    value
                ),
            }
        }
        if let Ok(value) = std::env::var("TALKTO_EVENT_BUS_CAPACITY") {
            match value.parse::<usize>() {
                Ok(parsed) => config.chat.event_bus_capacity = parsed,
                Err(_) => tracing::warn!(
                    "Ignoring invalid TALKTO_EVENT_BUS_CAPACITY value '{}'",
                    value
                ),
            }
        }

        validate_secret_configuration(&config)?;
        validate_chat_configuration(&config)?;
        Ok(config)
    }

    pub fn app_config(&self) -> talkto_core::AppConfig {
        talkto_core::AppConfig {
            jwt_secret: self.auth.jwt_secret.clone(),
            worker_id: self.chat.worker_id,
            typing_events_per_minute: self.chat.typing_events_per_minute,
            event_bus_capacity: self.chat.event_bus_capacity,
        }
    }
}
