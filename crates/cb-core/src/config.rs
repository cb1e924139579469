//! Configuration management
//!
//! Settings are resolved in the following order:
//! 1. Environment variables
//! 2. `callbridge.toml` in the working directory
//! 3. Default values
//!
//! `${VAR_NAME}` references inside the TOML file are expanded from the
//! environment before parsing.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::{Error, Result};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "callbridge.toml";

/// Default OmniChat API endpoint
pub const DEFAULT_OMNICHAT_BASE_URL: &str = "https://api.omnichat.co.uk";

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Address to bind
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

/// Twilio webhook configuration
#[derive(Clone, PartialEq, Eq)]
pub struct TwilioConfig {
    /// Auth token used to verify `X-Twilio-Signature`
    pub auth_token: Option<String>,

    /// Whether incoming webhooks are signature-checked
    pub validate: bool,

    /// Public base URL Twilio calls (e.g. `https://bridge.example.com`).
    /// When unset the URL is rebuilt from the request headers.
    pub webhook_base_url: Option<String>,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            auth_token: None,
            validate: true,
            webhook_base_url: None,
        }
    }
}

impl fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("validate", &self.validate)
            .field("webhook_base_url", &self.webhook_base_url)
            .finish()
    }
}

/// OmniChat platform configuration
#[derive(Clone, PartialEq, Eq)]
pub struct OmniChatConfig {
    /// API endpoint
    pub base_url: String,

    /// Login used for the token exchange
    pub username: String,

    /// Password used for the token exchange
    pub password: String,

    /// Value of the `X-Calling-Application` header
    pub app_name: String,

    /// Account every contact and broadcast is scoped to
    pub api_account_id: String,

    /// WhatsApp template sent to callers
    pub template_id: String,

    /// Broadcast message body (empty when the template has no free text)
    pub message: String,
}

impl Default for OmniChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OMNICHAT_BASE_URL.to_string(),
            username: String::new(),
            password: String::new(),
            app_name: String::new(),
            api_account_id: String::new(),
            template_id: String::new(),
            message: String::new(),
        }
    }
}

impl fmt::Debug for OmniChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OmniChatConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("app_name", &self.app_name)
            .field("api_account_id", &self.api_account_id)
            .field("template_id", &self.template_id)
            .field("message", &self.message)
            .finish()
    }
}

/// Main configuration for callbridge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Twilio webhook configuration
    pub twilio: TwilioConfig,

    /// OmniChat platform configuration
    pub omnichat: OmniChatConfig,
}

impl Config {
    /// Expand `${VAR_NAME}` references using `lookup`.
    ///
    /// Unknown variables expand to an empty string.
    fn expand_vars<F>(value: &str, lookup: &F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Some(var_value) = lookup(&var_name) {
                    result.push_str(&var_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file
    ///
    /// Environment variables still take precedence over file values.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::parse_toml(&toml_content, &|key: &str| std::env::var(key).ok())?;
        cfg.apply_env_overrides();
        cfg.validate()?;

        Ok(cfg)
    }

    /// Load configuration from the default locations
    ///
    /// Uses `./callbridge.toml` when present, otherwise the environment only.
    pub fn load() -> Result<Self> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            info!("Loading configuration from {}", DEFAULT_CONFIG_FILE);
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse TOML text, then expand `${VAR}` inside the parsed string values.
    ///
    /// Expanding after parsing keeps substituted values (quotes, backslashes)
    /// out of the TOML source.
    fn parse_toml<F>(content: &str, lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let toml_config: TomlConfig = toml::from_str(content)?;
        Ok(Self::from_toml_config(toml_config.expand_vars(lookup)))
    }

    fn from_toml_config(toml: TomlConfig) -> Self {
        let server = toml.server.unwrap_or_default();
        let twilio = toml.twilio.unwrap_or_default();
        let omni = toml.omnichat.unwrap_or_default();
        let defaults = OmniChatConfig::default();

        Config {
            server: ServerConfig {
                port: server.port.unwrap_or_else(default_port),
                bind: server.bind.unwrap_or_else(default_bind),
            },
            twilio: TwilioConfig {
                auth_token: twilio.auth_token.filter(|t| !t.is_empty()),
                validate: twilio.validate.unwrap_or(true),
                webhook_base_url: twilio.webhook_base_url.filter(|u| !u.is_empty()),
            },
            omnichat: OmniChatConfig {
                base_url: omni.base_url.unwrap_or(defaults.base_url),
                username: omni.username.unwrap_or_default(),
                password: omni.password.unwrap_or_default(),
                app_name: omni.app_name.unwrap_or_default(),
                api_account_id: omni.api_account_id.unwrap_or_default(),
                template_id: omni.template_id.unwrap_or_default(),
                message: omni.message.unwrap_or_default(),
            },
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    /// Override settings from a key lookup (the process environment in production)
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(bind) = lookup("BIND_ADDRESS") {
            self.server.bind = bind;
        }

        // Twilio
        if let Some(token) = lookup("TWILIO_AUTH_TOKEN") {
            self.twilio.auth_token = Some(token);
        }
        if let Some(validate) = lookup("TWILIO_VALIDATE") {
            self.twilio.validate = validate.to_lowercase() != "false";
        }
        if let Some(url) = lookup("TWILIO_WEBHOOK_BASE_URL") {
            self.twilio.webhook_base_url = Some(url);
        }

        // OmniChat
        if let Some(url) = lookup("OMNI_BASE_URL") {
            self.omnichat.base_url = url;
        }
        if let Some(username) = lookup("OMNI_USERNAME") {
            self.omnichat.username = username;
        }
        if let Some(password) = lookup("OMNI_PASSWORD") {
            self.omnichat.password = password;
        }
        if let Some(app_name) = lookup("OMNI_APP_NAME") {
            self.omnichat.app_name = app_name;
        }
        if let Some(account) = lookup("OMNI_API_ACCOUNT_ID") {
            self.omnichat.api_account_id = account;
        }
        if let Some(template) = lookup("OMNI_TEMPLATE_ID") {
            self.omnichat.template_id = template;
        }
        if let Some(message) = lookup("OMNI_BROADCAST_MESSAGE") {
            self.omnichat.message = message;
        }
    }

    /// Check that every required setting is present
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.twilio.validate && self.twilio.auth_token.is_none() {
            missing.push("TWILIO_AUTH_TOKEN");
        }

        let omni = &self.omnichat;
        let required = [
            ("OMNI_USERNAME", &omni.username),
            ("OMNI_PASSWORD", &omni.password),
            ("OMNI_APP_NAME", &omni.app_name),
            ("OMNI_API_ACCOUNT_ID", &omni.api_account_id),
            ("OMNI_TEMPLATE_ID", &omni.template_id),
        ];
        missing.extend(
            required
                .iter()
                .filter(|(_, value)| value.is_empty())
                .map(|(name, _)| *name),
        );

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!("{} not set", missing.join(", "))))
        }
    }
}

// ============================================================================
// TOML file structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    server: Option<TomlServerConfig>,
    twilio: Option<TomlTwilioConfig>,
    omnichat: Option<TomlOmniChatConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlServerConfig {
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    bind: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlTwilioConfig {
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    validate: Option<bool>,
    #[serde(default)]
    webhook_base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlOmniChatConfig {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    app_name: Option<String>,
    #[serde(default)]
    api_account_id: Option<String>,
    #[serde(default)]
    template_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl TomlConfig {
    /// Expand `${VAR}` references in every string value
    fn expand_vars<F>(self, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let expand = |value: Option<String>| value.map(|v| Config::expand_vars(&v, lookup));

        TomlConfig {
            server: self.server.map(|s| TomlServerConfig {
                port: s.port,
                bind: expand(s.bind),
            }),
            twilio: self.twilio.map(|t| TomlTwilioConfig {
                auth_token: expand(t.auth_token),
                validate: t.validate,
                webhook_base_url: expand(t.webhook_base_url),
            }),
            omnichat: self.omnichat.map(|o| TomlOmniChatConfig {
                base_url: expand(o.base_url),
                username: expand(o.username),
                password: expand(o.password),
                app_name: expand(o.app_name),
                api_account_id: expand(o.api_account_id),
                template_id: expand(o.template_id),
                message: expand(o.message),
            }),
        }
    }
}
