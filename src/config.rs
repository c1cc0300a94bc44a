//! Configuration management for smartmove.
//!
//! Loaded from `~/.smartmove/config.toml` unless a path is given on the
//! command line or in `SMARTMOVE_CONFIG`. Secrets are read from the
//! environment variables named here, never stored in the file by default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Unset means the provider's usual variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl LlmConfig {
    pub fn api_key_env(&self) -> &str {
        match (&self.api_key_env, self.provider.as_str()) {
            (Some(name), _) => name,
            (None, "anthropic") => "ANTHROPIC_API_KEY",
            (None, _) => "OPENAI_API_KEY",
        }
    }
}

fn default_temperature() -> f32 {
    0.3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub system_prompt: String,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Per-tool deadline; 0 disables it.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
    /// Deadline for one planner call; 0 disables it.
    #[serde(default = "default_planner_timeout")]
    pub planner_timeout_secs: u64,
    #[serde(default = "default_empty_reply_fallback")]
    pub empty_reply_fallback: String,
    #[serde(default = "default_budget_exhausted_fallback")]
    pub budget_exhausted_fallback: String,
}

fn default_max_tool_rounds() -> u32 {
    8
}

fn default_tool_timeout() -> u64 {
    20
}

fn default_planner_timeout() -> u64 {
    60
}

fn default_empty_reply_fallback() -> String {
    "Désolé, je n'ai pas pu générer une réponse.".to_string()
}

fn default_budget_exhausted_fallback() -> String {
    "Désolé, j'ai eu du mal à traiter ta demande. Peux-tu reformuler ?".to_string()
}

impl AgentConfig {
    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.tool_timeout_secs > 0).then(|| Duration::from_secs(self.tool_timeout_secs))
    }

    pub fn planner_timeout(&self) -> Option<Duration> {
        (self.planner_timeout_secs > 0).then(|| Duration::from_secs(self.planner_timeout_secs))
    }
}

/// Endpoints and key variables of the tool collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default = "default_supabase_key_env")]
    pub supabase_key_env: String,
    #[serde(default = "default_google_key_env")]
    pub google_maps_key_env: String,
    #[serde(default)]
    pub google_directions_url: Option<String>,
    #[serde(default)]
    pub sncf_api_base: Option<String>,
    #[serde(default = "default_sncf_key_env")]
    pub sncf_key_env: String,
}

fn default_supabase_key_env() -> String {
    "SUPABASE_ANON_KEY".to_string()
}

fn default_google_key_env() -> String {
    "GOOGLE_MAPS_API_KEY".to_string()
}

fn default_sncf_key_env() -> String {
    "SNCF_API_KEY".to_string()
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_key_env: default_supabase_key_env(),
            google_maps_key_env: default_google_key_env(),
            google_directions_url: None,
            sncf_api_base: None,
            sncf_key_env: default_sncf_key_env(),
        }
    }
}

impl ServicesConfig {
    /// A missing or blank variable yields `None`; the collaborator then
    /// reports itself as not configured when a tool reaches it.
    pub fn secret(env_var: &str) -> Option<String> {
        std::env::var(env_var).ok().filter(|v| !v.trim().is_empty())
    }

    pub fn supabase_url(&self) -> Option<String> {
        self.supabase_url
            .clone()
            .or_else(|| Self::secret("SUPABASE_URL"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_site_password_env")]
    pub site_password_env: String,
    #[serde(default)]
    pub maintenance: bool,
    #[serde(default)]
    pub secure_cookie: bool,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_site_password_env() -> String {
    "SITE_PASSWORD".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            site_password_env: default_site_password_env(),
            maintenance: false,
            secure_cookie: false,
        }
    }
}

impl ServerConfig {
    pub fn site_password(&self) -> Option<String> {
        ServicesConfig::secret(&self.site_password_env)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: "openai_compatible".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_base: None,
                api_key: None,
                api_key_env: None,
                max_tokens: 2000,
                temperature: default_temperature(),
            },
            agent: AgentConfig {
                system_prompt: "Tu es SmartMove, un assistant de mobilité pour Toulouse et sa \
                    région. Réponds en français, de façon concise. Appuie chaque réponse \
                    sur les outils : arrêts et lignes Tisséo, itinéraires en transports \
                    en commun et trains SNCF. N'invente jamais un horaire, un arrêt ou \
                    une ligne. Si un outil renvoie une erreur, explique-la simplement et \
                    propose une alternative."
                    .to_string(),
                max_tool_rounds: default_max_tool_rounds(),
                tool_timeout_secs: default_tool_timeout(),
                planner_timeout_secs: default_planner_timeout(),
                empty_reply_fallback: default_empty_reply_fallback(),
                budget_exhausted_fallback: default_budget_exhausted_fallback(),
            },
            services: ServicesConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".smartmove").join("config.toml"))
    }

    /// Resolve the config file: explicit path, then `SMARTMOVE_CONFIG`,
    /// then the default location.
    pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        match std::env::var("SMARTMOVE_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Ok(PathBuf::from(path)),
            _ => Self::default_path(),
        }
    }

    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = Self::config_path(explicit)?;

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Ok(provider) = std::env::var("SMARTMOVE_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("SMARTMOVE_MODEL") {
            self.llm.model = model;
        }
        if let Ok(api_base) = std::env::var("SMARTMOVE_API_BASE") {
            self.llm.api_base = Some(api_base);
        }
        if let Ok(bind) = std::env::var("SMARTMOVE_BIND") {
            self.server.bind = bind;
        }
        if std::env::var("MAINTENANCE_MODE").is_ok_and(|v| v.trim() == "true") {
            self.server.maintenance = true;
        }
    }

    pub fn api_key(&self) -> Result<String> {
        if let Some(key) = &self.llm.api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }
        let key_env = self.llm.api_key_env();
        std::env::var(key_env).with_context(|| {
            format!(
                "API key not found. Either:\n  \
                 1. Set api_key in the [llm] section of the config file\n  \
                 2. Set environment variable: export {}=your-key",
                key_env
            )
        })
    }

    /// Write the default config to `path` unless a file is already there.
    pub fn save_default(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content =
            toml::to_string_pretty(&Self::default()).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(true)
    }
}
