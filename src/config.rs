use serde::Deserialize;
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    env, fmt, fs,
    path::{Path, PathBuf},
};
use tracing::info;
use url::Url;

use crate::orchestrator::SynthesisStrategy;
use crate::orchestrator::gate::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::types::{ModelName, ServerName};

pub const CONFIG_ENV_VAR: &str = "MCP_CHAT_CONFIG";

const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2:latest";
const DEFAULT_MAX_HISTORY: usize = 500;
const DEFAULT_CONTEXT_TURNS: usize = 5;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant with access to tools, resources and prompts \
from several MCP (Model Context Protocol) servers.

You keep track of the conversation and can resolve references to previously mentioned items: \
if the user talked about a \"meeting note\" earlier and now says \"update that note\", they mean the meeting note.

Be conversational and helpful. When a request could be served by one of the available tools, \
explain which tool fits and what it needs.";

#[derive(Debug)]
pub enum ConfigError {
    /// No configuration file at any of the searched locations.
    NotFound(Vec<PathBuf>),
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: Option<PathBuf>,
        message: String,
    },
    MissingSection(&'static str),
    NoServers,
    InvalidServer {
        name: String,
        reason: String,
    },
    InvalidSetting(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(searched) => {
                let searched: Vec<String> =
                    searched.iter().map(|p| p.display().to_string()).collect();
                write!(
                    f,
                    "Could not find a configuration file (searched: {}; set {} or pass --config)",
                    searched.join(", "),
                    CONFIG_ENV_VAR
                )
            }
            Self::Read { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            Self::Parse {
                path: Some(path),
                message,
            } => write!(f, "Invalid configuration in {}: {}", path.display(), message),
            Self::Parse {
                path: None,
                message,
            } => write!(f, "Invalid configuration: {}", message),
            Self::MissingSection(section) => write!(f, "Missing {} configuration", section),
            Self::NoServers => write!(f, "No MCP servers configured"),
            Self::InvalidServer { name, reason } => {
                write!(f, "Invalid configuration for server {}: {}", name, reason)
            }
            Self::InvalidSetting(msg) => write!(f, "Invalid chat setting: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn default_host() -> String {
    DEFAULT_OLLAMA_HOST.to_string()
}

fn default_model() -> ModelName {
    ModelName::new(DEFAULT_MODEL)
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OllamaConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_model")]
    pub default_model: ModelName,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            default_model: default_model(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Tuning for the turn pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    /// Turns kept in the conversation store.
    pub max_history: usize,
    /// Minimum model confidence for auto-execution, inclusive.
    pub confidence_threshold: f64,
    /// Turns of history shown to the model when analyzing intent.
    pub context_turns: usize,
    pub synthesis: SynthesisStrategy,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            context_turns: DEFAULT_CONTEXT_TURNS,
            synthesis: SynthesisStrategy::default(),
        }
    }
}

/// One entry under `mcp` as written in the file.
#[derive(Debug, Deserialize, Clone)]
pub struct McpServerConfig {
    // stdio server
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,

    // http server
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub disabled: bool,
}

/// A validated server entry, ready to connect.
#[derive(Debug, Clone, PartialEq)]
pub enum McpServiceConfig {
    Stdio {
        name: ServerName,
        command: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
        cwd: Option<PathBuf>,
    },
    Http {
        name: ServerName,
        url: Url,
    },
}

impl McpServiceConfig {
    pub fn from_json(name: String, cfg: McpServerConfig) -> Result<Self, ConfigError> {
        if let Some(command) = cfg.command.filter(|c| !c.trim().is_empty()) {
            return Ok(McpServiceConfig::Stdio {
                name: ServerName::new(name),
                command,
                args: cfg.args,
                env: cfg.env,
                cwd: cfg.cwd.map(PathBuf::from),
            });
        }

        if let Some(url) = cfg.url {
            let url = Url::parse(&url).map_err(|e| ConfigError::InvalidServer {
                name: name.clone(),
                reason: format!("invalid url `{}`: {}", url, e),
            })?;
            return Ok(McpServiceConfig::Http {
                name: ServerName::new(name),
                url,
            });
        }

        Err(ConfigError::InvalidServer {
            name,
            reason: "must have either `command` or `url`".to_string(),
        })
    }

    pub fn name(&self) -> &ServerName {
        match self {
            Self::Stdio { name, .. } | Self::Http { name, .. } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    ollama: Option<OllamaConfig>,
    // Map keeps file order, which becomes registration order.
    #[serde(default)]
    mcp: Option<Map<String, Value>>,
    #[serde(default)]
    chat: ChatSettings,
}

/// Everything the binary needs, built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub ollama: OllamaConfig,
    /// Enabled servers in file order.
    pub servers: Vec<McpServiceConfig>,
    pub chat: ChatSettings,
}

impl AppConfig {
    /// Locate and load the configuration file.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = resolve_config_path(explicit)?;
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loading configuration");
        Self::from_json_str(&raw).map_err(|e| match e {
            ConfigError::Parse { path: None, message } => ConfigError::Parse {
                path: Some(path.to_path_buf()),
                message,
            },
            other => other,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: RawConfig = serde_json::from_str(raw).map_err(|e| ConfigError::Parse {
            path: None,
            message: e.to_string(),
        })?;

        let ollama = cfg.ollama.ok_or(ConfigError::MissingSection("ollama"))?;
        let mcp = cfg.mcp.ok_or(ConfigError::MissingSection("mcp"))?;
        if mcp.is_empty() {
            return Err(ConfigError::NoServers);
        }

        let mut servers = Vec::new();
        for (name, value) in mcp {
            if name.contains(['.', ':']) {
                return Err(ConfigError::InvalidServer {
                    name,
                    reason: "server names cannot contain '.' or ':'".to_string(),
                });
            }
            let server_cfg: McpServerConfig =
                serde_json::from_value(value).map_err(|e| ConfigError::InvalidServer {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            if server_cfg.disabled {
                info!(server = %name, "Skipping disabled MCP server");
                continue;
            }
            servers.push(McpServiceConfig::from_json(name, expand_server(server_cfg))?);
        }
        if servers.is_empty() {
            return Err(ConfigError::NoServers);
        }

        validate_chat(&cfg.chat)?;

        Ok(Self {
            ollama,
            servers,
            chat: cfg.chat,
        })
    }
}

fn validate_chat(chat: &ChatSettings) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&chat.confidence_threshold) {
        return Err(ConfigError::InvalidSetting(format!(
            "confidenceThreshold must be within [0, 1], got {}",
            chat.confidence_threshold
        )));
    }
    if chat.max_history == 0 {
        return Err(ConfigError::InvalidSetting(
            "maxHistory must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// `explicit`, then `$MCP_CHAT_CONFIG`, then
/// `$XDG_CONFIG_HOME/mcp-chat/config.json`, then `./config.json`.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Ok(p) = env::var(CONFIG_ENV_VAR) {
        return Ok(PathBuf::from(p));
    }

    let mut searched = Vec::new();
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("mcp-chat").join("config.json");
        if candidate.exists() {
            return Ok(candidate);
        }
        searched.push(candidate);
    }

    let candidate = PathBuf::from("config.json");
    if candidate.exists() {
        return Ok(candidate);
    }
    searched.push(candidate);

    Err(ConfigError::NotFound(searched))
}

/// Replace `${VAR}` with the variable's value. Unset variables are left as
/// written.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            let value = if closed && !name.is_empty() {
                env::var(&name).ok()
            } else {
                None
            };
            match value {
                Some(val) => out.push_str(&val),
                None => {
                    out.push_str("${");
                    out.push_str(&name);
                    if closed {
                        out.push('}');
                    }
                }
            }
        } else {
            out.push(ch);
        }
    }

    out
}

fn expand_server(mut cfg: McpServerConfig) -> McpServerConfig {
    for val in cfg.env.values_mut() {
        *val = expand_env_vars(val);
    }
    if let Some(cmd) = cfg.command.as_mut() {
        *cmd = expand_env_vars(cmd);
    }
    cfg.args = cfg.args.iter().map(|a| expand_env_vars(a)).collect();
    if let Some(cwd) = cfg.cwd.as_mut() {
        *cwd = expand_env_vars(cwd);
    }
    if let Some(url) = cfg.url.as_mut() {
        *url = expand_env_vars(url);
    }
    cfg
}
