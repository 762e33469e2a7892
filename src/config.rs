//! Configuration for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and resolves it, together with the
//! process environment, into one immutable [`ChatConfig`].

use std::fmt;

use arrrg_derive::CommandLine;

use crate::error::{Error, Result};
use crate::llm::DEFAULT_MODEL;
use crate::memory::{DEFAULT_MOTORHEAD_URL, HOSTED_MOTORHEAD_URL, MotorheadOptions};

/// Session used when neither `--session-id` nor `MOTORHEAD_SESSION_ID` is given.
pub const DEFAULT_SESSION_ID: &str = "davemustaine666";

/// Environment variable holding the model backend API key.
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
/// Environment variable overriding the model backend base URL.
pub const ENV_API_BASE: &str = "OPENAI_API_BASE";
/// Environment variable naming the Motorhead server.
pub const ENV_MOTORHEAD_URL: &str = "MOTORHEAD_URL";
/// Environment variable naming the Motorhead session.
pub const ENV_SESSION_ID: &str = "MOTORHEAD_SESSION_ID";
/// Environment variable selecting the chat model.
pub const ENV_MODEL: &str = "MOTORHEAD_CHAT_MODEL";
/// Environment variable holding the hosted Motorhead API key.
pub const ENV_METAL_API_KEY: &str = "METAL_API_KEY";
/// Environment variable holding the hosted Motorhead client id.
pub const ENV_METAL_CLIENT_ID: &str = "METAL_CLIENT_ID";

/// Command-line arguments for the motorhead-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gpt-3.5-turbo)", "MODEL")]
    pub model: Option<String>,

    /// Motorhead session whose history is loaded and extended.
    #[arrrg(optional, "Motorhead session id (default: davemustaine666)", "SESSION")]
    pub session_id: Option<String>,

    /// Base URL of the Motorhead server.
    #[arrrg(optional, "Motorhead URL (default: http://localhost:8080)", "URL")]
    pub memory_url: Option<String>,

    /// API key for hosted Motorhead.
    #[arrrg(optional, "Hosted Motorhead API key (default: $METAL_API_KEY)", "KEY")]
    pub metal_api_key: Option<String>,

    /// Client id for hosted Motorhead.
    #[arrrg(optional, "Hosted Motorhead client id (default: $METAL_CLIENT_ID)", "ID")]
    pub metal_client_id: Option<String>,

    /// Base URL of the OpenAI-compatible API.
    #[arrrg(optional, "Chat completions base URL (default: https://api.openai.com/v1/)", "URL")]
    pub api_base: Option<String>,

    /// Sampling temperature.
    #[arrrg(optional, "Sampling temperature (default: 0)", "TEMP")]
    pub temperature: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat process, resolved once at startup.
#[derive(Clone, PartialEq)]
pub struct ChatConfig {
    /// The model to use for generating responses.
    pub model: String,

    /// Motorhead session id.
    pub session_id: String,

    /// Motorhead base URL.
    pub memory_url: String,

    /// Hosted Motorhead API key.
    pub metal_api_key: Option<String>,

    /// Hosted Motorhead client id.
    pub metal_client_id: Option<String>,

    /// API key for the model backend; the client falls back to the environment when unset.
    pub api_key: Option<String>,

    /// Base URL of the model backend; `None` uses the OpenAI default.
    pub api_base: Option<String>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Whether to use ANSI colors in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: gpt-3.5-turbo
    /// - Session: davemustaine666
    /// - Motorhead: http://localhost:8080
    /// - Temperature: 0
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            session_id: DEFAULT_SESSION_ID.to_string(),
            memory_url: DEFAULT_MOTORHEAD_URL.to_string(),
            metal_api_key: None,
            metal_client_id: None,
            api_key: None,
            api_base: None,
            temperature: 0.0,
            use_color: true,
        }
    }

    /// Resolve arguments over the process environment over defaults.
    pub fn from_env(args: ChatArgs) -> Result<Self> {
        Self::from_env_and_args(args, |name| std::env::var(name).ok())
    }

    /// Resolve arguments over `lookup` over defaults.
    ///
    /// Empty environment values count as unset. With both Metal credentials present and no
    /// explicit Motorhead URL, the hosted service is used.
    pub fn from_env_and_args<F>(args: ChatArgs, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Self::new();

        let temperature = match args.temperature {
            Some(raw) => parse_temperature(&raw)?,
            None => defaults.temperature,
        };

        let metal_api_key = args.metal_api_key.or_else(|| env(ENV_METAL_API_KEY));
        let metal_client_id = args.metal_client_id.or_else(|| env(ENV_METAL_CLIENT_ID));
        let memory_url = match args.memory_url.or_else(|| env(ENV_MOTORHEAD_URL)) {
            Some(url) => url,
            None if metal_api_key.is_some() && metal_client_id.is_some() => {
                HOSTED_MOTORHEAD_URL.to_string()
            }
            None => defaults.memory_url,
        };

        Ok(Self {
            model: args.model.or_else(|| env(ENV_MODEL)).unwrap_or(defaults.model),
            session_id: args
                .session_id
                .or_else(|| env(ENV_SESSION_ID))
                .unwrap_or(defaults.session_id),
            memory_url,
            metal_api_key,
            metal_client_id,
            api_key: env(ENV_API_KEY),
            api_base: args.api_base.or_else(|| env(ENV_API_BASE)),
            temperature,
            use_color: !args.no_color,
        })
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the Motorhead session.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Sets the Motorhead base URL.
    pub fn with_memory_url(mut self, memory_url: impl Into<String>) -> Self {
        self.memory_url = memory_url.into();
        self
    }

    /// Connection settings for the Motorhead client.
    pub fn memory_options(&self) -> MotorheadOptions {
        MotorheadOptions {
            api_key: self.metal_api_key.clone(),
            client_id: self.metal_client_id.clone(),
            timeout: None,
        }
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("model", &self.model)
            .field("session_id", &self.session_id)
            .field("memory_url", &self.memory_url)
            .field("metal_api_key", &self.metal_api_key.as_ref().map(|_| "<redacted>"))
            .field("metal_client_id", &self.metal_client_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("temperature", &self.temperature)
            .field("use_color", &self.use_color)
            .finish()
    }
}

fn parse_temperature(raw: &str) -> Result<f32> {
    match raw.trim().parse::<f32>() {
        Ok(value) if (0.0..=2.0).contains(&value) => Ok(value),
        _ => Err(Error::configuration(format!(
            "temperature must be a number between 0 and 2, got {raw:?}"
        ))),
    }
}
