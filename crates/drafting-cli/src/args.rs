use clap::{Parser, ValueEnum};
use drafting_session::{ClientConfig, SessionError};

#[derive(Parser, Debug)]
#[command(
    name = "drafting",
    about = "Start a drafting session, follow it live and review drafts from the terminal"
)]
pub struct Args {
    /// Prompt for the new session (read from stdin when omitted)
    #[arg(long)]
    pub prompt: Option<String>,

    /// Model family the backend should use
    #[arg(long, value_enum, default_value_t = ModelChoice::Openai)]
    pub model: ModelChoice,

    /// Base URL of the drafting service (overrides DRAFTING_API_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Explicit stream restarts allowed per thread
    #[arg(long)]
    pub max_restarts: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModelChoice {
    Openai,
    Anthropic,
}

impl ModelChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl Args {
    /// Environment config with command-line overrides applied.
    pub fn client_config(&self) -> Result<ClientConfig, SessionError> {
        let mut config = ClientConfig::from_env()?;
        if let Some(url) = &self.base_url {
            config = config.base_url(url.clone());
        }
        if let Some(max) = self.max_restarts {
            config = config.max_stream_restarts(max);
        }
        config.validate()?;
        Ok(config)
    }
}
