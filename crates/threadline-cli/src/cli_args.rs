use clap::{Parser, Subcommand};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_temperature(value: &str) -> Result<f32, String> {
    let parsed = value
        .parse::<f32>()
        .map_err(|error| format!("failed to parse float: {error}"))?;
    if !parsed.is_finite() || !(0.0..=2.0).contains(&parsed) {
        return Err("value must be a finite number in range 0..=2".to_string());
    }
    Ok(parsed)
}

fn parse_non_empty(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("value must not be empty".to_string());
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "threadline",
    about = "Slack assistant: thread transcripts and a completion-backed command bot",
    version
)]
pub(crate) struct Cli {
    #[arg(long = "bot-token", env = "BOT_TOKEN", hide_env_values = true)]
    pub(crate) bot_token: String,

    #[arg(
        long = "app-token",
        env = "APP_TOKEN",
        hide_env_values = true,
        help = "App-level token (xapp-...) used to open Socket Mode connections"
    )]
    pub(crate) app_token: Option<String>,

    #[arg(
        long = "channel-id",
        env = "CHANNEL_ID",
        help = "Default channel for transcript, send, and react"
    )]
    pub(crate) channel_id: Option<String>,

    #[arg(long = "openai-api-key", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub(crate) openai_api_key: Option<String>,

    #[arg(
        long = "slack-api-base",
        env = "THREADLINE_SLACK_API_BASE",
        default_value = "https://slack.com/api"
    )]
    pub(crate) slack_api_base: String,

    #[arg(
        long = "slack-request-timeout-ms",
        env = "THREADLINE_SLACK_REQUEST_TIMEOUT_MS",
        default_value_t = 15_000,
        value_parser = parse_positive_u64
    )]
    pub(crate) slack_request_timeout_ms: u64,

    #[arg(
        long = "slack-retry-max-attempts",
        env = "THREADLINE_SLACK_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Maximum attempts for retryable slack api failures (429/5xx/transport)"
    )]
    pub(crate) slack_retry_max_attempts: usize,

    #[arg(
        long = "slack-retry-base-delay-ms",
        env = "THREADLINE_SLACK_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64
    )]
    pub(crate) slack_retry_base_delay_ms: u64,

    #[arg(
        long = "openai-api-base",
        env = "THREADLINE_OPENAI_API_BASE",
        default_value = "https://api.openai.com/v1",
        help = "Base URL for OpenAI-compatible APIs"
    )]
    pub(crate) openai_api_base: String,

    #[arg(long, env = "THREADLINE_MODEL", default_value = threadline_conversation::DEFAULT_MODEL)]
    pub(crate) model: String,

    #[arg(
        long,
        env = "THREADLINE_TEMPERATURE",
        default_value_t = 0.0,
        value_parser = parse_temperature
    )]
    pub(crate) temperature: f32,

    #[arg(long = "max-tokens", env = "THREADLINE_MAX_TOKENS")]
    pub(crate) max_tokens: Option<u32>,

    #[arg(
        long = "completion-timeout-ms",
        env = "THREADLINE_COMPLETION_TIMEOUT_MS",
        default_value_t = 120_000,
        value_parser = parse_positive_u64,
        help = "Timeout per provider request; retries extend the overall call deadline"
    )]
    pub(crate) completion_timeout_ms: u64,

    #[arg(
        long = "provider-max-retries",
        env = "THREADLINE_PROVIDER_MAX_RETRIES",
        default_value_t = 2
    )]
    pub(crate) provider_max_retries: usize,

    #[arg(
        long = "provider-retry-budget-ms",
        env = "THREADLINE_PROVIDER_RETRY_BUDGET_MS",
        default_value_t = 0,
        help = "Total retry backoff budget in milliseconds (0 disables the budget)"
    )]
    pub(crate) provider_retry_budget_ms: u64,

    #[arg(
        long = "history-max-turns",
        env = "THREADLINE_HISTORY_MAX_TURNS",
        value_parser = parse_positive_usize,
        help = "Keep at most this many turns, evicting the oldest (unbounded when unset)"
    )]
    pub(crate) history_max_turns: Option<usize>,

    #[arg(
        long = "prompt-template",
        env = "THREADLINE_PROMPT_TEMPLATE",
        help = "Prompt template with exactly one {context} placeholder"
    )]
    pub(crate) prompt_template: Option<String>,

    #[arg(long = "system-prompt", env = "THREADLINE_SYSTEM_PROMPT")]
    pub(crate) system_prompt: Option<String>,

    #[arg(
        long = "ask-command",
        env = "THREADLINE_ASK_COMMAND",
        default_value = "/gpt4",
        value_parser = parse_non_empty
    )]
    pub(crate) ask_command: String,

    #[arg(
        long = "reset-command",
        env = "THREADLINE_RESET_COMMAND",
        default_value = "/reset",
        value_parser = parse_non_empty
    )]
    pub(crate) reset_command: String,

    #[arg(
        long = "echo-command",
        env = "THREADLINE_ECHO_COMMAND",
        default_value = "/echo",
        value_parser = parse_non_empty
    )]
    pub(crate) echo_command: String,

    #[arg(long = "reset-reply", env = "THREADLINE_RESET_REPLY")]
    pub(crate) reset_reply: Option<String>,

    #[arg(long = "failure-reply", env = "THREADLINE_FAILURE_REPLY")]
    pub(crate) failure_reply: Option<String>,

    #[arg(
        long = "reconnect-delay-ms",
        env = "THREADLINE_RECONNECT_DELAY_MS",
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Delay before reconnecting after socket/session errors"
    )]
    pub(crate) reconnect_delay_ms: u64,

    #[arg(
        long = "bot-user-id",
        env = "THREADLINE_BOT_USER_ID",
        help = "Bot user id; resolved through auth.test when unset"
    )]
    pub(crate) bot_user_id: Option<String>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand, PartialEq)]
pub(crate) enum Command {
    /// Print the expanded transcript of the history page starting at a message.
    Transcript {
        /// Timestamp of the first message to include.
        #[arg(long, value_parser = parse_non_empty)]
        ts: String,
        #[arg(long = "page-limit", default_value_t = 100, value_parser = parse_positive_usize)]
        page_limit: usize,
    },
    /// Serve mentions and slash commands over Socket Mode until interrupted.
    Listen,
    /// Post a plain message to the default channel.
    Send {
        #[arg(value_parser = parse_non_empty)]
        text: String,
    },
    /// Add an emoji reaction to a message in the default channel.
    React {
        #[arg(long, value_parser = parse_non_empty)]
        ts: String,
        #[arg(long, default_value = "white_check_mark")]
        emoji: String,
    },
}

impl Cli {
    pub(crate) fn require_channel(&self) -> anyhow::Result<&str> {
        self.channel_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow::anyhow!("--channel-id (or CHANNEL_ID) is required"))
    }
}
