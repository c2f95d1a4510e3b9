use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures_util::StreamExt;
use threadline_ai::{OpenAiClient, OpenAiConfig};
use threadline_conversation::{
    CommandDispatcher, CommandRoutes, CompletionClient, CompletionSettings, ConversationHistory,
    DispatcherConfig, PromptBuilder, PromptTemplate, DEFAULT_SYSTEM_TEXT,
};
use threadline_slack::{
    run_slack_listener, SlackApiClient, SlackListenerConfig, ThreadExpander, TranscriptPrinter,
};

use crate::cli_args::{Cli, Command};

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    let slack = build_slack_client(&cli)?;
    match &cli.command {
        Command::Transcript { ts, page_limit } => {
            let channel = cli.require_channel()?;
            run_transcript(slack, channel, ts, *page_limit).await
        }
        Command::Listen => {
            if cli.app_token.as_deref().map_or(true, |token| token.trim().is_empty()) {
                return Err(anyhow!("--app-token (or APP_TOKEN) is required to listen"));
            }
            let dispatcher = Arc::new(build_dispatcher(&cli)?);
            let config = SlackListenerConfig {
                bot_user_id: cli.bot_user_id.clone(),
                reconnect_delay: Duration::from_millis(cli.reconnect_delay_ms),
            };
            run_slack_listener(slack, dispatcher, config).await
        }
        Command::Send { text } => {
            let channel = cli.require_channel()?;
            let posted = slack.post_message(channel, text, None).await?;
            println!("sent: channel={} ts={}", posted.channel, posted.ts);
            Ok(())
        }
        Command::React { ts, emoji } => {
            let channel = cli.require_channel()?;
            slack.add_reaction(channel, ts, emoji).await?;
            println!("reacted: channel={channel} ts={ts} emoji={emoji}");
            Ok(())
        }
    }
}

fn build_slack_client(cli: &Cli) -> Result<SlackApiClient> {
    SlackApiClient::new(
        cli.slack_api_base.clone(),
        cli.app_token.clone().unwrap_or_default(),
        cli.bot_token.clone(),
        cli.slack_request_timeout_ms,
        cli.slack_retry_max_attempts,
        cli.slack_retry_base_delay_ms,
    )
}

pub(crate) fn build_dispatcher(cli: &Cli) -> Result<CommandDispatcher> {
    let api_key = cli
        .openai_api_key
        .clone()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("--openai-api-key (or OPENAI_API_KEY) is required to listen"))?;
    let provider_config = OpenAiConfig {
        api_base: cli.openai_api_base.clone(),
        api_key,
        organization: None,
        request_timeout_ms: cli.completion_timeout_ms,
        max_retries: cli.provider_max_retries,
        retry_budget_ms: cli.provider_retry_budget_ms,
        retry_jitter: true,
    };
    // The outer deadline must outlast every provider attempt, or retries never run.
    let call_timeout = provider_config.max_call_duration();
    let provider = OpenAiClient::new(provider_config)
        .context("failed to create completion provider client")?;

    let template = match &cli.prompt_template {
        Some(template) => PromptTemplate::parse(template)?,
        None => PromptTemplate::default(),
    };
    let prompt = PromptBuilder::new(
        template,
        cli.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_TEXT),
    );
    let completion = CompletionClient::new(
        Arc::new(provider),
        CompletionSettings {
            model: cli.model.clone(),
            max_tokens: cli.max_tokens,
            timeout: call_timeout,
        },
    );
    let history = match cli.history_max_turns {
        Some(max_turns) => ConversationHistory::with_max_turns(max_turns),
        None => ConversationHistory::new(),
    };

    let mut config = DispatcherConfig {
        routes: CommandRoutes {
            ask: cli.ask_command.clone(),
            reset: cli.reset_command.clone(),
            echo: cli.echo_command.clone(),
        },
        temperature: cli.temperature,
        ..DispatcherConfig::default()
    };
    if let Some(reset_reply) = &cli.reset_reply {
        config.reset_reply = reset_reply.clone();
    }
    if let Some(failure_reply) = &cli.failure_reply {
        config.failure_reply = failure_reply.clone();
    }

    Ok(CommandDispatcher::new(
        prompt,
        completion,
        history.into_shared(),
        config,
    ))
}

async fn run_transcript(
    slack: SlackApiClient,
    channel: &str,
    root_ts: &str,
    page_limit: usize,
) -> Result<()> {
    let expander = ThreadExpander::new(slack).with_page_limit(page_limit);
    let records = expander.expand(channel, root_ts);
    futures_util::pin_mut!(records);

    let stdout = std::io::stdout();
    let mut printer = TranscriptPrinter::new(stdout.lock());
    while let Some(record) = records.next().await {
        printer
            .print(&record)
            .context("failed to write transcript line")?;
    }
    let written = printer.records_written();
    printer.into_inner().flush()?;
    tracing::info!(channel, root_ts, records = written, "transcript complete");
    Ok(())
}
