use dotenv::dotenv;
use std::sync::Arc;

mod ai;
mod channels;
mod config;
mod history;
mod http;
mod prompts;
mod text;

use ai::{AiClient, OpenAIClient};
use channels::{DispatcherSettings, MastodonClient, MessageDispatcher, StreamKind};
use config::{defaults, Config};
use history::HistoryStore;
use prompts::PromptTemplates;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let config = Config::from_env().map_err(|e| format!("Invalid configuration: {}", e))?;
    log::info!("Loaded configuration: {:?}", config);

    let prompts = PromptTemplates::load(&config.system_prompt_path);

    log::info!("Loading conversation history from {}", config.history_path.display());
    let history = HistoryStore::load(&config.history_path)
        .map_err(|e| format!("Cannot start with history {}: {}", config.history_path.display(), e))?;
    let history = Arc::new(history);

    let mastodon = MastodonClient::new(&config.mastodon_server, &config.mastodon_access_token)?;
    let bot_acct = match (&config.bot_acct, mastodon.verify_credentials().await) {
        (Some(acct), _) => acct.clone(),
        (None, Ok(account)) => {
            log::info!("[MASTODON] Authenticated as @{} on {}", account.acct, mastodon.server());
            account.acct
        }
        (None, Err(e)) => {
            log::warn!(
                "[MASTODON] Could not verify credentials ({}), assuming @{}",
                e,
                defaults::BOT_ACCT
            );
            defaults::BOT_ACCT.to_string()
        }
    };

    let ai_client = AiClient::OpenAI(OpenAIClient::new(&config.openai_api_key)?);

    let settings = DispatcherSettings {
        bot_acct,
        game_hashtag: config.game_hashtag.clone(),
        score_trigger: config.score_trigger.clone(),
        max_concurrent_mentions: config.max_concurrent_mentions,
    };
    log::info!(
        "Starting dispatcher as @{} (game tag #{}, trigger {:?}, {} concurrent mention(s))",
        settings.bot_acct,
        settings.game_hashtag,
        settings.score_trigger,
        settings.max_concurrent_mentions
    );

    let dispatcher = Arc::new(MessageDispatcher::new(
        ai_client,
        Arc::new(mastodon.clone()),
        history.clone(),
        prompts,
        settings,
    ));

    let notification_rx = mastodon.stream(StreamKind::User);
    let timeline_rx = mastodon.stream(StreamKind::PublicLocal);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Received Ctrl-C, shutting down");
                let _ = shutdown_tx.send(());
            }
            Err(e) => log::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    dispatcher.run(timeline_rx, notification_rx, shutdown_rx).await;

    log::info!(
        "Flushing {} conversation(s) to {}",
        history.len().await,
        history.path().display()
    );
    history.save().await;
    Ok(())
}
