//! Routes streaming events to the joke game and the mention replier.
//!
//! The local timeline drives the game: a post tagged with the game hashtag
//! becomes the pending joke, and a post containing the trigger phrase asks
//! the model to score it. The user stream drives conversations: every
//! mention from another account is answered in its own task, with the
//! thread's prior exchange taken from the history store.

use crate::ai::{AiClient, Message};
use crate::channels::mastodon::SocialClient;
use crate::channels::types::{Notification, NotificationKind, ParentRef, Status, StreamEvent, Toot};
use crate::config::defaults;
use crate::history::{ConversationHistory, HistoryStore};
use crate::prompts::{now_jst, PromptTemplates, Scenario};
use crate::text;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// `acct` of the bot itself; mentions it authors are ignored
    pub bot_acct: String,
    /// Tag (without `#`) that marks a post as the pending joke
    pub game_hashtag: String,
    /// Phrase that asks for the pending joke to be scored
    pub score_trigger: String,
    /// Upper bound on mention handlers running at once
    pub max_concurrent_mentions: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            bot_acct: defaults::BOT_ACCT.to_string(),
            game_hashtag: defaults::GAME_HASHTAG.to_string(),
            score_trigger: defaults::SCORE_TRIGGER.to_string(),
            max_concurrent_mentions: defaults::MAX_CONCURRENT_MENTIONS,
        }
    }
}

/// How a mention is answered, decided from its parent reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionRoute {
    FirstContact,
    Threaded { parent_id: String },
    /// Parent reference of an unexpected type
    Dropped,
}

pub fn classify_mention(status: &Status) -> MentionRoute {
    match &status.in_reply_to_id {
        ParentRef::NoParent => MentionRoute::FirstContact,
        ParentRef::ParentId(id) => MentionRoute::Threaded {
            parent_id: id.clone(),
        },
        ParentRef::Unrecognized(_) => MentionRoute::Dropped,
    }
}

/// Reply body addressed to the mentioning account.
pub fn reply_text(acct: &str, response: &str) -> String {
    format!("@{} \n{}", acct, response)
}

pub struct MessageDispatcher {
    ai_client: AiClient,
    social: Arc<dyn SocialClient>,
    history: Arc<HistoryStore>,
    prompts: PromptTemplates,
    settings: DispatcherSettings,
    pending_joke: Mutex<Option<String>>,
    mention_permits: Arc<Semaphore>,
}

impl MessageDispatcher {
    pub fn new(
        ai_client: AiClient,
        social: Arc<dyn SocialClient>,
        history: Arc<HistoryStore>,
        prompts: PromptTemplates,
        settings: DispatcherSettings,
    ) -> Self {
        let permits = settings.max_concurrent_mentions.max(1);
        Self {
            ai_client,
            social,
            history,
            prompts,
            settings,
            pending_joke: Mutex::new(None),
            mention_permits: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn pending_joke(&self) -> Option<String> {
        self.pending_joke.lock().clone()
    }

    /// Overwrite the pending joke; an empty line clears it.
    pub fn set_pending_joke(&self, joke: &str) {
        let joke = (!joke.is_empty()).then(|| joke.to_string());
        *self.pending_joke.lock() = joke;
    }

    pub async fn handle_timeline_event(&self, event: &StreamEvent) {
        let StreamEvent::Update(status) = event else {
            return;
        };

        let content = text::normalize_content(&status.content);

        if status.has_tag(&self.settings.game_hashtag) {
            let joke = text::first_line(&content);
            log::info!("[DISPATCH] New pending joke from @{}: {}", status.account.acct, joke);
            self.set_pending_joke(joke);
        } else if content.contains(&self.settings.score_trigger) {
            if let Err(e) = self.score_pending_joke().await {
                log::error!("[DISPATCH] Scoring requested by status {} failed: {}", status.id, e);
            }
        }
    }

    /// Ask the model to score the pending joke and post the answer as a new
    /// top-level status. Returns `None` when no joke is pending.
    pub async fn score_pending_joke(&self) -> Result<Option<Status>, String> {
        let Some(joke) = self.pending_joke() else {
            log::debug!("[DISPATCH] Score requested with no pending joke");
            return Ok(None);
        };

        let messages = self.prompts.compose(&Scenario::Score { joke: &joke }, now_jst());
        let score = self
            .ai_client
            .generate_text(messages)
            .await
            .map_err(|e| e.to_string())?;

        let posted = self.social.post_status(&Toot::new(score)).await?;
        Ok(Some(posted))
    }

    /// Route one event from the user stream. Mentions are answered on a
    /// spawned task once a concurrency permit is free; the handle is
    /// returned so callers can wait for it.
    pub async fn handle_notification_event(
        self: &Arc<Self>,
        event: StreamEvent,
    ) -> Option<JoinHandle<()>> {
        let StreamEvent::Notification(notification) = event else {
            return None;
        };
        if notification.kind != NotificationKind::Mention {
            return None;
        }
        let status = notification.status.as_ref()?;
        if status.account.acct == self.settings.bot_acct {
            log::debug!("[DISPATCH] Ignoring self mention {}", status.id);
            return None;
        }

        let route = classify_mention(status);
        if route == MentionRoute::Dropped {
            log::warn!(
                "[DISPATCH] Dropping mention {} with unrecognized parent reference {:?}",
                status.id,
                status.in_reply_to_id
            );
            return None;
        }

        let permit = match self.mention_permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                log::error!("[DISPATCH] Mention limiter closed: {}", e);
                return None;
            }
        };

        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mention_id = notification.id.clone();
            if let Err(e) = this.reply_to_mention(&notification, route).await {
                log::error!("[DISPATCH] Mention {} dropped: {}", mention_id, e);
            }
            drop(permit);
        }))
    }

    /// Generate and post a reply, then record the exchange under the new
    /// reply's id. Returns the posted reply.
    pub async fn reply_to_mention(
        &self,
        notification: &Notification,
        route: MentionRoute,
    ) -> Result<Status, String> {
        let status = notification
            .status
            .as_ref()
            .ok_or_else(|| "mention has no status".to_string())?;
        let content = text::normalize_mention(&status.content);
        log::info!("[DISPATCH] Mention {} from @{}: {}", status.id, notification.account.acct, content);

        let (history_key, history) = match &route {
            MentionRoute::FirstContact => (None, ConversationHistory::default()),
            MentionRoute::Threaded { parent_id } => {
                (Some(parent_id.as_str()), self.history.get(parent_id).await)
            }
            MentionRoute::Dropped => return Err("unrecognized parent reference".to_string()),
        };

        let scenario = if history_key.is_some() {
            Scenario::ThreadedReply {
                history: &history,
                text: &content,
            }
        } else {
            Scenario::FirstContact { text: &content }
        };
        let messages = self.prompts.compose(&scenario, now_jst());
        log::debug!("[DISPATCH] Prompt for {}: {:?}", status.id, messages);

        let response = self
            .ai_client
            .generate_text(messages)
            .await
            .map_err(|e| e.to_string())?;
        log::info!("[DISPATCH] Reply for {}: {}", status.id, response);

        let toot = Toot::reply_to(reply_text(&notification.account.acct, &response), status.id.as_str());
        let posted = self.social.post_status(&toot).await?;

        let old_key = history_key.unwrap_or(posted.id.as_str());
        self.history
            .append_and_rekey(
                old_key,
                &posted.id,
                Message::user(content),
                Message::assistant(response),
            )
            .await;

        Ok(posted)
    }

    pub async fn run_timeline(self: Arc<Self>, mut rx: mpsc::Receiver<StreamEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle_timeline_event(&event).await;
        }
        log::info!("[DISPATCH] Timeline stream closed");
    }

    pub async fn run_notifications(self: Arc<Self>, mut rx: mpsc::Receiver<StreamEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle_notification_event(event).await;
        }
        log::info!("[DISPATCH] Notification stream closed");
    }

    /// Drain both streams until they close or shutdown is signalled. A
    /// dropped shutdown sender is not a signal. In-flight mention handlers
    /// are not awaited.
    pub async fn run(
        self: Arc<Self>,
        timeline_rx: mpsc::Receiver<StreamEvent>,
        notification_rx: mpsc::Receiver<StreamEvent>,
        shutdown_rx: oneshot::Receiver<()>,
    ) {
        let timeline = tokio::spawn(Arc::clone(&self).run_timeline(timeline_rx));
        let timeline_abort = timeline.abort_handle();
        let notifications = Arc::clone(&self).run_notifications(notification_rx);

        tokio::select! {
            Ok(()) = shutdown_rx => {
                log::info!("[DISPATCH] Received shutdown signal");
                timeline_abort.abort();
            }
            _ = async { tokio::join!(timeline, notifications) } => {
                log::info!("[DISPATCH] Both streams closed");
            }
        }
    }
}
