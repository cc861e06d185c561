//! Event routing.
//!
//! Every inbound event is turned into zero or more outbound actions here.
//! The router holds no policy of its own: it reads the store snapshot per
//! event and lets the command handler make all changes.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::commands::CommandHandler;
use crate::config::ConfigStore;
use crate::membership::{format_goodbye, welcome_messages};
use crate::moderation::{first_bad_word, match_auto_reply, normalize};
use crate::scheduler::{SchedulerMessage, broadcast_action};
use crate::transport::{ChatTransport, InboundEvent, OutboundAction};

/// Routes events to the moderation, membership and command logic.
pub struct EventRouter {
    store: Arc<ConfigStore>,
    commands: CommandHandler,
    scheduler: Option<mpsc::Sender<SchedulerMessage>>,
    transport: Arc<dyn ChatTransport>,
}

impl EventRouter {
    #[must_use]
    pub fn new(
        store: Arc<ConfigStore>,
        commands: CommandHandler,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            store,
            commands,
            scheduler: None,
            transport,
        }
    }

    /// Connects the router to a running scheduler so interval changes
    /// re-arm it.
    #[must_use]
    pub fn with_scheduler(mut self, tx: mpsc::Sender<SchedulerMessage>) -> Self {
        self.scheduler = Some(tx);
        self
    }

    /// Decides what to do about an event.
    pub async fn handle(&self, event: InboundEvent) -> Vec<OutboundAction> {
        match event {
            InboundEvent::TextMessage {
                message,
                text,
                sender_name,
            } => {
                let policy = self.store.get().await;
                let text = normalize(&text);
                if let Some(word) = first_bad_word(&policy, &text) {
                    info!(
                        "Deleting message {} from {} (matched \"{}\")",
                        message, sender_name, word
                    );
                    return vec![OutboundAction::DeleteMessage { message }];
                }
                match match_auto_reply(&policy, &text).filter(|r| !r.trim().is_empty()) {
                    Some(response) => {
                        debug!("Auto-reply triggered in {}", message.chat);
                        vec![OutboundAction::send_text(message.chat, response)]
                    }
                    None => Vec::new(),
                }
            }
            InboundEvent::MembersJoined { chat, names } => {
                let policy = self.store.get().await;
                welcome_messages(&policy, &names)
                    .into_iter()
                    .filter(|body| !body.trim().is_empty())
                    .map(|body| OutboundAction::send_text(chat.clone(), body))
                    .collect()
            }
            InboundEvent::MemberLeft { chat, name } => {
                let policy = self.store.get().await;
                Some(format_goodbye(&policy, &name))
                    .filter(|body| !body.trim().is_empty())
                    .map(|body| OutboundAction::send_text(chat, body))
                    .into_iter()
                    .collect()
            }
            InboundEvent::Command {
                message,
                name,
                args,
            } => {
                let Some(result) = self.commands.handle(&name, &args).await else {
                    return Vec::new();
                };
                if let Some(interval) = result.rearm {
                    self.rearm(interval).await;
                }
                vec![OutboundAction::send_text(message.chat, result.message)]
            }
            InboundEvent::TimerTick => {
                let policy = self.store.get().await;
                broadcast_action(&policy).into_iter().collect()
            }
        }
    }

    /// Handles an event and carries out the resulting actions.
    ///
    /// Delivery failures are logged; they never stop the bot.
    pub async fn dispatch(&self, event: InboundEvent) {
        for action in self.handle(event).await {
            if let Err(e) = self.transport.execute(&action).await {
                warn!("Failed to carry out {:?}: {}", action, e);
            }
        }
    }

    async fn rearm(&self, interval: std::time::Duration) {
        let Some(tx) = &self.scheduler else {
            debug!("No scheduler attached, interval applies on next start");
            return;
        };
        if tx.send(SchedulerMessage::Rearm(interval)).await.is_err() {
            warn!("Scheduler is not running, cannot re-arm");
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("store", &self.store)
            .field("commands", &self.commands)
            .finish_non_exhaustive()
    }
}
