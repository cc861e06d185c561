//! Telegram bot client: the `MTProto` side of [`ChatTransport`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use grammers_client::types::Message;
use grammers_client::update::Update;
use grammers_client::{Client, InvocationError, SenderPool, UpdateStream, UpdatesConfiguration, sender};
use grammers_session::storages::SqliteSession;
use grammers_tl_types as tl;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::FloodGuard;
use crate::config::TelegramConfig;
use crate::transport::{ChatTransport, DeliveryError, InboundEvent, MessageRef};

/// How many inbound messages are kept around so they can be deleted later.
const RECENT_MESSAGES: usize = 512;

/// Offset between a channel id and its Bot API chat id.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Sign in failed: {0}")]
    SignInFailed(String),

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("API invocation error: {0}")]
    Invocation(String),
}

impl From<InvocationError> for TelegramError {
    fn from(err: InvocationError) -> Self {
        let err_str = err.to_string();

        if (err_str.contains("FLOOD_WAIT") || err_str.contains("flood"))
            && let Some(seconds) = extract_flood_wait_seconds(&err_str)
        {
            return Self::FloodWait(seconds);
        }

        Self::Invocation(err_str)
    }
}

impl From<TelegramError> for DeliveryError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::FloodWait(seconds) => Self::FloodWait(seconds),
            other => Self::Failed(other.to_string()),
        }
    }
}

/// Extracts flood wait seconds from an error message.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let patterns = ["FLOOD_WAIT_", "flood wait "];

    for pattern in patterns {
        if let Some(idx) = err_msg.to_lowercase().find(&pattern.to_lowercase()) {
            let start = idx + pattern.len();
            let num_str: String = err_msg[start..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(seconds) = num_str.parse() {
                return Some(seconds);
            }
        }
    }
    None
}

/// A chat addressed by its Bot API id.
///
/// Bot accounts may leave the access hash of users and channels at zero,
/// so every target can be turned into an `InputPeer` without having seen
/// a message from it first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatTarget {
    User(i64),
    Group(i64),
    Channel(i64),
}

impl ChatTarget {
    /// Parses `42`, `-42` or `-1000000000042`.
    fn parse(chat: &str) -> Option<Self> {
        let id: i64 = chat.trim().parse().ok()?;
        match id {
            1.. => Some(Self::User(id)),
            0 => None,
            _ if id < -CHANNEL_ID_OFFSET => id
                .checked_neg()
                .map(|bot_api_id| Self::Channel(bot_api_id - CHANNEL_ID_OFFSET)),
            _ if id > -CHANNEL_ID_OFFSET => Some(Self::Group(-id)),
            _ => None,
        }
    }

    fn input_peer(self) -> tl::enums::InputPeer {
        match self {
            Self::User(user_id) => tl::enums::InputPeer::User(tl::types::InputPeerUser {
                user_id,
                access_hash: 0,
            }),
            Self::Group(chat_id) => tl::enums::InputPeer::Chat(tl::types::InputPeerChat { chat_id }),
            Self::Channel(channel_id) => {
                tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
                    channel_id,
                    access_hash: 0,
                })
            }
        }
    }
}

impl From<&tl::enums::Peer> for ChatTarget {
    fn from(peer: &tl::enums::Peer) -> Self {
        match peer {
            tl::enums::Peer::User(user) => Self::User(user.user_id),
            tl::enums::Peer::Chat(chat) => Self::Group(chat.chat_id),
            tl::enums::Peer::Channel(channel) => Self::Channel(channel.channel_id),
        }
    }
}

impl std::fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) => write!(f, "{id}"),
            Self::Group(id) => write!(f, "-{id}"),
            Self::Channel(id) => write!(f, "-{}", CHANNEL_ID_OFFSET + id),
        }
    }
}

/// Inbound messages the bot may still need to act on.
#[derive(Default)]
struct MessageCache {
    /// Most recent message per chat, replied to when a direct send fails.
    latest: HashMap<String, Message>,

    /// Recent messages by reference, for deletion.
    recent: HashMap<MessageRef, Message>,

    /// Insertion order of `recent`, oldest first.
    order: VecDeque<MessageRef>,
}

impl MessageCache {
    fn remember(&mut self, key: MessageRef, message: Message) {
        self.latest.insert(key.chat.clone(), message.clone());
        if self.recent.insert(key.clone(), message).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > RECENT_MESSAGES {
            if let Some(old) = self.order.pop_front() {
                self.recent.remove(&old);
            }
        }
    }
}

/// Connected, signed-in Telegram bot.
pub struct TelegramBot {
    /// Client used for raw API calls.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    /// Outbound flood-wait window.
    flood: FloodGuard,

    /// Messages seen recently, keyed by chat and reference.
    cache: RwLock<MessageCache>,

    /// Our own username, without `@`.
    username: Option<String>,

    /// Serializes sends so replies keep their order.
    send_lock: Mutex<()>,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,
}

impl TelegramBot {
    /// Connects to Telegram and signs in as a bot if the session is not
    /// authorized yet.
    ///
    /// Returns the bot together with its update stream.
    pub async fn connect(
        config: &TelegramConfig,
        bot_token: &str,
    ) -> Result<(Self, UpdateStream), TelegramError> {
        info!("Connecting to Telegram...");

        let session = Arc::new(
            SqliteSession::open(&config.session_path)
                .await
                .map_err(|e| TelegramError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), config.api_id);

        let client = Client::new(handle.clone());

        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let is_authorized = client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))?;

        if is_authorized {
            info!("Session already authorized");
        } else {
            info!("Signing in with bot token...");
            client
                .bot_sign_in(bot_token, &config.api_hash)
                .await
                .map_err(|e| TelegramError::SignInFailed(e.to_string()))?;
            info!("Signed in");
        }

        let username = match client.get_me().await {
            Ok(me) => me.username().map(str::to_owned),
            Err(e) => {
                warn!("Could not fetch own profile: {}", e);
                None
            }
        };
        info!(
            "Connected to Telegram as @{}",
            username.as_deref().unwrap_or("<unknown>")
        );

        let stream = client
            .stream_updates(
                updates,
                UpdatesConfiguration {
                    catch_up: false,
                    ..Default::default()
                },
            )
            .await;

        let bot = Self {
            client,
            handle: handle.thin,
            flood: FloodGuard::new(),
            cache: RwLock::new(MessageCache::default()),
            username,
            send_lock: Mutex::new(()),
            _pool_task: pool_task,
        };
        Ok((bot, stream))
    }

    /// Our own username, if Telegram reported one.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Turns an update into an event for the router.
    ///
    /// Our own messages and updates the bot does not act on yield `None`.
    pub async fn event_from_update(&self, update: Update) -> Option<InboundEvent> {
        let Update::NewMessage(message) = update else {
            return None;
        };

        let (key, outgoing) = message_ref(&message.raw)?;
        if outgoing {
            return None;
        }
        self.cache.write().await.remember(key.clone(), message.clone());

        let sender = sender_name(&message);
        match &message.raw {
            tl::enums::Message::Message(raw) => {
                if raw.message.is_empty() {
                    return None;
                }
                InboundEvent::from_text(key, &raw.message, sender, self.username())
            }
            tl::enums::Message::Service(raw) => {
                let actor = raw_sender_id(&message.raw);
                let others: Vec<i64> = action_user_ids(&raw.action)
                    .into_iter()
                    .filter(|&id| Some(id) != actor)
                    .collect();
                let known = self.user_names(&raw.peer_id, raw.id, others).await;
                membership_event(&key.chat, &raw.action, actor, &sender, &known)
            }
            tl::enums::Message::Empty(_) => None,
        }
    }

    /// Looks up full names of users mentioned in a service message.
    ///
    /// Users that cannot be resolved are left out of the map.
    async fn user_names(
        &self,
        chat: &tl::enums::Peer,
        msg_id: i32,
        user_ids: Vec<i64>,
    ) -> HashMap<i64, String> {
        if user_ids.is_empty() {
            return HashMap::new();
        }

        let peer = ChatTarget::from(chat).input_peer();
        let request = tl::functions::users::GetUsers {
            id: user_ids
                .into_iter()
                .map(|user_id| {
                    tl::enums::InputUser::FromMessage(tl::types::InputUserFromMessage {
                        peer: peer.clone(),
                        msg_id,
                        user_id,
                    })
                })
                .collect(),
        };

        match self.client.invoke(&request).await {
            Ok(users) => users
                .into_iter()
                .filter_map(|user| match user {
                    tl::enums::User::User(user) => {
                        full_name(user.first_name.as_deref(), user.last_name.as_deref())
                            .map(|name| (user.id, name))
                    }
                    tl::enums::User::Empty(_) => None,
                })
                .collect(),
            Err(e) => {
                warn!("Could not resolve member names: {}", e);
                HashMap::new()
            }
        }
    }

    async fn guarded<F, Fut>(&self, call: F) -> Result<(), DeliveryError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: std::future::Future<Output = Result<(), InvocationError>> + Send,
    {
        if let Some(seconds) = self.flood.check().await {
            debug!("Refusing send during flood wait ({}s left)", seconds);
            return Err(DeliveryError::FloodWait(seconds));
        }

        let _turn = self.send_lock.lock().await;
        match call().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let err: TelegramError = e.into();
                if let TelegramError::FloodWait(seconds) = &err {
                    self.flood.handle_flood_wait(*seconds).await;
                }
                Err(err.into())
            }
        }
    }

    /// Disconnects from Telegram.
    pub fn disconnect(&self) {
        info!("Disconnecting from Telegram...");
        self.handle.quit();
    }
}

#[async_trait]
impl ChatTransport for TelegramBot {
    async fn send_text(&self, chat: &str, body: &str) -> Result<(), DeliveryError> {
        let anchor = self.cache.read().await.latest.get(chat).cloned();

        let direct = match ChatTarget::parse(chat) {
            Some(target) => {
                let request = send_message_request(target, body);
                let client = &self.client;
                let request = &request;
                Some(
                    self.guarded(|| async move { client.invoke(request).await.map(|_| ()) })
                        .await,
                )
            }
            None => None,
        };

        match (direct, anchor) {
            (Some(Err(DeliveryError::Failed(reason))), Some(anchor)) => {
                debug!(
                    "Direct send to {} failed ({}), replying to the last message seen",
                    chat, reason
                );
                self.guarded(|| async move { anchor.respond(body).await.map(|_| ()) })
                    .await
            }
            (Some(result), _) => result,
            (None, Some(anchor)) => {
                self.guarded(|| async move { anchor.respond(body).await.map(|_| ()) })
                    .await
            }
            (None, None) => Err(DeliveryError::UnknownChat(chat.to_owned())),
        }
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), DeliveryError> {
        let cached = self.cache.read().await.recent.get(message).cloned();
        let Some(cached) = cached else {
            return Err(DeliveryError::Failed(format!(
                "message {message} is no longer known"
            )));
        };

        self.guarded(|| async move { cached.delete().await })
            .await?;
        self.cache.write().await.recent.remove(message);
        Ok(())
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("username", &self.username)
            .field("flood", &self.flood)
            .finish_non_exhaustive()
    }
}

/// Chat identifier in Bot API form: users as-is, basic groups negated,
/// channels and supergroups as `-(10^12 + id)`.
fn chat_id(peer: &tl::enums::Peer) -> String {
    ChatTarget::from(peer).to_string()
}

fn send_message_request(target: ChatTarget, body: &str) -> tl::functions::messages::SendMessage {
    tl::functions::messages::SendMessage {
        no_webpage: false,
        silent: false,
        background: false,
        clear_draft: false,
        noforwards: false,
        update_stickersets_order: false,
        invert_media: false,
        allow_paid_floodskip: false,
        peer: target.input_peer(),
        reply_to: None,
        message: body.to_owned(),
        random_id: random_id(),
        reply_markup: None,
        entities: None,
        schedule_date: None,
        send_as: None,
        quick_reply_shortcut: None,
        effect: None,
        allow_paid_stars: None,
        suggested_post: None,
    }
}

/// Per-send id Telegram uses to drop duplicates.
fn random_id() -> i64 {
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = std::collections::hash_map::RandomState::new().build_hasher();
    hasher.write_i64(chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default());
    i64::from_ne_bytes(hasher.finish().to_ne_bytes())
}

/// Reference to a raw message plus whether we sent it.
fn message_ref(raw: &tl::enums::Message) -> Option<(MessageRef, bool)> {
    match raw {
        tl::enums::Message::Message(m) => Some((MessageRef::new(chat_id(&m.peer_id), m.id), m.out)),
        tl::enums::Message::Service(m) => Some((MessageRef::new(chat_id(&m.peer_id), m.id), m.out)),
        tl::enums::Message::Empty(_) => None,
    }
}

fn raw_sender_id(raw: &tl::enums::Message) -> Option<i64> {
    let from = match raw {
        tl::enums::Message::Message(m) => m.from_id.as_ref(),
        tl::enums::Message::Service(m) => m.from_id.as_ref(),
        tl::enums::Message::Empty(_) => None,
    }?;
    match from {
        tl::enums::Peer::User(user) => Some(user.user_id),
        _ => None,
    }
}

fn sender_name(message: &Message) -> String {
    message
        .sender()
        .and_then(|peer| peer.name().map(str::to_owned))
        .filter(|name| !name.trim().is_empty())
        .or_else(|| raw_sender_id(&message.raw).map(fallback_name))
        .unwrap_or_else(|| "there".to_owned())
}

fn fallback_name(user_id: i64) -> String {
    format!("user {user_id}")
}

/// "First Last", or whichever part is set.
fn full_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    let name = [first, last]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!name.is_empty()).then_some(name)
}

/// Users an add or remove action is about.
fn action_user_ids(action: &tl::enums::MessageAction) -> Vec<i64> {
    match action {
        tl::enums::MessageAction::ChatAddUser(add) => add.users.clone(),
        tl::enums::MessageAction::ChatDeleteUser(removed) => vec![removed.user_id],
        _ => Vec::new(),
    }
}

/// Maps a join/leave service action to a membership event.
///
/// The actor's name comes from the update; other users are looked up in
/// `known` and fall back to a name built from their id.
fn membership_event(
    chat: &str,
    action: &tl::enums::MessageAction,
    actor_id: Option<i64>,
    actor_name: &str,
    known: &HashMap<i64, String>,
) -> Option<InboundEvent> {
    let name_of = |user_id: i64| {
        if Some(user_id) == actor_id {
            actor_name.to_owned()
        } else {
            known
                .get(&user_id)
                .cloned()
                .unwrap_or_else(|| fallback_name(user_id))
        }
    };

    match action {
        tl::enums::MessageAction::ChatAddUser(add) => {
            let names: Vec<String> = add.users.iter().copied().map(name_of).collect();
            (!names.is_empty()).then(|| InboundEvent::MembersJoined {
                chat: chat.to_owned(),
                names,
            })
        }
        tl::enums::MessageAction::ChatJoinedByLink(_)
        | tl::enums::MessageAction::ChatJoinedByRequest => Some(InboundEvent::MembersJoined {
            chat: chat.to_owned(),
            names: vec![actor_name.to_owned()],
        }),
        tl::enums::MessageAction::ChatDeleteUser(removed) => Some(InboundEvent::MemberLeft {
            chat: chat.to_owned(),
            name: name_of(removed.user_id),
        }),
        _ => None,
    }
}
