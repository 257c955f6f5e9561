// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Live view over the chat list of a user.

use std::{pin::pin, sync::Arc};

use quillcommon::{identifiers::UserId, time::TimeStamp};
use tokio::sync::watch;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    Conversation, ConversationId,
    store::{Store, StoreEntityId, StoreNotification, StoreResult},
    user_profiles::UserProfile,
};

use super::Subscription;

/// Bound of the chat list: only the most recently active conversations are
/// kept in the live view.
pub(crate) const CHAT_LIST_LIMIT: usize = 50;

/// One conversation as rendered in the chat list, enriched with the other
/// participant's profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatListEntry {
    pub conversation_id: ConversationId,
    /// Profile of the other participant.
    pub profile: UserProfile,
    pub last_message_body: Option<String>,
    pub last_message_sender: Option<UserId>,
    pub last_message_at: Option<TimeStamp>,
    /// Whether the last message has been seen. `true` when the viewer sent
    /// it themselves, or after an explicit mark-as-seen.
    pub seen: bool,
    /// Whether this conversation counts as unread for the viewer: its last
    /// message is unseen and was not sent by the viewer.
    pub is_unread: bool,
}

/// The state of the chat list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatListState {
    /// Ordered by last-message timestamp, most recent first.
    pub entries: Vec<ChatListEntry>,
    /// Whether this snapshot is the locally cached view, not yet confirmed
    /// by the live subscription.
    pub from_cache: bool,
    /// Cleared on the first live snapshot, or immediately when there are no
    /// conversations to wait for.
    pub loading: bool,
}

impl Default for ChatListState {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            from_cache: true,
            loading: true,
        }
    }
}

impl ChatListState {
    /// Number of conversations that count as unread for the viewer.
    /// Recomputed on every snapshot; not stored anywhere.
    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_unread).count()
    }
}

/// Maintains the chat list of the store's user: loads the cached snapshot,
/// confirms it with a live one, then reloads on every relevant store change.
pub struct ChatListSynchronizer<S> {
    store: S,
    state_tx: watch::Sender<ChatListState>,
}

impl<S> ChatListSynchronizer<S>
where
    S: Store + Send + Sync + 'static,
{
    /// Spawns the synchronizer task and returns its subscription handle.
    pub fn spawn(store: S) -> Subscription<ChatListState> {
        let (state_tx, state_rx) = watch::channel(ChatListState::default());
        let cancel = CancellationToken::new();
        let store_notifications = store.subscribe();

        let this = Self { store, state_tx };
        tokio::spawn({
            let stop = cancel.clone();
            async move {
                // cache-then-live: the cached snapshot is shown while the
                // live subscription connects, then fully replaced
                this.load_and_emit(true).await;
                this.load_and_emit(false).await;
                this.store_notifications_loop(store_notifications, stop)
                    .await;
            }
        });

        Subscription::new(state_rx, cancel)
    }

    async fn load_and_emit(&self, from_cache: bool) {
        let entries = match self.load_entries().await {
            Ok(entries) => entries,
            Err(error) => {
                // degrade to an empty list instead of surfacing a broken
                // subscription to the consumer
                error!(%error, "Failed to load chat list; emitting empty list");
                Vec::new()
            }
        };
        debug!(count = entries.len(), from_cache, "ChatListSynchronizer::load_and_emit");
        self.state_tx.send_modify(|state| {
            state.loading = from_cache && state.loading && !entries.is_empty();
            state.from_cache = from_cache;
            state.entries = entries;
        });
    }

    async fn load_entries(&self) -> StoreResult<Vec<ChatListEntry>> {
        let viewer = self.store.user_id().clone();
        let conversations = self.store.conversations(CHAT_LIST_LIMIT).await?;
        let mut entries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            if let Some(entry) = self.load_entry(&viewer, conversation).await {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Builds the list entry for one conversation. A failed or empty profile
    /// lookup skips the entry instead of failing the whole list.
    async fn load_entry(
        &self,
        viewer: &UserId,
        conversation: Conversation,
    ) -> Option<ChatListEntry> {
        let other = conversation.other_participant(viewer)?;
        let profile = match self.store.user_profile(other).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                warn!(user_id =% other, "No profile for participant; skipping conversation");
                return None;
            }
            Err(error) => {
                warn!(
                    %error,
                    user_id =% other,
                    "Profile lookup failed; skipping conversation"
                );
                return None;
            }
        };
        let last_message = conversation.last_message();
        let seen = last_message.map(|last| last.seen).unwrap_or(true);
        let is_unread = last_message
            .map(|last| !last.seen && &last.sender != viewer)
            .unwrap_or(false);
        Some(ChatListEntry {
            conversation_id: conversation.id().clone(),
            profile,
            last_message_body: last_message.and_then(|last| last.body.clone()),
            last_message_sender: last_message.map(|last| last.sender.clone()),
            last_message_at: last_message.map(|last| last.sent_at),
            seen,
            is_unread,
        })
    }

    async fn store_notifications_loop(
        &self,
        store_notifications: impl Stream<Item = Arc<StoreNotification>>,
        stop: CancellationToken,
    ) {
        let mut store_notifications = pin!(store_notifications);
        loop {
            let res = tokio::select! {
                _ = stop.cancelled() => return,
                notification = store_notifications.next() => notification,
            };
            match res {
                Some(notification) => {
                    if is_chat_list_relevant(&notification) {
                        self.load_and_emit(false).await;
                    }
                }
                None => return,
            }
        }
    }
}

fn is_chat_list_relevant(notification: &StoreNotification) -> bool {
    notification.ops.iter().any(|(id, ops)| {
        matches!(
            id,
            StoreEntityId::Conversation(_) | StoreEntityId::User(_)
        ) && !ops.is_empty()
    })
}
