// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Live view over the messages of one conversation, merged with the
//! pending-message buffer.

use std::{collections::HashSet, pin::pin, sync::Arc};

use enumset::EnumSet;
use quillcommon::identifiers::UserId;
use tokio::sync::watch;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    ConversationId, ConversationMessage, MessageContent, MessageId,
    conversations::messages::pending::{
        PendingMessage, PendingMessageId, PendingMessages, PendingStatus,
    },
    errors::SendMessageError,
    store::{Store, StoreEntityId, StoreNotification, StoreOperation},
};

use super::Subscription;

/// Bound of the live message window: only the most recent messages of a
/// conversation are kept in the view.
pub(crate) const MESSAGE_WINDOW: usize = 100;

/// An entry of the displayed message list: either confirmed by the store or
/// still pending in the local buffer.
#[derive(Debug, Clone)]
pub enum ListedMessage {
    Confirmed(ConversationMessage),
    Pending(PendingMessage),
}

impl ListedMessage {
    pub fn is_pending(&self) -> bool {
        matches!(self, ListedMessage::Pending(_))
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            ListedMessage::Confirmed(message) => message.content().body(),
            ListedMessage::Pending(pending) => pending.content().body(),
        }
    }

    pub fn sender(&self) -> &UserId {
        match self {
            ListedMessage::Confirmed(message) => message.sender(),
            ListedMessage::Pending(pending) => pending.sender(),
        }
    }
}

/// The state of the message list.
///
/// Confirmed messages come first, in ascending timestamp order; pending
/// entries always trail them, in submission order, so an optimistic send
/// never reorders history once confirmed.
#[derive(Debug, Clone, Default)]
pub struct MessageListState {
    pub messages: Vec<ListedMessage>,
}

impl MessageListState {
    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_pending()).count()
    }
}

/// Maintains the message list of one conversation and owns its pending
/// buffer. Constructed via [`MessageList::spawn`].
struct MessageListSynchronizer<S> {
    store: S,
    conversation_id: ConversationId,
    pending: PendingMessages,
    state_tx: watch::Sender<MessageListState>,
}

impl<S> MessageListSynchronizer<S>
where
    S: Store + Clone + Send + Sync + 'static,
{
    async fn load_and_emit(&self) {
        let confirmed = match self
            .store
            .messages(&self.conversation_id, MESSAGE_WINDOW)
            .await
        {
            Ok(messages) => messages,
            Err(error) => {
                // degrade to an empty list instead of surfacing a broken
                // subscription to the consumer
                error!(%error, "Failed to load messages; emitting empty list");
                Vec::new()
            }
        };

        // a pending entry is superseded as soon as its confirmed message is
        // observed in the reloaded list
        let confirmed_ids: HashSet<MessageId> = confirmed.iter().map(|m| m.id()).collect();
        self.pending.prune_confirmed(&confirmed_ids);

        let pending = self.pending.snapshot();
        debug!(
            confirmed = confirmed.len(),
            pending = pending.len(),
            "MessageListSynchronizer::load_and_emit"
        );
        let messages = merge_for_display(confirmed, pending);
        self.state_tx
            .send_modify(|state| state.messages = messages);
    }

    async fn event_loop(
        &self,
        store_notifications: impl Stream<Item = Arc<StoreNotification>>,
        mut pending_changed: watch::Receiver<u64>,
        stop: CancellationToken,
    ) {
        let mut store_notifications = pin!(store_notifications);
        loop {
            tokio::select! {
                _ = stop.cancelled() => return,
                notification = store_notifications.next() => match notification {
                    Some(notification) => {
                        if self.is_message_list_relevant(&notification).await {
                            self.load_and_emit().await;
                        }
                    }
                    None => return,
                },
                changed = pending_changed.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    self.load_and_emit().await;
                }
            }
        }
    }

    /// Whether the notification touches a message of this conversation.
    async fn is_message_list_relevant(&self, notification: &StoreNotification) -> bool {
        let touched = EnumSet::from(StoreOperation::Add) | StoreOperation::Update;
        for (id, ops) in notification.ops.iter() {
            let StoreEntityId::Message(message_id) = id else {
                continue;
            };
            if ops.is_disjoint(touched) {
                continue;
            }
            match self.store.message(*message_id).await {
                Ok(Some(message)) if message.conversation_id() == &self.conversation_id => {
                    return true;
                }
                Ok(_) => {}
                Err(error) => {
                    error!(%error, "Failed to resolve notified message");
                }
            }
        }
        false
    }
}

/// Builds the displayed list: the confirmed messages in store order,
/// followed by all still-pending entries in submission order. Pending
/// entries never interleave with history, so a send that confirms does not
/// reorder anything the user has already read.
fn merge_for_display(
    confirmed: Vec<ConversationMessage>,
    pending: Vec<PendingMessage>,
) -> Vec<ListedMessage> {
    confirmed
        .into_iter()
        .map(ListedMessage::Confirmed)
        .chain(pending.into_iter().map(ListedMessage::Pending))
        .collect()
}

/// A conversation view: the live message list plus the optimistic send
/// operations acting on its pending buffer.
pub struct MessageList<S> {
    store: S,
    conversation_id: ConversationId,
    peer: UserId,
    pending: PendingMessages,
    subscription: Subscription<MessageListState>,
}

impl<S> MessageList<S>
where
    S: Store + Clone + Send + Sync + 'static,
{
    /// Spawns the message list synchronizer for the conversation with `peer`
    /// and returns the view handle.
    pub fn spawn(store: S, peer: UserId) -> Self {
        let conversation_id = ConversationId::from_participants(store.user_id(), &peer);
        let (state_tx, state_rx) = watch::channel(MessageListState::default());
        let cancel = CancellationToken::new();
        let store_notifications = store.subscribe();
        let pending = PendingMessages::new();
        let pending_changed = pending.changed();

        let synchronizer = MessageListSynchronizer {
            store: store.clone(),
            conversation_id: conversation_id.clone(),
            pending: pending.clone(),
            state_tx,
        };
        tokio::spawn({
            let stop = cancel.clone();
            async move {
                synchronizer.load_and_emit().await;
                synchronizer
                    .event_loop(store_notifications, pending_changed, stop)
                    .await;
            }
        });

        Self {
            store,
            conversation_id,
            peer,
            pending,
            subscription: Subscription::new(state_rx, cancel),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// The most recently emitted list state.
    pub fn state(&self) -> MessageListState {
        self.subscription.state()
    }

    /// Waits for the next state change. Returns `false` once the view is
    /// stopped.
    pub async fn changed(&mut self) -> bool {
        self.subscription.changed().await
    }

    pub fn stop(&self) {
        self.subscription.stop();
    }

    /// Submits a message optimistically.
    ///
    /// The entry is buffered synchronously and its temporary id returned
    /// immediately; the store write happens in the background. On failure
    /// the entry stays in the list, marked failed, until it is resent or
    /// discarded. There is no automatic retry.
    pub fn send(&self, content: MessageContent) -> Result<PendingMessageId, SendMessageError> {
        content.validate()?;
        let message_id = MessageId::random();
        let temp_id = self.pending.add(
            message_id,
            self.conversation_id.clone(),
            self.store.user_id().clone(),
            self.peer.clone(),
            content.clone(),
        );
        self.spawn_send(message_id, temp_id.clone(), content);
        Ok(temp_id)
    }

    /// Re-submits a failed entry. Returns `false` if the entry is unknown or
    /// not in the failed state.
    pub fn resend(&self, temp_id: &PendingMessageId) -> bool {
        let entry = match self.pending.get(temp_id) {
            Some(entry) if entry.status() == PendingStatus::Failed => entry,
            _ => return false,
        };
        self.pending.mark_sending(temp_id);
        self.spawn_send(entry.message_id(), temp_id.clone(), entry.content().clone());
        true
    }

    /// Drops a failed entry from the buffer. Returns whether it existed.
    pub fn discard(&self, temp_id: &PendingMessageId) -> bool {
        self.pending.remove(temp_id)
    }

    fn spawn_send(&self, message_id: MessageId, temp_id: PendingMessageId, content: MessageContent) {
        let store = self.store.clone();
        let conversation_id = self.conversation_id.clone();
        let peer = self.peer.clone();
        let pending = self.pending.clone();
        tokio::spawn(async move {
            if let Err(error) = store
                .send_message_with_id(message_id, &conversation_id, &peer, content)
                .await
            {
                warn!(%error, %temp_id, "Message send failed");
                pending.mark_failed(&temp_id);
            }
        });
    }
}
