// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Buffer of locally created messages that are not yet confirmed by the
//! store.
//!
//! Entries are created synchronously when the user submits a message, so the
//! UI can render them immediately, and are removed once the corresponding
//! confirmed message shows up in the reloaded message list. Failed sends stay
//! in the buffer, marked as failed, until they are resent or discarded.

use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex},
};

use chrono::Utc;
use quillcommon::{identifiers::UserId, time::TimeStamp};
use rand::Rng;
use tokio::sync::watch;

use crate::ConversationId;

use super::{MessageContent, MessageId};

/// Temporary id of a buffered message.
///
/// Derived from the submission time plus a random suffix, so ids stay unique
/// under rapid consecutive sends while preserving submission order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingMessageId(String);

impl PendingMessageId {
    fn random() -> Self {
        let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
        Self(format!("{}-{suffix:06x}", Utc::now().timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PendingMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    Sending,
    Failed,
}

/// A locally buffered, not yet confirmed message.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    temp_id: PendingMessageId,
    /// Id the message will carry once confirmed.
    message_id: MessageId,
    conversation_id: ConversationId,
    sender: UserId,
    receiver: UserId,
    content: MessageContent,
    status: PendingStatus,
    created_at: TimeStamp,
}

impl PendingMessage {
    pub fn temp_id(&self) -> &PendingMessageId {
        &self.temp_id
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn sender(&self) -> &UserId {
        &self.sender
    }

    pub fn receiver(&self) -> &UserId {
        &self.receiver
    }

    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    pub fn status(&self) -> PendingStatus {
        self.status
    }

    pub fn created_at(&self) -> TimeStamp {
        self.created_at
    }
}

/// The shared pending-message buffer of one conversation view.
///
/// All mutations bump a generation counter observed by the message list
/// synchronizer, which then re-emits the merged display list.
#[derive(Debug, Clone)]
pub(crate) struct PendingMessages {
    entries: Arc<Mutex<Vec<PendingMessage>>>,
    changed_tx: watch::Sender<u64>,
}

impl PendingMessages {
    pub(crate) fn new() -> Self {
        let (changed_tx, _) = watch::channel(0);
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            changed_tx,
        }
    }

    pub(crate) fn changed(&self) -> watch::Receiver<u64> {
        self.changed_tx.subscribe()
    }

    /// Inserts a new entry with status `Sending` and returns its temporary
    /// id. Synchronous; never waits on the network.
    pub(crate) fn add(
        &self,
        message_id: MessageId,
        conversation_id: ConversationId,
        sender: UserId,
        receiver: UserId,
        content: MessageContent,
    ) -> PendingMessageId {
        let temp_id = PendingMessageId::random();
        let entry = PendingMessage {
            temp_id: temp_id.clone(),
            message_id,
            conversation_id,
            sender,
            receiver,
            content,
            status: PendingStatus::Sending,
            created_at: TimeStamp::now(),
        };
        self.entries.lock().unwrap().push(entry);
        self.bump();
        temp_id
    }

    pub(crate) fn mark_failed(&self, temp_id: &PendingMessageId) {
        self.update(temp_id, |entry| entry.status = PendingStatus::Failed);
    }

    pub(crate) fn mark_sending(&self, temp_id: &PendingMessageId) -> Option<PendingMessage> {
        self.update(temp_id, |entry| entry.status = PendingStatus::Sending)
    }

    /// Removes the entry, e.g. when the user discards a failed send.
    pub(crate) fn remove(&self, temp_id: &PendingMessageId) -> bool {
        let removed = {
            let mut entries = self.entries.lock().unwrap();
            let before = entries.len();
            entries.retain(|entry| &entry.temp_id != temp_id);
            entries.len() != before
        };
        if removed {
            self.bump();
        }
        removed
    }

    /// Drops every entry whose confirmed message id is contained in
    /// `confirmed`. Called by the synchronizer after reloading the confirmed
    /// message list.
    pub(crate) fn prune_confirmed(&self, confirmed: &HashSet<MessageId>) {
        let pruned = {
            let mut entries = self.entries.lock().unwrap();
            let before = entries.len();
            entries.retain(|entry| !confirmed.contains(&entry.message_id));
            entries.len() != before
        };
        if pruned {
            self.bump();
        }
    }

    pub(crate) fn get(&self, temp_id: &PendingMessageId) -> Option<PendingMessage> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|entry| &entry.temp_id == temp_id)
            .cloned()
    }

    pub(crate) fn snapshot(&self) -> Vec<PendingMessage> {
        self.entries.lock().unwrap().clone()
    }

    fn update(
        &self,
        temp_id: &PendingMessageId,
        f: impl FnOnce(&mut PendingMessage),
    ) -> Option<PendingMessage> {
        let updated = {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries.iter_mut().find(|entry| &entry.temp_id == temp_id)?;
            f(entry);
            Some(entry.clone())
        };
        self.bump();
        updated
    }

    fn bump(&self) {
        self.changed_tx.send_modify(|generation| *generation += 1);
    }
}
