// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{collections::BTreeMap, sync::Arc};

use enumset::{EnumSet, EnumSetType};
use tokio::sync::broadcast;
use tokio_stream::{
    Stream, StreamExt,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use tracing::error;

use super::StoreEntityId;

// 1024 * size_of::<Arc<StoreNotification>>() = 1024 * 8 = 8 KiB
const NOTIFICATION_CHANNEL_SIZE: usize = 1024;

/// Operations on a store entity reported by a [`StoreNotification`].
#[derive(EnumSetType, Debug)]
pub enum StoreOperation {
    Add,
    Update,
    Remove,
}

/// A set of changes to the client store, published after the corresponding
/// write transaction committed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StoreNotification {
    pub ops: BTreeMap<StoreEntityId, EnumSet<StoreOperation>>,
}

impl StoreNotification {
    pub(crate) fn builder() -> StoreNotificationBuilder {
        StoreNotificationBuilder::default()
    }

    pub fn contains(&self, id: &StoreEntityId, op: StoreOperation) -> bool {
        self.ops.get(id).is_some_and(|ops| ops.contains(op))
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[derive(Debug, Default)]
pub(crate) struct StoreNotificationBuilder {
    inner: StoreNotification,
}

impl StoreNotificationBuilder {
    pub(crate) fn add(&mut self, id: impl Into<StoreEntityId>) -> &mut Self {
        self.insert(id.into(), StoreOperation::Add);
        self
    }

    pub(crate) fn update(&mut self, id: impl Into<StoreEntityId>) -> &mut Self {
        self.insert(id.into(), StoreOperation::Update);
        self
    }

    #[expect(dead_code)]
    pub(crate) fn remove(&mut self, id: impl Into<StoreEntityId>) -> &mut Self {
        self.insert(id.into(), StoreOperation::Remove);
        self
    }

    fn insert(&mut self, id: StoreEntityId, op: StoreOperation) {
        *self.inner.ops.entry(id).or_default() |= op;
    }

    pub(crate) fn build(&mut self) -> Arc<StoreNotification> {
        Arc::new(std::mem::take(&mut self.inner))
    }

    fn is_empty(&self) -> bool {
        self.inner.ops.is_empty()
    }
}

/// Fan-out of [`StoreNotification`]s to all live subscribers.
#[derive(Debug, Clone)]
pub(crate) struct StoreNotificationsSender {
    tx: broadcast::Sender<Arc<StoreNotification>>,
}

impl StoreNotificationsSender {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFICATION_CHANNEL_SIZE);
        Self { tx }
    }

    pub(crate) fn notify(&self, notification: impl Into<Arc<StoreNotification>>) {
        let _no_receivers = self.tx.send(notification.into());
    }

    pub(crate) fn subscribe(
        &self,
    ) -> impl Stream<Item = Arc<StoreNotification>> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).map(|res| match res {
            Ok(notification) => notification,
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                error!("store notifications lagged by {n} messages");
                Arc::new(StoreNotification::default())
            }
        })
    }
}

impl Default for StoreNotificationsSender {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects the entities touched by a write path and publishes them as a
/// single notification once the transaction committed.
///
/// Nothing is published until [`Self::notify`] is called, so a rolled back
/// transaction never leaks a notification.
pub(crate) struct StoreNotifier {
    tx: Option<StoreNotificationsSender>,
    builder: StoreNotificationBuilder,
}

impl StoreNotifier {
    pub(crate) fn new(tx: StoreNotificationsSender) -> Self {
        Self {
            tx: Some(tx),
            builder: StoreNotification::builder(),
        }
    }

    /// A notifier which drops all recorded changes. Used in tests of the
    /// persistence layer.
    #[cfg(test)]
    pub(crate) fn noop() -> Self {
        Self {
            tx: None,
            builder: StoreNotification::builder(),
        }
    }

    pub(crate) fn add(&mut self, id: impl Into<StoreEntityId>) -> &mut Self {
        self.builder.add(id);
        self
    }

    pub(crate) fn update(&mut self, id: impl Into<StoreEntityId>) -> &mut Self {
        self.builder.update(id);
        self
    }

    pub(crate) fn notify(mut self) {
        if self.builder.is_empty() {
            return;
        }
        let notification = self.builder.build();
        if let Some(tx) = &self.tx {
            tx.notify(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use quillcommon::identifiers::UserId;

    use super::*;

    #[test]
    fn builder_merges_operations_per_entity() {
        let alice = UserId::new("alice").unwrap();
        let mut builder = StoreNotification::builder();
        builder.add(alice.clone()).update(alice.clone());
        let notification = builder.build();

        let id = StoreEntityId::User(alice);
        assert!(notification.contains(&id, StoreOperation::Add));
        assert!(notification.contains(&id, StoreOperation::Update));
        assert!(!notification.contains(&id, StoreOperation::Remove));
    }

    #[tokio::test]
    async fn subscribers_receive_notifications() {
        let sender = StoreNotificationsSender::new();
        let mut stream = std::pin::pin!(sender.subscribe());

        let alice = UserId::new("alice").unwrap();
        sender.notify(StoreNotification::builder().update(alice.clone()).build());

        let notification = stream.next().await.unwrap();
        assert!(notification.contains(&StoreEntityId::User(alice), StoreOperation::Update));
    }

    #[test]
    fn empty_notifier_publishes_nothing() {
        let sender = StoreNotificationsSender::new();
        let mut rx = sender.tx.subscribe();
        StoreNotifier::new(sender.clone()).notify();
        assert!(rx.try_recv().is_err());
    }
}
