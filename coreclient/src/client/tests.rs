// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Scenario tests of the chat core: gateway writes, live views and the
//! optimistic send path, all running against one shared store, which stands
//! in for the synchronized backend both participants observe.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration as StdDuration,
};

use anyhow::bail;
use quillcommon::identifiers::UserId;
use sqlx::SqlitePool;
use tokio::sync::Notify;
use tokio_stream::Stream;

use crate::{
    ChatListState, ChatListSynchronizer, ClientConfig, ClientConnection, Conversation,
    ConversationId, ConversationMessage, CoreClient, ListedMessage, MessageContent, MessageId,
    MessageList, MessageListState, MessageStatus, PendingStatus, SendMessageError, Subscription,
    UserProfile,
    store::{Store, StoreNotification, StoreResult},
    utils::connection_ext::ConnectionExt,
};

const WAIT: StdDuration = StdDuration::from_secs(5);

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn setup(pool: SqlitePool) -> anyhow::Result<(CoreClient, CoreClient)> {
    init_test_logging();
    let connection = ClientConnection::from_pool(pool);
    let alice = CoreClient::new(connection.clone(), UserId::new("alice")?);
    let bob = CoreClient::new(connection, UserId::new("bob")?);
    alice
        .set_own_profile(
            UserProfile::new(alice.user_id().clone(), "alice_v").with_display_name("Alice"),
        )
        .await?;
    bob.set_own_profile(UserProfile::new(bob.user_id().clone(), "bob_marley")).await?;
    Ok((alice, bob))
}

fn conversation_id(a: &CoreClient, b: &CoreClient) -> ConversationId {
    ConversationId::from_participants(a.user_id(), b.user_id())
}

async fn wait_for<S, F>(subscription: &mut Subscription<S>, mut pred: F) -> S
where
    S: Clone,
    F: FnMut(&S) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let state = subscription.state();
            if pred(&state) {
                return state;
            }
            assert!(subscription.changed().await, "subscription ended");
        }
    })
    .await
    .expect("timed out waiting for state")
}

async fn wait_for_list<S, F>(list: &mut MessageList<S>, mut pred: F) -> MessageListState
where
    S: Store + Clone + Send + Sync + 'static,
    F: FnMut(&MessageListState) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let state = list.state();
            if pred(&state) {
                return state;
            }
            assert!(list.changed().await, "message list ended");
        }
    })
    .await
    .expect("timed out waiting for message list")
}

#[tokio::test]
async fn connect_creates_and_migrates_the_database() -> anyhow::Result<()> {
    init_test_logging();
    let dir = tempfile::tempdir()?;
    let config = ClientConfig::new(dir.path().join("quill.db"));

    let client = CoreClient::open(&config, UserId::new("alice")?).await?;
    client
        .set_own_profile(UserProfile::new(client.user_id().clone(), "alice_v"))
        .await?;
    assert!(client.own_profile().await?.is_some());

    Ok(())
}

#[sqlx::test]
async fn send_appends_message_and_updates_summary(pool: SqlitePool) -> anyhow::Result<()> {
    let (alice, bob) = setup(pool).await?;
    let conversation_id = conversation_id(&alice, &bob);

    let before = alice.messages_count(&conversation_id).await?;
    let message = alice
        .send_message(&conversation_id, bob.user_id(), MessageContent::text("hello"))
        .await?;

    assert_eq!(alice.messages_count(&conversation_id).await?, before + 1);
    assert_eq!(message.status(), MessageStatus::Sent);
    assert!(!message.is_seen());

    // the summary agrees with the appended message
    let conversation = alice.conversation(&conversation_id).await?.unwrap();
    let last = conversation.last_message().unwrap();
    assert_eq!(last.body.as_deref(), Some("hello"));
    assert_eq!(&last.sender, alice.user_id());
    assert_eq!(last.sent_at, message.sent_at());
    assert!(!last.seen);

    Ok(())
}

#[sqlx::test]
async fn explicit_initialization_creates_an_empty_conversation(
    pool: SqlitePool,
) -> anyhow::Result<()> {
    let (alice, bob) = setup(pool).await?;

    let id = alice.init_conversation(bob.user_id()).await?;
    assert_eq!(id, conversation_id(&alice, &bob));
    // a second initialization is a no-op
    assert_eq!(alice.init_conversation(bob.user_id()).await?, id);

    let conversation = alice.conversation(&id).await?.unwrap();
    assert!(conversation.last_message().is_none());

    // the conversation shows up in the chat list without a last message
    let mut list = ChatListSynchronizer::spawn(alice.clone());
    let state = wait_for(&mut list, |state: &ChatListState| {
        !state.from_cache && !state.entries.is_empty()
    })
    .await;
    assert!(state.entries[0].last_message_at.is_none());
    assert!(state.entries[0].seen);
    assert!(!state.entries[0].is_unread);

    Ok(())
}

#[sqlx::test]
async fn empty_content_is_rejected_before_any_write(pool: SqlitePool) -> anyhow::Result<()> {
    let (alice, bob) = setup(pool).await?;
    let conversation_id = conversation_id(&alice, &bob);

    let result = alice
        .send_message(&conversation_id, bob.user_id(), MessageContent::text(" "))
        .await;
    assert!(matches!(result, Err(SendMessageError::EmptyContent)));

    // a conversation id alice is not part of is rejected as well
    let foreign =
        ConversationId::from_participants(&UserId::new("dave")?, &UserId::new("erin")?);
    let result = alice
        .send_message(&foreign, bob.user_id(), MessageContent::text("hi"))
        .await;
    assert!(matches!(result, Err(SendMessageError::NotAParticipant)));

    assert_eq!(alice.messages_count(&conversation_id).await?, 0);
    assert!(alice.conversation(&conversation_id).await?.is_none());

    Ok(())
}

#[sqlx::test]
async fn aborted_transaction_leaves_no_partial_write(pool: SqlitePool) -> anyhow::Result<()> {
    let (alice, bob) = setup(pool.clone()).await?;
    let conversation_id = conversation_id(&alice, &bob);

    // a backend failure injected between the message append and the summary
    // update must roll back both writes
    let mut notifier = alice.store_notifier();
    let mut connection = pool.acquire().await?;
    let result: anyhow::Result<()> = connection
        .with_transaction(async |txn| {
            Conversation::new(alice.user_id().clone(), bob.user_id().clone())
                .store(txn.as_mut(), &mut notifier)
                .await?;
            let message = ConversationMessage::new(
                MessageId::random(),
                conversation_id.clone(),
                alice.user_id().clone(),
                bob.user_id().clone(),
                MessageContent::text("lost"),
                quillcommon::time::TimeStamp::now(),
            );
            message.store(txn.as_mut(), &mut notifier).await?;
            bail!("injected backend failure");
        })
        .await;
    assert!(result.is_err());

    assert_eq!(alice.messages_count(&conversation_id).await?, 0);
    assert!(alice.conversation(&conversation_id).await?.is_none());

    Ok(())
}

#[sqlx::test]
async fn mark_as_seen_is_idempotent(pool: SqlitePool) -> anyhow::Result<()> {
    let (alice, bob) = setup(pool).await?;
    let conversation_id = conversation_id(&alice, &bob);

    alice
        .send_message(&conversation_id, bob.user_id(), MessageContent::text("one"))
        .await?;
    alice
        .send_message(&conversation_id, bob.user_id(), MessageContent::text("two"))
        .await?;
    assert_eq!(bob.unread_messages_count(&conversation_id).await?, 2);

    assert_eq!(bob.mark_messages_as_seen(&conversation_id).await?, 2);
    let transitioned_once = bob.messages(&conversation_id, 10).await?;

    // the second call finds nothing unseen and changes nothing
    assert_eq!(bob.mark_messages_as_seen(&conversation_id).await?, 0);
    assert_eq!(bob.messages(&conversation_id, 10).await?, transitioned_once);

    assert_eq!(bob.unread_messages_count(&conversation_id).await?, 0);
    assert!(
        transitioned_once
            .iter()
            .all(|m| m.is_seen() && m.status() == MessageStatus::Seen)
    );

    Ok(())
}

// Scenario: a message sent by alice arrives in bob's live view.
#[sqlx::test]
async fn subscriber_receives_sent_message(pool: SqlitePool) -> anyhow::Result<()> {
    let (alice, bob) = setup(pool).await?;
    let conversation_id = conversation_id(&alice, &bob);

    let mut bob_view = MessageList::spawn(bob.clone(), alice.user_id().clone());

    alice
        .send_message(&conversation_id, bob.user_id(), MessageContent::text("hello"))
        .await?;

    let state = wait_for_list(&mut bob_view, |state| !state.messages.is_empty()).await;
    let ListedMessage::Confirmed(message) = state.messages.last().unwrap() else {
        panic!("expected a confirmed message");
    };
    assert_eq!(message.content().body(), Some("hello"));
    assert_eq!(message.sender(), alice.user_id());
    assert_eq!(message.status(), MessageStatus::Sent);

    Ok(())
}

/// Store wrapper with controllable send behavior: sends can be held back
/// behind a gate and forced to fail, so the intermediate states of the
/// optimistic send path become observable.
#[derive(Clone)]
struct TestStore {
    inner: CoreClient,
    gate: Option<Arc<Notify>>,
    fail_sends: Arc<AtomicBool>,
}

impl TestStore {
    fn new(inner: CoreClient) -> Self {
        Self {
            inner,
            gate: None,
            fail_sends: Arc::new(AtomicBool::new(false)),
        }
    }

    fn gated(inner: CoreClient) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let store = Self {
            gate: Some(gate.clone()),
            ..Self::new(inner)
        };
        (store, gate)
    }
}

impl Store for TestStore {
    fn user_id(&self) -> &UserId {
        self.inner.user_id()
    }

    async fn own_profile(&self) -> StoreResult<Option<UserProfile>> {
        Store::own_profile(&self.inner).await
    }

    async fn set_own_profile(&self, profile: UserProfile) -> StoreResult<()> {
        Store::set_own_profile(&self.inner, profile).await
    }

    async fn user_profile(&self, user_id: &UserId) -> StoreResult<Option<UserProfile>> {
        Store::user_profile(&self.inner, user_id).await
    }

    async fn init_conversation(&self, other: &UserId) -> StoreResult<ConversationId> {
        Store::init_conversation(&self.inner, other).await
    }

    async fn conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<Option<Conversation>> {
        Store::conversation(&self.inner, conversation_id).await
    }

    async fn conversations(&self, limit: usize) -> StoreResult<Vec<Conversation>> {
        Store::conversations(&self.inner, limit).await
    }

    async fn messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> StoreResult<Vec<ConversationMessage>> {
        Store::messages(&self.inner, conversation_id, limit).await
    }

    async fn message(&self, message_id: MessageId) -> StoreResult<Option<ConversationMessage>> {
        Store::message(&self.inner, message_id).await
    }

    async fn last_message(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<Option<ConversationMessage>> {
        Store::last_message(&self.inner, conversation_id).await
    }

    async fn messages_count(&self, conversation_id: &ConversationId) -> StoreResult<usize> {
        Store::messages_count(&self.inner, conversation_id).await
    }

    async fn unread_messages_count(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<usize> {
        Store::unread_messages_count(&self.inner, conversation_id).await
    }

    async fn global_unread_messages_count(&self) -> StoreResult<usize> {
        Store::global_unread_messages_count(&self.inner).await
    }

    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        receiver: &UserId,
        content: MessageContent,
    ) -> StoreResult<ConversationMessage> {
        self.send_message_with_id(MessageId::random(), conversation_id, receiver, content)
            .await
    }

    async fn send_message_with_id(
        &self,
        message_id: MessageId,
        conversation_id: &ConversationId,
        receiver: &UserId,
        content: MessageContent,
    ) -> StoreResult<ConversationMessage> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            bail!("injected send failure");
        }
        Store::send_message_with_id(&self.inner, message_id, conversation_id, receiver, content)
            .await
    }

    async fn mark_messages_as_seen(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<usize> {
        Store::mark_messages_as_seen(&self.inner, conversation_id).await
    }

    async fn mark_messages_as_delivered(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<usize> {
        Store::mark_messages_as_delivered(&self.inner, conversation_id).await
    }

    fn subscribe(&self) -> impl Stream<Item = Arc<StoreNotification>> + Send + 'static {
        Store::subscribe(&self.inner)
    }
}

// Scenario: exactly one optimistic entry is displayed while the send is in
// flight; confirmation replaces it in chronological position.
#[sqlx::test]
async fn optimistic_entry_is_replaced_by_confirmation(pool: SqlitePool) -> anyhow::Result<()> {
    let (alice, bob) = setup(pool).await?;
    let conversation_id = conversation_id(&alice, &bob);

    // an earlier confirmed message, so the ordering is observable
    alice
        .send_message(&conversation_id, bob.user_id(), MessageContent::text("first"))
        .await?;

    let (store, gate) = TestStore::gated(alice.clone());
    let mut view = MessageList::spawn(store, bob.user_id().clone());
    wait_for_list(&mut view, |state| state.messages.len() == 1).await;

    let temp_id = view.send(MessageContent::text("second"))?;

    // the write is gated: the entry is displayed as pending, after history
    let state = wait_for_list(&mut view, |state| state.pending_count() == 1).await;
    assert_eq!(state.messages.len(), 2);
    let ListedMessage::Pending(pending) = state.messages.last().unwrap() else {
        panic!("expected the pending entry to trail the confirmed messages");
    };
    assert_eq!(pending.temp_id(), &temp_id);
    assert_eq!(pending.status(), PendingStatus::Sending);

    // release the write: the pending entry is superseded by the confirmed
    // message, in chronological position
    gate.notify_one();
    let state = wait_for_list(&mut view, |state| {
        state.pending_count() == 0 && state.messages.len() == 2
    })
    .await;
    let bodies: Vec<_> = state.messages.iter().map(|m| m.body().unwrap()).collect();
    assert_eq!(bodies, ["first", "second"]);
    assert!(state.messages.iter().all(|m| !m.is_pending()));

    Ok(())
}

#[sqlx::test]
async fn failed_send_is_retained_and_resendable(pool: SqlitePool) -> anyhow::Result<()> {
    let (alice, bob) = setup(pool).await?;

    let store = TestStore::new(alice.clone());
    store.fail_sends.store(true, Ordering::SeqCst);
    let mut view = MessageList::spawn(store.clone(), bob.user_id().clone());

    let temp_id = view.send(MessageContent::text("flaky"))?;

    // the failed entry stays visible, marked as failed
    let state = wait_for_list(&mut view, |state| {
        state.messages.iter().any(|m| {
            matches!(m, ListedMessage::Pending(p) if p.status() == PendingStatus::Failed)
        })
    })
    .await;
    assert_eq!(state.messages.len(), 1);

    // manual resend after the backend recovered
    store.fail_sends.store(false, Ordering::SeqCst);
    assert!(view.resend(&temp_id));
    let state = wait_for_list(&mut view, |state| {
        state.pending_count() == 0 && state.messages.len() == 1
    })
    .await;
    let ListedMessage::Confirmed(message) = &state.messages[0] else {
        panic!("expected a confirmed message");
    };
    assert_eq!(message.content().body(), Some("flaky"));

    Ok(())
}

// Scenario: bob marks the conversation as seen; alice's chat list entry
// flips to seen and the unread count drops.
#[sqlx::test]
async fn seen_propagates_to_the_senders_chat_list(pool: SqlitePool) -> anyhow::Result<()> {
    let (alice, bob) = setup(pool).await?;
    let conversation_id = conversation_id(&alice, &bob);

    let mut alice_list = ChatListSynchronizer::spawn(alice.clone());
    let mut bob_list = ChatListSynchronizer::spawn(bob.clone());

    alice
        .send_message(&conversation_id, bob.user_id(), MessageContent::text("hello"))
        .await?;

    // the sender's own entry is not unread, the receiver's is
    let state = wait_for(&mut alice_list, |state: &ChatListState| {
        !state.from_cache && !state.entries.is_empty()
    })
    .await;
    assert!(!state.entries[0].seen);
    assert!(!state.entries[0].is_unread);
    assert_eq!(state.unread_count(), 0);

    let state = wait_for(&mut bob_list, |state: &ChatListState| {
        state.entries.iter().any(|e| e.is_unread)
    })
    .await;
    assert_eq!(state.unread_count(), 1);
    assert_eq!(state.entries[0].profile.displayed_name(), "Alice");
    assert_eq!(state.entries[0].last_message_body.as_deref(), Some("hello"));

    bob.mark_messages_as_seen(&conversation_id).await?;

    let state = wait_for(&mut alice_list, |state: &ChatListState| {
        state.entries.first().is_some_and(|e| e.seen)
    })
    .await;
    assert_eq!(state.unread_count(), 0);

    let state = wait_for(&mut bob_list, |state: &ChatListState| {
        state.unread_count() == 0
    })
    .await;
    assert!(state.entries[0].seen);

    Ok(())
}

#[sqlx::test]
async fn chat_list_clears_loading_without_conversations(pool: SqlitePool) -> anyhow::Result<()> {
    let (alice, _bob) = setup(pool).await?;

    let mut list = ChatListSynchronizer::spawn(alice);
    let state = wait_for(&mut list, |state: &ChatListState| !state.from_cache).await;
    assert!(!state.loading);
    assert!(state.entries.is_empty());

    Ok(())
}

#[sqlx::test]
async fn missing_profile_skips_the_entry(pool: SqlitePool) -> anyhow::Result<()> {
    let (alice, bob) = setup(pool).await?;

    // carol has no stored profile
    let carol = UserId::new("carol")?;
    alice
        .send_message(
            &ConversationId::from_participants(alice.user_id(), &carol),
            &carol,
            MessageContent::text("anyone there?"),
        )
        .await?;
    alice
        .send_message(
            &conversation_id(&alice, &bob),
            bob.user_id(),
            MessageContent::text("hi bob"),
        )
        .await?;

    let mut list = ChatListSynchronizer::spawn(alice.clone());
    let state = wait_for(&mut list, |state: &ChatListState| {
        !state.from_cache && !state.entries.is_empty()
    })
    .await;

    // the conversation with carol is skipped, not failing the whole list
    assert_eq!(state.entries.len(), 1);
    assert_eq!(&state.entries[0].profile.user_id, bob.user_id());

    Ok(())
}

#[sqlx::test]
async fn typing_is_shared_across_clients(pool: SqlitePool) -> anyhow::Result<()> {
    let (alice, bob) = setup(pool).await?;
    let conversation_id = conversation_id(&alice, &bob);

    let mut subscription = alice
        .typing()
        .subscribe(conversation_id.clone(), alice.user_id().clone());

    bob.typing()
        .set_typing(&conversation_id, bob.user_id(), "bob_marley", true);
    let active = wait_for(&mut subscription, |active: &Vec<_>| !active.is_empty()).await;
    assert_eq!(&active[0].user_id, bob.user_id());

    bob.typing()
        .set_typing(&conversation_id, bob.user_id(), "bob_marley", false);
    wait_for(&mut subscription, |active: &Vec<_>| active.is_empty()).await;

    Ok(())
}

#[sqlx::test]
async fn stopped_subscription_ends(pool: SqlitePool) -> anyhow::Result<()> {
    let (alice, _bob) = setup(pool).await?;

    let mut list = ChatListSynchronizer::spawn(alice);
    wait_for(&mut list, |state: &ChatListState| !state.from_cache).await;

    list.stop();
    assert!(list.is_stopped());
    // the backing task is cancelled; no further change will be observed
    let ended = tokio::time::timeout(WAIT, async {
        while list.changed().await {}
    })
    .await;
    assert!(ended.is_ok());

    Ok(())
}
