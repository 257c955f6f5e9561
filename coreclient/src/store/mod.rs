// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use quillcommon::identifiers::UserId;
use tokio_stream::Stream;

use crate::{
    Conversation, ConversationId, ConversationMessage, MessageContent, MessageId,
    user_profiles::UserProfile,
};

pub use entity_id::StoreEntityId;
pub use notification::{StoreNotification, StoreOperation};
pub(crate) use notification::{StoreNotificationsSender, StoreNotifier};

mod entity_id;
mod r#impl;
mod notification;

/// The result type of a failable [`Store`] method
pub type StoreResult<T> = anyhow::Result<T>;

/// Unified access to the client data
///
/// This trait is used to access the client data: the conversations of the
/// owning user, their messages and the profiles of other users. It is also
/// used to listen to changes in the client data via the [`Self::subscribe`]
/// method and the [`StoreNotification`] type.
#[allow(async_fn_in_trait, reason = "trait is only used in the workspace")]
#[trait_variant::make(Send)]
pub trait Store {
    /// The user this store belongs to. All viewer-scoped reads (unread
    /// counts, seen transitions) are evaluated against this identity.
    fn user_id(&self) -> &UserId;

    // user profiles

    async fn own_profile(&self) -> StoreResult<Option<UserProfile>>;

    async fn set_own_profile(&self, profile: UserProfile) -> StoreResult<()>;

    async fn user_profile(&self, user_id: &UserId) -> StoreResult<Option<UserProfile>>;

    // conversations

    /// Create the conversation with the given user if it does not exist yet.
    ///
    /// Returns the canonical id of the conversation, which is the same for
    /// both participants.
    async fn init_conversation(&self, other: &UserId) -> StoreResult<ConversationId>;

    async fn conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<Option<Conversation>>;

    /// The conversations of the owning user, ordered by the timestamp of
    /// their last message, most recent first, bounded to `limit` entries.
    async fn conversations(&self, limit: usize) -> StoreResult<Vec<Conversation>>;

    // messages

    /// The most recent `limit` messages of a conversation, in ascending
    /// timestamp order.
    async fn messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> StoreResult<Vec<ConversationMessage>>;

    async fn message(&self, message_id: MessageId) -> StoreResult<Option<ConversationMessage>>;

    async fn last_message(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<Option<ConversationMessage>>;

    async fn messages_count(&self, conversation_id: &ConversationId) -> StoreResult<usize>;

    async fn unread_messages_count(&self, conversation_id: &ConversationId)
    -> StoreResult<usize>;

    async fn global_unread_messages_count(&self) -> StoreResult<usize>;

    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        receiver: &UserId,
        content: MessageContent,
    ) -> StoreResult<ConversationMessage>;

    /// Same as [`Self::send_message`], but with a caller-chosen message id.
    ///
    /// Used by the optimistic send path, which needs to know the id of the
    /// confirmed message before the write resolves.
    async fn send_message_with_id(
        &self,
        message_id: MessageId,
        conversation_id: &ConversationId,
        receiver: &UserId,
        content: MessageContent,
    ) -> StoreResult<ConversationMessage>;

    /// Mark all messages of the conversation addressed to the owning user as
    /// seen. Returns the number of transitioned messages; calling this with
    /// nothing unseen is a no-op.
    async fn mark_messages_as_seen(&self, conversation_id: &ConversationId)
    -> StoreResult<usize>;

    /// Mark all messages of the conversation addressed to the owning user as
    /// delivered. Seen messages are not demoted.
    async fn mark_messages_as_delivered(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<usize>;

    // observability

    fn subscribe(&self) -> impl Stream<Item = Arc<StoreNotification>> + Send + 'static;
}
