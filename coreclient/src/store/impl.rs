// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use quillcommon::identifiers::UserId;
use tokio_stream::Stream;

use crate::{
    Conversation, ConversationId, ConversationMessage, MessageContent, MessageId,
    client::CoreClient, user_profiles::UserProfile,
};

use super::{Store, StoreNotification, StoreResult};

impl Store for CoreClient {
    fn user_id(&self) -> &UserId {
        self.user_id()
    }

    async fn own_profile(&self) -> StoreResult<Option<UserProfile>> {
        Ok(self.own_profile().await?)
    }

    async fn set_own_profile(&self, profile: UserProfile) -> StoreResult<()> {
        Ok(self.set_own_profile(profile).await?)
    }

    async fn user_profile(&self, user_id: &UserId) -> StoreResult<Option<UserProfile>> {
        Ok(self.user_profile(user_id).await?)
    }

    async fn init_conversation(&self, other: &UserId) -> StoreResult<ConversationId> {
        Ok(self.init_conversation(other).await?)
    }

    async fn conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<Option<Conversation>> {
        Ok(self.conversation(conversation_id).await?)
    }

    async fn conversations(&self, limit: usize) -> StoreResult<Vec<Conversation>> {
        Ok(self.conversations(limit).await?)
    }

    async fn messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> StoreResult<Vec<ConversationMessage>> {
        Ok(self.messages(conversation_id, limit).await?)
    }

    async fn message(&self, message_id: MessageId) -> StoreResult<Option<ConversationMessage>> {
        Ok(self.message(message_id).await?)
    }

    async fn last_message(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<Option<ConversationMessage>> {
        Ok(self.last_message(conversation_id).await?)
    }

    async fn messages_count(&self, conversation_id: &ConversationId) -> StoreResult<usize> {
        Ok(self.messages_count(conversation_id).await?)
    }

    async fn unread_messages_count(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<usize> {
        Ok(self.unread_messages_count(conversation_id).await?)
    }

    async fn global_unread_messages_count(&self) -> StoreResult<usize> {
        Ok(self.global_unread_messages_count().await?)
    }

    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        receiver: &UserId,
        content: MessageContent,
    ) -> StoreResult<ConversationMessage> {
        Ok(self.send_message(conversation_id, receiver, content).await?)
    }

    async fn send_message_with_id(
        &self,
        message_id: MessageId,
        conversation_id: &ConversationId,
        receiver: &UserId,
        content: MessageContent,
    ) -> StoreResult<ConversationMessage> {
        Ok(self
            .send_message_with_id(message_id, conversation_id, receiver, content)
            .await?)
    }

    async fn mark_messages_as_seen(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<usize> {
        Ok(self.mark_messages_as_seen(conversation_id).await?)
    }

    async fn mark_messages_as_delivered(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<usize> {
        Ok(self.mark_messages_as_delivered(conversation_id).await?)
    }

    fn subscribe(&self) -> impl Stream<Item = Arc<StoreNotification>> + Send + 'static {
        self.notifications_tx().subscribe()
    }
}
