// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use quillcommon::{identifiers::UserId, time::TimeStamp};
use tracing::info;

use crate::{
    Conversation, ConversationId, ConversationMessage, MessageContent, MessageId,
    errors::SendMessageError, utils::connection_ext::ConnectionExt,
};

use super::CoreClient;

impl CoreClient {
    /// Sends a message to `receiver` in the given conversation.
    ///
    /// The message append and the conversation-summary update are committed
    /// in a single transaction: either the message log and the chat list
    /// agree afterwards, or neither changed. The message timestamp is
    /// assigned by the store at commit time.
    pub async fn send_message(
        &self,
        conversation_id: &ConversationId,
        receiver: &UserId,
        content: MessageContent,
    ) -> Result<ConversationMessage, SendMessageError> {
        self.send_message_with_id(MessageId::random(), conversation_id, receiver, content)
            .await
    }

    /// Same as [`Self::send_message`], but with a caller-chosen message id,
    /// so the optimistic send path can correlate the confirmed message with
    /// its buffered counterpart.
    pub async fn send_message_with_id(
        &self,
        message_id: MessageId,
        conversation_id: &ConversationId,
        receiver: &UserId,
        content: MessageContent,
    ) -> Result<ConversationMessage, SendMessageError> {
        content.validate()?;
        let sender = self.user_id().clone();
        if &ConversationId::from_participants(&sender, receiver) != conversation_id {
            return Err(SendMessageError::NotAParticipant);
        }

        let sent_at = TimeStamp::now();
        let message = ConversationMessage::new(
            message_id,
            conversation_id.clone(),
            sender.clone(),
            receiver.clone(),
            content,
            sent_at,
        );

        let mut notifier = self.store_notifier();
        let mut connection = self.pool().acquire().await?;
        connection
            .with_transaction(async |txn| {
                // lazy creation: the first message brings the conversation
                // into existence
                Conversation::new(sender.clone(), receiver.clone())
                    .store(txn.as_mut(), &mut notifier)
                    .await?;
                message.store(txn.as_mut(), &mut notifier).await?;
                Conversation::update_last_message(
                    txn.as_mut(),
                    &mut notifier,
                    conversation_id,
                    message.content().body(),
                    message.sender(),
                    sent_at,
                )
                .await?;
                Ok::<_, SendMessageError>(())
            })
            .await?;
        notifier.notify();

        info!(id =% message.id(), conversation_id =% conversation_id, "Sent message");
        Ok(message)
    }

    /// Marks all messages of the conversation addressed to this user as
    /// seen, and the conversation summary with them unless its last message
    /// was sent by this user. Returns the number of transitioned messages;
    /// repeated calls are no-ops.
    pub async fn mark_messages_as_seen(
        &self,
        conversation_id: &ConversationId,
    ) -> sqlx::Result<usize> {
        let viewer = self.user_id().clone();
        let mut notifier = self.store_notifier();
        let mut connection = self.pool().acquire().await?;
        let count = connection
            .with_transaction(async |txn| {
                let message_ids = ConversationMessage::mark_seen_for_receiver(
                    txn.as_mut(),
                    &mut notifier,
                    conversation_id,
                    &viewer,
                )
                .await?;
                Conversation::mark_summary_seen(
                    txn.as_mut(),
                    &mut notifier,
                    conversation_id,
                    &viewer,
                )
                .await?;
                Ok::<_, sqlx::Error>(message_ids.len())
            })
            .await?;
        notifier.notify();
        Ok(count)
    }

    /// Marks all messages of the conversation addressed to this user as
    /// delivered. Messages already seen keep their status.
    pub async fn mark_messages_as_delivered(
        &self,
        conversation_id: &ConversationId,
    ) -> sqlx::Result<usize> {
        let viewer = self.user_id().clone();
        let mut notifier = self.store_notifier();
        let message_ids = ConversationMessage::mark_delivered_for_receiver(
            self.pool(),
            &mut notifier,
            conversation_id,
            &viewer,
        )
        .await?;
        notifier.notify();
        Ok(message_ids.len())
    }

    // message reads

    pub async fn messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> sqlx::Result<Vec<ConversationMessage>> {
        ConversationMessage::load_multiple(self.pool(), conversation_id, limit).await
    }

    pub async fn message(
        &self,
        message_id: MessageId,
    ) -> sqlx::Result<Option<ConversationMessage>> {
        ConversationMessage::load(self.pool(), message_id).await
    }

    pub async fn last_message(
        &self,
        conversation_id: &ConversationId,
    ) -> sqlx::Result<Option<ConversationMessage>> {
        ConversationMessage::last_message(self.pool(), conversation_id).await
    }

    pub async fn messages_count(&self, conversation_id: &ConversationId) -> sqlx::Result<usize> {
        ConversationMessage::messages_count(self.pool(), conversation_id).await
    }

    pub async fn unread_messages_count(
        &self,
        conversation_id: &ConversationId,
    ) -> sqlx::Result<usize> {
        ConversationMessage::unread_messages_count(self.pool(), conversation_id, self.user_id())
            .await
    }

    pub async fn global_unread_messages_count(&self) -> sqlx::Result<usize> {
        ConversationMessage::global_unread_messages_count(self.pool(), self.user_id()).await
    }
}
