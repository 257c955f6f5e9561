// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use quillcommon::{identifiers::UserId, time::TimeStamp};
use sqlx::{FromRow, SqliteExecutor, query, query_as, query_scalar};
use tracing::warn;

use crate::store::StoreNotifier;

use super::{ConversationId, ConversationMessage, MessageContent, MessageId, MessageKind,
    MessageStatus};

#[derive(FromRow)]
struct SqlConversationMessage {
    message_id: MessageId,
    conversation_id: ConversationId,
    sender: UserId,
    receiver: UserId,
    body: Option<String>,
    media_url: Option<String>,
    kind: i64,
    status: i64,
    seen: bool,
    sent_at: TimeStamp,
}

impl From<SqlConversationMessage> for ConversationMessage {
    fn from(sql: SqlConversationMessage) -> Self {
        let kind = u8::try_from(sql.kind)
            .ok()
            .and_then(MessageKind::from_repr)
            .unwrap_or_else(|| {
                warn!(message_id =% sql.message_id, kind = sql.kind, "Unknown message kind");
                MessageKind::Text
            });
        let status = u8::try_from(sql.status)
            .ok()
            .and_then(MessageStatus::from_repr)
            .unwrap_or_else(|| {
                warn!(message_id =% sql.message_id, status = sql.status, "Unknown message status");
                MessageStatus::Sent
            });
        ConversationMessage {
            id: sql.message_id,
            conversation_id: sql.conversation_id,
            sender: sql.sender,
            receiver: sql.receiver,
            content: MessageContent {
                body: sql.body,
                media_url: sql.media_url,
                kind,
            },
            status,
            seen: sql.seen,
            sent_at: sql.sent_at,
        }
    }
}

const SELECT_MESSAGE: &str = "SELECT
        message_id,
        conversation_id,
        sender,
        receiver,
        body,
        media_url,
        kind,
        status,
        seen,
        sent_at
    FROM message";

impl ConversationMessage {
    pub(crate) async fn store(
        &self,
        executor: impl SqliteExecutor<'_>,
        notifier: &mut StoreNotifier,
    ) -> sqlx::Result<()> {
        query(
            "INSERT INTO message (
                message_id,
                conversation_id,
                sender,
                receiver,
                body,
                media_url,
                kind,
                status,
                seen,
                sent_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(self.id)
        .bind(&self.conversation_id)
        .bind(&self.sender)
        .bind(&self.receiver)
        .bind(self.content.body())
        .bind(self.content.media_url())
        .bind(self.content.kind().repr() as i64)
        .bind(self.status.repr() as i64)
        .bind(self.seen)
        .bind(self.sent_at)
        .execute(executor)
        .await?;
        notifier.add(self.id);
        Ok(())
    }

    pub(crate) async fn load(
        executor: impl SqliteExecutor<'_>,
        message_id: MessageId,
    ) -> sqlx::Result<Option<ConversationMessage>> {
        query_as::<_, SqlConversationMessage>(&format!("{SELECT_MESSAGE} WHERE message_id = ?"))
            .bind(message_id)
            .fetch_optional(executor)
            .await
            .map(|sql| sql.map(From::from))
    }

    /// Loads the most recent `limit` messages of the conversation, returned
    /// in ascending timestamp order for display.
    pub(crate) async fn load_multiple(
        executor: impl SqliteExecutor<'_>,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> sqlx::Result<Vec<ConversationMessage>> {
        let limit: i64 = limit.try_into().unwrap_or(i64::MAX);
        let mut messages: Vec<ConversationMessage> = query_as::<_, SqlConversationMessage>(
            &format!(
                "{SELECT_MESSAGE} WHERE conversation_id = ?
                ORDER BY sent_at DESC, message_id DESC
                LIMIT ?"
            ),
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(From::from)
        .collect();
        messages.reverse();
        Ok(messages)
    }

    pub(crate) async fn last_message(
        executor: impl SqliteExecutor<'_>,
        conversation_id: &ConversationId,
    ) -> sqlx::Result<Option<ConversationMessage>> {
        query_as::<_, SqlConversationMessage>(&format!(
            "{SELECT_MESSAGE} WHERE conversation_id = ?
            ORDER BY sent_at DESC, message_id DESC
            LIMIT 1"
        ))
        .bind(conversation_id)
        .fetch_optional(executor)
        .await
        .map(|sql| sql.map(From::from))
    }

    /// Transitions all unseen messages of the conversation addressed to
    /// `receiver` to seen. Returns the ids of the transitioned messages;
    /// calling this with nothing unseen returns an empty list.
    pub(crate) async fn mark_seen_for_receiver(
        executor: impl SqliteExecutor<'_>,
        notifier: &mut StoreNotifier,
        conversation_id: &ConversationId,
        receiver: &UserId,
    ) -> sqlx::Result<Vec<MessageId>> {
        let seen_repr = MessageStatus::Seen.repr() as i64;
        let message_ids: Vec<MessageId> = query_scalar(
            "UPDATE message SET seen = TRUE, status = ?
            WHERE conversation_id = ? AND receiver = ? AND seen = FALSE
            RETURNING message_id",
        )
        .bind(seen_repr)
        .bind(conversation_id)
        .bind(receiver)
        .fetch_all(executor)
        .await?;
        for message_id in &message_ids {
            notifier.update(*message_id);
        }
        Ok(message_ids)
    }

    /// Transitions sent messages addressed to `receiver` to delivered. Seen
    /// messages keep their status, so the transition chain never regresses.
    pub(crate) async fn mark_delivered_for_receiver(
        executor: impl SqliteExecutor<'_>,
        notifier: &mut StoreNotifier,
        conversation_id: &ConversationId,
        receiver: &UserId,
    ) -> sqlx::Result<Vec<MessageId>> {
        let delivered_repr = MessageStatus::Delivered.repr() as i64;
        let message_ids: Vec<MessageId> = query_scalar(
            "UPDATE message SET status = ?1
            WHERE conversation_id = ?2 AND receiver = ?3 AND status < ?1
            RETURNING message_id",
        )
        .bind(delivered_repr)
        .bind(conversation_id)
        .bind(receiver)
        .fetch_all(executor)
        .await?;
        for message_id in &message_ids {
            notifier.update(*message_id);
        }
        Ok(message_ids)
    }

    pub(crate) async fn messages_count(
        executor: impl SqliteExecutor<'_>,
        conversation_id: &ConversationId,
    ) -> sqlx::Result<usize> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM message WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_one(executor)
            .await?;
        Ok(count.try_into().expect("usize overflow"))
    }

    pub(crate) async fn unread_messages_count(
        executor: impl SqliteExecutor<'_>,
        conversation_id: &ConversationId,
        receiver: &UserId,
    ) -> sqlx::Result<usize> {
        let count: i64 = query_scalar(
            "SELECT COUNT(*) FROM message
            WHERE conversation_id = ? AND receiver = ? AND seen = FALSE",
        )
        .bind(conversation_id)
        .bind(receiver)
        .fetch_one(executor)
        .await?;
        Ok(count.try_into().expect("usize overflow"))
    }

    pub(crate) async fn global_unread_messages_count(
        executor: impl SqliteExecutor<'_>,
        receiver: &UserId,
    ) -> sqlx::Result<usize> {
        let count: i64 =
            query_scalar("SELECT COUNT(*) FROM message WHERE receiver = ? AND seen = FALSE")
                .bind(receiver)
                .fetch_one(executor)
                .await?;
        Ok(count.try_into().expect("usize overflow"))
    }
}
