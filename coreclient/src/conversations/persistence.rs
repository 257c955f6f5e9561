// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use quillcommon::{identifiers::UserId, time::TimeStamp};
use sqlx::{FromRow, SqliteExecutor, query, query_as};
use tracing::info;

use crate::store::StoreNotifier;

use super::{Conversation, ConversationId, LastMessage};

#[derive(FromRow)]
struct SqlConversation {
    conversation_id: ConversationId,
    participant_a: UserId,
    participant_b: UserId,
    created_at: TimeStamp,
    last_message_body: Option<String>,
    last_message_sender: Option<UserId>,
    last_message_at: Option<TimeStamp>,
    last_message_seen: bool,
}

impl From<SqlConversation> for Conversation {
    fn from(sql: SqlConversation) -> Self {
        let last_message = match (sql.last_message_sender, sql.last_message_at) {
            (Some(sender), Some(sent_at)) => Some(LastMessage {
                body: sql.last_message_body,
                sender,
                sent_at,
                seen: sql.last_message_seen,
            }),
            _ => None,
        };
        Conversation {
            id: sql.conversation_id,
            participants: (sql.participant_a, sql.participant_b),
            created_at: sql.created_at,
            last_message,
        }
    }
}

impl Conversation {
    /// Stores the conversation if it does not exist yet.
    ///
    /// Conversations are created lazily by the first message, so a summary
    /// row that is already present is left untouched.
    pub(crate) async fn store(
        &self,
        executor: impl SqliteExecutor<'_>,
        notifier: &mut StoreNotifier,
    ) -> sqlx::Result<bool> {
        let result = query(
            "INSERT OR IGNORE INTO conversation (
                conversation_id,
                participant_a,
                participant_b,
                created_at
            ) VALUES (?, ?, ?, ?)",
        )
        .bind(&self.id)
        .bind(&self.participants.0)
        .bind(&self.participants.1)
        .bind(self.created_at)
        .execute(executor)
        .await?;

        let created = result.rows_affected() == 1;
        if created {
            info!(id =% self.id, "Storing conversation");
            notifier.add(self.id.clone());
        }
        Ok(created)
    }

    pub(crate) async fn load(
        executor: impl SqliteExecutor<'_>,
        conversation_id: &ConversationId,
    ) -> sqlx::Result<Option<Conversation>> {
        query_as::<_, SqlConversation>(
            "SELECT
                conversation_id,
                participant_a,
                participant_b,
                created_at,
                last_message_body,
                last_message_sender,
                last_message_at,
                last_message_seen
            FROM conversation
            WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(executor)
        .await
        .map(|sql| sql.map(From::from))
    }

    /// Loads the conversations `user` participates in, ordered by the
    /// timestamp of their last message, most recent first. Conversations
    /// without any message yet sort last, by creation time.
    pub(crate) async fn load_for_user(
        executor: impl SqliteExecutor<'_>,
        user: &UserId,
        limit: usize,
    ) -> sqlx::Result<Vec<Conversation>> {
        let limit: i64 = limit.try_into().unwrap_or(i64::MAX);
        let conversations = query_as::<_, SqlConversation>(
            "SELECT
                conversation_id,
                participant_a,
                participant_b,
                created_at,
                last_message_body,
                last_message_sender,
                last_message_at,
                last_message_seen
            FROM conversation
            WHERE participant_a = ?1 OR participant_b = ?1
            ORDER BY (last_message_at IS NULL), last_message_at DESC, created_at DESC
            LIMIT ?2",
        )
        .bind(user)
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(conversations.into_iter().map(From::from).collect())
    }

    /// Replaces the last-message summary. Called in the same transaction as
    /// the message insert; the summary always starts out unseen.
    pub(crate) async fn update_last_message(
        executor: impl SqliteExecutor<'_>,
        notifier: &mut StoreNotifier,
        conversation_id: &ConversationId,
        body: Option<&str>,
        sender: &UserId,
        sent_at: TimeStamp,
    ) -> sqlx::Result<()> {
        query(
            "UPDATE conversation SET
                last_message_body = ?,
                last_message_sender = ?,
                last_message_at = ?,
                last_message_seen = FALSE
            WHERE conversation_id = ?",
        )
        .bind(body)
        .bind(sender)
        .bind(sent_at)
        .bind(conversation_id)
        .execute(executor)
        .await?;
        notifier.update(conversation_id.clone());
        Ok(())
    }

    /// Marks the summary as seen, unless its last message was sent by the
    /// viewer themselves. Returns whether a row was updated; repeated calls
    /// are no-ops.
    pub(crate) async fn mark_summary_seen(
        executor: impl SqliteExecutor<'_>,
        notifier: &mut StoreNotifier,
        conversation_id: &ConversationId,
        viewer: &UserId,
    ) -> sqlx::Result<bool> {
        let result = query(
            "UPDATE conversation SET last_message_seen = TRUE
            WHERE conversation_id = ?
                AND last_message_sender IS NOT NULL
                AND last_message_sender != ?
                AND last_message_seen = FALSE",
        )
        .bind(conversation_id)
        .bind(viewer)
        .execute(executor)
        .await?;
        let updated = result.rows_affected() == 1;
        if updated {
            notifier.update(conversation_id.clone());
        }
        Ok(updated)
    }
}
