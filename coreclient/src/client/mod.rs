// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{path::PathBuf, sync::Arc};

use quillcommon::identifiers::UserId;
use sqlx::{
    SqlitePool,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::info;

use crate::{
    Conversation, ConversationId,
    errors::ClientError,
    store::{StoreNotificationsSender, StoreNotifier},
    typing::TypingTracker,
    user_profiles::UserProfile,
};

mod messages;
#[cfg(test)]
mod tests;

static MIGRATOR: Migrator = sqlx::migrate!();

/// Configuration of a [`ClientConnection`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub database_path: PathBuf,
}

impl ClientConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }
}

/// Shared, long-lived connection to the client store.
///
/// Owns the database pool, the store-notification fan-out and the typing
/// presence tracker. It is created once at process start and injected into
/// every [`CoreClient`]; all client handles created from the same connection
/// observe each other's writes.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    pool: SqlitePool,
    notifications_tx: StoreNotificationsSender,
    typing: TypingTracker,
}

impl ClientConnection {
    /// Opens (and creates, if missing) the database and applies pending
    /// schema migrations.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        MIGRATOR.run(&pool).await?;
        info!(path =% config.database_path.display(), "Opened client store");
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool. The caller is responsible for the schema
    /// being migrated; `#[sqlx::test]` pools already are.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            notifications_tx: StoreNotificationsSender::new(),
            typing: TypingTracker::new(),
        }
    }
}

/// Handle to the chat core, scoped to one user.
///
/// Cheaply clonable; all clones share the underlying connection.
#[derive(Debug, Clone)]
pub struct CoreClient {
    inner: Arc<CoreClientInner>,
}

#[derive(Debug)]
struct CoreClientInner {
    connection: ClientConnection,
    user_id: UserId,
}

impl CoreClient {
    pub fn new(connection: ClientConnection, user_id: UserId) -> Self {
        Self {
            inner: Arc::new(CoreClientInner {
                connection,
                user_id,
            }),
        }
    }

    pub async fn open(config: &ClientConfig, user_id: UserId) -> Result<Self, ClientError> {
        let connection = ClientConnection::connect(config).await?;
        Ok(Self::new(connection, user_id))
    }

    pub fn user_id(&self) -> &UserId {
        &self.inner.user_id
    }

    pub fn typing(&self) -> &TypingTracker {
        &self.inner.connection.typing
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.inner.connection.pool
    }

    pub(crate) fn notifications_tx(&self) -> &StoreNotificationsSender {
        &self.inner.connection.notifications_tx
    }

    pub(crate) fn store_notifier(&self) -> StoreNotifier {
        StoreNotifier::new(self.notifications_tx().clone())
    }

    // conversations

    /// Creates the conversation with `other` if it does not exist yet and
    /// returns its canonical id. Sending a message creates the conversation
    /// implicitly, so calling this first is optional.
    pub async fn init_conversation(&self, other: &UserId) -> sqlx::Result<ConversationId> {
        let conversation = Conversation::new(self.user_id().clone(), other.clone());
        let id = conversation.id().clone();
        let mut notifier = self.store_notifier();
        conversation.store(self.pool(), &mut notifier).await?;
        notifier.notify();
        Ok(id)
    }

    pub async fn conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> sqlx::Result<Option<Conversation>> {
        Conversation::load(self.pool(), conversation_id).await
    }

    pub async fn conversations(&self, limit: usize) -> sqlx::Result<Vec<Conversation>> {
        Conversation::load_for_user(self.pool(), self.user_id(), limit).await
    }

    // user profiles

    pub async fn own_profile(&self) -> sqlx::Result<Option<UserProfile>> {
        UserProfile::load(self.pool(), self.user_id()).await
    }

    /// Stores the owning user's profile. The profile's user id is forced to
    /// the client's own identity.
    pub async fn set_own_profile(&self, mut profile: UserProfile) -> sqlx::Result<()> {
        profile.user_id = self.user_id().clone();
        self.store_user_profile(&profile).await
    }

    /// Stores or refreshes the profile of any user, e.g. when the directory
    /// sync delivers an updated username or avatar.
    pub async fn store_user_profile(&self, profile: &UserProfile) -> sqlx::Result<()> {
        let mut notifier = self.store_notifier();
        profile.upsert(self.pool(), &mut notifier).await?;
        notifier.notify();
        Ok(())
    }

    pub async fn user_profile(&self, user_id: &UserId) -> sqlx::Result<Option<UserProfile>> {
        UserProfile::load(self.pool(), user_id).await
    }
}
