// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use quillcommon::identifiers::UserId;
use sqlx::{FromRow, SqliteExecutor, query, query_as};

use crate::store::StoreNotifier;

use super::UserProfile;

#[derive(FromRow)]
struct SqlUserProfile {
    user_id: UserId,
    username: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
}

impl From<SqlUserProfile> for UserProfile {
    fn from(sql: SqlUserProfile) -> Self {
        UserProfile {
            user_id: sql.user_id,
            username: sql.username,
            display_name: sql.display_name,
            avatar_url: sql.avatar_url,
        }
    }
}

impl UserProfile {
    pub(crate) async fn upsert(
        &self,
        executor: impl SqliteExecutor<'_>,
        notifier: &mut StoreNotifier,
    ) -> sqlx::Result<()> {
        query(
            "INSERT INTO user_profile (user_id, username, display_name, avatar_url)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (user_id)
            DO UPDATE SET username = ?2, display_name = ?3, avatar_url = ?4",
        )
        .bind(&self.user_id)
        .bind(&self.username)
        .bind(&self.display_name)
        .bind(&self.avatar_url)
        .execute(executor)
        .await?;
        notifier.update(self.user_id.clone());
        Ok(())
    }

    pub(crate) async fn load(
        executor: impl SqliteExecutor<'_>,
        user_id: &UserId,
    ) -> sqlx::Result<Option<UserProfile>> {
        query_as::<_, SqlUserProfile>(
            "SELECT user_id, username, display_name, avatar_url
            FROM user_profile
            WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .map(|sql| sql.map(From::from))
    }
}
