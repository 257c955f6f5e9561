// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use sqlx::{Connection, SqliteConnection, SqliteTransaction};

/// Runs a closure inside a write transaction.
///
/// The transaction is opened with `BEGIN IMMEDIATE` so the write lock is
/// acquired up front. It commits only if the closure succeeds; any error
/// rolls back every statement the closure has executed.
pub(crate) trait ConnectionExt {
    async fn with_transaction<T: Send, E>(
        &mut self,
        f: impl AsyncFnOnce(&mut SqliteTransaction<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<sqlx::Error>;
}

impl ConnectionExt for SqliteConnection {
    async fn with_transaction<T: Send, E>(
        &mut self,
        f: impl AsyncFnOnce(&mut SqliteTransaction<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<sqlx::Error>,
    {
        let mut txn = self.begin_with("BEGIN IMMEDIATE").await?;
        let value = f(&mut txn).await?;
        txn.commit().await?;
        Ok(value)
    }
}
