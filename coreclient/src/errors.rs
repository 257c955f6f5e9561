// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use thiserror::Error;

/// Errors of the message send path.
///
/// Argument errors are rejected before any storage access; storage errors are
/// transient backend failures the caller is expected to handle (typically by
/// leaving the pending entry marked as failed).
#[derive(Debug, Error)]
pub enum SendMessageError {
    #[error("message has neither text nor a media reference")]
    EmptyContent,
    #[error("sender is not a participant of the conversation")]
    NotAParticipant,
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}
