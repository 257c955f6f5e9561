// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Profiles of the users appearing in conversations.
//!
//! A profile contains the information needed to render a chat-list entry:
//! username, optional display name and an avatar reference. Avatars are
//! stored by URL; uploading the underlying image is handled by the blob
//! storage collaborator, not by this crate.

use quillcommon::identifiers::UserId;
use serde::{Deserialize, Serialize};

pub(crate) mod persistence;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserProfile {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            display_name: None,
            avatar_url: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_avatar_url(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    /// The name to render for this user: the display name when set, the
    /// username otherwise.
    pub fn displayed_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}
