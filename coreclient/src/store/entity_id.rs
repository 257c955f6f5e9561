// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use quillcommon::identifiers::UserId;

use crate::{ConversationId, MessageId};

/// Identifies an entity in the client store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::From)]
pub enum StoreEntityId {
    User(UserId),
    Conversation(ConversationId),
    Message(MessageId),
}
