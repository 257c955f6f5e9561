// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Chat synchronization core of the Quill client.
//!
//! The crate owns the local message store and exposes three surfaces to the
//! UI layer: operations (send, mark as seen), live subscriptions (message
//! list, chat list, typing presence) and the optimistic pending-message
//! buffer that makes sends feel instantaneous. There is no network surface
//! here; transport and blob storage are external collaborators.

mod client;
mod conversations;
mod errors;
pub mod store;
mod sync;
mod typing;
mod user_profiles;
mod utils;

pub use client::{ClientConfig, ClientConnection, CoreClient};
pub use conversations::{
    Conversation, ConversationId, LastMessage,
    messages::{
        ConversationMessage, MessageContent, MessageId, MessageKind, MessageStatus,
        pending::{PendingMessage, PendingMessageId, PendingStatus},
    },
};
pub use errors::{ClientError, SendMessageError};
pub use sync::{
    Subscription,
    chat_list::{ChatListEntry, ChatListState, ChatListSynchronizer},
    message_list::{ListedMessage, MessageList, MessageListState},
};
pub use typing::{TYPING_TTL_SECS, TypingSignal, TypingTracker};
pub use user_profiles::UserProfile;
