// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;

use quillcommon::{identifiers::UserId, time::TimeStamp};
use serde::{Deserialize, Serialize};
use sqlx::{
    Database, Decode, Encode, Sqlite, Type, encode::IsNull, error::BoxDynError,
    sqlite::SqliteTypeInfo,
};
use uuid::Uuid;

use crate::SendMessageError;

use super::ConversationId;

pub(crate) mod pending;
pub(crate) mod persistence;

/// Identifier of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId {
    pub uuid: Uuid,
}

impl MessageId {
    pub fn random() -> Self {
        Self {
            uuid: Uuid::new_v4(),
        }
    }

    pub fn new(uuid: Uuid) -> Self {
        Self { uuid }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

impl Type<Sqlite> for MessageId {
    fn type_info() -> SqliteTypeInfo {
        <Uuid as Type<Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, Sqlite> for MessageId {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, BoxDynError> {
        Encode::<Sqlite>::encode_by_ref(&self.uuid, buf)
    }
}

impl<'r> Decode<'r, Sqlite> for MessageId {
    fn decode(value: <Sqlite as Database>::ValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid: Uuid = Decode::<Sqlite>::decode(value)?;
        Ok(Self { uuid })
    }
}

/// The kind of payload a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Voice,
    Image,
    Video,
}

impl MessageKind {
    pub(crate) fn repr(self) -> u8 {
        match self {
            MessageKind::Text => 1,
            MessageKind::Voice => 2,
            MessageKind::Image => 3,
            MessageKind::Video => 4,
        }
    }

    pub(crate) fn from_repr(repr: u8) -> Option<Self> {
        match repr {
            1 => Some(MessageKind::Text),
            2 => Some(MessageKind::Voice),
            3 => Some(MessageKind::Image),
            4 => Some(MessageKind::Video),
            _ => None,
        }
    }
}

/// Delivery status of a message. Transitions are monotonic: a message never
/// moves back from seen to delivered or from delivered to sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MessageStatus {
    Sent,
    Delivered,
    Seen,
}

impl MessageStatus {
    pub(crate) fn repr(self) -> u8 {
        match self {
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Seen => 3,
        }
    }

    pub(crate) fn from_repr(repr: u8) -> Option<Self> {
        match repr {
            1 => Some(MessageStatus::Sent),
            2 => Some(MessageStatus::Delivered),
            3 => Some(MessageStatus::Seen),
            _ => None,
        }
    }
}

/// Payload of a message: text, a media reference, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    body: Option<String>,
    media_url: Option<String>,
    kind: MessageKind,
}

impl MessageContent {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            media_url: None,
            kind: MessageKind::Text,
        }
    }

    pub fn media(kind: MessageKind, media_url: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            body: caption,
            media_url: Some(media_url.into()),
            kind,
        }
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn media_url(&self) -> Option<&str> {
        self.media_url.as_deref()
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// A message must carry non-empty text or a media reference. Violations
    /// are rejected here, before any storage access.
    pub(crate) fn validate(&self) -> Result<(), SendMessageError> {
        let has_body = self.body.as_deref().is_some_and(|body| !body.trim().is_empty());
        let has_media = self
            .media_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty());
        if has_body || has_media {
            Ok(())
        } else {
            Err(SendMessageError::EmptyContent)
        }
    }
}

/// A message persisted in the conversation log.
///
/// Immutable except for `seen` and `status`, which only ever move forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationMessage {
    id: MessageId,
    conversation_id: ConversationId,
    sender: UserId,
    receiver: UserId,
    content: MessageContent,
    status: MessageStatus,
    seen: bool,
    sent_at: TimeStamp,
}

impl ConversationMessage {
    pub(crate) fn new(
        id: MessageId,
        conversation_id: ConversationId,
        sender: UserId,
        receiver: UserId,
        content: MessageContent,
        sent_at: TimeStamp,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender,
            receiver,
            content,
            status: MessageStatus::Sent,
            seen: false,
            sent_at,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn sender(&self) -> &UserId {
        &self.sender
    }

    pub fn receiver(&self) -> &UserId {
        &self.receiver
    }

    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    pub fn is_seen(&self) -> bool {
        self.seen
    }

    pub fn sent_at(&self) -> TimeStamp {
        self.sent_at
    }
}
