// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;

use quillcommon::{
    identifiers::{ID_SEPARATOR, UserId},
    time::TimeStamp,
};
use serde::{Deserialize, Serialize};
use sqlx::{
    Database, Decode, Encode, Sqlite, Type, encode::IsNull, error::BoxDynError,
    sqlite::SqliteTypeInfo,
};

pub(crate) mod messages;
pub(crate) mod persistence;

/// Id of a conversation between two users.
///
/// Derived from the participant pair, sorted lexicographically, so both
/// participants compute the same id independently and no allocation step is
/// needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn from_participants(a: &UserId, b: &UserId) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{first}{ID_SEPARATOR}{second}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Type<Sqlite> for ConversationId {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, Sqlite> for ConversationId {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, BoxDynError> {
        Encode::<Sqlite>::encode(self.0.clone(), buf)
    }
}

impl<'r> Decode<'r, Sqlite> for ConversationId {
    fn decode(value: <Sqlite as Database>::ValueRef<'r>) -> Result<Self, BoxDynError> {
        let s: &str = Decode::<Sqlite>::decode(value)?;
        Ok(Self(s.to_owned()))
    }
}

/// Summary of the most recent message of a conversation.
///
/// This is the denormalized copy rendered in the chat list; it is written in
/// the same transaction as the message itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub body: Option<String>,
    pub sender: UserId,
    pub sent_at: TimeStamp,
    pub seen: bool,
}

/// A conversation between two users and its summary metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    id: ConversationId,
    participants: (UserId, UserId),
    created_at: TimeStamp,
    last_message: Option<LastMessage>,
}

impl Conversation {
    /// Creates the in-memory representation of a new conversation. The
    /// participant pair is stored sorted, matching the id derivation.
    pub(crate) fn new(a: UserId, b: UserId) -> Self {
        let id = ConversationId::from_participants(&a, &b);
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            id,
            participants: (first, second),
            created_at: TimeStamp::now(),
            last_message: None,
        }
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn participants(&self) -> (&UserId, &UserId) {
        (&self.participants.0, &self.participants.1)
    }

    pub fn created_at(&self) -> TimeStamp {
        self.created_at
    }

    pub fn last_message(&self) -> Option<&LastMessage> {
        self.last_message.as_ref()
    }

    /// The participant which is not `user`, or `None` if `user` is not a
    /// participant of this conversation.
    pub fn other_participant(&self, user: &UserId) -> Option<&UserId> {
        let (a, b) = (&self.participants.0, &self.participants.1);
        if user == a {
            Some(b)
        } else if user == b {
            Some(a)
        } else {
            None
        }
    }

    pub fn is_participant(&self, user: &UserId) -> bool {
        user == &self.participants.0 || user == &self.participants.1
    }
}
