// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Ephemeral typing presence.
//!
//! Typing signals live only in memory: they are published on keypress
//! activity, cleared automatically after [`TYPING_TTL_SECS`] seconds of
//! inactivity, and additionally filtered for staleness on every read, so a
//! signal whose clear never ran still disappears from the active set.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration as StdDuration,
};

use chrono::{DateTime, Utc};
use quillcommon::{
    identifiers::UserId,
    time::{Duration, TimeStamp},
};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::{ConversationId, sync::Subscription};

/// Seconds after which a typing signal is considered stale.
pub const TYPING_TTL_SECS: i64 = 3;

const TYPING_EVENTS_CHANNEL_SIZE: usize = 256;

fn typing_ttl() -> Duration {
    Duration::seconds(TYPING_TTL_SECS)
}

/// A user currently composing a message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingSignal {
    pub user_id: UserId,
    pub display_name: String,
    pub updated_at: TimeStamp,
}

#[derive(Debug)]
struct TypingEntry {
    signal: TypingSignal,
    /// Guards the scheduled auto-clear: a newer keypress supersedes it.
    generation: u64,
}

/// Publishes and expires typing signals per conversation.
#[derive(Debug, Clone)]
pub struct TypingTracker {
    signals: Arc<Mutex<HashMap<ConversationId, HashMap<UserId, TypingEntry>>>>,
    generations: Arc<AtomicU64>,
    events_tx: broadcast::Sender<ConversationId>,
}

impl TypingTracker {
    pub(crate) fn new() -> Self {
        let (events_tx, _) = broadcast::channel(TYPING_EVENTS_CHANNEL_SIZE);
        Self {
            signals: Arc::new(Mutex::new(HashMap::new())),
            generations: Arc::new(AtomicU64::new(0)),
            events_tx,
        }
    }

    /// Publishes or clears the typing signal of `user_id` in the
    /// conversation.
    ///
    /// Publishing schedules an automatic clear after [`TYPING_TTL_SECS`]
    /// seconds, superseded by any newer keypress. Clearing a signal that is
    /// already absent is a no-op, not an error.
    pub fn set_typing(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
        display_name: &str,
        is_typing: bool,
    ) {
        if is_typing {
            let generation = self.generations.fetch_add(1, Ordering::Relaxed);
            {
                let mut signals = self.signals.lock().unwrap();
                signals.entry(conversation_id.clone()).or_default().insert(
                    user_id.clone(),
                    TypingEntry {
                        signal: TypingSignal {
                            user_id: user_id.clone(),
                            display_name: display_name.to_owned(),
                            updated_at: TimeStamp::now(),
                        },
                        generation,
                    },
                );
            }
            self.emit(conversation_id);

            let tracker = self.clone();
            let conversation_id = conversation_id.clone();
            let user_id = user_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(StdDuration::from_secs(TYPING_TTL_SECS as u64)).await;
                tracker.clear_if_unchanged(&conversation_id, &user_id, generation);
            });
        } else {
            let removed = {
                let mut signals = self.signals.lock().unwrap();
                let removed = signals
                    .get_mut(conversation_id)
                    .is_some_and(|users| users.remove(user_id).is_some());
                if removed && signals.get(conversation_id).is_some_and(HashMap::is_empty) {
                    signals.remove(conversation_id);
                }
                removed
            };
            if removed {
                self.emit(conversation_id);
            }
        }
    }

    /// The signals currently active in the conversation, excluding stale
    /// ones and the viewer's own.
    pub fn active_typists(
        &self,
        conversation_id: &ConversationId,
        viewer: &UserId,
    ) -> Vec<TypingSignal> {
        self.active_typists_at(conversation_id, viewer, Utc::now())
    }

    fn active_typists_at(
        &self,
        conversation_id: &ConversationId,
        viewer: &UserId,
        now: DateTime<Utc>,
    ) -> Vec<TypingSignal> {
        let signals = self.signals.lock().unwrap();
        let Some(users) = signals.get(conversation_id) else {
            return Vec::new();
        };
        let mut active: Vec<TypingSignal> = users
            .values()
            .filter(|entry| {
                &entry.signal.user_id != viewer
                    && !entry.signal.updated_at.has_expired_at(typing_ttl(), now)
            })
            .map(|entry| entry.signal.clone())
            .collect();
        active.sort_unstable_by(|a, b| a.user_id.cmp(&b.user_id));
        active
    }

    /// Live view of the active typists in a conversation, from the viewer's
    /// perspective.
    pub fn subscribe(
        &self,
        conversation_id: ConversationId,
        viewer: UserId,
    ) -> Subscription<Vec<TypingSignal>> {
        let (state_tx, state_rx) =
            watch::channel(self.active_typists(&conversation_id, &viewer));
        let cancel = CancellationToken::new();
        let mut events = self.events_tx.subscribe();

        let tracker = self.clone();
        tokio::spawn({
            let stop = cancel.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => return,
                        event = events.recv() => match event {
                            Ok(changed_id) if changed_id == conversation_id => {
                                let active = tracker.active_typists(&conversation_id, &viewer);
                                if state_tx.send(active).is_err() {
                                    return;
                                }
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(_)) => {
                                let active = tracker.active_typists(&conversation_id, &viewer);
                                if state_tx.send(active).is_err() {
                                    return;
                                }
                            }
                            Err(broadcast::error::RecvError::Closed) => return,
                        },
                    }
                }
            }
        });

        Subscription::new(state_rx, cancel)
    }

    fn clear_if_unchanged(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
        generation: u64,
    ) {
        let removed = {
            let mut signals = self.signals.lock().unwrap();
            let Some(users) = signals.get_mut(conversation_id) else {
                return;
            };
            let removed = users
                .get(user_id)
                .is_some_and(|entry| entry.generation == generation)
                && users.remove(user_id).is_some();
            if removed && users.is_empty() {
                signals.remove(conversation_id);
            }
            removed
        };
        if removed {
            self.emit(conversation_id);
        }
    }

    fn emit(&self, conversation_id: &ConversationId) {
        let _no_receivers = self.events_tx.send(conversation_id.clone());
    }
}
