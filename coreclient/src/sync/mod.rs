// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Live views over the client store.
//!
//! Synchronizers load their view once, then re-emit the fully replaced view
//! whenever a store notification touches it. Consumers hold a
//! [`Subscription`], which carries the latest state and cancels the backing
//! task when stopped or dropped, so no listener outlives its view.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub(crate) mod chat_list;
pub(crate) mod message_list;

/// Handle to a live view.
///
/// Stopping (or dropping) the subscription cancels the synchronizer task and
/// releases its store-notification receiver.
#[derive(Debug)]
pub struct Subscription<S> {
    state_rx: watch::Receiver<S>,
    cancel: CancellationToken,
}

impl<S: Clone> Subscription<S> {
    pub(crate) fn new(state_rx: watch::Receiver<S>, cancel: CancellationToken) -> Self {
        Self { state_rx, cancel }
    }

    /// The most recently emitted state.
    pub fn state(&self) -> S {
        self.state_rx.borrow().clone()
    }

    /// Waits for the next state change. Returns `false` once the backing
    /// task is gone and no further change will be observed.
    pub async fn changed(&mut self) -> bool {
        self.state_rx.changed().await.is_ok()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<S> Drop for Subscription<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
