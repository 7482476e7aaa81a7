//! Cancellable respawn timers keyed by connection

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use super::participant::ConnectionId;
use super::DuelEvent;

struct PendingRespawn {
    ticket: u64,
    handle: AbortHandle,
}

/// Schedules respawns that re-enter the duel event stream after a delay
pub struct RespawnScheduler {
    delay: Duration,
    events_tx: mpsc::WeakSender<DuelEvent>,
    pending: HashMap<ConnectionId, PendingRespawn>,
    next_ticket: u64,
}

impl RespawnScheduler {
    /// Holds only a weak sender, so pending timers alone keep the event
    /// stream open and an idle scheduler never does
    pub fn new(delay: Duration, events_tx: &mpsc::Sender<DuelEvent>) -> Self {
        Self {
            delay,
            events_tx: events_tx.downgrade(),
            pending: HashMap::new(),
            next_ticket: 0,
        }
    }

    /// Start a fresh timer for `connection_id`, replacing any pending one
    pub fn schedule(&mut self, connection_id: ConnectionId) {
        self.cancel(&connection_id);

        let Some(events_tx) = self.events_tx.upgrade() else {
            warn!(connection_id = %connection_id, "Duel task closing, respawn not scheduled");
            return;
        };

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let delay = self.delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if events_tx
                .send(DuelEvent::RespawnDue {
                    connection_id,
                    ticket,
                })
                .await
                .is_err()
            {
                warn!(connection_id = %connection_id, "Duel task gone before respawn fired");
            }
        });

        self.pending.insert(
            connection_id,
            PendingRespawn {
                ticket,
                handle: handle.abort_handle(),
            },
        );
        debug!(connection_id = %connection_id, ticket, "Respawn scheduled");
    }

    /// Cancel a pending timer, returns true if one was pending
    pub fn cancel(&mut self, connection_id: &ConnectionId) -> bool {
        match self.pending.remove(connection_id) {
            Some(pending) => {
                pending.handle.abort();
                debug!(connection_id = %connection_id, "Respawn cancelled");
                true
            }
            None => false,
        }
    }

    /// Claim a fired timer. Returns false for stale tickets (cancelled or replaced).
    pub fn complete(&mut self, connection_id: &ConnectionId, ticket: u64) -> bool {
        match self.pending.get(connection_id) {
            Some(pending) if pending.ticket == ticket => {
                self.pending.remove(connection_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, connection_id: &ConnectionId) -> bool {
        self.pending.contains_key(connection_id)
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for RespawnScheduler {
    fn drop(&mut self) {
        for pending in self.pending.values() {
            pending.handle.abort();
        }
    }
}
