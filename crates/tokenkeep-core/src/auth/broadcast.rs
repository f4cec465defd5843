use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::BroadcastEvent;
use crate::storage::{ContextId, Persistence, SharedStorage};

/// Shared storage key used as a one-shot message slot.
pub const SYNC_KEY: &str = "auth_sync";

/// Login/logout signalling between contexts sharing one `SharedStorage`.
///
/// A writer stores the serialized event under `SYNC_KEY` and retracts it
/// shortly after, so a context opened later never replays it. Delivery is
/// last-write-wins with no ordering between contexts.
#[derive(Clone)]
pub struct Broadcaster {
    storage: SharedStorage,
    context: ContextId,
    retract_delay: Duration,
}

impl Broadcaster {
    pub fn new(storage: SharedStorage, context: ContextId, retract_delay: Duration) -> Self {
        Self {
            storage,
            context,
            retract_delay,
        }
    }

    pub fn publish(&self, event: &BroadcastEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize sync event");
                return;
            }
        };

        self.storage
            .set(self.context, SYNC_KEY, &payload, Persistence::Session);
        debug!(kind = ?event.kind, context = %self.context, "Sync event published");

        let storage = self.storage.clone();
        let context = self.context;
        let delay = self.retract_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A newer event from another context keeps its slot
            storage.remove_if(context, SYNC_KEY, &payload);
        });
    }

    /// Deliver events written by other contexts to `handler` until it breaks.
    ///
    /// Subscribes before returning, so every event published after this call
    /// is observed.
    pub fn listen<F>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(BroadcastEvent) -> ControlFlow<()> + Send + 'static,
    {
        let mut rx = self.storage.subscribe();
        let context = self.context;

        tokio::spawn(async move {
            loop {
                let change = match rx.recv().await {
                    Ok(change) => change,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Storage notifications lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                if change.key != SYNC_KEY || change.origin == context {
                    continue;
                }
                // Retractions carry no event
                let Some(payload) = change.new_value else {
                    continue;
                };

                match serde_json::from_str::<BroadcastEvent>(&payload) {
                    Ok(event) => {
                        debug!(kind = ?event.kind, from = %change.origin, "Sync event received");
                        if handler(event).is_break() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Ignoring malformed sync event"),
                }
            }
        })
    }
}
