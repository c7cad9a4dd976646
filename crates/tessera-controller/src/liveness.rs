//! Passive liveness timers.
//!
//! One scheduler task owns a `DelayQueue` holding at most one pending expiry
//! per node id. The registry talks to it over an unbounded channel so arming
//! never blocks while an entry lock is held.

use std::collections::HashMap;
use std::sync::Weak;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::time::delay_queue::{DelayQueue, Key};

use crate::registry::NodeRegistry;

#[derive(Debug)]
enum TimerCommand {
    Arm { id: String, epoch: u64 },
    Cancel { id: String, epoch: u64 },
}

#[derive(Debug)]
pub(crate) struct LivenessTimers {
    tx: mpsc::UnboundedSender<TimerCommand>,
}

impl LivenessTimers {
    pub(crate) fn spawn(window: Duration, registry: Weak<NodeRegistry>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(window, registry, rx));
        Self { tx }
    }

    /// Replaces any pending timer for `id` with a fresh one.
    pub(crate) fn arm(&self, id: &str, epoch: u64) {
        let _ = self.tx.send(TimerCommand::Arm {
            id: id.to_string(),
            epoch,
        });
    }

    pub(crate) fn cancel(&self, id: &str, epoch: u64) {
        let _ = self.tx.send(TimerCommand::Cancel {
            id: id.to_string(),
            epoch,
        });
    }
}

struct Armed {
    key: Key,
    epoch: u64,
}

async fn run(
    window: Duration,
    registry: Weak<NodeRegistry>,
    mut rx: mpsc::UnboundedReceiver<TimerCommand>,
) {
    let mut queue: DelayQueue<(String, u64)> = DelayQueue::new();
    let mut armed: HashMap<String, Armed> = HashMap::new();

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(TimerCommand::Arm { id, epoch }) => {
                    let stale = armed.get(&id).is_some_and(|a| a.epoch > epoch);
                    if !stale {
                        if let Some(prev) = armed.remove(&id) {
                            queue.remove(&prev.key);
                        }
                        let key = queue.insert((id.clone(), epoch), window);
                        armed.insert(id, Armed { key, epoch });
                    }
                }
                Some(TimerCommand::Cancel { id, epoch }) => {
                    // a re-registration may already have armed a newer timer
                    if armed.get(&id).is_some_and(|a| a.epoch <= epoch) {
                        if let Some(prev) = armed.remove(&id) {
                            queue.remove(&prev.key);
                        }
                    }
                }
                None => break,
            },
            Some(expired) = queue.next(), if !queue.is_empty() => {
                let (id, epoch) = expired.into_inner();
                armed.remove(&id);
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.expire(&id, epoch);
            }
        }
    }

    tracing::debug!("liveness scheduler stopped");
}
