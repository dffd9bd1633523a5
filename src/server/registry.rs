//! Live connection table. The only state more than one connection mutates.

use log::info;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::session::Mode;
use crate::stats::FrameStats;

/// Instructions pushed into a running session from outside its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    SetMode(Mode),
    /// Server is going down; the session closes after its current frame.
    Shutdown,
}

struct Entry {
    presentation: String,
    control: mpsc::UnboundedSender<Control>,
    mode: Mode,
    stats: FrameStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub id: u64,
    pub presentation: String,
    pub mode: Mode,
    pub stats: FrameStats,
}

#[derive(Default)]
pub struct Registry {
    sessions: Mutex<HashMap<u64, Entry>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds a connection; it is removed again when the guard drops.
    pub fn register(
        self: &Arc<Self>,
        presentation: &str,
    ) -> (SessionGuard, mpsc::UnboundedReceiver<Control>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        let live = {
            let mut map = self.sessions.lock();
            map.insert(
                id,
                Entry {
                    presentation: presentation.to_string(),
                    control: tx,
                    mode: Mode::default(),
                    stats: FrameStats::default(),
                },
            );
            map.len()
        };
        info!("session {id} connected (presentation '{presentation}', {live} live)");
        (
            SessionGuard {
                id,
                registry: Arc::clone(self),
            },
            rx,
        )
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends `ctl` to every live session; returns how many accepted it.
    pub fn broadcast(&self, ctl: Control) -> usize {
        let map = self.sessions.lock();
        map.values().filter(|e| e.control.send(ctl).is_ok()).count()
    }

    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let map = self.sessions.lock();
        let mut out: Vec<SessionInfo> = map
            .iter()
            .map(|(id, e)| SessionInfo {
                id: *id,
                presentation: e.presentation.clone(),
                mode: e.mode,
                stats: e.stats,
            })
            .collect();
        out.sort_by_key(|s| s.id);
        out
    }

    fn publish(&self, id: u64, mode: Mode, stats: FrameStats) {
        if let Some(e) = self.sessions.lock().get_mut(&id) {
            e.mode = mode;
            e.stats = stats;
        }
    }

    fn remove(&self, id: u64) -> Option<Entry> {
        self.sessions.lock().remove(&id)
    }
}

/// Registry membership of one connection.
pub struct SessionGuard {
    id: u64,
    registry: Arc<Registry>,
}

impl SessionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn publish(&self, mode: Mode, stats: FrameStats) {
        self.registry.publish(self.id, mode, stats);
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(e) = self.registry.remove(self.id) {
            info!(
                "session {} disconnected (presentation '{}', {} frames processed)",
                self.id, e.presentation, e.stats.processed
            );
        }
    }
}
