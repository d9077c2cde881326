//! Tile load requests and their scheduling order.

use std::cmp::Ordering;
use std::time::Instant;

use super::cache::TileKey;

/// How urgently a tile is needed.
///
/// Ordering is strict: every `Urgent` request is served before any
/// `Visible`, and every `Visible` before any `Adjacent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TileLoadPriority {
    /// Prefetch for tiles just outside the viewport
    Adjacent = 100,

    /// Visible, with a coarser fallback already on screen
    Visible = 500,

    /// Visible, nothing usable on screen yet
    Urgent = 1000,
}

/// A request to decode one tile in the background.
///
/// Requests order by priority (higher first), then by request time (older
/// first). A submission sequence number assigned by the pool breaks ties
/// between requests created within the same clock tick.
#[derive(Debug, Clone)]
pub struct TileLoadRequest {
    pub key: TileKey,
    pub priority: TileLoadPriority,
    pub request_time: Instant,
    pub(crate) sequence: u64,
}

impl TileLoadRequest {
    /// Create a request stamped with the current time.
    pub fn new(key: TileKey, priority: TileLoadPriority) -> Self {
        Self {
            key,
            priority,
            request_time: Instant::now(),
            sequence: 0,
        }
    }
}

impl PartialEq for TileLoadRequest {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TileLoadRequest {}

impl PartialOrd for TileLoadRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TileLoadRequest {
    /// "Greater" means "dequeue first" so the type can sit in a max-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.request_time.cmp(&self.request_time))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}
