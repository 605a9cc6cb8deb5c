//! Date-window partitioning and the window work arena
//!
//! Splitting never recurses: the orchestrator keeps every window it has ever
//! seen in a [`WindowArena`] and works through a FIFO queue of arena indices,
//! so a dense run of single-day spikes cannot grow the call stack.

use crate::{SearchKind, SearchWindow};
use chrono::Duration;
use serde::Serialize;
use std::collections::VecDeque;

/// Bisects date windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowPartitioner;

impl WindowPartitioner {
    /// Split `window` into an earlier and a later half.
    ///
    /// The split point is the midpoint rounded down to a whole day: `left`
    /// ends on it and `right` starts the following day, so the halves are
    /// adjacent and never overlap. Returns `None` for a single-day window.
    pub fn split(window: SearchWindow) -> Option<(SearchWindow, SearchWindow)> {
        if window.is_single_day() {
            return None;
        }
        let half = (window.end() - window.start()).num_days() / 2;
        let mid = window.start() + Duration::days(half);
        let left = SearchWindow::new(window.start(), mid).ok()?;
        let right = SearchWindow::new(mid + Duration::days(1), window.end()).ok()?;
        Some((left, right))
    }

    /// Leaf windows produced by splitting `window` until `needs_split`
    /// returns false or a single day is reached, in date order.
    pub fn leaves<F>(window: SearchWindow, mut needs_split: F) -> Vec<SearchWindow>
    where
        F: FnMut(&SearchWindow) -> bool,
    {
        let mut stack = vec![window];
        let mut leaves = Vec::new();
        while let Some(current) = stack.pop() {
            match needs_split(&current).then(|| Self::split(current)).flatten() {
                Some((left, right)) => {
                    stack.push(right);
                    stack.push(left);
                }
                None => leaves.push(current),
            }
        }
        leaves
    }
}

/// Index of a window record in a [`WindowArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WindowId(usize);

impl WindowId {
    /// Position in the arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Progress of one window record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum WindowStatus {
    /// Queued or waiting for a retry
    Pending,
    /// Replaced by two children
    Split {
        /// Earlier half
        left: WindowId,
        /// Later half
        right: WindowId,
    },
    /// All visible matches fetched
    Complete,
    /// Single day over the cap; only the visible matches were fetched
    Truncated,
    /// Retired without full results
    Failed(String),
}

/// One window of one search kind.
#[derive(Debug, Clone, Serialize)]
pub struct WindowNode {
    /// Date range
    pub window: SearchWindow,
    /// Search kind
    pub kind: SearchKind,
    /// Window this one was split from
    pub parent: Option<WindowId>,
    /// Number of splits between the root and this window
    pub depth: u32,
    /// Transient failures so far
    pub attempts: u32,
    /// Progress
    pub status: WindowStatus,
}

/// All windows of a run plus the queue of pending ones.
#[derive(Debug, Default)]
pub struct WindowArena {
    nodes: Vec<WindowNode>,
    queue: VecDeque<WindowId>,
}

impl WindowArena {
    /// Empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root window and queue it.
    pub fn push_root(&mut self, window: SearchWindow, kind: SearchKind) -> WindowId {
        self.push(window, kind, None, 0)
    }

    /// Split a window, queue both children, and return their ids.
    ///
    /// Returns `None` without changing anything when the window is a single day.
    pub fn split(&mut self, id: WindowId) -> Option<(WindowId, WindowId)> {
        let node = &self.nodes[id.0];
        let (left, right) = WindowPartitioner::split(node.window)?;
        let (kind, depth) = (node.kind, node.depth + 1);

        let left_id = self.push(left, kind, Some(id), depth);
        let right_id = self.push(right, kind, Some(id), depth);
        self.nodes[id.0].status = WindowStatus::Split {
            left: left_id,
            right: right_id,
        };
        Some((left_id, right_id))
    }

    /// Take the next pending window.
    pub fn pop(&mut self) -> Option<WindowId> {
        self.queue.pop_front()
    }

    /// Put a window back at the end of the queue after a transient failure.
    pub fn requeue(&mut self, id: WindowId) {
        self.nodes[id.0].attempts += 1;
        self.queue.push_back(id);
    }

    /// Put a window back at the front of the queue without counting an attempt.
    pub fn retry_now(&mut self, id: WindowId) {
        self.queue.push_front(id);
    }

    /// Record a final status.
    pub fn retire(&mut self, id: WindowId, status: WindowStatus) {
        self.nodes[id.0].status = status;
    }

    /// Look up a window.
    pub fn node(&self, id: WindowId) -> &WindowNode {
        &self.nodes[id.0]
    }

    /// Every window ever created, in creation order.
    pub fn nodes(&self) -> &[WindowNode] {
        &self.nodes
    }

    /// Windows still queued.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Windows still queued, in queue order.
    pub fn queued(&self) -> impl Iterator<Item = &WindowNode> + '_ {
        self.queue.iter().map(|id| &self.nodes[id.0])
    }

    fn push(
        &mut self,
        window: SearchWindow,
        kind: SearchKind,
        parent: Option<WindowId>,
        depth: u32,
    ) -> WindowId {
        let id = WindowId(self.nodes.len());
        self.nodes.push(WindowNode {
            window,
            kind,
            parent,
            depth,
            attempts: 0,
            status: WindowStatus::Pending,
        });
        self.queue.push_back(id);
        id
    }
}
