use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::Action;

/// Default quiet period before a scroll burst is emitted
pub const DEFAULT_SCROLL_DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Debug)]
struct PendingScroll {
    action: Action,
    deadline: Instant,
}

/// Trailing-edge debounce for scroll actions, one slot per frame.
///
/// Each new position replaces the pending one and pushes the deadline out,
/// so a burst collapses into its last observed position.
#[derive(Debug)]
pub struct ScrollDebouncer {
    window: Duration,
    pending: HashMap<String, PendingScroll>,
}

impl ScrollDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    /// Replace the frame's pending scroll; returns the new deadline
    pub fn push(&mut self, action: Action, now: Instant) -> Instant {
        let deadline = now + self.window;
        self.pending
            .insert(action.frame_id.clone(), PendingScroll { action, deadline });
        deadline
    }

    /// Remove and return every scroll whose quiet period has elapsed
    pub fn take_due(&mut self, now: Instant) -> Vec<Action> {
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(frame, _)| frame.clone())
            .collect();

        let mut actions: Vec<Action> = due
            .into_iter()
            .filter_map(|frame| self.pending.remove(&frame))
            .map(|p| p.action)
            .collect();
        actions.sort_by_key(|a| a.timestamp);
        actions
    }

    /// Drain everything regardless of deadlines
    pub fn flush(&mut self) -> Vec<Action> {
        let mut actions: Vec<Action> = self.pending.drain().map(|(_, p)| p.action).collect();
        actions.sort_by_key(|a| a.timestamp);
        actions
    }

    /// Take the frame's pending scroll early, ahead of a later action in that frame
    pub fn take_frame(&mut self, frame_id: &str) -> Option<Action> {
        self.pending.remove(frame_id).map(|p| p.action)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Default for ScrollDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLL_DEBOUNCE)
    }
}
