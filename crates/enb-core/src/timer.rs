use std::collections::HashMap;

use crate::tti::TtiPoint;

pub type TimerId = u32;

#[derive(Debug, Clone, Copy)]
struct TimerState {
    duration_ms: u32,
    /// expiry deadline; `None` while stopped
    deadline: Option<TtiPoint>,
}

/// TTI-driven one-shot timer queue. One TTI equals one millisecond, so
/// durations are plain ms counts. Owners map [`TimerId`]s back to users.
///
/// `tick` must be called once per TTI with a monotonically advancing clock;
/// it returns the ids that expired so the owner acts on them outside the
/// queue's borrow.
#[derive(Default)]
pub struct TtiTimers {
    now: TtiPoint,
    next_id: TimerId,
    timers: HashMap<TimerId, TimerState>,
}

impl TtiTimers {
    pub fn new() -> TtiTimers {
        TtiTimers::default()
    }

    pub fn now(&self) -> TtiPoint {
        self.now
    }

    /// Allocate a stopped timer
    pub fn get_unique_timer(&mut self) -> TimerId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.timers.insert(id, TimerState { duration_ms: 0, deadline: None });
        id
    }

    /// Set the duration without (re)starting
    pub fn set(&mut self, id: TimerId, duration_ms: u32) {
        if let Some(t) = self.timers.get_mut(&id) {
            t.duration_ms = duration_ms;
        } else {
            tracing::warn!("set on unknown timer id {}", id);
        }
    }

    /// (Re)start from now with the configured duration
    pub fn run(&mut self, id: TimerId) {
        let now = self.now;
        if let Some(t) = self.timers.get_mut(&id) {
            t.deadline = Some(now.add(t.duration_ms as i32));
        } else {
            tracing::warn!("run on unknown timer id {}", id);
        }
    }

    pub fn stop(&mut self, id: TimerId) {
        if let Some(t) = self.timers.get_mut(&id) {
            t.deadline = None;
        }
    }

    pub fn release(&mut self, id: TimerId) {
        self.timers.remove(&id);
    }

    pub fn is_running(&self, id: TimerId) -> bool {
        self.timers.get(&id).map_or(false, |t| t.deadline.is_some())
    }

    pub fn duration(&self, id: TimerId) -> u32 {
        self.timers.get(&id).map_or(0, |t| t.duration_ms)
    }

    /// Advance the clock and collect expired timers. Expired timers stop;
    /// owners re-arm via `run` if wanted.
    pub fn tick(&mut self, now: TtiPoint) -> Vec<TimerId> {
        self.now = now;
        let mut expired = Vec::new();
        for (id, t) in self.timers.iter_mut() {
            if let Some(deadline) = t.deadline {
                if deadline.age(now) >= 0 {
                    t.deadline = None;
                    expired.push(*id);
                }
            }
        }
        expired.sort_unstable();
        expired
    }
}
