//! Two-stage inactivity countdown.
//!
//! Both deadlines are recomputed from the same last-activity instant; the
//! warning firing never moves the expiry deadline.

use std::time::{Duration, Instant};

pub const DEFAULT_WARN_AFTER: Duration = Duration::from_secs(4 * 60);
pub const DEFAULT_EXPIRE_AFTER: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InactivityPolicy {
    pub warn_after: Duration,
    pub expire_after: Duration,
}

impl Default for InactivityPolicy {
    fn default() -> Self {
        Self {
            warn_after: DEFAULT_WARN_AFTER,
            expire_after: DEFAULT_EXPIRE_AFTER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactivityAlarm {
    Warning,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Deadlines {
    warn_at: Option<Instant>,
    expire_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InactivityMonitor {
    policy: InactivityPolicy,
    deadlines: Option<Deadlines>,
    warning_visible: bool,
}

impl InactivityMonitor {
    #[must_use]
    pub fn new(policy: InactivityPolicy) -> Self {
        Self {
            policy,
            deadlines: None,
            warning_visible: false,
        }
    }

    #[must_use]
    pub fn policy(&self) -> InactivityPolicy {
        self.policy
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadlines.is_some()
    }

    #[must_use]
    pub fn warning_visible(&self) -> bool {
        self.warning_visible
    }

    /// Restarts both countdowns. Sessions without messages stay disarmed.
    pub fn record_activity(&mut self, now: Instant, message_count: usize) {
        self.warning_visible = false;
        if message_count == 0 {
            self.deadlines = None;
            return;
        }

        self.deadlines = Some(Deadlines {
            warn_at: Some(now + self.policy.warn_after),
            expire_at: now + self.policy.expire_after,
        });
    }

    /// Dismissing the warning counts as activity.
    pub fn dismiss_warning(&mut self, now: Instant, message_count: usize) {
        self.record_activity(now, message_count);
    }

    pub fn disarm(&mut self) {
        self.deadlines = None;
        self.warning_visible = false;
    }

    /// Earliest pending deadline, for hosts that sleep until the next tick.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.map(|deadlines| match deadlines.warn_at {
            Some(warn_at) => warn_at.min(deadlines.expire_at),
            None => deadlines.expire_at,
        })
    }

    /// Fires at most one alarm per call. Expiry disarms the monitor.
    pub fn poll(&mut self, now: Instant) -> Option<InactivityAlarm> {
        let deadlines = self.deadlines.as_mut()?;

        if now >= deadlines.expire_at {
            self.deadlines = None;
            self.warning_visible = false;
            return Some(InactivityAlarm::Expired);
        }

        match deadlines.warn_at {
            Some(warn_at) if now >= warn_at => {
                deadlines.warn_at = None;
                self.warning_visible = true;
                Some(InactivityAlarm::Warning)
            }
            _ => None,
        }
    }
}

impl Default for InactivityMonitor {
    fn default() -> Self {
        Self::new(InactivityPolicy::default())
    }
}
