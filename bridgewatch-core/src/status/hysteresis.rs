//! Delay-then-repeat alerting for bad bridge states.
//!
//! A bad streak opens on the first bad observation. The first alert fires
//! once the streak is `alert_delay` old, then at most once per
//! `alert_period` until a non-bad observation closes the streak.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Verdict of [`AlertHysteresis::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertDecision {
    /// Escalate this observation.
    pub alert: bool,
    /// Start of the current bad streak, if one is open.
    pub bad_since: Option<DateTime<Utc>>,
    /// Longest sensible wait before the next evaluation.
    pub next_wait: Duration,
}

/// Bad-streak bookkeeping of one watcher.
#[derive(Debug, Clone)]
pub struct AlertHysteresis {
    alert_delay: TimeDelta,
    alert_period: TimeDelta,
    bad_since: Option<DateTime<Utc>>,
    last_alert: Option<DateTime<Utc>>,
}

impl AlertHysteresis {
    /// No streak open, nothing alerted yet.
    pub fn new(alert_delay: Duration, alert_period: Duration) -> Self {
        Self {
            alert_delay: to_delta(alert_delay),
            alert_period: to_delta(alert_period),
            bad_since: None,
            last_alert: None,
        }
    }

    /// Start of the open bad streak.
    pub fn bad_since(&self) -> Option<DateTime<Utc>> {
        self.bad_since
    }

    #[cfg(test)]
    pub(crate) fn last_alert(&self) -> Option<DateTime<Utc>> {
        self.last_alert
    }

    /// Fold one observation into the streak. `idle_wait` is returned as the
    /// next wait whenever no streak is open.
    pub fn evaluate(&mut self, is_bad: bool, now: DateTime<Utc>, idle_wait: Duration) -> AlertDecision {
        if !is_bad {
            self.bad_since = None;
            self.last_alert = None;
            return AlertDecision {
                alert: false,
                bad_since: None,
                next_wait: idle_wait,
            };
        }

        let bad_since = *self.bad_since.get_or_insert(now);
        let grace_over = saturating_add(bad_since, self.alert_delay);

        let (alert, next_wait) = if now >= grace_over {
            match self.last_alert {
                Some(last) if now - last < self.alert_period => {
                    (false, rounded_up(saturating_add(last, self.alert_period) - now))
                }
                _ => {
                    self.last_alert = Some(now);
                    (true, to_std(self.alert_period))
                }
            }
        } else {
            (false, rounded_up(grace_over - now))
        };

        AlertDecision {
            alert,
            bad_since: Some(bad_since),
            next_wait,
        }
    }
}

/// Whole seconds remaining plus one, so a re-check never lands just short
/// of the boundary.
fn rounded_up(remaining: TimeDelta) -> Duration {
    Duration::from_secs(u64::try_from(remaining.num_seconds()).unwrap_or(0) + 1)
}

fn saturating_add(at: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    at.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub(crate) fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

fn to_std(delta: TimeDelta) -> Duration {
    delta.to_std().unwrap_or(Duration::ZERO)
}
