//! Keepalive timers.
//!
//! Timers are identified by an epoch. Every arm or cancel bumps the epoch, so
//! a driver firing a timer it armed earlier is ignored when stale.

use std::time::Duration;

/// Which keepalive timer is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// The connection sat idle; a ping is due
    Inactivity,
    /// A ping was sent; the connection is dead if this fires
    PingTimeout,
}

/// A timer the driver must schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub kind: TimerKind,
    pub after: Duration,
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Off,
    Inactive,
    AwaitingAck,
}

#[derive(Debug)]
pub(crate) struct Keepalive {
    intervals: Option<(Duration, Duration)>,
    phase: Phase,
    epoch: u64,
}

impl Keepalive {
    pub(crate) fn new(intervals: Option<(Duration, Duration)>) -> Self {
        Self {
            intervals,
            phase: Phase::Off,
            epoch: 0,
        }
    }

    /// Start the inactivity timer, unless a timer is already running.
    pub(crate) fn arm_idle(&mut self) {
        if self.intervals.is_some() && self.phase == Phase::Off {
            self.epoch += 1;
            self.phase = Phase::Inactive;
        }
    }

    pub(crate) fn cancel(&mut self) {
        if self.phase != Phase::Off {
            self.epoch += 1;
            self.phase = Phase::Off;
        }
    }

    /// A ping went out; start waiting for its answer.
    pub(crate) fn ping_sent(&mut self) {
        self.epoch += 1;
        self.phase = Phase::AwaitingAck;
    }

    /// Returns false if no ping was outstanding.
    pub(crate) fn on_ack(&mut self) -> bool {
        if self.phase == Phase::AwaitingAck {
            self.epoch += 1;
            self.phase = Phase::Off;
            true
        } else {
            false
        }
    }

    pub(crate) fn ping_outstanding(&self) -> bool {
        self.phase == Phase::AwaitingAck
    }

    pub(crate) fn wait_response(&self) -> Duration {
        self.intervals.map(|(_, wait)| wait).unwrap_or_default()
    }

    pub(crate) fn armed(&self) -> Option<ArmedTimer> {
        let (inactive, wait) = self.intervals?;
        let (kind, after) = match self.phase {
            Phase::Off => return None,
            Phase::Inactive => (TimerKind::Inactivity, inactive),
            Phase::AwaitingAck => (TimerKind::PingTimeout, wait),
        };
        Some(ArmedTimer {
            kind,
            after,
            epoch: self.epoch,
        })
    }

    /// The timer of `epoch` elapsed. Returns which one, or `None` if stale.
    pub(crate) fn fire(&mut self, epoch: u64) -> Option<TimerKind> {
        if epoch != self.epoch {
            return None;
        }
        let kind = match self.phase {
            Phase::Off => return None,
            Phase::Inactive => TimerKind::Inactivity,
            Phase::AwaitingAck => TimerKind::PingTimeout,
        };
        self.phase = Phase::Off;
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keepalive() -> Keepalive {
        Keepalive::new(Some((Duration::from_secs(10), Duration::from_secs(2))))
    }

    #[test]
    fn test_disabled_never_arms() {
        let mut k = Keepalive::new(None);
        k.arm_idle();
        assert_eq!(k.armed(), None);
    }

    #[test]
    fn test_stale_epoch_ignored() {
        let mut k = keepalive();
        k.arm_idle();
        let first = k.armed().unwrap();
        k.cancel();
        k.arm_idle();
        assert_eq!(k.fire(first.epoch), None);
        let second = k.armed().unwrap();
        assert_eq!(k.fire(second.epoch), Some(TimerKind::Inactivity));
    }

    #[test]
    fn test_ping_cycle() {
        let mut k = keepalive();
        k.arm_idle();
        let idle = k.armed().unwrap();
        assert_eq!(idle.after, Duration::from_secs(10));
        assert_eq!(k.fire(idle.epoch), Some(TimerKind::Inactivity));
        k.ping_sent();
        assert!(k.ping_outstanding());
        let wait = k.armed().unwrap();
        assert_eq!(wait.kind, TimerKind::PingTimeout);
        assert_eq!(wait.after, Duration::from_secs(2));
        assert!(k.on_ack());
        assert!(!k.on_ack());
        assert_eq!(k.fire(wait.epoch), None);
    }

    #[test]
    fn test_arm_idle_does_not_restart_running_timer() {
        let mut k = keepalive();
        k.arm_idle();
        let epoch = k.armed().unwrap().epoch;
        k.arm_idle();
        assert_eq!(k.armed().unwrap().epoch, epoch);
    }
}
