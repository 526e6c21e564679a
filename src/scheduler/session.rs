//! Per-run scheduling state.
//!
//! Which lane is primary is decided per run. A fresh session always starts
//! from the configured primary; nothing here is persisted.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::error::{BriefError, Result};
use crate::scheduler::lane::{LaneId, LaneSet, Role};

#[derive(Debug)]
pub struct RunSession {
    primary: AtomicU8,
    flipped: AtomicBool,
    configured: LaneId,
    single: Option<LaneId>,
}

impl RunSession {
    pub fn new(configured: LaneId, single: Option<LaneId>) -> Self {
        Self {
            primary: AtomicU8::new(encode(configured)),
            flipped: AtomicBool::new(false),
            configured,
            single,
        }
    }

    /// Session for a lane set; fails when no lane is configured.
    pub fn for_lanes(lanes: &LaneSet) -> Result<Self> {
        let configured = lanes.configured_primary().ok_or(BriefError::NoProviderLanes)?;
        Ok(Self::new(configured, lanes.single()))
    }

    pub fn primary(&self) -> LaneId {
        decode(self.primary.load(Ordering::SeqCst))
    }

    pub fn configured_primary(&self) -> LaneId {
        self.configured
    }

    /// Lane a task of `role` should be dispatched to right now.
    pub fn lane_for(&self, role: Role) -> LaneId {
        if let Some(only) = self.single {
            return only;
        }
        match role {
            Role::Primary => self.primary(),
            Role::Secondary => self.primary().other(),
        }
    }

    /// Note that `lane` ran out of attempts. The first exhaustion of the
    /// current primary moves the primary role to the other lane; returns
    /// true when it did. Exhausting the secondary lane leaves the flip
    /// available.
    pub fn record_exhaustion(&self, lane: LaneId) -> bool {
        if self.single.is_some() || self.primary() != lane {
            return false;
        }
        if self
            .flipped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let next = lane.other();
        let previous = decode(self.primary.swap(encode(next), Ordering::SeqCst));
        tracing::warn!(exhausted = %lane, from = %previous, to = %next, "Primary lane flipped for this run");
        true
    }

    pub fn flipped(&self) -> bool {
        self.flipped.load(Ordering::SeqCst)
    }
}

fn encode(lane: LaneId) -> u8 {
    match lane {
        LaneId::A => 0,
        LaneId::B => 1,
    }
}

fn decode(value: u8) -> LaneId {
    if value == 0 { LaneId::A } else { LaneId::B }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_follow_primary() {
        let session = RunSession::new(LaneId::A, None);
        assert_eq!(session.lane_for(Role::Primary), LaneId::A);
        assert_eq!(session.lane_for(Role::Secondary), LaneId::B);
    }

    #[test]
    fn test_first_exhaustion_flips_once() {
        let session = RunSession::new(LaneId::A, None);
        assert!(session.record_exhaustion(LaneId::A));
        assert_eq!(session.primary(), LaneId::B);
        assert_eq!(session.lane_for(Role::Secondary), LaneId::A);

        assert!(!session.record_exhaustion(LaneId::B));
        assert_eq!(session.primary(), LaneId::B);
        assert!(session.flipped());
        assert_eq!(session.configured_primary(), LaneId::A);
    }

    #[test]
    fn test_secondary_exhaustion_keeps_flip_available() {
        let session = RunSession::new(LaneId::A, None);
        assert!(!session.record_exhaustion(LaneId::B));
        assert_eq!(session.primary(), LaneId::A);
        assert!(!session.flipped());

        assert!(session.record_exhaustion(LaneId::A));
        assert_eq!(session.primary(), LaneId::B);
        assert!(session.flipped());
    }

    #[test]
    fn test_single_lane_never_flips() {
        let session = RunSession::new(LaneId::B, Some(LaneId::B));
        assert_eq!(session.lane_for(Role::Primary), LaneId::B);
        assert_eq!(session.lane_for(Role::Secondary), LaneId::B);
        assert!(!session.record_exhaustion(LaneId::B));
        assert!(!session.flipped());
    }

    #[test]
    fn test_no_lanes_is_fatal() {
        assert!(matches!(
            RunSession::for_lanes(&LaneSet::default()),
            Err(BriefError::NoProviderLanes)
        ));
    }
}
