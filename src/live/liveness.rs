//! Connection liveness.
//!
//! Right after the simulator starts a session the status word can drop to
//! disconnected while the session number is briefly unavailable, then come
//! back. The state machine below follows that dip so the connected signal
//! does not flap during the first ticks of a session.

use serde::{Deserialize, Serialize};

/// Position in the startup-dip sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LivenessState {
    /// Status has only been seen connected, or has just reconnected
    #[default]
    AwaitingDisconnect,
    /// Status reported disconnected
    SawDisconnect,
    /// Disconnected and the session number did not resolve
    SessionDataAbsent,
    /// The session number resolved again after being absent
    SessionDataPresent,
}

impl LivenessState {
    /// Next state given the raw status flag and whether the session number
    /// field currently resolves.
    ///
    /// The rules apply in sequence, so one observation can move through
    /// more than one state.
    pub fn advance(self, status_connected: bool, session_num_present: bool) -> Self {
        let mut state = self;
        if status_connected {
            state = Self::AwaitingDisconnect;
        }
        if state == Self::AwaitingDisconnect && !status_connected {
            state = Self::SawDisconnect;
        }
        if state == Self::SawDisconnect && !session_num_present {
            state = Self::SessionDataAbsent;
        }
        if state == Self::SessionDataAbsent && session_num_present {
            state = Self::SessionDataPresent;
        }
        state
    }

    /// Numeric form, 0 through 3.
    pub fn code(self) -> u8 {
        match self {
            Self::AwaitingDisconnect => 0,
            Self::SawDisconnect => 1,
            Self::SessionDataAbsent => 2,
            Self::SessionDataPresent => 3,
        }
    }
}

/// The externally visible connected predicate.
pub fn is_live(
    region_ok: bool,
    has_data_signal: bool,
    status_connected: bool,
    state: LivenessState,
) -> bool {
    region_ok
        && has_data_signal
        && (status_connected || state == LivenessState::SessionDataPresent)
}

#[cfg(test)]
mod tests {
    use super::LivenessState::*;
    use super::*;

    #[test]
    fn connected_status_always_resets() {
        for state in [AwaitingDisconnect, SawDisconnect, SessionDataAbsent, SessionDataPresent] {
            assert_eq!(state.advance(true, false), AwaitingDisconnect);
            assert_eq!(state.advance(true, true), AwaitingDisconnect);
        }
    }

    #[test]
    fn startup_dip_reaches_present() {
        let state = AwaitingDisconnect.advance(false, true);
        assert_eq!(state, SawDisconnect);
        let state = state.advance(false, false);
        assert_eq!(state, SessionDataAbsent);
        let state = state.advance(false, true);
        assert_eq!(state, SessionDataPresent);
        assert_eq!(state.advance(false, true), SessionDataPresent);
        assert_eq!(state.advance(false, false), SessionDataPresent);
    }

    #[test]
    fn rules_cascade_within_one_observation() {
        assert_eq!(AwaitingDisconnect.advance(false, false), SessionDataAbsent);
        assert_eq!(SawDisconnect.advance(false, true), SawDisconnect);
    }

    #[test]
    fn predicate_needs_region_and_signal() {
        assert!(is_live(true, true, true, AwaitingDisconnect));
        assert!(is_live(true, true, false, SessionDataPresent));
        assert!(!is_live(true, true, false, SessionDataAbsent));
        assert!(!is_live(false, true, true, AwaitingDisconnect));
        assert!(!is_live(true, false, true, SessionDataPresent));
        assert_eq!(SessionDataPresent.code(), 3);
    }
}
