use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::SchedulingError;

/// Appointment status, stored as smallint:
/// 0 scheduled, 1 confirmed, 2 cancelled, 3 finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum AppointmentStatus {
    Scheduled = 0,
    Confirmed = 1,
    Cancelled = 2,
    Finalized = 3,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Finalized,
    ];

    /// The transition table. Nothing outside this function decides whether a
    /// status change is legal.
    pub fn next_statuses(self) -> &'static [AppointmentStatus] {
        use AppointmentStatus::*;
        match self {
            Scheduled => &[Confirmed, Cancelled, Finalized],
            Confirmed => &[Finalized, Cancelled],
            Cancelled => &[],
            Finalized => &[],
        }
    }

    pub fn can_transition_to(self, target: AppointmentStatus) -> bool {
        self.next_statuses().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.next_statuses().is_empty()
    }

    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

pub fn ensure_transition(
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<(), SchedulingError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        warn!("Rejected status transition {from} -> {to}");
        Err(SchedulingError::InvalidTransition { from, to })
    }
}

impl TryFrom<i16> for AppointmentStatus {
    type Error = SchedulingError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AppointmentStatus::Scheduled),
            1 => Ok(AppointmentStatus::Confirmed),
            2 => Ok(AppointmentStatus::Cancelled),
            3 => Ok(AppointmentStatus::Finalized),
            other => Err(SchedulingError::Validation(format!(
                "unknown appointment status {other}"
            ))),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Finalized => write!(f, "finalized"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    const LEGAL: [(AppointmentStatus, AppointmentStatus); 5] = [
        (Scheduled, Confirmed),
        (Scheduled, Cancelled),
        (Scheduled, Finalized),
        (Confirmed, Finalized),
        (Confirmed, Cancelled),
    ];

    #[test]
    fn table_is_closed_over_every_pair() {
        for from in AppointmentStatus::ALL {
            for to in AppointmentStatus::ALL {
                let legal = LEGAL.contains(&(from, to));
                assert_eq!(from.can_transition_to(to), legal, "{from} -> {to}");
                assert_eq!(ensure_transition(from, to).is_ok(), legal);
            }
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(Cancelled.is_terminal());
        assert!(Finalized.is_terminal());
        assert!(!Scheduled.is_terminal());
        assert!(!Confirmed.is_terminal());
    }

    #[test]
    fn smallint_mapping_round_trips_known_values() {
        for status in AppointmentStatus::ALL {
            assert_eq!(AppointmentStatus::try_from(status.as_i16()), Ok(status));
        }
        assert!(AppointmentStatus::try_from(7).is_err());
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&Confirmed).unwrap();
        assert_eq!(json, "\"confirmed\"");
    }
}
