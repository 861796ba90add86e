use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Serde uses the same snake_case tokens as the database columns.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(
    /// Negotiation status of an appointment request.
    RequestStatus {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
        DoctorSuggestedAlternative => "doctor_suggested_alternative",
        PatientAcceptedAlternative => "patient_accepted_alternative",
        PatientRejectedAlternative => "patient_rejected_alternative",
        Confirmed => "confirmed",
        Cancelled => "cancelled",
    }
);

impl RequestStatus {
    pub const ALL: [RequestStatus; 8] = [
        Self::Pending,
        Self::Accepted,
        Self::Rejected,
        Self::DoctorSuggestedAlternative,
        Self::PatientAcceptedAlternative,
        Self::PatientRejectedAlternative,
        Self::Confirmed,
        Self::Cancelled,
    ];

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::PatientRejectedAlternative | Self::Cancelled
        )
    }

    /// Statuses that carry a resulting appointment.
    pub fn has_appointment(&self) -> bool {
        matches!(self, Self::Accepted | Self::Confirmed)
    }
}

str_enum!(
    /// The party acting on a request.
    Actor {
        Patient => "patient",
        Doctor => "doctor",
    }
);

str_enum!(AppointmentStatus {
    Scheduled => "scheduled",
    Cancelled => "cancelled",
});

str_enum!(
    /// Closed set of display categories a calendar item may be tagged with.
    CategoryTag {
        Appointment => "appointment",
        Task => "task",
        Personal => "personal",
        Holiday => "holiday",
    }
);

str_enum!(NotificationKind {
    RequestCreated => "request_created",
    AlternativeSuggested => "alternative_suggested",
    Accepted => "accepted",
    Rejected => "rejected",
    Confirmed => "confirmed",
    Cancelled => "cancelled",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_tokens_parse_back() {
        for status in RequestStatus::ALL {
            assert_eq!(RequestStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = RequestStatus::from_str("completed").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_string(&RequestStatus::DoctorSuggestedAlternative).unwrap();
        assert_eq!(json, "\"doctor_suggested_alternative\"");
        let back: RequestStatus = serde_json::from_str("\"patient_accepted_alternative\"").unwrap();
        assert_eq!(back, RequestStatus::PatientAcceptedAlternative);
    }

    #[test]
    fn terminal_statuses() {
        let terminal: Vec<_> = RequestStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                RequestStatus::Rejected,
                RequestStatus::PatientRejectedAlternative,
                RequestStatus::Cancelled,
            ]
        );
    }

    #[test]
    fn category_tag_rejects_free_form_values() {
        assert_eq!(CategoryTag::from_str("task").unwrap(), CategoryTag::Task);
        assert!(CategoryTag::from_str("Task").is_err());
        assert!(serde_json::from_str::<CategoryTag>("\"meeting\"").is_err());
    }
}
