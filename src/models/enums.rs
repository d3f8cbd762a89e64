use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
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

str_enum!(Role {
    Admin => "admin",
    Receptionist => "receptionist",
    Therapist => "therapist",
});

str_enum!(SessionStatus {
    Scheduled => "scheduled",
    CheckedIn => "checked_in",
    Completed => "completed",
    Cancelled => "cancelled",
    NoShow => "no_show",
});

impl SessionStatus {
    /// Completed, cancelled and no-show sessions never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// Whether the session still blocks the therapist's calendar.
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

str_enum!(PackageSaleStatus {
    Active => "active",
    Expired => "expired",
    Completed => "completed",
});

str_enum!(BillStatus {
    Unpaid => "unpaid",
    Paid => "paid",
    Void => "void",
});

str_enum!(TemplateKind {
    Questionnaire => "questionnaire",
    Examination => "examination",
});

str_enum!(FieldType {
    Text => "text",
    Number => "number",
    Boolean => "boolean",
    Choice => "choice",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn session_status_round_trips_through_db_string() {
        for status in [
            SessionStatus::Scheduled,
            SessionStatus::CheckedIn,
            SessionStatus::Completed,
            SessionStatus::Cancelled,
            SessionStatus::NoShow,
        ] {
            assert_eq!(SessionStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_value_is_invalid_enum() {
        let err = Role::from_str("superuser").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { ref field, .. } if field == "Role"));
    }

    #[test]
    fn serde_uses_snake_case_db_strings() {
        let json = serde_json::to_string(&SessionStatus::NoShow).unwrap();
        assert_eq!(json, "\"no_show\"");
        let parsed: SessionStatus = serde_json::from_str("\"checked_in\"").unwrap();
        assert_eq!(parsed, SessionStatus::CheckedIn);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!SessionStatus::Scheduled.is_terminal());
        assert!(!SessionStatus::CheckedIn.is_terminal());
        assert!(SessionStatus::NoShow.is_terminal());
        assert!(SessionStatus::NoShow.occupies_slot());
        assert!(!SessionStatus::Cancelled.occupies_slot());
    }
}
