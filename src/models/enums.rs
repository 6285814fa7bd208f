use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form doubles as the serde representation and the SQLite column value.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
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

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(SyncStatus {
    Synced => "synced",
    PendingCreate => "pending-create",
    PendingUpdate => "pending-update",
});

str_enum!(EntityKind {
    Activity => "activity",
    Session => "session",
    Attendance => "attendance",
    Beneficiary => "beneficiary",
    Exception => "exception",
});

// `exitoso` flag of the result envelope.
str_enum!(Outcome {
    Success => "S",
    Failure => "N",
});

impl SyncStatus {
    pub fn is_pending(&self) -> bool {
        !matches!(self, Self::Synced)
    }
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        Self::Activity,
        Self::Session,
        Self::Attendance,
        Self::Beneficiary,
        Self::Exception,
    ];

    /// Replica table holding this kind's records.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Activity => "activities",
            Self::Session => "sessions",
            Self::Attendance => "attendance",
            Self::Beneficiary => "beneficiaries",
            Self::Exception => "exceptions",
        }
    }
}
