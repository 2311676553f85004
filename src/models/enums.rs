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

str_enum!(Category {
    Normal => "normal",
    Borderline => "borderline",
    Abnormal => "abnormal",
});

str_enum!(PatternStrength {
    Strong => "strong",
    Moderate => "moderate",
});

str_enum!(TimeBucket {
    Morning => "morning",
    Lunch => "lunch",
    Afternoon => "afternoon",
    Evening => "evening",
});

str_enum!(NotificationKind {
    PatientAlert => "patient_alert",
    SpecialistAlert => "specialist_alert",
});

str_enum!(RecipientRole {
    Patient => "patient",
    Specialist => "specialist",
});

impl TimeBucket {
    /// Declaration order; also the tie-break order when picking a typical timing.
    pub const ALL: [TimeBucket; 4] = [
        TimeBucket::Morning,
        TimeBucket::Lunch,
        TimeBucket::Afternoon,
        TimeBucket::Evening,
    ];

    /// Morning [6,11), lunch [11,15), afternoon [15,19), evening otherwise.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=10 => TimeBucket::Morning,
            11..=14 => TimeBucket::Lunch,
            15..=18 => TimeBucket::Afternoon,
            _ => TimeBucket::Evening,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn category_round_trip() {
        for (variant, s) in [
            (Category::Normal, "normal"),
            (Category::Borderline, "borderline"),
            (Category::Abnormal, "abnormal"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(Category::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn unknown_value_is_invalid_enum() {
        let err = Category::from_str("critical").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { ref field, .. } if field == "Category"));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&NotificationKind::SpecialistAlert).unwrap();
        assert_eq!(json, "\"specialist_alert\"");
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(TimeBucket::from_hour(5), TimeBucket::Evening);
        assert_eq!(TimeBucket::from_hour(6), TimeBucket::Morning);
        assert_eq!(TimeBucket::from_hour(10), TimeBucket::Morning);
        assert_eq!(TimeBucket::from_hour(11), TimeBucket::Lunch);
        assert_eq!(TimeBucket::from_hour(14), TimeBucket::Lunch);
        assert_eq!(TimeBucket::from_hour(15), TimeBucket::Afternoon);
        assert_eq!(TimeBucket::from_hour(18), TimeBucket::Afternoon);
        assert_eq!(TimeBucket::from_hour(19), TimeBucket::Evening);
        assert_eq!(TimeBucket::from_hour(0), TimeBucket::Evening);
    }
}
