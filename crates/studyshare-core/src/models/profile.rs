//! Profile model

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Store-assigned identifier of a profile row.
///
/// The backend mints these; this layer treats them as opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Year of study, restricted to the four-year degree domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Year {
    First,
    Second,
    Third,
    Fourth,
}

impl Year {
    /// Numeric form used on the wire (1-4).
    #[must_use]
    pub const fn as_number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
            Self::Fourth => 4,
        }
    }
}

impl TryFrom<u8> for Year {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::First),
            2 => Ok(Self::Second),
            3 => Ok(Self::Third),
            4 => Ok(Self::Fourth),
            other => Err(format!("year must be between 1 and 4, got {other}")),
        }
    }
}

impl From<Year> for u8 {
    fn from(value: Year) -> Self {
        value.as_number()
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ordinal = match self {
            Self::First => "1st",
            Self::Second => "2nd",
            Self::Third => "3rd",
            Self::Fourth => "4th",
        };
        write!(f, "{ordinal} Year")
    }
}

/// A student profile as stored in the table store.
///
/// At most one profile per user is assumed by the read path; the first
/// row returned for a `user_id` is treated as authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Store-assigned identifier
    pub id: ProfileId,
    /// Owning principal id
    pub user_id: String,
    /// Full name
    pub name: String,
    /// Course of study
    pub course: String,
    /// Branch within the course
    pub branch: String,
    /// Year of study
    pub year: Year,
}

/// Editable profile fields, validated before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDraft {
    pub name: String,
    pub course: String,
    pub branch: String,
    pub year: Year,
}

impl ProfileDraft {
    /// Reject drafts with missing required fields.
    ///
    /// The year domain is already closed by the `Year` type.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("name", &self.name),
            ("course", &self.course),
            ("branch", &self.branch),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_roundtrips_through_numbers() {
        for number in 1..=4u8 {
            let year = Year::try_from(number).unwrap();
            assert_eq!(year.as_number(), number);
        }
    }

    #[test]
    fn year_rejects_out_of_domain_values() {
        assert!(Year::try_from(0).is_err());
        assert!(Year::try_from(5).is_err());
    }

    #[test]
    fn year_displays_as_ordinal() {
        assert_eq!(Year::First.to_string(), "1st Year");
        assert_eq!(Year::Second.to_string(), "2nd Year");
        assert_eq!(Year::Third.to_string(), "3rd Year");
        assert_eq!(Year::Fourth.to_string(), "4th Year");
    }

    #[test]
    fn year_deserializes_from_wire_number() {
        let year: Year = serde_json::from_str("3").unwrap();
        assert_eq!(year, Year::Third);
        assert!(serde_json::from_str::<Year>("7").is_err());
    }

    #[test]
    fn draft_validation_requires_all_fields() {
        let draft = ProfileDraft {
            name: "Ada".to_string(),
            course: "  ".to_string(),
            branch: "CS".to_string(),
            year: Year::Second,
        };
        let error = draft.validate().unwrap_err();
        assert!(error.to_string().contains("course"));
    }

    #[test]
    fn profile_deserializes_from_store_row() {
        let row = serde_json::json!({
            "id": "p-1",
            "user_id": "u-1",
            "name": "Ada",
            "course": "B.Tech",
            "branch": "CS",
            "year": 2,
            "updated_at": "2024-05-01T10:00:00+00:00"
        });
        let profile: Profile = serde_json::from_value(row).unwrap();
        assert_eq!(profile.id, ProfileId::new("p-1"));
        assert_eq!(profile.year, Year::Second);
    }
}
