//! Assignment model linking the user to a subject

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SubjectId, SubjectType, Watermark};

/// SRS stage WaniKani assigns to burned items
pub const BURNED_SRS_STAGE: u8 = 9;

/// A user's progress on a single subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// WaniKani assignment ID
    pub id: u64,
    pub subject_id: SubjectId,
    pub subject_type: Option<SubjectType>,
    pub srs_stage: u8,
    /// When the subject was burned (None while still in review)
    pub burned_at: Option<DateTime<Utc>>,
    /// When the assignment resource last changed on the server
    pub updated_at: Option<DateTime<Utc>>,
}

impl Assignment {
    /// Create a burned assignment
    pub fn burned(id: u64, subject_id: SubjectId, burned_at: DateTime<Utc>) -> Self {
        Self {
            id,
            subject_id,
            subject_type: None,
            srs_stage: BURNED_SRS_STAGE,
            burned_at: Some(burned_at),
            updated_at: Some(burned_at),
        }
    }

    /// Whether the assignment is in the burned state
    pub fn is_burned(&self) -> bool {
        self.srs_stage == BURNED_SRS_STAGE && self.burned_at.is_some()
    }

    /// Whether this assignment was burned after the given watermark
    ///
    /// Only these assignments are new for an incremental sync.
    pub fn burned_after(&self, watermark: &Watermark) -> bool {
        match self.burned_at {
            Some(burned_at) => self.is_burned() && watermark.admits(burned_at),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_burned_after_watermark() {
        let assignment = Assignment::burned(1, SubjectId(10), at(2));

        assert!(assignment.burned_after(&Watermark::empty()));
        assert!(assignment.burned_after(&Watermark::at(at(1))));
        // The watermark boundary itself was already synced
        assert!(!assignment.burned_after(&Watermark::at(at(2))));
        assert!(!assignment.burned_after(&Watermark::at(at(3))));
    }

    #[test]
    fn test_unburned_assignment_is_never_new() {
        let mut assignment = Assignment::burned(1, SubjectId(10), at(2));
        assignment.srs_stage = 8;
        assert!(!assignment.is_burned());
        assert!(!assignment.burned_after(&Watermark::empty()));

        assignment.srs_stage = BURNED_SRS_STAGE;
        assignment.burned_at = None;
        assert!(!assignment.burned_after(&Watermark::empty()));
    }
}
