use serde::{Deserialize, Serialize};

use super::CohortDetails;

/// One contact's participation in one cohort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ParticipationRecord {
    pub id: String,
    pub contact_id: String,
    pub cohort_id: String,
    pub team_id: Option<String>,
    pub status: Option<String>,
    /// Role the contact holds in the cohort (participant, mentor, ...).
    pub capacity: Option<String>,
    /// `None` when the cohort could not be resolved within the budget.
    pub cohort: Option<CohortDetails>,
}

impl ParticipationRecord {
    pub fn initiative_id(&self) -> Option<&str> {
        self.cohort
            .as_ref()
            .and_then(|c| c.initiative_details.as_ref())
            .map(|i| i.id.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ParticipationDraft {
    pub contact_id: String,
    pub cohort_id: String,
    pub team_id: Option<String>,
    pub capacity: Option<String>,
    pub status: Option<String>,
}
