use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Submission {
    pub id: String,
    pub team_id: Option<String>,
    pub contact_id: Option<String>,
    pub milestone_id: Option<String>,
    pub milestone_name: Option<String>,
    pub link: Option<String>,
    pub status: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SubmissionDraft {
    pub team_id: Option<String>,
    pub contact_id: Option<String>,
    pub milestone_id: String,
    pub link: Option<String>,
}
