//! Initiatives ("programs") and the cohorts that run them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ParticipationType {
    #[default]
    Individual,
    Team,
}

impl ParticipationType {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "team" || v == "teams" => ParticipationType::Team,
            _ => ParticipationType::Individual,
        }
    }
}

impl std::fmt::Display for ParticipationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParticipationType::Individual => write!(f, "Individual"),
            ParticipationType::Team => write!(f, "Team"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Initiative {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub participation_type: ParticipationType,
    pub max_team_size: Option<u32>,
}

impl Initiative {
    pub fn requires_team(&self) -> bool {
        self.participation_type == ParticipationType::Team
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Cohort {
    pub id: String,
    pub name: String,
    pub initiative_id: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub topic_ids: Vec<String>,
    pub class_ids: Vec<String>,
}

impl Cohort {
    pub fn is_running_on(&self, day: NaiveDate) -> bool {
        let started = self.start_date.map_or(true, |s| s <= day);
        let not_ended = self.end_date.map_or(true, |e| day <= e);
        started && not_ended
    }
}

/// A cohort joined with its initiative and the names behind its topic and
/// class references. Pieces that could not be resolved are left empty and
/// recorded in the resolver metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CohortDetails {
    #[serde(flatten)]
    pub cohort: Cohort,
    pub initiative_details: Option<Initiative>,
    pub topic_names: Vec<String>,
    pub class_names: Vec<String>,
}

impl CohortDetails {
    pub fn id(&self) -> &str {
        &self.cohort.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participation_type_parse() {
        assert_eq!(ParticipationType::parse(Some("Team")), ParticipationType::Team);
        assert_eq!(ParticipationType::parse(Some(" team ")), ParticipationType::Team);
        assert_eq!(ParticipationType::parse(Some("Individual")), ParticipationType::Individual);
        assert_eq!(ParticipationType::parse(None), ParticipationType::Individual);
    }

    #[test]
    fn test_cohort_running_window() {
        let cohort = Cohort {
            start_date: NaiveDate::from_ymd_opt(2024, 9, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 15),
            ..Cohort::default()
        };
        let day = |m, d| NaiveDate::from_ymd_opt(2024, m, d).unwrap_or_default();
        assert!(cohort.is_running_on(day(10, 1)));
        assert!(cohort.is_running_on(day(12, 15)));
        assert!(!cohort.is_running_on(day(8, 31)));
    }

    #[test]
    fn test_cohort_details_serializes_initiative_details() {
        let details = CohortDetails {
            cohort: Cohort {
                id: "c1".to_string(),
                name: "Fall".to_string(),
                ..Cohort::default()
            },
            initiative_details: Some(Initiative {
                id: "i1".to_string(),
                name: "Robotics".to_string(),
                participation_type: ParticipationType::Team,
                ..Initiative::default()
            }),
            ..CohortDetails::default()
        };
        let json = serde_json::to_value(&details).expect("serialize");
        assert_eq!(json["id"], "c1");
        assert_eq!(json["initiativeDetails"]["id"], "i1");
        assert_eq!(json["initiativeDetails"]["participationType"], "Team");
    }
}
