use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum PartnershipStatus {
    #[default]
    Pending,
    Active,
    Ended,
}

impl PartnershipStatus {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "active" => PartnershipStatus::Active,
            Some(v) if v == "ended" || v == "inactive" || v == "expired" => PartnershipStatus::Ended,
            _ => PartnershipStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartnershipStatus::Pending => "Pending",
            PartnershipStatus::Active => "Active",
            PartnershipStatus::Ended => "Ended",
        }
    }

    /// Pending -> Active -> Ended, or Pending -> Ended. Ended is terminal.
    pub fn can_transition_to(&self, next: PartnershipStatus) -> bool {
        use PartnershipStatus::*;
        matches!((self, next), (Pending, Active) | (Pending, Ended) | (Active, Ended))
    }
}

impl std::fmt::Display for PartnershipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Partnership {
    pub id: String,
    pub institution_id: String,
    pub initiative_id: String,
    pub initiative_name: Option<String>,
    pub status: PartnershipStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PartnershipDraft {
    pub institution_id: String,
    pub initiative_id: String,
    pub status: Option<PartnershipStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use PartnershipStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Pending.can_transition_to(Ended));
        assert!(Active.can_transition_to(Ended));
        assert!(!Ended.can_transition_to(Active));
        assert!(!Active.can_transition_to(Pending));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(PartnershipStatus::parse(Some("Active")), PartnershipStatus::Active);
        assert_eq!(PartnershipStatus::parse(Some("expired")), PartnershipStatus::Ended);
        assert_eq!(PartnershipStatus::parse(None), PartnershipStatus::Pending);
    }
}
