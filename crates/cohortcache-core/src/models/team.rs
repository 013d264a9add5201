use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum MembershipStatus {
    #[default]
    Active,
    Inactive,
}

impl MembershipStatus {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "inactive" || v == "removed" || v == "left" => MembershipStatus::Inactive,
            _ => MembershipStatus::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "Active",
            MembershipStatus::Inactive => "Inactive",
        }
    }
}

impl std::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct TeamMember {
    /// Id of the membership row linking contact and team.
    pub membership_id: String,
    pub contact_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub status: MembershipStatus,
    pub points: i64,
}

impl TeamMember {
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Team {
    pub id: String,
    pub name: String,
    pub cohort_id: Option<String>,
    /// Unique by contact id.
    pub members: Vec<TeamMember>,
    /// Point total as recorded on the team.
    pub points: i64,
    pub submission_ids: Vec<String>,
}

impl Team {
    pub fn active_members(&self) -> impl Iterator<Item = &TeamMember> {
        self.members.iter().filter(|m| m.is_active())
    }

    pub fn active_member_count(&self) -> usize {
        self.active_members().count()
    }

    /// Points earned by active members only.
    pub fn active_points(&self) -> i64 {
        self.active_members().map(|m| m.points).sum()
    }

    pub fn member(&self, contact_id: &str) -> Option<&TeamMember> {
        self.members.iter().find(|m| m.contact_id == contact_id)
    }
}

/// Keep one membership per contact. An active row wins over an inactive
/// one; otherwise the first row seen is kept.
pub fn dedupe_members(members: Vec<TeamMember>) -> Vec<TeamMember> {
    let mut unique: Vec<TeamMember> = Vec::with_capacity(members.len());
    for member in members {
        match unique.iter_mut().find(|m| m.contact_id == member.contact_id) {
            Some(existing) => {
                if !existing.is_active() && member.is_active() {
                    *existing = member;
                }
            }
            None => unique.push(member),
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, contact: &str, status: MembershipStatus, points: i64) -> TeamMember {
        TeamMember {
            membership_id: id.to_string(),
            contact_id: contact.to_string(),
            status,
            points,
            ..TeamMember::default()
        }
    }

    #[test]
    fn test_dedupe_prefers_active_rows() {
        let members = dedupe_members(vec![
            member("m1", "u1", MembershipStatus::Inactive, 5),
            member("m2", "u2", MembershipStatus::Active, 10),
            member("m3", "u1", MembershipStatus::Active, 7),
            member("m4", "u2", MembershipStatus::Inactive, 1),
        ]);
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].membership_id, "m3");
        assert_eq!(members[1].membership_id, "m2");
    }

    #[test]
    fn test_only_active_members_count() {
        let team = Team {
            id: "t1".to_string(),
            members: vec![
                member("m1", "u1", MembershipStatus::Active, 30),
                member("m2", "u2", MembershipStatus::Inactive, 50),
                member("m3", "u3", MembershipStatus::Active, 20),
            ],
            ..Team::default()
        };
        assert_eq!(team.active_member_count(), 2);
        assert_eq!(team.active_points(), 50);
        assert!(team.member("u2").is_some());
    }

    #[test]
    fn test_membership_status_parse() {
        assert_eq!(MembershipStatus::parse(Some("Inactive")), MembershipStatus::Inactive);
        assert_eq!(MembershipStatus::parse(Some("Active")), MembershipStatus::Active);
        assert_eq!(MembershipStatus::parse(None), MembershipStatus::Active);
    }
}
