use serde::{Deserialize, Serialize};

/// Review state of a contact's pending profile edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ProfileEditState {
    Pending,
    Approved,
    Rejected,
}

impl ProfileEditState {
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value?.trim().to_ascii_lowercase().as_str() {
            "pending" | "submitted" => Some(ProfileEditState::Pending),
            "approved" => Some(ProfileEditState::Approved),
            "rejected" | "declined" => Some(ProfileEditState::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileEditState::Pending => "Pending",
            ProfileEditState::Approved => "Approved",
            ProfileEditState::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for ProfileEditState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Contact {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    /// Identifier issued by the external auth provider.
    pub auth_id: Option<String>,
    /// Institution ids the contact studied or works at.
    pub education: Vec<String>,
    pub institution_names: Vec<String>,
    pub profile_edit: Option<ProfileEditState>,
}

impl Contact {
    pub fn full_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (false, true) => self.first_name.clone(),
            (true, false) => self.last_name.clone(),
            (true, true) => self.email.clone().unwrap_or_default(),
        }
    }
}

/// Fields a contact may change on their own profile. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ContactUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub education: Option<Vec<String>>,
    pub profile_edit: Option<ProfileEditState>,
}

impl ContactUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.education.is_none()
            && self.profile_edit.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_fallbacks() {
        let mut contact = Contact {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            ..Contact::default()
        };
        assert_eq!(contact.full_name(), "Ada Lovelace");
        contact.last_name.clear();
        assert_eq!(contact.full_name(), "Ada");
        contact.first_name.clear();
        contact.email = Some("ada@example.org".to_string());
        assert_eq!(contact.full_name(), "ada@example.org");
    }

    #[test]
    fn test_profile_edit_state_parse() {
        assert_eq!(ProfileEditState::parse(Some("Pending")), Some(ProfileEditState::Pending));
        assert_eq!(ProfileEditState::parse(Some(" approved ")), Some(ProfileEditState::Approved));
        assert_eq!(ProfileEditState::parse(Some("???")), None);
        assert_eq!(ProfileEditState::parse(None), None);
    }
}
