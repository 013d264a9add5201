//! Conversion between raw records and the typed DTOs.
//!
//! Linked-record and lookup columns arrive as arrays; single-value readers take
//! the first element. Empty strings read as missing.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{json, Value};

use super::fields;
use crate::api::{Fields, Record};
use crate::error::DataError;
use crate::models::{
    Cohort, Contact, ContactUpdate, Event, EventDraft, Initiative, Institution,
    MembershipStatus, ParticipationDraft, ParticipationRecord, ParticipationType, Partnership,
    PartnershipDraft, PartnershipStatus, ProfileEditState, Reward, Submission, SubmissionDraft,
    Team, TeamMember,
};

/// Typed accessors over one record's fields.
pub struct FieldReader<'a> {
    record: &'a Record,
}

impl<'a> FieldReader<'a> {
    pub fn new(record: &'a Record) -> Self {
        Self { record }
    }

    fn raw(&self, name: &str) -> Option<&'a Value> {
        match self.record.fields.get(name)? {
            Value::Array(items) => items.first(),
            Value::Null => None,
            other => Some(other),
        }
    }

    pub fn text(&self, name: &str) -> Option<String> {
        let value = match self.raw(name)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// All string elements of an array column (linked records, lookups,
    /// multi-selects). A plain string reads as a one-element list.
    pub fn texts(&self, name: &str) -> Vec<String> {
        match self.record.fields.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        }
    }

    pub fn links(&self, name: &str) -> Vec<String> {
        self.texts(name)
    }

    pub fn first_link(&self, name: &str) -> Option<String> {
        self.texts(name).into_iter().next()
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.raw(name)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.raw(name)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            _ => None,
        }
    }

    /// `YYYY-MM-DD`, or the date part of a timestamp.
    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        let text = self.text(name)?;
        let day = text.get(..10).unwrap_or(&text);
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }

    /// RFC 3339 timestamp; a bare date reads as midnight UTC.
    pub fn datetime(&self, name: &str) -> Option<DateTime<Utc>> {
        let text = self.text(name)?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&text) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }
}

pub trait FromRecord: Sized {
    const ENTITY: &'static str;

    fn from_record(record: &Record) -> Result<Self, DataError>;
}

/// Rows of the small lookup tables (topics, classes, milestones).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedRecord {
    pub id: String,
    pub name: String,
}

impl FromRecord for NamedRecord {
    const ENTITY: &'static str = "record";

    fn from_record(record: &Record) -> Result<Self, DataError> {
        let r = FieldReader::new(record);
        Ok(Self {
            id: record.id.clone(),
            name: r.text(fields::named::NAME).unwrap_or_default(),
        })
    }
}

impl FromRecord for Contact {
    const ENTITY: &'static str = "contact";

    fn from_record(record: &Record) -> Result<Self, DataError> {
        use fields::contact as f;
        let r = FieldReader::new(record);
        Ok(Self {
            id: record.id.clone(),
            first_name: r.text(f::FIRST_NAME).unwrap_or_default(),
            last_name: r.text(f::LAST_NAME).unwrap_or_default(),
            email: r.text(f::EMAIL),
            auth_id: r.text(f::AUTH_ID),
            education: r.links(f::EDUCATION.link),
            institution_names: r.texts(f::INSTITUTION_NAMES),
            profile_edit: ProfileEditState::parse(r.text(f::PROFILE_EDIT).as_deref()),
        })
    }
}

impl FromRecord for Institution {
    const ENTITY: &'static str = "institution";

    fn from_record(record: &Record) -> Result<Self, DataError> {
        use fields::institution as f;
        let r = FieldReader::new(record);
        Ok(Self {
            id: record.id.clone(),
            name: r.text(f::NAME).unwrap_or_default(),
            street: r.text(f::STREET),
            city: r.text(f::CITY),
            state: r.text(f::STATE),
            postal_code: r.text(f::POSTAL_CODE),
            country: r.text(f::COUNTRY),
        })
    }
}

impl FromRecord for Initiative {
    const ENTITY: &'static str = "initiative";

    fn from_record(record: &Record) -> Result<Self, DataError> {
        use fields::initiative as f;
        let r = FieldReader::new(record);
        Ok(Self {
            id: record.id.clone(),
            name: r.text(f::NAME).unwrap_or_default(),
            description: r.text(f::DESCRIPTION),
            participation_type: ParticipationType::parse(r.text(f::PARTICIPATION_TYPE).as_deref()),
            max_team_size: r
                .int(f::MAX_TEAM_SIZE)
                .filter(|n| *n > 0)
                .map(|n| n as u32),
        })
    }
}

impl FromRecord for Cohort {
    const ENTITY: &'static str = "cohort";

    fn from_record(record: &Record) -> Result<Self, DataError> {
        use fields::cohort as f;
        let r = FieldReader::new(record);
        Ok(Self {
            id: record.id.clone(),
            name: r.text(f::NAME).unwrap_or_default(),
            initiative_id: r.first_link(f::INITIATIVE.link),
            status: r.text(f::STATUS),
            start_date: r.date(f::START_DATE),
            end_date: r.date(f::END_DATE),
            topic_ids: r.links(f::TOPICS),
            class_ids: r.links(f::CLASSES),
        })
    }
}

/// A membership row. Name and email come from the contact and are filled
/// in by the resolver.
impl FromRecord for TeamMember {
    const ENTITY: &'static str = "team member";

    fn from_record(record: &Record) -> Result<Self, DataError> {
        use fields::member as f;
        let r = FieldReader::new(record);
        let contact_id = r.first_link(f::CONTACT.link).ok_or_else(|| {
            DataError::Schema(format!("membership {} has no contact", record.id))
        })?;
        Ok(Self {
            membership_id: record.id.clone(),
            contact_id,
            name: None,
            email: None,
            status: MembershipStatus::parse(r.text(f::STATUS).as_deref()),
            points: r.int(f::POINTS).unwrap_or(0),
        })
    }
}

/// The team row alone; members are joined by the resolver.
impl FromRecord for Team {
    const ENTITY: &'static str = "team";

    fn from_record(record: &Record) -> Result<Self, DataError> {
        use fields::team as f;
        let r = FieldReader::new(record);
        Ok(Self {
            id: record.id.clone(),
            name: r.text(f::NAME).unwrap_or_default(),
            cohort_id: r.first_link(f::COHORT),
            members: Vec::new(),
            points: r.int(f::POINTS).unwrap_or(0),
            submission_ids: r.links(f::SUBMISSIONS),
        })
    }
}

impl FromRecord for ParticipationRecord {
    const ENTITY: &'static str = "participation";

    fn from_record(record: &Record) -> Result<Self, DataError> {
        use fields::participation as f;
        let r = FieldReader::new(record);
        let contact_id = r.first_link(f::CONTACT.link).ok_or_else(|| {
            DataError::Schema(format!("participation {} has no contact", record.id))
        })?;
        let cohort_id = r.first_link(f::COHORT.link).ok_or_else(|| {
            DataError::Schema(format!("participation {} has no cohort", record.id))
        })?;
        Ok(Self {
            id: record.id.clone(),
            contact_id,
            cohort_id,
            team_id: r.first_link(f::TEAM),
            status: r.text(f::STATUS),
            capacity: r.text(f::CAPACITY),
            cohort: None,
        })
    }
}

impl FromRecord for Submission {
    const ENTITY: &'static str = "submission";

    fn from_record(record: &Record) -> Result<Self, DataError> {
        use fields::submission as f;
        let r = FieldReader::new(record);
        Ok(Self {
            id: record.id.clone(),
            team_id: r.first_link(f::TEAM.link),
            contact_id: r.first_link(f::CONTACT),
            milestone_id: r.first_link(f::MILESTONE),
            milestone_name: None,
            link: r.text(f::LINK),
            status: r.text(f::STATUS),
            submitted_at: r.datetime(f::SUBMITTED_AT),
        })
    }
}

impl FromRecord for Event {
    const ENTITY: &'static str = "event";

    fn from_record(record: &Record) -> Result<Self, DataError> {
        use fields::event as f;
        let r = FieldReader::new(record);
        Ok(Self {
            id: record.id.clone(),
            name: r.text(f::NAME).unwrap_or_default(),
            description: r.text(f::DESCRIPTION),
            start: r.datetime(f::START),
            end: r.datetime(f::END),
            registration_opens: r.datetime(f::REGISTRATION_OPENS),
            registration_closes: r.datetime(f::REGISTRATION_CLOSES),
            capacity: r.int(f::CAPACITY).filter(|n| *n >= 0).map(|n| n as u32),
            registered_contact_ids: r.links(f::REGISTERED),
            program_id: r.first_link(f::PROGRAM.link),
            cohort_id: r.first_link(f::COHORT.link),
        })
    }
}

impl FromRecord for Partnership {
    const ENTITY: &'static str = "partnership";

    fn from_record(record: &Record) -> Result<Self, DataError> {
        use fields::partnership as f;
        let r = FieldReader::new(record);
        let institution_id = r.first_link(f::INSTITUTION.link).ok_or_else(|| {
            DataError::Schema(format!("partnership {} has no institution", record.id))
        })?;
        let initiative_id = r.first_link(f::INITIATIVE.link).ok_or_else(|| {
            DataError::Schema(format!("partnership {} has no initiative", record.id))
        })?;
        Ok(Self {
            id: record.id.clone(),
            institution_id,
            initiative_id,
            initiative_name: None,
            status: PartnershipStatus::parse(r.text(f::STATUS).as_deref()),
            start_date: r.date(f::START_DATE),
            end_date: r.date(f::END_DATE),
        })
    }
}

impl FromRecord for Reward {
    const ENTITY: &'static str = "reward";

    fn from_record(record: &Record) -> Result<Self, DataError> {
        use fields::reward as f;
        let r = FieldReader::new(record);
        Ok(Self {
            id: record.id.clone(),
            name: r.text(f::NAME).unwrap_or_default(),
            description: r.text(f::DESCRIPTION),
            cost: r.int(f::COST).unwrap_or(0),
            // An unchecked checkbox is omitted from the record.
            available: r.bool(f::AVAILABLE).unwrap_or(false),
        })
    }
}

/// Map every record, failing on the first malformed one.
pub fn map_records<T: FromRecord>(records: &[Record]) -> Result<Vec<T>, DataError> {
    records.iter().map(T::from_record).collect()
}

// ============================================================================
// Writes
// ============================================================================

/// Render a value type as the external field map for a create or update.
pub trait ToFields {
    fn to_fields(&self) -> Fields;
}

fn put_text(out: &mut Fields, name: &str, value: &Option<String>) {
    if let Some(v) = value {
        out.insert(name.to_string(), Value::String(v.clone()));
    }
}

fn put_link(out: &mut Fields, name: &str, id: &Option<String>) {
    if let Some(id) = id {
        out.insert(name.to_string(), json!([id]));
    }
}

fn put_datetime(out: &mut Fields, name: &str, value: &Option<DateTime<Utc>>) {
    if let Some(v) = value {
        out.insert(name.to_string(), Value::String(format_datetime(v)));
    }
}

fn put_date(out: &mut Fields, name: &str, value: &Option<NaiveDate>) {
    if let Some(v) = value {
        out.insert(name.to_string(), Value::String(v.format("%Y-%m-%d").to_string()));
    }
}

pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl ToFields for ContactUpdate {
    fn to_fields(&self) -> Fields {
        use fields::contact as f;
        let mut out = Fields::new();
        put_text(&mut out, f::FIRST_NAME, &self.first_name);
        put_text(&mut out, f::LAST_NAME, &self.last_name);
        put_text(&mut out, f::EMAIL, &self.email);
        if let Some(ids) = &self.education {
            out.insert(f::EDUCATION.link.to_string(), json!(ids));
        }
        if let Some(state) = &self.profile_edit {
            out.insert(f::PROFILE_EDIT.to_string(), json!(state.as_str()));
        }
        out
    }
}

impl ToFields for ParticipationDraft {
    fn to_fields(&self) -> Fields {
        use fields::participation as f;
        let mut out = Fields::new();
        out.insert(f::CONTACT.link.to_string(), json!([self.contact_id]));
        out.insert(f::COHORT.link.to_string(), json!([self.cohort_id]));
        put_link(&mut out, f::TEAM, &self.team_id);
        put_text(&mut out, f::CAPACITY, &self.capacity);
        put_text(&mut out, f::STATUS, &self.status);
        out
    }
}

impl ToFields for SubmissionDraft {
    fn to_fields(&self) -> Fields {
        use fields::submission as f;
        let mut out = Fields::new();
        put_link(&mut out, f::TEAM.link, &self.team_id);
        put_link(&mut out, f::CONTACT, &self.contact_id);
        out.insert(f::MILESTONE.to_string(), json!([self.milestone_id]));
        put_text(&mut out, f::LINK, &self.link);
        out
    }
}

impl ToFields for EventDraft {
    fn to_fields(&self) -> Fields {
        use fields::event as f;
        let mut out = Fields::new();
        out.insert(f::NAME.to_string(), json!(self.name.trim()));
        put_text(&mut out, f::DESCRIPTION, &self.description);
        put_datetime(&mut out, f::START, &self.start);
        put_datetime(&mut out, f::END, &self.end);
        put_datetime(&mut out, f::REGISTRATION_OPENS, &self.registration_opens);
        put_datetime(&mut out, f::REGISTRATION_CLOSES, &self.registration_closes);
        if let Some(capacity) = self.capacity {
            out.insert(f::CAPACITY.to_string(), json!(capacity));
        }
        put_link(&mut out, f::PROGRAM.link, &self.program_id);
        put_link(&mut out, f::COHORT.link, &self.cohort_id);
        out
    }
}

impl ToFields for PartnershipDraft {
    fn to_fields(&self) -> Fields {
        use fields::partnership as f;
        let mut out = Fields::new();
        out.insert(f::INSTITUTION.link.to_string(), json!([self.institution_id]));
        out.insert(f::INITIATIVE.link.to_string(), json!([self.initiative_id]));
        let status = self.status.unwrap_or_default();
        out.insert(f::STATUS.to_string(), json!(status.as_str()));
        put_date(&mut out, f::START_DATE, &self.start_date);
        put_date(&mut out, f::END_DATE, &self.end_date);
        out
    }
}

pub fn membership_fields(team_id: &str, contact_id: &str, status: MembershipStatus) -> Fields {
    use fields::member as f;
    let mut out = Fields::new();
    out.insert(f::TEAM.link.to_string(), json!([team_id]));
    out.insert(f::CONTACT.link.to_string(), json!([contact_id]));
    out.insert(f::STATUS.to_string(), json!(status.as_str()));
    out
}

pub fn claim_fields(user_id: &str, reward_id: &str, cost: i64) -> Fields {
    use fields::claimed_reward as f;
    let mut out = Fields::new();
    out.insert(f::CONTACT.link.to_string(), json!([user_id]));
    out.insert(f::REWARD.to_string(), json!([reward_id]));
    out.insert(f::COST.to_string(), json!(cost));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, fields: Value) -> Record {
        Record::new(id, fields.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_reader_handles_lookup_arrays_and_blanks() {
        let rec = record(
            "r1",
            json!({"Name": ["Spring"], "Blank": "  ", "Count": "7", "Flag": "Yes", "Ids": ["a", "", "b"]}),
        );
        let r = FieldReader::new(&rec);
        assert_eq!(r.text("Name").as_deref(), Some("Spring"));
        assert_eq!(r.text("Blank"), None);
        assert_eq!(r.int("Count"), Some(7));
        assert_eq!(r.bool("Flag"), Some(true));
        assert_eq!(r.links("Ids"), vec!["a", "b"]);
        assert_eq!(r.text("Missing"), None);
    }

    #[test]
    fn test_reader_dates() {
        let rec = record(
            "r1",
            json!({"Day": "2026-03-01", "Stamp": "2026-03-01T09:30:00.000Z", "Bad": "soon"}),
        );
        let r = FieldReader::new(&rec);
        assert_eq!(r.date("Day"), NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(r.date("Stamp"), NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(
            r.datetime("Stamp"),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap())
        );
        assert_eq!(
            r.datetime("Day"),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(r.datetime("Bad"), None);
    }

    #[test]
    fn test_contact_from_record() {
        let rec = record(
            "u1",
            json!({
                "First Name": "Ada",
                "Last Name": "Lovelace",
                "Email": "ada@example.org",
                "Auth ID": "auth|1",
                "Education": ["inst1"],
                "Institution (from Education)": ["Analytical College"],
                "Profile Edit Status": "Submitted"
            }),
        );
        let contact = Contact::from_record(&rec).unwrap();
        assert_eq!(contact.full_name(), "Ada Lovelace");
        assert_eq!(contact.education, vec!["inst1"]);
        assert_eq!(contact.institution_names, vec!["Analytical College"]);
        assert_eq!(contact.profile_edit, Some(ProfileEditState::Pending));
    }

    #[test]
    fn test_initiative_team_type() {
        let rec = record(
            "i1",
            json!({"Name": "Build Week", "Participation Type": "Team", "Max Team Size": 4}),
        );
        let initiative = Initiative::from_record(&rec).unwrap();
        assert!(initiative.requires_team());
        assert_eq!(initiative.max_team_size, Some(4));
    }

    #[test]
    fn test_participation_requires_cohort() {
        let rec = record("p1", json!({"Contacts": ["u1"]}));
        assert!(matches!(
            ParticipationRecord::from_record(&rec),
            Err(DataError::Schema(_))
        ));

        let rec = record("p1", json!({"Contacts": ["u1"], "Cohorts": ["c1"], "Team": ["t1"]}));
        let p = ParticipationRecord::from_record(&rec).unwrap();
        assert_eq!(p.cohort_id, "c1");
        assert_eq!(p.team_id.as_deref(), Some("t1"));
        assert!(p.cohort.is_none());
    }

    #[test]
    fn test_event_from_record() {
        let rec = record(
            "e1",
            json!({
                "Event Name": "Kickoff",
                "Start": "2026-05-01T17:00:00Z",
                "Capacity": 2,
                "Registered Contacts": ["u1"],
                "Initiative": ["p1"]
            }),
        );
        let event = Event::from_record(&rec).unwrap();
        assert_eq!(event.capacity, Some(2));
        assert_eq!(event.registration_count(), 1);
        assert_eq!(event.program_id.as_deref(), Some("p1"));
        assert!(event.registration_closes.is_none());
    }

    #[test]
    fn test_member_row_without_contact_is_schema_error() {
        let rec = record("m1", json!({"Team": ["t1"], "Status": "Active"}));
        assert!(TeamMember::from_record(&rec).is_err());
    }

    #[test]
    fn test_event_draft_writes_links_and_timestamps() {
        let draft = EventDraft {
            name: " Demo Day ".to_string(),
            start: Some(Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()),
            capacity: Some(30),
            program_id: Some("p1".to_string()),
            ..Default::default()
        };
        let out = draft.to_fields();
        assert_eq!(out.get("Event Name"), Some(&json!("Demo Day")));
        assert_eq!(out.get("Start"), Some(&json!("2026-06-01T12:00:00Z")));
        assert_eq!(out.get("Initiative"), Some(&json!(["p1"])));
        assert_eq!(out.get("Capacity"), Some(&json!(30)));
        assert!(!out.contains_key("End"));
        assert!(!out.contains_key("Cohort"));
    }

    #[test]
    fn test_partnership_draft_defaults_to_pending() {
        let draft = PartnershipDraft {
            institution_id: "inst1".to_string(),
            initiative_id: "i1".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 15),
            ..Default::default()
        };
        let out = draft.to_fields();
        assert_eq!(out.get("Status"), Some(&json!("Pending")));
        assert_eq!(out.get("Start Date"), Some(&json!("2026-01-15")));
        assert_eq!(out.get("Institution"), Some(&json!(["inst1"])));

        let back = Partnership::from_record(&Record::new("pa1", out)).unwrap();
        assert_eq!(back.status, PartnershipStatus::Pending);
        assert_eq!(back.initiative_id, "i1");
    }

    #[test]
    fn test_contact_update_only_sets_present_fields() {
        let update = ContactUpdate {
            last_name: Some("Byron".to_string()),
            ..Default::default()
        };
        let out = update.to_fields();
        assert_eq!(out.len(), 1);
        assert_eq!(out.get("Last Name"), Some(&json!("Byron")));
    }
}
