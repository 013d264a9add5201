use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationWindow {
    NotYetOpen,
    Open,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Event {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub registration_opens: Option<DateTime<Utc>>,
    pub registration_closes: Option<DateTime<Utc>>,
    /// `None` means unlimited.
    pub capacity: Option<u32>,
    pub registered_contact_ids: Vec<String>,
    pub program_id: Option<String>,
    pub cohort_id: Option<String>,
}

impl Event {
    pub fn registration_count(&self) -> u32 {
        self.registered_contact_ids.len() as u32
    }

    pub fn is_full(&self) -> bool {
        self.capacity
            .map_or(false, |capacity| self.registration_count() >= capacity)
    }

    pub fn spots_left(&self) -> Option<u32> {
        self.capacity
            .map(|capacity| capacity.saturating_sub(self.registration_count()))
    }

    pub fn is_registered(&self, contact_id: &str) -> bool {
        self.registered_contact_ids.iter().any(|id| id == contact_id)
    }

    /// Registration closes at the explicit close time, or when the event starts.
    pub fn registration_window(&self, now: DateTime<Utc>) -> RegistrationWindow {
        if self.registration_opens.map_or(false, |opens| now < opens) {
            return RegistrationWindow::NotYetOpen;
        }
        let closes = self.registration_closes.or(self.start);
        if closes.map_or(false, |closes| now >= closes) {
            return RegistrationWindow::Closed;
        }
        RegistrationWindow::Open
    }

    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        match (self.end, self.start) {
            (Some(end), _) => end >= now,
            (None, Some(start)) => start >= now,
            (None, None) => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct EventDraft {
    pub name: String,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub registration_opens: Option<DateTime<Utc>>,
    pub registration_closes: Option<DateTime<Utc>>,
    pub capacity: Option<u32>,
    pub program_id: Option<String>,
    pub cohort_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event_with(capacity: Option<u32>, registered: &[&str]) -> Event {
        Event {
            id: "e1".to_string(),
            name: "Demo Day".to_string(),
            capacity,
            registered_contact_ids: registered.iter().map(|s| s.to_string()).collect(),
            ..Event::default()
        }
    }

    #[test]
    fn test_capacity_helpers() {
        let event = event_with(Some(2), &["u1", "u2"]);
        assert!(event.is_full());
        assert_eq!(event.spots_left(), Some(0));
        assert!(event.is_registered("u2"));

        let unlimited = event_with(None, &["u1"]);
        assert!(!unlimited.is_full());
        assert_eq!(unlimited.spots_left(), None);
    }

    #[test]
    fn test_registration_window() {
        let now = Utc::now();
        let mut event = event_with(None, &[]);
        assert_eq!(event.registration_window(now), RegistrationWindow::Open);

        event.registration_opens = Some(now + Duration::days(1));
        assert_eq!(event.registration_window(now), RegistrationWindow::NotYetOpen);

        event.registration_opens = None;
        event.start = Some(now - Duration::hours(1));
        assert_eq!(event.registration_window(now), RegistrationWindow::Closed);

        event.registration_closes = Some(now + Duration::hours(1));
        assert_eq!(event.registration_window(now), RegistrationWindow::Open);
    }

    #[test]
    fn test_is_upcoming() {
        let now = Utc::now();
        let mut event = event_with(None, &[]);
        assert!(!event.is_upcoming(now));
        event.start = Some(now - Duration::hours(2));
        event.end = Some(now + Duration::hours(1));
        assert!(event.is_upcoming(now));
        event.end = None;
        assert!(!event.is_upcoming(now));
    }
}
