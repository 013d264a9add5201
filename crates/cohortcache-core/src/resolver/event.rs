use chrono::Utc;
use serde_json::json;
use tracing::info;

use super::{Resolved, Resolver};
use crate::api::{Fields, Filter, ListQuery, SortDirection};
use crate::cache::{keys, Volatility};
use crate::error::{DataError, ValidationError};
use crate::models::{Cohort, Contact, Event, EventDraft, Initiative, RegistrationWindow};
use crate::revalidate::{EntityKind, Mutation, Relation};
use crate::schema::fields::event as f;
use crate::schema::{FromRecord, ToFields};

fn by_start() -> ListQuery {
    ListQuery::all().sort_by(f::START, SortDirection::Asc)
}

impl Resolver {
    pub async fn get_event(&self, id: &str) -> Resolved<Option<Event>> {
        self.read("get_event", |budget| async move {
            let event = budget
                .run(
                    "get_event",
                    self.cached_find(&self.tables.events, keys::EVENTS, id, Volatility::Events),
                )
                .await?;
            Ok(Resolved::ok(event))
        })
        .await
    }

    /// Events that have not ended yet, soonest first.
    pub async fn get_upcoming_events(&self) -> Resolved<Vec<Event>> {
        self.read("get_upcoming_events", |budget| async move {
            let events: Vec<Event> = budget
                .run(
                    "get_upcoming_events",
                    self.cached_list(
                        &self.tables.events,
                        keys::key(keys::EVENTS, keys::UPCOMING_EVENTS),
                        keys::tags(&[keys::EVENTS, keys::UPCOMING_EVENTS]),
                        by_start(),
                        Volatility::Events,
                    ),
                )
                .await?;
            let now = Utc::now();
            Ok(Resolved::ok(events.into_iter().filter(|e| e.is_upcoming(now)).collect()))
        })
        .await
    }

    pub async fn get_program_events(&self, program_id: &str) -> Resolved<Vec<Event>> {
        self.scoped_events("get_program_events", "program", f::PROGRAM.ids, program_id)
            .await
    }

    pub async fn get_cohort_events(&self, cohort_id: &str) -> Resolved<Vec<Event>> {
        self.scoped_events("get_cohort_events", "cohort", f::COHORT.ids, cohort_id)
            .await
    }

    /// Events linked to one parent, tagged `<parent>:<id>:events`.
    async fn scoped_events(
        &self,
        operation: &'static str,
        parent: &'static str,
        ids_field: &'static str,
        parent_id: &str,
    ) -> Resolved<Vec<Event>> {
        self.read(operation, |budget| async move {
            let query = ListQuery::filtered(Filter::contains(ids_field, parent_id))
                .sort_by(f::START, SortDirection::Asc);
            let events = budget
                .run(
                    operation,
                    self.cached_list(
                        &self.tables.events,
                        keys::scoped_key(keys::EVENTS, parent, parent_id),
                        vec![
                            keys::EVENTS.to_string(),
                            keys::child_tag(parent, parent_id, keys::EVENTS),
                        ],
                        query,
                        Volatility::Events,
                    ),
                )
                .await?;
            Ok(Resolved::ok(events))
        })
        .await
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub async fn create_event(&self, draft: EventDraft) -> Result<Event, DataError> {
        let this = self.clone();
        self.mutate("create_event", async move { this.create_event_now(draft).await })
            .await
    }

    pub async fn register_contact_for_event(
        &self,
        event_id: &str,
        contact_id: &str,
    ) -> Result<Event, DataError> {
        let this = self.clone();
        let (event_id, contact_id) = (event_id.to_string(), contact_id.to_string());
        self.mutate("register_contact_for_event", async move {
            this.register_now(&event_id, &contact_id).await
        })
        .await
    }

    pub async fn cancel_event_registration(
        &self,
        event_id: &str,
        contact_id: &str,
    ) -> Result<Event, DataError> {
        let this = self.clone();
        let (event_id, contact_id) = (event_id.to_string(), contact_id.to_string());
        self.mutate("cancel_event_registration", async move {
            this.cancel_now(&event_id, &contact_id).await
        })
        .await
    }

    async fn create_event_now(&self, draft: EventDraft) -> Result<Event, DataError> {
        super::required(&draft.name, "name")?;
        if let (Some(start), Some(end)) = (draft.start, draft.end) {
            if end <= start {
                return Err(ValidationError::InvalidDateRange.into());
            }
        }
        if let (Some(opens), Some(closes)) = (draft.registration_opens, draft.registration_closes) {
            if closes <= opens {
                return Err(ValidationError::InvalidDateRange.into());
            }
        }
        if draft.capacity == Some(0) {
            return Err(ValidationError::Invalid("capacity must be greater than zero".to_string()).into());
        }
        if let Some(program_id) = &draft.program_id {
            let _program: Initiative = self.fresh(&self.tables.initiatives, program_id).await?;
        }
        if let Some(cohort_id) = &draft.cohort_id {
            let _cohort: Cohort = self.fresh(&self.tables.cohorts, cohort_id).await?;
        }

        let record = self.tables.events.create(draft.to_fields()).await?;
        let event = Event::from_record(&record)?;

        self.revalidate(
            Mutation::new(EntityKind::Event, event.id.as_str())
                .with(Relation::Event, event.id.as_str())
                .with_opt(Relation::Program, event.program_id.as_deref())
                .with_opt(Relation::Cohort, event.cohort_id.as_deref()),
        );
        info!(event = %event.id, name = %event.name, "Created event");
        Ok(event)
    }

    async fn register_now(&self, event_id: &str, contact_id: &str) -> Result<Event, DataError> {
        super::required(contact_id, "contact_id")?;
        let _guard = self.locks.lock(keys::key(keys::EVENTS, event_id)).await;

        let event: Event = self.fresh(&self.tables.events, event_id).await?;
        let _contact: Contact = self.fresh(&self.tables.contacts, contact_id).await?;

        if event.registration_window(Utc::now()) != RegistrationWindow::Open {
            return Err(ValidationError::RegistrationClosed.into());
        }
        if event.is_registered(contact_id) {
            return Err(ValidationError::AlreadyRegistered.into());
        }
        if let (true, Some(capacity)) = (event.is_full(), event.capacity) {
            return Err(ValidationError::CapacityExceeded { capacity }.into());
        }

        let mut registered = event.registered_contact_ids.clone();
        registered.push(contact_id.to_string());
        let updated = self.write_registrations(&event, registered).await?;
        info!(
            event = event_id,
            contact = contact_id,
            count = updated.registration_count(),
            "Registered contact for event"
        );
        Ok(updated)
    }

    async fn cancel_now(&self, event_id: &str, contact_id: &str) -> Result<Event, DataError> {
        let _guard = self.locks.lock(keys::key(keys::EVENTS, event_id)).await;

        let event: Event = self.fresh(&self.tables.events, event_id).await?;
        if !event.is_registered(contact_id) {
            return Err(ValidationError::NotRegistered.into());
        }
        let registered: Vec<String> = event
            .registered_contact_ids
            .iter()
            .filter(|id| id.as_str() != contact_id)
            .cloned()
            .collect();
        let updated = self.write_registrations(&event, registered).await?;
        info!(event = event_id, contact = contact_id, "Cancelled event registration");
        Ok(updated)
    }

    async fn write_registrations(&self, event: &Event, registered: Vec<String>) -> Result<Event, DataError> {
        let mut update = Fields::new();
        update.insert(f::REGISTERED.to_string(), json!(registered));
        let record = self.tables.events.update(&event.id, update).await?;
        let updated = Event::from_record(&record)?;

        self.revalidate(
            Mutation::new(EntityKind::EventRegistration, event.id.as_str())
                .with(Relation::Event, event.id.as_str())
                .with_opt(Relation::Program, event.program_id.as_deref())
                .with_opt(Relation::Cohort, event.cohort_id.as_deref()),
        );
        Ok(updated)
    }
}
