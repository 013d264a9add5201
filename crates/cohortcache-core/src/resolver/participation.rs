use std::collections::HashMap;

use tracing::info;

use super::{join_within, ResolveMeta, Resolved, Resolver};
use crate::api::{Filter, ListQuery};
use crate::cache::{keys, Volatility};
use crate::error::{DataError, ValidationError};
use crate::models::{
    Cohort, CohortDetails, Contact, Initiative, ParticipationDraft, ParticipationRecord, Team,
};
use crate::revalidate::{EntityKind, Mutation, Relation};
use crate::schema::{fields, FromRecord, ToFields};

impl Resolver {
    /// Every cohort the contact takes part in, each joined with its cohort
    /// details. Records whose cohort could not be resolved in time keep
    /// `cohort: None` and are listed in `meta.missing`.
    pub async fn get_participation_records(
        &self,
        contact_id: &str,
    ) -> Resolved<Vec<ParticipationRecord>> {
        self.read("get_participation_records", |budget| async move {
            let query = ListQuery::filtered(Filter::contains(
                fields::participation::CONTACT.ids,
                contact_id,
            ));
            let mut records: Vec<ParticipationRecord> = budget
                .run(
                    "participation rows",
                    self.cached_list(
                        &self.tables.participation,
                        keys::scoped_key(keys::PARTICIPATION, "contact", contact_id),
                        vec![
                            keys::PARTICIPATION.to_string(),
                            keys::child_tag("contact", contact_id, keys::PARTICIPATION),
                        ],
                        query,
                        Volatility::Volatile,
                    ),
                )
                .await?;

            let mut cohort_ids: Vec<String> = records.iter().map(|r| r.cohort_id.clone()).collect();
            cohort_ids.sort();
            cohort_ids.dedup();

            let pieces = cohort_ids
                .iter()
                .map(|id| (format!("cohort {}", id), self.cohort_details(id, budget)))
                .collect();

            let mut meta = ResolveMeta::default();
            let mut cohorts: HashMap<String, CohortDetails> = HashMap::new();
            for (id, (label, outcome)) in cohort_ids.iter().zip(join_within(budget, pieces).await) {
                match outcome {
                    Ok(details) => {
                        meta.merge(details.meta);
                        cohorts.insert(id.clone(), details.data);
                    }
                    Err(e) => meta.note(&label, &e),
                }
            }
            for record in &mut records {
                record.cohort = cohorts.get(&record.cohort_id).cloned();
            }
            Ok(Resolved::with_meta(records, meta))
        })
        .await
    }

    pub async fn create_participation(
        &self,
        draft: ParticipationDraft,
    ) -> Result<ParticipationRecord, DataError> {
        let this = self.clone();
        self.mutate("create_participation", async move {
            this.create_participation_now(draft).await
        })
        .await
    }

    async fn create_participation_now(
        &self,
        draft: ParticipationDraft,
    ) -> Result<ParticipationRecord, DataError> {
        super::required(&draft.contact_id, "contact_id")?;
        super::required(&draft.cohort_id, "cohort_id")?;
        let _guard = self
            .locks
            .lock(keys::scoped_key(keys::PARTICIPATION, &draft.contact_id, &draft.cohort_id))
            .await;

        let _contact: Contact = self.fresh(&self.tables.contacts, &draft.contact_id).await?;
        let cohort: Cohort = self.fresh(&self.tables.cohorts, &draft.cohort_id).await?;
        if let Some(initiative_id) = &cohort.initiative_id {
            let initiative: Initiative = self.fresh(&self.tables.initiatives, initiative_id).await?;
            if initiative.requires_team() && draft.team_id.is_none() {
                return Err(ValidationError::TeamRequired.into());
            }
        }
        if let Some(team_id) = &draft.team_id {
            let _team: Team = self.fresh(&self.tables.teams, team_id).await?;
        }

        use fields::participation as f;
        let existing = ListQuery::filtered(Filter::And(vec![
            Filter::contains(f::CONTACT.ids, draft.contact_id.as_str()),
            Filter::contains(f::COHORT.ids, draft.cohort_id.as_str()),
        ]))
        .limit(1);
        if !self.tables.participation.list(&existing).await?.is_empty() {
            return Err(ValidationError::DuplicateParticipation.into());
        }

        let record = self.tables.participation.create(draft.to_fields()).await?;
        let participation = ParticipationRecord::from_record(&record)?;

        self.revalidate(
            Mutation::new(EntityKind::Participation, participation.id.as_str())
                .with(Relation::Contact, draft.contact_id.as_str())
                .with(Relation::Cohort, draft.cohort_id.as_str()),
        );
        info!(
            contact = %draft.contact_id,
            cohort = %draft.cohort_id,
            "Created participation"
        );
        Ok(participation)
    }
}
