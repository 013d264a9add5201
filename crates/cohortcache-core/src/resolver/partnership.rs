use std::collections::HashMap;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use super::{join_within, ResolveMeta, Resolved, Resolver};
use crate::api::{Fields, Filter, ListQuery, SortDirection};
use crate::cache::{keys, Volatility};
use crate::error::{DataError, ValidationError};
use crate::models::{Initiative, Institution, Partnership, PartnershipDraft, PartnershipStatus};
use crate::revalidate::{EntityKind, Mutation, Relation};
use crate::schema::fields::partnership as f;
use crate::schema::{FromRecord, ToFields};

impl Resolver {
    /// An institution's partnerships, each labelled with its program name.
    pub async fn get_institution_partnerships(&self, institution_id: &str) -> Resolved<Vec<Partnership>> {
        self.read("get_institution_partnerships", |budget| async move {
            let query = ListQuery::filtered(Filter::contains(f::INSTITUTION.ids, institution_id))
                .sort_by(f::START_DATE, SortDirection::Desc);
            let mut partnerships: Vec<Partnership> = budget
                .run(
                    "partnerships",
                    self.cached_list(
                        &self.tables.partnerships,
                        keys::scoped_key(keys::PARTNERSHIPS, "institution", institution_id),
                        vec![
                            keys::PARTNERSHIPS.to_string(),
                            keys::child_tag("institution", institution_id, keys::PARTNERSHIPS),
                        ],
                        query,
                        Volatility::Slow,
                    ),
                )
                .await?;

            let mut initiative_ids: Vec<String> =
                partnerships.iter().map(|p| p.initiative_id.clone()).collect();
            initiative_ids.sort();
            initiative_ids.dedup();

            let pieces = initiative_ids
                .iter()
                .map(|id| (format!("initiative {}", id), self.cached_initiative(id)))
                .collect();
            let mut meta = ResolveMeta::default();
            let mut names: HashMap<String, String> = HashMap::new();
            for (id, (label, outcome)) in initiative_ids.iter().zip(join_within(budget, pieces).await) {
                match outcome {
                    Ok(Some(initiative)) => {
                        names.insert(id.clone(), initiative.name);
                    }
                    Ok(None) => meta.note(&label, &DataError::not_found("initiative", id.as_str())),
                    Err(e) => meta.note(&label, &e),
                }
            }
            for partnership in &mut partnerships {
                partnership.initiative_name = names.get(&partnership.initiative_id).cloned();
            }
            Ok(Resolved::with_meta(partnerships, meta))
        })
        .await
    }

    pub async fn create_partnership(&self, draft: PartnershipDraft) -> Result<Partnership, DataError> {
        let this = self.clone();
        self.mutate("create_partnership", async move { this.create_partnership_now(draft).await })
            .await
    }

    pub async fn update_partnership_status(
        &self,
        partnership_id: &str,
        status: PartnershipStatus,
    ) -> Result<Partnership, DataError> {
        let this = self.clone();
        let partnership_id = partnership_id.to_string();
        self.mutate("update_partnership_status", async move {
            this.update_partnership_status_now(&partnership_id, status).await
        })
        .await
    }

    async fn create_partnership_now(&self, draft: PartnershipDraft) -> Result<Partnership, DataError> {
        super::required(&draft.institution_id, "institution_id")?;
        super::required(&draft.initiative_id, "initiative_id")?;
        if let (Some(start), Some(end)) = (draft.start_date, draft.end_date) {
            if end < start {
                return Err(ValidationError::InvalidDateRange.into());
            }
        }
        if draft.status == Some(PartnershipStatus::Ended) {
            return Err(ValidationError::Invalid("a new partnership cannot start as Ended".to_string()).into());
        }
        let _guard = self
            .locks
            .lock(keys::scoped_key(keys::PARTNERSHIPS, &draft.institution_id, &draft.initiative_id))
            .await;

        let _institution: Institution = self.fresh(&self.tables.institutions, &draft.institution_id).await?;
        let _initiative: Initiative = self.fresh(&self.tables.initiatives, &draft.initiative_id).await?;

        let existing = ListQuery::filtered(Filter::And(vec![
            Filter::contains(f::INSTITUTION.ids, draft.institution_id.as_str()),
            Filter::contains(f::INITIATIVE.ids, draft.initiative_id.as_str()),
        ]));
        let open: Vec<Partnership> = self.fresh_list(&self.tables.partnerships, &existing).await?;
        if open.iter().any(|p| p.status != PartnershipStatus::Ended) {
            return Err(ValidationError::DuplicatePartnership.into());
        }

        let record = self.tables.partnerships.create(draft.to_fields()).await?;
        let partnership = Partnership::from_record(&record)?;

        self.revalidate(
            Mutation::new(EntityKind::Partnership, partnership.id.as_str())
                .with(Relation::Institution, draft.institution_id.as_str())
                .with(Relation::Initiative, draft.initiative_id.as_str()),
        );
        info!(
            institution = %draft.institution_id,
            initiative = %draft.initiative_id,
            status = %partnership.status,
            "Created partnership"
        );
        Ok(partnership)
    }

    async fn update_partnership_status_now(
        &self,
        partnership_id: &str,
        status: PartnershipStatus,
    ) -> Result<Partnership, DataError> {
        let _guard = self.locks.lock(keys::key(keys::PARTNERSHIPS, partnership_id)).await;

        let current: Partnership = self.fresh(&self.tables.partnerships, partnership_id).await?;
        if !current.status.can_transition_to(status) {
            return Err(ValidationError::InvalidStatusTransition {
                from: current.status.to_string(),
                to: status.to_string(),
            }
            .into());
        }

        let mut update = Fields::new();
        update.insert(f::STATUS.to_string(), json!(status.as_str()));
        if status == PartnershipStatus::Ended && current.end_date.is_none() {
            let today = Utc::now().date_naive();
            update.insert(f::END_DATE.to_string(), json!(today.format("%Y-%m-%d").to_string()));
        }
        let record = self.tables.partnerships.update(partnership_id, update).await?;
        let partnership = Partnership::from_record(&record)?;

        self.revalidate(
            Mutation::new(EntityKind::Partnership, partnership_id)
                .with(Relation::Institution, partnership.institution_id.as_str())
                .with(Relation::Initiative, partnership.initiative_id.as_str()),
        );
        info!(
            partnership = partnership_id,
            from = %current.status,
            to = %status,
            "Updated partnership status"
        );
        Ok(partnership)
    }
}
