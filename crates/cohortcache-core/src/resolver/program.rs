//! Initiatives and cohorts.

use super::{Budget, ResolveMeta, Resolved, Resolver};
use crate::api::{Filter, ListQuery, SortDirection};
use crate::cache::{keys, Volatility};
use crate::error::DataError;
use crate::models::{Cohort, CohortDetails, Initiative};
use crate::schema::fields;

impl Resolver {
    pub async fn get_initiative(&self, id: &str) -> Resolved<Option<Initiative>> {
        self.read("get_initiative", |budget| async move {
            let initiative = budget
                .run("get_initiative", self.cached_initiative(id))
                .await?;
            Ok(Resolved::ok(initiative))
        })
        .await
    }

    pub async fn list_initiatives(&self) -> Resolved<Vec<Initiative>> {
        self.read("list_initiatives", |budget| async move {
            let query = ListQuery::all().sort_by(fields::initiative::NAME, SortDirection::Asc);
            let initiatives = budget
                .run(
                    "list_initiatives",
                    self.cached_list(
                        &self.tables.initiatives,
                        keys::key(keys::INITIATIVES, "all"),
                        vec![keys::INITIATIVES.to_string()],
                        query,
                        Volatility::Slow,
                    ),
                )
                .await?;
            Ok(Resolved::ok(initiatives))
        })
        .await
    }

    /// A cohort with its initiative, topic names and class names.
    pub async fn get_cohort(&self, id: &str) -> Resolved<Option<CohortDetails>> {
        self.read("get_cohort", |budget| async move {
            match self.cohort_details(id, budget).await {
                Ok(details) => Ok(details.map(Some)),
                Err(e) if e.is_not_found() => Ok(Resolved::ok(None)),
                Err(e) => Err(e),
            }
        })
        .await
    }

    pub async fn get_cohorts_for_initiative(&self, initiative_id: &str) -> Resolved<Vec<Cohort>> {
        self.read("get_cohorts_for_initiative", |budget| async move {
            let query = ListQuery::filtered(Filter::contains(
                fields::cohort::INITIATIVE.ids,
                initiative_id,
            ))
            .sort_by(fields::cohort::START_DATE, SortDirection::Desc);
            let cohorts = budget
                .run(
                    "get_cohorts_for_initiative",
                    self.cached_list(
                        &self.tables.cohorts,
                        keys::scoped_key(keys::COHORTS, "initiative", initiative_id),
                        vec![
                            keys::COHORTS.to_string(),
                            keys::child_tag("initiative", initiative_id, keys::COHORTS),
                        ],
                        query,
                        Volatility::Slow,
                    ),
                )
                .await?;
            Ok(Resolved::ok(cohorts))
        })
        .await
    }

    pub(super) async fn cached_initiative(&self, id: &str) -> Result<Option<Initiative>, DataError> {
        self.cached_find(&self.tables.initiatives, keys::INITIATIVES, id, Volatility::Slow)
            .await
    }

    /// Build the cohort aggregate within `budget`. The cohort row itself is
    /// required; the initiative, topics and classes are joined concurrently
    /// and any that fail are left out and noted.
    pub(super) async fn cohort_details(
        &self,
        id: &str,
        budget: Budget,
    ) -> Result<Resolved<CohortDetails>, DataError> {
        let label = format!("cohort {}", id);
        let cohort: Cohort = budget
            .run(
                &label,
                self.cached_find(&self.tables.cohorts, keys::COHORTS, id, Volatility::Slow),
            )
            .await?
            .ok_or_else(|| DataError::not_found("cohort", id))?;

        let initiative = async {
            match &cohort.initiative_id {
                Some(initiative_id) => {
                    let label = format!("initiative {}", initiative_id);
                    let outcome = budget.run(&label, self.cached_initiative(initiative_id)).await;
                    Some((label, initiative_id.clone(), outcome))
                }
                None => None,
            }
        };
        let topics = self.names_for(&self.tables.topics, keys::TOPICS, &cohort.topic_ids, budget);
        let classes = self.names_for(&self.tables.classes, keys::CLASSES, &cohort.class_ids, budget);
        let (initiative, topics, classes) = tokio::join!(initiative, topics, classes);

        let mut meta = ResolveMeta::default();
        let initiative_details = match initiative {
            Some((_, _, Ok(Some(initiative)))) => Some(initiative),
            Some((label, initiative_id, Ok(None))) => {
                meta.note(&label, &DataError::not_found("initiative", initiative_id));
                None
            }
            Some((label, _, Err(e))) => {
                meta.note(&label, &e);
                None
            }
            None => None,
        };
        meta.merge(topics.meta);
        meta.merge(classes.meta);

        let details = CohortDetails {
            topic_names: topics.data.into_iter().map(|(_, name)| name).collect(),
            class_names: classes.data.into_iter().map(|(_, name)| name).collect(),
            initiative_details,
            cohort,
        };
        Ok(Resolved::with_meta(details, meta))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::api::memory::Op;
    use crate::models::ParticipationType;
    use crate::resolver::test_support::Fixture;

    fn seed(fx: &Fixture) {
        fx.seed(
            &fx.tables.initiatives,
            "i1",
            json!({"Name": "Build Week", "Participation Type": "Team", "Max Team Size": 3}),
        );
        fx.seed(&fx.tables.initiatives, "i2", json!({"Name": "Anchor Lab"}));
        fx.seed(
            &fx.tables.cohorts,
            "c1",
            json!({
                "Short Name": "Spring 26",
                "Initiative": ["i1"],
                "Start Date": "2026-03-01",
                "Topics": ["tp1", "tp2"],
                "Classes": ["cl1"]
            }),
        );
        fx.seed(
            &fx.tables.cohorts,
            "c2",
            json!({"Short Name": "Fall 25", "Initiative": ["i1"], "Start Date": "2025-09-01"}),
        );
        fx.seed(&fx.tables.topics, "tp1", json!({"Name": "Robotics"}));
        fx.seed(&fx.tables.topics, "tp2", json!({"Name": "Energy"}));
        fx.seed(&fx.tables.classes, "cl1", json!({"Name": "Period 3"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_cohort_joins_pieces() {
        let fx = Fixture::new();
        seed(&fx);

        let cohort = fx.resolver.get_cohort("c1").await;
        assert!(!cohort.is_degraded());
        let details = cohort.data.unwrap();
        let initiative = details.initiative_details.as_ref().unwrap();
        assert_eq!(initiative.id, "i1");
        assert_eq!(initiative.participation_type, ParticipationType::Team);
        assert_eq!(details.topic_names, vec!["Robotics", "Energy"]);
        assert_eq!(details.class_names, vec!["Period 3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_topic_is_noted() {
        let fx = Fixture::new();
        seed(&fx);
        fx.seed(&fx.tables.cohorts, "c3", json!({"Short Name": "Ghost", "Topics": ["tp1", "gone"]}));

        let cohort = fx.resolver.get_cohort("c3").await;
        assert!(cohort.is_degraded());
        assert_eq!(cohort.meta.missing, vec!["topics gone"]);
        assert_eq!(cohort.data.unwrap().topic_names, vec!["Robotics"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_initiative_degrades_cohort() {
        let fx = Fixture::new();
        seed(&fx);
        fx.backend.set_latency(&fx.tables.initiatives, Duration::from_secs(30));

        let started = tokio::time::Instant::now();
        let cohort = fx.resolver.get_cohort("c1").await;
        assert!(started.elapsed() <= Duration::from_secs(8));
        assert!(cohort.is_degraded());
        assert_eq!(cohort.meta.missing, vec!["initiative i1"]);
        let details = cohort.data.unwrap();
        assert!(details.initiative_details.is_none());
        assert_eq!(details.topic_names.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_cohort_is_none() {
        let fx = Fixture::new();
        let cohort = fx.resolver.get_cohort("nope").await;
        assert!(cohort.data.is_none());
        assert!(!cohort.is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cohorts_for_initiative_newest_first() {
        let fx = Fixture::new();
        seed(&fx);
        let cohorts = fx.resolver.get_cohorts_for_initiative("i1").await.data;
        let ids: Vec<_> = cohorts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);

        let initiatives = fx.resolver.list_initiatives().await.data;
        assert_eq!(initiatives[0].name, "Anchor Lab");
        fx.resolver.list_initiatives().await;
        assert_eq!(fx.backend.calls(Op::List, "Initiatives"), 1);
    }
}
