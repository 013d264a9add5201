use std::collections::HashMap;

use tracing::info;

use super::{Resolved, Resolver};
use crate::api::{Filter, ListQuery, SortDirection};
use crate::cache::{keys, Volatility};
use crate::error::{DataError, ValidationError};
use crate::models::{Submission, SubmissionDraft, Team};
use crate::revalidate::{EntityKind, Mutation, Relation};
use crate::schema::{fields, FromRecord, NamedRecord, ToFields};

impl Resolver {
    /// A team's submissions, newest first, with milestone names.
    pub async fn get_team_submissions(&self, team_id: &str) -> Resolved<Vec<Submission>> {
        self.read("get_team_submissions", |budget| async move {
            let query = ListQuery::filtered(Filter::contains(fields::submission::TEAM.ids, team_id))
                .sort_by(fields::submission::SUBMITTED_AT, SortDirection::Desc);
            let mut submissions: Vec<Submission> = budget
                .run(
                    "submissions",
                    self.cached_list(
                        &self.tables.submissions,
                        keys::scoped_key(keys::SUBMISSIONS, "team", team_id),
                        vec![
                            keys::SUBMISSIONS.to_string(),
                            keys::child_tag("team", team_id, keys::SUBMISSIONS),
                        ],
                        query,
                        Volatility::Volatile,
                    ),
                )
                .await?;

            let mut milestone_ids: Vec<String> = submissions
                .iter()
                .filter_map(|s| s.milestone_id.clone())
                .collect();
            milestone_ids.sort();
            milestone_ids.dedup();

            let names = self
                .names_for(&self.tables.milestones, keys::MILESTONES, &milestone_ids, budget)
                .await;
            let lookup: HashMap<String, String> = names.data.into_iter().collect();
            for submission in &mut submissions {
                submission.milestone_name = submission
                    .milestone_id
                    .as_ref()
                    .and_then(|id| lookup.get(id).cloned());
            }
            Ok(Resolved::with_meta(submissions, names.meta))
        })
        .await
    }

    pub async fn create_submission(&self, draft: SubmissionDraft) -> Result<Submission, DataError> {
        let this = self.clone();
        self.mutate("create_submission", async move { this.create_submission_now(draft).await })
            .await
    }

    async fn create_submission_now(&self, draft: SubmissionDraft) -> Result<Submission, DataError> {
        if draft.team_id.is_none() && draft.contact_id.is_none() {
            return Err(ValidationError::MissingField("team_id").into());
        }
        super::required(&draft.milestone_id, "milestone_id")?;
        if let Some(link) = &draft.link {
            let link = link.trim();
            if !(link.starts_with("https://") || link.starts_with("http://")) {
                return Err(ValidationError::Invalid(format!("not a web link: {}", link)).into());
            }
        }

        let milestone: NamedRecord = self.fresh(&self.tables.milestones, &draft.milestone_id).await?;
        if let Some(team_id) = &draft.team_id {
            let _team: Team = self.fresh(&self.tables.teams, team_id).await?;
        }

        let record = self.tables.submissions.create(draft.to_fields()).await?;
        let mut submission = Submission::from_record(&record)?;
        submission.milestone_name = Some(milestone.name);

        self.revalidate(
            Mutation::new(EntityKind::Submission, submission.id.as_str())
                .with_opt(Relation::Team, draft.team_id.as_deref())
                .with_opt(Relation::Contact, draft.contact_id.as_deref()),
        );
        info!(submission = %submission.id, milestone = %draft.milestone_id, "Created submission");
        Ok(submission)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::error::{DataError, ValidationError};
    use crate::models::SubmissionDraft;
    use crate::resolver::test_support::Fixture;

    fn seed(fx: &Fixture) {
        fx.seed(&fx.tables.teams, "t1", json!({"Team Name": "Owls"}));
        fx.seed(&fx.tables.milestones, "ms1", json!({"Name": "Prototype"}));
        fx.seed(&fx.tables.milestones, "ms2", json!({"Name": "Final pitch"}));
        fx.seed(
            &fx.tables.submissions,
            "s1",
            json!({"Team": ["t1"], "Milestone": ["ms1"], "Submitted At": "2026-02-01T10:00:00Z"}),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_team_submissions_with_milestone_names() {
        let fx = Fixture::new();
        seed(&fx);
        fx.seed(
            &fx.tables.submissions,
            "s2",
            json!({"Team": ["t1"], "Milestone": ["ms2"], "Submitted At": "2026-03-01T10:00:00Z"}),
        );

        let result = fx.resolver.get_team_submissions("t1").await;
        assert!(!result.is_degraded());
        let names: Vec<_> = result
            .data
            .iter()
            .map(|s| s.milestone_name.as_deref().unwrap_or(""))
            .collect();
        assert_eq!(names, vec!["Final pitch", "Prototype"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_submission_reads_after_write() {
        let fx = Fixture::new();
        seed(&fx);
        assert_eq!(fx.resolver.get_team_submissions("t1").await.data.len(), 1);

        let draft = SubmissionDraft {
            team_id: Some("t1".to_string()),
            milestone_id: "ms2".to_string(),
            link: Some("https://example.org/deck".to_string()),
            ..Default::default()
        };
        let created = fx.resolver.create_submission(draft).await.unwrap();
        assert_eq!(created.milestone_name.as_deref(), Some("Final pitch"));
        assert_eq!(fx.sink.tag_count("team:t1:submissions"), 1);
        assert_eq!(fx.resolver.get_team_submissions("t1").await.data.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_submission_validation() {
        let fx = Fixture::new();
        seed(&fx);

        let orphan = SubmissionDraft {
            milestone_id: "ms1".to_string(),
            ..Default::default()
        };
        assert_eq!(
            fx.resolver.create_submission(orphan).await,
            Err(DataError::Validation(ValidationError::MissingField("team_id")))
        );

        let bad_link = SubmissionDraft {
            team_id: Some("t1".to_string()),
            milestone_id: "ms1".to_string(),
            link: Some("ftp://old".to_string()),
            ..Default::default()
        };
        assert!(fx.resolver.create_submission(bad_link).await.is_err());

        let unknown = SubmissionDraft {
            team_id: Some("t1".to_string()),
            milestone_id: "nope".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            fx.resolver.create_submission(unknown).await,
            Err(DataError::NotFound { .. })
        ));
    }
}
