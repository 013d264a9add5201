use std::collections::HashSet;

use serde_json::json;
use tracing::info;

use super::{join_within, Budget, ResolveMeta, Resolved, Resolver};
use crate::api::{Fields, Filter, ListQuery, Record};
use crate::cache::{keys, Volatility};
use crate::error::{DataError, ValidationError};
use crate::models::team::dedupe_members;
use crate::models::{Cohort, Contact, Initiative, MembershipStatus, Team, TeamMember};
use crate::revalidate::{EntityKind, Mutation, Relation};
use crate::schema::mapping::membership_fields;
use crate::schema::{fields, FieldReader, FromRecord};

/// A membership row with the team it belongs to.
#[derive(Debug, Clone, PartialEq)]
struct MembershipRow {
    team_id: String,
    member: TeamMember,
}

impl FromRecord for MembershipRow {
    const ENTITY: &'static str = "team member";

    fn from_record(record: &Record) -> Result<Self, DataError> {
        let team_id = FieldReader::new(record)
            .first_link(fields::member::TEAM.link)
            .ok_or_else(|| DataError::Schema(format!("membership {} has no team", record.id)))?;
        Ok(Self {
            team_id,
            member: TeamMember::from_record(record)?,
        })
    }
}

fn team_members_query(team_id: &str) -> ListQuery {
    ListQuery::filtered(Filter::contains(fields::member::TEAM.ids, team_id))
}

impl Resolver {
    /// A team with its deduplicated members. Member names come from the
    /// contacts, fetched concurrently.
    pub async fn get_team(&self, id: &str) -> Resolved<Option<Team>> {
        self.read("get_team", |budget| async move {
            match self.team_details(id, budget).await {
                Ok(team) => Ok(team.map(Some)),
                Err(e) if e.is_not_found() => Ok(Resolved::ok(None)),
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Teams the contact is an active member of.
    pub async fn get_teams_for_contact(&self, contact_id: &str) -> Resolved<Vec<Team>> {
        self.read("get_teams_for_contact", |budget| async move {
            let query = ListQuery::filtered(Filter::contains(fields::member::CONTACT.ids, contact_id));
            let rows: Vec<MembershipRow> = budget
                .run(
                    "memberships",
                    self.cached_list(
                        &self.tables.members,
                        keys::scoped_key("members", "contact", contact_id),
                        vec![
                            keys::TEAMS.to_string(),
                            keys::child_tag("contact", contact_id, keys::TEAMS),
                        ],
                        query,
                        Volatility::Volatile,
                    ),
                )
                .await?;

            let mut seen = HashSet::new();
            let team_ids: Vec<String> = rows
                .into_iter()
                .filter(|row| row.member.is_active())
                .map(|row| row.team_id)
                .filter(|id| seen.insert(id.clone()))
                .collect();

            let pieces = team_ids
                .iter()
                .map(|id| (format!("team {}", id), self.team_details(id, budget)))
                .collect();
            let mut meta = ResolveMeta::default();
            let mut teams = Vec::new();
            for (label, outcome) in join_within(budget, pieces).await {
                match outcome {
                    Ok(team) => {
                        meta.merge(team.meta);
                        teams.push(team.data);
                    }
                    Err(e) => meta.note(&label, &e),
                }
            }
            Ok(Resolved::with_meta(teams, meta))
        })
        .await
    }

    async fn cached_memberships(&self, team_id: &str) -> Result<Vec<MembershipRow>, DataError> {
        self.cached_list(
            &self.tables.members,
            keys::scoped_key("members", "team", team_id),
            vec![keys::TEAMS.to_string(), keys::entity_tag(keys::TEAMS, team_id)],
            team_members_query(team_id),
            Volatility::Volatile,
        )
        .await
    }

    pub(super) async fn team_details(
        &self,
        team_id: &str,
        budget: Budget,
    ) -> Result<Resolved<Team>, DataError> {
        let label = format!("team {}", team_id);
        let row = budget.run(
            &label,
            self.cached_find::<Team>(&self.tables.teams, keys::TEAMS, team_id, Volatility::Volatile),
        );
        let members_label = format!("members of team {}", team_id);
        let memberships = budget.run(&members_label, self.cached_memberships(team_id));
        let (row, memberships) = tokio::join!(row, memberships);

        let mut team = row?.ok_or_else(|| DataError::not_found("team", team_id))?;
        let mut meta = ResolveMeta::default();
        let members = match memberships {
            Ok(rows) => dedupe_members(rows.into_iter().map(|r| r.member).collect()),
            Err(e) => {
                meta.note(&members_label, &e);
                Vec::new()
            }
        };

        let pieces = members
            .iter()
            .map(|m| {
                let label = format!("contact {}", m.contact_id);
                let fut = self.cached_find::<Contact>(
                    &self.tables.contacts,
                    keys::CONTACTS,
                    &m.contact_id,
                    Volatility::Volatile,
                );
                (label, fut)
            })
            .collect();
        let contacts = join_within(budget, pieces).await;

        team.members = members
            .into_iter()
            .zip(contacts)
            .map(|(mut member, (label, outcome))| {
                match outcome {
                    Ok(Some(contact)) => {
                        member.name = Some(contact.full_name());
                        member.email = contact.email;
                    }
                    Ok(None) => {
                        meta.note(&label, &DataError::not_found("contact", member.contact_id.as_str()))
                    }
                    Err(e) => meta.note(&label, &e),
                }
                member
            })
            .collect();
        Ok(Resolved::with_meta(team, meta))
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub async fn add_team_member(
        &self,
        team_id: &str,
        contact_id: &str,
    ) -> Result<TeamMember, DataError> {
        let this = self.clone();
        let (team_id, contact_id) = (team_id.to_string(), contact_id.to_string());
        self.mutate("add_team_member", async move {
            this.add_member_now(&team_id, &contact_id).await
        })
        .await
    }

    pub async fn set_team_member_status(
        &self,
        team_id: &str,
        contact_id: &str,
        status: MembershipStatus,
    ) -> Result<TeamMember, DataError> {
        let this = self.clone();
        let (team_id, contact_id) = (team_id.to_string(), contact_id.to_string());
        self.mutate("set_team_member_status", async move {
            this.set_member_status_now(&team_id, &contact_id, status).await
        })
        .await
    }

    async fn add_member_now(&self, team_id: &str, contact_id: &str) -> Result<TeamMember, DataError> {
        super::required(team_id, "team_id")?;
        super::required(contact_id, "contact_id")?;
        let _guard = self.locks.lock(keys::key("team", team_id)).await;

        let team: Team = self.fresh(&self.tables.teams, team_id).await?;
        let contact: Contact = self.fresh(&self.tables.contacts, contact_id).await?;
        let rows: Vec<MembershipRow> = self
            .fresh_list(&self.tables.members, &team_members_query(team_id))
            .await?;
        let members = dedupe_members(rows.into_iter().map(|r| r.member).collect());

        let existing = members.iter().find(|m| m.contact_id == contact_id);
        if existing.map_or(false, |m| m.is_active()) {
            return Err(ValidationError::DuplicateMember.into());
        }
        self.check_team_capacity(&team, &members).await?;

        let record = match existing {
            Some(inactive) => {
                let mut update = Fields::new();
                update.insert(
                    fields::member::STATUS.to_string(),
                    json!(MembershipStatus::Active.as_str()),
                );
                self.tables.members.update(&inactive.membership_id, update).await?
            }
            None => {
                let row = membership_fields(team_id, contact_id, MembershipStatus::Active);
                self.tables.members.create(row).await?
            }
        };
        let mut member = TeamMember::from_record(&record)?;
        member.name = Some(contact.full_name());
        member.email = contact.email;

        self.revalidate(
            Mutation::new(EntityKind::TeamMember, member.membership_id.as_str())
                .with(Relation::Team, team_id)
                .with(Relation::Contact, contact_id),
        );
        info!(team = team_id, contact = contact_id, "Added team member");
        Ok(member)
    }

    async fn set_member_status_now(
        &self,
        team_id: &str,
        contact_id: &str,
        status: MembershipStatus,
    ) -> Result<TeamMember, DataError> {
        let _guard = self.locks.lock(keys::key("team", team_id)).await;

        let team: Team = self.fresh(&self.tables.teams, team_id).await?;
        let rows: Vec<MembershipRow> = self
            .fresh_list(&self.tables.members, &team_members_query(team_id))
            .await?;
        let members = dedupe_members(rows.into_iter().map(|r| r.member).collect());
        let current = members
            .iter()
            .find(|m| m.contact_id == contact_id)
            .cloned()
            .ok_or_else(|| DataError::not_found("team member", contact_id))?;
        if current.status == status {
            return Ok(current);
        }
        if status == MembershipStatus::Active {
            self.check_team_capacity(&team, &members).await?;
        }

        let mut update = Fields::new();
        update.insert(
            fields::member::STATUS.to_string(),
            json!(status.as_str()),
        );
        let record = self.tables.members.update(&current.membership_id, update).await?;
        let member = TeamMember::from_record(&record)?;

        self.revalidate(
            Mutation::new(EntityKind::TeamMember, member.membership_id.as_str())
                .with(Relation::Team, team_id)
                .with(Relation::Contact, contact_id),
        );
        info!(team = team_id, contact = contact_id, status = %status, "Changed membership status");
        Ok(member)
    }

    /// `TeamFull` when the team's initiative caps its size and the cap is reached.
    async fn check_team_capacity(&self, team: &Team, members: &[TeamMember]) -> Result<(), DataError> {
        let Some(max) = self.team_size_limit(team).await? else {
            return Ok(());
        };
        let active = members.iter().filter(|m| m.is_active()).count() as u32;
        if active >= max {
            return Err(ValidationError::TeamFull { max }.into());
        }
        Ok(())
    }

    async fn team_size_limit(&self, team: &Team) -> Result<Option<u32>, DataError> {
        let Some(cohort_id) = &team.cohort_id else {
            return Ok(None);
        };
        let Some(record) = self.tables.cohorts.find(cohort_id).await? else {
            return Ok(None);
        };
        let cohort = Cohort::from_record(&record)?;
        let Some(initiative_id) = &cohort.initiative_id else {
            return Ok(None);
        };
        match self.tables.initiatives.find(initiative_id).await? {
            Some(record) => Ok(Initiative::from_record(&record)?.max_team_size),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::api::memory::Op;
    use crate::error::{DataError, ValidationError};
    use crate::models::MembershipStatus;
    use crate::resolver::test_support::Fixture;

    fn seed(fx: &Fixture) {
        fx.seed(&fx.tables.initiatives, "i1", json!({"Name": "Build Week", "Participation Type": "Team", "Max Team Size": 2}));
        fx.seed(&fx.tables.cohorts, "c1", json!({"Short Name": "Spring", "Initiative": ["i1"]}));
        fx.seed(&fx.tables.teams, "t1", json!({"Team Name": "Owls", "Cohort": ["c1"], "Points": 40}));
        fx.seed(&fx.tables.contacts, "u1", json!({"First Name": "Ada", "Last Name": "Lovelace", "Email": "ada@example.org"}));
        fx.seed(&fx.tables.contacts, "u2", json!({"First Name": "Grace", "Last Name": "Hopper"}));
        fx.seed(&fx.tables.contacts, "u3", json!({"First Name": "Alan", "Last Name": "Turing"}));
        fx.seed(&fx.tables.members, "m1", json!({"Team": ["t1"], "Contact": ["u1"], "Status": "Active", "Points": 25}));
        // Duplicate row for the same contact.
        fx.seed(&fx.tables.members, "m1b", json!({"Team": ["t1"], "Contact": ["u1"], "Status": "Inactive"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_team_dedupes_and_names_members() {
        let fx = Fixture::new();
        seed(&fx);

        let team = fx.resolver.get_team("t1").await;
        assert!(!team.is_degraded());
        let team = team.data.unwrap();
        assert_eq!(team.members.len(), 1);
        let member = &team.members[0];
        assert_eq!(member.membership_id, "m1");
        assert_eq!(member.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(member.email.as_deref(), Some("ada@example.org"));
        assert_eq!(team.active_points(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_member_then_full() {
        let fx = Fixture::new();
        seed(&fx);
        fx.resolver.get_team("t1").await;

        let added = fx.resolver.add_team_member("t1", "u2").await.unwrap();
        assert_eq!(added.name.as_deref(), Some("Grace Hopper"));
        assert_eq!(fx.sink.tag_count("teams-t1"), 1);
        assert_eq!(fx.sink.tag_count("contact:u2:teams"), 1);

        let team = fx.resolver.get_team("t1").await.data.unwrap();
        assert_eq!(team.active_member_count(), 2);

        let creates = fx.backend.calls(Op::Create, "Members");
        assert_eq!(
            fx.resolver.add_team_member("t1", "u3").await,
            Err(DataError::Validation(ValidationError::TeamFull { max: 2 }))
        );
        assert_eq!(
            fx.resolver.add_team_member("t1", "u1").await,
            Err(DataError::Validation(ValidationError::DuplicateMember))
        );
        assert_eq!(fx.backend.calls(Op::Create, "Members"), creates);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivate_member_frees_a_place() {
        let fx = Fixture::new();
        seed(&fx);
        fx.resolver.add_team_member("t1", "u2").await.unwrap();

        let member = fx
            .resolver
            .set_team_member_status("t1", "u1", MembershipStatus::Inactive)
            .await
            .unwrap();
        assert_eq!(member.status, MembershipStatus::Inactive);

        fx.resolver.add_team_member("t1", "u3").await.unwrap();
        let team = fx.resolver.get_team("t1").await.data.unwrap();
        let mut active: Vec<_> = team.active_members().map(|m| m.contact_id.as_str()).collect();
        active.sort();
        assert_eq!(active, vec!["u2", "u3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teams_for_contact() {
        let fx = Fixture::new();
        seed(&fx);
        fx.seed(&fx.tables.teams, "t2", json!({"Team Name": "Larks"}));
        fx.seed(&fx.tables.members, "m9", json!({"Team": ["t2"], "Contact": ["u1"], "Status": "Left"}));

        let teams = fx.resolver.get_teams_for_contact("u1").await;
        assert!(!teams.is_degraded());
        let names: Vec<_> = teams.data.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Owls"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_team_member_status_change() {
        let fx = Fixture::new();
        seed(&fx);
        assert!(matches!(
            fx.resolver
                .set_team_member_status("t1", "u3", MembershipStatus::Active)
                .await,
            Err(DataError::NotFound { entity: "team member", .. })
        ));
    }
}
