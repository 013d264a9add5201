//! The points ledger: earned achievements minus claimed rewards.

use tracing::info;

use super::{Resolved, Resolver};
use crate::api::{Filter, ListQuery, Record, SortDirection, TableClient};
use crate::cache::{keys, Volatility};
use crate::error::{DataError, ValidationError};
use crate::models::{PointsSummary, Reward, RewardClaim};
use crate::revalidate::{EntityKind, Mutation, Relation};
use crate::schema::mapping::claim_fields;
use crate::schema::{fields, FieldReader, LinkField};

fn ledger_query(contact: LinkField, user_id: &str) -> ListQuery {
    ListQuery::filtered(Filter::contains(contact.ids, user_id))
}

fn amounts(records: &[Record], field: &str) -> Vec<i64> {
    records
        .iter()
        .map(|r| FieldReader::new(r).int(field).unwrap_or(0))
        .collect()
}

/// Both sides of the ledger, read straight from the tables.
async fn load_ledger(
    achievements: &TableClient,
    claims: &TableClient,
    user_id: &str,
) -> Result<PointsSummary, DataError> {
    let earned_query = ledger_query(fields::achievement::CONTACT, user_id);
    let claimed_query = ledger_query(fields::claimed_reward::CONTACT, user_id);
    let (earned, claimed) =
        tokio::try_join!(achievements.list(&earned_query), claims.list(&claimed_query))?;
    Ok(PointsSummary::from_ledger(
        user_id,
        &amounts(&earned, fields::achievement::POINTS),
        &amounts(&claimed, fields::claimed_reward::COST),
    ))
}

impl Resolver {
    /// A summary needs both sides of the ledger; if either is unavailable
    /// the result is an empty summary rather than an overstated balance.
    pub async fn get_user_points_summary(&self, user_id: &str) -> Resolved<PointsSummary> {
        let result = self
            .read("get_user_points_summary", |budget| async move {
                let achievements = self.tables.achievements.clone();
                let claims = self.tables.claimed_rewards.clone();
                let owned = user_id.to_string();
                let summary = budget
                    .run(
                        "points ledger",
                        self.cache.get_or_load(
                            &keys::key(keys::POINTS, user_id),
                            &[
                                keys::POINTS.to_string(),
                                keys::child_tag("user", user_id, keys::POINTS),
                            ],
                            self.ttls.ttl(Volatility::Volatile),
                            move || async move { load_ledger(&achievements, &claims, &owned).await },
                        ),
                    )
                    .await?;
                Ok(Resolved::ok(summary))
            })
            .await;
        if !result.is_degraded() {
            return result;
        }
        let empty = PointsSummary {
            user_id: user_id.to_string(),
            ..Default::default()
        };
        Resolved::with_meta(empty, result.meta)
    }

    /// Rewards, cheapest first.
    pub async fn list_rewards(&self) -> Resolved<Vec<Reward>> {
        self.read("list_rewards", |budget| async move {
            let query = ListQuery::all().sort_by(fields::reward::COST, SortDirection::Asc);
            let rewards = budget
                .run(
                    "list_rewards",
                    self.cached_list(
                        &self.tables.rewards,
                        keys::key(keys::REWARDS, "all"),
                        vec![keys::REWARDS.to_string()],
                        query,
                        Volatility::Slow,
                    ),
                )
                .await?;
            Ok(Resolved::ok(rewards))
        })
        .await
    }

    /// Spend points on a reward. The balance is recomputed from the tables,
    /// not from the cache, and nothing is written when it falls short.
    pub async fn claim_reward(&self, user_id: &str, reward_id: &str) -> Result<RewardClaim, DataError> {
        let this = self.clone();
        let (user_id, reward_id) = (user_id.to_string(), reward_id.to_string());
        self.mutate("claim_reward", async move { this.claim_reward_now(&user_id, &reward_id).await })
            .await
    }

    async fn claim_reward_now(&self, user_id: &str, reward_id: &str) -> Result<RewardClaim, DataError> {
        super::required(user_id, "user_id")?;
        super::required(reward_id, "reward_id")?;
        let _guard = self.locks.lock(keys::key(keys::POINTS, user_id)).await;

        let reward: Reward = self.fresh(&self.tables.rewards, reward_id).await?;
        if !reward.available {
            return Err(ValidationError::RewardUnavailable.into());
        }
        let ledger = load_ledger(&self.tables.achievements, &self.tables.claimed_rewards, user_id).await?;
        if reward.cost > ledger.available_points {
            return Err(ValidationError::InsufficientPoints {
                available: ledger.available_points,
                cost: reward.cost,
            }
            .into());
        }

        let record = self
            .tables
            .claimed_rewards
            .create(claim_fields(user_id, reward_id, reward.cost))
            .await?;
        let claim = RewardClaim {
            id: record.id,
            user_id: user_id.to_string(),
            reward_id: reward_id.to_string(),
            cost: reward.cost,
        };

        self.revalidate(Mutation::new(EntityKind::RewardClaim, claim.id.as_str()).with(Relation::User, user_id));
        info!(user = user_id, reward = reward_id, cost = reward.cost, "Claimed reward");
        Ok(claim)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::api::memory::Op;
    use crate::error::{DataError, ValidationError};
    use crate::resolver::test_support::Fixture;

    fn seed(fx: &Fixture) {
        fx.seed(&fx.tables.achievements, "a1", json!({"Contact": ["u1"], "Points": 50}));
        fx.seed(&fx.tables.achievements, "a2", json!({"Contact": ["u1"], "Points": 30}));
        fx.seed(&fx.tables.achievements, "a3", json!({"Contact": ["u2"], "Points": 500}));
        fx.seed(&fx.tables.claimed_rewards, "cr1", json!({"Contact": ["u1"], "Reward": ["rw1"], "Points Spent": 20}));
        fx.seed(&fx.tables.rewards, "rw1", json!({"Name": "Sticker", "Point Cost": 20, "Available": true}));
        fx.seed(&fx.tables.rewards, "rw2", json!({"Name": "Hoodie", "Point Cost": 100, "Available": true}));
        fx.seed(&fx.tables.rewards, "rw3", json!({"Name": "Old mug", "Point Cost": 5}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_points_summary() {
        let fx = Fixture::new();
        seed(&fx);

        let summary = fx.resolver.get_user_points_summary("u1").await;
        assert!(!summary.is_degraded());
        let summary = summary.data;
        assert_eq!(summary.total_points, 80);
        assert_eq!(summary.claimed_points, 20);
        assert_eq!(summary.available_points, 60);
        assert_eq!(summary.achievements_earned, 2);
        assert_eq!(summary.rewards_claimed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_over_balance_is_rejected_without_write() {
        let fx = Fixture::new();
        seed(&fx);

        let outcome = fx.resolver.claim_reward("u1", "rw2").await;
        assert_eq!(
            outcome,
            Err(DataError::Validation(ValidationError::InsufficientPoints {
                available: 60,
                cost: 100
            }))
        );
        assert_eq!(fx.backend.calls(Op::Create, "Claimed Rewards"), 0);
        assert_eq!(fx.backend.records("Claimed Rewards").len(), 1);
        assert!(fx.sink.tags().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_updates_summary() {
        let fx = Fixture::new();
        seed(&fx);
        assert_eq!(fx.resolver.get_user_points_summary("u1").await.data.available_points, 60);

        let claim = fx.resolver.claim_reward("u1", "rw1").await.unwrap();
        assert_eq!(claim.cost, 20);
        assert_eq!(fx.sink.tag_count("user:u1:points"), 1);

        let summary = fx.resolver.get_user_points_summary("u1").await.data;
        assert_eq!(summary.available_points, 40);
        assert_eq!(summary.rewards_claimed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_reward() {
        let fx = Fixture::new();
        seed(&fx);
        assert_eq!(
            fx.resolver.claim_reward("u1", "rw3").await,
            Err(DataError::Validation(ValidationError::RewardUnavailable))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ledger_gives_empty_summary() {
        let fx = Fixture::new();
        seed(&fx);
        fx.backend
            .set_latency(&fx.tables.claimed_rewards, Duration::from_secs(30));

        let summary = fx.resolver.get_user_points_summary("u1").await;
        assert!(summary.is_degraded());
        assert_eq!(summary.data.user_id, "u1");
        assert_eq!(summary.data.available_points, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewards_cheapest_first() {
        let fx = Fixture::new();
        seed(&fx);
        let rewards = fx.resolver.list_rewards().await.data;
        let names: Vec<_> = rewards.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Old mug", "Sticker", "Hoodie"]);
        assert!(!rewards[0].available);
    }
}
