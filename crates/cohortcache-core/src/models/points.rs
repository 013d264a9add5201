use serde::{Deserialize, Serialize};

/// Points a user has earned and spent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PointsSummary {
    pub user_id: String,
    /// Sum of points from earned achievements.
    pub total_points: i64,
    /// `total_points - claimed_points`, floored at zero.
    pub available_points: i64,
    pub claimed_points: i64,
    pub achievements_earned: u32,
    pub rewards_claimed: u32,
}

impl PointsSummary {
    pub fn from_ledger(user_id: &str, earned: &[i64], claimed: &[i64]) -> Self {
        let total_points: i64 = earned.iter().sum();
        let claimed_points: i64 = claimed.iter().sum();
        Self {
            user_id: user_id.to_string(),
            total_points,
            available_points: (total_points - claimed_points).max(0),
            claimed_points,
            achievements_earned: earned.len() as u32,
            rewards_claimed: claimed.len() as u32,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Reward {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub cost: i64,
    pub available: bool,
}

/// A reward claimed by a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RewardClaim {
    pub id: String,
    pub user_id: String,
    pub reward_id: String,
    pub cost: i64,
}
