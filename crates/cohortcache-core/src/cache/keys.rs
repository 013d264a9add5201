//! Cache key and tag conventions.
//!
//! Keys: `<entity>:<id>` or `<entity>:<scope>:<id>`.
//! Tags: `<entity>`, `<entity>-<id>`, `<entity>:<parentId>:<entity>`.

pub const CONTACTS: &str = "contacts";
pub const INSTITUTIONS: &str = "institutions";
pub const INITIATIVES: &str = "initiatives";
pub const COHORTS: &str = "cohorts";
pub const TOPICS: &str = "topics";
pub const CLASSES: &str = "classes";
pub const TEAMS: &str = "teams";
pub const PARTICIPATION: &str = "participation";
pub const SUBMISSIONS: &str = "submissions";
pub const MILESTONES: &str = "milestones";
pub const EVENTS: &str = "events";
pub const UPCOMING_EVENTS: &str = "upcoming-events";
pub const PARTNERSHIPS: &str = "partnerships";
pub const POINTS: &str = "points";
pub const REWARDS: &str = "rewards";

pub fn key(entity: &str, id: &str) -> String {
    format!("{}:{}", entity, id)
}

pub fn scoped_key(entity: &str, scope: &str, id: &str) -> String {
    format!("{}:{}:{}", entity, scope, id)
}

/// `<entity>-<id>`
pub fn entity_tag(entity: &str, id: &str) -> String {
    format!("{}-{}", entity, id)
}

/// `<parent>:<parentId>:<child>`
pub fn child_tag(parent: &str, parent_id: &str, child: &str) -> String {
    format!("{}:{}:{}", parent, parent_id, child)
}

pub fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}
