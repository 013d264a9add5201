//! Mutation -> cache tag and page path invalidation.
//!
//! Each mutation kind maps to a fixed list of tag and path rules. Rules are
//! rendered against the mutation's own ids and the ids of related entities,
//! deduplicated, and applied in one pass: the in-process cache first, then
//! the page cache sink. Both have finished when `on_mutation` returns.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::cache::keys::{self, child_tag, entity_tag};
use crate::cache::CacheStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Contact,
    Participation,
    TeamMember,
    Submission,
    RewardClaim,
    Event,
    EventRegistration,
    Partnership,
}

/// Entities a mutation touches besides the written record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Contact,
    User,
    Team,
    Cohort,
    Program,
    Event,
    Institution,
    Initiative,
}

impl Relation {
    /// Parent segment used in `<parent>:<id>:<child>` tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Contact => "contact",
            Relation::User => "user",
            Relation::Team => "team",
            Relation::Cohort => "cohort",
            Relation::Program => "program",
            Relation::Event => "event",
            Relation::Institution => "institution",
            Relation::Initiative => "initiative",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub kind: EntityKind,
    /// Ids of the records written.
    pub ids: Vec<String>,
    pub related: Vec<(Relation, String)>,
}

impl Mutation {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            ids: vec![id.into()],
            related: Vec::new(),
        }
    }

    pub fn with(mut self, relation: Relation, id: impl Into<String>) -> Self {
        self.related.push((relation, id.into()));
        self
    }

    /// Attach a relation only when the id is known.
    pub fn with_opt(self, relation: Relation, id: Option<&str>) -> Self {
        match id {
            Some(id) => self.with(relation, id),
            None => self,
        }
    }

    fn related_ids(&self, relation: Relation) -> impl Iterator<Item = &str> {
        self.related
            .iter()
            .filter(move |(r, _)| *r == relation)
            .map(|(_, id)| id.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TagRule {
    /// A fixed tag such as `events`.
    Static(&'static str),
    /// `<entity>-<id>` for each written id.
    Entity(&'static str),
    /// `<entity>-<id>` for each related id.
    RelatedEntity(Relation, &'static str),
    /// `<relation>:<id>:<child>` for each related id.
    Child(Relation, &'static str),
}

#[derive(Debug, Clone, Copy)]
pub enum PathRule {
    Static(&'static str),
    /// Template with `{}` replaced by each related id.
    Related(Relation, &'static str),
}

const CONTACT_TAGS: &[TagRule] = &[TagRule::Entity(keys::CONTACTS)];
const CONTACT_PATHS: &[PathRule] = &[PathRule::Static("/profile")];

const PARTICIPATION_TAGS: &[TagRule] = &[
    TagRule::Entity(keys::PARTICIPATION),
    TagRule::Child(Relation::Contact, keys::PARTICIPATION),
    TagRule::Child(Relation::Cohort, keys::PARTICIPATION),
];
const PARTICIPATION_PATHS: &[PathRule] = &[
    PathRule::Static("/dashboard"),
    PathRule::Related(Relation::Cohort, "/cohorts/{}"),
];

const TEAM_MEMBER_TAGS: &[TagRule] = &[
    TagRule::RelatedEntity(Relation::Team, keys::TEAMS),
    TagRule::Child(Relation::Contact, keys::TEAMS),
];
const TEAM_MEMBER_PATHS: &[PathRule] = &[PathRule::Related(Relation::Team, "/teams/{}")];

const SUBMISSION_TAGS: &[TagRule] = &[
    TagRule::Child(Relation::Team, keys::SUBMISSIONS),
    TagRule::RelatedEntity(Relation::Team, keys::TEAMS),
];
const SUBMISSION_PATHS: &[PathRule] = &[PathRule::Related(Relation::Team, "/teams/{}/submissions")];

const REWARD_CLAIM_TAGS: &[TagRule] = &[TagRule::Child(Relation::User, keys::POINTS)];
const REWARD_CLAIM_PATHS: &[PathRule] = &[PathRule::Static("/rewards")];

const EVENT_TAGS: &[TagRule] = &[
    TagRule::Static(keys::EVENTS),
    TagRule::Static(keys::UPCOMING_EVENTS),
    TagRule::Entity(keys::EVENTS),
    TagRule::Child(Relation::Program, keys::EVENTS),
    TagRule::Child(Relation::Cohort, keys::EVENTS),
];
const EVENT_REGISTRATION_TAGS: &[TagRule] = &[
    TagRule::Static(keys::EVENTS),
    TagRule::Static(keys::UPCOMING_EVENTS),
    TagRule::RelatedEntity(Relation::Event, keys::EVENTS),
    TagRule::Child(Relation::Program, keys::EVENTS),
    TagRule::Child(Relation::Cohort, keys::EVENTS),
];
const EVENT_PATHS: &[PathRule] = &[
    PathRule::Static("/events"),
    PathRule::Related(Relation::Event, "/events/{}"),
    PathRule::Related(Relation::Program, "/programs/{}/events"),
];

const PARTNERSHIP_TAGS: &[TagRule] = &[
    TagRule::Entity(keys::PARTNERSHIPS),
    TagRule::Child(Relation::Institution, keys::PARTNERSHIPS),
    TagRule::Child(Relation::Initiative, keys::PARTNERSHIPS),
];
const PARTNERSHIP_PATHS: &[PathRule] = &[PathRule::Related(
    Relation::Institution,
    "/institutions/{}/partnerships",
)];

pub fn tag_rules(kind: EntityKind) -> &'static [TagRule] {
    match kind {
        EntityKind::Contact => CONTACT_TAGS,
        EntityKind::Participation => PARTICIPATION_TAGS,
        EntityKind::TeamMember => TEAM_MEMBER_TAGS,
        EntityKind::Submission => SUBMISSION_TAGS,
        EntityKind::RewardClaim => REWARD_CLAIM_TAGS,
        EntityKind::Event => EVENT_TAGS,
        EntityKind::EventRegistration => EVENT_REGISTRATION_TAGS,
        EntityKind::Partnership => PARTNERSHIP_TAGS,
    }
}

pub fn path_rules(kind: EntityKind) -> &'static [PathRule] {
    match kind {
        EntityKind::Contact => CONTACT_PATHS,
        EntityKind::Participation => PARTICIPATION_PATHS,
        EntityKind::TeamMember => TEAM_MEMBER_PATHS,
        EntityKind::Submission => SUBMISSION_PATHS,
        EntityKind::RewardClaim => REWARD_CLAIM_PATHS,
        EntityKind::Event | EntityKind::EventRegistration => EVENT_PATHS,
        EntityKind::Partnership => PARTNERSHIP_PATHS,
    }
}

/// Push `value` unless already present, keeping first-seen order.
fn push_unique(out: &mut Vec<String>, seen: &mut HashSet<String>, value: String) {
    if seen.insert(value.clone()) {
        out.push(value);
    }
}

pub fn render_tags(mutation: &Mutation) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for rule in tag_rules(mutation.kind) {
        match *rule {
            TagRule::Static(tag) => push_unique(&mut out, &mut seen, tag.to_string()),
            TagRule::Entity(entity) => {
                for id in &mutation.ids {
                    push_unique(&mut out, &mut seen, entity_tag(entity, id));
                }
            }
            TagRule::RelatedEntity(relation, entity) => {
                for id in mutation.related_ids(relation) {
                    push_unique(&mut out, &mut seen, entity_tag(entity, id));
                }
            }
            TagRule::Child(relation, child) => {
                for id in mutation.related_ids(relation) {
                    push_unique(&mut out, &mut seen, child_tag(relation.as_str(), id, child));
                }
            }
        }
    }
    out
}

pub fn render_paths(mutation: &Mutation) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for rule in path_rules(mutation.kind) {
        match *rule {
            PathRule::Static(path) => push_unique(&mut out, &mut seen, path.to_string()),
            PathRule::Related(relation, template) => {
                for id in mutation.related_ids(relation) {
                    push_unique(&mut out, &mut seen, template.replace("{}", id));
                }
            }
        }
    }
    out
}

/// Downstream page cache, told which tags and paths went stale.
pub trait PageInvalidator: Send + Sync {
    fn revalidate_tag(&self, tag: &str);
    fn revalidate_path(&self, path: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidator;

impl PageInvalidator for NoopInvalidator {
    fn revalidate_tag(&self, _tag: &str) {}
    fn revalidate_path(&self, _path: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Tag(String),
    Path(String),
}

/// Keeps every call, in order.
#[derive(Debug, Default)]
pub struct RecordingInvalidator {
    log: Mutex<Vec<Invalidation>>,
}

impl RecordingInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Vec<Invalidation> {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|entry| match entry {
                Invalidation::Tag(tag) => Some(tag),
                Invalidation::Path(_) => None,
            })
            .collect()
    }

    pub fn paths(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|entry| match entry {
                Invalidation::Path(path) => Some(path),
                Invalidation::Tag(_) => None,
            })
            .collect()
    }

    /// How many times `tag` was revalidated.
    pub fn tag_count(&self, tag: &str) -> usize {
        self.tags().iter().filter(|t| t.as_str() == tag).count()
    }

    fn push(&self, entry: Invalidation) {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }
}

impl PageInvalidator for RecordingInvalidator {
    fn revalidate_tag(&self, tag: &str) {
        self.push(Invalidation::Tag(tag.to_string()));
    }

    fn revalidate_path(&self, path: &str) {
        self.push(Invalidation::Path(path.to_string()));
    }
}

/// What one mutation invalidated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Revalidation {
    pub tags: Vec<String>,
    pub paths: Vec<String>,
    /// Cache entries dropped.
    pub evicted: usize,
}

#[derive(Clone)]
pub struct RevalidationCoordinator {
    cache: CacheStore,
    sink: Arc<dyn PageInvalidator>,
}

impl RevalidationCoordinator {
    pub fn new(cache: CacheStore, sink: Arc<dyn PageInvalidator>) -> Self {
        Self { cache, sink }
    }

    pub fn on_mutation(&self, mutation: &Mutation) -> Revalidation {
        let tags = render_tags(mutation);
        let paths = render_paths(mutation);

        let mut evicted = 0;
        for tag in &tags {
            evicted += self.cache.invalidate(tag);
        }
        for tag in &tags {
            self.sink.revalidate_tag(tag);
        }
        for path in &paths {
            self.sink.revalidate_path(path);
        }

        info!(
            kind = ?mutation.kind,
            ids = ?mutation.ids,
            tags = tags.len(),
            paths = paths.len(),
            evicted = evicted,
            "Revalidated after mutation"
        );
        debug!(tags = ?tags, paths = ?paths, "Invalidated");

        Revalidation {
            tags,
            paths,
            evicted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_event_creation_tags() {
        let mutation = Mutation::new(EntityKind::Event, "e9").with(Relation::Program, "p1");
        let tags = render_tags(&mutation);
        assert_eq!(
            tags,
            vec!["events", "upcoming-events", "events-e9", "program:p1:events"]
        );
        let paths = render_paths(&mutation);
        assert_eq!(paths, vec!["/events", "/programs/p1/events"]);
    }

    #[test]
    fn test_rendered_tags_are_deduplicated() {
        let mutation = Mutation::new(EntityKind::Partnership, "pa1")
            .with(Relation::Institution, "inst1")
            .with(Relation::Institution, "inst1")
            .with(Relation::Initiative, "i1");
        let tags = render_tags(&mutation);
        assert_eq!(
            tags,
            vec![
                "partnerships-pa1",
                "institution:inst1:partnerships",
                "initiative:i1:partnerships"
            ]
        );
    }

    #[test]
    fn test_with_opt_skips_missing_relations() {
        let mutation = Mutation::new(EntityKind::Event, "e1")
            .with_opt(Relation::Program, None)
            .with_opt(Relation::Cohort, Some("c1"));
        assert_eq!(mutation.related, vec![(Relation::Cohort, "c1".to_string())]);
    }

    #[tokio::test]
    async fn test_on_mutation_invalidates_cache_and_notifies_sink() {
        let cache = CacheStore::new();
        let ttl = Duration::from_secs(60);
        cache.set("events:upcoming", 1u32, &keys::tags(&["events", "upcoming-events"]), ttl);
        cache.set(
            "events:program:p1",
            2u32,
            &["events".to_string(), "program:p1:events".to_string()],
            ttl,
        );
        cache.set("institution:inst1", 3u32, &keys::tags(&["institutions"]), ttl);

        let sink = Arc::new(RecordingInvalidator::new());
        let coordinator = RevalidationCoordinator::new(cache.clone(), sink.clone());
        let result = coordinator
            .on_mutation(&Mutation::new(EntityKind::Event, "e9").with(Relation::Program, "p1"));

        assert_eq!(result.evicted, 2);
        assert!(cache.get::<u32>("events:upcoming").is_none());
        assert!(cache.get::<u32>("events:program:p1").is_none());
        assert_eq!(cache.get::<u32>("institution:inst1"), Some(3));

        for tag in ["events", "upcoming-events", "program:p1:events"] {
            assert_eq!(sink.tag_count(tag), 1, "tag {}", tag);
        }
        assert_eq!(sink.paths(), vec!["/events", "/programs/p1/events"]);
        // Tags are sent before paths.
        assert!(matches!(sink.log().first(), Some(Invalidation::Tag(_))));
    }
}
