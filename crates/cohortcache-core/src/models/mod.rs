//! Typed data transfer objects handed to the UI layer.
//!
//! - `Contact`, `Institution`: people and the institutions they belong to
//! - `Initiative`, `Cohort`, `CohortDetails`: programs and their runs
//! - `Team`, `TeamMember`, `ParticipationRecord`, `Submission`: who takes part and what they hand in
//! - `Event`: scheduled events with capacity-limited registration
//! - `Partnership`: institution/initiative agreements
//! - `PointsSummary`, `Reward`: the points ledger
//!
//! Ids are the external record ids. Field names are camelCase on the wire.

pub mod contact;
pub mod event;
pub mod institution;
pub mod participation;
pub mod partnership;
pub mod points;
pub mod program;
pub mod submission;
pub mod team;

pub use contact::{Contact, ContactUpdate, ProfileEditState};
pub use event::{Event, EventDraft, RegistrationWindow};
pub use institution::Institution;
pub use participation::{ParticipationDraft, ParticipationRecord};
pub use partnership::{Partnership, PartnershipDraft, PartnershipStatus};
pub use points::{PointsSummary, Reward, RewardClaim};
pub use program::{Cohort, CohortDetails, Initiative, ParticipationType};
pub use submission::{Submission, SubmissionDraft};
pub use team::{MembershipStatus, Team, TeamMember};
