//! External field names, per table.
//!
//! The base uses spreadsheet-style column names. This table is the only
//! place they appear; bump `SCHEMA_VERSION` whenever a name changes so
//! cached shapes and deployed configs can be told apart.

pub const SCHEMA_VERSION: u32 = 3;

/// A linked-record column and the lookup column exposing the linked record
/// ids. Writes go to `link`; filters match against `ids`, since a filter
/// formula over a link column sees display names, not ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkField {
    pub link: &'static str,
    pub ids: &'static str,
}

pub mod contact {
    use super::LinkField;

    pub const FIRST_NAME: &str = "First Name";
    pub const LAST_NAME: &str = "Last Name";
    pub const EMAIL: &str = "Email";
    pub const AUTH_ID: &str = "Auth ID";
    pub const EDUCATION: LinkField = LinkField {
        link: "Education",
        ids: "Education ID",
    };
    pub const INSTITUTION_NAMES: &str = "Institution (from Education)";
    pub const PROFILE_EDIT: &str = "Profile Edit Status";
}

pub mod institution {
    pub const NAME: &str = "Name";
    pub const STREET: &str = "Street Address";
    pub const CITY: &str = "City";
    pub const STATE: &str = "State/Province";
    pub const POSTAL_CODE: &str = "Postal Code";
    pub const COUNTRY: &str = "Country";
}

pub mod initiative {
    pub const NAME: &str = "Name";
    pub const DESCRIPTION: &str = "Description";
    pub const PARTICIPATION_TYPE: &str = "Participation Type";
    pub const MAX_TEAM_SIZE: &str = "Max Team Size";
}

pub mod cohort {
    use super::LinkField;

    pub const NAME: &str = "Short Name";
    pub const INITIATIVE: LinkField = LinkField {
        link: "Initiative",
        ids: "Initiative ID",
    };
    pub const STATUS: &str = "Status";
    pub const START_DATE: &str = "Start Date";
    pub const END_DATE: &str = "End Date";
    pub const TOPICS: &str = "Topics";
    pub const CLASSES: &str = "Classes";
}

/// Topics, classes and milestones share one shape.
pub mod named {
    pub const NAME: &str = "Name";
}

pub mod team {
    pub const NAME: &str = "Team Name";
    pub const COHORT: &str = "Cohort";
    pub const MEMBERS: &str = "Members";
    pub const POINTS: &str = "Points";
    pub const SUBMISSIONS: &str = "Submissions";
}

pub mod member {
    use super::LinkField;

    pub const TEAM: LinkField = LinkField {
        link: "Team",
        ids: "Team ID",
    };
    pub const CONTACT: LinkField = LinkField {
        link: "Contact",
        ids: "Contact ID",
    };
    pub const STATUS: &str = "Status";
    pub const POINTS: &str = "Points";
}

pub mod participation {
    use super::LinkField;

    pub const CONTACT: LinkField = LinkField {
        link: "Contacts",
        ids: "Contact ID",
    };
    pub const COHORT: LinkField = LinkField {
        link: "Cohorts",
        ids: "Cohort ID",
    };
    pub const TEAM: &str = "Team";
    pub const STATUS: &str = "Status";
    pub const CAPACITY: &str = "Capacity";
}

pub mod submission {
    use super::LinkField;

    pub const TEAM: LinkField = LinkField {
        link: "Team",
        ids: "Team ID",
    };
    pub const CONTACT: &str = "Contact";
    pub const MILESTONE: &str = "Milestone";
    pub const LINK: &str = "Link";
    pub const STATUS: &str = "Status";
    pub const SUBMITTED_AT: &str = "Submitted At";
}

pub mod event {
    use super::LinkField;

    pub const NAME: &str = "Event Name";
    pub const DESCRIPTION: &str = "Description";
    pub const START: &str = "Start";
    pub const END: &str = "End";
    pub const REGISTRATION_OPENS: &str = "Registration Opens";
    pub const REGISTRATION_CLOSES: &str = "Registration Closes";
    pub const CAPACITY: &str = "Capacity";
    pub const REGISTERED: &str = "Registered Contacts";
    pub const PROGRAM: LinkField = LinkField {
        link: "Initiative",
        ids: "Initiative ID",
    };
    pub const COHORT: LinkField = LinkField {
        link: "Cohort",
        ids: "Cohort ID",
    };
}

pub mod partnership {
    use super::LinkField;

    pub const INSTITUTION: LinkField = LinkField {
        link: "Institution",
        ids: "Institution ID",
    };
    pub const INITIATIVE: LinkField = LinkField {
        link: "Initiative",
        ids: "Initiative ID",
    };
    pub const STATUS: &str = "Status";
    pub const START_DATE: &str = "Start Date";
    pub const END_DATE: &str = "End Date";
}

pub mod reward {
    pub const NAME: &str = "Name";
    pub const DESCRIPTION: &str = "Description";
    pub const COST: &str = "Point Cost";
    pub const AVAILABLE: &str = "Available";
}

pub mod claimed_reward {
    use super::LinkField;

    pub const CONTACT: LinkField = LinkField {
        link: "Contact",
        ids: "Contact ID",
    };
    pub const REWARD: &str = "Reward";
    pub const COST: &str = "Points Spent";
}

pub mod achievement {
    use super::LinkField;

    pub const CONTACT: LinkField = LinkField {
        link: "Contact",
        ids: "Contact ID",
    };
    pub const POINTS: &str = "Points";
}
