//! Deployment policy for an election.
//!
//! ```toml
//! close_policy = "creator_after_deadline"
//! deadline = 1767225600000
//! ```

use crate::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Who may close the election, and when.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosePolicy {
    /// Only the creator, at any time.
    #[default]
    Creator,
    /// Anyone, once ledger time is past the deadline.
    Deadline,
    /// Only the creator, and only once ledger time is past the deadline.
    CreatorAfterDeadline,
}

impl ClosePolicy {
    pub fn requires_creator(self) -> bool {
        matches!(self, ClosePolicy::Creator | ClosePolicy::CreatorAfterDeadline)
    }

    pub fn requires_deadline(self) -> bool {
        matches!(self, ClosePolicy::Deadline | ClosePolicy::CreatorAfterDeadline)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ElectionConfig {
    pub close_policy: ClosePolicy,

    /// Last ledger timestamp at which ballots are accepted. Recorded in
    /// global state when the election is created.
    pub deadline: Option<u64>,
}

impl ElectionConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, Error> {
        let config: ElectionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("writing {}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.close_policy.requires_deadline() && self.deadline.is_none() {
            return Err(Error::Config(format!(
                "close policy {:?} needs a deadline",
                self.close_policy
            )));
        }
        Ok(())
    }
}
