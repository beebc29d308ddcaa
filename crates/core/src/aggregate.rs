//! Command/event aggregate contract.
//!
//! An aggregate decides with [`Aggregate::handle`] and evolves with
//! [`Aggregate::apply`]. The split keeps every business rule a pure function of
//! `(state, command)`; callers persist the result of applying the events.

use core::fmt;

use crate::error::{DomainError, DomainResult};

pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied so far. Stored with the row and compared on
    /// write to catch lost updates.
    fn version(&self) -> u64;
}

/// Version a writer believes the stored aggregate is at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    Any,
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            return Ok(());
        }
        Err(DomainError::conflict(format!(
            "expected version {self}, found {actual}"
        )))
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedVersion::Any => f.write_str("any"),
            ExpectedVersion::Exact(v) => write!(f, "{v}"),
        }
    }
}

pub trait Aggregate: AggregateRoot {
    type Command: Clone + fmt::Debug;
    type Event: Clone + fmt::Debug;
    type Error: fmt::Debug;

    /// Must bump `version()` by exactly one.
    fn apply(&mut self, event: &Self::Event);

    /// Validate `command` against current state. Never mutates.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Handle `command` and, when accepted, apply every resulting event.
    /// A rejected command leaves the aggregate untouched.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle(command)?;
        for event in &events {
            self.apply(event);
        }
        Ok(events)
    }
}
