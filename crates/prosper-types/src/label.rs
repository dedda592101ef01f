//! Snapshot label generation.
//!
//! Labels have the form `PREFIX_YYYYmmdd_HHMMSS_ffffff` (local time,
//! microsecond precision). Fixed-width fields make lexical order equal to
//! chronological order. Two labels requested within the same microsecond,
//! or after the wall clock stepped backwards, are kept apart by advancing
//! one microsecond past the previous label.

use chrono::{NaiveDateTime, SubsecRound, TimeDelta};

use crate::error::TypeError;
use crate::ids::SnapshotLabel;

/// Timestamp layout appended to the prefix.
const LABEL_TIME_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// Produces strictly increasing snapshot labels.
#[derive(Debug, Clone)]
pub struct LabelGenerator {
    prefix: String,
    last: Option<NaiveDateTime>,
}

impl LabelGenerator {
    /// Create a generator for labels starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::InvalidName`] if the prefix cannot start a
    /// column name.
    pub fn new(prefix: &str) -> Result<Self, TypeError> {
        let prefix = prefix.trim();
        SnapshotLabel::parse(&format!("{prefix}_20000101_000000_000000"))?;
        Ok(Self {
            prefix: prefix.to_owned(),
            last: None,
        })
    }

    /// The prefix every label starts with.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Produce a label for the current local time.
    ///
    /// # Errors
    ///
    /// See [`LabelGenerator::label_at`].
    pub fn next_label(&mut self) -> Result<SnapshotLabel, TypeError> {
        self.label_at(chrono::Local::now().naive_local())
    }

    /// Produce a label for `now`, bumping past the previous label if needed.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::LabelClockExhausted`] if the instant cannot be
    /// advanced (end of the representable calendar).
    pub fn label_at(&mut self, now: NaiveDateTime) -> Result<SnapshotLabel, TypeError> {
        let now = now.trunc_subsecs(6);
        let instant = match self.last {
            Some(prev) if now <= prev => prev
                .checked_add_signed(TimeDelta::microseconds(1))
                .ok_or_else(|| TypeError::LabelClockExhausted(prev.to_string()))?,
            _ => now,
        };
        self.last = Some(instant);

        SnapshotLabel::parse(&format!(
            "{}_{}",
            self.prefix,
            instant.format(LABEL_TIME_FORMAT)
        ))
    }
}
