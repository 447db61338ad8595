use std::fmt;
use std::ops::RangeInclusive;

use chrono::{NaiveDate, NaiveTime};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

#[cfg(feature = "serde")]
fn serialize_time<S: Serializer>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
    match time {
        Some(time) => serializer.serialize_str(&time.format("%H:%M").to_string()),
        None => serializer.serialize_none(),
    }
}

/// A single calendar entry. Only constructible through [`Draft::build`], so
/// every `Event` in circulation upholds its invariants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Event {
    date: NaiveDate,
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_time"))]
    start: Option<NaiveTime>,
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_time"))]
    end: Option<NaiveTime>,
    title: String,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    location: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    description: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    category: Option<String>,
}

impl Event {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn start(&self) -> Option<NaiveTime> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveTime> {
        self.end
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn is_all_day(&self) -> bool {
        self.start.is_none()
    }
}

/// Canonical labeled form, readable by [`crate::parse_calendar`].
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "date: {}", self.date.format("%Y-%m-%d"))?;

        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                writeln!(f, "time: {}-{}", start.format("%H:%M"), end.format("%H:%M"))?
            }
            (Some(start), None) => writeln!(f, "time: {}", start.format("%H:%M"))?,
            _ => {}
        }

        writeln!(f, "title: {}", self.title)?;

        if let Some(location) = &self.location {
            writeln!(f, "location: {location}")?;
        }

        if let Some(category) = &self.category {
            writeln!(f, "category: {category}")?;
        }

        if let Some(description) = &self.description {
            let mut lines = description.lines();
            writeln!(f, "description: {}", lines.next().unwrap_or_default())?;
            for line in lines {
                writeln!(f, "  {line}")?;
            }
        }

        Ok(())
    }
}

/// Why a [`Draft`] could not become an [`Event`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Invalid {
    #[error("missing required field `title`")]
    MissingTitle,
    #[error("missing required field `date`")]
    MissingDate,
    #[error("end time {end} is before start time {start}")]
    EndBeforeStart { start: NaiveTime, end: NaiveTime },
    #[error("end time {0} given without a start time")]
    EndWithoutStart(NaiveTime),
}

/// Unvalidated event fields, filled in while an entry is being read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub date: Option<NaiveDate>,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Draft {
    pub fn build(self) -> Result<Event, Invalid> {
        let title = non_empty(self.title).ok_or(Invalid::MissingTitle)?;
        let date = self.date.ok_or(Invalid::MissingDate)?;

        match (self.start, self.end) {
            (None, Some(end)) => return Err(Invalid::EndWithoutStart(end)),
            (Some(start), Some(end)) if end < start => {
                return Err(Invalid::EndBeforeStart { start, end })
            }
            _ => {}
        }

        Ok(Event {
            date,
            start: self.start,
            end: self.end,
            title,
            location: non_empty(self.location),
            description: non_empty(self.description),
            category: non_empty(self.category),
        })
    }
}

/// All events of one run, sorted by date, then start time (all-day entries
/// first), then title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Snapshot {
    events: Vec<Event>,
}

impl Snapshot {
    pub fn new(mut events: Vec<Event>) -> Self {
        events.sort_by(|a, b| {
            (a.date, a.start, &a.title).cmp(&(b.date, b.start, &b.title))
        });
        Self { events }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events dated between `first` and `last`, both inclusive.
    #[must_use]
    pub fn within(&self, first: NaiveDate, last: NaiveDate) -> Self {
        let events = self
            .events
            .iter()
            .filter(|event| first <= event.date && event.date <= last)
            .cloned()
            .collect();
        Self { events }
    }

    /// Drops the events at the given 1-based position ranges. Positions past
    /// the end are ignored.
    #[must_use]
    pub fn without(&self, ranges: &[RangeInclusive<usize>]) -> Self {
        let events = self
            .events
            .iter()
            .enumerate()
            .filter(|(idx, _)| !ranges.iter().any(|range| range.contains(&(idx + 1))))
            .map(|(_, event)| event.clone())
            .collect();
        Self { events }
    }

    /// Writes the snapshot back into calendar source text.
    pub fn to_source(&self) -> String {
        self.events
            .iter()
            .map(Event::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Hex SHA-256 of the canonical source form.
    pub fn identity(&self) -> String {
        let digest = Sha256::digest(self.to_source().as_bytes());
        format!("{digest:x}")
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
