// SPDX-License-Identifier: MIT OR Apache-2.0
//! Montage asset: sections and the authored notify track.

use crate::definition::{IntervalNotify, NotifyDefinition, PointNotify};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Montage validation errors
#[derive(Debug, Error, PartialEq)]
pub enum MontageError {
    /// Montage length is zero, negative or not finite
    #[error("Montage length must be positive, got {0}")]
    InvalidLength(f32),

    /// Notify time is negative or not finite
    #[error("Notify '{name}' has invalid time {time}")]
    InvalidNotifyTime {
        /// Notify name
        name: String,
        /// Authored time
        time: f32,
    },

    /// Notify placed after the end of the montage
    #[error("Notify '{name}' at {time} is beyond montage length {length}")]
    NotifyBeyondLength {
        /// Notify name
        name: String,
        /// Authored time
        time: f32,
        /// Montage length
        length: f32,
    },

    /// Interval notify with a negative or non-finite duration
    #[error("Notify '{name}' has invalid duration {duration}")]
    InvalidDuration {
        /// Notify name
        name: String,
        /// Authored duration
        duration: f32,
    },

    /// Two sections share a name
    #[error("Duplicate section name: {0}")]
    DuplicateSection(String),

    /// Section starts outside the montage
    #[error("Section '{name}' starts at {start}, outside the montage")]
    SectionOutOfRange {
        /// Section name
        name: String,
        /// Section start time
        start: f32,
    },

    /// Next-section link points to a missing section
    #[error("Section '{section}' links to unknown section '{next}'")]
    UnknownNextSection {
        /// Linking section
        section: String,
        /// Missing target
        next: String,
    },
}

/// Result type for montage operations
pub type Result<T> = std::result::Result<T, MontageError>;

/// Unique identifier for a montage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MontageId(pub Uuid);

impl MontageId {
    /// Create a new random montage ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MontageId {
    fn default() -> Self {
        Self::new()
    }
}

/// A named section of a montage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MontageSection {
    /// Section name
    pub name: String,
    /// Start time in seconds
    pub start_time: f32,
    /// Section played after this one ends, if linked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_section: Option<String>,
}

impl MontageSection {
    /// Create a section
    pub fn new(name: impl Into<String>, start_time: f32) -> Self {
        Self {
            name: name.into(),
            start_time,
            next_section: None,
        }
    }

    /// Link the section played after this one
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next_section = Some(next.into());
        self
    }
}

/// An entry of the authored notify track
#[derive(Debug, Clone)]
pub struct NotifyTrackEntry {
    /// Trigger time in seconds
    pub time: f32,
    /// Duration in seconds, only meaningful for interval notifies
    pub duration: f32,
    /// Point or interval definition
    pub definition: NotifyDefinition,
}

impl NotifyTrackEntry {
    /// End time of the entry
    pub fn end_time(&self) -> f32 {
        self.time + self.duration
    }
}

/// An animation montage
#[derive(Debug, Clone)]
pub struct Montage {
    /// Unique montage ID
    pub id: MontageId,
    /// Montage name
    pub name: String,
    /// Length in seconds at play rate 1
    pub length: f32,
    sections: Vec<MontageSection>,
    notifies: Vec<NotifyTrackEntry>,
}

impl Montage {
    /// Create an empty montage
    pub fn new(name: impl Into<String>, length: f32) -> Self {
        Self {
            id: MontageId::new(),
            name: name.into(),
            length,
            sections: Vec::new(),
            notifies: Vec::new(),
        }
    }

    /// Add a section, keeping sections ordered by start time
    pub fn add_section(&mut self, section: MontageSection) {
        self.sections.push(section);
        self.sections.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    }

    /// Builder form of [`Montage::add_section`]
    pub fn with_section(mut self, section: MontageSection) -> Self {
        self.add_section(section);
        self
    }

    /// Add a notify track entry, keeping entries ordered by time
    pub fn add_notify(&mut self, entry: NotifyTrackEntry) {
        self.notifies.push(entry);
        self.notifies.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    /// Add a point notify, returning the strong definition handle
    pub fn add_point(&mut self, time: f32, notify: Arc<dyn PointNotify>) -> Arc<dyn PointNotify> {
        self.add_notify(NotifyTrackEntry {
            time,
            duration: 0.0,
            definition: NotifyDefinition::Point(Arc::clone(&notify)),
        });
        notify
    }

    /// Add an interval notify, returning the strong definition handle
    pub fn add_interval(
        &mut self,
        time: f32,
        duration: f32,
        notify: Arc<dyn IntervalNotify>,
    ) -> Arc<dyn IntervalNotify> {
        self.add_notify(NotifyTrackEntry {
            time,
            duration,
            definition: NotifyDefinition::Interval(Arc::clone(&notify)),
        });
        notify
    }

    /// Remove every notify whose definition has the given name.
    ///
    /// Events already scheduled from them keep a dangling weak link.
    pub fn remove_notifies_named(&mut self, name: &str) -> usize {
        let before = self.notifies.len();
        self.notifies.retain(|n| n.definition.name() != name);
        before - self.notifies.len()
    }

    /// Authored notify track
    pub fn notifies(&self) -> &[NotifyTrackEntry] {
        &self.notifies
    }

    /// Sections ordered by start time
    pub fn sections(&self) -> &[MontageSection] {
        &self.sections
    }

    /// Get a section by name
    pub fn section(&self, name: &str) -> Option<&MontageSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Index of a named section
    pub fn section_index(&self, name: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.name == name)
    }

    /// Start and end time of a section
    pub fn section_time_range(&self, index: usize) -> Option<(f32, f32)> {
        let section = self.sections.get(index)?;
        let end = self
            .sections
            .get(index + 1)
            .map(|s| s.start_time)
            .unwrap_or(self.length);
        Some((section.start_time, end))
    }

    /// Index of the section containing a montage time.
    ///
    /// Sections are half-open `[start, end)`, except that the last section
    /// also contains the montage end.
    pub fn section_index_from_position(&self, time: f32) -> Option<usize> {
        let last = self.sections.len().checked_sub(1)?;
        (0..self.sections.len()).find(|&index| {
            self.section_time_range(index).is_some_and(|(start, end)| {
                time >= start && (time < end || (index == last && time <= end))
            })
        })
    }

    /// Name of the section containing a montage time
    pub fn section_name_from_position(&self, time: f32) -> Option<&str> {
        self.section_index_from_position(time)
            .map(|index| self.sections[index].name.as_str())
    }

    /// Check the asset for authoring mistakes
    pub fn validate(&self) -> Result<()> {
        if !self.length.is_finite() || self.length <= 0.0 {
            return Err(MontageError::InvalidLength(self.length));
        }

        for (index, section) in self.sections.iter().enumerate() {
            if self.sections[..index].iter().any(|s| s.name == section.name) {
                return Err(MontageError::DuplicateSection(section.name.clone()));
            }
            if !section.start_time.is_finite() || section.start_time < 0.0 || section.start_time > self.length {
                return Err(MontageError::SectionOutOfRange {
                    name: section.name.clone(),
                    start: section.start_time,
                });
            }
            if let Some(next) = &section.next_section {
                if self.section(next).is_none() {
                    return Err(MontageError::UnknownNextSection {
                        section: section.name.clone(),
                        next: next.clone(),
                    });
                }
            }
        }

        for entry in &self.notifies {
            let name = entry.definition.name().to_string();
            if !entry.time.is_finite() || entry.time < 0.0 {
                return Err(MontageError::InvalidNotifyTime { name, time: entry.time });
            }
            if entry.time > self.length {
                return Err(MontageError::NotifyBeyondLength {
                    name,
                    time: entry.time,
                    length: self.length,
                });
            }
            if entry.definition.is_interval() && (!entry.duration.is_finite() || entry.duration < 0.0) {
                return Err(MontageError::InvalidDuration {
                    name,
                    duration: entry.duration,
                });
            }
        }

        Ok(())
    }
}
