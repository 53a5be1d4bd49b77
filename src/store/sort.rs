use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SyncError};
use crate::model::{EntityNode, Gist};

/// Sort criteria for gist listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortType {
    /// Case-insensitive description, falling back to the id.
    #[default]
    Name,
    CreationTime,
    UpdateTime,
}

impl SortType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortType::Name => "name",
            SortType::CreationTime => "creationTime",
            SortType::UpdateTime => "updateTime",
        }
    }

    /// Cycle to the next sort option.
    pub fn next(&self) -> Self {
        match self {
            SortType::Name => SortType::CreationTime,
            SortType::CreationTime => SortType::UpdateTime,
            SortType::UpdateTime => SortType::Name,
        }
    }
}

impl fmt::Display for SortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(SortType::Name),
            "creationTime" => Ok(SortType::CreationTime),
            "updateTime" => Ok(SortType::UpdateTime),
            other => Err(SyncError::configuration(format!("unknown sort type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ascending",
            SortDirection::Descending => "descending",
        }
    }

    pub fn toggle(&self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDirection {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ascending" => Ok(SortDirection::Ascending),
            "descending" => Ok(SortDirection::Descending),
            other => Err(SyncError::configuration(format!("unknown sort direction: {}", other))),
        }
    }
}

fn compare(a: &Gist, b: &Gist, sort_type: SortType) -> Ordering {
    match sort_type {
        SortType::Name => a
            .display_name()
            .to_lowercase()
            .cmp(&b.display_name().to_lowercase()),
        SortType::CreationTime => a.created_at.cmp(&b.created_at),
        SortType::UpdateTime => a.updated_at.cmp(&b.updated_at),
    }
}

/// Stable in-place sort. Never touches the network.
pub fn sort_entities(list: &mut [EntityNode], sort_type: SortType, direction: SortDirection) {
    list.sort_by(|a, b| {
        let cmp = compare(&a.gist, &b.gist, sort_type);
        match direction {
            SortDirection::Ascending => cmp,
            SortDirection::Descending => cmp.reverse(),
        }
    });
}
