//! Activity-check evaluation and the tracker read model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::DomainError;
use crate::ids::{CharacterId, UserId};
use crate::models::character::{Character, CharacterStatus};

/// Flips every stale Active character to Inactive and returns their ids.
///
/// Inactive and Dead characters are never touched, so a second pass with
/// the same inputs changes nothing.
pub fn evaluate(characters: &mut [Character], cutoff: NaiveDate, at: DateTime<Utc>) -> Vec<CharacterId> {
    characters
        .iter_mut()
        .filter_map(|c| c.deactivate_if_stale(cutoff, at).then_some(c.id))
        .collect()
}

/// One line of the activity tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerRow {
    pub character_id: CharacterId,
    pub name: String,
    pub owner_user_id: UserId,
    pub status: CharacterStatus,
    pub last_ic_post_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

impl From<&Character> for TrackerRow {
    fn from(c: &Character) -> Self {
        Self {
            character_id: c.id,
            name: c.name.clone(),
            owner_user_id: c.owner_user_id,
            status: c.status,
            last_ic_post_at: c.last_ic_post_at,
            joined_at: c.joined_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerSort {
    CharacterId,
    Name,
    #[default]
    LastIcPostAt,
    JoinedAt,
}

impl FromStr for TrackerSort {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "character_id" => Ok(TrackerSort::CharacterId),
            "name" => Ok(TrackerSort::Name),
            "last_ic_post_at" => Ok(TrackerSort::LastIcPostAt),
            "joined_at" => Ok(TrackerSort::JoinedAt),
            other => Err(DomainError::InvalidInput(format!("unknown sort field '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(DomainError::InvalidInput(format!("unknown sort direction '{other}'"))),
        }
    }
}

/// Active characters the next check would flip, i.e. no IC post since `cutoff`.
pub fn at_risk_rows(characters: &[Character], cutoff: NaiveDate) -> Vec<TrackerRow> {
    characters
        .iter()
        .filter(|c| c.is_stale(cutoff))
        .map(TrackerRow::from)
        .collect()
}

/// Never-posted characters sort before everyone else when ascending.
pub fn sort_rows(rows: &mut [TrackerRow], sort: TrackerSort, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let ord = match sort {
            TrackerSort::CharacterId => a.character_id.cmp(&b.character_id),
            TrackerSort::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            TrackerSort::LastIcPostAt => a.last_ic_post_at.cmp(&b.last_ic_post_at),
            TrackerSort::JoinedAt => a.joined_at.cmp(&b.joined_at),
        }
        .then_with(|| a.character_id.cmp(&b.character_id));
        match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
}
