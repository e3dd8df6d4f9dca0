//! Request and response bodies that are not plain domain types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use domains::activity::TrackerRow;
use domains::catalog::SkillCategory;
use domains::{Character, CharacterId, Decision, SkillAction, ThreadId};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub next_check_date: NaiveDate,
    pub cutoff_date: NaiveDate,
}

/// Raw query strings so bad values surface as `INVALID_INPUT`.
#[derive(Debug, Default, Deserialize)]
pub struct TrackerQuery {
    pub sort: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrackerResponse {
    pub next_check_date: NaiveDate,
    pub cutoff_date: NaiveDate,
    pub characters: Vec<TrackerRow>,
}

/// A character with its derived skill total alongside the parts.
#[derive(Debug, Serialize, Deserialize)]
pub struct CharacterResponse {
    #[serde(flatten)]
    pub character: Character,
    pub total_skill: u32,
}

impl From<Character> for CharacterResponse {
    fn from(character: Character) -> Self {
        Self {
            total_skill: character.total_skill(),
            character,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DropdownRequest {
    pub show: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EditPostRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EligibilityQuery {
    pub character_id: CharacterId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EligibilityResponse {
    pub character_id: CharacterId,
    pub thread_id: ThreadId,
    pub eligible: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub q: Option<String>,
    #[serde(default)]
    pub grouped: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CatalogResponse {
    Flat(Vec<SkillAction>),
    Grouped(Vec<SkillCategory>),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimListQuery {
    pub character_id: CharacterId,
    pub thread_id: ThreadId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}
