use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

use crate::error::{DomainError, Result};
use crate::ids::{CharacterId, ClaimId, SkillActionId, ThreadId, UserId};
use crate::models::character::Character;

/// Per-action contribution to the three skill dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillWeights {
    pub experience: u32,
    pub physical: u32,
    pub knowledge: u32,
}

impl SkillWeights {
    pub fn new(experience: u32, physical: u32, knowledge: u32) -> Self {
        Self {
            experience,
            physical,
            knowledge,
        }
    }

    pub fn total(&self) -> u32 {
        self.experience
            .saturating_add(self.physical)
            .saturating_add(self.knowledge)
    }
}

impl Add for SkillWeights {
    type Output = SkillWeights;

    fn add(self, rhs: SkillWeights) -> SkillWeights {
        SkillWeights {
            experience: self.experience.saturating_add(rhs.experience),
            physical: self.physical.saturating_add(rhs.physical),
            knowledge: self.knowledge.saturating_add(rhs.knowledge),
        }
    }
}

impl Sum for SkillWeights {
    fn sum<I: Iterator<Item = SkillWeights>>(iter: I) -> SkillWeights {
        iter.fold(SkillWeights::default(), Add::add)
    }
}

/// An entry of the skill-action catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillAction {
    pub id: SkillActionId,
    pub category: String,
    pub category_description: Option<String>,
    pub action: String,
    pub action_description: Option<String>,
    pub weights: SkillWeights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
        }
    }

    /// Pending and Approved claims block a second claim on the same thread.
    pub fn is_open(&self) -> bool {
        matches!(self, ClaimStatus::Pending | ClaimStatus::Approved)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ClaimStatus::Pending),
            "approved" => Ok(ClaimStatus::Approved),
            "rejected" => Ok(ClaimStatus::Rejected),
            other => Err(DomainError::InvalidInput(format!(
                "unknown claim status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn outcome(&self) -> ClaimStatus {
        match self {
            Decision::Approve => ClaimStatus::Approved,
            Decision::Reject => ClaimStatus::Rejected,
        }
    }
}

/// One selected action, with the weights it carried when the claim was filed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimLine {
    pub skill_action_id: SkillActionId,
    pub weights: SkillWeights,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillPointClaim {
    pub id: ClaimId,
    pub character_id: CharacterId,
    pub thread_id: ThreadId,
    pub lines: Vec<ClaimLine>,
    pub status: ClaimStatus,
    pub submitted_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<UserId>,
}

impl SkillPointClaim {
    pub fn pending(
        character_id: CharacterId,
        thread_id: ThreadId,
        lines: Vec<ClaimLine>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ClaimId::new(),
            character_id,
            thread_id,
            lines,
            status: ClaimStatus::Pending,
            submitted_at,
            decided_at: None,
            decided_by: None,
        }
    }

    pub fn skill_action_ids(&self) -> Vec<SkillActionId> {
        self.lines.iter().map(|l| l.skill_action_id).collect()
    }

    /// ΔE, ΔP, ΔK summed over every selected action.
    pub fn delta(&self) -> SkillWeights {
        self.lines.iter().map(|l| l.weights).sum()
    }

    /// Moves the claim from Pending to its terminal state.
    ///
    /// On approval the delta is credited to `character`; this is the only
    /// place in the engine where skill totals grow. Callers must hold both
    /// records in one storage unit so the status check and the credit
    /// commit together.
    pub fn settle(
        &mut self,
        decision: Decision,
        character: &mut Character,
        decided_by: UserId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != ClaimStatus::Pending {
            return Err(DomainError::Conflict(format!(
                "claim {} was already {}",
                self.id, self.status
            )));
        }
        if character.id != self.character_id {
            return Err(DomainError::InvalidInput(format!(
                "claim {} belongs to character {}, not {}",
                self.id, self.character_id, character.id
            )));
        }
        if decision == Decision::Approve {
            character.skills.credit(self.delta());
        }
        self.status = decision.outcome();
        self.decided_at = Some(at);
        self.decided_by = Some(decided_by);
        Ok(())
    }
}

/// Validates a skill selection against the catalog rows found for it.
///
/// The selection must be non-empty, free of duplicates, and every id must
/// resolve. Lines keep the submitted order.
pub fn build_claim_lines(
    selection: &[SkillActionId],
    found: &[SkillAction],
) -> Result<Vec<ClaimLine>> {
    check_selection_shape(selection)?;
    selection
        .iter()
        .map(|id| {
            found
                .iter()
                .find(|a| a.id == *id)
                .map(|a| ClaimLine {
                    skill_action_id: a.id,
                    weights: a.weights,
                })
                .ok_or_else(|| DomainError::InvalidInput(format!("unknown skill action {id}")))
        })
        .collect()
}

pub fn check_selection_shape(selection: &[SkillActionId]) -> Result<()> {
    if selection.is_empty() {
        return Err(DomainError::InvalidInput(
            "at least one skill action must be selected".into(),
        ));
    }
    let mut seen = HashSet::with_capacity(selection.len());
    if let Some(dup) = selection.iter().find(|id| !seen.insert(**id)) {
        return Err(DomainError::InvalidInput(format!(
            "skill action {dup} selected more than once"
        )));
    }
    Ok(())
}
