use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CharacterId, ClaimId, ThreadId, UserId};
use crate::models::skill::{ClaimStatus, SkillWeights};

/// State changes relayed to connected clients after they commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    PinToggled {
        thread_id: ThreadId,
        is_pinned: bool,
        by: UserId,
    },
    ThreadArchived {
        thread_id: ThreadId,
        by: UserId,
        at: DateTime<Utc>,
    },
    IcPostCreated {
        thread_id: ThreadId,
        character_id: CharacterId,
        at: DateTime<Utc>,
    },
    ClaimSubmitted {
        claim_id: ClaimId,
        character_id: CharacterId,
        thread_id: ThreadId,
    },
    ClaimDecided {
        claim_id: ClaimId,
        character_id: CharacterId,
        status: ClaimStatus,
        credited: SkillWeights,
    },
    CharacterDeactivated {
        character_id: CharacterId,
        cutoff_date: NaiveDate,
    },
    CharacterReactivated {
        character_id: CharacterId,
    },
    CharacterDied {
        character_id: CharacterId,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::PinToggled { .. } => "pin_toggled",
            DomainEvent::ThreadArchived { .. } => "thread_archived",
            DomainEvent::IcPostCreated { .. } => "ic_post_created",
            DomainEvent::ClaimSubmitted { .. } => "claim_submitted",
            DomainEvent::ClaimDecided { .. } => "claim_decided",
            DomainEvent::CharacterDeactivated { .. } => "character_deactivated",
            DomainEvent::CharacterReactivated { .. } => "character_reactivated",
            DomainEvent::CharacterDied { .. } => "character_died",
        }
    }
}
