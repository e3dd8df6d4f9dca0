//! Capability checks shared by every gated operation.
//!
//! Handlers never inspect capability bits themselves; they ask one of the
//! functions below with the actor and the resource owner.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::ids::UserId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub is_moderator: bool,
    pub is_admin: bool,
}

impl Capabilities {
    pub fn is_staff(&self) -> bool {
        self.is_moderator || self.is_admin
    }
}

/// A verified requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub capabilities: Capabilities,
}

impl Actor {
    pub fn member(user_id: UserId) -> Self {
        Self {
            user_id,
            capabilities: Capabilities::default(),
        }
    }

    pub fn moderator(user_id: UserId) -> Self {
        Self {
            user_id,
            capabilities: Capabilities {
                is_moderator: true,
                is_admin: false,
            },
        }
    }

    pub fn is_staff(&self) -> bool {
        self.capabilities.is_staff()
    }
}

/// Staff-gated actions and owner-gated actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    TogglePin,
    DecideClaim,
    RunActivityCheck,
    MarkDead,
    /// Only the human who started the thread; staff get no bypass.
    ArchiveThread { owner: UserId },
    /// Acting on a character or editing a post: owner or staff.
    ActFor { owner: UserId },
    /// Writing in a character's voice: the owner alone.
    WriteAs { owner: UserId },
}

impl Action {
    fn label(&self) -> &'static str {
        match self {
            Action::TogglePin => "pin threads",
            Action::DecideClaim => "decide skill-point claims",
            Action::RunActivityCheck => "run activity checks",
            Action::MarkDead => "mark characters dead",
            Action::ArchiveThread { .. } => "archive this thread",
            Action::ActFor { .. } => "act for this resource",
            Action::WriteAs { .. } => "write as this character",
        }
    }
}

/// Resolves the request identity, failing when there is none.
pub fn require_actor(actor: Option<&Actor>) -> Result<&Actor> {
    actor.ok_or_else(|| DomainError::Unauthorized("authentication required".into()))
}

/// The single authorization gate.
///
/// Missing staff capability is `Unauthorized`; a known actor acting on
/// someone else's resource is `Forbidden`.
pub fn authorize<'a>(actor: Option<&'a Actor>, action: Action) -> Result<&'a Actor> {
    let actor = require_actor(actor)?;
    let allowed = match action {
        Action::TogglePin | Action::DecideClaim | Action::RunActivityCheck | Action::MarkDead => {
            if !actor.is_staff() {
                return Err(DomainError::Unauthorized(format!(
                    "moderator capability required to {}",
                    action.label()
                )));
            }
            true
        }
        Action::ArchiveThread { owner } | Action::WriteAs { owner } => actor.user_id == owner,
        Action::ActFor { owner } => actor.user_id == owner || actor.is_staff(),
    };
    if allowed {
        Ok(actor)
    } else {
        Err(DomainError::Forbidden(format!(
            "user {} may not {}",
            actor.user_id,
            action.label()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_requests_are_unauthorized() {
        let err = authorize(None, Action::ArchiveThread { owner: UserId::new() }).unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[test]
    fn members_cannot_use_staff_actions() {
        let member = Actor::member(UserId::new());
        for action in [Action::TogglePin, Action::DecideClaim, Action::RunActivityCheck, Action::MarkDead] {
            let err = authorize(Some(&member), action).unwrap_err();
            assert!(matches!(err, DomainError::Unauthorized(_)), "{action:?}");
        }
    }

    #[test]
    fn admins_count_as_staff() {
        let admin = Actor {
            user_id: UserId::new(),
            capabilities: Capabilities {
                is_moderator: false,
                is_admin: true,
            },
        };
        assert!(authorize(Some(&admin), Action::DecideClaim).is_ok());
    }

    #[test]
    fn archive_is_owner_only_even_for_staff() {
        let owner = UserId::new();
        let moderator = Actor::moderator(UserId::new());
        let err = authorize(Some(&moderator), Action::ArchiveThread { owner }).unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        assert!(authorize(Some(&Actor::member(owner)), Action::ArchiveThread { owner }).is_ok());
    }

    #[test]
    fn acting_for_a_resource_allows_owner_or_staff() {
        let owner = UserId::new();
        assert!(authorize(Some(&Actor::member(owner)), Action::ActFor { owner }).is_ok());
        assert!(authorize(Some(&Actor::moderator(UserId::new())), Action::ActFor { owner }).is_ok());

        let stranger = Actor::member(UserId::new());
        let err = authorize(Some(&stranger), Action::ActFor { owner }).unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[test]
    fn only_the_owner_writes_as_a_character() {
        let owner = UserId::new();
        assert!(authorize(Some(&Actor::member(owner)), Action::WriteAs { owner }).is_ok());
        let err = authorize(Some(&Actor::moderator(UserId::new())), Action::WriteAs { owner }).unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }
}
