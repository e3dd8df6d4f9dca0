//! # Ports
//!
//! Any storage, auth or notification adapter implements these traits to be
//! wired into the services.
//!
//! Methods that change state take the whole read-check-write inside the
//! adapter so each one commits as a single unit per record.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::events::DomainEvent;
use crate::ids::{CharacterId, ClaimId, OocForumId, PostId, SkillActionId, ThreadId, UserId};
use crate::models::{
    Author, Character, CharacterStatus, CharacterTransition, Decision, Post, SkillAction,
    SkillPointClaim, Thread,
};
use crate::policy::Actor;

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CharacterRepo: Send + Sync {
    async fn insert_character(&self, character: Character) -> Result<()>;
    async fn get_character(&self, id: CharacterId) -> Result<Option<Character>>;
    /// `None` lists every status.
    async fn list_characters(&self, status: Option<CharacterStatus>) -> Result<Vec<Character>>;

    /// Re-reads the character and flips it to Inactive only if it is still
    /// stale, in the same unit as the write.
    async fn deactivate_if_stale(
        &self,
        id: CharacterId,
        cutoff: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn apply_transition(
        &self,
        id: CharacterId,
        transition: CharacterTransition,
        at: DateTime<Utc>,
    ) -> Result<Character>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ThreadRepo: Send + Sync {
    /// `ic_author` is set for in-character posts. That character is locked,
    /// re-checked with [`Character::post_in_character`] and has its
    /// `last_ic_post_at` moved forward in the same unit as the insert, so an
    /// activity evaluation sees either both writes or neither.
    async fn insert_thread(
        &self,
        thread: Thread,
        opening_post: Post,
        ic_author: Option<CharacterId>,
    ) -> Result<()>;
    async fn get_thread(&self, id: ThreadId) -> Result<Option<Thread>>;
    /// Oldest first.
    async fn list_posts(&self, thread_id: ThreadId) -> Result<Vec<Post>>;
    async fn get_post(&self, id: PostId) -> Result<Option<Post>>;

    /// Fails with `Conflict` if the thread is archived at commit time.
    /// `ic_author` behaves as in [`ThreadRepo::insert_thread`].
    async fn insert_post(&self, post: Post, ic_author: Option<CharacterId>) -> Result<()>;

    /// Fails with `Conflict` if the thread is archived at commit time.
    async fn update_post(
        &self,
        id: PostId,
        content: String,
        modified_by: Author,
        at: DateTime<Utc>,
    ) -> Result<Post>;

    async fn toggle_pin(&self, id: ThreadId, at: DateTime<Utc>) -> Result<Thread>;

    /// Exactly one concurrent caller succeeds; the rest see `Conflict`.
    async fn archive(
        &self,
        id: ThreadId,
        archive_forum: OocForumId,
        at: DateTime<Utc>,
    ) -> Result<Thread>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SkillCatalog: Send + Sync {
    async fn list_actions(&self) -> Result<Vec<SkillAction>>;
    /// Unknown ids are simply absent from the result.
    async fn find_actions(&self, ids: &[SkillActionId]) -> Result<Vec<SkillAction>>;
    async fn upsert_action(&self, action: SkillAction) -> Result<()>;
}

/// A settled claim together with the character as it stands afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub claim: SkillPointClaim,
    pub character: Character,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ClaimRepo: Send + Sync {
    /// Check-then-insert as one unit: `DuplicateClaim` when a Pending or
    /// Approved claim exists for the same character and thread.
    async fn insert_pending(&self, claim: SkillPointClaim) -> Result<()>;
    async fn get_claim(&self, id: ClaimId) -> Result<Option<SkillPointClaim>>;
    async fn list_for(
        &self,
        character_id: CharacterId,
        thread_id: ThreadId,
    ) -> Result<Vec<SkillPointClaim>>;
    /// Newest first.
    async fn list_pending(&self) -> Result<Vec<SkillPointClaim>>;
    async fn count_pending(&self) -> Result<u64>;

    /// Compare-and-swap from Pending plus the skill credit, committed together.
    async fn settle(
        &self,
        id: ClaimId,
        decision: Decision,
        decided_by: UserId,
        at: DateTime<Utc>,
    ) -> Result<Settled>;
}

/// Check dates whose evaluation pass has completed.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CheckLog: Send + Sync {
    async fn last_completed_check(&self) -> Result<Option<NaiveDate>>;
    /// Recording the same date twice is a no-op.
    async fn record_completed_check(&self, check_date: NaiveDate, at: DateTime<Utc>) -> Result<()>;
}

/// Fire-and-forget notification sink.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Turns a bearer credential into a verified actor.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Actor>;
}
