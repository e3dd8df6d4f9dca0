//! # In-memory store
//!
//! DashMap-backed implementation of every repository port. Each mutating
//! call does its read-check-write while holding the shard guard of the
//! record it changes, which gives the same per-record atomicity the
//! Postgres store gets from row locks.
//!
//! Lock order, where two maps are held at once:
//! `characters` before `threads` before `posts`, and
//! `claims` before `characters` before `open_claims`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;

use domains::ports::{CharacterRepo, CheckLog, ClaimRepo, SkillCatalog, Settled, ThreadRepo};
use domains::{
    Author, Character, CharacterId, CharacterStatus, CharacterTransition, ClaimId, ClaimStatus, Decision,
    DomainError, OocForumId, Post, PostId, Result, SkillAction, SkillActionId, SkillPointClaim,
    Thread, ThreadId, UserId,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    characters: DashMap<CharacterId, Character>,
    threads: DashMap<ThreadId, Thread>,
    /// Posts per thread, in insertion order.
    posts: DashMap<ThreadId, Vec<Post>>,
    post_threads: DashMap<PostId, ThreadId>,
    actions: DashMap<SkillActionId, SkillAction>,
    claims: DashMap<ClaimId, SkillPointClaim>,
    /// Pending or Approved claim per (character, thread).
    open_claims: DashMap<(CharacterId, ThreadId), ClaimId>,
    completed_checks: DashMap<NaiveDate, DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_ic_author(
        &self,
        id: Option<CharacterId>,
    ) -> Result<Option<RefMut<'_, CharacterId, Character>>> {
        id.map(|id| {
            self.characters
                .get_mut(&id)
                .ok_or_else(|| DomainError::not_found("Character", id))
        })
        .transpose()
    }
}

#[async_trait]
impl CharacterRepo for MemoryStore {
    async fn insert_character(&self, character: Character) -> Result<()> {
        match self.characters.entry(character.id) {
            Entry::Occupied(_) => Err(DomainError::Conflict(format!(
                "character {} already exists",
                character.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(character);
                Ok(())
            }
        }
    }

    async fn get_character(&self, id: CharacterId) -> Result<Option<Character>> {
        Ok(self.characters.get(&id).map(|c| c.clone()))
    }

    async fn list_characters(&self, status: Option<CharacterStatus>) -> Result<Vec<Character>> {
        let mut list: Vec<Character> = self
            .characters
            .iter()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .map(|c| c.clone())
            .collect();
        list.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn deactivate_if_stale(
        &self,
        id: CharacterId,
        cutoff: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut character = self
            .characters
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Character", id))?;
        Ok(character.deactivate_if_stale(cutoff, at))
    }

    async fn apply_transition(
        &self,
        id: CharacterId,
        transition: CharacterTransition,
        at: DateTime<Utc>,
    ) -> Result<Character> {
        let mut character = self
            .characters
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Character", id))?;
        character.apply(transition, at)?;
        Ok(character.clone())
    }
}

#[async_trait]
impl ThreadRepo for MemoryStore {
    async fn insert_thread(
        &self,
        thread: Thread,
        opening_post: Post,
        ic_author: Option<CharacterId>,
    ) -> Result<()> {
        let thread_id = thread.id;
        let mut author = self.lock_ic_author(ic_author)?;
        match self.threads.entry(thread_id) {
            Entry::Occupied(_) => {
                return Err(DomainError::Conflict(format!("thread {thread_id} already exists")))
            }
            Entry::Vacant(slot) => {
                if let Some(character) = author.as_deref_mut() {
                    character.post_in_character(opening_post.created_at)?;
                }
                // Keep the thread guard until the opening post is visible.
                let _guard = slot.insert(thread);
                self.post_threads.insert(opening_post.id, thread_id);
                self.posts.insert(thread_id, vec![opening_post]);
            }
        }
        Ok(())
    }

    async fn get_thread(&self, id: ThreadId) -> Result<Option<Thread>> {
        Ok(self.threads.get(&id).map(|t| t.clone()))
    }

    async fn list_posts(&self, thread_id: ThreadId) -> Result<Vec<Post>> {
        Ok(self
            .posts
            .get(&thread_id)
            .map(|p| p.clone())
            .unwrap_or_default())
    }

    async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        let Some(thread_id) = self.post_threads.get(&id).map(|t| *t) else {
            return Ok(None);
        };
        Ok(self
            .posts
            .get(&thread_id)
            .and_then(|posts| posts.iter().find(|p| p.id == id).cloned()))
    }

    async fn insert_post(&self, post: Post, ic_author: Option<CharacterId>) -> Result<()> {
        let mut author = self.lock_ic_author(ic_author)?;
        let thread = self
            .threads
            .get(&post.thread_id)
            .ok_or_else(|| DomainError::not_found("Thread", post.thread_id))?;
        thread.ensure_open()?;
        if let Some(character) = author.as_deref_mut() {
            character.post_in_character(post.created_at)?;
        }
        self.post_threads.insert(post.id, post.thread_id);
        self.posts.entry(post.thread_id).or_default().push(post);
        drop(thread);
        drop(author);
        Ok(())
    }

    async fn update_post(
        &self,
        id: PostId,
        content: String,
        modified_by: Author,
        at: DateTime<Utc>,
    ) -> Result<Post> {
        let thread_id = self
            .post_threads
            .get(&id)
            .map(|t| *t)
            .ok_or_else(|| DomainError::not_found("Post", id))?;
        let thread = self
            .threads
            .get(&thread_id)
            .ok_or_else(|| DomainError::not_found("Thread", thread_id))?;
        thread.ensure_open()?;

        let mut posts = self
            .posts
            .get_mut(&thread_id)
            .ok_or_else(|| DomainError::not_found("Post", id))?;
        let post = posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| DomainError::not_found("Post", id))?;
        post.content = content;
        post.modified_at = Some(at);
        post.modified_by = Some(modified_by);
        Ok(post.clone())
    }

    async fn toggle_pin(&self, id: ThreadId, at: DateTime<Utc>) -> Result<Thread> {
        let mut thread = self
            .threads
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Thread", id))?;
        thread.toggle_pin();
        thread.modified_at = at;
        Ok(thread.clone())
    }

    async fn archive(
        &self,
        id: ThreadId,
        archive_forum: OocForumId,
        at: DateTime<Utc>,
    ) -> Result<Thread> {
        let mut thread = self
            .threads
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Thread", id))?;
        thread.archive(archive_forum, at)?;
        Ok(thread.clone())
    }
}

#[async_trait]
impl SkillCatalog for MemoryStore {
    async fn list_actions(&self) -> Result<Vec<SkillAction>> {
        let mut actions: Vec<SkillAction> = self.actions.iter().map(|a| a.clone()).collect();
        actions.sort_by(|a, b| a.category.cmp(&b.category).then(a.id.cmp(&b.id)));
        Ok(actions)
    }

    async fn find_actions(&self, ids: &[SkillActionId]) -> Result<Vec<SkillAction>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.actions.get(id).map(|a| a.clone()))
            .collect())
    }

    async fn upsert_action(&self, action: SkillAction) -> Result<()> {
        self.actions.insert(action.id, action);
        Ok(())
    }
}

#[async_trait]
impl ClaimRepo for MemoryStore {
    async fn insert_pending(&self, claim: SkillPointClaim) -> Result<()> {
        let key = (claim.character_id, claim.thread_id);
        match self.open_claims.entry(key) {
            Entry::Occupied(_) => {
                return Err(DomainError::DuplicateClaim {
                    character_id: claim.character_id.to_string(),
                    thread_id: claim.thread_id.to_string(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(claim.id);
            }
        }
        self.claims.insert(claim.id, claim);
        Ok(())
    }

    async fn get_claim(&self, id: ClaimId) -> Result<Option<SkillPointClaim>> {
        Ok(self.claims.get(&id).map(|c| c.clone()))
    }

    async fn list_for(
        &self,
        character_id: CharacterId,
        thread_id: ThreadId,
    ) -> Result<Vec<SkillPointClaim>> {
        let mut list: Vec<SkillPointClaim> = self
            .claims
            .iter()
            .filter(|c| c.character_id == character_id && c.thread_id == thread_id)
            .map(|c| c.clone())
            .collect();
        list.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(list)
    }

    async fn list_pending(&self) -> Result<Vec<SkillPointClaim>> {
        let mut list: Vec<SkillPointClaim> = self
            .claims
            .iter()
            .filter(|c| c.status == ClaimStatus::Pending)
            .map(|c| c.clone())
            .collect();
        list.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(list)
    }

    async fn count_pending(&self) -> Result<u64> {
        let count = self
            .claims
            .iter()
            .filter(|c| c.status == ClaimStatus::Pending)
            .count();
        Ok(count as u64)
    }

    async fn settle(
        &self,
        id: ClaimId,
        decision: Decision,
        decided_by: UserId,
        at: DateTime<Utc>,
    ) -> Result<Settled> {
        let mut claim = self
            .claims
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Claim", id))?;
        let mut character = self
            .characters
            .get_mut(&claim.character_id)
            .ok_or_else(|| DomainError::not_found("Character", claim.character_id))?;

        claim.settle(decision, &mut character, decided_by, at)?;
        if !claim.status.is_open() {
            self.open_claims
                .remove_if(&(claim.character_id, claim.thread_id), |_, open| *open == id);
        }
        Ok(Settled {
            claim: claim.clone(),
            character: character.clone(),
        })
    }
}

#[async_trait]
impl CheckLog for MemoryStore {
    async fn last_completed_check(&self) -> Result<Option<NaiveDate>> {
        Ok(self.completed_checks.iter().map(|c| *c.key()).max())
    }

    async fn record_completed_check(&self, check_date: NaiveDate, at: DateTime<Utc>) -> Result<()> {
        self.completed_checks.entry(check_date).or_insert(at);
        Ok(())
    }
}
