use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument};

use domains::catalog::{filter_actions, group_by_category, SkillCategory};
use domains::models::skill::check_selection_shape;
use domains::policy::{authorize, require_actor, Action, Actor};
use domains::ports::{CharacterRepo, ClaimRepo, EventPublisher, SkillCatalog, ThreadRepo};
use domains::{
    build_claim_lines, is_claim_eligible, CharacterId, CharacterStatus, ClaimId, ClaimStatus, Clock, Decision,
    DomainError, DomainEvent, Result, SkillAction, SkillActionId, SkillPointClaim, SkillWeights,
    ThreadId,
};

use crate::Repositories;

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitClaim {
    pub character_id: CharacterId,
    pub thread_id: ThreadId,
    pub skill_action_ids: Vec<SkillActionId>,
}

/// Skill-point claims from submission to moderator decision.
#[derive(Clone)]
pub struct ClaimService {
    characters: Arc<dyn CharacterRepo>,
    threads: Arc<dyn ThreadRepo>,
    catalog: Arc<dyn SkillCatalog>,
    claims: Arc<dyn ClaimRepo>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
}

impl ClaimService {
    pub fn new(repos: Repositories, clock: Arc<dyn Clock>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            characters: repos.characters,
            threads: repos.threads,
            catalog: repos.catalog,
            claims: repos.claims,
            clock,
            events,
        }
    }

    /// Archived thread, and the character started it or replied in it.
    pub async fn is_eligible(&self, character_id: CharacterId, thread_id: ThreadId) -> Result<bool> {
        let thread = self
            .threads
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Thread", thread_id))?;
        if !thread.is_archived() {
            return Ok(false);
        }
        let posts = self.threads.list_posts(thread_id).await?;
        Ok(is_claim_eligible(&thread, &posts, character_id))
    }

    #[instrument(skip(self, actor, input), fields(character_id = %input.character_id, thread_id = %input.thread_id))]
    pub async fn submit(&self, actor: Option<&Actor>, input: SubmitClaim) -> Result<SkillPointClaim> {
        let actor = require_actor(actor)?;
        check_selection_shape(&input.skill_action_ids)?;
        let found = self.catalog.find_actions(&input.skill_action_ids).await?;
        let lines = build_claim_lines(&input.skill_action_ids, &found)?;

        let character = self
            .characters
            .get_character(input.character_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Character", input.character_id))?;
        authorize(Some(actor), Action::WriteAs { owner: character.owner_user_id })?;
        if character.status != CharacterStatus::Active {
            return Err(DomainError::Ineligible(format!(
                "character {} is {} and cannot file claims",
                character.id, character.status
            )));
        }

        if !self.is_eligible(input.character_id, input.thread_id).await? {
            return Err(DomainError::Ineligible(format!(
                "character {} did not take part in archived thread {}",
                input.character_id, input.thread_id
            )));
        }

        let claim = SkillPointClaim::pending(input.character_id, input.thread_id, lines, self.clock.now());
        self.claims.insert_pending(claim.clone()).await?;
        info!(claim_id = %claim.id, "skill-point claim submitted");
        self.events.publish(DomainEvent::ClaimSubmitted {
            claim_id: claim.id,
            character_id: claim.character_id,
            thread_id: claim.thread_id,
        });
        Ok(claim)
    }

    /// Settles a pending claim exactly once; approval credits the character
    /// in the same store unit as the status change.
    #[instrument(skip(self, actor))]
    pub async fn decide(
        &self,
        actor: Option<&Actor>,
        claim_id: ClaimId,
        decision: Decision,
    ) -> Result<SkillPointClaim> {
        let actor = authorize(actor, Action::DecideClaim)?;
        let settled = self
            .claims
            .settle(claim_id, decision, actor.user_id, self.clock.now())
            .await?;
        let credited = match settled.claim.status {
            ClaimStatus::Approved => settled.claim.delta(),
            _ => SkillWeights::default(),
        };
        info!(
            claim_id = %claim_id,
            status = %settled.claim.status,
            total_skill = settled.character.total_skill(),
            "skill-point claim decided"
        );
        self.events.publish(DomainEvent::ClaimDecided {
            claim_id,
            character_id: settled.claim.character_id,
            status: settled.claim.status,
            credited,
        });
        Ok(settled.claim)
    }

    pub async fn get(&self, id: ClaimId) -> Result<SkillPointClaim> {
        self.claims
            .get_claim(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Claim", id))
    }

    pub async fn list_for(&self, character_id: CharacterId, thread_id: ThreadId) -> Result<Vec<SkillPointClaim>> {
        self.claims.list_for(character_id, thread_id).await
    }

    /// Moderation queue, newest first.
    pub async fn pending(&self, actor: Option<&Actor>) -> Result<Vec<SkillPointClaim>> {
        authorize(actor, Action::DecideClaim)?;
        self.claims.list_pending().await
    }

    pub async fn pending_count(&self, actor: Option<&Actor>) -> Result<u64> {
        authorize(actor, Action::DecideClaim)?;
        self.claims.count_pending().await
    }

    pub async fn search_actions(&self, query: Option<&str>) -> Result<Vec<SkillAction>> {
        let actions = self.catalog.list_actions().await?;
        Ok(filter_actions(actions, query))
    }

    pub async fn grouped_actions(&self, query: Option<&str>) -> Result<Vec<SkillCategory>> {
        Ok(group_by_category(self.search_actions(query).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::ports::{
        MockCharacterRepo, MockCheckLog, MockClaimRepo, MockEventPublisher, MockSkillCatalog, MockThreadRepo, Settled,
    };
    use domains::{Author, Character, ForumLocation, ManualClock, OocForumId, Post, RegionId, Thread, UserId};
    use tokio_test::{assert_err, assert_ok};

    struct Mocks {
        characters: MockCharacterRepo,
        threads: MockThreadRepo,
        catalog: MockSkillCatalog,
        claims: MockClaimRepo,
        events: MockEventPublisher,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                characters: MockCharacterRepo::new(),
                threads: MockThreadRepo::new(),
                catalog: MockSkillCatalog::new(),
                claims: MockClaimRepo::new(),
                events: MockEventPublisher::new(),
            }
        }

        fn build(self) -> ClaimService {
            let repos = Repositories {
                characters: Arc::new(self.characters),
                threads: Arc::new(self.threads),
                catalog: Arc::new(self.catalog),
                claims: Arc::new(self.claims),
                checks: Arc::new(MockCheckLog::new()),
            };
            ClaimService::new(repos, Arc::new(ManualClock::new(Utc::now())), Arc::new(self.events))
        }
    }

    fn action(id: i32, e: u32, p: u32, k: u32) -> SkillAction {
        SkillAction {
            id: SkillActionId(id),
            category: "Hunting".into(),
            category_description: None,
            action: format!("action {id}"),
            action_description: None,
            weights: SkillWeights::new(e, p, k),
        }
    }

    /// An archived IC thread started by `author` with one reply by `replier`.
    fn archived_thread(author: CharacterId, replier: CharacterId) -> (Thread, Vec<Post>) {
        let mut t = Thread::open(
            "Moonrise",
            ForumLocation::Region {
                region_id: RegionId(1),
                subarea_id: None,
            },
            Author::Character(author),
            UserId::new(),
            Utc::now(),
        );
        let posts = vec![
            Post::new(t.id, Author::Character(author), "opening", Utc::now()),
            Post::new(t.id, Author::Character(replier), "reply", Utc::now()),
        ];
        t.archive(OocForumId(7), Utc::now()).unwrap();
        (t, posts)
    }

    fn wire_thread(mocks: &mut Mocks, thread: Thread, posts: Vec<Post>) {
        mocks.threads.expect_get_thread().returning(move |_| Ok(Some(thread.clone())));
        mocks.threads.expect_list_posts().returning(move |_| Ok(posts.clone()));
    }

    #[tokio::test]
    async fn eligibility_follows_participation() {
        let (c1, c2, c3) = (CharacterId::new(), CharacterId::new(), CharacterId::new());
        let (thread, posts) = archived_thread(c1, c2);
        let tid = thread.id;
        let mut mocks = Mocks::new();
        wire_thread(&mut mocks, thread, posts);
        let svc = mocks.build();

        assert!(assert_ok!(svc.is_eligible(c2, tid).await));
        assert!(!assert_ok!(svc.is_eligible(c3, tid).await));
    }

    #[tokio::test]
    async fn empty_selection_is_rejected_before_any_lookup() {
        let svc = Mocks::new().build();
        let owner = Actor::member(UserId::new());
        let err = assert_err!(
            svc.submit(
                Some(&owner),
                SubmitClaim {
                    character_id: CharacterId::new(),
                    thread_id: ThreadId::new(),
                    skill_action_ids: vec![],
                },
            )
            .await
        );
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn non_participant_is_ineligible_even_when_archived() {
        let owner = UserId::new();
        let outsider = Character::new(owner, "Stray", Utc::now());
        let outsider_id = outsider.id;
        let (thread, posts) = archived_thread(CharacterId::new(), CharacterId::new());
        let tid = thread.id;

        let mut mocks = Mocks::new();
        wire_thread(&mut mocks, thread, posts);
        mocks.catalog.expect_find_actions().returning(|_| Ok(vec![action(1, 1, 0, 0)]));
        mocks
            .characters
            .expect_get_character()
            .returning(move |_| Ok(Some(outsider.clone())));
        mocks.claims.expect_insert_pending().never();
        let svc = mocks.build();

        let err = assert_err!(
            svc.submit(
                Some(&Actor::member(owner)),
                SubmitClaim {
                    character_id: outsider_id,
                    thread_id: tid,
                    skill_action_ids: vec![SkillActionId(1)],
                },
            )
            .await
        );
        assert!(matches!(err, DomainError::Ineligible(_)));
    }

    #[tokio::test]
    async fn dead_characters_cannot_file_claims() {
        let owner = UserId::new();
        let mut fallen = Character::new(owner, "Ash", Utc::now());
        fallen
            .apply(domains::CharacterTransition::MarkDead, Utc::now())
            .unwrap();
        let fallen_id = fallen.id;
        let (thread, posts) = archived_thread(CharacterId::new(), fallen_id);
        let tid = thread.id;

        let mut mocks = Mocks::new();
        wire_thread(&mut mocks, thread, posts);
        mocks.catalog.expect_find_actions().returning(|_| Ok(vec![action(1, 1, 0, 0)]));
        mocks
            .characters
            .expect_get_character()
            .returning(move |_| Ok(Some(fallen.clone())));
        mocks.claims.expect_insert_pending().never();
        let svc = mocks.build();

        let err = assert_err!(
            svc.submit(
                Some(&Actor::member(owner)),
                SubmitClaim {
                    character_id: fallen_id,
                    thread_id: tid,
                    skill_action_ids: vec![SkillActionId(1)],
                },
            )
            .await
        );
        assert!(matches!(err, DomainError::Ineligible(_)));
    }

    #[tokio::test]
    async fn duplicate_from_store_surfaces_unchanged() {
        let owner = UserId::new();
        let replier = Character::new(owner, "Ash", Utc::now());
        let rid = replier.id;
        let (thread, posts) = archived_thread(CharacterId::new(), rid);
        let tid = thread.id;

        let mut mocks = Mocks::new();
        wire_thread(&mut mocks, thread, posts);
        mocks.catalog.expect_find_actions().returning(|_| Ok(vec![action(1, 1, 0, 0)]));
        mocks
            .characters
            .expect_get_character()
            .returning(move |_| Ok(Some(replier.clone())));
        mocks.claims.expect_insert_pending().returning(move |c| {
            Err(DomainError::DuplicateClaim {
                character_id: c.character_id.to_string(),
                thread_id: c.thread_id.to_string(),
            })
        });
        let svc = mocks.build();

        let err = assert_err!(
            svc.submit(
                Some(&Actor::member(owner)),
                SubmitClaim {
                    character_id: rid,
                    thread_id: tid,
                    skill_action_ids: vec![SkillActionId(1)],
                },
            )
            .await
        );
        assert!(matches!(err, DomainError::DuplicateClaim { .. }));
    }

    #[tokio::test]
    async fn decide_requires_moderator() {
        let mut mocks = Mocks::new();
        mocks.claims.expect_settle().never();
        let svc = mocks.build();

        let err = assert_err!(
            svc.decide(Some(&Actor::member(UserId::new())), ClaimId::new(), Decision::Approve)
                .await
        );
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn approval_announces_the_credited_delta() {
        let mut character = Character::new(UserId::new(), "Ash", Utc::now());
        let lines = build_claim_lines(
            &[SkillActionId(1), SkillActionId(2)],
            &[action(1, 2, 0, 1), action(2, 0, 3, 0)],
        )
        .unwrap();
        let mut claim = SkillPointClaim::pending(character.id, ThreadId::new(), lines, Utc::now());
        let claim_id = claim.id;

        let mut mocks = Mocks::new();
        mocks.claims.expect_settle().times(1).returning(move |_, decision, by, at| {
            claim.settle(decision, &mut character, by, at)?;
            Ok(Settled {
                claim: claim.clone(),
                character: character.clone(),
            })
        });
        mocks
            .events
            .expect_publish()
            .withf(|e| {
                matches!(
                    e,
                    DomainEvent::ClaimDecided { status: ClaimStatus::Approved, credited, .. }
                        if *credited == SkillWeights::new(2, 3, 1)
                )
            })
            .times(1)
            .return_const(());
        let svc = mocks.build();

        let decided = assert_ok!(
            svc.decide(Some(&Actor::moderator(UserId::new())), claim_id, Decision::Approve)
                .await
        );
        assert_eq!(decided.status, ClaimStatus::Approved);
    }

    #[tokio::test]
    async fn moderation_queue_is_staff_only() {
        let mut mocks = Mocks::new();
        mocks.claims.expect_count_pending().returning(|| Ok(3));
        let svc = mocks.build();

        let err = assert_err!(svc.pending_count(Some(&Actor::member(UserId::new()))).await);
        assert!(matches!(err, DomainError::Unauthorized(_)));
        assert_eq!(assert_ok!(svc.pending_count(Some(&Actor::moderator(UserId::new()))).await), 3);
    }
}
