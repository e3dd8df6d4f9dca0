//! Application services for the roleplay board engine.
//!
//! Each service orchestrates the ports from `domains`, applies the
//! capability policy, and publishes domain events once a change commits.

use std::sync::Arc;

use domains::ports::{
    CharacterRepo, CheckLog, ClaimRepo, EventPublisher, SkillCatalog, ThreadRepo,
};
use domains::{Clock, OocForumId};

pub mod activity;
pub mod characters;
pub mod claims;
pub mod posts;
pub mod threads;

pub use activity::{ActivityJob, ActivityService, EvaluationReport};
pub use characters::{CharacterService, NewCharacter};
pub use claims::{ClaimService, SubmitClaim};
pub use posts::{NewPost, NewThread, PostService, ThreadView};
pub use threads::ThreadLifecycleService;

/// Tunables the services need from configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub cutoff_window_days: u32,
    pub archive_forum: OocForumId,
    pub finished_post_threshold: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cutoff_window_days: domains::calendar::DEFAULT_CUTOFF_WINDOW_DAYS,
            archive_forum: OocForumId(7),
            finished_post_threshold: domains::ArchiveGuidance::DEFAULT_FINISHED_POST_THRESHOLD,
        }
    }
}

/// Every repository port, usually backed by one store.
#[derive(Clone)]
pub struct Repositories {
    pub characters: Arc<dyn CharacterRepo>,
    pub threads: Arc<dyn ThreadRepo>,
    pub catalog: Arc<dyn SkillCatalog>,
    pub claims: Arc<dyn ClaimRepo>,
    pub checks: Arc<dyn CheckLog>,
}

impl Repositories {
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: CharacterRepo + ThreadRepo + SkillCatalog + ClaimRepo + CheckLog + 'static,
    {
        Self {
            characters: store.clone(),
            threads: store.clone(),
            catalog: store.clone(),
            claims: store.clone(),
            checks: store,
        }
    }
}

/// All services wired against the same ports.
#[derive(Clone)]
pub struct Services {
    pub activity: ActivityService,
    pub characters: CharacterService,
    pub threads: ThreadLifecycleService,
    pub posts: PostService,
    pub claims: ClaimService,
}

impl Services {
    pub fn new(
        repos: Repositories,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            activity: ActivityService::new(
                repos.characters.clone(),
                clock.clone(),
                events.clone(),
                settings.cutoff_window_days,
            ),
            characters: CharacterService::new(repos.characters.clone(), clock.clone(), events.clone()),
            threads: ThreadLifecycleService::new(
                repos.threads.clone(),
                clock.clone(),
                events.clone(),
                settings.archive_forum,
            ),
            posts: PostService::new(
                repos.threads.clone(),
                repos.characters.clone(),
                clock.clone(),
                events.clone(),
                settings.finished_post_threshold,
            ),
            claims: ClaimService::new(repos, clock, events),
        }
    }
}
