//! Shared fixtures: a fully wired engine over the in-memory store.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use domains::ports::SkillCatalog;
use domains::{
    Actor, Character, CharacterId, ForumLocation, ManualClock, OocForumId, Post, RegionId,
    SkillAction, SkillActionId, SkillWeights, ThreadId, UserId,
};
use services::{EngineSettings, NewCharacter, NewPost, NewThread, Repositories, Services, ThreadView};
use storage_adapters::{BroadcastPublisher, MemoryStore};

pub fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub struct World {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub events: BroadcastPublisher,
    pub services: Services,
}

impl World {
    pub fn at(now: DateTime<Utc>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(now));
        let events = BroadcastPublisher::new(64);
        let services = Services::new(
            Repositories::from_store(store.clone()),
            clock.clone(),
            Arc::new(events.clone()),
            EngineSettings::default(),
        );
        Self {
            store,
            clock,
            events,
            services,
        }
    }

    pub fn member() -> Actor {
        Actor::member(UserId::new())
    }

    pub fn moderator() -> Actor {
        Actor::moderator(UserId::new())
    }

    pub async fn character(&self, owner: &Actor, name: &str) -> Character {
        self.services
            .characters
            .create(
                Some(owner),
                NewCharacter {
                    name: name.to_string(),
                    surname: None,
                },
            )
            .await
            .unwrap()
    }

    pub async fn ic_thread(&self, owner: &Actor, character_id: CharacterId) -> ThreadView {
        self.services
            .posts
            .create_thread(
                Some(owner),
                NewThread {
                    title: "Ambush at the ford".to_string(),
                    subheader: None,
                    location: ForumLocation::Region {
                        region_id: RegionId(3),
                        subarea_id: None,
                    },
                    character_id: Some(character_id),
                    content: "Steel rings out across the water.".to_string(),
                },
            )
            .await
            .unwrap()
    }

    pub async fn ooc_thread(&self, owner: &Actor) -> ThreadView {
        self.services
            .posts
            .create_thread(
                Some(owner),
                NewThread {
                    title: "Plot planning".to_string(),
                    subheader: None,
                    location: ForumLocation::OocForum { forum_id: OocForumId(2) },
                    character_id: None,
                    content: "Who wants to join the siege arc?".to_string(),
                },
            )
            .await
            .unwrap()
    }

    pub async fn reply(&self, owner: &Actor, thread_id: ThreadId, character_id: CharacterId) -> Post {
        self.services
            .posts
            .reply(
                Some(owner),
                thread_id,
                NewPost {
                    character_id: Some(character_id),
                    content: "A reply in character.".to_string(),
                },
            )
            .await
            .unwrap()
    }

    pub async fn seed_action(&self, id: i32, weights: SkillWeights) {
        self.store
            .upsert_action(SkillAction {
                id: SkillActionId(id),
                category: "Training".to_string(),
                category_description: None,
                action: format!("Action {id}"),
                action_description: None,
                weights,
            })
            .await
            .unwrap();
    }

    pub async fn reload(&self, id: CharacterId) -> Character {
        self.services.characters.get(id).await.unwrap()
    }
}
