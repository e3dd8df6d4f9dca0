use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument};

use domains::policy::{authorize, require_actor, Action, Actor};
use domains::ports::{CharacterRepo, EventPublisher};
use domains::{
    Character, CharacterId, CharacterStatus, CharacterTransition, Clock, DomainError,
    DomainEvent, Result,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewCharacter {
    pub name: String,
    pub surname: Option<String>,
}

#[derive(Clone)]
pub struct CharacterService {
    characters: Arc<dyn CharacterRepo>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
}

impl CharacterService {
    pub fn new(
        characters: Arc<dyn CharacterRepo>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            characters,
            clock,
            events,
        }
    }

    /// New characters start Active with zero skill totals.
    #[instrument(skip(self, actor, input), fields(name = %input.name))]
    pub async fn create(&self, actor: Option<&Actor>, input: NewCharacter) -> Result<Character> {
        let actor = require_actor(actor)?;
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::InvalidInput("character name must not be empty".into()));
        }
        let mut character = Character::new(actor.user_id, name, self.clock.now());
        character.surname = input
            .surname
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self.characters.insert_character(character.clone()).await?;
        info!(character_id = %character.id, owner = %actor.user_id, "character created");
        Ok(character)
    }

    pub async fn get(&self, id: CharacterId) -> Result<Character> {
        self.characters
            .get_character(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Character", id))
    }

    /// Owner or staff; requires an IC post made after the character went
    /// Inactive.
    #[instrument(skip(self, actor))]
    pub async fn reactivate(&self, actor: Option<&Actor>, id: CharacterId) -> Result<Character> {
        let character = self.get(id).await?;
        authorize(actor, Action::ActFor { owner: character.owner_user_id })?;
        let updated = self
            .characters
            .apply_transition(id, CharacterTransition::Reactivate, self.clock.now())
            .await?;
        info!(character_id = %id, "character reactivated");
        self.events
            .publish(DomainEvent::CharacterReactivated { character_id: id });
        Ok(updated)
    }

    #[instrument(skip(self, actor))]
    pub async fn mark_dead(&self, actor: Option<&Actor>, id: CharacterId) -> Result<Character> {
        authorize(actor, Action::MarkDead)?;
        let updated = self
            .characters
            .apply_transition(id, CharacterTransition::MarkDead, self.clock.now())
            .await?;
        info!(character_id = %id, "character marked dead");
        self.events.publish(DomainEvent::CharacterDied { character_id: id });
        Ok(updated)
    }

    pub async fn set_show_in_dropdown(
        &self,
        actor: Option<&Actor>,
        id: CharacterId,
        show: bool,
    ) -> Result<Character> {
        let character = self.get(id).await?;
        authorize(actor, Action::ActFor { owner: character.owner_user_id })?;
        self.characters
            .apply_transition(id, CharacterTransition::ShowInDropdown(show), self.clock.now())
            .await
    }

    pub async fn list(&self, status: Option<CharacterStatus>) -> Result<Vec<Character>> {
        self.characters.list_characters(status).await
    }
}
