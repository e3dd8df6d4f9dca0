use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::calendar::start_of_day;
use crate::error::{DomainError, Result};
use crate::ids::{CharacterId, UserId};
use crate::models::skill::SkillWeights;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterStatus {
    Active,
    Inactive,
    Dead,
}

impl CharacterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CharacterStatus::Active => "active",
            CharacterStatus::Inactive => "inactive",
            CharacterStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for CharacterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CharacterStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(CharacterStatus::Active),
            "inactive" => Ok(CharacterStatus::Inactive),
            "dead" => Ok(CharacterStatus::Dead),
            other => Err(DomainError::InvalidInput(format!(
                "unknown character status '{other}'"
            ))),
        }
    }
}

/// Experience / Physical / Knowledge points accrued by a character.
///
/// Only approved skill-point claims ever add to these; `total` is always
/// derived from the parts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillTotals {
    pub experience: u32,
    pub physical: u32,
    pub knowledge: u32,
}

impl SkillTotals {
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

    pub(crate) fn credit(&mut self, delta: SkillWeights) {
        self.experience = self.experience.saturating_add(delta.experience);
        self.physical = self.physical.saturating_add(delta.physical);
        self.knowledge = self.knowledge.saturating_add(delta.knowledge);
    }
}

/// Manual status changes. Automatic deactivation goes through
/// [`Character::deactivate_if_stale`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CharacterTransition {
    Reactivate,
    MarkDead,
    ShowInDropdown(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub owner_user_id: UserId,
    pub name: String,
    pub surname: Option<String>,
    pub status: CharacterStatus,
    /// When `status` last changed; reactivation needs an IC post after this.
    pub status_changed_at: DateTime<Utc>,
    /// Set by in-character posts only.
    pub last_ic_post_at: Option<DateTime<Utc>>,
    pub skills: SkillTotals,
    pub show_in_dropdown: bool,
    pub joined_at: DateTime<Utc>,
}

impl Character {
    pub fn new(owner_user_id: UserId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: CharacterId::new(),
            owner_user_id,
            name: name.into(),
            surname: None,
            status: CharacterStatus::Active,
            status_changed_at: now,
            last_ic_post_at: None,
            skills: SkillTotals::default(),
            show_in_dropdown: true,
            joined_at: now,
        }
    }

    pub fn total_skill(&self) -> u32 {
        self.skills.total()
    }

    /// Active characters always; others only while kept in the dropdown.
    pub fn can_post(&self) -> bool {
        self.status == CharacterStatus::Active || self.show_in_dropdown
    }

    /// Moves the IC-post timestamp forward; an older timestamp is ignored.
    pub fn record_ic_post(&mut self, at: DateTime<Utc>) {
        if self.last_ic_post_at.map_or(true, |last| at > last) {
            self.last_ic_post_at = Some(at);
        }
    }

    /// Posting-eligibility check and timestamp bump for one IC post.
    pub fn post_in_character(&mut self, at: DateTime<Utc>) -> Result<()> {
        if !self.can_post() {
            return Err(DomainError::Forbidden(format!(
                "character {} is {} and hidden from posting",
                self.id, self.status
            )));
        }
        self.record_ic_post(at);
        Ok(())
    }

    /// Active and no IC post on or after the cutoff date.
    pub fn is_stale(&self, cutoff: NaiveDate) -> bool {
        let cutoff = start_of_day(cutoff);
        self.status == CharacterStatus::Active
            && self.last_ic_post_at.map_or(true, |last| last < cutoff)
    }

    /// Returns whether the character was flipped to Inactive.
    pub fn deactivate_if_stale(&mut self, cutoff: NaiveDate, at: DateTime<Utc>) -> bool {
        if !self.is_stale(cutoff) {
            return false;
        }
        self.status = CharacterStatus::Inactive;
        self.status_changed_at = at;
        self.show_in_dropdown = false;
        true
    }

    pub fn apply(&mut self, transition: CharacterTransition, at: DateTime<Utc>) -> Result<()> {
        match transition {
            CharacterTransition::Reactivate => self.reactivate(at),
            CharacterTransition::MarkDead => self.mark_dead(at),
            CharacterTransition::ShowInDropdown(show) => {
                self.show_in_dropdown = show;
                Ok(())
            }
        }
    }

    fn reactivate(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.status != CharacterStatus::Inactive {
            return Err(DomainError::Conflict(format!(
                "character {} is {}, not inactive",
                self.id, self.status
            )));
        }
        let posted_since = self
            .last_ic_post_at
            .is_some_and(|last| last > self.status_changed_at);
        if !posted_since {
            return Err(DomainError::Ineligible(format!(
                "character {} needs a new in-character post before reactivation",
                self.id
            )));
        }
        self.status = CharacterStatus::Active;
        self.status_changed_at = at;
        self.show_in_dropdown = true;
        Ok(())
    }

    fn mark_dead(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.status == CharacterStatus::Dead {
            return Err(DomainError::Conflict(format!(
                "character {} is already dead",
                self.id
            )));
        }
        self.status = CharacterStatus::Dead;
        self.status_changed_at = at;
        self.show_in_dropdown = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap()
    }

    fn cutoff() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 24).unwrap()
    }

    #[test]
    fn new_character_starts_active_with_zero_totals() {
        let c = Character::new(UserId::new(), "Ash", created());
        assert_eq!(c.status, CharacterStatus::Active);
        assert_eq!(c.total_skill(), 0);
        assert!(c.show_in_dropdown);
        assert_eq!(c.joined_at, created());
    }

    #[test]
    fn ic_post_timestamp_never_moves_backwards() {
        let mut c = Character::new(UserId::new(), "Ash", created());
        let later = created() + Duration::days(3);
        c.record_ic_post(later);
        c.record_ic_post(created());
        assert_eq!(c.last_ic_post_at, Some(later));
    }

    #[test]
    fn hidden_inactive_characters_cannot_post_in_character() {
        let went_inactive = start_of_day(cutoff()) + Duration::days(7);
        let mut c = Character::new(UserId::new(), "Ash", created());
        c.deactivate_if_stale(cutoff(), went_inactive);

        let err = c.post_in_character(went_inactive).unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        assert_eq!(c.last_ic_post_at, None);

        c.apply(CharacterTransition::ShowInDropdown(true), went_inactive).unwrap();
        c.post_in_character(went_inactive + Duration::hours(1)).unwrap();
        assert_eq!(c.last_ic_post_at, Some(went_inactive + Duration::hours(1)));
    }

    #[test]
    fn post_on_cutoff_day_keeps_character_active() {
        let mut c = Character::new(UserId::new(), "Ash", created());
        c.record_ic_post(start_of_day(cutoff()));
        assert!(!c.is_stale(cutoff()));

        c.last_ic_post_at = Some(start_of_day(cutoff()) - Duration::seconds(1));
        assert!(c.is_stale(cutoff()));
    }

    #[test]
    fn never_posted_is_stale() {
        let c = Character::new(UserId::new(), "Ash", created());
        assert!(c.is_stale(cutoff()));
    }

    #[test]
    fn deactivation_only_touches_active_characters() {
        let at = start_of_day(cutoff()) + Duration::days(7);
        let mut c = Character::new(UserId::new(), "Ash", created());
        assert!(c.deactivate_if_stale(cutoff(), at));
        assert_eq!(c.status, CharacterStatus::Inactive);
        assert!(!c.show_in_dropdown);
        assert!(!c.deactivate_if_stale(cutoff(), at));

        let mut dead = Character::new(UserId::new(), "Bone", created());
        dead.apply(CharacterTransition::MarkDead, at).unwrap();
        assert!(!dead.deactivate_if_stale(cutoff(), at));
        assert_eq!(dead.status, CharacterStatus::Dead);
    }

    #[test]
    fn reactivation_needs_post_after_going_inactive() {
        let went_inactive = start_of_day(cutoff()) + Duration::days(7);
        let mut c = Character::new(UserId::new(), "Ash", created());
        c.deactivate_if_stale(cutoff(), went_inactive);

        let err = c
            .apply(CharacterTransition::Reactivate, went_inactive)
            .unwrap_err();
        assert!(matches!(err, DomainError::Ineligible(_)));

        c.record_ic_post(went_inactive + Duration::hours(2));
        c.apply(CharacterTransition::Reactivate, went_inactive + Duration::hours(3))
            .unwrap();
        assert_eq!(c.status, CharacterStatus::Active);
        assert!(c.show_in_dropdown);
    }

    #[test]
    fn reactivating_an_active_character_conflicts() {
        let mut c = Character::new(UserId::new(), "Ash", created());
        let err = c.apply(CharacterTransition::Reactivate, created()).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn inactive_characters_post_only_from_the_dropdown() {
        let mut c = Character::new(UserId::new(), "Ash", created());
        assert!(c.can_post());
        c.deactivate_if_stale(cutoff(), created() + Duration::days(90));
        assert!(!c.can_post());
        c.apply(CharacterTransition::ShowInDropdown(true), created()).unwrap();
        assert!(c.can_post());
    }

    #[test]
    fn death_is_terminal_for_manual_transitions() {
        let mut c = Character::new(UserId::new(), "Ash", created());
        c.apply(CharacterTransition::MarkDead, created()).unwrap();
        assert!(c.apply(CharacterTransition::MarkDead, created()).unwrap_err().is_conflict());
        assert!(c.apply(CharacterTransition::Reactivate, created()).unwrap_err().is_conflict());
    }

    #[test]
    fn totals_sum_their_parts() {
        let mut totals = SkillTotals::new(5, 5, 5);
        totals.credit(SkillWeights::new(2, 3, 1));
        assert_eq!(totals, SkillTotals::new(7, 8, 6));
        assert_eq!(totals.total(), 21);
    }
}
