use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::ids::{CharacterId, OocForumId, PostId, RegionId, SubareaId, ThreadId, UserId};

/// Where a thread is listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForumLocation {
    /// In-character roleplay area.
    Region {
        region_id: RegionId,
        subarea_id: Option<SubareaId>,
    },
    /// Out-of-character forum.
    OocForum { forum_id: OocForumId },
}

impl ForumLocation {
    pub fn is_in_character(&self) -> bool {
        matches!(self, ForumLocation::Region { .. })
    }

    pub fn region_id(&self) -> Option<RegionId> {
        match self {
            ForumLocation::Region { region_id, .. } => Some(*region_id),
            ForumLocation::OocForum { .. } => None,
        }
    }
}

/// Who wrote a thread or post: a character in IC areas, a user in OOC forums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Author {
    Character(CharacterId),
    User(UserId),
}

impl Author {
    pub fn character(&self) -> Option<CharacterId> {
        match self {
            Author::Character(id) => Some(*id),
            Author::User(_) => None,
        }
    }
}

/// Open threads accept posts; archived ones never do again.
///
/// There is no transition out of `Archived`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ThreadState {
    Open,
    Archived {
        /// Frozen at archive time for navigation back to the source forum.
        original_location: ForumLocation,
        archived_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub title: String,
    pub subheader: Option<String>,
    /// Current listing; an archive forum once archived.
    pub location: ForumLocation,
    pub state: ThreadState,
    /// Orthogonal to `state`; staff may flip it at any time.
    pub is_pinned: bool,
    pub author: Author,
    /// The human who started the thread, whichever identity they wrote as.
    pub owner_user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Thread {
    pub fn open(
        title: impl Into<String>,
        location: ForumLocation,
        author: Author,
        owner_user_id: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ThreadId::new(),
            title: title.into(),
            subheader: None,
            location,
            state: ThreadState::Open,
            is_pinned: false,
            author,
            owner_user_id,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn is_archived(&self) -> bool {
        matches!(self.state, ThreadState::Archived { .. })
    }

    pub fn can_post(&self) -> bool {
        !self.is_archived()
    }

    /// IC-ness follows where the thread was started, not where it is listed.
    pub fn is_in_character(&self) -> bool {
        match &self.state {
            ThreadState::Open => self.location.is_in_character(),
            ThreadState::Archived {
                original_location, ..
            } => original_location.is_in_character(),
        }
    }

    pub fn original_location(&self) -> Option<&ForumLocation> {
        match &self.state {
            ThreadState::Open => None,
            ThreadState::Archived {
                original_location, ..
            } => Some(original_location),
        }
    }

    /// Flips the pin flag and returns the new value.
    pub fn toggle_pin(&mut self) -> bool {
        self.is_pinned = !self.is_pinned;
        self.is_pinned
    }

    /// One-way move to `Archived`, relisting the thread in `archive_forum`.
    pub fn archive(&mut self, archive_forum: OocForumId, at: DateTime<Utc>) -> Result<()> {
        if self.is_archived() {
            return Err(DomainError::Conflict(format!(
                "thread {} is already archived",
                self.id
            )));
        }
        let original_location = std::mem::replace(
            &mut self.location,
            ForumLocation::OocForum {
                forum_id: archive_forum,
            },
        );
        self.state = ThreadState::Archived {
            original_location,
            archived_at: at,
        };
        self.modified_at = at;
        Ok(())
    }

    /// Rejects posts and edits once the thread is archived.
    pub fn ensure_open(&self) -> Result<()> {
        if self.can_post() {
            Ok(())
        } else {
            Err(DomainError::Conflict(format!(
                "thread {} is archived and closed to new posts",
                self.id
            )))
        }
    }

    /// The author kind must match the forum kind.
    pub fn ensure_author_kind(&self, author: &Author) -> Result<()> {
        match (self.is_in_character(), author) {
            (true, Author::Character(_)) | (false, Author::User(_)) => Ok(()),
            (true, Author::User(_)) => Err(DomainError::InvalidInput(
                "in-character threads take posts from characters".into(),
            )),
            (false, Author::Character(_)) => Err(DomainError::InvalidInput(
                "out-of-character threads take posts from users".into(),
            )),
        }
    }
}

/// The fundamental unit of conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub thread_id: ThreadId,
    pub author: Author,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
    /// Who made the last edit: the owner's writing character, or the user
    /// (staff, or the author of an OOC post).
    pub modified_by: Option<Author>,
}

impl Post {
    pub fn new(
        thread_id: ThreadId,
        author: Author,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PostId::new(),
            thread_id,
            author,
            content: content.into(),
            created_at: now,
            modified_at: None,
            modified_by: None,
        }
    }
}

/// Label shown next to the archive button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveGuidance {
    /// Enough posts to count as a completed scene.
    Finished,
    Dead,
}

impl ArchiveGuidance {
    pub const DEFAULT_FINISHED_POST_THRESHOLD: usize = 10;

    pub fn for_post_count(post_count: usize, finished_threshold: usize) -> Self {
        if post_count >= finished_threshold {
            ArchiveGuidance::Finished
        } else {
            ArchiveGuidance::Dead
        }
    }
}

/// True iff the thread is archived and the character started it or replied.
pub fn is_claim_eligible(thread: &Thread, posts: &[Post], character_id: CharacterId) -> bool {
    let author = Author::Character(character_id);
    thread.is_archived() && (thread.author == author || posts.iter().any(|p| p.author == author))
}
