use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use domains::policy::{authorize, require_actor, Action, Actor};
use domains::ports::{CharacterRepo, EventPublisher, ThreadRepo};
use domains::{
    ArchiveGuidance, Author, CharacterId, Clock, DomainError, DomainEvent, ForumLocation, Post,
    PostId, Result, Thread, ThreadId,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewThread {
    pub title: String,
    pub subheader: Option<String>,
    pub location: ForumLocation,
    /// Required for in-character locations, absent for OOC forums.
    pub character_id: Option<CharacterId>,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub character_id: Option<CharacterId>,
    pub content: String,
}

/// A thread with its posts and the archive hint shown to its owner.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadView {
    pub thread: Thread,
    pub posts: Vec<Post>,
    pub reply_count: usize,
    pub guidance: ArchiveGuidance,
}

/// Thread creation, replies and edits.
#[derive(Clone)]
pub struct PostService {
    threads: Arc<dyn ThreadRepo>,
    characters: Arc<dyn CharacterRepo>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
    finished_threshold: usize,
}

impl PostService {
    pub fn new(
        threads: Arc<dyn ThreadRepo>,
        characters: Arc<dyn CharacterRepo>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
        finished_threshold: usize,
    ) -> Self {
        Self {
            threads,
            characters,
            clock,
            events,
            finished_threshold,
        }
    }

    #[instrument(skip(self, actor, input), fields(title = %input.title))]
    pub async fn create_thread(&self, actor: Option<&Actor>, input: NewThread) -> Result<ThreadView> {
        let actor = require_actor(actor)?;
        let title = input.title.trim();
        if title.is_empty() {
            return Err(DomainError::InvalidInput("thread title must not be empty".into()));
        }
        let content = non_empty_content(&input.content)?;
        let author = self.resolve_author(actor, input.character_id).await?;
        let now = self.clock.now();

        let mut thread = Thread::open(title, input.location, author, actor.user_id, now);
        thread.subheader = input.subheader.filter(|s| !s.trim().is_empty());
        thread.ensure_author_kind(&author)?;
        let opening = Post::new(thread.id, author, content, now);

        let ic_author = ic_author(&thread, &author);
        self.threads
            .insert_thread(thread.clone(), opening.clone(), ic_author)
            .await?;
        info!(thread_id = %thread.id, "thread created");
        self.announce_ic_post(&thread, ic_author, now);

        Ok(self.view(thread, vec![opening]))
    }

    #[instrument(skip(self, actor, input))]
    pub async fn reply(&self, actor: Option<&Actor>, thread_id: ThreadId, input: NewPost) -> Result<Post> {
        let actor = require_actor(actor)?;
        let content = non_empty_content(&input.content)?;
        let thread = self.get_thread(thread_id).await?;
        thread.ensure_open()?;
        let author = self.resolve_author(actor, input.character_id).await?;
        thread.ensure_author_kind(&author)?;

        let now = self.clock.now();
        let post = Post::new(thread_id, author, content, now);
        // The store re-checks the archive flag and the writing character in
        // the same unit as the insert.
        let ic_author = ic_author(&thread, &author);
        self.threads.insert_post(post.clone(), ic_author).await?;
        info!(post_id = %post.id, "reply created");
        self.announce_ic_post(&thread, ic_author, now);
        Ok(post)
    }

    /// Author (owner of the writing character, or the OOC user) or staff.
    /// The edit is credited to the character when its owner edits, and to
    /// the acting user otherwise.
    #[instrument(skip(self, actor, content))]
    pub async fn edit(&self, actor: Option<&Actor>, post_id: PostId, content: String) -> Result<Post> {
        let actor = require_actor(actor)?;
        let content = non_empty_content(&content)?;
        let post = self
            .threads
            .get_post(post_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Post", post_id))?;

        let modified_by = match post.author {
            Author::Character(id) => {
                let owner = self.get_character(id).await?.owner_user_id;
                authorize(Some(actor), Action::ActFor { owner })?;
                if owner == actor.user_id {
                    Author::Character(id)
                } else {
                    Author::User(actor.user_id)
                }
            }
            Author::User(owner) => {
                authorize(Some(actor), Action::ActFor { owner })?;
                Author::User(actor.user_id)
            }
        };
        self.threads
            .update_post(post_id, content.to_string(), modified_by, self.clock.now())
            .await
    }

    pub async fn view_thread(&self, id: ThreadId) -> Result<ThreadView> {
        let thread = self.get_thread(id).await?;
        let posts = self.threads.list_posts(id).await?;
        Ok(self.view(thread, posts))
    }

    fn view(&self, thread: Thread, posts: Vec<Post>) -> ThreadView {
        ThreadView {
            reply_count: posts.len().saturating_sub(1),
            guidance: ArchiveGuidance::for_post_count(posts.len(), self.finished_threshold),
            thread,
            posts,
        }
    }

    /// Character authors must belong to the requester and still be postable.
    async fn resolve_author(&self, actor: &Actor, character_id: Option<CharacterId>) -> Result<Author> {
        let Some(id) = character_id else {
            return Ok(Author::User(actor.user_id));
        };
        let character = self.get_character(id).await?;
        authorize(Some(actor), Action::WriteAs { owner: character.owner_user_id })?;
        if !character.can_post() {
            return Err(DomainError::Forbidden(format!(
                "character {id} is {} and hidden from posting",
                character.status
            )));
        }
        Ok(Author::Character(id))
    }

    fn announce_ic_post(&self, thread: &Thread, ic_author: Option<CharacterId>, at: DateTime<Utc>) {
        if let Some(character_id) = ic_author {
            self.events.publish(DomainEvent::IcPostCreated {
                thread_id: thread.id,
                character_id,
                at,
            });
        }
    }

    async fn get_thread(&self, id: ThreadId) -> Result<Thread> {
        self.threads
            .get_thread(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Thread", id))
    }

    async fn get_character(&self, id: CharacterId) -> Result<domains::Character> {
        self.characters
            .get_character(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Character", id))
    }
}

/// The character whose activity a post counts towards, if any.
fn ic_author(thread: &Thread, author: &Author) -> Option<CharacterId> {
    author.character().filter(|_| thread.is_in_character())
}

fn non_empty_content(content: &str) -> Result<&str> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        Err(DomainError::InvalidInput("post content must not be empty".into()))
    } else {
        Ok(trimmed)
    }
}
