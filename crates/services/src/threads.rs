use std::sync::Arc;

use tracing::{info, instrument};

use domains::policy::{authorize, require_actor, Action, Actor};
use domains::ports::{EventPublisher, ThreadRepo};
use domains::{Clock, DomainError, DomainEvent, OocForumId, Result, Thread, ThreadId};

/// Pin and archive transitions.
#[derive(Clone)]
pub struct ThreadLifecycleService {
    threads: Arc<dyn ThreadRepo>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
    archive_forum: OocForumId,
}

impl ThreadLifecycleService {
    pub fn new(
        threads: Arc<dyn ThreadRepo>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
        archive_forum: OocForumId,
    ) -> Self {
        Self {
            threads,
            clock,
            events,
            archive_forum,
        }
    }

    #[instrument(skip(self, actor))]
    pub async fn toggle_pin(&self, actor: Option<&Actor>, id: ThreadId) -> Result<Thread> {
        let actor = authorize(actor, Action::TogglePin)?;
        let thread = self.threads.toggle_pin(id, self.clock.now()).await?;
        info!(thread_id = %id, is_pinned = thread.is_pinned, "pin toggled");
        self.events.publish(DomainEvent::PinToggled {
            thread_id: id,
            is_pinned: thread.is_pinned,
            by: actor.user_id,
        });
        Ok(thread)
    }

    /// Owner-only, one-way. The store decides races, so concurrent calls
    /// yield one success and `Conflict` for the rest.
    #[instrument(skip(self, actor))]
    pub async fn archive(&self, actor: Option<&Actor>, id: ThreadId) -> Result<Thread> {
        require_actor(actor)?;
        let thread = self.get(id).await?;
        let actor = authorize(actor, Action::ArchiveThread { owner: thread.owner_user_id })?;
        if thread.is_archived() {
            return Err(DomainError::Conflict(format!("thread {id} is already archived")));
        }
        let now = self.clock.now();
        let archived = self.threads.archive(id, self.archive_forum, now).await?;
        info!(thread_id = %id, user_id = %actor.user_id, "thread archived");
        self.events.publish(DomainEvent::ThreadArchived {
            thread_id: id,
            by: actor.user_id,
            at: now,
        });
        Ok(archived)
    }

    pub async fn can_post(&self, id: ThreadId) -> Result<bool> {
        Ok(self.get(id).await?.can_post())
    }

    pub async fn get(&self, id: ThreadId) -> Result<Thread> {
        self.threads
            .get_thread(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Thread", id))
    }
}
