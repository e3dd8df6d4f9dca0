//! # Postgres store
//!
//! Maps the relational schema in `migrations/` onto the domain models.
//! State transitions lock the affected rows (`FOR UPDATE`) and run the same
//! domain methods the in-memory store uses, so the rules live in one place.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

use domains::ports::{CharacterRepo, CheckLog, ClaimRepo, SkillCatalog, Settled, ThreadRepo};
use domains::{
    Author, Character, CharacterId, CharacterStatus, CharacterTransition, ClaimId, ClaimLine,
    Decision, DomainError, ForumLocation, OocForumId, Post, PostId, Result, SkillAction,
    SkillActionId, SkillPointClaim, SkillTotals, SkillWeights, Thread, ThreadId, ThreadState,
    UserId,
};

const CHARACTER_COLUMNS: &str = "id, owner_user_id, name, surname, status, status_changed_at, \
     last_ic_post_at, experience, physical, knowledge, show_in_dropdown, joined_at";
const THREAD_COLUMNS: &str = "id, title, subheader, location, original_location, archived_at, \
     is_pinned, author, owner_user_id, created_at, modified_at";
const POST_COLUMNS: &str =
    "id, thread_id, author, content, created_at, modified_at, modified_by";
const ACTION_COLUMNS: &str = "id, category, category_description, action, action_description, \
     experience, physical, knowledge";
const CLAIM_COLUMNS: &str =
    "id, character_id, thread_id, lines, status, submitted_at, decided_at, decided_by";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(storage)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::Storage(e.to_string()))?;
        info!("database migrations applied");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(storage)
    }
}

fn storage(e: sqlx::Error) -> DomainError {
    DomainError::Storage(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(storage)
}

fn points(row: &PgRow, name: &str) -> Result<u32> {
    let raw: i64 = col(row, name)?;
    u32::try_from(raw).map_err(|_| DomainError::Storage(format!("{name} out of range: {raw}")))
}

fn parse_column<T>(row: &PgRow, name: &str) -> Result<T>
where
    T: std::str::FromStr<Err = DomainError>,
{
    let raw: String = col(row, name)?;
    raw.parse()
        .map_err(|e: DomainError| DomainError::Storage(format!("column {name}: {e}")))
}

fn character_from_row(row: &PgRow) -> Result<Character> {
    Ok(Character {
        id: CharacterId(col(row, "id")?),
        owner_user_id: UserId(col(row, "owner_user_id")?),
        name: col(row, "name")?,
        surname: col(row, "surname")?,
        status: parse_column(row, "status")?,
        status_changed_at: col(row, "status_changed_at")?,
        last_ic_post_at: col(row, "last_ic_post_at")?,
        skills: SkillTotals::new(
            points(row, "experience")?,
            points(row, "physical")?,
            points(row, "knowledge")?,
        ),
        show_in_dropdown: col(row, "show_in_dropdown")?,
        joined_at: col(row, "joined_at")?,
    })
}

fn thread_from_row(row: &PgRow) -> Result<Thread> {
    let Json(location): Json<ForumLocation> = col(row, "location")?;
    let original: Option<Json<ForumLocation>> = col(row, "original_location")?;
    let archived_at: Option<DateTime<Utc>> = col(row, "archived_at")?;
    let state = match (original, archived_at) {
        (Some(Json(original_location)), Some(archived_at)) => ThreadState::Archived {
            original_location,
            archived_at,
        },
        _ => ThreadState::Open,
    };
    let Json(author): Json<Author> = col(row, "author")?;
    Ok(Thread {
        id: ThreadId(col(row, "id")?),
        title: col(row, "title")?,
        subheader: col(row, "subheader")?,
        location,
        state,
        is_pinned: col(row, "is_pinned")?,
        author,
        owner_user_id: UserId(col(row, "owner_user_id")?),
        created_at: col(row, "created_at")?,
        modified_at: col(row, "modified_at")?,
    })
}

fn post_from_row(row: &PgRow) -> Result<Post> {
    let Json(author): Json<Author> = col(row, "author")?;
    let modified_by: Option<Json<Author>> = col(row, "modified_by")?;
    Ok(Post {
        id: PostId(col(row, "id")?),
        thread_id: ThreadId(col(row, "thread_id")?),
        author,
        content: col(row, "content")?,
        created_at: col(row, "created_at")?,
        modified_at: col(row, "modified_at")?,
        modified_by: modified_by.map(|Json(editor)| editor),
    })
}

fn action_from_row(row: &PgRow) -> Result<SkillAction> {
    Ok(SkillAction {
        id: SkillActionId(col(row, "id")?),
        category: col(row, "category")?,
        category_description: col(row, "category_description")?,
        action: col(row, "action")?,
        action_description: col(row, "action_description")?,
        weights: SkillWeights::new(
            points(row, "experience")?,
            points(row, "physical")?,
            points(row, "knowledge")?,
        ),
    })
}

fn claim_from_row(row: &PgRow) -> Result<SkillPointClaim> {
    let Json(lines): Json<Vec<ClaimLine>> = col(row, "lines")?;
    let decided_by: Option<Uuid> = col(row, "decided_by")?;
    Ok(SkillPointClaim {
        id: ClaimId(col(row, "id")?),
        character_id: CharacterId(col(row, "character_id")?),
        thread_id: ThreadId(col(row, "thread_id")?),
        lines,
        status: parse_column(row, "status")?,
        submitted_at: col(row, "submitted_at")?,
        decided_at: col(row, "decided_at")?,
        decided_by: decided_by.map(UserId),
    })
}

async fn lock_character(
    tx: &mut Transaction<'static, Postgres>,
    id: CharacterId,
) -> Result<Character> {
    let row = sqlx::query(&format!(
        "SELECT {CHARACTER_COLUMNS} FROM characters WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.0)
    .fetch_optional(&mut **tx)
    .await
    .map_err(storage)?
    .ok_or_else(|| DomainError::not_found("Character", id))?;
    character_from_row(&row)
}

async fn save_character(tx: &mut Transaction<'static, Postgres>, c: &Character) -> Result<()> {
    sqlx::query(
        "UPDATE characters SET surname = $2, status = $3, status_changed_at = $4, \
         last_ic_post_at = $5, experience = $6, physical = $7, knowledge = $8, \
         show_in_dropdown = $9 WHERE id = $1",
    )
    .bind(c.id.0)
    .bind(&c.surname)
    .bind(c.status.as_str())
    .bind(c.status_changed_at)
    .bind(c.last_ic_post_at)
    .bind(i64::from(c.skills.experience))
    .bind(i64::from(c.skills.physical))
    .bind(i64::from(c.skills.knowledge))
    .bind(c.show_in_dropdown)
    .execute(&mut **tx)
    .await
    .map_err(storage)?;
    Ok(())
}

/// `FOR SHARE` blocks a concurrent archive until the caller commits.
async fn lock_thread(
    tx: &mut Transaction<'static, Postgres>,
    id: ThreadId,
    mode: &str,
) -> Result<Thread> {
    let row = sqlx::query(&format!(
        "SELECT {THREAD_COLUMNS} FROM threads WHERE id = $1 {mode}"
    ))
    .bind(id.0)
    .fetch_optional(&mut **tx)
    .await
    .map_err(storage)?
    .ok_or_else(|| DomainError::not_found("Thread", id))?;
    thread_from_row(&row)
}

#[async_trait]
impl CharacterRepo for PgStore {
    async fn insert_character(&self, c: Character) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO characters ({CHARACTER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(c.id.0)
        .bind(c.owner_user_id.0)
        .bind(&c.name)
        .bind(&c.surname)
        .bind(c.status.as_str())
        .bind(c.status_changed_at)
        .bind(c.last_ic_post_at)
        .bind(i64::from(c.skills.experience))
        .bind(i64::from(c.skills.physical))
        .bind(i64::from(c.skills.knowledge))
        .bind(c.show_in_dropdown)
        .bind(c.joined_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::Conflict(format!("character {} already exists", c.id))
            } else {
                storage(e)
            }
        })?;
        Ok(())
    }

    async fn get_character(&self, id: CharacterId) -> Result<Option<Character>> {
        sqlx::query(&format!("SELECT {CHARACTER_COLUMNS} FROM characters WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .as_ref()
            .map(character_from_row)
            .transpose()
    }

    async fn list_characters(&self, status: Option<CharacterStatus>) -> Result<Vec<Character>> {
        sqlx::query(&format!(
            "SELECT {CHARACTER_COLUMNS} FROM characters \
             WHERE $1::TEXT IS NULL OR status = $1 ORDER BY joined_at, id"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .iter()
        .map(character_from_row)
        .collect()
    }

    async fn deactivate_if_stale(
        &self,
        id: CharacterId,
        cutoff: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.begin().await?;
        let mut character = lock_character(&mut tx, id).await?;
        let changed = character.deactivate_if_stale(cutoff, at);
        if changed {
            save_character(&mut tx, &character).await?;
        }
        tx.commit().await.map_err(storage)?;
        Ok(changed)
    }

    async fn apply_transition(
        &self,
        id: CharacterId,
        transition: CharacterTransition,
        at: DateTime<Utc>,
    ) -> Result<Character> {
        let mut tx = self.begin().await?;
        let mut character = lock_character(&mut tx, id).await?;
        character.apply(transition, at)?;
        save_character(&mut tx, &character).await?;
        tx.commit().await.map_err(storage)?;
        Ok(character)
    }
}

/// Locks the IC author ahead of the thread and applies the posting rule;
/// the bump commits or rolls back with the post row.
async fn bump_ic_author(
    tx: &mut Transaction<'static, Postgres>,
    ic_author: Option<CharacterId>,
    at: DateTime<Utc>,
) -> Result<()> {
    let Some(id) = ic_author else {
        return Ok(());
    };
    let mut character = lock_character(tx, id).await?;
    character.post_in_character(at)?;
    save_character(tx, &character).await
}

async fn insert_post_row(tx: &mut Transaction<'static, Postgres>, p: &Post) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO posts ({POST_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
    ))
    .bind(p.id.0)
    .bind(p.thread_id.0)
    .bind(Json(&p.author))
    .bind(&p.content)
    .bind(p.created_at)
    .bind(p.modified_at)
    .bind(p.modified_by.as_ref().map(Json))
    .execute(&mut **tx)
    .await
    .map_err(storage)?;
    Ok(())
}

#[async_trait]
impl ThreadRepo for PgStore {
    /// The thread and its opening post commit together.
    async fn insert_thread(
        &self,
        t: Thread,
        opening_post: Post,
        ic_author: Option<CharacterId>,
    ) -> Result<()> {
        let mut tx = self.begin().await?;
        bump_ic_author(&mut tx, ic_author, opening_post.created_at).await?;
        sqlx::query(&format!(
            "INSERT INTO threads ({THREAD_COLUMNS}) \
             VALUES ($1, $2, $3, $4, NULL, NULL, $5, $6, $7, $8, $9)"
        ))
        .bind(t.id.0)
        .bind(&t.title)
        .bind(&t.subheader)
        .bind(Json(&t.location))
        .bind(t.is_pinned)
        .bind(Json(&t.author))
        .bind(t.owner_user_id.0)
        .bind(t.created_at)
        .bind(t.modified_at)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        insert_post_row(&mut tx, &opening_post).await?;
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn get_thread(&self, id: ThreadId) -> Result<Option<Thread>> {
        sqlx::query(&format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .as_ref()
            .map(thread_from_row)
            .transpose()
    }

    async fn list_posts(&self, thread_id: ThreadId) -> Result<Vec<Post>> {
        sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE thread_id = $1 ORDER BY created_at, id"
        ))
        .bind(thread_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .iter()
        .map(post_from_row)
        .collect()
    }

    async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .as_ref()
            .map(post_from_row)
            .transpose()
    }

    async fn insert_post(&self, post: Post, ic_author: Option<CharacterId>) -> Result<()> {
        let mut tx = self.begin().await?;
        bump_ic_author(&mut tx, ic_author, post.created_at).await?;
        lock_thread(&mut tx, post.thread_id, "FOR SHARE")
            .await?
            .ensure_open()?;
        insert_post_row(&mut tx, &post).await?;
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn update_post(
        &self,
        id: PostId,
        content: String,
        modified_by: Author,
        at: DateTime<Utc>,
    ) -> Result<Post> {
        let mut tx = self.begin().await?;
        let thread_id: Uuid = sqlx::query("SELECT thread_id FROM posts WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?
            .ok_or_else(|| DomainError::not_found("Post", id))?
            .try_get("thread_id")
            .map_err(storage)?;
        lock_thread(&mut tx, ThreadId(thread_id), "FOR SHARE")
            .await?
            .ensure_open()?;

        let row = sqlx::query(&format!(
            "UPDATE posts SET content = $2, modified_at = $3, modified_by = $4 \
             WHERE id = $1 RETURNING {POST_COLUMNS}"
        ))
        .bind(id.0)
        .bind(content)
        .bind(at)
        .bind(Json(modified_by))
        .fetch_one(&mut *tx)
        .await
        .map_err(storage)?;
        let post = post_from_row(&row)?;
        tx.commit().await.map_err(storage)?;
        Ok(post)
    }

    async fn toggle_pin(&self, id: ThreadId, at: DateTime<Utc>) -> Result<Thread> {
        sqlx::query(&format!(
            "UPDATE threads SET is_pinned = NOT is_pinned, modified_at = $2 \
             WHERE id = $1 RETURNING {THREAD_COLUMNS}"
        ))
        .bind(id.0)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .ok_or_else(|| DomainError::not_found("Thread", id))
        .and_then(|row| thread_from_row(&row))
    }

    async fn archive(
        &self,
        id: ThreadId,
        archive_forum: OocForumId,
        at: DateTime<Utc>,
    ) -> Result<Thread> {
        let mut tx = self.begin().await?;
        let mut thread = lock_thread(&mut tx, id, "FOR UPDATE").await?;
        thread.archive(archive_forum, at)?;
        sqlx::query(
            "UPDATE threads SET location = $2, original_location = $3, archived_at = $4, \
             modified_at = $4 WHERE id = $1",
        )
        .bind(id.0)
        .bind(Json(&thread.location))
        .bind(thread.original_location().map(Json))
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        tx.commit().await.map_err(storage)?;
        Ok(thread)
    }
}

#[async_trait]
impl SkillCatalog for PgStore {
    async fn list_actions(&self) -> Result<Vec<SkillAction>> {
        sqlx::query(&format!(
            "SELECT {ACTION_COLUMNS} FROM skill_actions ORDER BY category, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .iter()
        .map(action_from_row)
        .collect()
    }

    async fn find_actions(&self, ids: &[SkillActionId]) -> Result<Vec<SkillAction>> {
        let raw: Vec<i32> = ids.iter().map(|id| id.0).collect();
        sqlx::query(&format!(
            "SELECT {ACTION_COLUMNS} FROM skill_actions WHERE id = ANY($1)"
        ))
        .bind(raw)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .iter()
        .map(action_from_row)
        .collect()
    }

    async fn upsert_action(&self, a: SkillAction) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO skill_actions ({ACTION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET category = EXCLUDED.category, \
             category_description = EXCLUDED.category_description, action = EXCLUDED.action, \
             action_description = EXCLUDED.action_description, experience = EXCLUDED.experience, \
             physical = EXCLUDED.physical, knowledge = EXCLUDED.knowledge"
        ))
        .bind(a.id.0)
        .bind(&a.category)
        .bind(&a.category_description)
        .bind(&a.action)
        .bind(&a.action_description)
        .bind(i64::from(a.weights.experience))
        .bind(i64::from(a.weights.physical))
        .bind(i64::from(a.weights.knowledge))
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}

#[async_trait]
impl ClaimRepo for PgStore {
    /// The partial unique index on open claims turns the duplicate check and
    /// the insert into one statement.
    async fn insert_pending(&self, claim: SkillPointClaim) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO skill_claims ({CLAIM_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, NULL, NULL)"
        ))
        .bind(claim.id.0)
        .bind(claim.character_id.0)
        .bind(claim.thread_id.0)
        .bind(Json(&claim.lines))
        .bind(claim.status.as_str())
        .bind(claim.submitted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::DuplicateClaim {
                    character_id: claim.character_id.to_string(),
                    thread_id: claim.thread_id.to_string(),
                }
            } else {
                storage(e)
            }
        })?;
        Ok(())
    }

    async fn get_claim(&self, id: ClaimId) -> Result<Option<SkillPointClaim>> {
        sqlx::query(&format!("SELECT {CLAIM_COLUMNS} FROM skill_claims WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .as_ref()
            .map(claim_from_row)
            .transpose()
    }

    async fn list_for(
        &self,
        character_id: CharacterId,
        thread_id: ThreadId,
    ) -> Result<Vec<SkillPointClaim>> {
        sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM skill_claims \
             WHERE character_id = $1 AND thread_id = $2 ORDER BY submitted_at DESC"
        ))
        .bind(character_id.0)
        .bind(thread_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .iter()
        .map(claim_from_row)
        .collect()
    }

    async fn list_pending(&self) -> Result<Vec<SkillPointClaim>> {
        sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM skill_claims WHERE status = 'pending' \
             ORDER BY submitted_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .iter()
        .map(claim_from_row)
        .collect()
    }

    async fn count_pending(&self) -> Result<u64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM skill_claims WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?
            .try_get("n")
            .map_err(storage)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn settle(
        &self,
        id: ClaimId,
        decision: Decision,
        decided_by: UserId,
        at: DateTime<Utc>,
    ) -> Result<Settled> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM skill_claims WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?
        .ok_or_else(|| DomainError::not_found("Claim", id))?;
        let mut claim = claim_from_row(&row)?;
        let mut character = lock_character(&mut tx, claim.character_id).await?;

        claim.settle(decision, &mut character, decided_by, at)?;

        sqlx::query(
            "UPDATE skill_claims SET status = $2, decided_at = $3, decided_by = $4 WHERE id = $1",
        )
        .bind(id.0)
        .bind(claim.status.as_str())
        .bind(claim.decided_at)
        .bind(claim.decided_by.map(|u| u.0))
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        save_character(&mut tx, &character).await?;
        tx.commit().await.map_err(storage)?;

        Ok(Settled { claim, character })
    }
}

#[async_trait]
impl CheckLog for PgStore {
    async fn last_completed_check(&self) -> Result<Option<NaiveDate>> {
        sqlx::query_scalar::<_, Option<NaiveDate>>("SELECT MAX(check_date) FROM activity_checks")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)
    }

    async fn record_completed_check(&self, check_date: NaiveDate, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO activity_checks (check_date, completed_at) VALUES ($1, $2) \
             ON CONFLICT (check_date) DO NOTHING",
        )
        .bind(check_date)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}
