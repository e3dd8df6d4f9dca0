//! # Handlers
//!
//! Each handler extracts the actor and the request, calls one service
//! operation and records its outcome.

use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    Json,
};

use domains::activity::{SortDirection, TrackerSort};
use domains::{CharacterId, ClaimId, Post, PostId, SkillPointClaim, Thread, ThreadId};
use services::{EvaluationReport, NewCharacter, NewPost, NewThread, SubmitClaim, ThreadView};

use crate::dto::{
    CatalogQuery, CatalogResponse, CharacterResponse, ClaimListQuery, CountResponse,
    DecisionRequest, DropdownRequest, EditPostRequest, EligibilityQuery, EligibilityResponse, HealthResponse, ScheduleResponse,
    TrackerQuery, TrackerResponse,
};
use crate::error::{domain_code, ApiError, ApiResult};
use crate::extract::MaybeActor;
use crate::metrics::Metrics;
use crate::state::AppState;

fn observe<T>(metrics: &Metrics, operation: &'static str, result: domains::Result<T>) -> ApiResult<T> {
    match &result {
        Ok(_) => metrics.record(operation, "ok"),
        Err(e) => metrics.record(operation, domain_code(e)),
    }
    result.map_err(ApiError::from)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let body = state.metrics.render()?;
    Ok((
        [(CONTENT_TYPE, "application/openmetrics-text; version=1.0.0; charset=utf-8")],
        body,
    ))
}

// ── Activity ─────────────────────────────────────────────────────────────────

pub async fn schedule(State(state): State<AppState>) -> Json<ScheduleResponse> {
    let schedule = state.services.activity.schedule();
    Json(ScheduleResponse {
        next_check_date: schedule.next_check_date,
        cutoff_date: schedule.cutoff_date,
    })
}

pub async fn tracker(
    State(state): State<AppState>,
    Query(query): Query<TrackerQuery>,
) -> ApiResult<Json<TrackerResponse>> {
    let sort = query
        .sort
        .as_deref()
        .map(str::parse::<TrackerSort>)
        .transpose()?
        .unwrap_or_default();
    let direction = query
        .direction
        .as_deref()
        .map(str::parse::<SortDirection>)
        .transpose()?
        .unwrap_or_default();

    let (schedule, characters) = observe(
        &state.metrics,
        "activity_tracker",
        state.services.activity.tracker(sort, direction).await,
    )?;
    Ok(Json(TrackerResponse {
        next_check_date: schedule.next_check_date,
        cutoff_date: schedule.cutoff_date,
        characters,
    }))
}

pub async fn evaluate(
    State(state): State<AppState>,
    actor: MaybeActor,
) -> ApiResult<Json<EvaluationReport>> {
    let report = observe(
        &state.metrics,
        "evaluate_activity",
        state.services.activity.run_check(actor.as_ref()).await,
    )?;
    state.metrics.record_deactivations(report.deactivated.len() as u64);
    Ok(Json(report))
}

// ── Characters ───────────────────────────────────────────────────────────────

pub async fn create_character(
    State(state): State<AppState>,
    actor: MaybeActor,
    Json(input): Json<NewCharacter>,
) -> ApiResult<(StatusCode, Json<CharacterResponse>)> {
    let character = observe(
        &state.metrics,
        "create_character",
        state.services.characters.create(actor.as_ref(), input).await,
    )?;
    Ok((StatusCode::CREATED, Json(character.into())))
}

pub async fn get_character(
    State(state): State<AppState>,
    Path(id): Path<CharacterId>,
) -> ApiResult<Json<CharacterResponse>> {
    let character = observe(&state.metrics, "get_character", state.services.characters.get(id).await)?;
    Ok(Json(character.into()))
}

pub async fn reactivate_character(
    State(state): State<AppState>,
    actor: MaybeActor,
    Path(id): Path<CharacterId>,
) -> ApiResult<Json<CharacterResponse>> {
    let character = observe(
        &state.metrics,
        "reactivate_character",
        state.services.characters.reactivate(actor.as_ref(), id).await,
    )?;
    Ok(Json(character.into()))
}

pub async fn mark_dead(
    State(state): State<AppState>,
    actor: MaybeActor,
    Path(id): Path<CharacterId>,
) -> ApiResult<Json<CharacterResponse>> {
    let character = observe(
        &state.metrics,
        "mark_dead",
        state.services.characters.mark_dead(actor.as_ref(), id).await,
    )?;
    Ok(Json(character.into()))
}

pub async fn set_show_in_dropdown(
    State(state): State<AppState>,
    actor: MaybeActor,
    Path(id): Path<CharacterId>,
    Json(body): Json<DropdownRequest>,
) -> ApiResult<Json<CharacterResponse>> {
    let character = observe(
        &state.metrics,
        "set_show_in_dropdown",
        state
            .services
            .characters
            .set_show_in_dropdown(actor.as_ref(), id, body.show)
            .await,
    )?;
    Ok(Json(character.into()))
}

// ── Threads & posts ──────────────────────────────────────────────────────────

pub async fn create_thread(
    State(state): State<AppState>,
    actor: MaybeActor,
    Json(input): Json<NewThread>,
) -> ApiResult<(StatusCode, Json<ThreadView>)> {
    let view = observe(
        &state.metrics,
        "create_thread",
        state.services.posts.create_thread(actor.as_ref(), input).await,
    )?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn view_thread(
    State(state): State<AppState>,
    Path(id): Path<ThreadId>,
) -> ApiResult<Json<ThreadView>> {
    let view = observe(&state.metrics, "view_thread", state.services.posts.view_thread(id).await)?;
    Ok(Json(view))
}

pub async fn reply(
    State(state): State<AppState>,
    actor: MaybeActor,
    Path(id): Path<ThreadId>,
    Json(input): Json<NewPost>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let post = observe(
        &state.metrics,
        "reply",
        state.services.posts.reply(actor.as_ref(), id, input).await,
    )?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn edit_post(
    State(state): State<AppState>,
    actor: MaybeActor,
    Path(id): Path<PostId>,
    Json(body): Json<EditPostRequest>,
) -> ApiResult<Json<Post>> {
    let post = observe(
        &state.metrics,
        "edit_post",
        state.services.posts.edit(actor.as_ref(), id, body.content).await,
    )?;
    Ok(Json(post))
}

pub async fn toggle_pin(
    State(state): State<AppState>,
    actor: MaybeActor,
    Path(id): Path<ThreadId>,
) -> ApiResult<Json<Thread>> {
    let thread = observe(
        &state.metrics,
        "toggle_pin",
        state.services.threads.toggle_pin(actor.as_ref(), id).await,
    )?;
    Ok(Json(thread))
}

pub async fn archive_thread(
    State(state): State<AppState>,
    actor: MaybeActor,
    Path(id): Path<ThreadId>,
) -> ApiResult<Json<Thread>> {
    let thread = observe(
        &state.metrics,
        "archive_thread",
        state.services.threads.archive(actor.as_ref(), id).await,
    )?;
    Ok(Json(thread))
}

pub async fn eligibility(
    State(state): State<AppState>,
    Path(thread_id): Path<ThreadId>,
    Query(query): Query<EligibilityQuery>,
) -> ApiResult<Json<EligibilityResponse>> {
    let eligible = observe(
        &state.metrics,
        "is_eligible",
        state.services.claims.is_eligible(query.character_id, thread_id).await,
    )?;
    Ok(Json(EligibilityResponse {
        character_id: query.character_id,
        thread_id,
        eligible,
    }))
}

// ── Skill points ─────────────────────────────────────────────────────────────

pub async fn skill_actions(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<CatalogResponse>> {
    let q = query.q.as_deref();
    let response = if query.grouped {
        CatalogResponse::Grouped(observe(
            &state.metrics,
            "skill_actions",
            state.services.claims.grouped_actions(q).await,
        )?)
    } else {
        CatalogResponse::Flat(observe(
            &state.metrics,
            "skill_actions",
            state.services.claims.search_actions(q).await,
        )?)
    };
    Ok(Json(response))
}

pub async fn submit_claim(
    State(state): State<AppState>,
    actor: MaybeActor,
    Json(input): Json<SubmitClaim>,
) -> ApiResult<(StatusCode, Json<SkillPointClaim>)> {
    let claim = observe(
        &state.metrics,
        "submit_claim",
        state.services.claims.submit(actor.as_ref(), input).await,
    )?;
    Ok((StatusCode::CREATED, Json(claim)))
}

pub async fn list_claims(
    State(state): State<AppState>,
    Query(query): Query<ClaimListQuery>,
) -> ApiResult<Json<Vec<SkillPointClaim>>> {
    let claims = observe(
        &state.metrics,
        "list_claims",
        state
            .services
            .claims
            .list_for(query.character_id, query.thread_id)
            .await,
    )?;
    Ok(Json(claims))
}

pub async fn pending_claims(
    State(state): State<AppState>,
    actor: MaybeActor,
) -> ApiResult<Json<Vec<SkillPointClaim>>> {
    let claims = observe(
        &state.metrics,
        "pending_claims",
        state.services.claims.pending(actor.as_ref()).await,
    )?;
    Ok(Json(claims))
}

pub async fn pending_claim_count(
    State(state): State<AppState>,
    actor: MaybeActor,
) -> ApiResult<Json<CountResponse>> {
    let count = observe(
        &state.metrics,
        "pending_claim_count",
        state.services.claims.pending_count(actor.as_ref()).await,
    )?;
    Ok(Json(CountResponse { count }))
}

pub async fn decide_claim(
    State(state): State<AppState>,
    actor: MaybeActor,
    Path(id): Path<ClaimId>,
    Json(body): Json<DecisionRequest>,
) -> ApiResult<Json<SkillPointClaim>> {
    let claim = observe(
        &state.metrics,
        "decide_claim",
        state.services.claims.decide(actor.as_ref(), id, body.decision).await,
    )?;
    Ok(Json(claim))
}
