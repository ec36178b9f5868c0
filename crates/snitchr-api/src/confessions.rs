use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use snitchr_db::models::ConfessionRow;
use snitchr_types::ValidationError;
use snitchr_types::api::{MAX_PAGE_SIZE, NewConfession, PageQuery, PageResponse, Stats};
use snitchr_types::events::ChangeEvent;
use snitchr_types::models::{Confession, Location, Reactions};

use crate::error::ApiError;
use crate::state::{AppState, run_db, track};

pub async fn list_confessions(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse>, ApiError> {
    if query.page_size == 0 {
        return Err(ValidationError::InvalidPageSize.into());
    }
    let page_size = query.page_size.min(MAX_PAGE_SIZE);
    let offset = u64::from(query.page) * u64::from(page_size);
    let list_query = query.list_query();

    let (rows, total) = run_db(&state, move |db| {
        db.list_confessions(list_query.search_term(), list_query.filter, offset, page_size)
    })
    .await?;

    Ok(Json(PageResponse {
        confessions: rows.into_iter().map(row_to_confession).collect(),
        total,
    }))
}

pub async fn create_confession(
    State(state): State<AppState>,
    Json(req): Json<NewConfession>,
) -> Result<impl IntoResponse, ApiError> {
    let draft = req.validated()?;

    let row = ConfessionRow {
        id: Uuid::new_v4().to_string(),
        message: draft.message,
        nickname: draft.nickname,
        mood: draft.mood.map(|m| m.slug().to_string()),
        latitude: draft.location.map(|l| l.latitude),
        longitude: draft.location.map(|l| l.longitude),
        reactions: encode_reactions(&Reactions::default())?,
        created_at: format_timestamp(Utc::now()),
    };

    let insert = row.clone();
    run_db(&state, move |db| db.insert_confession(&insert)).await?;

    let confession = row_to_confession(row);
    info!("Created confession {}", confession.id);

    state.dispatcher.publish(ChangeEvent::Insert(confession.clone()));

    track(
        &state,
        "confession_created",
        json!({
            "confession_id": confession.id,
            "has_nickname": confession.nickname.is_some(),
            "has_mood": confession.mood.is_some(),
            "has_location": confession.location.is_some(),
        }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(confession)))
}

pub async fn get_confession(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Confession>, ApiError> {
    let lookup = id.clone();
    let row = run_db(&state, move |db| db.get_confession(&lookup))
        .await?
        .ok_or(ApiError::NotFound(id))?;

    Ok(Json(row_to_confession(row)))
}

pub async fn delete_confession(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let target = id.clone();
    let row = run_db(&state, move |db| db.delete_confession(&target))
        .await?
        .ok_or_else(|| ApiError::NotFound(id.clone()))?;

    info!("Deleted confession {}", id);
    state.dispatcher.publish(ChangeEvent::Delete(row_to_confession(row)));

    track(&state, "confession_deleted", json!({ "confession_id": id })).await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_stats(State(state): State<AppState>) -> Result<Json<Stats>, ApiError> {
    let today_start = format_timestamp(Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc());

    let row = run_db(&state, move |db| db.stats(&today_start)).await?;

    Ok(Json(Stats {
        total_confessions: row.total_confessions,
        today_confessions: row.today_confessions,
        total_reactions: row.total_reactions,
    }))
}

/// Fixed-width RFC 3339 so stored timestamps sort as text.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn encode_reactions(reactions: &Reactions) -> Result<String, ApiError> {
    serde_json::to_string(reactions).map_err(|e| ApiError::Internal(e.into()))
}

pub(crate) fn row_to_confession(row: ConfessionRow) -> Confession {
    let reactions = serde_json::from_str::<Reactions>(&row.reactions).unwrap_or_else(|e| {
        warn!("Corrupt reactions on confession '{}': {}", row.id, e);
        Reactions::default()
    });

    let mood = row.mood.as_deref().and_then(|slug| match slug.parse() {
        Ok(mood) => Some(mood),
        Err(e) => {
            warn!("Corrupt mood on confession '{}': {}", row.id, e);
            None
        }
    });

    let location = match (row.latitude, row.longitude) {
        (Some(latitude), Some(longitude)) => Some(Location { latitude, longitude }),
        _ => None,
    };

    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on confession '{}': {}", row.created_at, row.id, e);
            DateTime::default()
        });

    Confession {
        id: row.id,
        message: row.message,
        nickname: row.nickname,
        mood,
        location,
        created_at,
        reactions,
    }
}
