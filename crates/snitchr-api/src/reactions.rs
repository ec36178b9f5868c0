use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::json;
use tracing::debug;

use snitchr_types::events::ChangeEvent;
use snitchr_types::models::{Confession, Reactions};

use crate::confessions::{encode_reactions, row_to_confession};
use crate::error::ApiError;
use crate::state::{AppState, run_db, track};

/// Full replacement of a confession's reactions map.
pub async fn update_reactions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(reactions): Json<Reactions>,
) -> Result<Json<Confession>, ApiError> {
    let encoded = encode_reactions(&reactions)?;

    let target = id.clone();
    let row = run_db(&state, move |db| db.update_reactions(&target, &encoded))
        .await?
        .ok_or_else(|| ApiError::NotFound(id.clone()))?;

    let confession = row_to_confession(row);
    debug!("Updated reactions on confession {}", confession.id);

    state.dispatcher.publish(ChangeEvent::Update(confession.clone()));

    track(
        &state,
        "reaction_updated",
        json!({ "confession_id": id, "total_reactions": reactions.total() }),
    )
    .await;

    Ok(Json(confession))
}
