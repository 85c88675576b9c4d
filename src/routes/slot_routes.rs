use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AppState, AvailableSlotsQuery, CreateSlotRequest, MessageResponse, UpdateSlotRequest},
    scheduling::{NewSlot, Slot, SlotPatch},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/slots", post(create_slot))
        .route(
            "/slots/{slot_id}",
            get(get_slot).patch(patch_slot).delete(delete_slot),
        )
        .route("/professionals/{professional_id}/slots", get(list_slots))
        .route(
            "/professionals/{professional_id}/slots/available",
            get(list_available_slots),
        )
}

/// Slots are managed by the professional who owns them, or by an admin.
fn ensure_slot_owner(auth: &AuthContext, professional_id: Uuid) -> Result<(), ApiError> {
    if auth.role.is_admin() || auth.role.professional_id() == Some(professional_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Only the owning professional or an admin can manage this schedule",
        ))
    }
}

/* ===== POST /slots ===== */

pub async fn create_slot(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateSlotRequest>,
) -> Result<Json<Slot>, ApiError> {
    let professional_id = req
        .professional_id
        .or(auth.role.professional_id())
        .ok_or_else(|| {
            ApiError::BadRequest("VALIDATION_ERROR", "professional_id is required".into())
        })?;
    ensure_slot_owner(&auth, professional_id)?;

    let slot = state
        .coordinator
        .create_slot(NewSlot {
            professional_id,
            slot_date: req.date,
            slot_time: req.time,
        })
        .await?;
    Ok(Json(slot))
}

/* ===== GET /slots/{id} ===== */

pub async fn get_slot(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<Slot>, ApiError> {
    Ok(Json(state.coordinator.find_slot(slot_id).await?))
}

/* ===== PATCH /slots/{id} ===== */

pub async fn patch_slot(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slot_id): Path<Uuid>,
    Json(req): Json<UpdateSlotRequest>,
) -> Result<Json<Slot>, ApiError> {
    let current = state.coordinator.find_slot(slot_id).await?;
    ensure_slot_owner(&auth, current.professional_id)?;

    let slot = state
        .coordinator
        .update_slot(
            slot_id,
            SlotPatch {
                slot_date: req.date,
                slot_time: req.time,
            },
        )
        .await?;
    Ok(Json(slot))
}

/* ===== DELETE /slots/{id} ===== */

pub async fn delete_slot(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let current = state.coordinator.find_slot(slot_id).await?;
    ensure_slot_owner(&auth, current.professional_id)?;

    state.coordinator.delete_slot(slot_id).await?;
    Ok(Json(MessageResponse::new("Slot deleted.")))
}

/* ===== GET /professionals/{id}/slots ===== */

pub async fn list_slots(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(professional_id): Path<Uuid>,
) -> Result<Json<Vec<Slot>>, ApiError> {
    Ok(Json(state.coordinator.list_slots(professional_id).await?))
}

/* ===== GET /professionals/{id}/slots/available?date= ===== */

pub async fn list_available_slots(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(professional_id): Path<Uuid>,
    Query(q): Query<AvailableSlotsQuery>,
) -> Result<Json<Vec<Slot>>, ApiError> {
    Ok(Json(
        state
            .coordinator
            .list_available_slots(professional_id, q.date)
            .await?,
    ))
}
