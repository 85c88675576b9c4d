// src/routes/appointment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch},
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        AppState, AppointmentListQuery, AppointmentView, BookRequest, MessageResponse,
        UpdateAppointmentRequest, UserRole,
    },
    scheduling::{
        Appointment, AppointmentFilter, AppointmentUpdate, NewAppointment, SchedulingError,
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(book_appointment))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment)
                .patch(patch_appointment)
                .delete(delete_appointment),
        )
        .route("/appointments/{appointment_id}/confirm", patch(confirm_appointment))
        .route("/appointments/{appointment_id}/cancel", patch(cancel_appointment))
        .route("/appointments/{appointment_id}/finalize", patch(finalize_appointment))
}

/* ============================================================
   Authorization
   ============================================================ */

fn is_owning_patient(auth: &AuthContext, appointment: &Appointment) -> bool {
    auth.role.patient_id() == Some(appointment.patient_id)
}

fn is_owning_professional(auth: &AuthContext, appointment: &Appointment) -> bool {
    auth.role.professional_id() == Some(appointment.professional_id)
}

/// Patient side, professional side, or admin.
fn ensure_party(auth: &AuthContext, appointment: &Appointment) -> Result<(), ApiError> {
    if auth.role.is_admin()
        || is_owning_patient(auth, appointment)
        || is_owning_professional(auth, appointment)
    {
        Ok(())
    } else {
        Err(ApiError::forbidden("You are not part of this appointment"))
    }
}

fn ensure_attending(auth: &AuthContext, appointment: &Appointment) -> Result<(), ApiError> {
    if auth.role.is_admin() || is_owning_professional(auth, appointment) {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Only the attending professional or an admin can do this",
        ))
    }
}

/// Non-admins only ever see their own side of the schedule.
fn scope_filter(
    auth: &AuthContext,
    q: AppointmentListQuery,
) -> Result<AppointmentFilter, ApiError> {
    match &auth.role {
        UserRole::Admin => Ok(AppointmentFilter {
            patient_id: q.patient_id,
            professional_id: q.professional_id,
        }),
        UserRole::Patient(p) => Ok(AppointmentFilter {
            patient_id: Some(p.patient_id),
            professional_id: q.professional_id,
        }),
        UserRole::Professional(p) => Ok(AppointmentFilter {
            patient_id: q.patient_id,
            professional_id: Some(p.professional_id),
        }),
        UserRole::Plain => Err(ApiError::forbidden(
            "Only patients, professionals and admins have appointments",
        )),
    }
}

async fn to_view(state: &AppState, appointment: Appointment) -> Result<AppointmentView, ApiError> {
    let patient = state
        .patients
        .find_patient(appointment.patient_id)
        .await?
        .ok_or_else(|| SchedulingError::not_found("patient"))?;
    let professional = state
        .professionals
        .find_professional(appointment.professional_id)
        .await?
        .ok_or_else(|| SchedulingError::not_found("professional"))?;
    Ok(AppointmentView::new(appointment, patient, professional))
}

async fn load_appointment(state: &AppState, appointment_id: Uuid) -> Result<Appointment, ApiError> {
    Ok(state.coordinator.find_appointment(appointment_id).await?)
}

/* ===== POST /appointments ===== */

pub async fn book_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<BookRequest>,
) -> Result<Json<AppointmentView>, ApiError> {
    let Some(patient_id) = auth.role.patient_id() else {
        return Err(ApiError::forbidden("Only patients can book appointments"));
    };

    let booking = state
        .coordinator
        .book_with_parties(NewAppointment {
            patient_id,
            professional_id: req.professional_id,
            date_time: req.date_time,
            notes: req.notes,
        })
        .await?;
    Ok(Json(AppointmentView::new(
        booking.appointment,
        booking.patient,
        booking.professional,
    )))
}

/* ===== GET /appointments ===== */

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<AppointmentListQuery>,
) -> Result<Json<Vec<AppointmentView>>, ApiError> {
    let filter = scope_filter(&auth, q)?;
    let appointments = state.coordinator.list_appointments(filter).await?;

    let mut out = Vec::with_capacity(appointments.len());
    for appointment in appointments {
        out.push(to_view(&state, appointment).await?);
    }
    Ok(Json(out))
}

/* ===== GET /appointments/{id} ===== */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<AppointmentView>, ApiError> {
    let appointment = load_appointment(&state, appointment_id).await?;
    ensure_party(&auth, &appointment)?;
    Ok(Json(to_view(&state, appointment).await?))
}

/* ===== PATCH /appointments/{id} ===== */

pub async fn patch_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<UpdateAppointmentRequest>,
) -> Result<Json<AppointmentView>, ApiError> {
    let current = load_appointment(&state, appointment_id).await?;
    ensure_party(&auth, &current)?;

    let appointment = state
        .coordinator
        .update_appointment(
            appointment_id,
            AppointmentUpdate {
                date_time: req.date_time,
                notes: req.notes,
            },
        )
        .await?;
    Ok(Json(to_view(&state, appointment).await?))
}

/* ===== PATCH /appointments/{id}/confirm ===== */

pub async fn confirm_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<AppointmentView>, ApiError> {
    let current = load_appointment(&state, appointment_id).await?;
    ensure_attending(&auth, &current)?;

    let appointment = state.coordinator.confirm(appointment_id).await?;
    Ok(Json(to_view(&state, appointment).await?))
}

/* ===== PATCH /appointments/{id}/cancel ===== */

pub async fn cancel_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<AppointmentView>, ApiError> {
    let current = load_appointment(&state, appointment_id).await?;
    ensure_party(&auth, &current)?;

    let appointment = state.coordinator.cancel(appointment_id).await?;
    Ok(Json(to_view(&state, appointment).await?))
}

/* ===== PATCH /appointments/{id}/finalize ===== */

pub async fn finalize_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<AppointmentView>, ApiError> {
    let current = load_appointment(&state, appointment_id).await?;
    ensure_attending(&auth, &current)?;

    let appointment = state.coordinator.finalize(appointment_id).await?;
    Ok(Json(to_view(&state, appointment).await?))
}

/* ===== DELETE /appointments/{id} ===== */

pub async fn delete_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !auth.role.is_admin() {
        return Err(ApiError::forbidden("Only admins can delete appointments"));
    }

    state.coordinator.delete_appointment(appointment_id).await?;
    Ok(Json(MessageResponse::new("Appointment deleted.")))
}
