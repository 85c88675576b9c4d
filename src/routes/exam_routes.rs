use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AppState, CreateExamRequest, ExamListQuery, UpdateExamRequest, UserRole},
    scheduling::{Exam, ExamPatch, NewExam},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/exams", get(list_exams).post(request_exam))
        .route("/exams/{exam_id}", get(get_exam).patch(patch_exam))
}

fn ensure_clinical_staff(auth: &AuthContext) -> Result<(), ApiError> {
    match auth.role {
        UserRole::Admin | UserRole::Professional(_) => Ok(()),
        _ => Err(ApiError::forbidden(
            "Only professionals and admins can manage exams",
        )),
    }
}

/* ===== POST /exams ===== */

pub async fn request_exam(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateExamRequest>,
) -> Result<Json<Exam>, ApiError> {
    ensure_clinical_staff(&auth)?;

    // professionals always request in their own name
    let professional_id = auth
        .role
        .professional_id()
        .or(req.professional_id)
        .ok_or_else(|| {
            ApiError::BadRequest("VALIDATION_ERROR", "professional_id is required".into())
        })?;

    let exam = state
        .exams
        .request_exam(NewExam {
            patient_id: req.patient_id,
            professional_id,
            appointment_id: req.appointment_id,
            exam_type: req.exam_type,
        })
        .await?;
    Ok(Json(exam))
}

/* ===== GET /exams ===== */

pub async fn list_exams(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ExamListQuery>,
) -> Result<Json<Vec<Exam>>, ApiError> {
    let patient_id = match &auth.role {
        UserRole::Admin | UserRole::Professional(_) => q.patient_id,
        UserRole::Patient(p) => Some(p.patient_id),
        UserRole::Plain => {
            return Err(ApiError::forbidden("You do not have access to exams"));
        }
    };
    Ok(Json(state.exams.list_exams(patient_id).await?))
}

/* ===== GET /exams/{id} ===== */

pub async fn get_exam(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(exam_id): Path<Uuid>,
) -> Result<Json<Exam>, ApiError> {
    let exam = state.exams.find_exam(exam_id).await?;
    let allowed = match &auth.role {
        UserRole::Admin | UserRole::Professional(_) => true,
        UserRole::Patient(p) => p.patient_id == exam.patient_id,
        UserRole::Plain => false,
    };
    if !allowed {
        return Err(ApiError::forbidden("You do not have access to this exam"));
    }
    Ok(Json(exam))
}

/* ===== PATCH /exams/{id} ===== */

pub async fn patch_exam(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(exam_id): Path<Uuid>,
    Json(req): Json<UpdateExamRequest>,
) -> Result<Json<Exam>, ApiError> {
    ensure_clinical_staff(&auth)?;

    let exam = state
        .exams
        .update_exam(
            exam_id,
            ExamPatch {
                status: req.status,
                result: req.result,
            },
        )
        .await?;
    Ok(Json(exam))
}
