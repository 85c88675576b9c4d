use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduling::{
    Appointment, AppointmentStatus, Coordinator, ExamService, ExamStatus, Patient, PatientLookup,
    Professional, ProfessionalLookup,
};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub coordinator: Coordinator,
    pub exams: ExamService,
    pub patients: Arc<dyn PatientLookup>,
    pub professionals: Arc<dyn ProfessionalLookup>,
}

/* -------------------------
   Caller identity
--------------------------*/

/// Who the caller is, resolved once per request from their session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRole {
    Patient(Patient),
    Professional(Professional),
    Admin,
    Plain,
}

impl UserRole {
    /// Admin wins over profiles; a user holding both profiles acts as the
    /// professional.
    pub fn resolve(
        is_admin: bool,
        patient: Option<Patient>,
        professional: Option<Professional>,
    ) -> Self {
        if is_admin {
            UserRole::Admin
        } else if let Some(professional) = professional {
            UserRole::Professional(professional)
        } else if let Some(patient) = patient {
            UserRole::Patient(patient)
        } else {
            UserRole::Plain
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    pub fn patient_id(&self) -> Option<Uuid> {
        match self {
            UserRole::Patient(p) => Some(p.patient_id),
            _ => None,
        }
    }

    pub fn professional_id(&self) -> Option<Uuid> {
        match self {
            UserRole::Professional(p) => Some(p.professional_id),
            _ => None,
        }
    }
}

/* -------------------------
   Slot DTOs
--------------------------*/

#[derive(Debug, Deserialize)]
pub struct CreateSlotRequest {
    /// Defaults to the calling professional.
    pub professional_id: Option<Uuid>,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSlotRequest {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

#[derive(Debug, Deserialize)]
pub struct AvailableSlotsQuery {
    pub date: NaiveDate,
}

/* -------------------------
   Appointment DTOs
--------------------------*/

/// Instants must carry an offset; they are normalised to UTC here.
#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub professional_id: Uuid,
    pub date_time: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub date_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub patient_id: Option<Uuid>,
    pub professional_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct PatientBrief {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ProfessionalBrief {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub professional_type: String,
}

#[derive(Debug, Serialize)]
pub struct AppointmentView {
    pub id: Uuid,
    pub date_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub patient: PatientBrief,
    pub professional: ProfessionalBrief,
}

impl AppointmentView {
    pub fn new(appointment: Appointment, patient: Patient, professional: Professional) -> Self {
        AppointmentView {
            id: appointment.appointment_id,
            date_time: appointment.date_time,
            status: appointment.status,
            notes: appointment.notes,
            patient: PatientBrief {
                id: patient.patient_id,
                name: patient.name,
            },
            professional: ProfessionalBrief {
                id: professional.professional_id,
                name: professional.name,
                professional_type: professional.professional_type,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/* -------------------------
   Exam DTOs
--------------------------*/

#[derive(Debug, Deserialize)]
pub struct CreateExamRequest {
    pub patient_id: Uuid,
    /// Defaults to the calling professional.
    pub professional_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub exam_type: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateExamRequest {
    pub status: Option<ExamStatus>,
    pub result: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExamListQuery {
    pub patient_id: Option<Uuid>,
}
