use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::SchedulingError;
use super::status::AppointmentStatus;

/* -------------------------
   Slots
--------------------------*/

/// One bookable instant for one professional. `(professional_id, slot_date,
/// slot_time)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Slot {
    pub slot_id: Uuid,
    pub professional_id: Uuid,
    pub slot_date: NaiveDate,
    pub slot_time: NaiveTime,
    pub available: bool,
    pub created_at: DateTime<Utc>,
}

impl Slot {
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.slot_date.and_time(self.slot_time).and_utc()
    }

    pub fn is_at(&self, professional_id: Uuid, at: DateTime<Utc>) -> bool {
        let (date, time) = slot_key(at);
        self.professional_id == professional_id && self.slot_date == date && self.slot_time == time
    }
}

/// Splits a UTC instant into the (date, time) pair slots are keyed by.
pub fn slot_key(at: DateTime<Utc>) -> (NaiveDate, NaiveTime) {
    let naive = at.naive_utc();
    (naive.date(), naive.time())
}

#[derive(Debug, Clone)]
pub struct NewSlot {
    pub professional_id: Uuid,
    pub slot_date: NaiveDate,
    pub slot_time: NaiveTime,
}

/// Availability is deliberately absent: only the coordinator flips it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotPatch {
    pub slot_date: Option<NaiveDate>,
    pub slot_time: Option<NaiveTime>,
}

impl SlotPatch {
    pub fn is_empty(&self) -> bool {
        self.slot_date.is_none() && self.slot_time.is_none()
    }
}

/* -------------------------
   Appointments
--------------------------*/

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Appointment {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub date_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct AppointmentRow {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub date_time: DateTime<Utc>,
    pub status: i16,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = SchedulingError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Appointment {
            appointment_id: row.appointment_id,
            patient_id: row.patient_id,
            professional_id: row.professional_id,
            date_time: row.date_time,
            status: AppointmentStatus::try_from(row.status)?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub date_time: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Fields editable without going through the reservation protocol.
#[derive(Debug, Clone, Default)]
pub struct AppointmentPatch {
    pub notes: Option<String>,
}

/// Partial update accepted by the coordinator. A date-time different from
/// the current one triggers a reschedule.
#[derive(Debug, Clone, Default)]
pub struct AppointmentUpdate {
    pub date_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AppointmentFilter {
    pub patient_id: Option<Uuid>,
    pub professional_id: Option<Uuid>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.patient_id.is_none_or(|id| id == appointment.patient_id)
            && self
                .professional_id
                .is_none_or(|id| id == appointment.professional_id)
    }
}

/* -------------------------
   Exams
--------------------------*/

/// 0 requested, 1 in_progress, 2 completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum ExamStatus {
    Requested = 0,
    InProgress = 1,
    Completed = 2,
}

impl TryFrom<i16> for ExamStatus {
    type Error = SchedulingError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ExamStatus::Requested),
            1 => Ok(ExamStatus::InProgress),
            2 => Ok(ExamStatus::Completed),
            other => Err(SchedulingError::Validation(format!("unknown exam status {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exam {
    pub exam_id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub exam_type: String,
    pub status: ExamStatus,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ExamRow {
    pub exam_id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub exam_type: String,
    pub status: i16,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ExamRow> for Exam {
    type Error = SchedulingError;

    fn try_from(row: ExamRow) -> Result<Self, Self::Error> {
        Ok(Exam {
            exam_id: row.exam_id,
            patient_id: row.patient_id,
            professional_id: row.professional_id,
            appointment_id: row.appointment_id,
            exam_type: row.exam_type,
            status: ExamStatus::try_from(row.status)?,
            result: row.result,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewExam {
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub exam_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExamPatch {
    pub status: Option<ExamStatus>,
    pub result: Option<String>,
}

/* -------------------------
   Collaborator records
--------------------------*/

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Patient {
    pub patient_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Professional {
    pub professional_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// "physician", "nurse", "technician", ...
    pub professional_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Appointment,
    Exam,
    System,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Appointment => write!(f, "appointment"),
            NotificationKind::Exam => write!(f, "exam"),
            NotificationKind::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Note,
    Evolution,
    Prescription,
    Exam,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Note => write!(f, "note"),
            EntryKind::Evolution => write!(f, "evolution"),
            EntryKind::Prescription => write!(f, "prescription"),
            EntryKind::Exam => write!(f, "exam"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordEntry {
    pub entry_id: Uuid,
    pub patient_id: Uuid,
    pub text: String,
    pub kind: EntryKind,
    pub appointment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
