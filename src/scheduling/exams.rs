use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::collaborators::{
    MedicalRecordSink, NotificationSink, PatientLookup, ProfessionalLookup, notify_best_effort,
    record_best_effort,
};
use super::coordinator::DEFAULT_STORE_TIMEOUT;
use super::error::SchedulingError;
use super::model::{Exam, ExamPatch, ExamStatus, NewExam, NotificationKind};
use super::store::SchedulingStore;

/// Exams and the exam → medical record bridge.
#[derive(Clone)]
pub struct ExamService {
    store: Arc<dyn SchedulingStore>,
    patients: Arc<dyn PatientLookup>,
    professionals: Arc<dyn ProfessionalLookup>,
    notifications: Arc<dyn NotificationSink>,
    records: Arc<dyn MedicalRecordSink>,
    store_timeout: Duration,
}

impl ExamService {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        patients: Arc<dyn PatientLookup>,
        professionals: Arc<dyn ProfessionalLookup>,
        notifications: Arc<dyn NotificationSink>,
        records: Arc<dyn MedicalRecordSink>,
    ) -> Self {
        Self {
            store,
            patients,
            professionals,
            notifications,
            records,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub async fn request_exam(&self, new: NewExam) -> Result<Exam, SchedulingError> {
        let exam_type = new.exam_type.trim().to_string();
        if exam_type.is_empty() {
            return Err(SchedulingError::Validation("exam_type is required".into()));
        }

        let exam = self
            .within_deadline("request_exam", async move {
                if self.patients.find_patient(new.patient_id).await?.is_none() {
                    return Err(SchedulingError::not_found("patient"));
                }
                if self
                    .professionals
                    .find_professional(new.professional_id)
                    .await?
                    .is_none()
                {
                    return Err(SchedulingError::not_found("professional"));
                }

                let mut uow = self.store.begin().await?;
                if let Some(appointment_id) = new.appointment_id {
                    if uow.appointment_by_id(appointment_id).await?.is_none() {
                        return Err(SchedulingError::not_found("appointment"));
                    }
                }

                let now = Utc::now();
                let exam = Exam {
                    exam_id: Uuid::new_v4(),
                    patient_id: new.patient_id,
                    professional_id: new.professional_id,
                    appointment_id: new.appointment_id,
                    exam_type,
                    status: ExamStatus::Requested,
                    result: None,
                    created_at: now,
                    updated_at: now,
                };
                let exam = uow.insert_exam(&exam).await?;
                uow.commit().await?;
                Ok(exam)
            })
            .await?;

        info!(
            "Exam {} ({}) requested for patient {}",
            exam.exam_id, exam.exam_type, exam.patient_id
        );
        Ok(exam)
    }

    pub async fn find_exam(&self, exam_id: Uuid) -> Result<Exam, SchedulingError> {
        self.within_deadline("find_exam", async move {
            let mut uow = self.store.begin().await?;
            let exam = uow
                .exam_by_id(exam_id)
                .await?
                .ok_or_else(|| SchedulingError::not_found("exam"))?;
            uow.commit().await?;
            Ok(exam)
        })
        .await
    }

    /// Newest first.
    pub async fn list_exams(
        &self,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<Exam>, SchedulingError> {
        self.within_deadline("list_exams", async move {
            let mut uow = self.store.begin().await?;
            let exams = uow.exams(patient_id).await?;
            uow.commit().await?;
            Ok(exams)
        })
        .await
    }

    /// A completed exam stays completed. Its result text may still change,
    /// but only the move into `completed` writes a record entry.
    pub async fn update_exam(
        &self,
        exam_id: Uuid,
        patch: ExamPatch,
    ) -> Result<Exam, SchedulingError> {
        let (exam, previous) = self
            .within_deadline("update_exam", async move {
                let mut uow = self.store.begin().await?;
                let mut exam = uow
                    .exam_by_id(exam_id)
                    .await?
                    .ok_or_else(|| SchedulingError::not_found("exam"))?;
                let previous = exam.status;

                if let Some(status) = patch.status {
                    if previous == ExamStatus::Completed && status != ExamStatus::Completed {
                        return Err(SchedulingError::InvalidState(
                            "a completed exam cannot be reopened".into(),
                        ));
                    }
                    exam.status = status;
                }
                if let Some(result) = patch.result {
                    exam.result = Some(result);
                }
                exam.updated_at = Utc::now();

                let exam = uow.save_exam(&exam).await?;
                uow.commit().await?;
                Ok((exam, previous))
            })
            .await?;

        if previous != ExamStatus::Completed && exam.status == ExamStatus::Completed {
            info!("Exam {} completed", exam.exam_id);
            self.record_result(&exam).await;
        }
        Ok(exam)
    }

    async fn record_result(&self, exam: &Exam) {
        let text = format!(
            "Result of exam {}: {}",
            exam.exam_type,
            exam.result.as_deref().unwrap_or("no result reported.")
        );
        record_best_effort(self.records.as_ref(), self.store_timeout, exam, &text).await;

        let lookup = self.patients.find_patient(exam.patient_id);
        match tokio::time::timeout(self.store_timeout, lookup).await {
            Ok(Ok(Some(patient))) => {
                notify_best_effort(
                    self.notifications.as_ref(),
                    self.store_timeout,
                    patient.user_id,
                    NotificationKind::Exam,
                    &format!("The result of your {} exam is available.", exam.exam_type),
                )
                .await
            }
            Ok(Ok(None)) => warn!("No patient {} to notify", exam.patient_id),
            Ok(Err(e)) => warn!("Patient lookup for notification failed: {}", e),
            Err(_) => warn!("Patient lookup for notification timed out"),
        }
    }

    async fn within_deadline<T, F>(&self, op: &'static str, work: F) -> Result<T, SchedulingError>
    where
        F: Future<Output = Result<T, SchedulingError>>,
    {
        tokio::time::timeout(self.store_timeout, work)
            .await
            .unwrap_or_else(|_| {
                warn!("{} exceeded the store deadline of {:?}", op, self.store_timeout);
                Err(SchedulingError::TransientStore(format!("{op} timed out")))
            })
    }
}
