//! Narrow interfaces the core consumes, plus their Postgres implementations.
//!
//! Lookups are read-only and run outside the scheduling unit of work. Sinks
//! are best-effort: the core logs and discards whatever they return.

use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::SchedulingError;
use super::model::{EntryKind, Exam, NotificationKind, Patient, Professional, RecordEntry};

#[async_trait]
pub trait PatientLookup: Send + Sync {
    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<Patient>, SchedulingError>;
}

#[async_trait]
pub trait ProfessionalLookup: Send + Sync {
    async fn find_professional(
        &self,
        professional_id: Uuid,
    ) -> Result<Option<Professional>, SchedulingError>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        message: &str,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait MedicalRecordSink: Send + Sync {
    async fn append(
        &self,
        patient_id: Uuid,
        text: &str,
        kind: EntryKind,
        appointment_id: Option<Uuid>,
    ) -> anyhow::Result<RecordEntry>;
}

/// Sends and swallows. A failed or slow sink only costs a log line.
pub(crate) async fn notify_best_effort(
    sink: &dyn NotificationSink,
    deadline: Duration,
    user_id: Uuid,
    kind: NotificationKind,
    message: &str,
) {
    match tokio::time::timeout(deadline, sink.send(user_id, kind, message)).await {
        Ok(Ok(())) => debug!("Notified user {} ({})", user_id, kind),
        Ok(Err(e)) => warn!("Notification to user {} failed: {:#}", user_id, e),
        Err(_) => warn!("Notification to user {} timed out", user_id),
    }
}

/// Appends an exam's result to the patient's record, under the same terms
/// as [`notify_best_effort`].
pub(crate) async fn record_best_effort(
    sink: &dyn MedicalRecordSink,
    deadline: Duration,
    exam: &Exam,
    text: &str,
) {
    let append = sink.append(exam.patient_id, text, EntryKind::Exam, exam.appointment_id);
    match tokio::time::timeout(deadline, append).await {
        Ok(Ok(entry)) => debug!("Recorded entry {} for exam {}", entry.entry_id, exam.exam_id),
        Ok(Err(e)) => warn!("Could not record result of exam {}: {:#}", exam.exam_id, e),
        Err(_) => warn!("Recording result of exam {} timed out", exam.exam_id),
    }
}

/* -------------------------
   Postgres implementations
--------------------------*/

/// Patient and professional profiles, named through their owning user.
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PatientRow {
    patient_id: Uuid,
    user_id: Uuid,
    full_name: String,
}

#[derive(sqlx::FromRow)]
struct ProfessionalRow {
    professional_id: Uuid,
    user_id: Uuid,
    full_name: String,
    professional_type: String,
}

#[async_trait]
impl PatientLookup for PgDirectory {
    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<Patient>, SchedulingError> {
        let row = sqlx::query_as::<_, PatientRow>(
            r#"
            SELECT p.patient_id, p.user_id, u.full_name
            FROM patient p
            JOIN app_user u ON u.user_id = p.user_id
            WHERE p.patient_id = $1
            "#,
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Patient {
            patient_id: r.patient_id,
            user_id: r.user_id,
            name: r.full_name,
        }))
    }
}

#[async_trait]
impl ProfessionalLookup for PgDirectory {
    async fn find_professional(
        &self,
        professional_id: Uuid,
    ) -> Result<Option<Professional>, SchedulingError> {
        let row = sqlx::query_as::<_, ProfessionalRow>(
            r#"
            SELECT pr.professional_id, pr.user_id, u.full_name, pr.professional_type
            FROM professional pr
            JOIN app_user u ON u.user_id = pr.user_id
            WHERE pr.professional_id = $1
            "#,
        )
        .bind(professional_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Professional {
            professional_id: r.professional_id,
            user_id: r.user_id,
            name: r.full_name,
            professional_type: r.professional_type,
        }))
    }
}

/// Writes straight to the pool, never inside a scheduling unit of work.
#[derive(Clone)]
pub struct PgNotificationSink {
    pool: PgPool,
}

impl PgNotificationSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for PgNotificationSink {
    async fn send(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        message: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification (notification_id, user_id, kind, message, read, sent_at)
            VALUES ($1, $2, $3, $4, false, now())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(kind.to_string())
        .bind(message)
        .execute(&self.pool)
        .await
        .context("insert notification")?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgMedicalRecordSink {
    pool: PgPool,
}

impl PgMedicalRecordSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    entry_id: Uuid,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl MedicalRecordSink for PgMedicalRecordSink {
    async fn append(
        &self,
        patient_id: Uuid,
        text: &str,
        kind: EntryKind,
        appointment_id: Option<Uuid>,
    ) -> anyhow::Result<RecordEntry> {
        let mut tx = self.pool.begin().await.context("begin record tx")?;

        let record_id: Option<Uuid> = sqlx::query_scalar(
            r#"SELECT record_id FROM medical_record WHERE patient_id = $1 FOR UPDATE"#,
        )
        .bind(patient_id)
        .fetch_optional(&mut *tx)
        .await
        .context("load medical record")?;

        let record_id =
            record_id.ok_or_else(|| anyhow!("patient {patient_id} has no medical record"))?;

        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            INSERT INTO record_entry (entry_id, record_id, text, kind, appointment_id, created_at)
            VALUES ($1, $2, $3, $4, $5, now())
            RETURNING entry_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record_id)
        .bind(text)
        .bind(kind.to_string())
        .bind(appointment_id)
        .fetch_one(&mut *tx)
        .await
        .context("insert record entry")?;

        sqlx::query(r#"UPDATE medical_record SET last_updated_at = now() WHERE record_id = $1"#)
            .bind(record_id)
            .execute(&mut *tx)
            .await
            .context("touch medical record")?;

        tx.commit().await.context("commit record tx")?;

        Ok(RecordEntry {
            entry_id: row.entry_id,
            patient_id,
            text: text.to_string(),
            kind,
            appointment_id,
            created_at: row.created_at,
        })
    }
}
