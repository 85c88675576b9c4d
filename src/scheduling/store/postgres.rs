use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{SchedulingStore, UnitOfWork};
use crate::scheduling::error::SchedulingError;
use crate::scheduling::model::{
    Appointment, AppointmentFilter, AppointmentRow, Exam, ExamRow, Slot,
};

/// Postgres backend: one transaction per unit of work. Row lookups use
/// `FOR UPDATE`, so a second unit of work touching the same slot waits for
/// the first to commit or roll back and then sees its result.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PgStore {
    pub fn new(pool: PgPool, statement_timeout_ms: u64) -> Self {
        Self {
            pool,
            statement_timeout_ms,
        }
    }
}

#[async_trait]
impl SchedulingStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, SchedulingError> {
        let mut tx = self.pool.begin().await?;

        // SET does not take bind parameters
        let set_timeout = format!("SET LOCAL statement_timeout = {}", self.statement_timeout_ms);
        sqlx::query(&set_timeout).execute(&mut *tx).await?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_slot(&mut self, slot: &Slot) -> Result<Slot, SchedulingError> {
        let row = sqlx::query_as::<_, Slot>(
            r#"
            INSERT INTO slot (slot_id, professional_id, slot_date, slot_time, available, created_at)
            VALUES ($1,$2,$3,$4,$5,$6)
            RETURNING slot_id, professional_id, slot_date, slot_time, available, created_at
            "#,
        )
        .bind(slot.slot_id)
        .bind(slot.professional_id)
        .bind(slot.slot_date)
        .bind(slot.slot_time)
        .bind(slot.available)
        .bind(slot.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn slot_by_id(&mut self, slot_id: Uuid) -> Result<Option<Slot>, SchedulingError> {
        let row = sqlx::query_as::<_, Slot>(
            r#"
            SELECT slot_id, professional_id, slot_date, slot_time, available, created_at
            FROM slot
            WHERE slot_id = $1
            FOR UPDATE
            "#,
        )
        .bind(slot_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn slot_at(
        &mut self,
        professional_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<Slot>, SchedulingError> {
        let row = sqlx::query_as::<_, Slot>(
            r#"
            SELECT slot_id, professional_id, slot_date, slot_time, available, created_at
            FROM slot
            WHERE professional_id = $1
              AND slot_date = $2
              AND slot_time = $3
            FOR UPDATE
            "#,
        )
        .bind(professional_id)
        .bind(date)
        .bind(time)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn slots(
        &mut self,
        professional_id: Uuid,
        date: Option<NaiveDate>,
        only_available: bool,
    ) -> Result<Vec<Slot>, SchedulingError> {
        let rows = sqlx::query_as::<_, Slot>(
            r#"
            SELECT slot_id, professional_id, slot_date, slot_time, available, created_at
            FROM slot
            WHERE professional_id = $1
              AND ($2::date IS NULL OR slot_date = $2)
              AND (NOT $3 OR available)
            ORDER BY slot_date ASC, slot_time ASC
            "#,
        )
        .bind(professional_id)
        .bind(date)
        .bind(only_available)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    async fn swap_slot_availability(
        &mut self,
        slot_id: Uuid,
        expected: bool,
        new: bool,
    ) -> Result<Option<Slot>, SchedulingError> {
        let row = sqlx::query_as::<_, Slot>(
            r#"
            UPDATE slot
            SET available = $3
            WHERE slot_id = $1
              AND available = $2
            RETURNING slot_id, professional_id, slot_date, slot_time, available, created_at
            "#,
        )
        .bind(slot_id)
        .bind(expected)
        .bind(new)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn move_slot(
        &mut self,
        slot_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<Slot>, SchedulingError> {
        let row = sqlx::query_as::<_, Slot>(
            r#"
            UPDATE slot
            SET slot_date = $2,
                slot_time = $3
            WHERE slot_id = $1
            RETURNING slot_id, professional_id, slot_date, slot_time, available, created_at
            "#,
        )
        .bind(slot_id)
        .bind(date)
        .bind(time)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn delete_slot(&mut self, slot_id: Uuid) -> Result<bool, SchedulingError> {
        let res = sqlx::query(r#"DELETE FROM slot WHERE slot_id = $1"#)
            .bind(slot_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn insert_appointment(
        &mut self,
        appointment: &Appointment,
    ) -> Result<Appointment, SchedulingError> {
        let row = sqlx::query_as::<_, AppointmentRow>(
            r#"
            INSERT INTO appointment (
              appointment_id,
              patient_id,
              professional_id,
              date_time,
              status,
              notes,
              created_at,
              updated_at
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            RETURNING appointment_id, patient_id, professional_id, date_time, status, notes, created_at, updated_at
            "#,
        )
        .bind(appointment.appointment_id)
        .bind(appointment.patient_id)
        .bind(appointment.professional_id)
        .bind(appointment.date_time)
        .bind(appointment.status.as_i16())
        .bind(appointment.notes.as_deref())
        .bind(appointment.created_at)
        .bind(appointment.updated_at)
        .fetch_one(&mut *self.tx)
        .await?;
        row.try_into()
    }

    async fn appointment_by_id(
        &mut self,
        appointment_id: Uuid,
    ) -> Result<Option<Appointment>, SchedulingError> {
        let row = sqlx::query_as::<_, AppointmentRow>(
            r#"
            SELECT appointment_id, patient_id, professional_id, date_time, status, notes, created_at, updated_at
            FROM appointment
            WHERE appointment_id = $1
            FOR UPDATE
            "#,
        )
        .bind(appointment_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Appointment::try_from).transpose()
    }

    async fn appointments(
        &mut self,
        filter: AppointmentFilter,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let rows = sqlx::query_as::<_, AppointmentRow>(
            r#"
            SELECT appointment_id, patient_id, professional_id, date_time, status, notes, created_at, updated_at
            FROM appointment
            WHERE ($1::uuid IS NULL OR patient_id = $1)
              AND ($2::uuid IS NULL OR professional_id = $2)
            ORDER BY date_time ASC, appointment_id ASC
            "#,
        )
        .bind(filter.patient_id)
        .bind(filter.professional_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Appointment::try_from).collect()
    }

    async fn save_appointment(
        &mut self,
        appointment: &Appointment,
    ) -> Result<Appointment, SchedulingError> {
        let row = sqlx::query_as::<_, AppointmentRow>(
            r#"
            UPDATE appointment
            SET date_time = $2,
                status = $3,
                notes = $4,
                updated_at = $5
            WHERE appointment_id = $1
            RETURNING appointment_id, patient_id, professional_id, date_time, status, notes, created_at, updated_at
            "#,
        )
        .bind(appointment.appointment_id)
        .bind(appointment.date_time)
        .bind(appointment.status.as_i16())
        .bind(appointment.notes.as_deref())
        .bind(appointment.updated_at)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| SchedulingError::not_found("appointment"))?;
        row.try_into()
    }

    async fn delete_appointment(&mut self, appointment_id: Uuid) -> Result<bool, SchedulingError> {
        let res = sqlx::query(r#"DELETE FROM appointment WHERE appointment_id = $1"#)
            .bind(appointment_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn insert_exam(&mut self, exam: &Exam) -> Result<Exam, SchedulingError> {
        let row = sqlx::query_as::<_, ExamRow>(
            r#"
            INSERT INTO exam (
              exam_id,
              patient_id,
              professional_id,
              appointment_id,
              exam_type,
              status,
              result,
              created_at,
              updated_at
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            RETURNING exam_id, patient_id, professional_id, appointment_id, exam_type, status, result, created_at, updated_at
            "#,
        )
        .bind(exam.exam_id)
        .bind(exam.patient_id)
        .bind(exam.professional_id)
        .bind(exam.appointment_id)
        .bind(&exam.exam_type)
        .bind(exam.status as i16)
        .bind(exam.result.as_deref())
        .bind(exam.created_at)
        .bind(exam.updated_at)
        .fetch_one(&mut *self.tx)
        .await?;
        row.try_into()
    }

    async fn exam_by_id(&mut self, exam_id: Uuid) -> Result<Option<Exam>, SchedulingError> {
        let row = sqlx::query_as::<_, ExamRow>(
            r#"
            SELECT exam_id, patient_id, professional_id, appointment_id, exam_type, status, result, created_at, updated_at
            FROM exam
            WHERE exam_id = $1
            FOR UPDATE
            "#,
        )
        .bind(exam_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Exam::try_from).transpose()
    }

    async fn exams(&mut self, patient_id: Option<Uuid>) -> Result<Vec<Exam>, SchedulingError> {
        let rows = sqlx::query_as::<_, ExamRow>(
            r#"
            SELECT exam_id, patient_id, professional_id, appointment_id, exam_type, status, result, created_at, updated_at
            FROM exam
            WHERE ($1::uuid IS NULL OR patient_id = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(patient_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Exam::try_from).collect()
    }

    async fn save_exam(&mut self, exam: &Exam) -> Result<Exam, SchedulingError> {
        let row = sqlx::query_as::<_, ExamRow>(
            r#"
            UPDATE exam
            SET status = $2,
                result = $3,
                updated_at = $4
            WHERE exam_id = $1
            RETURNING exam_id, patient_id, professional_id, appointment_id, exam_type, status, result, created_at, updated_at
            "#,
        )
        .bind(exam.exam_id)
        .bind(exam.status as i16)
        .bind(exam.result.as_deref())
        .bind(exam.updated_at)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| SchedulingError::not_found("exam"))?;
        row.try_into()
    }

    async fn commit(self: Box<Self>) -> Result<(), SchedulingError> {
        self.tx.commit().await?;
        Ok(())
    }
}
