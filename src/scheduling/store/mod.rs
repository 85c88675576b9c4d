//! Backing-store seam for the scheduling core.
//!
//! A [`UnitOfWork`] is one atomic, isolated piece of work against the store:
//! everything written through it becomes visible together on
//! [`UnitOfWork::commit`], and dropping it without committing discards every
//! write. Single-row lookups taken through a unit of work lock the row until
//! the unit of work ends, which is what serialises concurrent reservations of
//! the same slot.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use super::error::SchedulingError;
use super::model::{Appointment, AppointmentFilter, Exam, Slot};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait SchedulingStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, SchedulingError>;
}

/// Row-level operations. Contract checks (uniqueness messages, transition
/// table, availability rules) live in `SlotStore` / `AppointmentStore`, not
/// in the backends.
///
/// This is the seam a backend implements, not an API for callers. Writing
/// through it directly bypasses the transition table and the reservation
/// protocol; application code goes through
/// [`Coordinator`](crate::scheduling::Coordinator) and
/// [`ExamService`](crate::scheduling::ExamService).
#[async_trait]
pub trait UnitOfWork: Send {
    async fn insert_slot(&mut self, slot: &Slot) -> Result<Slot, SchedulingError>;

    /// Locks the row.
    async fn slot_by_id(&mut self, slot_id: Uuid) -> Result<Option<Slot>, SchedulingError>;

    /// Locks the row.
    async fn slot_at(
        &mut self,
        professional_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<Slot>, SchedulingError>;

    /// Ordered by date, then time.
    async fn slots(
        &mut self,
        professional_id: Uuid,
        date: Option<NaiveDate>,
        only_available: bool,
    ) -> Result<Vec<Slot>, SchedulingError>;

    /// Compare-and-set on the availability flag: writes `new` only when the
    /// stored value equals `expected`. `None` means nothing was written.
    async fn swap_slot_availability(
        &mut self,
        slot_id: Uuid,
        expected: bool,
        new: bool,
    ) -> Result<Option<Slot>, SchedulingError>;

    async fn move_slot(
        &mut self,
        slot_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<Slot>, SchedulingError>;

    async fn delete_slot(&mut self, slot_id: Uuid) -> Result<bool, SchedulingError>;

    async fn insert_appointment(
        &mut self,
        appointment: &Appointment,
    ) -> Result<Appointment, SchedulingError>;

    /// Locks the row.
    async fn appointment_by_id(
        &mut self,
        appointment_id: Uuid,
    ) -> Result<Option<Appointment>, SchedulingError>;

    /// Ordered by date-time.
    async fn appointments(
        &mut self,
        filter: AppointmentFilter,
    ) -> Result<Vec<Appointment>, SchedulingError>;

    async fn save_appointment(
        &mut self,
        appointment: &Appointment,
    ) -> Result<Appointment, SchedulingError>;

    async fn delete_appointment(&mut self, appointment_id: Uuid) -> Result<bool, SchedulingError>;

    async fn insert_exam(&mut self, exam: &Exam) -> Result<Exam, SchedulingError>;

    /// Locks the row.
    async fn exam_by_id(&mut self, exam_id: Uuid) -> Result<Option<Exam>, SchedulingError>;

    /// Newest first.
    async fn exams(&mut self, patient_id: Option<Uuid>) -> Result<Vec<Exam>, SchedulingError>;

    async fn save_exam(&mut self, exam: &Exam) -> Result<Exam, SchedulingError>;

    async fn commit(self: Box<Self>) -> Result<(), SchedulingError>;
}
