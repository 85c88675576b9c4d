use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{SchedulingStore, UnitOfWork};
use crate::scheduling::error::SchedulingError;
use crate::scheduling::model::{Appointment, AppointmentFilter, Exam, Slot};

#[derive(Debug, Clone, Default)]
struct Tables {
    slots: BTreeMap<Uuid, Slot>,
    appointments: BTreeMap<Uuid, Appointment>,
    exams: BTreeMap<Uuid, Exam>,
}

/// In-process backend. A unit of work holds the table lock for its whole
/// lifetime (so units of work are fully serialised) and edits a private
/// copy that replaces the tables only on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed slots, ordered by professional, date, time.
    pub async fn committed_slots(&self) -> Vec<Slot> {
        let tables = self.tables.lock().await;
        let mut slots: Vec<Slot> = tables.slots.values().cloned().collect();
        slots.sort_by_key(|s| (s.professional_id, s.slot_date, s.slot_time));
        slots
    }

    /// Committed appointments, ordered by date-time.
    pub async fn committed_appointments(&self) -> Vec<Appointment> {
        let tables = self.tables.lock().await;
        let mut appointments: Vec<Appointment> = tables.appointments.values().cloned().collect();
        appointments.sort_by_key(|a| (a.date_time, a.appointment_id));
        appointments
    }
}

#[async_trait]
impl SchedulingStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, SchedulingError> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

impl MemoryUnitOfWork {
    fn triple_taken(
        &self,
        except: Option<Uuid>,
        professional_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> bool {
        self.working.slots.values().any(|s| {
            Some(s.slot_id) != except
                && s.professional_id == professional_id
                && s.slot_date == date
                && s.slot_time == time
        })
    }
}

fn duplicate_slot() -> SchedulingError {
    SchedulingError::Conflict("a slot already exists for this professional, date and time".into())
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_slot(&mut self, slot: &Slot) -> Result<Slot, SchedulingError> {
        if self.triple_taken(None, slot.professional_id, slot.slot_date, slot.slot_time) {
            return Err(duplicate_slot());
        }
        self.working.slots.insert(slot.slot_id, slot.clone());
        Ok(slot.clone())
    }

    async fn slot_by_id(&mut self, slot_id: Uuid) -> Result<Option<Slot>, SchedulingError> {
        Ok(self.working.slots.get(&slot_id).cloned())
    }

    async fn slot_at(
        &mut self,
        professional_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<Slot>, SchedulingError> {
        Ok(self
            .working
            .slots
            .values()
            .find(|s| {
                s.professional_id == professional_id && s.slot_date == date && s.slot_time == time
            })
            .cloned())
    }

    async fn slots(
        &mut self,
        professional_id: Uuid,
        date: Option<NaiveDate>,
        only_available: bool,
    ) -> Result<Vec<Slot>, SchedulingError> {
        let mut slots: Vec<Slot> = self
            .working
            .slots
            .values()
            .filter(|s| s.professional_id == professional_id)
            .filter(|s| date.is_none_or(|d| s.slot_date == d))
            .filter(|s| !only_available || s.available)
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.slot_date, s.slot_time));
        Ok(slots)
    }

    async fn swap_slot_availability(
        &mut self,
        slot_id: Uuid,
        expected: bool,
        new: bool,
    ) -> Result<Option<Slot>, SchedulingError> {
        match self.working.slots.get_mut(&slot_id) {
            Some(slot) if slot.available == expected => {
                slot.available = new;
                Ok(Some(slot.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn move_slot(
        &mut self,
        slot_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<Slot>, SchedulingError> {
        let Some(professional_id) = self.working.slots.get(&slot_id).map(|s| s.professional_id)
        else {
            return Ok(None);
        };
        if self.triple_taken(Some(slot_id), professional_id, date, time) {
            return Err(duplicate_slot());
        }
        let slot = self.working.slots.get_mut(&slot_id).map(|slot| {
            slot.slot_date = date;
            slot.slot_time = time;
            slot.clone()
        });
        Ok(slot)
    }

    async fn delete_slot(&mut self, slot_id: Uuid) -> Result<bool, SchedulingError> {
        Ok(self.working.slots.remove(&slot_id).is_some())
    }

    async fn insert_appointment(
        &mut self,
        appointment: &Appointment,
    ) -> Result<Appointment, SchedulingError> {
        self.working
            .appointments
            .insert(appointment.appointment_id, appointment.clone());
        Ok(appointment.clone())
    }

    async fn appointment_by_id(
        &mut self,
        appointment_id: Uuid,
    ) -> Result<Option<Appointment>, SchedulingError> {
        Ok(self.working.appointments.get(&appointment_id).cloned())
    }

    async fn appointments(
        &mut self,
        filter: AppointmentFilter,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let mut appointments: Vec<Appointment> = self
            .working
            .appointments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        appointments.sort_by_key(|a| (a.date_time, a.appointment_id));
        Ok(appointments)
    }

    async fn save_appointment(
        &mut self,
        appointment: &Appointment,
    ) -> Result<Appointment, SchedulingError> {
        match self.working.appointments.get_mut(&appointment.appointment_id) {
            Some(stored) => {
                *stored = appointment.clone();
                Ok(appointment.clone())
            }
            None => Err(SchedulingError::not_found("appointment")),
        }
    }

    async fn delete_appointment(&mut self, appointment_id: Uuid) -> Result<bool, SchedulingError> {
        Ok(self.working.appointments.remove(&appointment_id).is_some())
    }

    async fn insert_exam(&mut self, exam: &Exam) -> Result<Exam, SchedulingError> {
        self.working.exams.insert(exam.exam_id, exam.clone());
        Ok(exam.clone())
    }

    async fn exam_by_id(&mut self, exam_id: Uuid) -> Result<Option<Exam>, SchedulingError> {
        Ok(self.working.exams.get(&exam_id).cloned())
    }

    async fn exams(&mut self, patient_id: Option<Uuid>) -> Result<Vec<Exam>, SchedulingError> {
        let mut exams: Vec<Exam> = self
            .working
            .exams
            .values()
            .filter(|e| patient_id.is_none_or(|id| e.patient_id == id))
            .cloned()
            .collect();
        exams.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(exams)
    }

    async fn save_exam(&mut self, exam: &Exam) -> Result<Exam, SchedulingError> {
        match self.working.exams.get_mut(&exam.exam_id) {
            Some(stored) => {
                *stored = exam.clone();
                Ok(exam.clone())
            }
            None => Err(SchedulingError::not_found("exam")),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), SchedulingError> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
