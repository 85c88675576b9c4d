use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::SchedulingError;
use super::model::{Appointment, AppointmentFilter, AppointmentPatch, NewAppointment};
use super::status::{AppointmentStatus, ensure_transition};
use super::store::UnitOfWork;

/// Appointment contract on top of one unit of work. Status and date-time
/// writes are crate-private; callers go through the coordinator.
pub struct AppointmentStore<'a> {
    uow: &'a mut dyn UnitOfWork,
}

impl<'a> AppointmentStore<'a> {
    pub fn new(uow: &'a mut dyn UnitOfWork) -> Self {
        Self { uow }
    }

    pub async fn create(&mut self, new: NewAppointment) -> Result<Appointment, SchedulingError> {
        let now = Utc::now();
        let appointment = Appointment {
            appointment_id: Uuid::new_v4(),
            patient_id: new.patient_id,
            professional_id: new.professional_id,
            date_time: new.date_time,
            status: AppointmentStatus::Scheduled,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };
        self.uow.insert_appointment(&appointment).await
    }

    pub async fn find(&mut self, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        self.uow
            .appointment_by_id(appointment_id)
            .await?
            .ok_or_else(|| SchedulingError::not_found("appointment"))
    }

    pub async fn list(
        &mut self,
        filter: AppointmentFilter,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        self.uow.appointments(filter).await
    }

    /// Terminal appointments are read-only.
    pub async fn update_fields(
        &mut self,
        appointment_id: Uuid,
        patch: AppointmentPatch,
    ) -> Result<Appointment, SchedulingError> {
        let mut appointment = self.find(appointment_id).await?;
        if appointment.status.is_terminal() {
            return Err(SchedulingError::InvalidState(format!(
                "appointment is {}",
                appointment.status
            )));
        }
        if let Some(notes) = patch.notes {
            appointment.notes = Some(notes);
        }
        appointment.updated_at = Utc::now();
        self.uow.save_appointment(&appointment).await
    }

    pub(crate) async fn set_status(
        &mut self,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, SchedulingError> {
        let mut appointment = self.find(appointment_id).await?;
        ensure_transition(appointment.status, status)?;
        appointment.status = status;
        appointment.updated_at = Utc::now();
        self.uow.save_appointment(&appointment).await
    }

    /// Does not touch slots.
    pub(crate) async fn set_date_time(
        &mut self,
        appointment_id: Uuid,
        date_time: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError> {
        let mut appointment = self.find(appointment_id).await?;
        appointment.date_time = date_time;
        appointment.updated_at = Utc::now();
        self.uow.save_appointment(&appointment).await
    }

    pub async fn delete(&mut self, appointment_id: Uuid) -> Result<(), SchedulingError> {
        if self.uow.delete_appointment(appointment_id).await? {
            Ok(())
        } else {
            Err(SchedulingError::not_found("appointment"))
        }
    }
}
