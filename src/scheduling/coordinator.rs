//! Reservation coordinator.
//!
//! The only component that changes slot availability in response to
//! appointment lifecycle events. Every public operation runs in exactly one
//! unit of work, committed once at the end; any early return drops the unit
//! of work and rolls back everything it wrote, including a slot reserved a
//! moment earlier. Notifications go out only after commit.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::appointments::AppointmentStore;
use super::clock::{Clock, SystemClock};
use super::collaborators::{
    NotificationSink, PatientLookup, ProfessionalLookup, notify_best_effort,
};
use super::error::SchedulingError;
use super::model::{
    Appointment, AppointmentFilter, AppointmentPatch, AppointmentUpdate, NewAppointment, NewSlot,
    NotificationKind, Patient, Professional, Slot, SlotPatch,
};
use super::slots::SlotStore;
use super::status::AppointmentStatus;
use super::store::{SchedulingStore, UnitOfWork};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// A committed booking together with the parties it was checked against.
#[derive(Debug, Clone)]
pub struct Booking {
    pub appointment: Appointment,
    pub patient: Patient,
    pub professional: Professional,
}

#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn SchedulingStore>,
    patients: Arc<dyn PatientLookup>,
    professionals: Arc<dyn ProfessionalLookup>,
    notifications: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        patients: Arc<dyn PatientLookup>,
        professionals: Arc<dyn ProfessionalLookup>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            patients,
            professionals,
            notifications,
            clock: Arc::new(SystemClock),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Upper bound for one whole unit of work, lookups included.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /* ===== Appointments ===== */

    pub async fn book(&self, request: NewAppointment) -> Result<Appointment, SchedulingError> {
        self.book_with_parties(request)
            .await
            .map(|booking| booking.appointment)
    }

    /// [`Coordinator::book`], also handing back the patient and professional
    /// loaded during validation.
    pub async fn book_with_parties(
        &self,
        request: NewAppointment,
    ) -> Result<Booking, SchedulingError> {
        let (appointment, patient, professional) = self
            .within_deadline("book", async move {
                let patient = self.patient(request.patient_id).await?;
                let professional = self.professional(request.professional_id).await?;
                if patient.user_id == professional.user_id {
                    return Err(SchedulingError::Validation(
                        "a professional cannot book an appointment with themselves".into(),
                    ));
                }
                self.ensure_future(request.date_time)?;

                let mut uow = self.store.begin().await?;
                let slot = SlotStore::new(uow.as_mut())
                    .locate_available(request.professional_id, request.date_time)
                    .await?
                    .ok_or(SchedulingError::SlotUnavailable)?;
                reserve_or_unavailable(uow.as_mut(), slot.slot_id).await?;

                let appointment = AppointmentStore::new(uow.as_mut()).create(request).await?;
                uow.commit().await?;
                Ok((appointment, patient, professional))
            })
            .await?;

        info!(
            "Appointment {} booked with professional {} at {}",
            appointment.appointment_id, appointment.professional_id, appointment.date_time
        );
        let when = display_instant(appointment.date_time);
        self.notify(
            patient.user_id,
            &format!("Your appointment on {when} has been booked."),
        )
        .await;
        self.notify(
            professional.user_id,
            &format!("New appointment booked for {when}."),
        )
        .await;
        Ok(Booking {
            appointment,
            patient,
            professional,
        })
    }

    /// Always a move: the target instant must be in the future and its slot
    /// free, so asking for the current instant is `SlotUnavailable`.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        date_time: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError> {
        let appointment = self
            .within_deadline("reschedule", async move {
                let mut uow = self.store.begin().await?;
                let current = mutable_appointment(uow.as_mut(), appointment_id).await?;
                let appointment = self
                    .move_reservation(uow.as_mut(), &current, date_time)
                    .await?;
                uow.commit().await?;
                Ok(appointment)
            })
            .await?;

        self.announce_move(&appointment).await;
        Ok(appointment)
    }

    /// Notes and date-time in one unit of work. A `date_time` equal to the
    /// current one leaves the reservation alone. Terminal appointments
    /// cannot be updated at all.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        update: AppointmentUpdate,
    ) -> Result<Appointment, SchedulingError> {
        let (appointment, moved) = self
            .within_deadline("update_appointment", async move {
                let mut uow = self.store.begin().await?;
                let current = mutable_appointment(uow.as_mut(), appointment_id).await?;

                let mut appointment = current.clone();
                let mut moved = false;
                if let Some(date_time) = update.date_time.filter(|at| *at != current.date_time) {
                    appointment = self
                        .move_reservation(uow.as_mut(), &current, date_time)
                        .await?;
                    moved = true;
                }
                if update.notes.is_some() {
                    appointment = AppointmentStore::new(uow.as_mut())
                        .update_fields(appointment_id, AppointmentPatch { notes: update.notes })
                        .await?;
                }

                uow.commit().await?;
                Ok((appointment, moved))
            })
            .await?;

        if moved {
            self.announce_move(&appointment).await;
        }
        Ok(appointment)
    }

    /// Status change without slot side effects. `Cancelled` is routed
    /// through [`Coordinator::cancel`] so the slot is always released.
    pub async fn transition(
        &self,
        appointment_id: Uuid,
        target: AppointmentStatus,
    ) -> Result<Appointment, SchedulingError> {
        if target == AppointmentStatus::Cancelled {
            return self.cancel(appointment_id).await;
        }

        let appointment = self
            .within_deadline("transition", async move {
                let mut uow = self.store.begin().await?;
                let appointment = AppointmentStore::new(uow.as_mut())
                    .set_status(appointment_id, target)
                    .await?;
                uow.commit().await?;
                Ok(appointment)
            })
            .await?;

        info!("Appointment {} is now {}", appointment_id, target);
        self.notify_patient(
            &appointment,
            &format!(
                "Your appointment on {} is now {}.",
                display_instant(appointment.date_time),
                target
            ),
        )
        .await;
        Ok(appointment)
    }

    pub async fn confirm(&self, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        self.transition(appointment_id, AppointmentStatus::Confirmed).await
    }

    pub async fn finalize(&self, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        self.transition(appointment_id, AppointmentStatus::Finalized).await
    }

    pub async fn cancel(&self, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        let appointment = self
            .within_deadline("cancel", async move {
                let mut uow = self.store.begin().await?;
                let appointment = AppointmentStore::new(uow.as_mut())
                    .set_status(appointment_id, AppointmentStatus::Cancelled)
                    .await?;
                release_held_slot(uow.as_mut(), &appointment).await?;
                uow.commit().await?;
                Ok(appointment)
            })
            .await?;

        info!("Appointment {} cancelled", appointment_id);
        let when = display_instant(appointment.date_time);
        self.notify_patient(
            &appointment,
            &format!("Your appointment on {when} has been cancelled."),
        )
        .await;
        self.notify_professional(
            &appointment,
            &format!("The appointment on {when} has been cancelled."),
        )
        .await;
        Ok(appointment)
    }

    /// Hard delete. Scheduled and confirmed appointments give their slot
    /// back; a finalized visit keeps its slot consumed.
    pub async fn delete_appointment(&self, appointment_id: Uuid) -> Result<(), SchedulingError> {
        self.within_deadline("delete_appointment", async move {
            let mut uow = self.store.begin().await?;
            let appointment = AppointmentStore::new(uow.as_mut()).find(appointment_id).await?;
            if !appointment.status.is_terminal() {
                release_held_slot(uow.as_mut(), &appointment).await?;
            }
            AppointmentStore::new(uow.as_mut()).delete(appointment_id).await?;
            uow.commit().await
        })
        .await?;

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    pub async fn find_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Appointment, SchedulingError> {
        self.within_deadline("find_appointment", async move {
            let mut uow = self.store.begin().await?;
            let appointment = AppointmentStore::new(uow.as_mut()).find(appointment_id).await?;
            uow.commit().await?;
            Ok(appointment)
        })
        .await
    }

    pub async fn list_appointments(
        &self,
        filter: AppointmentFilter,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        self.within_deadline("list_appointments", async move {
            let mut uow = self.store.begin().await?;
            let appointments = AppointmentStore::new(uow.as_mut()).list(filter).await?;
            uow.commit().await?;
            Ok(appointments)
        })
        .await
    }

    /* ===== Slots ===== */

    pub async fn create_slot(&self, new: NewSlot) -> Result<Slot, SchedulingError> {
        let slot = self
            .within_deadline("create_slot", async move {
                self.professional(new.professional_id).await?;
                let mut uow = self.store.begin().await?;
                let slot = SlotStore::new(uow.as_mut()).create(new).await?;
                uow.commit().await?;
                Ok(slot)
            })
            .await?;

        info!(
            "Slot {} opened for professional {} on {} at {}",
            slot.slot_id, slot.professional_id, slot.slot_date, slot.slot_time
        );
        Ok(slot)
    }

    pub async fn find_slot(&self, slot_id: Uuid) -> Result<Slot, SchedulingError> {
        self.within_deadline("find_slot", async move {
            let mut uow = self.store.begin().await?;
            let slot = SlotStore::new(uow.as_mut()).find(slot_id).await?;
            uow.commit().await?;
            Ok(slot)
        })
        .await
    }

    pub async fn list_slots(&self, professional_id: Uuid) -> Result<Vec<Slot>, SchedulingError> {
        self.within_deadline("list_slots", async move {
            let mut uow = self.store.begin().await?;
            let slots = SlotStore::new(uow.as_mut())
                .list_by_professional(professional_id)
                .await?;
            uow.commit().await?;
            Ok(slots)
        })
        .await
    }

    pub async fn list_available_slots(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, SchedulingError> {
        self.within_deadline("list_available_slots", async move {
            let mut uow = self.store.begin().await?;
            let slots = SlotStore::new(uow.as_mut())
                .list_available(professional_id, date)
                .await?;
            uow.commit().await?;
            Ok(slots)
        })
        .await
    }

    pub async fn update_slot(
        &self,
        slot_id: Uuid,
        patch: SlotPatch,
    ) -> Result<Slot, SchedulingError> {
        let slot = self
            .within_deadline("update_slot", async move {
                let mut uow = self.store.begin().await?;
                let slot = SlotStore::new(uow.as_mut()).update(slot_id, patch).await?;
                uow.commit().await?;
                Ok(slot)
            })
            .await?;

        info!("Slot {} now on {} at {}", slot.slot_id, slot.slot_date, slot.slot_time);
        Ok(slot)
    }

    pub async fn delete_slot(&self, slot_id: Uuid) -> Result<(), SchedulingError> {
        self.within_deadline("delete_slot", async move {
            let mut uow = self.store.begin().await?;
            SlotStore::new(uow.as_mut()).delete(slot_id).await?;
            uow.commit().await
        })
        .await?;

        info!("Slot {} deleted", slot_id);
        Ok(())
    }

    /* ===== Helpers ===== */

    /// Reserves the slot at `date_time` before releasing the one currently
    /// held, then moves the appointment. Status is unchanged.
    async fn move_reservation(
        &self,
        uow: &mut dyn UnitOfWork,
        current: &Appointment,
        date_time: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError> {
        self.ensure_future(date_time)?;

        let target = SlotStore::new(&mut *uow)
            .locate_available(current.professional_id, date_time)
            .await?
            .ok_or(SchedulingError::SlotUnavailable)?;
        reserve_or_unavailable(&mut *uow, target.slot_id).await?;
        release_held_slot(&mut *uow, current).await?;

        AppointmentStore::new(uow)
            .set_date_time(current.appointment_id, date_time)
            .await
    }

    async fn announce_move(&self, appointment: &Appointment) {
        info!(
            "Appointment {} rescheduled to {}",
            appointment.appointment_id, appointment.date_time
        );
        self.notify_patient(
            appointment,
            &format!(
                "Your appointment has been moved to {}.",
                display_instant(appointment.date_time)
            ),
        )
        .await;
    }

    fn ensure_future(&self, at: DateTime<Utc>) -> Result<(), SchedulingError> {
        if at <= self.clock.now() {
            return Err(SchedulingError::Validation(
                "date_time must be in the future".into(),
            ));
        }
        Ok(())
    }

    async fn patient(&self, patient_id: Uuid) -> Result<Patient, SchedulingError> {
        self.patients
            .find_patient(patient_id)
            .await?
            .ok_or_else(|| SchedulingError::not_found("patient"))
    }

    async fn professional(&self, professional_id: Uuid) -> Result<Professional, SchedulingError> {
        self.professionals
            .find_professional(professional_id)
            .await?
            .ok_or_else(|| SchedulingError::not_found("professional"))
    }

    /// A unit of work still running at the deadline is dropped, which rolls
    /// it back.
    async fn within_deadline<T, F>(&self, op: &'static str, work: F) -> Result<T, SchedulingError>
    where
        F: Future<Output = Result<T, SchedulingError>>,
    {
        match tokio::time::timeout(self.store_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!("{} exceeded the store deadline of {:?}", op, self.store_timeout);
                Err(SchedulingError::TransientStore(format!(
                    "{op} timed out after {} ms",
                    self.store_timeout.as_millis()
                )))
            }
        }
    }

    async fn notify(&self, user_id: Uuid, message: &str) {
        notify_best_effort(
            self.notifications.as_ref(),
            self.store_timeout,
            user_id,
            NotificationKind::Appointment,
            message,
        )
        .await;
    }

    async fn notify_patient(&self, appointment: &Appointment, message: &str) {
        let lookup = self.patients.find_patient(appointment.patient_id);
        match tokio::time::timeout(self.store_timeout, lookup).await {
            Ok(Ok(Some(patient))) => self.notify(patient.user_id, message).await,
            Ok(Ok(None)) => warn!("No patient {} to notify", appointment.patient_id),
            Ok(Err(e)) => warn!("Patient lookup for notification failed: {}", e),
            Err(_) => warn!("Patient lookup for notification timed out"),
        }
    }

    async fn notify_professional(&self, appointment: &Appointment, message: &str) {
        let lookup = self
            .professionals
            .find_professional(appointment.professional_id);
        match tokio::time::timeout(self.store_timeout, lookup).await {
            Ok(Ok(Some(professional))) => self.notify(professional.user_id, message).await,
            Ok(Ok(None)) => warn!("No professional {} to notify", appointment.professional_id),
            Ok(Err(e)) => warn!("Professional lookup for notification failed: {}", e),
            Err(_) => warn!("Professional lookup for notification timed out"),
        }
    }
}

async fn mutable_appointment(
    uow: &mut dyn UnitOfWork,
    appointment_id: Uuid,
) -> Result<Appointment, SchedulingError> {
    let appointment = AppointmentStore::new(uow).find(appointment_id).await?;
    if appointment.status.is_terminal() {
        return Err(SchedulingError::InvalidState(format!(
            "a {} appointment cannot be changed",
            appointment.status
        )));
    }
    Ok(appointment)
}

/// A lost race on the availability flag reads as "no free slot".
async fn reserve_or_unavailable(
    uow: &mut dyn UnitOfWork,
    slot_id: Uuid,
) -> Result<Slot, SchedulingError> {
    match SlotStore::new(uow).reserve(slot_id).await {
        Err(SchedulingError::Conflict(_)) => Err(SchedulingError::SlotUnavailable),
        other => other,
    }
}

/// Releases the slot at the appointment's current instant, if one exists.
async fn release_held_slot(
    uow: &mut dyn UnitOfWork,
    appointment: &Appointment,
) -> Result<(), SchedulingError> {
    let mut slots = SlotStore::new(uow);
    if let Some(slot) = slots
        .locate(appointment.professional_id, appointment.date_time)
        .await?
    {
        slots.release(slot.slot_id).await?;
    }
    Ok(())
}

fn display_instant(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}
