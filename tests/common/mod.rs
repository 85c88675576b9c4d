#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use hospital_scheduling::scheduling::{
    Appointment, AppointmentFilter, AppointmentStatus, Coordinator, EntryKind, Exam, ExamService,
    FixedClock, MedicalRecordSink, MemoryStore, NewAppointment, NewSlot, NotificationKind,
    NotificationSink, Patient, PatientLookup, Professional, ProfessionalLookup, RecordEntry,
    SchedulingError, SchedulingStore, Slot, UnitOfWork,
};

/// "Now" for every test: 2025-12-01 09:00 UTC.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 12, 1, 9, 0, 0).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn new_slot(professional_id: Uuid, when: DateTime<Utc>) -> NewSlot {
    NewSlot {
        professional_id,
        slot_date: when.date_naive(),
        slot_time: when.time(),
    }
}

pub fn slot_instant(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    date.and_time(time).and_utc()
}

/* ===== Directory ===== */

#[derive(Default)]
pub struct Directory {
    patients: Mutex<HashMap<Uuid, Patient>>,
    professionals: Mutex<HashMap<Uuid, Professional>>,
}

impl Directory {
    pub fn add_patient(&self, name: &str) -> Patient {
        self.add_patient_for_user(Uuid::new_v4(), name)
    }

    pub fn add_patient_for_user(&self, user_id: Uuid, name: &str) -> Patient {
        let patient = Patient {
            patient_id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
        };
        self.patients
            .lock()
            .unwrap()
            .insert(patient.patient_id, patient.clone());
        patient
    }

    pub fn add_professional(&self, name: &str) -> Professional {
        let professional = Professional {
            professional_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: name.to_string(),
            professional_type: "physician".to_string(),
        };
        self.professionals
            .lock()
            .unwrap()
            .insert(professional.professional_id, professional.clone());
        professional
    }
}

#[async_trait]
impl PatientLookup for Directory {
    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<Patient>, SchedulingError> {
        Ok(self.patients.lock().unwrap().get(&patient_id).cloned())
    }
}

#[async_trait]
impl ProfessionalLookup for Directory {
    async fn find_professional(
        &self,
        professional_id: Uuid,
    ) -> Result<Option<Professional>, SchedulingError> {
        Ok(self.professionals.lock().unwrap().get(&professional_id).cloned())
    }
}

/* ===== Sinks ===== */

#[derive(Default)]
pub struct RecordingNotifications {
    sent: Mutex<Vec<(Uuid, NotificationKind, String)>>,
}

impl RecordingNotifications {
    pub fn sent(&self) -> Vec<(Uuid, NotificationKind, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, user_id: Uuid) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(to, _, _)| *to == user_id)
            .map(|(_, _, message)| message)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifications {
    async fn send(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        message: &str,
    ) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((user_id, kind, message.to_string()));
        Ok(())
    }
}

pub struct FailingNotifications;

#[async_trait]
impl NotificationSink for FailingNotifications {
    async fn send(&self, _: Uuid, _: NotificationKind, _: &str) -> anyhow::Result<()> {
        Err(anyhow!("smtp relay unreachable"))
    }
}

#[derive(Default)]
pub struct RecordingRecords {
    entries: Mutex<Vec<RecordEntry>>,
}

impl RecordingRecords {
    pub fn entries(&self) -> Vec<RecordEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl MedicalRecordSink for RecordingRecords {
    async fn append(
        &self,
        patient_id: Uuid,
        text: &str,
        kind: EntryKind,
        appointment_id: Option<Uuid>,
    ) -> anyhow::Result<RecordEntry> {
        let entry = RecordEntry {
            entry_id: Uuid::new_v4(),
            patient_id,
            text: text.to_string(),
            kind,
            appointment_id,
            created_at: Utc::now(),
        };
        self.entries.lock().unwrap().push(entry.clone());
        Ok(entry)
    }
}

pub struct FailingRecords;

#[async_trait]
impl MedicalRecordSink for FailingRecords {
    async fn append(
        &self,
        patient_id: Uuid,
        _: &str,
        _: EntryKind,
        _: Option<Uuid>,
    ) -> anyhow::Result<RecordEntry> {
        Err(anyhow!("patient {patient_id} has no medical record"))
    }
}

/// Never answers within any reasonable deadline.
pub struct StallingRecords(pub Duration);

#[async_trait]
impl MedicalRecordSink for StallingRecords {
    async fn append(
        &self,
        patient_id: Uuid,
        _: &str,
        _: EntryKind,
        _: Option<Uuid>,
    ) -> anyhow::Result<RecordEntry> {
        tokio::time::sleep(self.0).await;
        Err(anyhow!("record for patient {patient_id} still busy"))
    }
}

/* ===== Store with injected faults ===== */

/// Wraps a `MemoryStore`; can stall `begin` or fail appointment inserts.
#[derive(Clone)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_appointment_insert: Arc<AtomicBool>,
    stall_begin: Option<Duration>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_appointment_insert: Arc::new(AtomicBool::new(false)),
            stall_begin: None,
        }
    }

    pub fn stalling(mut self, stall: Duration) -> Self {
        self.stall_begin = Some(stall);
        self
    }

    pub fn fail_appointment_inserts(&self, fail: bool) {
        self.fail_appointment_insert.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SchedulingStore for FlakyStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, SchedulingError> {
        if let Some(stall) = self.stall_begin {
            tokio::time::sleep(stall).await;
        }
        let inner = self.inner.begin().await?;
        Ok(Box::new(FlakyUnitOfWork {
            inner,
            fail_appointment_insert: self.fail_appointment_insert.load(Ordering::SeqCst),
        }))
    }
}

struct FlakyUnitOfWork {
    inner: Box<dyn UnitOfWork>,
    fail_appointment_insert: bool,
}

#[async_trait]
impl UnitOfWork for FlakyUnitOfWork {
    async fn insert_slot(&mut self, slot: &Slot) -> Result<Slot, SchedulingError> {
        self.inner.insert_slot(slot).await
    }

    async fn slot_by_id(&mut self, slot_id: Uuid) -> Result<Option<Slot>, SchedulingError> {
        self.inner.slot_by_id(slot_id).await
    }

    async fn slot_at(
        &mut self,
        professional_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<Slot>, SchedulingError> {
        self.inner.slot_at(professional_id, date, time).await
    }

    async fn slots(
        &mut self,
        professional_id: Uuid,
        date: Option<NaiveDate>,
        only_available: bool,
    ) -> Result<Vec<Slot>, SchedulingError> {
        self.inner.slots(professional_id, date, only_available).await
    }

    async fn swap_slot_availability(
        &mut self,
        slot_id: Uuid,
        expected: bool,
        new: bool,
    ) -> Result<Option<Slot>, SchedulingError> {
        self.inner.swap_slot_availability(slot_id, expected, new).await
    }

    async fn move_slot(
        &mut self,
        slot_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<Slot>, SchedulingError> {
        self.inner.move_slot(slot_id, date, time).await
    }

    async fn delete_slot(&mut self, slot_id: Uuid) -> Result<bool, SchedulingError> {
        self.inner.delete_slot(slot_id).await
    }

    async fn insert_appointment(
        &mut self,
        appointment: &Appointment,
    ) -> Result<Appointment, SchedulingError> {
        if self.fail_appointment_insert {
            return Err(SchedulingError::TransientStore(
                "could not serialize access".into(),
            ));
        }
        self.inner.insert_appointment(appointment).await
    }

    async fn appointment_by_id(
        &mut self,
        appointment_id: Uuid,
    ) -> Result<Option<Appointment>, SchedulingError> {
        self.inner.appointment_by_id(appointment_id).await
    }

    async fn appointments(
        &mut self,
        filter: AppointmentFilter,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        self.inner.appointments(filter).await
    }

    async fn save_appointment(
        &mut self,
        appointment: &Appointment,
    ) -> Result<Appointment, SchedulingError> {
        self.inner.save_appointment(appointment).await
    }

    async fn delete_appointment(&mut self, appointment_id: Uuid) -> Result<bool, SchedulingError> {
        self.inner.delete_appointment(appointment_id).await
    }

    async fn insert_exam(&mut self, exam: &Exam) -> Result<Exam, SchedulingError> {
        self.inner.insert_exam(exam).await
    }

    async fn exam_by_id(&mut self, exam_id: Uuid) -> Result<Option<Exam>, SchedulingError> {
        self.inner.exam_by_id(exam_id).await
    }

    async fn exams(&mut self, patient_id: Option<Uuid>) -> Result<Vec<Exam>, SchedulingError> {
        self.inner.exams(patient_id).await
    }

    async fn save_exam(&mut self, exam: &Exam) -> Result<Exam, SchedulingError> {
        self.inner.save_exam(exam).await
    }

    async fn commit(self: Box<Self>) -> Result<(), SchedulingError> {
        self.inner.commit().await
    }
}

/* ===== Harness ===== */

pub struct Harness {
    pub store: MemoryStore,
    pub directory: Arc<Directory>,
    pub notifications: Arc<RecordingNotifications>,
    pub records: Arc<RecordingRecords>,
    pub coordinator: Coordinator,
    pub exams: ExamService,
    pub patient: Patient,
    pub professional: Professional,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(), Arc::new(RecordingNotifications::default()))
    }

    fn with_store(store: MemoryStore, notifications: Arc<RecordingNotifications>) -> Self {
        let directory = Arc::new(Directory::default());
        let patient = directory.add_patient("Ana Souza");
        let professional = directory.add_professional("Dr. Carlos Lima");
        let records = Arc::new(RecordingRecords::default());

        let coordinator = Coordinator::new(
            Arc::new(store.clone()),
            directory.clone(),
            directory.clone(),
            notifications.clone(),
        )
        .with_clock(Arc::new(FixedClock(now())));
        let exams = ExamService::new(
            Arc::new(store.clone()),
            directory.clone(),
            directory.clone(),
            notifications.clone(),
            records.clone(),
        );

        Harness {
            store,
            directory,
            notifications,
            records,
            coordinator,
            exams,
            patient,
            professional,
        }
    }

    /// Coordinator over the same tables and directory, built on another store.
    pub fn coordinator_over(
        &self,
        store: Arc<dyn SchedulingStore>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Coordinator {
        Coordinator::new(
            store,
            self.directory.clone(),
            self.directory.clone(),
            notifications,
        )
        .with_clock(Arc::new(FixedClock(now())))
    }

    /// Coordinator over the same store whose clock reads `now`.
    pub fn coordinator_at(&self, now: DateTime<Utc>) -> Coordinator {
        Coordinator::new(
            Arc::new(self.store.clone()),
            self.directory.clone(),
            self.directory.clone(),
            self.notifications.clone(),
        )
        .with_clock(Arc::new(FixedClock(now)))
    }

    pub fn exams_with_records(&self, records: Arc<dyn MedicalRecordSink>) -> ExamService {
        ExamService::new(
            Arc::new(self.store.clone()),
            self.directory.clone(),
            self.directory.clone(),
            self.notifications.clone(),
            records,
        )
    }

    pub async fn open_slot(&self, when: DateTime<Utc>) -> Slot {
        self.coordinator
            .create_slot(new_slot(self.professional.professional_id, when))
            .await
            .unwrap()
    }

    pub fn booking(&self, when: DateTime<Utc>) -> NewAppointment {
        self.booking_for(&self.patient, when)
    }

    pub fn booking_for(&self, patient: &Patient, when: DateTime<Utc>) -> NewAppointment {
        NewAppointment {
            patient_id: patient.patient_id,
            professional_id: self.professional.professional_id,
            date_time: when,
            notes: None,
        }
    }

    pub async fn slot(&self, slot_id: Uuid) -> Slot {
        self.coordinator.find_slot(slot_id).await.unwrap()
    }

    /// A slot is unavailable exactly when one live appointment sits on it.
    /// Finalized appointments still hold their slot.
    pub async fn assert_consistent(&self) {
        let appointments = self.store.committed_appointments().await;
        for slot in self.store.committed_slots().await {
            let holders = appointments
                .iter()
                .filter(|a| a.status != AppointmentStatus::Cancelled)
                .filter(|a| slot.is_at(a.professional_id, a.date_time))
                .count();
            assert!(holders <= 1, "slot {} held by {} appointments", slot.slot_id, holders);
            assert_eq!(
                !slot.available,
                holders == 1,
                "slot {} availability disagrees with its appointments",
                slot.slot_id
            );
        }
    }
}
