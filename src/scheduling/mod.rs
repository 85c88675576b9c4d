//! Slot/appointment reservation engine.

pub mod appointments;
pub mod clock;
pub mod collaborators;
pub mod coordinator;
pub mod error;
pub mod exams;
pub mod model;
pub mod slots;
pub mod status;
pub mod store;

pub use appointments::AppointmentStore;
pub use clock::{Clock, FixedClock, SystemClock};
pub use collaborators::{MedicalRecordSink, NotificationSink, PatientLookup, ProfessionalLookup};
pub use coordinator::{Booking, Coordinator};
pub use error::SchedulingError;
pub use exams::ExamService;
pub use model::*;
pub use slots::SlotStore;
pub use status::AppointmentStatus;
pub use store::{MemoryStore, PgStore, SchedulingStore, UnitOfWork};
