use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::error::SchedulingError;
use super::model::{NewSlot, Slot, SlotPatch, slot_key};
use super::store::UnitOfWork;

/// Slot contract on top of one unit of work.
///
/// `reserve` and `release` are crate-private: availability only changes as
/// part of an appointment lifecycle event driven by the coordinator.
pub struct SlotStore<'a> {
    uow: &'a mut dyn UnitOfWork,
}

impl<'a> SlotStore<'a> {
    pub fn new(uow: &'a mut dyn UnitOfWork) -> Self {
        Self { uow }
    }

    pub async fn create(&mut self, new: NewSlot) -> Result<Slot, SchedulingError> {
        if self
            .uow
            .slot_at(new.professional_id, new.slot_date, new.slot_time)
            .await?
            .is_some()
        {
            return Err(SchedulingError::Conflict(format!(
                "professional already has a slot on {} at {}",
                new.slot_date, new.slot_time
            )));
        }

        let slot = Slot {
            slot_id: Uuid::new_v4(),
            professional_id: new.professional_id,
            slot_date: new.slot_date,
            slot_time: new.slot_time,
            available: true,
            created_at: Utc::now(),
        };
        self.uow.insert_slot(&slot).await
    }

    pub async fn find(&mut self, slot_id: Uuid) -> Result<Slot, SchedulingError> {
        self.uow
            .slot_by_id(slot_id)
            .await?
            .ok_or_else(|| SchedulingError::not_found("slot"))
    }

    pub async fn list_by_professional(
        &mut self,
        professional_id: Uuid,
    ) -> Result<Vec<Slot>, SchedulingError> {
        self.uow.slots(professional_id, None, false).await
    }

    pub async fn list_available(
        &mut self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, SchedulingError> {
        self.uow.slots(professional_id, Some(date), true).await
    }

    /// Locks and returns the slot describing `at` for the professional,
    /// whatever its availability.
    pub async fn locate(
        &mut self,
        professional_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Slot>, SchedulingError> {
        let (date, time) = slot_key(at);
        self.uow.slot_at(professional_id, date, time).await
    }

    pub async fn locate_available(
        &mut self,
        professional_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Slot>, SchedulingError> {
        let slot = self.locate(professional_id, at).await?;
        debug!(
            "Slot lookup for professional {} at {}: {:?}",
            professional_id,
            at,
            slot.as_ref().map(|s| s.available)
        );
        Ok(slot.filter(|s| s.available))
    }

    /// Fails with `Conflict` when the slot is already reserved.
    pub(crate) async fn reserve(&mut self, slot_id: Uuid) -> Result<Slot, SchedulingError> {
        match self.uow.swap_slot_availability(slot_id, true, false).await? {
            Some(slot) => Ok(slot),
            None => {
                self.find(slot_id).await?;
                Err(SchedulingError::Conflict("slot is already reserved".into()))
            }
        }
    }

    /// Idempotent: releasing an available slot returns it unchanged.
    pub(crate) async fn release(&mut self, slot_id: Uuid) -> Result<Slot, SchedulingError> {
        match self.uow.swap_slot_availability(slot_id, false, true).await? {
            Some(slot) => Ok(slot),
            None => self.find(slot_id).await,
        }
    }

    /// Moves an unreserved slot. Reserved slots are pinned by their
    /// appointment and cannot move.
    pub async fn update(
        &mut self,
        slot_id: Uuid,
        patch: SlotPatch,
    ) -> Result<Slot, SchedulingError> {
        let current = self.find(slot_id).await?;
        if patch.is_empty() {
            return Ok(current);
        }
        if !current.available {
            return Err(SchedulingError::InvalidState(
                "a reserved slot cannot be moved".into(),
            ));
        }

        let date: NaiveDate = patch.slot_date.unwrap_or(current.slot_date);
        let time: NaiveTime = patch.slot_time.unwrap_or(current.slot_time);
        if (date, time) == (current.slot_date, current.slot_time) {
            return Ok(current);
        }
        if self.uow.slot_at(current.professional_id, date, time).await?.is_some() {
            return Err(SchedulingError::Conflict(format!(
                "professional already has a slot on {date} at {time}"
            )));
        }

        self.uow
            .move_slot(slot_id, date, time)
            .await?
            .ok_or_else(|| SchedulingError::not_found("slot"))
    }

    pub async fn delete(&mut self, slot_id: Uuid) -> Result<(), SchedulingError> {
        let current = self.find(slot_id).await?;
        if !current.available {
            return Err(SchedulingError::InvalidState(
                "a reserved slot cannot be deleted".into(),
            ));
        }
        self.uow.delete_slot(slot_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::store::{MemoryStore, SchedulingStore};
    use chrono::TimeZone;

    fn new_slot(professional_id: Uuid, hour: u32) -> NewSlot {
        NewSlot {
            professional_id,
            slot_date: NaiveDate::from_ymd_opt(2030, 3, 4).unwrap(),
            slot_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn create_defaults_to_available_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let mut slots = SlotStore::new(uow.as_mut());
        let professional = Uuid::new_v4();

        let slot = slots.create(new_slot(professional, 9)).await.unwrap();
        assert!(slot.available);

        let err = slots.create(new_slot(professional, 9)).await.unwrap_err();
        assert!(matches!(err, SchedulingError::Conflict(_)));

        // same instant, other professional
        slots.create(new_slot(Uuid::new_v4(), 9)).await.unwrap();
    }

    #[tokio::test]
    async fn reserve_twice_conflicts_and_release_is_idempotent() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let mut slots = SlotStore::new(uow.as_mut());
        let slot = slots.create(new_slot(Uuid::new_v4(), 10)).await.unwrap();

        assert!(!slots.reserve(slot.slot_id).await.unwrap().available);
        assert!(matches!(
            slots.reserve(slot.slot_id).await,
            Err(SchedulingError::Conflict(_))
        ));

        assert!(slots.release(slot.slot_id).await.unwrap().available);
        assert!(slots.release(slot.slot_id).await.unwrap().available);
    }

    #[tokio::test]
    async fn reserve_unknown_slot_is_not_found() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let mut slots = SlotStore::new(uow.as_mut());
        assert!(matches!(
            slots.reserve(Uuid::new_v4()).await,
            Err(SchedulingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_available_filters_and_orders_by_time() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let mut slots = SlotStore::new(uow.as_mut());
        let professional = Uuid::new_v4();
        let late = slots.create(new_slot(professional, 16)).await.unwrap();
        let early = slots.create(new_slot(professional, 8)).await.unwrap();
        let taken = slots.create(new_slot(professional, 12)).await.unwrap();
        slots.reserve(taken.slot_id).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2030, 3, 4).unwrap();
        let free: Vec<Uuid> = slots
            .list_available(professional, date)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.slot_id)
            .collect();
        assert_eq!(free, vec![early.slot_id, late.slot_id]);
        assert_eq!(slots.list_by_professional(professional).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn locate_matches_the_utc_instant() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let mut slots = SlotStore::new(uow.as_mut());
        let professional = Uuid::new_v4();
        let slot = slots.create(new_slot(professional, 9)).await.unwrap();

        let at = Utc.with_ymd_and_hms(2030, 3, 4, 9, 0, 0).unwrap();
        assert_eq!(slots.locate_available(professional, at).await.unwrap(), Some(slot.clone()));

        slots.reserve(slot.slot_id).await.unwrap();
        assert_eq!(slots.locate_available(professional, at).await.unwrap(), None);
        assert!(slots.locate(professional, at).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reserved_slots_cannot_move_or_be_deleted() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let mut slots = SlotStore::new(uow.as_mut());
        let slot = slots.create(new_slot(Uuid::new_v4(), 9)).await.unwrap();
        slots.reserve(slot.slot_id).await.unwrap();

        let patch = SlotPatch {
            slot_date: None,
            slot_time: NaiveTime::from_hms_opt(11, 0, 0),
        };
        assert!(matches!(
            slots.update(slot.slot_id, patch).await,
            Err(SchedulingError::InvalidState(_))
        ));
        assert!(matches!(
            slots.delete(slot.slot_id).await,
            Err(SchedulingError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn moving_onto_an_existing_instant_conflicts() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let mut slots = SlotStore::new(uow.as_mut());
        let professional = Uuid::new_v4();
        let nine = slots.create(new_slot(professional, 9)).await.unwrap();
        slots.create(new_slot(professional, 10)).await.unwrap();

        let patch = SlotPatch {
            slot_date: None,
            slot_time: NaiveTime::from_hms_opt(10, 0, 0),
        };
        assert!(matches!(
            slots.update(nine.slot_id, patch).await,
            Err(SchedulingError::Conflict(_))
        ));

        let patch = SlotPatch {
            slot_date: None,
            slot_time: NaiveTime::from_hms_opt(11, 0, 0),
        };
        let moved = slots.update(nine.slot_id, patch).await.unwrap();
        assert_eq!(moved.slot_time, NaiveTime::from_hms_opt(11, 0, 0).unwrap());
    }
}
