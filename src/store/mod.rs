//! The in-memory, typed-collection stand-in for a relational database. Reads
//! go straight through `RwLock`s; writes to a list's rows, matches, and new
//! facilities go through a [`UnitOfWork`] that buffers them and applies the
//! whole batch in one go, so a caller that never reaches `commit` leaves the
//! store exactly as it was.
//!
//! Each entity kind is also exposed through a narrow repository trait
//! (`FacilityListStore`, `FacilityStore`, `FacilityMatchStore`), mirroring
//! the teacher's `KeyValueStore` trait-object idiom: callers that only need
//! to read or update rows can depend on `&dyn FacilityListStore` instead of
//! the concrete `Store`, leaving the storage backend swappable in principle
//! even though `Store` is presently the only implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::errors::MaterializeError;
use crate::model::{
    Facility, FacilityId, FacilityList, FacilityListId, FacilityListItem, FacilityListItemId,
    FacilityMatch, FacilityMatchId,
};

/// Repository trait over `FacilityList`/`FacilityListItem` storage.
pub trait FacilityListStore: Send + Sync {
    fn insert_list(&self, list: FacilityList);
    fn get_list(&self, id: FacilityListId) -> Option<FacilityList>;
    fn insert_item(&self, item: FacilityListItem);
    fn get_item(&self, id: FacilityListItemId) -> Option<FacilityListItem>;
    /// Apply an in-place update to an item outside of a `UnitOfWork`. Used
    /// by the Parser and Geocoder stages, whose per-row writes are not part
    /// of the Materializer's atomic scope (§5: only the Matcher+Materializer
    /// batch is transactional).
    fn update_item(&self, item: FacilityListItem);
    fn items_for_list(&self, list_id: FacilityListId) -> Vec<FacilityListItem>;
}

/// Repository trait over the canonical `Facility` registry.
pub trait FacilityStore: Send + Sync {
    fn get_facility(&self, id: FacilityId) -> Option<Facility>;
    fn all_facilities(&self) -> Vec<Facility>;
}

/// Repository trait over `FacilityMatch` records.
pub trait FacilityMatchStore: Send + Sync {
    fn matches_for_item(&self, item_id: FacilityListItemId) -> Vec<FacilityMatch>;
}

/// A self-contained snapshot of one list's rows, suitable for writing to
/// disk after an `ingest` run and loading back for a later `reprocess` run
/// that re-runs matching without re-parsing or re-geocoding.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListSnapshot {
    pub list: FacilityList,
    pub items: Vec<FacilityListItem>,
}

/// The typed collections a real deployment would back with a relational
/// database. Every method here is synchronous; none of them perform I/O.
#[derive(Default)]
pub struct Store {
    lists: RwLock<HashMap<FacilityListId, FacilityList>>,
    items: RwLock<HashMap<FacilityListItemId, FacilityListItem>>,
    facilities: RwLock<HashMap<FacilityId, Facility>>,
    matches: RwLock<HashMap<FacilityMatchId, FacilityMatch>>,
    list_locks: RwLock<HashMap<FacilityListId, Arc<AsyncMutex<()>>>>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    /// The async mutex guarding materialization of one list, so two
    /// materializer tasks touching the same list serialize. This does not
    /// address the documented cross-list duplicate-creation gap.
    pub fn list_lock(&self, list_id: FacilityListId) -> Arc<AsyncMutex<()>> {
        if let Some(lock) = self.list_locks.read().unwrap().get(&list_id) {
            return Arc::clone(lock);
        }
        let mut locks = self.list_locks.write().unwrap();
        Arc::clone(
            locks
                .entry(list_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Begin a buffered write batch.
    pub fn unit_of_work(&self) -> UnitOfWork<'_> {
        UnitOfWork {
            store: self,
            new_facilities: Vec::new(),
            updated_items: Vec::new(),
            new_matches: Vec::new(),
        }
    }

    /// Snapshot a list's header and every row currently stored for it, for
    /// a later `reprocess` run. Returns `None` if the list itself isn't
    /// known to the store.
    pub fn snapshot_list(&self, list_id: FacilityListId) -> Option<ListSnapshot> {
        let list = self.get_list(list_id)?;
        let items = self.items_for_list(list_id);
        Some(ListSnapshot { list, items })
    }
}

impl FacilityListStore for Store {
    fn insert_list(&self, list: FacilityList) {
        self.lists.write().unwrap().insert(list.id, list);
    }

    fn get_list(&self, id: FacilityListId) -> Option<FacilityList> {
        self.lists.read().unwrap().get(&id).cloned()
    }

    fn insert_item(&self, item: FacilityListItem) {
        self.items.write().unwrap().insert(item.id, item);
    }

    fn get_item(&self, id: FacilityListItemId) -> Option<FacilityListItem> {
        self.items.read().unwrap().get(&id).cloned()
    }

    fn update_item(&self, item: FacilityListItem) {
        self.items.write().unwrap().insert(item.id, item);
    }

    fn items_for_list(&self, list_id: FacilityListId) -> Vec<FacilityListItem> {
        self.items
            .read()
            .unwrap()
            .values()
            .filter(|item| item.list_id == list_id)
            .cloned()
            .collect()
    }
}

impl FacilityStore for Store {
    fn get_facility(&self, id: FacilityId) -> Option<Facility> {
        self.facilities.read().unwrap().get(&id).cloned()
    }

    fn all_facilities(&self) -> Vec<Facility> {
        self.facilities.read().unwrap().values().cloned().collect()
    }
}

impl FacilityMatchStore for Store {
    fn matches_for_item(&self, item_id: FacilityListItemId) -> Vec<FacilityMatch> {
        self.matches
            .read()
            .unwrap()
            .values()
            .filter(|m| m.list_item_id == item_id)
            .cloned()
            .collect()
    }
}

/// A buffered batch of writes. Nothing staged here is visible to other
/// readers of the `Store` until `commit` runs; dropping a `UnitOfWork`
/// without committing discards everything staged.
pub struct UnitOfWork<'s> {
    store: &'s Store,
    new_facilities: Vec<Facility>,
    updated_items: Vec<FacilityListItem>,
    new_matches: Vec<FacilityMatch>,
}

impl<'s> UnitOfWork<'s> {
    pub fn stage_facility(&mut self, facility: Facility) {
        self.new_facilities.push(facility);
    }

    pub fn stage_item(&mut self, item: FacilityListItem) {
        self.updated_items.push(item);
    }

    pub fn stage_match(&mut self, facility_match: FacilityMatch) {
        self.new_matches.push(facility_match);
    }

    /// Apply every staged write at once. Because nothing here performs I/O
    /// or can partially fail, reaching this point means the whole batch
    /// becomes visible together; any error earlier in the caller's pipeline
    /// means this is simply never called, and the staged writes are dropped
    /// with the `UnitOfWork`.
    pub fn commit(self) -> Result<(), MaterializeError> {
        let mut facilities = self.store.facilities.write().unwrap();
        let mut items = self.store.items.write().unwrap();
        let mut matches = self.store.matches.write().unwrap();

        for facility in self.new_facilities {
            facilities.insert(facility.id, facility);
        }
        for item in self.updated_items {
            items.insert(item.id, item);
        }
        for facility_match in self.new_matches {
            matches.insert(facility_match.id, facility_match);
        }

        Ok(())
    }
}
