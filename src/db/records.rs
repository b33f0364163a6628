use super::{Collection, Record, StoreKey};
use crate::models::{Note, ScheduleEntry, SettingEntry, Snapshot, Tenant};

impl Record for Tenant {
    const COLLECTION: Collection = Collection::Tenants;

    fn key(&self) -> Option<StoreKey> {
        Some(StoreKey::Text(self.id.clone()))
    }
}

impl Record for SettingEntry {
    const COLLECTION: Collection = Collection::Settings;

    fn key(&self) -> Option<StoreKey> {
        Some(StoreKey::Text(self.key.clone()))
    }
}

impl Record for Snapshot {
    const COLLECTION: Collection = Collection::SnapshotHistory;

    fn key(&self) -> Option<StoreKey> {
        self.id.map(StoreKey::Int)
    }

    fn assign_key(&mut self, key: i64) {
        self.id = Some(key);
    }
}

impl Record for Note {
    const COLLECTION: Collection = Collection::Notes;

    fn key(&self) -> Option<StoreKey> {
        self.id.map(StoreKey::Int)
    }

    fn assign_key(&mut self, key: i64) {
        self.id = Some(key);
    }
}

impl Record for ScheduleEntry {
    const COLLECTION: Collection = Collection::Schedule;

    fn key(&self) -> Option<StoreKey> {
        self.id.map(StoreKey::Int)
    }

    fn assign_key(&mut self, key: i64) {
        self.id = Some(key);
    }
}
