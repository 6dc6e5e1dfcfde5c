//! Local store adapter — typed access to the on-device dashboard state.
//!
//! A single redb table keyed by a closed set of logical keys. Collections
//! are stored as JSON arrays, scalars as raw strings. A write replaces the
//! whole value for a key; there are no partial-key semantics and no network
//! access here.

use std::path::Path;

use anyhow::{Context, Result};
use redb::{Database, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::{Entity, Room};

const STATE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("dashboard_state");

/// The fixed set of logical keys. String names are the on-disk key column
/// and match the dashboard's historical key names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    Rooms,
    Entities,
    DashboardLayout,
    Theme,
    Tier,
    HaUrl,
    HaToken,
    HaEntityEnergy,
    TuyaClientId,
    TuyaSecret,
    TuyaRegion,
    XiaomiUser,
    XiaomiPassword,
    XiaomiRegion,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rooms => "domotique_rooms",
            Self::Entities => "domotique_entities",
            Self::DashboardLayout => "dashboard_cards",
            Self::Theme => "sv_theme",
            Self::Tier => "user_tier",
            Self::HaUrl => "haUrl",
            Self::HaToken => "haToken",
            Self::HaEntityEnergy => "haEntityEnergy",
            Self::TuyaClientId => "tuyaClientId",
            Self::TuyaSecret => "tuyaSecret",
            Self::TuyaRegion => "tuyaRegion",
            Self::XiaomiUser => "xiaomiUser",
            Self::XiaomiPassword => "xiaomiPassword",
            Self::XiaomiRegion => "xiaomiRegion",
        }
    }

    pub const ALL: [StoreKey; 14] = [
        Self::Rooms,
        Self::Entities,
        Self::DashboardLayout,
        Self::Theme,
        Self::Tier,
        Self::HaUrl,
        Self::HaToken,
        Self::HaEntityEnergy,
        Self::TuyaClientId,
        Self::TuyaSecret,
        Self::TuyaRegion,
        Self::XiaomiUser,
        Self::XiaomiPassword,
        Self::XiaomiRegion,
    ];
}

pub struct LocalStore {
    db: Database,
}

impl LocalStore {
    /// Open (or create) the store at the default data directory.
    pub fn open_default() -> Result<Self> {
        let data_dir = dirs::data_dir()
            .context("Failed to get data directory")?
            .join("hearthsync");
        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        Self::open(data_dir.join("state.redb"))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path.as_ref()).context("Failed to open state database")?;
        // Create the table up front so reads never race its existence.
        let wtx = db.begin_write()?;
        {
            wtx.open_table(STATE_TABLE)?;
        }
        wtx.commit()?;
        Ok(Self { db })
    }

    pub fn read_text(&self, key: StoreKey) -> Result<Option<String>> {
        let rtx = self.db.begin_read()?;
        let table = rtx.open_table(STATE_TABLE)?;
        match table.get(key.as_str())? {
            Some(guard) => {
                let text = String::from_utf8(guard.value().to_vec())
                    .context("Stored value is not UTF-8")?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    pub fn write_text(&self, key: StoreKey, value: &str) -> Result<()> {
        let wtx = self.db.begin_write()?;
        {
            let mut table = wtx.open_table(STATE_TABLE)?;
            table.insert(key.as_str(), value.as_bytes())?;
        }
        wtx.commit()?;
        Ok(())
    }

    pub fn remove(&self, key: StoreKey) -> Result<()> {
        let wtx = self.db.begin_write()?;
        {
            let mut table = wtx.open_table(STATE_TABLE)?;
            table.remove(key.as_str())?;
        }
        wtx.commit()?;
        Ok(())
    }

    /// Read a JSON value. Malformed stored JSON is treated as absent rather
    /// than failing the caller.
    pub fn read_json<T: DeserializeOwned>(&self, key: StoreKey) -> Result<Option<T>> {
        let Some(text) = self.read_text(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("Discarding malformed JSON under {}: {}", key.as_str(), e);
                Ok(None)
            }
        }
    }

    pub fn write_json<T: Serialize>(&self, key: StoreKey, value: &T) -> Result<()> {
        let text = serde_json::to_string(value).context("Failed to serialize value")?;
        self.write_text(key, &text)
    }

    pub fn rooms(&self) -> Result<Vec<Room>> {
        Ok(self.read_json(StoreKey::Rooms)?.unwrap_or_default())
    }

    pub fn set_rooms(&self, rooms: &[Room]) -> Result<()> {
        self.write_json(StoreKey::Rooms, &rooms)
    }

    pub fn entities(&self) -> Result<Vec<Entity>> {
        Ok(self.read_json(StoreKey::Entities)?.unwrap_or_default())
    }

    pub fn set_entities(&self, entities: &[Entity]) -> Result<()> {
        self.write_json(StoreKey::Entities, &entities)
    }

    /// Drop every user-scoped key (sign-out path).
    pub fn clear_user_data(&self) -> Result<()> {
        let wtx = self.db.begin_write()?;
        {
            let mut table = wtx.open_table(STATE_TABLE)?;
            for key in StoreKey::ALL {
                table.remove(key.as_str())?;
            }
        }
        wtx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_test_store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("state.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_text_roundtrip_and_remove() {
        let (_dir, store) = open_test_store();

        assert_eq!(store.read_text(StoreKey::Theme).unwrap(), None);
        store.write_text(StoreKey::Theme, "dark").unwrap();
        assert_eq!(store.read_text(StoreKey::Theme).unwrap().as_deref(), Some("dark"));

        store.remove(StoreKey::Theme).unwrap();
        assert_eq!(store.read_text(StoreKey::Theme).unwrap(), None);
    }

    #[test]
    fn test_write_replaces_whole_value() {
        let (_dir, store) = open_test_store();

        store
            .set_rooms(&[
                Room { id: "r1".to_string(), name: "Salon".to_string() },
                Room { id: "r2".to_string(), name: "Cuisine".to_string() },
            ])
            .unwrap();
        store
            .set_rooms(&[Room { id: "r3".to_string(), name: "Bureau".to_string() }])
            .unwrap();

        let rooms = store.rooms().unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, "r3");
    }

    #[test]
    fn test_malformed_json_reads_as_absent() {
        let (_dir, store) = open_test_store();

        store.write_text(StoreKey::Rooms, "{not json").unwrap();
        assert!(store.rooms().unwrap().is_empty());
        // The raw text is still there untouched.
        assert_eq!(store.read_text(StoreKey::Rooms).unwrap().as_deref(), Some("{not json"));
    }

    #[test]
    fn test_entities_roundtrip() {
        let (_dir, store) = open_test_store();

        let entities = vec![Entity {
            ha_id: "light.l1".to_string(),
            name: "Lampe".to_string(),
            kind: "light".to_string(),
            variant: Some("dimmable".to_string()),
            room_id: Some("r1".to_string()),
        }];
        store.set_entities(&entities).unwrap();
        assert_eq!(store.entities().unwrap(), entities);
    }

    #[test]
    fn test_clear_user_data() {
        let (_dir, store) = open_test_store();

        store.write_text(StoreKey::Theme, "dark").unwrap();
        store.write_text(StoreKey::HaToken, "tok").unwrap();
        store
            .set_rooms(&[Room { id: "r1".to_string(), name: "Salon".to_string() }])
            .unwrap();

        store.clear_user_data().unwrap();

        assert_eq!(store.read_text(StoreKey::Theme).unwrap(), None);
        assert_eq!(store.read_text(StoreKey::HaToken).unwrap(), None);
        assert!(store.rooms().unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.redb");
        {
            let store = LocalStore::open(&path).unwrap();
            store.write_text(StoreKey::Tier, "pro").unwrap();
        }
        let store = LocalStore::open(&path).unwrap();
        assert_eq!(store.read_text(StoreKey::Tier).unwrap().as_deref(), Some("pro"));
    }
}
