//! Data model for the dashboard sync core.
//!
//! Local shapes (`Room`, `Entity`, `Profile`) carry the field names the
//! dashboard stores on-device. Wire shapes (`ProfileRecord`, `EntityRecord`)
//! carry the backend's column names; the mapping between the two is exact
//! and lossless. Optional wire columns are [`Patch`] values so that "key
//! absent", "explicit null" and "value" stay distinguishable through serde.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Account tier. Unknown wire values fall back to `Free` rather than
/// failing the whole snapshot parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tier {
    #[default]
    Free,
    Pro,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pro" => Self::Pro,
            _ => Self::Free,
        }
    }
}

impl Serialize for Tier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Tier::from_str(&s))
    }
}

/// Three-state wire field: absent key, explicit null, or a value.
///
/// Merging treats `Unset` as "leave the local value alone" and `Null` as an
/// explicit clear. Serialization skips `Unset` keys entirely (pair each
/// field with `skip_serializing_if = "Patch::is_unset"`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Unset,
    Null,
    Value(T),
}

impl<T> Patch<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// `None` becomes an explicit null on the wire.
    pub fn from_option(opt: Option<T>) -> Self {
        match opt {
            Some(v) => Self::Value(v),
            None => Self::Null,
        }
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => v.serialize(serializer),
            _ => serializer.serialize_none(),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Patch<T> {
    // Only invoked when the key is present; `#[serde(default)]` covers the
    // absent case with `Unset`.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let opt = Option::<T>::deserialize(deserializer)?;
        Ok(match opt {
            Some(v) => Self::Value(v),
            None => Self::Null,
        })
    }
}

/// A user-defined organizational unit. Same shape locally and on the wire;
/// extra backend columns (e.g. `user_id`) are ignored on deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
}

/// A device reference as the dashboard stores it locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "haId")]
    pub ha_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(rename = "roomId", default)]
    pub room_id: Option<String>,
}

/// A device reference as the backend's entity row names it. Pulled rows use
/// the lowercase column names; outbound upserts use the local `Entity` shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntityRecord {
    #[serde(rename = "haid")]
    pub ha_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(rename = "roomid", default)]
    pub room_id: Option<String>,
}

impl From<&EntityRecord> for Entity {
    fn from(record: &EntityRecord) -> Self {
        Self {
            ha_id: record.ha_id.clone(),
            name: record.name.clone(),
            kind: record.kind.clone(),
            variant: record.variant.clone(),
            room_id: record.room_id.clone(),
        }
    }
}

/// The backend's per-user profile row: tier, theme, dashboard layout (an
/// opaque JSON blob to this core) and one plaintext-config/encrypted-secret
/// column group per integration provider.
///
/// Encrypted columns (`*_enc`) never carry plaintext once a secret exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub id: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub tier: Patch<Tier>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub theme: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub dashboard_config: Patch<serde_json::Value>,

    // Home Assistant
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub ha_url: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub ha_token_enc: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub ha_entity_energy: Patch<String>,

    // Tuya
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub tuya_client_id: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub tuya_secret_enc: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub tuya_region: Patch<String>,

    // Xiaomi
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub xiaomi_user: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub xiaomi_password_enc: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub xiaomi_region: Patch<String>,

    /// Written by the backend on upsert; carried opaquely.
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub updated_at: Patch<String>,
}

impl ProfileRecord {
    /// A profile row counts as present only if it carries a row id.
    pub fn has_row(&self) -> bool {
        self.id.value().is_some()
    }
}

/// Everything a pull returns. Missing arrays stay `None` so that "backend
/// sent nothing" and "backend sent an empty list" remain distinguishable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteSnapshot {
    #[serde(default)]
    pub profile: Option<ProfileRecord>,
    #[serde(default)]
    pub rooms: Option<Vec<Room>>,
    #[serde(default)]
    pub entities: Option<Vec<EntityRecord>>,
}

impl RemoteSnapshot {
    /// Cloud-empty: no profile row AND zero rooms AND zero entities.
    ///
    /// Note a snapshot with a profile row but empty rooms/entities is NOT
    /// empty — see DESIGN.md for the asymmetric overwrite this implies.
    pub fn is_empty(&self) -> bool {
        let has_profile = self.profile.as_ref().is_some_and(ProfileRecord::has_row);
        let has_rooms = self.rooms.as_ref().is_some_and(|r| !r.is_empty());
        let has_entities = self.entities.as_ref().is_some_and(|e| !e.is_empty());
        !has_profile && !has_rooms && !has_entities
    }
}
