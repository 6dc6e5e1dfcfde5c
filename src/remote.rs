//! Remote client for the dashboard sync API.
//!
//! [`SyncBackend`] is the seam the reconciler works against; [`HttpRemote`]
//! is the real implementation speaking the backend's `GET/POST /api/sync`
//! envelope. The client never retries internally — retry policy belongs to
//! the caller.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::model::{Entity, ProfileRecord, RemoteSnapshot, Room};

/// Backend operations the reconciler needs.
///
/// All pushes are idempotent upserts keyed by (natural identifier, user
/// identity). `push_rooms`/`push_entities` send each collection as a single
/// batch; the call either reports success or failure as a whole. True
/// end-to-end atomicity depends on the backend's batch semantics — a known
/// limitation of the transport, not a contract this trait can strengthen.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    async fn pull_all(&self, user_id: &str) -> Result<RemoteSnapshot, SyncError>;
    async fn push_profile(&self, user_id: &str, profile: &ProfileRecord) -> Result<(), SyncError>;
    async fn push_rooms(&self, user_id: &str, rooms: &[Room]) -> Result<(), SyncError>;
    async fn push_entities(&self, user_id: &str, entities: &[Entity]) -> Result<(), SyncError>;
}

#[derive(Serialize)]
struct PushEnvelope<'a, T: Serialize> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a T,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Deserialize)]
struct PushAck {
    #[serde(default)]
    success: bool,
}

pub struct HttpRemote {
    base_url: String,
    http: HttpClient,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: HttpClient::new(),
        }
    }

    fn sync_url(&self) -> String {
        format!("{}/api/sync", self.base_url)
    }

    fn check_user_id(user_id: &str) -> Result<(), SyncError> {
        if user_id.trim().is_empty() {
            return Err(SyncError::Validation("user id must not be empty".to_string()));
        }
        Ok(())
    }

    /// Map a non-success response to the rejection error, preferring the
    /// structured `{error}` body over the bare status code.
    async fn rejection(response: reqwest::Response) -> SyncError {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(ErrorBody { error: Some(msg) }) => SyncError::RemoteRejected(msg),
            _ => SyncError::RemoteRejected(format!("HTTP {status}")),
        }
    }

    async fn push<T: Serialize + Sync>(
        &self,
        user_id: &str,
        kind: &'static str,
        data: &T,
    ) -> Result<(), SyncError> {
        Self::check_user_id(user_id)?;

        let envelope = PushEnvelope { user_id, kind, data };
        let response = self
            .http
            .post(self.sync_url())
            .json(&envelope)
            .send()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let ack: PushAck = response
            .json()
            .await
            .map_err(|e| SyncError::RemoteRejected(format!("malformed ack: {e}")))?;
        if !ack.success {
            return Err(SyncError::RemoteRejected(format!("{kind} upsert not acknowledged")));
        }
        Ok(())
    }
}

#[async_trait]
impl SyncBackend for HttpRemote {
    async fn pull_all(&self, user_id: &str) -> Result<RemoteSnapshot, SyncError> {
        Self::check_user_id(user_id)?;

        let response = self
            .http
            .get(self.sync_url())
            .query(&[("userId", user_id)])
            .send()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        // An empty-but-successful snapshot parses fine; only a body the
        // backend contract does not allow becomes a rejection.
        response
            .json::<RemoteSnapshot>()
            .await
            .map_err(|e| SyncError::RemoteRejected(format!("malformed snapshot: {e}")))
    }

    async fn push_profile(&self, user_id: &str, profile: &ProfileRecord) -> Result<(), SyncError> {
        self.push(user_id, "profile", profile).await
    }

    async fn push_rooms(&self, user_id: &str, rooms: &[Room]) -> Result<(), SyncError> {
        self.push(user_id, "rooms", &rooms).await
    }

    async fn push_entities(&self, user_id: &str, entities: &[Entity]) -> Result<(), SyncError> {
        self.push(user_id, "entities", &entities).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Patch;

    #[tokio::test]
    async fn test_empty_user_id_rejected_before_io() {
        // Port 9 is the discard protocol; if validation were skipped this
        // would surface as RemoteUnavailable instead.
        let remote = HttpRemote::new("http://127.0.0.1:9");
        let result = remote.pull_all("").await;
        assert!(matches!(result, Err(SyncError::Validation(_))));

        let result = remote.push_rooms("  ", &[]).await;
        assert!(matches!(result, Err(SyncError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_remote_unavailable() {
        let remote = HttpRemote::new("http://127.0.0.1:1");
        let result = remote.pull_all("u-1").await;
        assert!(matches!(result, Err(SyncError::RemoteUnavailable(_))));
    }

    #[test]
    fn test_push_envelope_shape() {
        let rooms = vec![Room { id: "r1".to_string(), name: "Salon".to_string() }];
        let envelope = PushEnvelope { user_id: "u-1", kind: "rooms", data: &rooms };
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["userId"], "u-1");
        assert_eq!(json["type"], "rooms");
        assert_eq!(json["data"][0]["id"], "r1");
    }

    #[test]
    fn test_profile_envelope_keeps_explicit_nulls() {
        let profile = ProfileRecord {
            tier: Patch::Value(crate::model::Tier::Pro),
            theme: Patch::Value("dark".to_string()),
            ha_url: Patch::Null,
            ..Default::default()
        };
        let envelope = PushEnvelope { user_id: "u-1", kind: "profile", data: &profile };
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["data"]["tier"], "pro");
        assert!(json["data"]["ha_url"].is_null());
        // Unset columns stay off the wire entirely.
        assert!(json["data"].get("tuya_region").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_normalized() {
        let remote = HttpRemote::new("https://dash.example.com/");
        assert_eq!(remote.sync_url(), "https://dash.example.com/api/sync");
    }
}
