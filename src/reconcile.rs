//! Reconciler — pull/merge/push orchestration for one sync session.
//!
//! Session flow: `Idle -> Pulling -> {MigratingLocal | Merging} -> Pushing
//! -> Settled`, terminal on `Settled` or `Failed`. A failed pull aborts the
//! whole session and leaves local state untouched; push failures are
//! recorded per step and never abort the remaining steps.
//!
//! The reconciler exclusively owns the decision of which side is
//! authoritative at any sync point. Neither store mutates the other's
//! representation directly.

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::model::{Entity, Patch, ProfileRecord, RemoteSnapshot, Tier};
use crate::remote::SyncBackend;
use crate::secrets;
use crate::store::{LocalStore, StoreKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Pulling,
    MigratingLocal,
    Merging,
    Pushing,
    Settled,
    Failed,
}

/// Outcome of one push step in the saga. A caller holding a `Failed` step
/// can re-run just that step via [`Reconciler::retry_failed_pushes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Skipped,
    Pushed,
    Failed(String),
}

impl StepResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    pub rooms: StepResult,
    pub entities: StepResult,
    pub profile: StepResult,
}

impl PushReport {
    fn new() -> Self {
        Self {
            rooms: StepResult::Skipped,
            entities: StepResult::Skipped,
            profile: StepResult::Skipped,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.rooms.is_failed() || self.entities.is_failed() || self.profile.is_failed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub state: SessionState,
    pub migrated: bool,
    pub push: PushReport,
}

/// Per-session bookkeeping. Nothing here survives the session; every new
/// session recomputes from scratch by re-pulling.
struct SyncSession {
    state: SessionState,
    has_pulled: bool,
    migrated: bool,
    rooms_refreshed: bool,
    entities_refreshed: bool,
}

impl SyncSession {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            has_pulled: false,
            migrated: false,
            rooms_refreshed: false,
            entities_refreshed: false,
        }
    }
}

pub struct Reconciler<B: SyncBackend> {
    backend: B,
    store: LocalStore,
    user_id: String,
    // Single-slot guard: at most one session per reconciler at a time.
    in_flight: Mutex<()>,
}

impl<B: SyncBackend> Reconciler<B> {
    pub fn new(backend: B, store: LocalStore, user_id: impl Into<String>) -> Self {
        Self {
            backend,
            store,
            user_id: user_id.into(),
            in_flight: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Run one full reconciliation session.
    ///
    /// Returns [`SyncError::SessionInFlight`] if another session on this
    /// reconciler has not settled yet, instead of interleaving with it.
    pub async fn run(&self) -> Result<SessionOutcome, SyncError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| SyncError::SessionInFlight)?;

        let mut session = SyncSession::new();

        session.state = SessionState::Pulling;
        debug!("Pulling remote snapshot for {}", self.user_id);
        let snapshot = match self.backend.pull_all(&self.user_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                session.state = SessionState::Failed;
                warn!("Pull failed, leaving local state untouched: {e}");
                return Err(e);
            }
        };
        session.has_pulled = true;

        if snapshot.is_empty() && self.local_has_data()? {
            // First device seeds the cloud: keep local data, push it all.
            session.state = SessionState::MigratingLocal;
            session.migrated = true;
            info!("Cloud empty but local store populated, entering migration");
        } else {
            session.state = SessionState::Merging;
            self.merge(&snapshot, &mut session)?;
        }

        session.state = SessionState::Pushing;
        let push = self.push_all(&session).await?;
        if push.has_failures() {
            warn!("Session settled with failed push steps: {push:?}");
        }

        session.state = SessionState::Settled;
        info!("Sync session settled (migrated: {})", session.migrated);
        Ok(SessionOutcome {
            state: session.state,
            migrated: session.migrated,
            push,
        })
    }

    /// Re-run only the steps a prior report recorded as failed. Succeeded
    /// and skipped steps keep their prior result.
    pub async fn retry_failed_pushes(&self, prior: &PushReport) -> Result<PushReport, SyncError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| SyncError::SessionInFlight)?;

        let mut report = prior.clone();
        if prior.rooms.is_failed() {
            report.rooms = self.push_rooms_step().await?;
        }
        if prior.entities.is_failed() {
            report.entities = self.push_entities_step().await?;
        }
        if prior.profile.is_failed() {
            report.profile = self.push_profile_step().await?;
        }
        Ok(report)
    }

    /// Local-has-data check for migration: a stored collection counts only
    /// if it is present and not the literal empty array.
    fn local_has_data(&self) -> Result<bool, SyncError> {
        for key in [StoreKey::Rooms, StoreKey::Entities] {
            if let Some(raw) = self.store.read_text(key)? {
                let raw = raw.trim();
                if !raw.is_empty() && raw != "[]" {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    // ── Merge ────────────────────────────────────────────────────────

    fn merge(&self, snapshot: &RemoteSnapshot, session: &mut SyncSession) -> Result<(), SyncError> {
        if let Some(profile) = &snapshot.profile {
            self.merge_profile(profile)?;
        }

        // Once merge is entered, remote is authoritative for these two
        // collections — replaced wholesale when the arrays are present.
        if let Some(rooms) = &snapshot.rooms {
            self.store.set_rooms(rooms)?;
            session.rooms_refreshed = true;
        }
        if let Some(records) = &snapshot.entities {
            let entities: Vec<Entity> = records.iter().map(Entity::from).collect();
            self.store.set_entities(&entities)?;
            session.entities_refreshed = true;
        }
        Ok(())
    }

    fn merge_profile(&self, profile: &ProfileRecord) -> Result<(), SyncError> {
        match &profile.tier {
            Patch::Value(tier) => self.store.write_text(StoreKey::Tier, tier.as_str())?,
            Patch::Null => self.store.remove(StoreKey::Tier)?,
            Patch::Unset => {}
        }
        self.apply_text(StoreKey::Theme, &profile.theme)?;
        self.apply_layout(&profile.dashboard_config)?;

        self.apply_text(StoreKey::HaUrl, &profile.ha_url)?;
        self.apply_text(StoreKey::HaEntityEnergy, &profile.ha_entity_energy)?;
        self.apply_text(StoreKey::TuyaClientId, &profile.tuya_client_id)?;
        self.apply_text(StoreKey::TuyaRegion, &profile.tuya_region)?;
        self.apply_text(StoreKey::XiaomiUser, &profile.xiaomi_user)?;
        self.apply_text(StoreKey::XiaomiRegion, &profile.xiaomi_region)?;

        // Each secret decrypts independently; one bad field never blocks
        // the others or clobbers its previous local value.
        self.apply_secret(StoreKey::HaToken, &profile.ha_token_enc)?;
        self.apply_secret(StoreKey::TuyaSecret, &profile.tuya_secret_enc)?;
        self.apply_secret(StoreKey::XiaomiPassword, &profile.xiaomi_password_enc)?;
        Ok(())
    }

    /// `Unset` leaves the local value as-is; `Null` is an explicit clear.
    fn apply_text(&self, key: StoreKey, patch: &Patch<String>) -> Result<(), SyncError> {
        match patch {
            Patch::Value(value) => self.store.write_text(key, value)?,
            Patch::Null => self.store.remove(key)?,
            Patch::Unset => {}
        }
        Ok(())
    }

    fn apply_layout(&self, patch: &Patch<serde_json::Value>) -> Result<(), SyncError> {
        match patch {
            Patch::Value(value) => {
                // The backend stores the layout blob in a text column, so it
                // may arrive double-encoded.
                let blob = if let Some(text) = value.as_str() {
                    match serde_json::from_str::<serde_json::Value>(text) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            warn!("Skipping malformed dashboard layout: {e}");
                            return Ok(());
                        }
                    }
                } else {
                    value.clone()
                };
                self.store.write_json(StoreKey::DashboardLayout, &blob)?;
            }
            Patch::Null => self.store.remove(StoreKey::DashboardLayout)?,
            Patch::Unset => {}
        }
        Ok(())
    }

    fn apply_secret(&self, key: StoreKey, patch: &Patch<String>) -> Result<(), SyncError> {
        match patch {
            Patch::Value(armored) => match secrets::decrypt(armored, &self.user_id) {
                Ok(Some(plaintext)) => self.store.write_text(key, &plaintext)?,
                Ok(None) => {}
                Err(e) => warn!("Skipping {}: {e}", key.as_str()),
            },
            Patch::Null => self.store.remove(key)?,
            Patch::Unset => {}
        }
        Ok(())
    }

    // ── Push ─────────────────────────────────────────────────────────

    /// Best-effort saga: rooms, then entities, then the profile. A failed
    /// step is recorded and the rest still run.
    async fn push_all(&self, session: &SyncSession) -> Result<PushReport, SyncError> {
        // Pushing before a pull attempt would overwrite not-yet-merged
        // remote state. The migration path counts: it completes a pull.
        if !session.has_pulled {
            return Err(SyncError::Validation("push attempted before pull".to_string()));
        }

        let mut report = PushReport::new();

        // Collections just replaced from remote are not dirty; pushing
        // them back would be a no-op round trip.
        if !session.rooms_refreshed {
            report.rooms = self.push_rooms_step().await?;
        }
        if !session.entities_refreshed {
            report.entities = self.push_entities_step().await?;
        }
        // The profile always goes out, to keep tier/theme/layout current.
        report.profile = self.push_profile_step().await?;

        Ok(report)
    }

    async fn push_rooms_step(&self) -> Result<StepResult, SyncError> {
        let rooms = self.store.rooms()?;
        if rooms.is_empty() {
            return Ok(StepResult::Skipped);
        }
        Ok(match self.backend.push_rooms(&self.user_id, &rooms).await {
            Ok(()) => StepResult::Pushed,
            Err(e) => {
                warn!("Rooms push failed: {e}");
                StepResult::Failed(e.to_string())
            }
        })
    }

    async fn push_entities_step(&self) -> Result<StepResult, SyncError> {
        let entities = self.store.entities()?;
        if entities.is_empty() {
            return Ok(StepResult::Skipped);
        }
        Ok(match self.backend.push_entities(&self.user_id, &entities).await {
            Ok(()) => StepResult::Pushed,
            Err(e) => {
                warn!("Entities push failed: {e}");
                StepResult::Failed(e.to_string())
            }
        })
    }

    async fn push_profile_step(&self) -> Result<StepResult, SyncError> {
        let profile = self.assemble_profile()?;
        Ok(match self.backend.push_profile(&self.user_id, &profile).await {
            Ok(()) => StepResult::Pushed,
            Err(e) => {
                warn!("Profile push failed: {e}");
                StepResult::Failed(e.to_string())
            }
        })
    }

    /// Build the outbound profile row from local state. Secrets are sealed
    /// here; plaintext never enters the payload.
    fn assemble_profile(&self) -> Result<ProfileRecord, SyncError> {
        let tier = self
            .store
            .read_text(StoreKey::Tier)?
            .map(|s| Tier::from_str(&s))
            .unwrap_or_default();
        let theme = self
            .store
            .read_text(StoreKey::Theme)?
            .unwrap_or_else(|| "default".to_string());
        let layout: serde_json::Value = self
            .store
            .read_json(StoreKey::DashboardLayout)?
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));

        Ok(ProfileRecord {
            id: Patch::Unset,
            tier: Patch::Value(tier),
            theme: Patch::Value(theme),
            dashboard_config: Patch::Value(layout),
            ha_url: Patch::from_option(self.store.read_text(StoreKey::HaUrl)?),
            ha_token_enc: self.sealed_field(StoreKey::HaToken)?,
            ha_entity_energy: Patch::from_option(self.store.read_text(StoreKey::HaEntityEnergy)?),
            tuya_client_id: Patch::from_option(self.store.read_text(StoreKey::TuyaClientId)?),
            tuya_secret_enc: self.sealed_field(StoreKey::TuyaSecret)?,
            tuya_region: Patch::from_option(self.store.read_text(StoreKey::TuyaRegion)?),
            xiaomi_user: Patch::from_option(self.store.read_text(StoreKey::XiaomiUser)?),
            xiaomi_password_enc: self.sealed_field(StoreKey::XiaomiPassword)?,
            xiaomi_region: Patch::from_option(self.store.read_text(StoreKey::XiaomiRegion)?),
            updated_at: Patch::Unset,
        })
    }

    fn sealed_field(&self, key: StoreKey) -> Result<Patch<String>, SyncError> {
        match self.store.read_text(key)? {
            Some(plaintext) => match secrets::encrypt(&plaintext, &self.user_id) {
                Ok(sealed) => Ok(Patch::Value(sealed)),
                Err(e) => {
                    warn!("Could not seal {}, sending null: {e}", key.as_str());
                    Ok(Patch::Null)
                }
            },
            None => Ok(Patch::Null),
        }
    }
}
