//! BastionSession - the primary public API for running a Bastion.
//!
//! Wraps the [`GameState`], the [`Auth`] registry and the session's random
//! source behind role-gated operations. GM-only actions fail with
//! [`AuthError::GmOnly`]; everything else needs a logged-in user.

use crate::auth::{Auth, AuthError, AuthSession, CurrentUser, Role, UserSummary};
use crate::events::Effect;
use crate::items::Item;
use crate::missions::{
    AssignmentRequest, MissionAssignment, MissionDraft, MissionError, MissionResolution, Outcome,
};
use crate::npcs::{NpcBackup, NpcError, NpcPatch, NpcTemplate};
use crate::persist::{self, PersistError, SavedBastion, SavedLogin};
use crate::resources::{validate_amount, Resource, ResourceError, ResourceExport};
use crate::sections::{SectionError, SectionId, UpgradePath};
use crate::state::{GameState, ItemId, MissionId, NpcId};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from BastionSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Npc(#[from] NpcError),

    #[error(transparent)]
    Mission(#[from] MissionError),

    #[error(transparent)]
    Section(#[from] SectionError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

/// Configuration for a Bastion session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Campaign name, used for save file names.
    pub campaign_name: String,

    /// Directory holding save files.
    pub save_dir: PathBuf,

    /// Master switch for periodic auto-saves.
    pub auto_save: bool,

    pub auto_save_interval: Duration,
    pub mission_cleanup_interval: Duration,
    pub npc_healing_interval: Duration,
    pub cleaning_poll_interval: Duration,

    /// Seed for the session's random source. Random when unset.
    pub seed: Option<u64>,
}

impl SessionConfig {
    /// Create a new session config with campaign name.
    pub fn new(campaign_name: impl Into<String>) -> Self {
        Self {
            campaign_name: campaign_name.into(),
            save_dir: PathBuf::from("saves"),
            auto_save: true,
            auto_save_interval: Duration::from_secs(30),
            mission_cleanup_interval: Duration::from_secs(300),
            npc_healing_interval: Duration::from_secs(300),
            cleaning_poll_interval: Duration::from_secs(60),
            seed: None,
        }
    }

    /// Config with overrides from `BASTION_SAVE_DIR`, `BASTION_AUTOSAVE_SECS`
    /// and `BASTION_SEED`. Unparseable values are ignored.
    pub fn from_env(campaign_name: impl Into<String>) -> Self {
        let mut config = Self::new(campaign_name);

        if let Ok(dir) = std::env::var("BASTION_SAVE_DIR") {
            config.save_dir = PathBuf::from(dir);
        }

        if let Ok(secs) = std::env::var("BASTION_AUTOSAVE_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(0) => config.auto_save = false,
                Ok(secs) => config.auto_save_interval = Duration::from_secs(secs),
                Err(_) => tracing::warn!(value = %secs, "Ignoring invalid BASTION_AUTOSAVE_SECS"),
            }
        }

        if let Ok(seed) = std::env::var("BASTION_SEED") {
            match seed.trim().parse::<u64>() {
                Ok(seed) => config.seed = Some(seed),
                Err(_) => tracing::warn!(value = %seed, "Ignoring invalid BASTION_SEED"),
            }
        }

        config
    }

    /// Set the save directory.
    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = dir.into();
        self
    }

    /// Enable or disable auto-saving.
    pub fn with_auto_save(mut self, enabled: bool) -> Self {
        self.auto_save = enabled;
        self
    }

    pub fn with_auto_save_interval(mut self, interval: Duration) -> Self {
        self.auto_save_interval = interval;
        self
    }

    pub fn with_mission_cleanup_interval(mut self, interval: Duration) -> Self {
        self.mission_cleanup_interval = interval;
        self
    }

    pub fn with_npc_healing_interval(mut self, interval: Duration) -> Self {
        self.npc_healing_interval = interval;
        self
    }

    pub fn with_cleaning_poll_interval(mut self, interval: Duration) -> Self {
        self.cleaning_poll_interval = interval;
        self
    }

    /// Fix the random seed for reproducible sessions.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn auto_save_path(&self) -> PathBuf {
        persist::auto_save_path(&self.save_dir, &self.campaign_name)
    }
}

/// A running Bastion.
pub struct BastionSession {
    config: SessionConfig,
    state: GameState,
    auth: Auth,
    rng: StdRng,
}

impl BastionSession {
    /// Start a fresh Bastion.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_state(config, GameState::default())
    }

    /// Resume from an existing state.
    pub fn with_state(config: SessionConfig, state: GameState) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            state,
            auth: Auth::new(),
            rng,
        }
    }

    /// Load a save file into a new session.
    pub async fn load(config: SessionConfig, path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let saved = SavedBastion::load_json(path).await.map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Rejected save file");
            e
        })?;
        tracing::info!(path = %path.display(), "Bastion loaded");

        let mut session = Self::with_state(config, saved.state);
        session.state.recalculate_tech_expertise();
        session.state.record(Effect::StateLoaded);
        Ok(session)
    }

    /// Save the whole state to `path`.
    pub async fn save(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(PersistError::from)?;
        }

        let now = Utc::now();
        self.state.last_saved = Some(now);
        SavedBastion::new(self.config.campaign_name.clone(), self.state.clone())
            .save_json(path)
            .await?;

        tracing::info!(path = %path.display(), "Bastion saved");
        Ok(())
    }

    /// Save to a fresh timestamped file in the save directory.
    pub async fn save_manual(&mut self) -> Result<PathBuf, SessionError> {
        let path = persist::manual_save_path(&self.config.save_dir, &self.config.campaign_name);
        self.save(&path).await?;
        Ok(path)
    }

    /// Overwrite the campaign's auto-save if auto-saving is enabled.
    pub async fn auto_save(&mut self) -> Result<Option<PathBuf>, SessionError> {
        if !self.config.auto_save || !self.state.settings.auto_save {
            return Ok(None);
        }
        let path = self.config.auto_save_path();
        self.save(&path).await?;
        Ok(Some(path))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Direct access to the state. Bypasses role checks.
    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn auth_mut(&mut self) -> &mut Auth {
        &mut self.auth
    }

    pub(crate) fn state_and_rng(&mut self) -> (&mut GameState, &mut StdRng) {
        (&mut self.state, &mut self.rng)
    }

    /// Take every effect recorded since the last drain.
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        self.state.drain_effects()
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    pub fn login(
        &mut self,
        username: &str,
        access_code: &str,
        role: Role,
    ) -> Result<&CurrentUser, SessionError> {
        let user = self.auth.login(username, access_code, role, Utc::now())?;
        self.state
            .log_activity(format!("{} logged in as {}", user.display_name, user.role));
        Ok(user)
    }

    pub fn logout(&mut self) {
        self.auth.logout(Utc::now());
    }

    pub fn restore_auth_session(
        &mut self,
        session: AuthSession,
        now: DateTime<Utc>,
    ) -> Result<&CurrentUser, SessionError> {
        Ok(self.auth.restore_session(session, now)?)
    }

    pub fn current_user(&self) -> Option<&CurrentUser> {
        self.auth.current_user()
    }

    pub fn add_user(
        &mut self,
        username: &str,
        access_code: &str,
        role: Role,
        display_name: Option<&str>,
    ) -> Result<(), SessionError> {
        self.auth
            .add_user(username, access_code, role, display_name, Utc::now())?;
        self.state.log_activity(format!("User added: {username} ({role})"));
        Ok(())
    }

    pub fn remove_user(&mut self, username: &str) -> Result<(), SessionError> {
        self.auth.remove_user(username, Utc::now())?;
        self.state.log_activity(format!("User removed: {username}"));
        Ok(())
    }

    pub fn list_users(&self) -> Result<Vec<UserSummary>, SessionError> {
        Ok(self.auth.list_users()?)
    }

    fn require_gm(&self, action: &str) -> Result<String, SessionError> {
        Ok(self.auth.require_gm(action)?.username.clone())
    }

    fn require_user(&self) -> Result<String, SessionError> {
        Ok(self.auth.require_auth()?.username.clone())
    }

    // ========================================================================
    // Resources
    // ========================================================================

    /// Set a resource from manual entry (0-999999).
    pub fn set_resource(&mut self, resource: Resource, amount: i64) -> Result<(), SessionError> {
        self.require_gm("edit resources")?;
        let amount = validate_amount(amount)?;
        self.state.set_resource(resource, amount as i64);
        Ok(())
    }

    pub fn adjust_resource(&mut self, resource: Resource, delta: i64) -> Result<(), SessionError> {
        self.require_gm("edit resources")?;
        validate_amount(delta.abs())?;
        if delta >= 0 {
            self.state.add_resource(resource, delta as u64);
        } else {
            self.state.subtract_resource(resource, delta.unsigned_abs());
        }
        Ok(())
    }

    pub fn export_resources(&self) -> Result<ResourceExport, SessionError> {
        self.require_user()?;
        Ok(self.state.export_resources())
    }

    /// Load ledger counts from an export. Returns how many changed.
    pub fn import_resources(&mut self, entries: &ResourceExport) -> Result<usize, SessionError> {
        self.require_gm("edit resources")?;
        Ok(self.state.import_resources(entries))
    }

    pub fn max_all_resources(&mut self) -> Result<(), SessionError> {
        self.require_gm("use debug tools")?;
        let effects = self.state.resources.max_all();
        self.state.record_all(effects);
        self.state.log_activity("All resources set to maximum");
        Ok(())
    }

    pub fn reset_all_resources(&mut self) -> Result<(), SessionError> {
        self.require_gm("use debug tools")?;
        let effects = self.state.resources.reset_all();
        self.state.record_all(effects);
        self.state.log_activity("All resources reset to zero");
        Ok(())
    }

    pub fn simulate_income(&mut self, base: u64) -> Result<(), SessionError> {
        self.require_gm("simulate income")?;
        self.state.simulate_income(base, &mut self.rng);
        Ok(())
    }

    // ========================================================================
    // NPCs & Items
    // ========================================================================

    pub fn create_npc(&mut self, template: NpcTemplate) -> Result<NpcId, SessionError> {
        self.require_gm("create NPCs")?;
        Ok(self.state.create_npc(template, &mut self.rng)?)
    }

    pub fn edit_npc(&mut self, npc_id: NpcId, patch: NpcPatch) -> Result<(), SessionError> {
        self.require_gm("edit NPCs")?;
        Ok(self.state.edit_npc(npc_id, patch)?)
    }

    pub fn remove_npc(&mut self, npc_id: NpcId) -> Result<(), SessionError> {
        self.require_gm("remove NPCs")?;
        self.state.remove_npc(npc_id)?;
        Ok(())
    }

    /// Remove a selection of NPCs. Returns the names of those removed.
    pub fn remove_npcs(&mut self, npc_ids: &[NpcId]) -> Result<Vec<String>, SessionError> {
        self.require_gm("remove NPCs")?;
        let removed = self.state.remove_npcs(npc_ids)?;
        Ok(removed.into_iter().map(|npc| npc.name).collect())
    }

    pub fn injure_npc(&mut self, npc_id: NpcId, amount: u8) -> Result<(), SessionError> {
        self.require_gm("edit NPCs")?;
        Ok(self.state.injure_npc(npc_id, amount)?)
    }

    pub fn heal_npc(&mut self, npc_id: NpcId, amount: u8) -> Result<(), SessionError> {
        self.require_gm("edit NPCs")?;
        Ok(self.state.heal_npc(npc_id, amount)?)
    }

    pub fn export_npcs(&self) -> Result<NpcBackup, SessionError> {
        self.require_user()?;
        Ok(self.state.export_npcs())
    }

    pub fn import_npcs(&mut self, backup: NpcBackup) -> Result<(), SessionError> {
        self.require_gm("import NPCs")?;
        Ok(self.state.import_npcs(backup)?)
    }

    pub fn add_item(&mut self, item: Item) -> Result<ItemId, SessionError> {
        self.require_gm("manage items")?;
        Ok(self.state.add_item(item))
    }

    pub fn remove_item(&mut self, item_id: ItemId) -> Result<Option<Item>, SessionError> {
        self.require_gm("manage items")?;
        Ok(self.state.remove_item(item_id))
    }

    pub fn equip_item(&mut self, npc_id: NpcId, item_id: ItemId) -> Result<(), SessionError> {
        self.require_user()?;
        Ok(self.state.equip_item(npc_id, item_id)?)
    }

    pub fn unequip_item(&mut self, npc_id: NpcId) -> Result<Option<ItemId>, SessionError> {
        self.require_user()?;
        Ok(self.state.unequip_item(npc_id)?)
    }

    // ========================================================================
    // Missions
    // ========================================================================

    pub fn create_mission(&mut self, draft: MissionDraft) -> Result<MissionId, SessionError> {
        let username = self.require_gm("create missions")?;
        Ok(self.state.create_mission(draft, &username)?)
    }

    pub fn assign_mission(
        &mut self,
        mission_id: MissionId,
        request: AssignmentRequest,
    ) -> Result<&MissionAssignment, SessionError> {
        let username = self.require_user()?;
        let request = AssignmentRequest {
            assigned_by: username,
            ..request
        };
        Ok(self.state.assign_mission(mission_id, request, Utc::now())?)
    }

    pub fn resolve_mission(
        &mut self,
        mission_id: MissionId,
        outcome: Outcome,
        notes: &str,
    ) -> Result<MissionResolution, SessionError> {
        self.require_gm("resolve missions")?;
        Ok(self
            .state
            .resolve_mission(mission_id, outcome, notes, Utc::now(), &mut self.rng)?)
    }

    pub fn clear_completed_missions(&mut self) -> Result<usize, SessionError> {
        self.require_gm("clear completed missions")?;
        Ok(self.state.clear_completed_missions()?)
    }

    pub fn remove_mission(&mut self, mission_id: MissionId) -> Result<(), SessionError> {
        self.require_gm("remove missions")?;
        self.state.remove_mission(mission_id)?;
        Ok(())
    }

    // ========================================================================
    // Sections
    // ========================================================================

    pub fn purchase_upgrade(
        &mut self,
        section: SectionId,
        path: UpgradePath,
        index: usize,
    ) -> Result<(), SessionError> {
        self.require_user()?;
        Ok(self.state.purchase_upgrade(section, path, index)?)
    }

    pub fn start_cleaning(
        &mut self,
        section: SectionId,
        crew: Vec<NpcId>,
    ) -> Result<DateTime<Utc>, SessionError> {
        self.require_user()?;
        Ok(self.state.start_cleaning(section, crew, Utc::now())?)
    }

    pub fn bring_online(&mut self, section: SectionId) -> Result<(), SessionError> {
        self.require_user()?;
        Ok(self.state.bring_online(section)?)
    }

    // ========================================================================
    // Whole-state operations
    // ========================================================================

    pub fn export_state(&self) -> Result<String, SessionError> {
        self.require_user()?;
        Ok(persist::export_state(&self.state)?)
    }

    /// Replace the state with an imported document.
    pub fn import_state(&mut self, json: &str) -> Result<(), SessionError> {
        self.require_gm("import game state")?;
        let mut imported = persist::import_state(json)?;
        imported.recalculate_tech_expertise();
        imported.log_activity("Game state imported");
        imported.record(Effect::StateLoaded);
        self.state = imported;
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.require_gm("reset the Bastion")?;
        self.state.reset();
        self.state.log_activity("Bastion reset");
        tracing::info!(campaign = %self.config.campaign_name, "Bastion reset");
        Ok(())
    }

    // ========================================================================
    // Side files
    // ========================================================================

    pub async fn backup_npcs(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let backup = self.export_npcs()?;
        persist::save_npc_backup(&backup, path).await?;
        Ok(())
    }

    pub async fn restore_npcs(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        self.require_gm("import NPCs")?;
        let backup = persist::load_npc_backup(path).await?;
        self.import_npcs(backup)
    }

    fn saved_login(&self, session: Option<AuthSession>) -> SavedLogin {
        SavedLogin {
            session,
            security_log: self.auth.security_log().cloned().collect(),
        }
    }

    /// Write the current login and the security log so a later session can
    /// resume both.
    pub async fn remember_login(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let session = self
            .auth
            .session(Utc::now())
            .ok_or(AuthError::AuthRequired)?;
        persist::save_login(&self.saved_login(Some(session)), path).await?;
        Ok(())
    }

    /// Restore the security log and resume a remembered login. Returns
    /// whether a valid login was found.
    pub async fn resume_login(&mut self, path: impl AsRef<Path>) -> Result<bool, SessionError> {
        let now = Utc::now();
        let login = persist::load_login(&path, now).await?;
        self.auth.restore_security_log(login.security_log);
        let Some(session) = login.session else {
            return Ok(false);
        };
        self.restore_auth_session(session, now)?;
        Ok(true)
    }

    /// Log out and drop the remembered login. The security log is kept.
    pub async fn forget_login(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        self.logout();
        persist::save_login(&self.saved_login(None), path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::missions::MissionType;
    use crate::npcs::NpcStatus;

    fn gm_session() -> BastionSession {
        let mut session = BastionSession::new(SessionConfig::new("Test").with_seed(5));
        session.login("gm", "gmbastion2024", Role::Gm).unwrap();
        session
    }

    #[test]
    fn test_session_config() {
        let config = SessionConfig::new("Test Bastion")
            .with_save_dir("/tmp/bastion")
            .with_auto_save_interval(Duration::from_secs(10))
            .with_seed(99);

        assert_eq!(config.campaign_name, "Test Bastion");
        assert_eq!(config.save_dir, PathBuf::from("/tmp/bastion"));
        assert_eq!(config.auto_save_interval, Duration::from_secs(10));
        assert_eq!(config.mission_cleanup_interval, Duration::from_secs(300));
        assert_eq!(config.seed, Some(99));
        assert!(config
            .auto_save_path()
            .to_string_lossy()
            .ends_with("Test_Bastion_autosave.json"));
    }

    #[test]
    fn test_player_cannot_create_npcs() {
        let mut session = BastionSession::new(SessionConfig::new("Test"));
        session.login("jon", "bastion2024", Role::Player).unwrap();

        let err = session.create_npc(NpcTemplate::random()).unwrap_err();
        assert_eq!(err.to_string(), "Only GMs can create NPCs");
        assert!(session.state().npcs.is_empty());
    }

    #[test]
    fn test_logged_out_cannot_purchase() {
        let mut session = BastionSession::new(SessionConfig::new("Test"));
        let err = session
            .purchase_upgrade(SectionId::Luminarium, UpgradePath::Research, 0)
            .unwrap_err();
        assert!(matches!(err, SessionError::Auth(AuthError::AuthRequired)));
    }

    #[test]
    fn test_manual_resource_entry_is_validated() {
        let mut session = gm_session();
        assert!(matches!(
            session.set_resource(Resource::RunicShards, 1_000_000),
            Err(SessionError::Resource(ResourceError::InvalidAmount(1_000_000)))
        ));
        session.set_resource(Resource::RunicShards, 77).unwrap();
        assert_eq!(session.state().resource(Resource::RunicShards), 77);

        session.adjust_resource(Resource::RunicShards, -100).unwrap();
        assert_eq!(session.state().resource(Resource::RunicShards), 0);
    }

    #[test]
    fn test_mission_records_creator_and_assigner() {
        let mut session = gm_session();
        let npc_id = session.create_npc(NpcTemplate::named("Kade Voss")).unwrap();
        let mission_id = session
            .create_mission(MissionDraft::new(
                "Silent Watch",
                "Keep eyes on the harbour for three nights.",
                MissionType::Stealth,
            ))
            .unwrap();

        let assignment = session
            .assign_mission(mission_id, AssignmentRequest::npcs(vec![npc_id]))
            .unwrap();
        assert_eq!(assignment.assigned_by, "gm");
        assert_eq!(session.state().mission(mission_id).unwrap().created_by, "gm");
        assert_eq!(
            session.state().npc(npc_id).unwrap().status,
            NpcStatus::Deployed
        );
    }

    #[test]
    fn test_import_requires_gm_and_merges() {
        let mut session = gm_session();
        session
            .import_state(r#"{ "settings": { "theme": "light" } }"#)
            .unwrap();
        assert_eq!(session.state().settings.theme, "light");
        assert!(session.state().settings.auto_save);
        assert!(session.drain_effects().contains(&Effect::StateLoaded));

        session.logout();
        assert!(session.import_state("{}").is_err());
    }

    #[test]
    fn test_reset_requires_gm() {
        let mut session = gm_session();
        session.set_resource(Resource::CelestialPower, 1).unwrap();
        session.reset().unwrap();
        assert_eq!(session.state().resource(Resource::CelestialPower), 1250);
    }
}
