//! Save files for the Bastion.
//!
//! The whole [`GameState`] is written as versioned JSON alongside a small
//! metadata block that can be read without loading the state. Imports are
//! merged over the defaults so that documents from older builds, or
//! hand-edited ones, still load.

use crate::auth::{AuthSession, SecurityEvent};
use crate::missions::MissionStatus;
use crate::npcs::NpcBackup;
use crate::state::GameState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid save format")]
    InvalidFormat,

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current save file version.
pub const SAVE_VERSION: u32 = 1;

/// A saved Bastion with everything needed to resume play.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedBastion {
    /// Save format version for compatibility checking.
    pub version: u32,

    pub saved_at: DateTime<Utc>,

    pub state: GameState,

    pub metadata: SaveMetadata,
}

/// Summary shown in a save picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveMetadata {
    pub campaign_name: String,
    pub npc_count: usize,
    pub active_missions: usize,
    pub total_upgrades: usize,
    pub total_resources: u64,

    /// Duplicated from the parent so a peek can sort saves.
    pub saved_at: DateTime<Utc>,
}

impl SavedBastion {
    pub fn new(campaign_name: impl Into<String>, state: GameState) -> Self {
        let saved_at = Utc::now();
        let metadata = SaveMetadata {
            campaign_name: campaign_name.into(),
            npc_count: state.npcs.len(),
            active_missions: state
                .missions
                .iter()
                .filter(|m| m.status == MissionStatus::InProgress)
                .count(),
            total_upgrades: state.total_upgrades(),
            total_resources: state.resources.total(),
            saved_at,
        };

        Self {
            version: SAVE_VERSION,
            saved_at,
            state,
            metadata,
        }
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;

        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }

        Ok(saved)
    }

    /// Read just the metadata block of a save.
    pub async fn peek_metadata(path: impl AsRef<Path>) -> Result<SaveMetadata, PersistError> {
        let content = fs::read_to_string(path).await?;

        #[derive(Deserialize)]
        struct Partial {
            version: u32,
            metadata: SaveMetadata,
        }

        let partial: Partial = serde_json::from_str(&content)?;

        if partial.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: partial.version,
            });
        }

        Ok(partial.metadata)
    }
}

/// Information about a save file.
#[derive(Debug, Clone)]
pub struct SaveInfo {
    pub path: PathBuf,
    pub metadata: SaveMetadata,
}

/// Every readable save in a directory, newest first. A missing directory is
/// created and reported as empty.
pub async fn list_saves(dir: impl AsRef<Path>) -> Result<Vec<SaveInfo>, PersistError> {
    let mut saves = Vec::new();

    let dir = dir.as_ref();
    if !dir.exists() {
        fs::create_dir_all(dir).await?;
        return Ok(saves);
    }

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "json") {
            match SavedBastion::peek_metadata(&path).await {
                Ok(metadata) => saves.push(SaveInfo { path, metadata }),
                Err(e) => tracing::debug!(path = %path.display(), error = %e, "Skipping file"),
            }
        }
    }

    saves.sort_by(|a, b| b.metadata.saved_at.cmp(&a.metadata.saved_at));
    Ok(saves)
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Auto-save file for a campaign. Each auto-save overwrites the last.
pub fn auto_save_path(base_dir: impl AsRef<Path>, campaign_name: &str) -> PathBuf {
    base_dir
        .as_ref()
        .join(format!("{}_autosave.json", sanitize_name(campaign_name)))
}

/// Timestamped manual save file for a campaign.
pub fn manual_save_path(base_dir: impl AsRef<Path>, campaign_name: &str) -> PathBuf {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    base_dir
        .as_ref()
        .join(format!("{}_{timestamp}.json", sanitize_name(campaign_name)))
}

// ============================================================================
// Import / Export
// ============================================================================

/// Pretty JSON of the whole state.
pub fn export_state(state: &GameState) -> Result<String, PersistError> {
    Ok(serde_json::to_string_pretty(state)?)
}

/// Parse an exported state, filling anything missing from the defaults.
pub fn import_state(json: &str) -> Result<GameState, PersistError> {
    let incoming: Value = serde_json::from_str(json)?;
    if !incoming.is_object() {
        return Err(PersistError::InvalidFormat);
    }

    let mut merged = serde_json::to_value(GameState::default())?;
    merge_defaults(&mut merged, incoming);
    Ok(serde_json::from_value(merged)?)
}

/// Overlay `incoming` onto `base`. Objects merge key by key; anything else,
/// arrays included, replaces the base value.
pub fn merge_defaults(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match base.get_mut(&key) {
                    Some(existing) => merge_defaults(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, incoming) => *base = incoming,
    }
}

// ============================================================================
// Side files
// ============================================================================

/// Write an NPC roster backup.
pub async fn save_npc_backup(
    backup: &NpcBackup,
    path: impl AsRef<Path>,
) -> Result<(), PersistError> {
    let content = serde_json::to_string_pretty(backup)?;
    fs::write(path, content).await?;
    Ok(())
}

pub async fn load_npc_backup(path: impl AsRef<Path>) -> Result<NpcBackup, PersistError> {
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Contents of the login side file: a resumable login, if any, and the
/// security log. The log outlives logouts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedLogin {
    #[serde(default)]
    pub session: Option<AuthSession>,
    /// Newest first.
    #[serde(default)]
    pub security_log: Vec<SecurityEvent>,
}

/// Write the login side file.
pub async fn save_login(login: &SavedLogin, path: impl AsRef<Path>) -> Result<(), PersistError> {
    let content = serde_json::to_string(login)?;
    fs::write(path, content).await?;
    Ok(())
}

/// Read the login side file. A missing file yields an empty record and an
/// expired session is dropped.
pub async fn load_login(
    path: impl AsRef<Path>,
    now: DateTime<Utc>,
) -> Result<SavedLogin, PersistError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(SavedLogin::default());
    }

    let content = fs::read_to_string(path).await?;
    let mut login: SavedLogin = serde_json::from_str(&content)?;
    if login.session.as_ref().is_some_and(|s| !s.is_valid(now)) {
        tracing::debug!(path = %path.display(), "Dropping expired login");
        login.session = None;
    }
    Ok(login)
}

/// Remove the login side file, if any.
pub async fn clear_login(path: impl AsRef<Path>) -> Result<(), PersistError> {
    let path = path.as_ref();
    if path.exists() {
        fs::remove_file(path).await?;
    }
    Ok(())
}
