//! The Bastion game state.
//!
//! [`GameState`] is the single value every operation mutates: the resource
//! ledger, NPC roster, item stash, mission board, section records, settings
//! and activity log. Domain operations live next to their types in the
//! sibling modules as further `impl GameState` blocks.

use crate::events::Effect;
use crate::items::Item;
use crate::missions::{Mission, MissionAssignment};
use crate::npcs::Npc;
use crate::resources::ResourceLedger;
use crate::sections::{SectionId, SectionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Activity entries kept before the oldest are dropped.
pub const ACTIVITY_LOG_LIMIT: usize = 100;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for NPCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NpcId(pub Uuid);

impl NpcId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NpcId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for missions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MissionId(pub Uuid);

impl MissionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Settings & Activity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub auto_save: bool,
    pub sound_enabled: bool,
    pub theme: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_save: true,
            sound_enabled: true,
            theme: "dark".to_string(),
        }
    }
}

/// One line of the human-readable activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Summary numbers for the dashboard header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateStats {
    pub total_upgrades: usize,
    pub total_resources: u64,
    pub last_saved: Option<DateTime<Utc>>,
}

// ============================================================================
// Game State
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameState {
    pub resources: ResourceLedger,
    pub npcs: Vec<Npc>,
    pub items: Vec<Item>,
    pub missions: Vec<Mission>,
    pub mission_assignments: Vec<MissionAssignment>,
    pub sections: BTreeMap<SectionId, SectionRecord>,
    pub settings: Settings,
    pub activity_log: Vec<ActivityEntry>,
    pub last_saved: Option<DateTime<Utc>>,

    #[serde(skip)]
    pending_effects: Vec<Effect>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            resources: ResourceLedger::default(),
            npcs: Vec::new(),
            items: Vec::new(),
            missions: Vec::new(),
            mission_assignments: Vec::new(),
            sections: SectionId::all()
                .into_iter()
                .map(|id| (id, SectionRecord::new(id.starting_condition())))
                .collect(),
            settings: Settings::default(),
            activity_log: Vec::new(),
            last_saved: None,
            pending_effects: Vec::new(),
        }
    }
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, effect: Effect) {
        self.pending_effects.push(effect);
    }

    pub(crate) fn record_all(&mut self, effects: impl IntoIterator<Item = Effect>) {
        self.pending_effects.extend(effects);
    }

    /// Take every effect recorded since the last drain.
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.pending_effects)
    }

    pub fn log_activity(&mut self, message: impl Into<String>) {
        self.log_activity_at(message, Utc::now());
    }

    pub fn log_activity_at(&mut self, message: impl Into<String>, timestamp: DateTime<Utc>) {
        self.activity_log.push(ActivityEntry {
            timestamp,
            message: message.into(),
        });

        if self.activity_log.len() > ACTIVITY_LOG_LIMIT {
            let overflow = self.activity_log.len() - ACTIVITY_LOG_LIMIT;
            self.activity_log.drain(..overflow);
        }
    }

    /// Most recent entries first.
    pub fn recent_activity(&self, count: usize) -> Vec<&ActivityEntry> {
        self.activity_log.iter().rev().take(count).collect()
    }

    /// Return to a fresh Bastion, keeping only the settings.
    pub fn reset(&mut self) {
        let settings = self.settings.clone();
        *self = Self {
            settings,
            ..Self::default()
        };
        self.record(Effect::StateReset);
    }

    pub fn stats(&self) -> StateStats {
        StateStats {
            total_upgrades: self.total_upgrades(),
            total_resources: self.resources.total(),
            last_saved: self.last_saved,
        }
    }
}
