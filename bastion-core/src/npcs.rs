//! NPC roster.
//!
//! Recruitment (random or templated), editing, removal with assignment
//! sweeps, equipment, injuries and healing, plus roster statistics and
//! backups.

use crate::events::Effect;
use crate::items::Item;
use crate::resources::Resource;
use crate::state::{GameState, ItemId, NpcId};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub const MIN_STAT: u8 = 1;
pub const MAX_STAT: u8 = 6;
pub const MAX_LOYALTY: u8 = 100;
pub const MAX_INJURY: u8 = 5;
pub const MAX_STRESS: u8 = 10;

/// Injury level at which an available NPC is pulled off duty.
pub const INJURED_THRESHOLD: u8 = 3;

/// Chance per healing pass that a hurt NPC recovers one point.
pub const HEALING_CHANCE: f64 = 0.1;

const FIRST_NAMES: &[&str] = &[
    "Kade", "Elena", "Marcus", "Zara", "Ajax", "Luna", "Nyx", "Rex", "Vera", "Kai", "Thane",
    "Lyra", "Orion", "Nova", "Sage", "Raven", "Dex", "Iris", "Zephyr", "Astrid", "Cyrus", "Vex",
    "Echo", "Phoenix",
];

const LAST_NAMES: &[&str] = &[
    "Voss", "Cross", "Reid", "Shadow", "Storm", "Ember", "Steel", "Nova", "Stark", "Vale",
    "Frost", "Blaze", "Stone", "Gray", "Swift", "Void", "Sharp", "Wolf", "Drake", "Fox", "Knight",
    "Sage", "Crow", "Hunter",
];

const TITLES: &[&str] = &[
    "Ghost Operative",
    "Tech Specialist",
    "Combat Veteran",
    "Social Engineer",
    "Research Analyst",
    "Field Medic",
    "Infiltrator",
    "Guardian",
    "Saboteur",
    "Negotiator",
    "Scout",
    "Engineer",
    "Hacker",
    "Pilot",
    "Sniper",
    "Demolitions Expert",
    "Psychic",
    "Mystic",
    "Artificer",
];

const TRAITS: &[&str] = &[
    "Silent Entry: Stealth missions ignore first 2 points of required threshold",
    "Data Mining: Automatically gains +1 Intel on successful Tech missions",
    "Quick Reflexes: +1 to first action each mission",
    "Tech Savvy: +2 Tech when working with equipment",
    "Stealthy: Can avoid detection on failed stealth rolls",
    "Combat Veteran: +1 Combat, reduces stress from violence",
    "Social Network: Has contacts in various organizations",
    "Iron Will: Immune to fear and intimidation effects",
    "Lucky: Can reroll one failed die per mission",
    "Inspiring: Nearby allies gain +1 to Will rolls",
    "Medic: Can treat injuries in the field",
    "Linguist: Speaks multiple languages fluently",
    "Marksman: +2 accuracy with ranged weapons",
    "Acrobat: Can navigate difficult terrain easily",
    "Charming: +2 Social when dealing with NPCs",
];

/// Errors from roster operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NpcError {
    #[error("NPC not found: {0}")]
    NotFound(NpcId),

    #[error("Item not found")]
    ItemNotFound(ItemId),

    #[error("Invalid NPC name")]
    InvalidName,

    #[error("Invalid {stat} value: must be 1-6 (got {value})")]
    InvalidStat { stat: Stat, value: u8 },

    #[error("Invalid loyalty value: must be 0-100 (got {0})")]
    InvalidLoyalty(u8),

    #[error("NPC {name} is not available")]
    NotAvailable { name: String },

    #[error("No NPCs selected for removal")]
    NoneSelected,
}

// ============================================================================
// Stats
// ============================================================================

/// The six NPC stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stat {
    Skill,
    Stealth,
    Combat,
    Tech,
    Social,
    Will,
}

impl Stat {
    pub fn name(&self) -> &'static str {
        match self {
            Stat::Skill => "Skill",
            Stat::Stealth => "Stealth",
            Stat::Combat => "Combat",
            Stat::Tech => "Tech",
            Stat::Social => "Social",
            Stat::Will => "Will",
        }
    }

    pub fn all() -> [Stat; 6] {
        [
            Stat::Skill,
            Stat::Stealth,
            Stat::Combat,
            Stat::Tech,
            Stat::Social,
            Stat::Will,
        ]
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name().to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcStats {
    pub skill: u8,
    pub stealth: u8,
    pub combat: u8,
    pub tech: u8,
    pub social: u8,
    pub will: u8,
}

impl NpcStats {
    pub fn new(skill: u8, stealth: u8, combat: u8, tech: u8, social: u8, will: u8) -> Self {
        Self {
            skill,
            stealth,
            combat,
            tech,
            social,
            will,
        }
    }

    pub fn get(&self, stat: Stat) -> u8 {
        match stat {
            Stat::Skill => self.skill,
            Stat::Stealth => self.stealth,
            Stat::Combat => self.combat,
            Stat::Tech => self.tech,
            Stat::Social => self.social,
            Stat::Will => self.will,
        }
    }

    pub fn set(&mut self, stat: Stat, value: u8) {
        match stat {
            Stat::Skill => self.skill = value,
            Stat::Stealth => self.stealth = value,
            Stat::Combat => self.combat = value,
            Stat::Tech => self.tech = value,
            Stat::Social => self.social = value,
            Stat::Will => self.will = value,
        }
    }

    /// Roll every stat in 2..=5.
    pub fn random(rng: &mut impl Rng) -> Self {
        let mut stats = Self::default();
        for stat in Stat::all() {
            stats.set(stat, rng.gen_range(2..=5));
        }
        stats
    }

    /// Stats with equipment bonuses folded in; never below zero.
    pub fn with_bonuses(&self, bonus: &BTreeMap<Stat, i8>) -> Self {
        let mut stats = *self;
        for (stat, delta) in bonus {
            let value = (stats.get(*stat) as i16 + *delta as i16).clamp(0, u8::MAX as i16);
            stats.set(*stat, value as u8);
        }
        stats
    }
}

impl Default for NpcStats {
    fn default() -> Self {
        Self::new(3, 3, 3, 3, 3, 3)
    }
}

// ============================================================================
// NPC
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NpcStatus {
    Available,
    Deployed,
    Injured,
    Dead,
}

impl NpcStatus {
    pub fn name(&self) -> &'static str {
        match self {
            NpcStatus::Available => "available",
            NpcStatus::Deployed => "deployed",
            NpcStatus::Injured => "injured",
            NpcStatus::Dead => "dead",
        }
    }

    /// Available and deployed NPCs contribute to the Bastion.
    pub fn is_active(&self) -> bool {
        matches!(self, NpcStatus::Available | NpcStatus::Deployed)
    }
}

impl fmt::Display for NpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Npc {
    pub id: NpcId,
    pub name: String,
    pub title: String,
    pub stats: NpcStats,
    pub loyalty: u8,
    pub injury: u8,
    pub stress: u8,
    pub rank: u8,
    #[serde(rename = "trait")]
    pub special_trait: String,
    pub equipped_item: Option<ItemId>,
    pub status: NpcStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub experience: u32,
    #[serde(default)]
    pub missions_completed: u32,
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub saves: u32,
}

impl Npc {
    pub fn is_hurt(&self) -> bool {
        self.injury > 0 || self.stress > 0
    }

    /// Check the shape rules every stored NPC must satisfy.
    pub fn validate(&self) -> Result<(), NpcError> {
        if self.name.trim().chars().count() < 2 {
            return Err(NpcError::InvalidName);
        }

        for stat in Stat::all() {
            let value = self.stats.get(stat);
            if !(MIN_STAT..=MAX_STAT).contains(&value) {
                return Err(NpcError::InvalidStat { stat, value });
            }
        }

        if self.loyalty > MAX_LOYALTY {
            return Err(NpcError::InvalidLoyalty(self.loyalty));
        }

        Ok(())
    }
}

/// Recruitment input. Anything left unset is rolled at random.
#[derive(Debug, Clone, Default)]
pub struct NpcTemplate {
    pub name: Option<String>,
    pub title: Option<String>,
    pub stats: BTreeMap<Stat, i64>,
    pub loyalty: Option<u8>,
    pub injury: Option<u8>,
    pub stress: Option<u8>,
    pub rank: Option<u8>,
    pub special_trait: Option<String>,
    pub status: Option<NpcStatus>,
    pub experience: Option<u32>,
}

impl NpcTemplate {
    /// A fully random recruit.
    pub fn random() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Provided stats are clamped into 1..=6.
    pub fn with_stat(mut self, stat: Stat, value: i64) -> Self {
        self.stats.insert(stat, value);
        self
    }

    pub fn with_loyalty(mut self, loyalty: u8) -> Self {
        self.loyalty = Some(loyalty);
        self
    }

    pub fn with_trait(mut self, special_trait: impl Into<String>) -> Self {
        self.special_trait = Some(special_trait.into());
        self
    }

    pub fn with_status(mut self, status: NpcStatus) -> Self {
        self.status = Some(status);
        self
    }

    fn build(self, rng: &mut impl Rng, now: DateTime<Utc>) -> Npc {
        let mut stats = NpcStats::random(rng);
        for (stat, value) in &self.stats {
            stats.set(*stat, (*value).clamp(MIN_STAT as i64, MAX_STAT as i64) as u8);
        }

        Npc {
            id: NpcId::new(),
            name: self
                .name
                .map(|n| n.trim().to_string())
                .unwrap_or_else(|| random_name(rng)),
            title: self
                .title
                .unwrap_or_else(|| pick(TITLES, rng, "Recruit")),
            stats,
            loyalty: self.loyalty.unwrap_or_else(|| rng.gen_range(70..=95)),
            injury: self.injury.unwrap_or(0),
            stress: self.stress.unwrap_or(0),
            rank: self.rank.unwrap_or(1),
            special_trait: self
                .special_trait
                .unwrap_or_else(|| pick(TRAITS, rng, "")),
            equipped_item: None,
            status: self.status.unwrap_or(NpcStatus::Available),
            created_at: now,
            experience: self.experience.unwrap_or(0),
            missions_completed: 0,
            kills: 0,
            saves: 0,
        }
    }
}

/// Field edits for an existing NPC. Stats outside 1..=6 are ignored.
#[derive(Debug, Clone, Default)]
pub struct NpcPatch {
    pub name: Option<String>,
    pub title: Option<String>,
    pub special_trait: Option<String>,
    pub stats: BTreeMap<Stat, i64>,
    pub loyalty: Option<u8>,
}

impl NpcPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn special_trait(mut self, special_trait: impl Into<String>) -> Self {
        self.special_trait = Some(special_trait.into());
        self
    }

    pub fn stat(mut self, stat: Stat, value: i64) -> Self {
        self.stats.insert(stat, value);
        self
    }

    pub fn loyalty(mut self, loyalty: u8) -> Self {
        self.loyalty = Some(loyalty);
        self
    }
}

/// Aggregate numbers for the roster panel.
#[derive(Debug, Clone, PartialEq)]
pub struct NpcStatistics {
    pub total: usize,
    pub by_status: BTreeMap<NpcStatus, usize>,
    pub average_stats: BTreeMap<Stat, f64>,
    pub total_tech_expertise: u64,
    pub average_loyalty: u32,
    pub injured: usize,
    pub stressed: usize,
}

/// Roster backup: NPCs plus the items they reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcBackup {
    pub npcs: Vec<Npc>,
    #[serde(default)]
    pub items: Vec<Item>,
    pub timestamp: DateTime<Utc>,
}

fn pick(pool: &[&str], rng: &mut impl Rng, fallback: &str) -> String {
    pool.choose(rng).copied().unwrap_or(fallback).to_string()
}

/// "First Last" from the recruitment name pools.
pub fn random_name(rng: &mut impl Rng) -> String {
    format!(
        "{} {}",
        pick(FIRST_NAMES, rng, "Nameless"),
        pick(LAST_NAMES, rng, "Recruit")
    )
}

// ============================================================================
// Roster operations
// ============================================================================

impl GameState {
    pub fn npc(&self, npc_id: NpcId) -> Option<&Npc> {
        self.npcs.iter().find(|n| n.id == npc_id)
    }

    pub(crate) fn npc_mut(&mut self, npc_id: NpcId) -> Result<&mut Npc, NpcError> {
        self.npcs
            .iter_mut()
            .find(|n| n.id == npc_id)
            .ok_or(NpcError::NotFound(npc_id))
    }

    pub fn npcs_by_status(&self, status: NpcStatus) -> Vec<&Npc> {
        self.npcs.iter().filter(|n| n.status == status).collect()
    }

    pub fn available_npcs(&self) -> Vec<&Npc> {
        self.npcs_by_status(NpcStatus::Available)
    }

    pub fn deployed_npcs(&self) -> Vec<&Npc> {
        self.npcs_by_status(NpcStatus::Deployed)
    }

    /// Recruit an NPC from a template.
    pub fn create_npc(
        &mut self,
        template: NpcTemplate,
        rng: &mut impl Rng,
    ) -> Result<NpcId, NpcError> {
        let npc = template.build(rng, Utc::now());
        npc.validate()?;

        let id = npc.id;
        self.log_activity(format!("New NPC recruited: {} ({})", npc.name, npc.title));
        self.record(Effect::NpcRecruited {
            npc_id: id,
            name: npc.name.clone(),
        });
        self.npcs.push(npc);
        self.recalculate_tech_expertise();

        tracing::info!(npc_id = %id, "NPC recruited");
        Ok(id)
    }

    pub fn edit_npc(&mut self, npc_id: NpcId, patch: NpcPatch) -> Result<(), NpcError> {
        let npc = self.npc_mut(npc_id)?;
        let mut edited = npc.clone();

        if let Some(name) = patch.name {
            edited.name = name.trim().to_string();
        }
        if let Some(title) = patch.title {
            edited.title = title.trim().to_string();
        }
        if let Some(special_trait) = patch.special_trait {
            edited.special_trait = special_trait.trim().to_string();
        }
        for (stat, value) in patch.stats {
            if (MIN_STAT as i64..=MAX_STAT as i64).contains(&value) {
                edited.stats.set(stat, value as u8);
            }
        }
        if let Some(loyalty) = patch.loyalty {
            edited.loyalty = loyalty;
        }

        edited.validate()?;
        let name = edited.name.clone();
        *npc = edited;

        self.log_activity(format!("NPC edited: {name}"));
        self.record(Effect::NpcUpdated { npc_id });
        self.recalculate_tech_expertise();
        Ok(())
    }

    /// Remove an NPC, unequipping it and pulling it off every assignment.
    pub fn remove_npc(&mut self, npc_id: NpcId) -> Result<Npc, NpcError> {
        if self.npc(npc_id).is_none() {
            return Err(NpcError::NotFound(npc_id));
        }

        self.unequip_item(npc_id)?;
        self.release_npc_from_missions(npc_id);
        self.release_npc_from_cleaning(npc_id);

        let index = self
            .npcs
            .iter()
            .position(|n| n.id == npc_id)
            .ok_or(NpcError::NotFound(npc_id))?;
        let npc = self.npcs.remove(index);

        self.log_activity(format!("NPC removed: {}", npc.name));
        self.record(Effect::NpcRemoved {
            npc_id,
            name: npc.name.clone(),
        });
        self.recalculate_tech_expertise();
        Ok(npc)
    }

    /// Remove several NPCs at once. Ids that are already gone are skipped.
    pub fn remove_npcs(&mut self, npc_ids: &[NpcId]) -> Result<Vec<Npc>, NpcError> {
        if npc_ids.is_empty() {
            return Err(NpcError::NoneSelected);
        }

        let mut removed = Vec::new();
        for npc_id in npc_ids {
            if self.npc(*npc_id).is_some() {
                removed.push(self.remove_npc(*npc_id)?);
            }
        }
        Ok(removed)
    }

    /// Change an NPC's status, recording the transition.
    pub(crate) fn set_npc_status(&mut self, npc_id: NpcId, status: NpcStatus) {
        let Ok(npc) = self.npc_mut(npc_id) else {
            return;
        };
        let from = npc.status;
        if from == status {
            return;
        }
        npc.status = status;
        self.record(Effect::NpcStatusChanged {
            npc_id,
            from,
            to: status,
        });
    }

    pub fn equip_item(&mut self, npc_id: NpcId, item_id: ItemId) -> Result<(), NpcError> {
        let item_name = self
            .item(item_id)
            .map(|i| i.name.clone())
            .ok_or(NpcError::ItemNotFound(item_id))?;
        if self.npc(npc_id).is_none() {
            return Err(NpcError::NotFound(npc_id));
        }

        self.unequip_item(npc_id)?;

        let npc = self.npc_mut(npc_id)?;
        npc.equipped_item = Some(item_id);
        let npc_name = npc.name.clone();

        self.log_activity(format!("{npc_name} equipped {item_name}"));
        self.record(Effect::ItemEquipped { npc_id, item_id });
        self.recalculate_tech_expertise();
        Ok(())
    }

    /// Take off whatever the NPC carries. Returns the removed item, if any.
    pub fn unequip_item(&mut self, npc_id: NpcId) -> Result<Option<ItemId>, NpcError> {
        let npc = self.npc_mut(npc_id)?;
        let Some(item_id) = npc.equipped_item.take() else {
            return Ok(None);
        };
        let npc_name = npc.name.clone();

        if let Some(item_name) = self.item(item_id).map(|i| i.name.clone()) {
            self.log_activity(format!("{npc_name} unequipped {item_name}"));
        }
        self.record(Effect::ItemUnequipped { npc_id, item_id });
        self.recalculate_tech_expertise();
        Ok(Some(item_id))
    }

    /// Base stats plus the equipped item's bonuses.
    pub fn effective_stats(&self, npc_id: NpcId) -> Option<NpcStats> {
        let npc = self.npc(npc_id)?;
        let bonus = npc
            .equipped_item
            .and_then(|item_id| self.item(item_id))
            .map(|item| npc.stats.with_bonuses(&item.bonus));
        Some(bonus.unwrap_or(npc.stats))
    }

    /// Sum of effective tech across available and deployed NPCs.
    pub fn total_tech_expertise(&self) -> u64 {
        self.npcs
            .iter()
            .filter(|n| n.status.is_active())
            .filter_map(|n| self.effective_stats(n.id))
            .map(|s| s.tech as u64)
            .sum()
    }

    /// Write the roster's tech total into the ledger.
    pub fn recalculate_tech_expertise(&mut self) {
        let total = self.total_tech_expertise();
        self.set_resource(Resource::TechnicalExpertise, total as i64);
    }

    /// Add injury (capped at 5). Badly hurt available NPCs go off duty.
    pub fn injure_npc(&mut self, npc_id: NpcId, amount: u8) -> Result<(), NpcError> {
        let npc = self.npc_mut(npc_id)?;
        npc.injury = npc.injury.saturating_add(amount).min(MAX_INJURY);
        let injury = npc.injury;
        let name = npc.name.clone();
        let sideline = injury >= INJURED_THRESHOLD && npc.status == NpcStatus::Available;

        if sideline {
            self.set_npc_status(npc_id, NpcStatus::Injured);
        }
        self.log_activity(format!("{name} injured (injury level: {injury})"));
        self.record(Effect::NpcUpdated { npc_id });
        self.recalculate_tech_expertise();
        Ok(())
    }

    /// Reduce injury and stress. Recovered NPCs return to duty.
    pub fn heal_npc(&mut self, npc_id: NpcId, amount: u8) -> Result<(), NpcError> {
        let npc = self.npc_mut(npc_id)?;
        npc.injury = npc.injury.saturating_sub(amount);
        npc.stress = npc.stress.saturating_sub(amount);
        let (injury, stress) = (npc.injury, npc.stress);
        let name = npc.name.clone();
        let recovered = injury < INJURED_THRESHOLD && npc.status == NpcStatus::Injured;

        if recovered {
            self.set_npc_status(npc_id, NpcStatus::Available);
        }
        self.log_activity(format!("{name} healed (injury: {injury}, stress: {stress})"));
        self.record(Effect::NpcUpdated { npc_id });
        self.recalculate_tech_expertise();
        Ok(())
    }

    /// One pass of natural recovery. Returns how many NPCs improved.
    pub fn process_npc_healing(&mut self, rng: &mut impl Rng) -> usize {
        let hurt: Vec<_> = self
            .npcs
            .iter()
            .filter(|n| n.is_hurt() && n.status != NpcStatus::Dead)
            .map(|n| (n.id, n.injury > 0))
            .collect();

        let mut improved = 0;
        for (npc_id, injured) in hurt {
            if !rng.gen_bool(HEALING_CHANCE) {
                continue;
            }

            if injured {
                if self.heal_npc(npc_id, 1).is_ok() {
                    improved += 1;
                }
            } else if let Ok(npc) = self.npc_mut(npc_id) {
                npc.stress = npc.stress.saturating_sub(1);
                self.record(Effect::NpcUpdated { npc_id });
                improved += 1;
            }
        }

        if improved > 0 {
            tracing::debug!(improved, "NPC healing pass");
        }
        improved
    }

    pub fn npc_statistics(&self) -> NpcStatistics {
        let total = self.npcs.len();

        let mut by_status = BTreeMap::new();
        for npc in &self.npcs {
            *by_status.entry(npc.status).or_insert(0) += 1;
        }

        let mut average_stats = BTreeMap::new();
        if total > 0 {
            for stat in Stat::all() {
                let sum: u32 = self.npcs.iter().map(|n| n.stats.get(stat) as u32).sum();
                let average = (sum as f64 / total as f64 * 100.0).round() / 100.0;
                average_stats.insert(stat, average);
            }
        }

        let average_loyalty = if total > 0 {
            let sum: u32 = self.npcs.iter().map(|n| n.loyalty as u32).sum();
            (sum as f64 / total as f64).round() as u32
        } else {
            0
        };

        NpcStatistics {
            total,
            by_status,
            average_stats,
            total_tech_expertise: self.total_tech_expertise(),
            average_loyalty,
            injured: self.npcs.iter().filter(|n| n.injury > 0).count(),
            stressed: self.npcs.iter().filter(|n| n.stress > 0).count(),
        }
    }

    pub fn export_npcs(&self) -> NpcBackup {
        NpcBackup {
            npcs: self.npcs.clone(),
            items: self.items.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Replace the roster from a backup. Nothing changes unless every NPC
    /// in the backup is valid.
    pub fn import_npcs(&mut self, backup: NpcBackup) -> Result<(), NpcError> {
        for npc in &backup.npcs {
            npc.validate()?;
        }

        self.npcs = backup.npcs;
        if !backup.items.is_empty() {
            self.items = backup.items;
        }

        self.log_activity("NPCs imported from backup");
        self.recalculate_tech_expertise();
        Ok(())
    }
}
