//! Mission board.
//!
//! Missions move `available → in-progress → completed | failed`. Assigning a
//! mission deploys its NPCs and estimates a completion time; resolving it
//! pays out scaled rewards and applies consequences to the team.

use crate::events::Effect;
use crate::npcs::{NpcStatus, MAX_INJURY, MAX_LOYALTY, MAX_STRESS};
use crate::resources::{Resource, ResourceMap};
use crate::state::{GameState, MissionId, NpcId};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MIN_TITLE_LEN: usize = 3;
pub const MAX_TITLE_LEN: usize = 100;
pub const MIN_DESCRIPTION_LEN: usize = 10;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// Assignments running longer than this are auto-resolved as partial.
pub const MAX_MISSION_DAYS: i64 = 7;

/// Used when a type/difficulty pair has no entry in the duration table.
pub const DEFAULT_BASE_HOURS: f64 = 48.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MissionError {
    #[error("Mission not found")]
    NotFound(MissionId),

    #[error("Mission assignment not found")]
    AssignmentNotFound(MissionId),

    #[error("Mission is not available for assignment")]
    NotAvailable,

    #[error("Mission must be assigned to player or NPCs")]
    NoAssignees,

    #[error("NPC with ID {0} not found")]
    NpcNotFound(NpcId),

    #[error("NPC {name} is not available")]
    NpcUnavailable { name: String },

    #[error("NPC with ID {0} is listed more than once")]
    DuplicateNpc(NpcId),

    #[error("Invalid mission title")]
    InvalidTitle,

    #[error("Invalid mission description")]
    InvalidDescription,

    #[error("Invalid mission type: {0}")]
    InvalidType(String),

    #[error("Invalid outcome: {0}")]
    InvalidOutcome(String),

    #[error("No completed missions to clear")]
    NothingToClear,
}

// ============================================================================
// Classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MissionType {
    Stealth,
    Combat,
    Tech,
    Social,
    Research,
    Mixed,
}

impl MissionType {
    pub fn all() -> [MissionType; 6] {
        [
            MissionType::Stealth,
            MissionType::Combat,
            MissionType::Tech,
            MissionType::Social,
            MissionType::Research,
            MissionType::Mixed,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            MissionType::Stealth => "Stealth",
            MissionType::Combat => "Combat",
            MissionType::Tech => "Tech",
            MissionType::Social => "Social",
            MissionType::Research => "Research",
            MissionType::Mixed => "Mixed",
        }
    }
}

impl Default for MissionType {
    fn default() -> Self {
        MissionType::Mixed
    }
}

impl fmt::Display for MissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for MissionType {
    type Err = MissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MissionType::all()
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| MissionError::InvalidType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Extreme,
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissionStatus {
    Available,
    InProgress,
    Completed,
    Failed,
}

impl MissionStatus {
    pub fn name(&self) -> &'static str {
        match self {
            MissionStatus::Available => "available",
            MissionStatus::InProgress => "in-progress",
            MissionStatus::Completed => "completed",
            MissionStatus::Failed => "failed",
        }
    }

    /// Completed and failed missions are finished.
    pub fn is_finished(&self) -> bool {
        matches!(self, MissionStatus::Completed | MissionStatus::Failed)
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How a resolved mission went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Failure,
    Partial,
    Success,
    Perfect,
}

impl Outcome {
    /// Scale applied to the mission's listed rewards.
    pub fn multiplier(&self) -> f64 {
        match self {
            Outcome::Failure => 0.0,
            Outcome::Partial => 0.5,
            Outcome::Success => 1.0,
            Outcome::Perfect => 1.5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Failure => "Failure",
            Outcome::Partial => "Partial",
            Outcome::Success => "Success",
            Outcome::Perfect => "Perfect",
        }
    }

    fn is_success(&self) -> bool {
        matches!(self, Outcome::Success | Outcome::Perfect)
    }
}

impl FromStr for Outcome {
    type Err = MissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "failure" => Ok(Outcome::Failure),
            "partial" => Ok(Outcome::Partial),
            "success" => Ok(Outcome::Success),
            "perfect" => Ok(Outcome::Perfect),
            other => Err(MissionError::InvalidOutcome(other.to_string())),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Filled in when a mission is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionCompletion {
    pub outcome: Outcome,
    pub notes: String,
    pub applied_rewards: ResourceMap,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub mission_type: MissionType,
    pub difficulty: Difficulty,
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    pub status: MissionStatus,
    #[serde(default)]
    pub rewards: ResourceMap,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completion: Option<MissionCompletion>,
}

/// Who is working a mission and when it should wrap up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionAssignment {
    pub mission_id: MissionId,
    pub assigned_npcs: Vec<NpcId>,
    pub player_doing: bool,
    pub assigned_by: String,
    pub start_time: DateTime<Utc>,
    pub estimated_completion: DateTime<Utc>,
}

/// Input for a new mission.
#[derive(Debug, Clone)]
pub struct MissionDraft {
    pub title: String,
    pub description: String,
    pub mission_type: MissionType,
    pub difficulty: Difficulty,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub rewards: ResourceMap,
}

impl MissionDraft {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        mission_type: MissionType,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            mission_type,
            difficulty: Difficulty::default(),
            priority: Priority::default(),
            tags: Vec::new(),
            rewards: ResourceMap::new(),
        }
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Zero rewards are dropped.
    pub fn with_reward(mut self, resource: Resource, amount: u64) -> Self {
        if amount > 0 {
            self.rewards.insert(resource, amount);
        }
        self
    }
}

/// Who should take a mission.
#[derive(Debug, Clone, Default)]
pub struct AssignmentRequest {
    pub npcs: Vec<NpcId>,
    pub player_doing: bool,
    pub assigned_by: String,
}

impl AssignmentRequest {
    pub fn player() -> Self {
        Self {
            player_doing: true,
            ..Self::default()
        }
    }

    pub fn npcs(npcs: Vec<NpcId>) -> Self {
        Self {
            npcs,
            ..Self::default()
        }
    }

    pub fn with_player(mut self) -> Self {
        self.player_doing = true;
        self
    }

    pub fn by(mut self, username: impl Into<String>) -> Self {
        self.assigned_by = username.into();
        self
    }
}

/// What a resolution paid out.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionResolution {
    pub mission_id: MissionId,
    pub outcome: Outcome,
    pub rewards: ResourceMap,
}

/// Counts for the mission board header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionStatistics {
    pub total: usize,
    pub available: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub success_rate: u32,
}

// ============================================================================
// Helpers
// ============================================================================

/// Trim, cut to `max_chars` and strip angle brackets.
pub fn sanitize_text(input: &str, max_chars: usize) -> String {
    input
        .trim()
        .chars()
        .take(max_chars)
        .filter(|c| *c != '<' && *c != '>')
        .collect()
}

/// Hours a mission takes before any team modifiers.
pub fn base_hours(mission_type: MissionType, difficulty: Difficulty) -> f64 {
    use Difficulty::*;
    use MissionType::*;

    let table: [f64; 4] = match mission_type {
        Stealth => [24.0, 48.0, 72.0, 96.0],
        Combat => [12.0, 24.0, 48.0, 72.0],
        Tech => [36.0, 72.0, 120.0, 168.0],
        Social => [18.0, 36.0, 72.0, 120.0],
        Research => [48.0, 96.0, 168.0, 240.0],
        Mixed => [24.0, 48.0, 96.0, 144.0],
    };

    let column = match difficulty {
        Easy => 0,
        Medium => 1,
        Hard => 2,
        Extreme => 3,
    };
    table.get(column).copied().unwrap_or(DEFAULT_BASE_HOURS)
}

/// Expected finish time for a team starting at `start`.
///
/// The player works 20% faster; each NPC shaves 10% off, up to 50%. Never
/// less than an hour.
pub fn estimated_completion(
    mission: &Mission,
    player_doing: bool,
    npc_count: usize,
    start: DateTime<Utc>,
) -> DateTime<Utc> {
    let mut modifier = 1.0;
    if player_doing {
        modifier *= 0.8;
    }
    if npc_count > 0 {
        let npc_bonus = (npc_count as f64 * 0.1).min(0.5);
        modifier *= 1.0 - npc_bonus;
    }

    let hours = (base_hours(mission.mission_type, mission.difficulty) * modifier).max(1.0);
    start + Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

/// Listed rewards scaled by the outcome, rounded down.
pub fn calculate_rewards(mission: &Mission, outcome: Outcome) -> ResourceMap {
    let multiplier = outcome.multiplier();
    if multiplier <= 0.0 {
        return ResourceMap::new();
    }

    mission
        .rewards
        .iter()
        .map(|(resource, amount)| (*resource, (*amount as f64 * multiplier).floor() as u64))
        .collect()
}

/// Render rewards as `🥈50 💎2`.
pub fn format_rewards(rewards: &ResourceMap) -> String {
    rewards
        .iter()
        .map(|(resource, amount)| format!("{}{}", resource.icon(), amount))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Board operations
// ============================================================================

impl GameState {
    pub fn mission(&self, mission_id: MissionId) -> Option<&Mission> {
        self.missions.iter().find(|m| m.id == mission_id)
    }

    pub fn mission_assignment(&self, mission_id: MissionId) -> Option<&MissionAssignment> {
        self.mission_assignments
            .iter()
            .find(|a| a.mission_id == mission_id)
    }

    pub fn create_mission(
        &mut self,
        draft: MissionDraft,
        created_by: &str,
    ) -> Result<MissionId, MissionError> {
        let title = sanitize_text(&draft.title, MAX_TITLE_LEN);
        if title.chars().count() < MIN_TITLE_LEN {
            return Err(MissionError::InvalidTitle);
        }

        let description = sanitize_text(&draft.description, MAX_DESCRIPTION_LEN);
        if description.chars().count() < MIN_DESCRIPTION_LEN {
            return Err(MissionError::InvalidDescription);
        }

        let mission = Mission {
            id: MissionId::new(),
            title,
            description,
            mission_type: draft.mission_type,
            difficulty: draft.difficulty,
            priority: draft.priority,
            tags: draft.tags,
            status: MissionStatus::Available,
            rewards: draft.rewards.into_iter().filter(|(_, a)| *a > 0).collect(),
            created_by: created_by.to_string(),
            created_at: Utc::now(),
            completion: None,
        };

        let id = mission.id;
        self.log_activity(format!("New mission created: {}", mission.title));
        self.record(Effect::MissionCreated {
            mission_id: id,
            title: mission.title.clone(),
        });
        self.missions.push(mission);

        tracing::info!(mission_id = %id, "Mission created");
        Ok(id)
    }

    fn set_mission_status(&mut self, mission_id: MissionId, status: MissionStatus) {
        let Some(mission) = self.missions.iter_mut().find(|m| m.id == mission_id) else {
            return;
        };
        let from = mission.status;
        if from == status {
            return;
        }
        mission.status = status;
        self.record(Effect::MissionStatusChanged {
            mission_id,
            from,
            to: status,
        });
    }

    /// Put the player and/or NPCs on a mission.
    pub fn assign_mission(
        &mut self,
        mission_id: MissionId,
        request: AssignmentRequest,
        now: DateTime<Utc>,
    ) -> Result<&MissionAssignment, MissionError> {
        let mission = self
            .mission(mission_id)
            .ok_or(MissionError::NotFound(mission_id))?;
        if mission.status != MissionStatus::Available {
            return Err(MissionError::NotAvailable);
        }
        if !request.player_doing && request.npcs.is_empty() {
            return Err(MissionError::NoAssignees);
        }
        let mut seen = BTreeSet::new();
        for npc_id in &request.npcs {
            if !seen.insert(*npc_id) {
                return Err(MissionError::DuplicateNpc(*npc_id));
            }
            let npc = self
                .npc(*npc_id)
                .ok_or(MissionError::NpcNotFound(*npc_id))?;
            if npc.status != NpcStatus::Available {
                return Err(MissionError::NpcUnavailable {
                    name: npc.name.clone(),
                });
            }
        }

        let estimated = estimated_completion(mission, request.player_doing, request.npcs.len(), now);
        let title = mission.title.clone();
        let assigned_by = if request.assigned_by.is_empty() {
            "system".to_string()
        } else {
            request.assigned_by
        };

        let assignment = MissionAssignment {
            mission_id,
            assigned_npcs: request.npcs,
            player_doing: request.player_doing,
            assigned_by,
            start_time: now,
            estimated_completion: estimated,
        };

        self.set_mission_status(mission_id, MissionStatus::InProgress);
        for npc_id in &assignment.assigned_npcs {
            self.set_npc_status(*npc_id, NpcStatus::Deployed);
        }

        let who = if assignment.player_doing {
            "(by player)".to_string()
        } else {
            format!("(NPCs: {})", assignment.assigned_npcs.len())
        };
        self.log_activity_at(format!("Mission assigned: {title} {who}"), now);

        self.mission_assignments.push(assignment);
        self.recalculate_tech_expertise();

        let index = self.mission_assignments.len() - 1;
        Ok(&self.mission_assignments[index])
    }

    /// Close out an in-progress mission.
    pub fn resolve_mission(
        &mut self,
        mission_id: MissionId,
        outcome: Outcome,
        notes: &str,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Result<MissionResolution, MissionError> {
        let mission = self
            .mission(mission_id)
            .ok_or(MissionError::NotFound(mission_id))?;
        let position = self
            .mission_assignments
            .iter()
            .position(|a| a.mission_id == mission_id)
            .ok_or(MissionError::AssignmentNotFound(mission_id))?;

        let rewards = calculate_rewards(mission, outcome);
        let title = mission.title.clone();
        let assignment = self.mission_assignments.remove(position);

        if !rewards.is_empty() {
            self.award_resources(&rewards, &format!("Mission: {title}"));
        }

        for npc_id in &assignment.assigned_npcs {
            self.apply_npc_consequences(*npc_id, outcome, rng);
        }
        if assignment.player_doing {
            self.log_activity_at(
                format!(
                    "Player participated in mission: {title} ({})",
                    outcome.name().to_lowercase()
                ),
                now,
            );
        }

        let status = if outcome == Outcome::Failure {
            MissionStatus::Failed
        } else {
            MissionStatus::Completed
        };
        self.set_mission_status(mission_id, status);

        for npc_id in &assignment.assigned_npcs {
            self.set_npc_status(*npc_id, NpcStatus::Available);
        }

        if let Some(mission) = self.missions.iter_mut().find(|m| m.id == mission_id) {
            mission.completion = Some(MissionCompletion {
                outcome,
                notes: notes.to_string(),
                applied_rewards: rewards.clone(),
                completed_at: now,
            });
        }

        let summary = format_rewards(&rewards);
        self.log_activity_at(
            format!("Mission resolved: {title} - {} ({summary})", outcome.name()),
            now,
        );
        self.record(Effect::MissionResolved {
            mission_id,
            outcome,
            rewards: rewards.clone(),
        });
        self.recalculate_tech_expertise();

        tracing::info!(mission_id = %mission_id, outcome = outcome.name(), "Mission resolved");
        Ok(MissionResolution {
            mission_id,
            outcome,
            rewards,
        })
    }

    fn apply_npc_consequences(&mut self, npc_id: NpcId, outcome: Outcome, rng: &mut impl Rng) {
        let Ok(npc) = self.npc_mut(npc_id) else {
            return;
        };

        match outcome {
            Outcome::Failure => {
                npc.stress = (npc.stress + 2).min(MAX_STRESS);
                if rng.gen_bool(0.3) {
                    npc.injury = (npc.injury + 1).min(MAX_INJURY);
                }
            }
            Outcome::Partial => {
                npc.stress = (npc.stress + 1).min(MAX_STRESS);
            }
            Outcome::Success | Outcome::Perfect => {
                if rng.gen_bool(0.2) {
                    npc.loyalty = (npc.loyalty + 1).min(MAX_LOYALTY);
                }
            }
        }

        if outcome.is_success() {
            npc.missions_completed += 1;
        }
        self.record(Effect::NpcUpdated { npc_id });
    }

    /// Missions matching both filters. `None` matches everything.
    pub fn filter_missions(
        &self,
        mission_type: Option<MissionType>,
        status: Option<MissionStatus>,
    ) -> Vec<&Mission> {
        self.missions
            .iter()
            .filter(|m| mission_type.map_or(true, |t| m.mission_type == t))
            .filter(|m| status.map_or(true, |s| m.status == s))
            .collect()
    }

    pub fn available_missions(&self) -> Vec<&Mission> {
        self.filter_missions(None, Some(MissionStatus::Available))
    }

    pub fn active_missions(&self) -> Vec<&Mission> {
        self.filter_missions(None, Some(MissionStatus::InProgress))
    }

    /// Completed missions followed by failed ones.
    pub fn completed_missions(&self) -> Vec<&Mission> {
        let mut finished = self.filter_missions(None, Some(MissionStatus::Completed));
        finished.extend(self.filter_missions(None, Some(MissionStatus::Failed)));
        finished
    }

    /// Drop every finished mission. Returns how many went.
    pub fn clear_completed_missions(&mut self) -> Result<usize, MissionError> {
        let count = self
            .missions
            .iter()
            .filter(|m| m.status.is_finished())
            .count();
        if count == 0 {
            return Err(MissionError::NothingToClear);
        }

        let cleared: Vec<_> = self
            .missions
            .iter()
            .filter(|m| m.status.is_finished())
            .map(|m| m.id)
            .collect();
        self.missions.retain(|m| !m.status.is_finished());
        for mission_id in cleared {
            self.record(Effect::MissionRemoved { mission_id });
        }

        self.log_activity(format!("{count} completed missions cleared"));
        Ok(count)
    }

    /// Delete a mission, standing down anyone working it.
    pub fn remove_mission(&mut self, mission_id: MissionId) -> Result<Mission, MissionError> {
        let index = self
            .missions
            .iter()
            .position(|m| m.id == mission_id)
            .ok_or(MissionError::NotFound(mission_id))?;

        if let Some(position) = self
            .mission_assignments
            .iter()
            .position(|a| a.mission_id == mission_id)
        {
            let assignment = self.mission_assignments.remove(position);
            for npc_id in assignment.assigned_npcs {
                self.set_npc_status(npc_id, NpcStatus::Available);
            }
            self.recalculate_tech_expertise();
        }

        let mission = self.missions.remove(index);
        self.log_activity(format!("Mission removed: {}", mission.title));
        self.record(Effect::MissionRemoved { mission_id });
        Ok(mission)
    }

    /// Auto-resolve assignments older than seven days as partial successes.
    pub fn cleanup_expired_missions(
        &mut self,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Vec<MissionId> {
        let limit = Duration::days(MAX_MISSION_DAYS);
        let expired: Vec<_> = self
            .mission_assignments
            .iter()
            .filter(|a| now - a.start_time > limit)
            .map(|a| a.mission_id)
            .collect();

        let mut resolved = Vec::new();
        for mission_id in expired {
            tracing::warn!(mission_id = %mission_id, "Auto-resolving expired mission");
            match self.resolve_mission(
                mission_id,
                Outcome::Partial,
                "Auto-resolved due to time limit",
                now,
                rng,
            ) {
                Ok(_) => resolved.push(mission_id),
                Err(e) => {
                    tracing::warn!(mission_id = %mission_id, error = %e, "Failed to auto-resolve mission")
                }
            }
        }
        resolved
    }

    /// Pull an NPC off every assignment. Missions left with nobody working
    /// them go back on the board.
    pub(crate) fn release_npc_from_missions(&mut self, npc_id: NpcId) {
        let mut orphaned = Vec::new();
        for assignment in &mut self.mission_assignments {
            let before = assignment.assigned_npcs.len();
            assignment.assigned_npcs.retain(|id| *id != npc_id);
            if assignment.assigned_npcs.len() != before
                && assignment.assigned_npcs.is_empty()
                && !assignment.player_doing
            {
                orphaned.push(assignment.mission_id);
            }
        }

        for mission_id in orphaned {
            self.mission_assignments
                .retain(|a| a.mission_id != mission_id);
            self.set_mission_status(mission_id, MissionStatus::Available);
        }
    }

    pub fn mission_statistics(&self) -> MissionStatistics {
        let count = |status| self.missions.iter().filter(|m| m.status == status).count();
        MissionStatistics {
            total: self.missions.len(),
            available: count(MissionStatus::Available),
            in_progress: count(MissionStatus::InProgress),
            completed: count(MissionStatus::Completed),
            failed: count(MissionStatus::Failed),
            success_rate: self.mission_success_rate(),
        }
    }

    /// Percentage of finished missions that succeeded, rounded.
    pub fn mission_success_rate(&self) -> u32 {
        let completed = self
            .missions
            .iter()
            .filter(|m| m.status == MissionStatus::Completed)
            .count();
        let failed = self
            .missions
            .iter()
            .filter(|m| m.status == MissionStatus::Failed)
            .count();

        let total = completed + failed;
        if total == 0 {
            return 0;
        }
        (completed as f64 / total as f64 * 100.0).round() as u32
    }

    /// Missions per type, for the board filters.
    pub fn missions_by_type(&self) -> BTreeMap<MissionType, usize> {
        let mut counts = BTreeMap::new();
        for mission in &self.missions {
            *counts.entry(mission.mission_type).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npcs::NpcTemplate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(3)
    }

    fn draft() -> MissionDraft {
        MissionDraft::new(
            "Recover the Archive",
            "Slip into the drowned library and bring back the index.",
            MissionType::Stealth,
        )
        .with_reward(Resource::CelestialSilver, 50)
        .with_reward(Resource::RunicShards, 3)
    }

    fn board() -> (GameState, MissionId, NpcId) {
        let mut state = GameState::default();
        let mission_id = state.create_mission(draft(), "gm").unwrap();
        let npc_id = state
            .create_npc(NpcTemplate::named("Kade Voss"), &mut rng())
            .unwrap();
        (state, mission_id, npc_id)
    }

    #[test]
    fn test_multiplier_table() {
        assert_eq!(Outcome::Failure.multiplier(), 0.0);
        assert_eq!(Outcome::Partial.multiplier(), 0.5);
        assert_eq!(Outcome::Success.multiplier(), 1.0);
        assert_eq!(Outcome::Perfect.multiplier(), 1.5);
    }

    #[test]
    fn test_title_is_sanitized() {
        let mut state = GameState::default();
        let id = state
            .create_mission(
                MissionDraft::new(
                    "  <b>Night Raid</b> ",
                    "Hit the depot before dawn.",
                    MissionType::Combat,
                ),
                "gm",
            )
            .unwrap();
        assert_eq!(state.mission(id).unwrap().title, "bNight Raid/b");
    }

    #[test]
    fn test_long_title_is_truncated() {
        let mut state = GameState::default();
        let id = state
            .create_mission(
                MissionDraft::new("x".repeat(150), "A description long enough.", MissionType::Tech),
                "gm",
            )
            .unwrap();
        assert_eq!(state.mission(id).unwrap().title.len(), MAX_TITLE_LEN);
    }

    #[test]
    fn test_invalid_text_rejected() {
        let mut state = GameState::default();
        let short_title = MissionDraft::new("<>a", "A description long enough.", MissionType::Tech);
        assert_eq!(
            state.create_mission(short_title, "gm"),
            Err(MissionError::InvalidTitle)
        );

        let short_description = MissionDraft::new("Proper title", "too short", MissionType::Tech);
        assert_eq!(
            state.create_mission(short_description, "gm"),
            Err(MissionError::InvalidDescription)
        );
        assert!(state.missions.is_empty());
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert_eq!(
            "Heist".parse::<MissionType>(),
            Err(MissionError::InvalidType("Heist".to_string()))
        );
        assert_eq!("Research".parse::<MissionType>(), Ok(MissionType::Research));
    }

    #[test]
    fn test_assign_requires_someone() {
        let (mut state, mission_id, _) = board();
        let result = state.assign_mission(mission_id, AssignmentRequest::default(), Utc::now());
        assert_eq!(result.unwrap_err(), MissionError::NoAssignees);
    }

    #[test]
    fn test_assign_deploys_npcs() {
        let (mut state, mission_id, npc_id) = board();
        let now = Utc::now();

        let assignment = state
            .assign_mission(mission_id, AssignmentRequest::npcs(vec![npc_id]).by("jon"), now)
            .unwrap();
        assert_eq!(assignment.assigned_by, "jon");
        assert_eq!(assignment.start_time, now);

        assert_eq!(state.mission(mission_id).unwrap().status, MissionStatus::InProgress);
        assert_eq!(state.npc(npc_id).unwrap().status, NpcStatus::Deployed);

        // Second assignment is refused
        let again = state.assign_mission(mission_id, AssignmentRequest::player(), now);
        assert_eq!(again.unwrap_err(), MissionError::NotAvailable);
    }

    #[test]
    fn test_assign_unavailable_npc_rejected() {
        let (mut state, mission_id, npc_id) = board();
        state.injure_npc(npc_id, 3).unwrap();

        let result =
            state.assign_mission(mission_id, AssignmentRequest::npcs(vec![npc_id]), Utc::now());
        assert_eq!(
            result.unwrap_err(),
            MissionError::NpcUnavailable {
                name: "Kade Voss".to_string()
            }
        );
        assert_eq!(state.mission(mission_id).unwrap().status, MissionStatus::Available);
    }

    #[test]
    fn test_assign_repeated_npc_rejected() {
        let (mut state, mission_id, npc_id) = board();
        let now = Utc::now();

        let result = state.assign_mission(mission_id, AssignmentRequest::npcs(vec![npc_id; 5]), now);
        assert_eq!(result.unwrap_err(), MissionError::DuplicateNpc(npc_id));
        assert_eq!(state.mission(mission_id).unwrap().status, MissionStatus::Available);
        assert_eq!(state.npc(npc_id).unwrap().status, NpcStatus::Available);

        // Listed once, the crew bonus is a single 10%: 48 * 0.9
        let assignment = state
            .assign_mission(mission_id, AssignmentRequest::npcs(vec![npc_id]), now)
            .unwrap();
        assert_eq!(assignment.assigned_npcs, vec![npc_id]);
        assert_eq!(
            assignment.estimated_completion - now,
            Duration::minutes(43 * 60 + 12)
        );
    }

    #[test]
    fn test_estimated_completion() {
        let (state, mission_id, _) = board();
        let mission = state.mission(mission_id).unwrap();
        let start = Utc::now();

        // Stealth/Medium is 48h
        assert_eq!(
            estimated_completion(mission, false, 0, start) - start,
            Duration::hours(48)
        );
        // Player: 48 * 0.8 = 38.4h
        assert_eq!(
            estimated_completion(mission, true, 0, start) - start,
            Duration::minutes(38 * 60 + 24)
        );
        // NPC bonus caps at 50%
        assert_eq!(
            estimated_completion(mission, false, 9, start) - start,
            Duration::hours(24)
        );
    }

    #[test]
    fn test_estimate_never_below_one_hour() {
        let mission = Mission {
            id: MissionId::new(),
            title: "Quick".to_string(),
            description: "A very quick errand.".to_string(),
            mission_type: MissionType::Combat,
            difficulty: Difficulty::Easy,
            priority: Priority::Normal,
            tags: Vec::new(),
            status: MissionStatus::Available,
            rewards: ResourceMap::new(),
            created_by: "gm".to_string(),
            created_at: Utc::now(),
            completion: None,
        };
        let start = Utc::now();
        let finish = estimated_completion(&mission, true, 5, start);
        // 12 * 0.8 * 0.5 = 4.8h
        assert_eq!(finish - start, Duration::minutes(4 * 60 + 48));
        assert!(finish - start >= Duration::hours(1));
    }

    #[test]
    fn test_resolve_success_pays_full_rewards() {
        let (mut state, mission_id, npc_id) = board();
        let now = Utc::now();
        state
            .assign_mission(mission_id, AssignmentRequest::npcs(vec![npc_id]), now)
            .unwrap();
        let silver = state.resource(Resource::CelestialSilver);

        let resolution = state
            .resolve_mission(mission_id, Outcome::Success, "clean", now, &mut rng())
            .unwrap();

        assert_eq!(resolution.rewards.get(&Resource::CelestialSilver), Some(&50));
        assert_eq!(state.resource(Resource::CelestialSilver), silver + 50);

        let mission = state.mission(mission_id).unwrap();
        assert_eq!(mission.status, MissionStatus::Completed);
        assert_eq!(mission.completion.as_ref().unwrap().notes, "clean");

        let npc = state.npc(npc_id).unwrap();
        assert_eq!(npc.status, NpcStatus::Available);
        assert_eq!(npc.missions_completed, 1);
        assert!(state.mission_assignment(mission_id).is_none());
    }

    #[test]
    fn test_resolve_perfect_pays_half_again() {
        use rand::rngs::mock::StepRng;

        let (mut state, mission_id, npc_id) = board();
        let now = Utc::now();
        state
            .assign_mission(mission_id, AssignmentRequest::npcs(vec![npc_id]), now)
            .unwrap();
        let silver = state.resource(Resource::CelestialSilver);
        let shards = state.resource(Resource::RunicShards);
        let loyalty = state.npc(npc_id).unwrap().loyalty;

        // A zero roll always lands inside the 20% loyalty chance
        let mut lucky = StepRng::new(0, 0);
        let resolution = state
            .resolve_mission(mission_id, Outcome::Perfect, "flawless", now, &mut lucky)
            .unwrap();

        // 50 * 1.5 = 75, 3 * 1.5 = 4.5 -> 4
        assert_eq!(resolution.rewards.get(&Resource::CelestialSilver), Some(&75));
        assert_eq!(resolution.rewards.get(&Resource::RunicShards), Some(&4));
        assert_eq!(state.resource(Resource::CelestialSilver), silver + 75);
        assert_eq!(state.resource(Resource::RunicShards), shards + 4);

        let mission = state.mission(mission_id).unwrap();
        assert_eq!(mission.status, MissionStatus::Completed);
        assert_eq!(mission.completion.as_ref().unwrap().outcome, Outcome::Perfect);

        let npc = state.npc(npc_id).unwrap();
        assert_eq!(npc.loyalty, (loyalty + 1).min(MAX_LOYALTY));
        assert_eq!(npc.missions_completed, 1);
        assert_eq!(npc.stress, 0);
        assert_eq!(npc.status, NpcStatus::Available);
    }

    #[test]
    fn test_perfect_without_loyalty_roll() {
        use rand::rngs::mock::StepRng;

        let (mut state, mission_id, npc_id) = board();
        let now = Utc::now();
        state
            .assign_mission(mission_id, AssignmentRequest::npcs(vec![npc_id]), now)
            .unwrap();
        let loyalty = state.npc(npc_id).unwrap().loyalty;

        let mut unlucky = StepRng::new(u64::MAX, 0);
        state
            .resolve_mission(mission_id, Outcome::Perfect, "", now, &mut unlucky)
            .unwrap();

        let npc = state.npc(npc_id).unwrap();
        assert_eq!(npc.loyalty, loyalty);
        assert_eq!(npc.missions_completed, 1);
    }

    #[test]
    fn test_resolve_partial_floors_rewards() {
        let (mut state, mission_id, npc_id) = board();
        let now = Utc::now();
        state
            .assign_mission(mission_id, AssignmentRequest::npcs(vec![npc_id]), now)
            .unwrap();

        let resolution = state
            .resolve_mission(mission_id, Outcome::Partial, "", now, &mut rng())
            .unwrap();
        assert_eq!(resolution.rewards.get(&Resource::CelestialSilver), Some(&25));
        assert_eq!(resolution.rewards.get(&Resource::RunicShards), Some(&1));
        assert_eq!(state.npc(npc_id).unwrap().stress, 1);
    }

    #[test]
    fn test_resolve_failure() {
        let (mut state, mission_id, npc_id) = board();
        let now = Utc::now();
        state
            .assign_mission(mission_id, AssignmentRequest::npcs(vec![npc_id]), now)
            .unwrap();
        let silver = state.resource(Resource::CelestialSilver);

        let resolution = state
            .resolve_mission(mission_id, Outcome::Failure, "ambushed", now, &mut rng())
            .unwrap();

        assert!(resolution.rewards.is_empty());
        assert_eq!(state.resource(Resource::CelestialSilver), silver);
        assert_eq!(state.mission(mission_id).unwrap().status, MissionStatus::Failed);

        let npc = state.npc(npc_id).unwrap();
        assert_eq!(npc.stress, 2);
        assert!(npc.injury <= 1);
        assert_eq!(npc.missions_completed, 0);
    }

    #[test]
    fn test_resolve_without_assignment() {
        let (mut state, mission_id, _) = board();
        let result = state.resolve_mission(mission_id, Outcome::Success, "", Utc::now(), &mut rng());
        assert_eq!(result, Err(MissionError::AssignmentNotFound(mission_id)));
    }

    #[test]
    fn test_removing_npc_returns_mission_to_board() {
        let (mut state, mission_id, npc_id) = board();
        state
            .assign_mission(mission_id, AssignmentRequest::npcs(vec![npc_id]), Utc::now())
            .unwrap();

        state.remove_npc(npc_id).unwrap();

        assert!(state.mission_assignment(mission_id).is_none());
        assert_eq!(state.mission(mission_id).unwrap().status, MissionStatus::Available);
    }

    #[test]
    fn test_removing_npc_keeps_player_assignment() {
        let (mut state, mission_id, npc_id) = board();
        state
            .assign_mission(
                mission_id,
                AssignmentRequest::npcs(vec![npc_id]).with_player(),
                Utc::now(),
            )
            .unwrap();

        state.remove_npc(npc_id).unwrap();

        let assignment = state.mission_assignment(mission_id).unwrap();
        assert!(assignment.assigned_npcs.is_empty());
        assert!(assignment.player_doing);
        assert_eq!(state.mission(mission_id).unwrap().status, MissionStatus::InProgress);
    }

    #[test]
    fn test_cleanup_expired() {
        let (mut state, mission_id, npc_id) = board();
        let start = Utc::now();
        state
            .assign_mission(mission_id, AssignmentRequest::npcs(vec![npc_id]), start)
            .unwrap();

        let early = state.cleanup_expired_missions(start + Duration::days(6), &mut rng());
        assert!(early.is_empty());

        let resolved = state.cleanup_expired_missions(start + Duration::days(8), &mut rng());
        assert_eq!(resolved, vec![mission_id]);

        let mission = state.mission(mission_id).unwrap();
        assert_eq!(mission.status, MissionStatus::Completed);
        assert_eq!(mission.completion.as_ref().unwrap().outcome, Outcome::Partial);
    }

    #[test]
    fn test_clear_completed_and_success_rate() {
        let mut state = GameState::default();
        assert_eq!(state.clear_completed_missions(), Err(MissionError::NothingToClear));

        let now = Utc::now();
        let mut rng = rng();
        for outcome in [Outcome::Success, Outcome::Success, Outcome::Failure] {
            let id = state.create_mission(draft(), "gm").unwrap();
            state
                .assign_mission(id, AssignmentRequest::player(), now)
                .unwrap();
            state.resolve_mission(id, outcome, "", now, &mut rng).unwrap();
        }
        state.create_mission(draft(), "gm").unwrap();

        let stats = state.mission_statistics();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.available, 1);
        assert_eq!(stats.success_rate, 67);
        assert_eq!(state.completed_missions().len(), 3);

        assert_eq!(state.clear_completed_missions(), Ok(3));
        assert_eq!(state.missions.len(), 1);
    }

    #[test]
    fn test_remove_mission_frees_npcs() {
        let (mut state, mission_id, npc_id) = board();
        state
            .assign_mission(mission_id, AssignmentRequest::npcs(vec![npc_id]), Utc::now())
            .unwrap();

        state.remove_mission(mission_id).unwrap();
        assert!(state.missions.is_empty());
        assert!(state.mission_assignments.is_empty());
        assert_eq!(state.npc(npc_id).unwrap().status, NpcStatus::Available);
    }

    #[test]
    fn test_filter_and_format() {
        let (state, _, _) = board();
        assert_eq!(state.filter_missions(Some(MissionType::Stealth), None).len(), 1);
        assert!(state.filter_missions(Some(MissionType::Combat), None).is_empty());

        let mission = &state.missions[0];
        assert_eq!(format_rewards(&mission.rewards), "🥈50 💎3");
        assert_eq!(state.missions_by_type().get(&MissionType::Stealth), Some(&1));
    }
}
