//! Bastion sections: the static upgrade catalogue and each section's repair
//! lifecycle.
//!
//! A section starts `damaged`, is worked on by NPCs (`cleaning`), finishes as
//! `cleaned` and is then powered `online`. Upgrades can only be bought for
//! online sections. Within a path upgrades may be bought in any order.

use crate::events::Effect;
use crate::npcs::NpcStatus;
use crate::resources::Resource::{
    CelestialPower as Power, CelestialSilver as Silver, DivineEssence as Essence,
    RunicShards as Shards, TechnicalExpertise as Tech,
};
use crate::resources::{Resource, ResourceError, ResourceMap};
use crate::state::{GameState, NpcId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Hours a cleaning crew needs before any crew-size bonus.
pub const CLEANING_BASE_HOURS: f64 = 24.0;

/// Celestial power needed to bring a cleaned section online.
pub const BRING_ONLINE_COST: u64 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SectionError {
    #[error("Unknown section: {0}")]
    UnknownSection(String),

    #[error("No upgrade {index} on the {path} path of {section}")]
    UnknownUpgrade {
        section: SectionId,
        path: UpgradePath,
        index: usize,
    },

    #[error("{name} is already purchased")]
    AlreadyOwned { name: String },

    #[error("{section} is {condition}, not damaged")]
    NotDamaged {
        section: SectionId,
        condition: SectionCondition,
    },

    #[error("{section} is {condition}, not cleaned")]
    NotCleaned {
        section: SectionId,
        condition: SectionCondition,
    },

    #[error("Cleaning needs at least one NPC")]
    NoCrew,

    #[error("NPC with ID {0} not found")]
    NpcNotFound(NpcId),

    #[error("NPC {name} is not available")]
    NpcUnavailable { name: String },

    #[error("NPC with ID {0} is listed more than once")]
    DuplicateNpc(NpcId),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

// ============================================================================
// Identifiers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionId {
    Luminarium,
    Sanctum,
    Wards,
    Throne,
    Gateway,
    Fountain,
}

impl SectionId {
    pub fn all() -> [SectionId; 6] {
        [
            SectionId::Luminarium,
            SectionId::Sanctum,
            SectionId::Wards,
            SectionId::Throne,
            SectionId::Gateway,
            SectionId::Fountain,
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            SectionId::Luminarium => "luminarium",
            SectionId::Sanctum => "sanctum",
            SectionId::Wards => "wards",
            SectionId::Throne => "throne",
            SectionId::Gateway => "gateway",
            SectionId::Fountain => "fountain",
        }
    }

    /// The Luminarium powers everything else and comes online intact.
    pub fn starting_condition(&self) -> SectionCondition {
        match self {
            SectionId::Luminarium => SectionCondition::Online,
            _ => SectionCondition::Damaged,
        }
    }

    /// Catalogue entry for this section.
    pub fn info(&self) -> &'static SectionInfo {
        // The catalogue holds one entry per variant, in declaration order.
        &SECTIONS[*self as usize]
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for SectionId {
    type Err = SectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionId::all()
            .into_iter()
            .find(|id| id.id() == s)
            .ok_or_else(|| SectionError::UnknownSection(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionCondition {
    Damaged,
    Cleaning,
    Cleaned,
    Online,
}

impl fmt::Display for SectionCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionCondition::Damaged => "damaged",
            SectionCondition::Cleaning => "cleaning",
            SectionCondition::Cleaned => "cleaned",
            SectionCondition::Online => "online",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradePath {
    Research,
    Offensive,
    Defensive,
}

impl UpgradePath {
    pub fn all() -> [UpgradePath; 3] {
        [
            UpgradePath::Research,
            UpgradePath::Offensive,
            UpgradePath::Defensive,
        ]
    }
}

impl fmt::Display for UpgradePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpgradePath::Research => "research",
            UpgradePath::Offensive => "offensive",
            UpgradePath::Defensive => "defensive",
        };
        write!(f, "{name}")
    }
}

// ============================================================================
// Catalogue
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Upgrade {
    pub name: &'static str,
    pub description: &'static str,
    pub cost: ResourceMap,
}

impl Upgrade {
    fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            cost: ResourceMap::new(),
        }
    }

    fn cost(mut self, resource: Resource, amount: u64) -> Self {
        self.cost.insert(resource, amount);
        self
    }
}

#[derive(Debug, Clone)]
pub struct SectionInfo {
    pub id: SectionId,
    pub title: &'static str,
    pub description: &'static str,
    pub research: Vec<Upgrade>,
    pub offensive: Vec<Upgrade>,
    pub defensive: Vec<Upgrade>,
}

impl SectionInfo {
    pub fn path(&self, path: UpgradePath) -> &[Upgrade] {
        match path {
            UpgradePath::Research => &self.research,
            UpgradePath::Offensive => &self.offensive,
            UpgradePath::Defensive => &self.defensive,
        }
    }

    pub fn upgrade(&self, path: UpgradePath, index: usize) -> Option<&Upgrade> {
        self.path(path).get(index)
    }

    pub fn total_upgrades(&self) -> usize {
        self.research.len() + self.offensive.len() + self.defensive.len()
    }
}

lazy_static::lazy_static! {
    /// Every section with its three upgrade paths, in [`SectionId`] order.
    pub static ref SECTIONS: Vec<SectionInfo> = vec![
        SectionInfo {
            id: SectionId::Luminarium,
            title: "🏛️ Luminarium",
            description: "Main Power Generator",
            research: vec![
                Upgrade::new("Pulse Harmonization", "Increases efficiency of all other sections by 10% when fully operational. Also improves astral propulsion control.")
                    .cost(Power, 100).cost(Tech, 2),
                Upgrade::new("Celestial Mapping", "Tracks divine energy sources throughout the cosmos, identifying potential grace reservoirs and anomalies.")
                    .cost(Power, 150).cost(Shards, 3),
                Upgrade::new("Grace Recycling", "Recovers spent grace for reuse in critical systems, increasing operational duration between refueling.")
                    .cost(Power, 200).cost(Essence, 1),
            ],
            offensive: vec![
                Upgrade::new("Radiant Overcharge", "Once per day, release a radiant pulse that deals light damage to all enemies within the Bastion.")
                    .cost(Power, 120).cost(Silver, 50),
                Upgrade::new("Focused Beam", "Channel concentrated energy into a devastating attack against a single target, effective against heavily shielded foes.")
                    .cost(Power, 180).cost(Shards, 4),
                Upgrade::new("Grace Storm", "Create a field of wild grace energy that disrupts magical effects and damages corrupt entities.")
                    .cost(Power, 250).cost(Essence, 2),
            ],
            defensive: vec![
                Upgrade::new("Failsafe Core", "Prevents total Bastion failure once per major event, triggering a temporary energy field protecting all sections.")
                    .cost(Power, 200).cost(Tech, 3),
                Upgrade::new("Adaptive Shielding", "Automatically adjusts defenses based on the nature of incoming threats, offering optimal protection.")
                    .cost(Power, 300).cost(Shards, 5),
                Upgrade::new("Dimensional Anchor", "Prevents forced translocation of the Bastion by hostile entities, ensuring strategic position control.")
                    .cost(Power, 400).cost(Essence, 3),
            ],
        },
        SectionInfo {
            id: SectionId::Sanctum,
            title: "⛪ Sanctum",
            description: "Purification & Spiritual Focus",
            research: vec![
                Upgrade::new("Soul Resonance Mapping", "Grants insight into corrupted items or beings, enabling better exorcism or artifact cleansing.")
                    .cost(Power, 80).cost(Essence, 1),
                Upgrade::new("Divine Communion", "Establish temporary communication with higher divine powers for guidance on critical matters.")
                    .cost(Power, 150).cost(Essence, 2),
                Upgrade::new("Ethereal Perception", "Detect spiritual anomalies across dimensional boundaries, providing early warning of threats.")
                    .cost(Power, 200).cost(Shards, 3),
            ],
            offensive: vec![
                Upgrade::new("Judgment Flare", "Empower allies to deal radiant damage when fighting corrupted foes. Can also blind nearby threats.")
                    .cost(Power, 100).cost(Silver, 40),
                Upgrade::new("Banishment Wave", "Force extraplanar entities back to their native dimensions, effective against invading forces.")
                    .cost(Power, 180).cost(Essence, 2),
                Upgrade::new("Purifying Flame", "Create weapons of pure spiritual energy that bypass physical defenses.")
                    .cost(Power, 250).cost(Essence, 3),
            ],
            defensive: vec![
                Upgrade::new("Sacred Veil", "Aura around the Sanctum slowly purifies corruption in adjacent areas.")
                    .cost(Power, 120).cost(Shards, 2),
                Upgrade::new("Spiritual Barrier", "Block attempts at spiritual invasion or possession, protecting inhabitants from psychic attacks.")
                    .cost(Power, 200).cost(Essence, 2),
                Upgrade::new("Blessing of Protection", "Grant allies temporary immunity to specific types of corruption or negative energy.")
                    .cost(Power, 300).cost(Essence, 4),
            ],
        },
        SectionInfo {
            id: SectionId::Wards,
            title: "🛡️ Wards",
            description: "Defensive Matrix",
            research: vec![
                Upgrade::new("Sigil Scripting", "Inscribe temporary protective runes before dangerous missions, adding protection to allies.")
                    .cost(Power, 90).cost(Tech, 2),
                Upgrade::new("Breach Analysis", "When wards are compromised, gain perfect understanding of the method used, preventing future breaches.")
                    .cost(Power, 160).cost(Shards, 3),
                Upgrade::new("Reactive Mathematics", "Defensive formulas that adapt to new threats, gradually becoming more effective against recurring enemies.")
                    .cost(Power, 220).cost(Tech, 4),
            ],
            offensive: vec![
                Upgrade::new("Heaven's Volley", "Install celestial cannon arrays on the Bastion. Can be fired once per day to target incoming threats.")
                    .cost(Power, 150).cost(Silver, 60),
                Upgrade::new("Counter-Sigils", "When defensive wards are struck, they reflect a portion of the attack back at the source.")
                    .cost(Power, 200).cost(Shards, 4),
                Upgrade::new("Binding Protocols", "Create temporary fields that restrict movement and abilities of hostile entities within range.")
                    .cost(Power, 280).cost(Essence, 2),
            ],
            defensive: vec![
                Upgrade::new("Layered Shielding", "Enhances physical and magical ward structures, increasing durability against siege effects.")
                    .cost(Power, 140).cost(Tech, 3),
                Upgrade::new("Phasing Barriers", "Defenses exist partially out of phase, making them harder to target and destroy.")
                    .cost(Power, 220).cost(Shards, 5),
                Upgrade::new("Bastion Memory", "The structure 'remembers' previous attacks, automatically reinforcing against similar future threats.")
                    .cost(Power, 350).cost(Essence, 3),
            ],
        },
        SectionInfo {
            id: SectionId::Throne,
            title: "👑 Throne Room",
            description: "Command Center",
            research: vec![
                Upgrade::new("Battle Archives", "Gain tactical insights post-battle. Ask one additional question from any information-gathering source.")
                    .cost(Power, 100).cost(Tech, 2),
                Upgrade::new("Strategic Modeling", "Create magical simulations to test tactics before implementation, improving success rates.")
                    .cost(Power, 180).cost(Shards, 3),
                Upgrade::new("Command Linguistics", "Enhanced communication with allies across vast distances, regardless of language barriers.")
                    .cost(Power, 240).cost(Essence, 2),
            ],
            offensive: vec![
                Upgrade::new("Battle Synchrony", "Designate one mission per week as 'coordinated,' giving a +1 bonus to all rolls due to superior planning.")
                    .cost(Power, 120).cost(Silver, 50),
                Upgrade::new("Command Authority", "Voice carries supernatural weight, causing lesser enemies to hesitate or flee.")
                    .cost(Power, 200).cost(Essence, 2),
                Upgrade::new("Tactical Inspiration", "During critical moments, can grant allies an unexpected second wind or insight.")
                    .cost(Power, 300).cost(Essence, 3),
            ],
            defensive: vec![
                Upgrade::new("Iron Mandate", "Enemies attempting to sabotage command face higher resistance or misdirection.")
                    .cost(Power, 110).cost(Tech, 2),
                Upgrade::new("Protected Awareness", "Command staff cannot be magically scried upon or have thoughts read without their knowledge.")
                    .cost(Power, 190).cost(Shards, 4),
                Upgrade::new("Contingency Protocols", "If command is compromised, automated systems maintain basic functions until control is restored.")
                    .cost(Power, 280).cost(Tech, 5),
            ],
        },
        SectionInfo {
            id: SectionId::Gateway,
            title: "🌀 Gateway",
            description: "Teleportation Hub",
            research: vec![
                Upgrade::new("Harmonic Coordinates", "Unlock hidden realms or rare mission sites with unique rewards.")
                    .cost(Power, 130).cost(Shards, 3),
                Upgrade::new("Sympathetic Mapping", "After visiting a location once, can return with perfect accuracy regardless of wards or barriers.")
                    .cost(Power, 200).cost(Tech, 3),
                Upgrade::new("Beacon Understanding", "Ability to analyze and potentially replicate transportation methods of other beings.")
                    .cost(Power, 270).cost(Essence, 2),
            ],
            offensive: vec![
                Upgrade::new("Tactical Insertion", "Once per session, deploy a team directly into a known hostile location bypassing travel.")
                    .cost(Power, 160).cost(Silver, 70),
                Upgrade::new("Portal Strike", "Open momentary gateways to launch attacks from unexpected angles.")
                    .cost(Power, 230).cost(Shards, 4),
                Upgrade::new("Dimensional Shear", "Create unstable planar intersections that damage creatures caught between worlds.")
                    .cost(Power, 320).cost(Essence, 3),
            ],
            defensive: vec![
                Upgrade::new("Interdiction Array", "Nullifies teleportation-based infiltration attempts into the Bastion.")
                    .cost(Power, 150).cost(Tech, 3),
                Upgrade::new("Escape Protocols", "In dire emergencies, automatically evacuates critical personnel to predetermined safe locations.")
                    .cost(Power, 220).cost(Shards, 5),
                Upgrade::new("Planar Anchoring", "Stabilizes local reality, preventing dimensional manipulation within the Bastion's influence.")
                    .cost(Power, 350).cost(Essence, 4),
            ],
        },
        SectionInfo {
            id: SectionId::Fountain,
            title: "⛲ Fountain of Grace",
            description: "Healing Center",
            research: vec![
                Upgrade::new("Graceflow Optimization", "Increases passive generation of celestial silver and healing effectiveness.")
                    .cost(Power, 110).cost(Tech, 2),
                Upgrade::new("Essence Analysis", "Identify the nature and source of injuries or afflictions with perfect accuracy.")
                    .cost(Power, 170).cost(Essence, 1),
                Upgrade::new("Resurrection Protocols", "Establish foundation for potential revival of fatally wounded allies under specific conditions.")
                    .cost(Power, 300).cost(Essence, 4),
            ],
            offensive: vec![
                Upgrade::new("Blessing Surge", "Store divine interventions for use in dire situations.")
                    .cost(Power, 140).cost(Silver, 60),
                Upgrade::new("Purifying Cascade", "Transform fountain energies into damaging wave against unholy entities.")
                    .cost(Power, 210).cost(Essence, 2),
                Upgrade::new("Lifeforce Manipulation", "Temporarily enhance allies' physical capabilities beyond normal limits.")
                    .cost(Power, 290).cost(Essence, 3),
            ],
            defensive: vec![
                Upgrade::new("Aegis Misting", "Emergency regenerative mist healing allies in adjacent sections.")
                    .cost(Power, 120).cost(Shards, 3),
                Upgrade::new("Stasis Field", "Preserve critically wounded in suspended animation until proper healing is available.")
                    .cost(Power, 200).cost(Tech, 4),
                Upgrade::new("Vitality Shield", "Convert incoming damage to healing energy with diminishing returns.")
                    .cost(Power, 320).cost(Essence, 4),
            ],
        },
    ];
}

// ============================================================================
// Per-game records
// ============================================================================

/// NPCs working on a damaged section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningJob {
    pub started_at: DateTime<Utc>,
    pub assigned_npcs: Vec<NpcId>,
    pub completes_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionRecord {
    pub condition: SectionCondition,
    /// Purchased upgrade indices per path.
    pub upgrades: BTreeMap<UpgradePath, BTreeSet<usize>>,
    pub cleaning: Option<CleaningJob>,
}

impl SectionRecord {
    pub fn new(condition: SectionCondition) -> Self {
        Self {
            condition,
            upgrades: BTreeMap::new(),
            cleaning: None,
        }
    }

    pub fn purchased(&self) -> usize {
        self.upgrades.values().map(BTreeSet::len).sum()
    }
}

impl Default for SectionRecord {
    fn default() -> Self {
        Self::new(SectionCondition::Damaged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeStatus {
    Completed,
    Available,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionProgress {
    pub completed: usize,
    pub total: usize,
    pub percentage: f64,
}

/// Crew time for a cleaning job. Each NPC shaves 10% off, up to half.
pub fn cleaning_duration(crew: usize) -> Duration {
    let bonus = (crew as f64 * 0.1).min(0.5);
    let hours = (CLEANING_BASE_HOURS * (1.0 - bonus)).max(1.0);
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

// ============================================================================
// Section operations
// ============================================================================

impl GameState {
    /// Record for a section. The map is seeded with every section, but older
    /// saves may lack one.
    pub fn section(&self, section: SectionId) -> SectionRecord {
        self.sections
            .get(&section)
            .cloned()
            .unwrap_or_else(|| SectionRecord::new(section.starting_condition()))
    }

    fn section_mut(&mut self, section: SectionId) -> &mut SectionRecord {
        self.sections
            .entry(section)
            .or_insert_with(|| SectionRecord::new(section.starting_condition()))
    }

    fn set_section_condition(&mut self, section: SectionId, to: SectionCondition) {
        let record = self.section_mut(section);
        let from = record.condition;
        if from == to {
            return;
        }
        record.condition = to;
        self.record(Effect::SectionConditionChanged { section, from, to });
    }

    pub fn has_upgrade(&self, section: SectionId, path: UpgradePath, index: usize) -> bool {
        self.sections
            .get(&section)
            .and_then(|r| r.upgrades.get(&path))
            .is_some_and(|owned| owned.contains(&index))
    }

    pub fn purchase_upgrade(
        &mut self,
        section: SectionId,
        path: UpgradePath,
        index: usize,
    ) -> Result<(), SectionError> {
        let info = section.info();
        let upgrade = info
            .upgrade(path, index)
            .ok_or(SectionError::UnknownUpgrade {
                section,
                path,
                index,
            })?;

        if self.has_upgrade(section, path, index) {
            return Err(SectionError::AlreadyOwned {
                name: upgrade.name.to_string(),
            });
        }

        self.spend_resources(&upgrade.cost)?;

        self.section_mut(section)
            .upgrades
            .entry(path)
            .or_default()
            .insert(index);

        self.log_activity(format!("Upgrade purchased: {} ({})", upgrade.name, info.title));
        self.record(Effect::UpgradePurchased {
            section,
            path,
            index,
            cost: upgrade.cost.clone(),
        });

        tracing::info!(%section, %path, index, "Upgrade purchased");
        Ok(())
    }

    pub fn section_progress(&self, section: SectionId) -> SectionProgress {
        let total = section.info().total_upgrades();
        let completed = self
            .sections
            .get(&section)
            .map_or(0, SectionRecord::purchased);
        let percentage = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        SectionProgress {
            completed,
            total,
            percentage,
        }
    }

    pub fn total_upgrades(&self) -> usize {
        self.sections.values().map(SectionRecord::purchased).sum()
    }

    /// Owned, affordable right now, or locked. The section's repair state
    /// does not gate upgrades.
    pub fn upgrade_status(&self, section: SectionId, path: UpgradePath, index: usize) -> UpgradeStatus {
        if self.has_upgrade(section, path, index) {
            return UpgradeStatus::Completed;
        }

        let affordable = section
            .info()
            .upgrade(path, index)
            .is_some_and(|u| self.resources.can_afford(&u.cost));

        if affordable {
            UpgradeStatus::Available
        } else {
            UpgradeStatus::Locked
        }
    }

    /// Send NPCs to clean a damaged section. Returns the completion time.
    pub fn start_cleaning(
        &mut self,
        section: SectionId,
        crew: Vec<NpcId>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SectionError> {
        let condition = self.section(section).condition;
        if condition != SectionCondition::Damaged {
            return Err(SectionError::NotDamaged { section, condition });
        }
        if crew.is_empty() {
            return Err(SectionError::NoCrew);
        }
        let mut seen = BTreeSet::new();
        for npc_id in &crew {
            if !seen.insert(*npc_id) {
                return Err(SectionError::DuplicateNpc(*npc_id));
            }
            let npc = self.npc(*npc_id).ok_or(SectionError::NpcNotFound(*npc_id))?;
            if npc.status != NpcStatus::Available {
                return Err(SectionError::NpcUnavailable {
                    name: npc.name.clone(),
                });
            }
        }

        let completes_at = now + cleaning_duration(crew.len());
        for npc_id in &crew {
            self.set_npc_status(*npc_id, NpcStatus::Deployed);
        }

        let crew_size = crew.len();
        self.section_mut(section).cleaning = Some(CleaningJob {
            started_at: now,
            assigned_npcs: crew,
            completes_at,
        });
        self.set_section_condition(section, SectionCondition::Cleaning);

        self.log_activity_at(
            format!("Cleaning started: {} ({crew_size} NPCs)", section.info().title),
            now,
        );
        self.recalculate_tech_expertise();
        Ok(completes_at)
    }

    /// Finish every cleaning job whose time is up.
    pub fn complete_due_cleaning(&mut self, now: DateTime<Utc>) -> Vec<SectionId> {
        let due: Vec<_> = self
            .sections
            .iter()
            .filter(|(_, r)| r.condition == SectionCondition::Cleaning)
            .filter(|(_, r)| r.cleaning.as_ref().is_some_and(|j| j.completes_at <= now))
            .map(|(id, _)| *id)
            .collect();

        for section in &due {
            let job = self.section_mut(*section).cleaning.take();
            for npc_id in job.map(|j| j.assigned_npcs).unwrap_or_default() {
                self.set_npc_status(npc_id, NpcStatus::Available);
            }
            self.set_section_condition(*section, SectionCondition::Cleaned);
            self.log_activity_at(format!("Cleaning complete: {}", section.info().title), now);
            tracing::info!(%section, "Cleaning complete");
        }

        if !due.is_empty() {
            self.recalculate_tech_expertise();
        }
        due
    }

    /// Time left on a section's cleaning job, zero once due.
    pub fn cleaning_time_remaining(&self, section: SectionId, now: DateTime<Utc>) -> Option<Duration> {
        let job = self.sections.get(&section)?.cleaning.as_ref()?;
        Some((job.completes_at - now).max(Duration::zero()))
    }

    /// Power up a cleaned section.
    pub fn bring_online(&mut self, section: SectionId) -> Result<(), SectionError> {
        let condition = self.section(section).condition;
        if condition != SectionCondition::Cleaned {
            return Err(SectionError::NotCleaned { section, condition });
        }

        let cost = ResourceMap::from([(Resource::CelestialPower, BRING_ONLINE_COST)]);
        self.spend_resources(&cost)?;
        self.set_section_condition(section, SectionCondition::Online);

        self.log_activity(format!("Section online: {}", section.info().title));
        tracing::info!(%section, "Section brought online");
        Ok(())
    }

    /// Drop an NPC from any cleaning crew. A crew left empty abandons the
    /// job and the section returns to damaged.
    pub(crate) fn release_npc_from_cleaning(&mut self, npc_id: NpcId) {
        let mut abandoned = Vec::new();
        for (section, record) in &mut self.sections {
            let Some(job) = record.cleaning.as_mut() else {
                continue;
            };
            let before = job.assigned_npcs.len();
            job.assigned_npcs.retain(|id| *id != npc_id);
            if job.assigned_npcs.len() != before && job.assigned_npcs.is_empty() {
                abandoned.push(*section);
            }
        }

        for section in abandoned {
            self.section_mut(section).cleaning = None;
            self.set_section_condition(section, SectionCondition::Damaged);
            self.log_activity(format!("Cleaning abandoned: {}", section.info().title));
        }
    }
}
