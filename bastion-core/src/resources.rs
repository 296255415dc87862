//! Resource catalogue and ledger arithmetic.
//!
//! The ledger maps each [`Resource`] to a non-negative count. Every write is
//! clamped at zero; multi-resource spends are all-or-nothing.

use crate::events::Effect;
use crate::state::GameState;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest amount accepted from manual entry.
pub const MAX_MANUAL_AMOUNT: i64 = 999_999;

/// Value every resource is set to by [`ResourceLedger::max_all`].
pub const DEBUG_MAX_AMOUNT: u64 = 9999;

/// Costs and rewards are both expressed as resource → amount maps.
pub type ResourceMap = BTreeMap<Resource, u64>;

/// Errors from resource operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Not enough {resource}: need {needed}, have {available}")]
    Insufficient {
        resource: Resource,
        needed: u64,
        available: u64,
    },

    #[error("Invalid resource amount: {0} (must be 0-999999)")]
    InvalidAmount(i64),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),
}

/// The five resources tracked by the Bastion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resource {
    CelestialPower,
    CelestialSilver,
    RunicShards,
    DivineEssence,
    TechnicalExpertise,
}

impl Resource {
    /// Stable identifier, matching the serialized form.
    pub fn id(&self) -> &'static str {
        match self {
            Resource::CelestialPower => "celestial-power",
            Resource::CelestialSilver => "celestial-silver",
            Resource::RunicShards => "runic-shards",
            Resource::DivineEssence => "divine-essence",
            Resource::TechnicalExpertise => "technical-expertise",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Resource::CelestialPower => "Celestial Power",
            Resource::CelestialSilver => "Celestial Silver",
            Resource::RunicShards => "Runic Shards",
            Resource::DivineEssence => "Divine Essence",
            Resource::TechnicalExpertise => "Tech Expertise",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Resource::CelestialPower => "⚡",
            Resource::CelestialSilver => "🥈",
            Resource::RunicShards => "💎",
            Resource::DivineEssence => "✨",
            Resource::TechnicalExpertise => "🔬",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Resource::CelestialPower => "Primary energy source for the Bastion",
            Resource::CelestialSilver => "Rare metal for advanced construction",
            Resource::RunicShards => "Crystallized magical energy",
            Resource::DivineEssence => "Pure divine power",
            Resource::TechnicalExpertise => "Knowledge and skill points",
        }
    }

    /// Starting amount for a fresh Bastion.
    pub fn default_amount(&self) -> u64 {
        match self {
            Resource::CelestialPower => 1250,
            Resource::CelestialSilver => 85,
            Resource::RunicShards => 12,
            Resource::DivineEssence => 3,
            Resource::TechnicalExpertise => 5,
        }
    }

    pub fn all() -> [Resource; 5] {
        [
            Resource::CelestialPower,
            Resource::CelestialSilver,
            Resource::RunicShards,
            Resource::DivineEssence,
            Resource::TechnicalExpertise,
        ]
    }
}

/// Display metadata for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceInfo {
    pub resource: Resource,
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    pub default_amount: u64,
}

lazy_static::lazy_static! {
    /// Every resource, in [`Resource`] order.
    pub static ref RESOURCES: Vec<ResourceInfo> = Resource::all()
        .into_iter()
        .map(|resource| ResourceInfo {
            resource,
            name: resource.name(),
            icon: resource.icon(),
            description: resource.description(),
            default_amount: resource.default_amount(),
        })
        .collect();
}

impl Resource {
    pub fn info(&self) -> &'static ResourceInfo {
        &RESOURCES[*self as usize]
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Resource {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::all()
            .into_iter()
            .find(|r| r.id() == s.trim())
            .ok_or_else(|| ResourceError::UnknownResource(s.to_string()))
    }
}

/// Validate an amount typed in by hand.
pub fn validate_amount(amount: i64) -> Result<u64, ResourceError> {
    if (0..=MAX_MANUAL_AMOUNT).contains(&amount) {
        Ok(amount as u64)
    } else {
        Err(ResourceError::InvalidAmount(amount))
    }
}

/// Render a cost or reward map as `⚡ 100 🔬 2`.
pub fn format_costs(costs: &ResourceMap) -> String {
    costs
        .iter()
        .map(|(resource, amount)| format!("{} {}", resource.icon(), amount))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One row of an exported ledger. Only `value` is read back on import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub value: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: String,
}

/// Exported ledger keyed by resource id.
pub type ResourceExport = BTreeMap<String, ResourceEntry>;

/// Per-resource counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceLedger(ResourceMap);

impl ResourceLedger {
    /// A ledger with every resource at zero.
    pub fn empty() -> Self {
        Self(Resource::all().into_iter().map(|r| (r, 0)).collect())
    }

    pub fn get(&self, resource: Resource) -> u64 {
        self.0.get(&resource).copied().unwrap_or(0)
    }

    /// Set a count, clamping negative input to zero.
    ///
    /// Returns the change, or `None` when the value is unchanged.
    pub fn set(&mut self, resource: Resource, value: i64) -> Option<Effect> {
        let new_value = value.max(0) as u64;
        self.write(resource, new_value)
    }

    pub fn add(&mut self, resource: Resource, amount: u64) -> Option<Effect> {
        let new_value = self.get(resource).saturating_add(amount);
        self.write(resource, new_value)
    }

    /// Subtract, stopping at zero.
    pub fn subtract(&mut self, resource: Resource, amount: u64) -> Option<Effect> {
        let new_value = self.get(resource).saturating_sub(amount);
        self.write(resource, new_value)
    }

    pub fn can_afford(&self, costs: &ResourceMap) -> bool {
        self.first_shortfall(costs).is_none()
    }

    /// Deduct every cost, or nothing at all.
    pub fn spend(&mut self, costs: &ResourceMap) -> Result<Vec<Effect>, ResourceError> {
        if let Some(err) = self.first_shortfall(costs) {
            return Err(err);
        }

        Ok(costs
            .iter()
            .filter_map(|(resource, amount)| self.subtract(*resource, *amount))
            .collect())
    }

    pub fn award(&mut self, rewards: &ResourceMap) -> Vec<Effect> {
        rewards
            .iter()
            .filter_map(|(resource, amount)| self.add(*resource, *amount))
            .collect()
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Resource, u64)> + '_ {
        self.0.iter().map(|(r, v)| (*r, *v))
    }

    pub fn reset_all(&mut self) -> Vec<Effect> {
        Resource::all()
            .into_iter()
            .filter_map(|r| self.write(r, 0))
            .collect()
    }

    pub fn max_all(&mut self) -> Vec<Effect> {
        Resource::all()
            .into_iter()
            .filter_map(|r| self.write(r, DEBUG_MAX_AMOUNT))
            .collect()
    }

    pub fn export(&self) -> ResourceExport {
        self.iter()
            .map(|(resource, value)| {
                let entry = ResourceEntry {
                    value: value.min(i64::MAX as u64) as i64,
                    name: resource.name().to_string(),
                    icon: resource.icon().to_string(),
                };
                (resource.id().to_string(), entry)
            })
            .collect()
    }

    /// Overwrite counts from an export. Unknown ids are skipped and
    /// negative values clamp to zero.
    pub fn import(&mut self, entries: &ResourceExport) -> Vec<Effect> {
        let mut effects = Vec::new();
        for (id, entry) in entries {
            match id.parse::<Resource>() {
                Ok(resource) => effects.extend(self.set(resource, entry.value)),
                Err(_) => tracing::debug!(%id, "Skipping unknown resource"),
            }
        }
        effects
    }

    /// One tick of passive income.
    ///
    /// Celestial power grows by `base` plus up to 50%; one tick in ten also
    /// grants a single unit of a random resource.
    pub fn simulate_income(&mut self, base: u64, rng: &mut impl Rng) -> Vec<Effect> {
        let mut effects = Vec::new();

        let factor = 1.0 + rng.gen::<f64>() * 0.5;
        let income = (base as f64 * factor).floor() as u64;
        effects.extend(self.add(Resource::CelestialPower, income));

        if rng.gen_bool(0.1) {
            let all = Resource::all();
            let bonus = all[rng.gen_range(0..all.len())];
            effects.extend(self.add(bonus, 1));
        }

        effects
    }

    fn first_shortfall(&self, costs: &ResourceMap) -> Option<ResourceError> {
        costs.iter().find_map(|(resource, needed)| {
            let available = self.get(*resource);
            (available < *needed).then_some(ResourceError::Insufficient {
                resource: *resource,
                needed: *needed,
                available,
            })
        })
    }

    fn write(&mut self, resource: Resource, new_value: u64) -> Option<Effect> {
        let old_value = self.0.insert(resource, new_value).unwrap_or(0);
        (old_value != new_value).then_some(Effect::ResourceChanged {
            resource,
            old_value,
            new_value,
        })
    }
}

impl Default for ResourceLedger {
    fn default() -> Self {
        Self(
            Resource::all()
                .into_iter()
                .map(|r| (r, r.default_amount()))
                .collect(),
        )
    }
}

// ============================================================================
// GameState integration
// ============================================================================

impl GameState {
    pub fn resource(&self, resource: Resource) -> u64 {
        self.resources.get(resource)
    }

    pub fn set_resource(&mut self, resource: Resource, value: i64) {
        let effect = self.resources.set(resource, value);
        self.record_all(effect);
    }

    pub fn add_resource(&mut self, resource: Resource, amount: u64) {
        let effect = self.resources.add(resource, amount);
        self.record_all(effect);
    }

    pub fn subtract_resource(&mut self, resource: Resource, amount: u64) {
        let effect = self.resources.subtract(resource, amount);
        self.record_all(effect);
    }

    pub fn spend_resources(&mut self, costs: &ResourceMap) -> Result<(), ResourceError> {
        let effects = self.resources.spend(costs)?;
        self.record_all(effects);
        Ok(())
    }

    /// Grant a batch of resources and note why in the activity log.
    pub fn award_resources(&mut self, rewards: &ResourceMap, reason: &str) {
        if rewards.values().all(|amount| *amount == 0) {
            return;
        }

        let effects = self.resources.award(rewards);
        self.record_all(effects);
        self.record(Effect::ResourcesAwarded {
            rewards: rewards.clone(),
            reason: reason.to_string(),
        });
        self.log_activity(format!("Resources awarded ({reason}): {}", format_costs(rewards)));
    }

    pub fn simulate_income(&mut self, base: u64, rng: &mut impl Rng) {
        let effects = self.resources.simulate_income(base, rng);
        self.record_all(effects);
    }

    pub fn export_resources(&self) -> ResourceExport {
        self.resources.export()
    }

    /// Load counts from an export. Returns how many resources changed.
    pub fn import_resources(&mut self, entries: &ResourceExport) -> usize {
        let effects = self.resources.import(entries);
        let changed = effects.len();
        self.record_all(effects);
        self.log_activity(format!("Resources imported ({changed} changed)"));
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_catalogue_matches_variants() {
        for resource in Resource::all() {
            assert_eq!(resource.info().resource, resource);
        }
        let essence = Resource::DivineEssence.info();
        assert_eq!(essence.name, "Divine Essence");
        assert_eq!(essence.default_amount, 3);
    }

    fn costs(entries: &[(Resource, u64)]) -> ResourceMap {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_default_ledger() {
        let ledger = ResourceLedger::default();
        assert_eq!(ledger.get(Resource::CelestialPower), 1250);
        assert_eq!(ledger.get(Resource::CelestialSilver), 85);
        assert_eq!(ledger.get(Resource::RunicShards), 12);
        assert_eq!(ledger.get(Resource::DivineEssence), 3);
        assert_eq!(ledger.get(Resource::TechnicalExpertise), 5);
        assert_eq!(ledger.total(), 1355);
    }

    #[test]
    fn test_set_clamps_negative() {
        let mut ledger = ResourceLedger::default();
        let effect = ledger.set(Resource::RunicShards, -40);
        assert_eq!(ledger.get(Resource::RunicShards), 0);
        assert_eq!(
            effect,
            Some(Effect::ResourceChanged {
                resource: Resource::RunicShards,
                old_value: 12,
                new_value: 0,
            })
        );
    }

    #[test]
    fn test_set_same_value_records_nothing() {
        let mut ledger = ResourceLedger::default();
        assert!(ledger.set(Resource::DivineEssence, 3).is_none());
    }

    #[test]
    fn test_subtract_never_goes_negative() {
        let mut ledger = ResourceLedger::default();
        ledger.subtract(Resource::DivineEssence, 100);
        assert_eq!(ledger.get(Resource::DivineEssence), 0);

        // Already at zero: nothing changes
        assert!(ledger.subtract(Resource::DivineEssence, 1).is_none());
    }

    #[test]
    fn test_spend_is_all_or_nothing() {
        let mut ledger = ResourceLedger::default();
        let price = costs(&[
            (Resource::CelestialPower, 100),
            (Resource::DivineEssence, 10),
        ]);

        let err = ledger.spend(&price).unwrap_err();
        assert_eq!(
            err,
            ResourceError::Insufficient {
                resource: Resource::DivineEssence,
                needed: 10,
                available: 3,
            }
        );
        // Power must be untouched after the failed spend
        assert_eq!(ledger.get(Resource::CelestialPower), 1250);

        let affordable = costs(&[(Resource::CelestialPower, 100), (Resource::DivineEssence, 1)]);
        let effects = ledger.spend(&affordable).unwrap();
        assert_eq!(effects.len(), 2);
        assert_eq!(ledger.get(Resource::CelestialPower), 1150);
        assert_eq!(ledger.get(Resource::DivineEssence), 2);
    }

    #[test]
    fn test_can_afford_missing_resource_counts_as_zero() {
        let ledger = ResourceLedger::empty();
        assert!(!ledger.can_afford(&costs(&[(Resource::RunicShards, 1)])));
        assert!(ledger.can_afford(&ResourceMap::new()));
    }

    #[test]
    fn test_max_and_reset() {
        let mut ledger = ResourceLedger::default();
        ledger.max_all();
        assert!(Resource::all()
            .iter()
            .all(|r| ledger.get(*r) == DEBUG_MAX_AMOUNT));

        ledger.reset_all();
        assert_eq!(ledger.total(), 0);
    }

    #[test]
    fn test_simulate_income_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut ledger = ResourceLedger::empty();
            ledger.simulate_income(10, &mut rng);
            let power = ledger.get(Resource::CelestialPower);
            // 10..=15 from income, plus possibly one bonus unit
            assert!((10..=16).contains(&power), "power was {power}");
        }
    }

    #[test]
    fn test_validate_amount() {
        assert_eq!(validate_amount(0), Ok(0));
        assert_eq!(validate_amount(999_999), Ok(999_999));
        assert!(validate_amount(-1).is_err());
        assert!(validate_amount(1_000_000).is_err());
    }

    #[test]
    fn test_resource_ids_round_trip() {
        for resource in Resource::all() {
            assert_eq!(resource.id().parse::<Resource>(), Ok(resource));
            let json = serde_json::to_string(&resource).unwrap();
            assert_eq!(json, format!("\"{}\"", resource.id()));
        }
        assert!("mana".parse::<Resource>().is_err());
    }

    #[test]
    fn test_format_costs() {
        let price = costs(&[(Resource::CelestialPower, 100), (Resource::TechnicalExpertise, 2)]);
        assert_eq!(format_costs(&price), "⚡ 100 🔬 2");
    }

    #[test]
    fn test_award_logs_activity() {
        let mut state = GameState::default();
        let rewards = costs(&[(Resource::CelestialSilver, 15)]);
        state.award_resources(&rewards, "Mission: Test");

        assert_eq!(state.resource(Resource::CelestialSilver), 100);
        assert!(state
            .activity_log
            .last()
            .is_some_and(|e| e.message.contains("Mission: Test")));
        assert!(state
            .drain_effects()
            .iter()
            .any(|e| matches!(e, Effect::ResourcesAwarded { .. })));
    }

    #[test]
    fn test_export_carries_labels() {
        let exported = GameState::default().export_resources();
        assert_eq!(exported.len(), 5);

        let power = &exported["celestial-power"];
        assert_eq!(power.value, 1250);
        assert_eq!(power.name, "Celestial Power");
        assert_eq!(power.icon, Resource::CelestialPower.icon());
    }

    #[test]
    fn test_import_overwrites_known_resources() {
        let mut source = GameState::default();
        source.set_resource(Resource::RunicShards, 40);
        let json = serde_json::to_string(&source.export_resources()).unwrap();

        let mut target = GameState::default();
        let entries: ResourceExport = serde_json::from_str(&json).unwrap();
        assert_eq!(target.import_resources(&entries), 1);
        assert_eq!(target.resources, source.resources);
        assert!(target
            .activity_log
            .last()
            .is_some_and(|e| e.message == "Resources imported (1 changed)"));
    }

    #[test]
    fn test_import_skips_unknown_and_clamps() {
        let entries: ResourceExport = serde_json::from_str(
            r#"{
                "celestial-silver": { "value": -20 },
                "divine-essence": { "value": 9, "name": "Divine Essence" },
                "mana": { "value": 500 }
            }"#,
        )
        .unwrap();

        let mut ledger = ResourceLedger::default();
        let effects = ledger.import(&entries);
        assert_eq!(effects.len(), 2);
        assert_eq!(ledger.get(Resource::CelestialSilver), 0);
        assert_eq!(ledger.get(Resource::DivineEssence), 9);
        assert_eq!(ledger.get(Resource::CelestialPower), 1250);
    }
}
