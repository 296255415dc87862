//! State-change records.
//!
//! Every mutation of the [`GameState`](crate::state::GameState) records one or
//! more [`Effect`]s describing what changed. Callers drain them after each
//! operation to refresh whatever presentation layer sits on top.

use crate::missions::{MissionStatus, Outcome};
use crate::npcs::NpcStatus;
use crate::resources::Resource;
use crate::sections::{SectionCondition, SectionId, UpgradePath};
use crate::state::{ItemId, MissionId, NpcId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A concrete change applied to the game state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// A resource count changed.
    ResourceChanged {
        resource: Resource,
        old_value: u64,
        new_value: u64,
    },

    /// Resources were granted in one batch (mission rewards, income).
    ResourcesAwarded {
        rewards: BTreeMap<Resource, u64>,
        reason: String,
    },

    /// An upgrade was bought for a section path.
    UpgradePurchased {
        section: SectionId,
        path: UpgradePath,
        index: usize,
        cost: BTreeMap<Resource, u64>,
    },

    /// A section moved through its repair lifecycle.
    SectionConditionChanged {
        section: SectionId,
        from: SectionCondition,
        to: SectionCondition,
    },

    NpcRecruited { npc_id: NpcId, name: String },
    NpcUpdated { npc_id: NpcId },
    NpcRemoved { npc_id: NpcId, name: String },

    NpcStatusChanged {
        npc_id: NpcId,
        from: NpcStatus,
        to: NpcStatus,
    },

    ItemEquipped { npc_id: NpcId, item_id: ItemId },
    ItemUnequipped { npc_id: NpcId, item_id: ItemId },

    MissionCreated { mission_id: MissionId, title: String },

    MissionStatusChanged {
        mission_id: MissionId,
        from: MissionStatus,
        to: MissionStatus,
    },

    MissionResolved {
        mission_id: MissionId,
        outcome: Outcome,
        rewards: BTreeMap<Resource, u64>,
    },

    MissionRemoved { mission_id: MissionId },

    /// The whole state was replaced by a load or an import.
    StateLoaded,

    /// The state was reset to defaults.
    StateReset,
}
