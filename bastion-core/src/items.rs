//! Equipment that NPCs can carry.
//!
//! Items only matter through their stat bonuses, which feed
//! [`GameState::effective_stats`](crate::state::GameState::effective_stats).

use crate::events::Effect;
use crate::npcs::Stat;
use crate::state::{GameState, ItemId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Added to the wearer's stats while equipped.
    #[serde(default)]
    pub bonus: BTreeMap<Stat, i8>,
}

impl Item {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            name: name.into(),
            description: None,
            bonus: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_bonus(mut self, stat: Stat, bonus: i8) -> Self {
        self.bonus.insert(stat, bonus);
        self
    }
}

impl GameState {
    pub fn item(&self, item_id: ItemId) -> Option<&Item> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn add_item(&mut self, item: Item) -> ItemId {
        let id = item.id;
        self.log_activity(format!("Item added to stores: {}", item.name));
        self.items.push(item);
        id
    }

    /// Remove an item from the stores, taking it off anyone wearing it.
    pub fn remove_item(&mut self, item_id: ItemId) -> Option<Item> {
        let index = self.items.iter().position(|i| i.id == item_id)?;

        let item_name = self.items[index].name.clone();
        let mut wearers = Vec::new();
        for npc in self.npcs.iter_mut() {
            if npc.equipped_item == Some(item_id) {
                npc.equipped_item = None;
                wearers.push((npc.id, npc.name.clone()));
            }
        }
        for (npc_id, npc_name) in &wearers {
            self.log_activity(format!("{npc_name} unequipped {item_name}"));
            self.record(Effect::ItemUnequipped {
                npc_id: *npc_id,
                item_id,
            });
        }
        if !wearers.is_empty() {
            self.recalculate_tech_expertise();
        }

        let item = self.items.remove(index);
        self.log_activity(format!("Item removed from stores: {}", item.name));
        Some(item)
    }
}
