//! Domain engine for The Bastion, a GM/player dashboard.
//!
//! This crate provides:
//! - Resource accounting with all-or-nothing spending
//! - The NPC roster, equipment and healing
//! - The mission board: creation, assignment, resolution and rewards
//! - Section repair lifecycles and upgrade trees
//! - GM/player authentication with a security log
//! - Versioned JSON persistence and periodic maintenance
//!
//! # Quick Start
//!
//! ```ignore
//! use bastion_core::{BastionSession, MissionDraft, MissionType, Role, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = BastionSession::new(SessionConfig::new("Skyhold"));
//!     session.login("gm", "gmbastion2024", Role::Gm)?;
//!
//!     let mission = session.create_mission(MissionDraft::new(
//!         "Recover the Lens",
//!         "Retrieve the lens from the flooded archive.",
//!         MissionType::Research,
//!     ))?;
//!     println!("Posted mission {mission}");
//!
//!     session.save("skyhold.json").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod events;
pub mod items;
pub mod maintenance;
pub mod missions;
pub mod npcs;
pub mod persist;
pub mod resources;
pub mod sections;
pub mod session;
pub mod state;
pub mod testing;

// Primary public API
pub use auth::{Auth, AuthError, AuthSession, CurrentUser, Role};
pub use events::Effect;
pub use items::Item;
pub use maintenance::{Maintenance, MaintenanceReport};
pub use missions::{
    AssignmentRequest, Difficulty, Mission, MissionDraft, MissionError, MissionStatus,
    MissionType, Outcome, Priority,
};
pub use npcs::{Npc, NpcError, NpcPatch, NpcStatus, NpcTemplate, Stat};
pub use persist::{PersistError, SavedBastion, SavedLogin};
pub use resources::{Resource, ResourceError, ResourceExport, ResourceMap};
pub use sections::{SectionCondition, SectionError, SectionId, UpgradePath};
pub use session::{BastionSession, SessionConfig, SessionError};
pub use state::{GameState, ItemId, MissionId, NpcId};
pub use testing::TestHarness;
