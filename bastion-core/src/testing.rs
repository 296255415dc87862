//! Testing utilities for the Bastion.
//!
//! This module provides tools for integration testing:
//! - `TestHarness` for scripted dashboard scenarios with a seeded session
//! - Assertion helpers for verifying game state

use crate::auth::{AuthError, Role};
use crate::missions::{MissionDraft, MissionStatus, MissionType};
use crate::npcs::{NpcStatus, NpcTemplate};
use crate::resources::Resource;
use crate::sections::{SectionCondition, SectionId};
use crate::session::{BastionSession, SessionConfig, SessionError};
use crate::state::{MissionId, NpcId};

/// Seed used by every harness so runs are reproducible.
pub const HARNESS_SEED: u64 = 42;

/// Test harness wrapping a seeded session with a GM logged in.
pub struct TestHarness {
    pub session: BastionSession,
}

impl TestHarness {
    /// Create a new harness with the default GM account logged in.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::new("Test Bastion"))
    }

    /// Create a harness from a custom config. The seed is always fixed.
    pub fn with_config(config: SessionConfig) -> Self {
        let mut harness = Self {
            session: BastionSession::new(config.with_seed(HARNESS_SEED)),
        };
        harness.as_gm();
        harness
    }

    /// Switch to the default GM account.
    pub fn as_gm(&mut self) -> &mut Self {
        self.session.logout();
        self.session
            .login("gm", "gmbastion2024", Role::Gm)
            .expect("default GM login");
        self
    }

    /// Switch to the default player account.
    pub fn as_player(&mut self) -> &mut Self {
        self.session.logout();
        self.session
            .login("jon", "bastion2024", Role::Player)
            .expect("default player login");
        self
    }

    pub fn logged_out(&mut self) -> &mut Self {
        self.session.logout();
        self
    }

    /// Set a resource directly, bypassing role checks.
    pub fn with_resource(&mut self, resource: Resource, amount: i64) -> &mut Self {
        self.session.state_mut().set_resource(resource, amount);
        self
    }

    /// Recruit an NPC with the given name. Requires a GM.
    pub fn recruit(&mut self, name: &str) -> NpcId {
        self.session
            .create_npc(NpcTemplate::named(name))
            .expect("recruit NPC")
    }

    /// Post a mission with a stock description. Requires a GM.
    pub fn post_mission(&mut self, title: &str, mission_type: MissionType) -> MissionId {
        self.session
            .create_mission(MissionDraft::new(
                title,
                "A routine task for the Bastion's agents.",
                mission_type,
            ))
            .expect("create mission")
    }

    pub fn resource(&self, resource: Resource) -> u64 {
        self.session.state().resource(resource)
    }

    pub fn npc_status(&self, npc_id: NpcId) -> Option<NpcStatus> {
        self.session.state().npc(npc_id).map(|n| n.status)
    }

    pub fn mission_status(&self, mission_id: MissionId) -> Option<MissionStatus> {
        self.session.state().mission(mission_id).map(|m| m.status)
    }

    pub fn section_condition(&self, section: SectionId) -> SectionCondition {
        self.session.state().section(section).condition
    }

    /// Most recent activity log message.
    pub fn last_activity(&self) -> Option<&str> {
        self.session
            .state()
            .activity_log
            .last()
            .map(|e| e.message.as_str())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

#[track_caller]
pub fn assert_resource(harness: &TestHarness, resource: Resource, expected: u64) {
    let actual = harness.resource(resource);
    assert_eq!(
        actual, expected,
        "Expected {resource} to be {expected}, got {actual}"
    );
}

#[track_caller]
pub fn assert_npc_status(harness: &TestHarness, npc_id: NpcId, expected: NpcStatus) {
    assert_eq!(
        harness.npc_status(npc_id),
        Some(expected),
        "Expected NPC {npc_id} to be {expected:?}"
    );
}

#[track_caller]
pub fn assert_mission_status(harness: &TestHarness, mission_id: MissionId, expected: MissionStatus) {
    assert_eq!(
        harness.mission_status(mission_id),
        Some(expected),
        "Expected mission {mission_id} to be {expected:?}"
    );
}

#[track_caller]
pub fn assert_section_condition(
    harness: &TestHarness,
    section: SectionId,
    expected: SectionCondition,
) {
    let actual = harness.section_condition(section);
    assert_eq!(
        actual, expected,
        "Expected {section} to be {expected}, got {actual}"
    );
}

/// Assert the activity log has an entry containing `needle`.
#[track_caller]
pub fn assert_activity_contains(harness: &TestHarness, needle: &str) {
    let found = harness
        .session
        .state()
        .activity_log
        .iter()
        .any(|e| e.message.contains(needle));
    assert!(found, "Expected activity log to mention '{needle}'");
}

/// Assert an operation was refused because it needs a GM.
#[track_caller]
pub fn assert_gm_only<T: std::fmt::Debug>(result: Result<T, SessionError>, action: &str) {
    match result {
        Err(SessionError::Auth(AuthError::GmOnly { action: refused })) => {
            assert_eq!(refused, action, "Refused for the wrong action")
        }
        other => panic!("Expected GM-only refusal for '{action}', got {other:?}"),
    }
}
