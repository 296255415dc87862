//! Walk a Bastion through one mission and a section repair.
//!
//! Run with: `RUST_LOG=info cargo run -p bastion-core --example run_bastion`

use bastion_core::maintenance;
use bastion_core::{
    AssignmentRequest, BastionSession, MissionDraft, MissionType, NpcTemplate, Outcome, Resource,
    Role, SectionId, SessionConfig,
};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== The Bastion ===\n");

    let config = SessionConfig::from_env("Demo Bastion");
    let mut session = BastionSession::new(config);
    session.login("gm", "gmbastion2024", Role::Gm)?;

    println!("1. Recruiting...");
    let scout = session.create_npc(NpcTemplate::named("Tamsin Vale"))?;
    let warden = session.create_npc(NpcTemplate::random())?;
    for npc in &session.state().npcs {
        println!("   {} ({}) tech {}", npc.name, npc.title, npc.stats.tech);
    }

    println!("\n2. Running a mission...");
    let mission = session.create_mission(
        MissionDraft::new(
            "Caravan Escort",
            "Escort the silver caravan through the ash wastes.",
            MissionType::Combat,
        )
        .with_reward(Resource::CelestialSilver, 50),
    )?;
    session.assign_mission(mission, AssignmentRequest::npcs(vec![scout]))?;
    let resolution = session.resolve_mission(mission, Outcome::Success, "No losses")?;
    println!("   Rewards: {:?}", resolution.rewards);

    println!("\n3. Cleaning the Sanctum...");
    let done_at = session.start_cleaning(SectionId::Sanctum, vec![warden])?;
    println!("   Crew finishes at {done_at}");

    println!("\n4. Resources:");
    for (resource, amount) in session.state().resources.iter() {
        println!("   {} {resource}: {amount}", resource.icon());
    }

    // Background upkeep until shutdown
    let session = Arc::new(Mutex::new(session));
    let (shutdown, rx) = watch::channel(false);
    let upkeep = maintenance::spawn(Arc::clone(&session), rx);
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    shutdown.send(true)?;
    upkeep.await?;

    println!("\n=== Done ===");
    Ok(())
}
