//! Periodic upkeep: auto-save, expired mission cleanup, NPC healing and
//! section cleaning completion.
//!
//! [`Maintenance::run_due`] is deterministic and takes the clock as an
//! argument; [`spawn`] drives it from a tokio interval until shut down.

use crate::session::{BastionSession, SessionConfig, SessionError};
use crate::sections::SectionId;
use crate::state::MissionId;
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// What one maintenance pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaintenanceReport {
    pub auto_saved: Option<PathBuf>,
    pub expired_missions: Vec<MissionId>,
    pub npcs_healed: usize,
    pub sections_cleaned: Vec<SectionId>,
}

impl MaintenanceReport {
    pub fn is_empty(&self) -> bool {
        self.auto_saved.is_none()
            && self.expired_missions.is_empty()
            && self.npcs_healed == 0
            && self.sections_cleaned.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Task {
    every: Duration,
    last_run: DateTime<Utc>,
}

impl Task {
    fn new(every: std::time::Duration, now: DateTime<Utc>) -> Self {
        Self {
            every: Duration::from_std(every).unwrap_or_else(|_| Duration::weeks(52)),
            last_run: now,
        }
    }

    fn take_due(&mut self, now: DateTime<Utc>) -> bool {
        if now - self.last_run >= self.every {
            self.last_run = now;
            true
        } else {
            false
        }
    }
}

/// Tracks when each upkeep task last ran.
///
/// Every task first becomes due one interval after construction.
#[derive(Debug, Clone)]
pub struct Maintenance {
    auto_save: Task,
    mission_cleanup: Task,
    npc_healing: Task,
    cleaning: Task,
}

impl Maintenance {
    pub fn new(config: &SessionConfig, now: DateTime<Utc>) -> Self {
        Self {
            auto_save: Task::new(config.auto_save_interval, now),
            mission_cleanup: Task::new(config.mission_cleanup_interval, now),
            npc_healing: Task::new(config.npc_healing_interval, now),
            cleaning: Task::new(config.cleaning_poll_interval, now),
        }
    }

    /// Run every task whose interval has elapsed.
    ///
    /// A failed auto-save is logged and does not stop the other tasks.
    pub async fn run_due(
        &mut self,
        session: &mut BastionSession,
        now: DateTime<Utc>,
    ) -> Result<MaintenanceReport, SessionError> {
        let mut report = MaintenanceReport::default();

        if self.cleaning.take_due(now) {
            report.sections_cleaned = session.state_mut().complete_due_cleaning(now);
        }

        if self.mission_cleanup.take_due(now) {
            let (state, rng) = session.state_and_rng();
            report.expired_missions = state.cleanup_expired_missions(now, rng);
        }

        if self.npc_healing.take_due(now) {
            let (state, rng) = session.state_and_rng();
            report.npcs_healed = state.process_npc_healing(rng);
        }

        if self.auto_save.take_due(now) {
            match session.auto_save().await {
                Ok(path) => report.auto_saved = path,
                Err(e) => tracing::warn!(error = %e, "Auto-save failed"),
            }
        }

        if !report.is_empty() {
            tracing::debug!(
                expired = report.expired_missions.len(),
                healed = report.npcs_healed,
                cleaned = report.sections_cleaned.len(),
                saved = report.auto_saved.is_some(),
                "Maintenance pass"
            );
        }

        Ok(report)
    }
}

/// Shortest configured interval; the loop ticks at this rate.
fn tick_period(config: &SessionConfig) -> std::time::Duration {
    [
        config.auto_save_interval,
        config.mission_cleanup_interval,
        config.npc_healing_interval,
        config.cleaning_poll_interval,
    ]
    .into_iter()
    .min()
    .unwrap_or(std::time::Duration::from_secs(1))
    .max(std::time::Duration::from_millis(10))
}

/// Run maintenance in the background until `shutdown` flips to `true`
/// or its sender is dropped.
pub fn spawn(
    session: Arc<Mutex<BastionSession>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (mut maintenance, period) = {
            let guard = session.lock().await;
            (
                Maintenance::new(guard.config(), Utc::now()),
                tick_period(guard.config()),
            )
        };

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let mut guard = session.lock().await;
                    if let Err(e) = maintenance.run_due(&mut guard, Utc::now()).await {
                        tracing::warn!(error = %e, "Maintenance pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Maintenance loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npcs::{NpcStatus, NpcTemplate};
    use crate::sections::SectionCondition;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    fn session(dir: &TempDir) -> BastionSession {
        let config = SessionConfig::new("Upkeep")
            .with_save_dir(dir.path())
            .with_auto_save_interval(StdDuration::from_secs(30))
            .with_cleaning_poll_interval(StdDuration::from_secs(60))
            .with_seed(3);
        BastionSession::new(config)
    }

    #[tokio::test]
    async fn test_nothing_due_immediately() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut session = session(&dir);
        let now = Utc::now();
        let mut maintenance = Maintenance::new(session.config(), now);

        let report = maintenance.run_due(&mut session, now).await.unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_auto_save_after_interval() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut session = session(&dir);
        let now = Utc::now();
        let mut maintenance = Maintenance::new(session.config(), now);

        let report = maintenance
            .run_due(&mut session, now + Duration::seconds(31))
            .await
            .unwrap();

        let path = report.auto_saved.expect("auto-save should run");
        assert!(path.exists());
        assert!(session.state().last_saved.is_some());

        // Not due again until another interval passes
        let report = maintenance
            .run_due(&mut session, now + Duration::seconds(40))
            .await
            .unwrap();
        assert!(report.auto_saved.is_none());
    }

    #[tokio::test]
    async fn test_auto_save_respects_setting() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut session = session(&dir);
        session.state_mut().settings.auto_save = false;
        let now = Utc::now();
        let mut maintenance = Maintenance::new(session.config(), now);

        let report = maintenance
            .run_due(&mut session, now + Duration::minutes(1))
            .await
            .unwrap();
        assert!(report.auto_saved.is_none());
    }

    #[tokio::test]
    async fn test_cleaning_completes_when_polled() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut session = session(&dir);
        let mut rng = StdRng::seed_from_u64(11);
        let npc = session
            .state_mut()
            .create_npc(NpcTemplate::named("Mara Quill"), &mut rng)
            .unwrap();

        let start = Utc::now();
        session
            .state_mut()
            .start_cleaning(SectionId::Sanctum, vec![npc], start)
            .unwrap();
        let mut maintenance = Maintenance::new(session.config(), start);

        let report = maintenance
            .run_due(&mut session, start + Duration::hours(25))
            .await
            .unwrap();
        assert_eq!(report.sections_cleaned, vec![SectionId::Sanctum]);
        assert_eq!(
            session.state().section(SectionId::Sanctum).condition,
            SectionCondition::Cleaned
        );
        assert_eq!(
            session.state().npc(npc).unwrap().status,
            NpcStatus::Available
        );
    }

    #[test]
    fn test_tick_period_is_shortest_interval() {
        let config = SessionConfig::new("Upkeep")
            .with_auto_save_interval(StdDuration::from_secs(30))
            .with_cleaning_poll_interval(StdDuration::from_secs(5));
        assert_eq!(tick_period(&config), StdDuration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_stops_on_shutdown() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let session = Arc::new(Mutex::new(session(&dir)));
        let (tx, rx) = watch::channel(false);

        let handle = spawn(Arc::clone(&session), rx);
        tokio::time::sleep(StdDuration::from_secs(1)).await;
        tx.send(true).unwrap();

        handle.await.unwrap();
    }
}
