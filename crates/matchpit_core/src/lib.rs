//! Tournament orchestration core.
//!
//! Everything stateful lives behind the [`repo::Repository`] seam; the
//! modules above it are pure policy. Bracket generation and the veto
//! sequencer are deterministic given their inputs, the allocation engine
//! pairs ready matches with free servers through the [`dispatch`] seam,
//! and [`reconcile`] folds server-reported events back into match state.

pub mod allocate;
pub mod bracket;
pub mod dispatch;
pub mod error;
pub mod inflight;
pub mod lifecycle;
pub mod reconcile;
pub mod registry;
pub mod repo;
pub mod store;
pub mod veto;

pub use allocate::{AllocationEngine, AllocationOutcome, AllocationReport, EngineConfig};
pub use dispatch::ServerCommander;
pub use error::{CoreError, CoreResult, DispatchError};
pub use reconcile::{EventReconciler, Outcome, RatingSink};
pub use registry::ServerRegistry;
pub use repo::Repository;
pub use store::MemoryStore;

#[cfg(test)]
pub(crate) mod testutil {
    use crate::dispatch::ServerCommander;
    use crate::error::DispatchError;
    use crate::reconcile::RatingSink;
    use async_trait::async_trait;
    use matchpit_types::{GameServer, Match, ServerId};
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Scriptable commander: succeeds everywhere except servers marked as
    /// failing, and records every command sequence it was handed.
    pub struct MockCommander {
        failing: Mutex<HashSet<ServerId>>,
        calls: Mutex<Vec<(ServerId, Vec<String>)>>,
    }

    impl MockCommander {
        pub fn ok() -> Arc<Self> {
            Arc::new(Self {
                failing: Mutex::new(HashSet::new()),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn failing_for(ids: impl IntoIterator<Item = ServerId>) -> Arc<Self> {
            let mock = Self::ok();
            for id in ids {
                mock.fail_server(id);
            }
            mock
        }

        pub fn fail_server(&self, id: ServerId) {
            self.failing.lock().unwrap().insert(id);
        }

        pub fn calls(&self) -> Vec<(ServerId, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ServerCommander for MockCommander {
        async fn run(
            &self,
            server: &GameServer,
            commands: &[String],
            _deadline: Duration,
        ) -> Result<Vec<String>, DispatchError> {
            self.calls
                .lock()
                .unwrap()
                .push((server.id, commands.to_vec()));
            if self.failing.lock().unwrap().contains(&server.id) {
                return Err(DispatchError::Unreachable(format!(
                    "{} refused connection",
                    server.addr()
                )));
            }
            Ok(commands.iter().map(|_| "ok".to_string()).collect())
        }
    }

    /// Rating sink that remembers which matches were submitted.
    #[derive(Default)]
    pub struct RecordingRating {
        submissions: Mutex<Vec<String>>,
    }

    impl RecordingRating {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn slugs(&self) -> Vec<String> {
            self.submissions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RatingSink for RecordingRating {
        async fn submit(&self, result: &Match) {
            self.submissions.lock().unwrap().push(result.slug.clone());
        }
    }
}
