// Ordered stack of teardown actions for a job's acquired resources

use tracing::{debug, warn};

use crate::provision::Cleanup;

/// Resources are pushed in acquisition order and torn down last-in-first-out.
#[derive(Debug, Default)]
pub struct TeardownStack {
    job_id: String,
    actions: Vec<(&'static str, Cleanup)>,
}

impl TeardownStack {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            actions: Vec::new(),
        }
    }

    pub fn push(&mut self, resource: &'static str, cleanup: Cleanup) {
        self.actions.push((resource, cleanup));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs every action, newest first. A failing action is logged and the rest still run.
    pub async fn unwind(mut self) {
        while let Some((resource, cleanup)) = self.actions.pop() {
            match cleanup.run().await {
                Ok(()) => debug!(job_id = %self.job_id, resource, "released"),
                Err(e) => warn!(
                    error = %e,
                    job_id = %self.job_id,
                    resource,
                    "teardown action failed"
                ),
            }
        }
    }
}

impl Drop for TeardownStack {
    fn drop(&mut self) {
        if self.actions.is_empty() {
            return;
        }
        // Dropped without unwind (task aborted or runtime shutting down): hand the
        // remaining actions to the runtime if there still is one.
        let actions = std::mem::take(&mut self.actions);
        let job_id = std::mem::take(&mut self.job_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(TeardownStack { job_id, actions }.unwind());
            }
            Err(_) => warn!(
                job_id = %job_id,
                pending = actions.len(),
                "teardown actions dropped without a runtime"
            ),
        }
    }
}
