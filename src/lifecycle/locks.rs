use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

const PRUNE_THRESHOLD: usize = 1024;

/// In-process mutual exclusion per job id. Held across the state change
/// only; notifications are sent after the guard is dropped.
#[derive(Clone, Default)]
pub struct JobLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl JobLocks {
    pub async fn lock(&self, job_id: Uuid) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().await;
            if map.len() > PRUNE_THRESHOLD {
                map.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            map.entry(job_id).or_default().clone()
        };
        slot.lock_owned().await
    }
}
