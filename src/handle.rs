//! Process-wide model resource table.
//!
//! Trained models are exposed to the host as opaque numeric handles rather
//! than owned values. The table maps each handle to an `Arc` of the
//! immutable model, so a handle released mid-prediction does not invalidate
//! the model the prediction is running against.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::debug;

use crate::error::ResourceError;
use crate::model::TrainedModel;

/// Opaque reference to a trained model held by the resource table.
///
/// Handles are plain identifiers. Copying one does not copy the model, and
/// a handle stays valid until [`release`] is called on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(u64);

impl ModelHandle {
    /// The raw identifier, for logging and host-side bookkeeping.
    pub fn id(&self) -> u64 {
        self.0
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static TABLE: OnceLock<Mutex<HashMap<u64, Arc<TrainedModel>>>> = OnceLock::new();

fn table() -> MutexGuard<'static, HashMap<u64, Arc<TrainedModel>>> {
    TABLE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Register a model and hand out a fresh handle for it.
///
/// Handle identifiers are never reused within a process, even after release.
pub fn create(model: TrainedModel) -> ModelHandle {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    table().insert(id, Arc::new(model));
    debug!(handle = id, "model registered");
    ModelHandle(id)
}

/// Look up the model behind a handle.
///
/// # Errors
///
/// [`ResourceError::UnknownHandle`] if the handle was never issued or has
/// been released.
pub fn resolve(handle: ModelHandle) -> Result<Arc<TrainedModel>, ResourceError> {
    table()
        .get(&handle.0)
        .cloned()
        .ok_or(ResourceError::UnknownHandle(handle.0))
}

/// Drop the table's reference to a model.
///
/// Returns whether the handle was live. Releasing an already-released or
/// unknown handle is a no-op, so hosts may release defensively on teardown.
/// In-flight users holding the `Arc` keep the model alive until they finish.
pub fn release(handle: ModelHandle) -> bool {
    let removed = table().remove(&handle.0).is_some();
    if removed {
        debug!(handle = handle.0, "model released");
    }
    removed
}
