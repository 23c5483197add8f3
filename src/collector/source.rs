// Where raw kernel counters come from

use std::path::Path;
use std::sync::Arc;

use super::CollectError;
use crate::models::{IfProtoKey, ProtoStats};

/// Per-CPU rows for one per-interface key.
pub type InterfaceRow = (IfProtoKey, Vec<ProtoStats>);

/// Read-only view of the counters maintained by the kernel program. Values are
/// returned unsummed, one entry per logical CPU. Reads may block.
pub trait CounterSource: Send + Sync {
    /// Shards of the global entry at category index `idx`.
    fn global_shards(&self, idx: u32) -> Result<Vec<ProtoStats>, CollectError>;

    /// Every key currently present in the per-interface table, or `None` when
    /// the table does not exist.
    fn interface_rows(&self) -> Result<Option<Vec<InterfaceRow>>, CollectError>;
}

/// Source backed by the maps the tc program pins under `pin_dir`.
#[cfg(target_os = "linux")]
pub fn pinned_source(pin_dir: &Path) -> Arc<dyn CounterSource> {
    Arc::new(super::pinned::PinnedMaps::new(pin_dir))
}

#[cfg(not(target_os = "linux"))]
pub fn pinned_source(pin_dir: &Path) -> Arc<dyn CounterSource> {
    Arc::new(Unsupported(pin_dir.display().to_string()))
}

#[cfg(not(target_os = "linux"))]
struct Unsupported(String);

#[cfg(not(target_os = "linux"))]
impl CounterSource for Unsupported {
    fn global_shards(&self, _idx: u32) -> Result<Vec<ProtoStats>, CollectError> {
        Err(CollectError::MapUnavailable(format!(
            "{}: pinned BPF maps require Linux",
            self.0
        )))
    }

    fn interface_rows(&self) -> Result<Option<Vec<InterfaceRow>>, CollectError> {
        Ok(None)
    }
}
