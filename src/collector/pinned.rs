// Pinned BPF maps opened with aya; re-opened after any read failure

use aya::maps::{Map, MapData, PerCpuArray, PerCpuHashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use super::CollectError;
use super::source::{CounterSource, InterfaceRow};
use crate::models::{IfProtoKey, ProtoStats};

/// BPF_MAP_TYPE_PERCPU_ARRAY, one `ProtoStats` per category index.
pub const STATS_MAP: &str = "stats_percpu";
/// BPF_MAP_TYPE_PERCPU_HASH keyed by `IfProtoKey`. Optional.
pub const IF_STATS_MAP: &str = "if_stats_percpu";

struct OpenMaps {
    stats: PerCpuArray<MapData, ProtoStats>,
    if_stats: Option<PerCpuHashMap<MapData, IfProtoKey, ProtoStats>>,
}

pub struct PinnedMaps {
    pin_dir: PathBuf,
    maps: Mutex<Option<OpenMaps>>,
}

impl PinnedMaps {
    pub fn new(pin_dir: &Path) -> Self {
        Self {
            pin_dir: pin_dir.to_path_buf(),
            maps: Mutex::new(None),
        }
    }

    fn open(&self) -> Result<OpenMaps, CollectError> {
        let stats_path = self.pin_dir.join(STATS_MAP);
        let data = MapData::from_pin(&stats_path).map_err(|e| {
            CollectError::MapUnavailable(format!("{}: {}", stats_path.display(), e))
        })?;
        let stats = PerCpuArray::try_from(Map::PerCpuArray(data)).map_err(|e| {
            CollectError::MapUnavailable(format!("{}: {}", stats_path.display(), e))
        })?;

        let if_path = self.pin_dir.join(IF_STATS_MAP);
        let if_stats = match MapData::from_pin(&if_path)
            .map_err(|e| e.to_string())
            .and_then(|d| PerCpuHashMap::try_from(Map::PerCpuHashMap(d)).map_err(|e| e.to_string()))
        {
            Ok(m) => Some(m),
            Err(e) => {
                debug!(error = %e, path = %if_path.display(), "per-interface map not available");
                None
            }
        };
        info!(
            pin_dir = %self.pin_dir.display(),
            per_interface = if_stats.is_some(),
            "opened pinned BPF maps"
        );
        Ok(OpenMaps { stats, if_stats })
    }

    /// Runs `f` against open maps, opening them first if needed. A failed read
    /// drops the handles so the next call re-opens (the maps may have been re-pinned).
    fn with_maps<T>(
        &self,
        f: impl FnOnce(&OpenMaps) -> Result<T, CollectError>,
    ) -> Result<T, CollectError> {
        let mut guard = self.maps.lock().unwrap_or_else(PoisonError::into_inner);
        let maps = match guard.take() {
            Some(m) => m,
            None => self.open()?,
        };
        let result = f(&maps);
        if result.is_ok() {
            *guard = Some(maps);
        }
        result
    }
}

impl CounterSource for PinnedMaps {
    fn global_shards(&self, idx: u32) -> Result<Vec<ProtoStats>, CollectError> {
        self.with_maps(|maps| {
            let values = maps.stats.get(&idx, 0).map_err(|e| CollectError::Lookup {
                table: STATS_MAP,
                key: idx.to_string(),
                reason: e.to_string(),
            })?;
            Ok(values.iter().copied().collect())
        })
    }

    fn interface_rows(&self) -> Result<Option<Vec<InterfaceRow>>, CollectError> {
        self.with_maps(|maps| {
            let Some(if_stats) = &maps.if_stats else {
                return Ok(None);
            };
            let mut rows = Vec::new();
            for entry in if_stats.iter() {
                let (key, values) = entry.map_err(|e| CollectError::Iterate {
                    table: IF_STATS_MAP,
                    reason: e.to_string(),
                })?;
                rows.push((key, values.iter().copied().collect()));
            }
            Ok(Some(rows))
        })
    }
}
