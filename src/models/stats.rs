// Kernel counter models: per-category packet/byte totals as laid out in the BPF maps

use serde::Serialize;

/// Number of entries in the global per-CPU stats array.
pub const CATEGORY_COUNT: u32 = 4;

/// One cumulative (packets, bytes) pair. Matches the C struct in the tc program,
/// so it is read straight out of the per-CPU map values.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProtoStats {
    pub packets: u64,
    pub bytes: u64,
}

impl ProtoStats {
    pub const fn new(packets: u64, bytes: u64) -> Self {
        Self { packets, bytes }
    }

    /// Sums per-CPU shards into the cumulative value for one key.
    pub fn sum<'a>(shards: impl IntoIterator<Item = &'a ProtoStats>) -> Self {
        shards.into_iter().fold(Self::default(), |acc, s| Self {
            packets: acc.packets.wrapping_add(s.packets),
            bytes: acc.bytes.wrapping_add(s.bytes),
        })
    }

    /// Wrap-aware delta of both counters against a previous reading.
    pub fn delta_since(&self, prev: &ProtoStats) -> ProtoStats {
        ProtoStats {
            packets: counter_delta(self.packets, prev.packets),
            bytes: counter_delta(self.bytes, prev.bytes),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.packets == 0 && self.bytes == 0
    }
}

/// Delta between two cumulative readings. A reading lower than the previous one
/// means the kernel program restarted; the new reading is taken as the delta.
pub fn counter_delta(current: u64, previous: u64) -> u64 {
    if current >= previous {
        current - previous
    } else {
        current
    }
}

/// Coarse traffic class used as the counter key. Indices match the tc program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Ipv4,
    Ipv6,
    Icmp6,
    Other,
}

impl Category {
    pub const ALL: [Category; CATEGORY_COUNT as usize] =
        [Category::Ipv4, Category::Ipv6, Category::Icmp6, Category::Other];

    /// Maps a kernel-side index to a category; anything unknown is `Other`.
    pub fn from_index(idx: u32) -> Self {
        match idx {
            0 => Category::Ipv4,
            1 => Category::Ipv6,
            2 => Category::Icmp6,
            _ => Category::Other,
        }
    }

    pub fn index(self) -> u32 {
        match self {
            Category::Ipv4 => 0,
            Category::Ipv6 => 1,
            Category::Icmp6 => 2,
            Category::Other => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Ipv4 => "ipv4",
            Category::Ipv6 => "ipv6",
            Category::Icmp6 => "icmp6",
            Category::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of the per-interface hash map: (interface index, raw category index).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IfProtoKey {
    pub ifindex: u32,
    pub proto: u32,
}

impl IfProtoKey {
    pub const fn new(ifindex: u32, proto: u32) -> Self {
        Self { ifindex, proto }
    }

    pub fn category(&self) -> Category {
        Category::from_index(self.proto)
    }
}

// SAFETY: both types are #[repr(C)] plain integers with no padding.
#[cfg(target_os = "linux")]
unsafe impl aya::Pod for ProtoStats {}
#[cfg(target_os = "linux")]
unsafe impl aya::Pod for IfProtoKey {}
