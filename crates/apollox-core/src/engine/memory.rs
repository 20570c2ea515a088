use std::path::PathBuf;

/// Reports how much system memory is currently available for new work.
pub trait MemoryProbe: Send + Sync {
    /// Available memory in bytes, or `None` when it cannot be determined.
    fn available_bytes(&self) -> Option<u64>;
}

/// Reads `MemAvailable` from the kernel's meminfo file.
#[derive(Debug, Clone)]
pub struct SystemMemory {
    meminfo: PathBuf,
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self {
            meminfo: PathBuf::from("/proc/meminfo"),
        }
    }
}

impl SystemMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_meminfo(path: impl Into<PathBuf>) -> Self {
        Self {
            meminfo: path.into(),
        }
    }
}

fn parse_mem_available(content: &str) -> Option<u64> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix("MemAvailable:")?;
        let mut fields = rest.split_whitespace();
        let value: u64 = fields.next()?.parse().ok()?;
        match fields.next() {
            Some("kB") | None => value.checked_mul(1024),
            Some(_) => None,
        }
    })
}

impl MemoryProbe for SystemMemory {
    fn available_bytes(&self) -> Option<u64> {
        let content = std::fs::read_to_string(&self.meminfo).ok()?;
        parse_mem_available(&content)
    }
}

/// A probe that always reports the same amount.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemory(pub u64);

impl MemoryProbe for FixedMemory {
    fn available_bytes(&self) -> Option<u64> {
        Some(self.0)
    }
}
