//! Resident memory sampling for the current process.

use std::sync::{Mutex, MutexGuard};

use log::warn;
use sysinfo::{Pid, System};

use crate::config::MemoryConfig;

const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    Normal,
    Elevated,
    Critical,
}

pub struct MemoryMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    warning_mb: Option<u64>,
    critical_mb: Option<u64>,
}

impl MemoryMonitor {
    pub fn new(config: &MemoryConfig) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Memory monitoring unavailable: {}", e);
                None
            }
        };

        Self {
            system: Mutex::new(System::new()),
            pid,
            warning_mb: config.warning_mb,
            critical_mb: config.critical_mb,
        }
    }

    pub fn critical_mb(&self) -> Option<u64> {
        self.critical_mb
    }

    fn lock_system(&self) -> MutexGuard<'_, System> {
        match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Memory monitor lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Current resident set size in MB, if it can be read on this platform.
    pub fn resident_mb(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.lock_system();
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|p| p.memory() / MB)
    }

    pub fn classify(&self, resident_mb: u64) -> MemoryPressure {
        match (self.warning_mb, self.critical_mb) {
            (_, Some(critical)) if resident_mb >= critical => MemoryPressure::Critical,
            (Some(warning), _) if resident_mb >= warning => MemoryPressure::Elevated,
            _ => MemoryPressure::Normal,
        }
    }

    /// Samples memory and classifies it. Returns the sample alongside.
    pub fn pressure(&self) -> (MemoryPressure, Option<u64>) {
        match self.resident_mb() {
            Some(mb) => (self.classify(mb), Some(mb)),
            None => (MemoryPressure::Normal, None),
        }
    }
}
