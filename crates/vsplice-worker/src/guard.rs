//! Memory ceiling enforcement.
//!
//! The guard reads a process-wide memory signal before and after every stage
//! and batch. It is advisory: concurrently running jobs all target the same
//! ceiling with no coordination between them.

use std::sync::{Arc, Mutex};

use sysinfo::{Pid, System};
use tracing::{debug, warn};

use crate::config::GuardConfig;
use crate::error::{PipelineError, PipelineResult};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One memory reading. `None` fields are unavailable or implausible.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryUsage {
    /// Resident memory of this process in MB
    pub used_mb: Option<f64>,
    /// Percentage of system memory in use
    pub percent: Option<f64>,
}

impl MemoryUsage {
    pub fn new(used_mb: f64, percent: f64) -> Self {
        Self {
            used_mb: Some(used_mb),
            percent: Some(percent),
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.used_mb.is_some() || self.percent.is_some()
    }
}

/// Classification of a reading against the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLevel {
    Normal,
    Warning,
    Critical,
    /// No usable reading; treated as within limits
    Unknown,
}

/// Source of memory readings.
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> MemoryUsage;

    /// Ask the allocator to return free memory to the OS.
    ///
    /// Returns whether anything was released. The default releases nothing.
    fn reclaim(&self) -> bool {
        false
    }
}

/// Reads process RSS and system usage through `sysinfo`.
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn sample(&self) -> MemoryUsage {
        let Ok(mut system) = self.system.lock() else {
            return MemoryUsage::unavailable();
        };

        system.refresh_memory();
        let total = system.total_memory();
        let percent = (total > 0)
            .then(|| system.used_memory() as f64 / total as f64 * 100.0)
            .filter(|p| p.is_finite() && *p > 0.0 && *p <= 100.0);

        let used_mb = self.pid.and_then(|pid| {
            system.refresh_process(pid);
            system.process(pid).map(|p| p.memory() as f64 / BYTES_PER_MB)
        });
        // RSS larger than physical memory is a bogus reading
        let total_mb = total as f64 / BYTES_PER_MB;
        let used_mb = used_mb.filter(|mb| *mb > 0.0 && (total == 0 || *mb <= total_mb));

        MemoryUsage { used_mb, percent }
    }

    fn reclaim(&self) -> bool {
        trim_heap()
    }
}

/// Return free heap pages to the OS.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn trim_heap() -> bool {
    // SAFETY: malloc_trim only releases unused pages held by the allocator.
    unsafe { libc::malloc_trim(0) == 1 }
}

/// Other allocators expose no portable trim call.
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn trim_heap() -> bool {
    false
}

enum GuardMode {
    Enforcing(Arc<dyn MemoryProbe>),
    Disabled,
}

/// Enforces the memory ceiling between stages and batches.
pub struct ResourceGuard {
    config: GuardConfig,
    mode: GuardMode,
}

impl ResourceGuard {
    /// Build a guard from configuration with the system probe.
    pub fn from_config(config: GuardConfig) -> Self {
        if config.enabled {
            Self::with_probe(config, Arc::new(SysinfoProbe::new()))
        } else {
            Self::disabled(config)
        }
    }

    pub fn with_probe(config: GuardConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            config,
            mode: GuardMode::Enforcing(probe),
        }
    }

    /// A guard that always reports "within limits".
    pub fn disabled(config: GuardConfig) -> Self {
        Self {
            config,
            mode: GuardMode::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.mode, GuardMode::Enforcing(_))
    }

    /// Number of items a stage processes between guard checks.
    pub fn batch_size(&self) -> usize {
        self.config.batch_size.max(1)
    }

    /// Current usage. Always unavailable when disabled.
    pub fn usage(&self) -> MemoryUsage {
        match &self.mode {
            GuardMode::Enforcing(probe) => probe.sample(),
            GuardMode::Disabled => MemoryUsage::unavailable(),
        }
    }

    /// Classify a reading.
    pub fn classify(&self, usage: &MemoryUsage) -> MemoryLevel {
        if !usage.is_available() {
            return MemoryLevel::Unknown;
        }

        let over = |ratio: f64| {
            usage.used_mb.is_some_and(|mb| mb > self.config.max_memory_mb * ratio)
                || usage.percent.is_some_and(|p| p > ratio * 100.0)
        };

        if usage.used_mb.is_some_and(|mb| mb > self.config.max_memory_mb)
            || usage.percent.is_some_and(|p| p > self.config.critical_ratio * 100.0)
        {
            MemoryLevel::Critical
        } else if over(self.config.warning_ratio) {
            MemoryLevel::Warning
        } else {
            MemoryLevel::Normal
        }
    }

    /// Check usage, reclaiming once when critical.
    ///
    /// Fails with `ResourceExhausted` if usage is still critical after
    /// reclamation.
    pub fn check(&self, context: &str) -> PipelineResult<MemoryLevel> {
        let probe = match &self.mode {
            GuardMode::Enforcing(probe) => probe,
            GuardMode::Disabled => return Ok(MemoryLevel::Normal),
        };

        let usage = probe.sample();
        match self.classify(&usage) {
            MemoryLevel::Unknown => {
                warn!(context, "Memory usage unavailable, assuming within limits");
                Ok(MemoryLevel::Unknown)
            }
            MemoryLevel::Normal => {
                debug!(context, used_mb = ?usage.used_mb, percent = ?usage.percent, "Memory OK");
                Ok(MemoryLevel::Normal)
            }
            MemoryLevel::Warning => {
                warn!(context, used_mb = ?usage.used_mb, percent = ?usage.percent, "Memory usage high");
                Ok(MemoryLevel::Warning)
            }
            MemoryLevel::Critical => {
                warn!(
                    context,
                    used_mb = ?usage.used_mb,
                    percent = ?usage.percent,
                    "Memory usage critical, attempting reclamation"
                );
                let released = probe.reclaim();

                let after = probe.sample();
                let level = self.classify(&after);
                if level == MemoryLevel::Critical {
                    let used_mb = after
                        .used_mb
                        .or(usage.used_mb)
                        .unwrap_or_else(|| self.percent_to_mb(after.percent));
                    return Err(PipelineError::ResourceExhausted {
                        used_mb,
                        limit_mb: self.config.max_memory_mb,
                    });
                }

                debug!(
                    context,
                    released,
                    used_mb = ?after.used_mb,
                    "Memory back under the ceiling"
                );
                Ok(level)
            }
        }
    }

    /// Best-effort MB figure when only a percentage is known.
    fn percent_to_mb(&self, percent: Option<f64>) -> f64 {
        percent.map_or(0.0, |p| p / 100.0 * self.config.max_memory_mb)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays readings in order, repeating the last one.
    pub(crate) struct ScriptedProbe {
        readings: Vec<MemoryUsage>,
        cursor: AtomicUsize,
        pub reclaims: AtomicUsize,
    }

    impl ScriptedProbe {
        pub(crate) fn new(readings: Vec<MemoryUsage>) -> Self {
            Self {
                readings,
                cursor: AtomicUsize::new(0),
                reclaims: AtomicUsize::new(0),
            }
        }
    }

    impl MemoryProbe for ScriptedProbe {
        fn sample(&self) -> MemoryUsage {
            let i = self.cursor.fetch_add(1, Ordering::SeqCst);
            self.readings
                .get(i)
                .or(self.readings.last())
                .copied()
                .unwrap_or_default()
        }

        fn reclaim(&self) -> bool {
            self.reclaims.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn guard(readings: Vec<MemoryUsage>) -> (ResourceGuard, Arc<ScriptedProbe>) {
        let probe = Arc::new(ScriptedProbe::new(readings));
        (
            ResourceGuard::with_probe(GuardConfig::default(), probe.clone()),
            probe,
        )
    }

    #[test]
    fn test_exhausted_after_reclamation_carries_values() {
        let (guard, probe) = guard(vec![MemoryUsage::new(600.0, 50.0), MemoryUsage::new(520.0, 50.0)]);

        let err = guard.check("after sample").unwrap_err();
        match err {
            PipelineError::ResourceExhausted { used_mb, limit_mb } => {
                assert_eq!(used_mb, 520.0);
                assert_eq!(limit_mb, 450.0);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(probe.reclaims.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reclamation_recovers() {
        let (guard, _) = guard(vec![MemoryUsage::new(600.0, 95.0), MemoryUsage::new(100.0, 40.0)]);
        assert_eq!(guard.check("stage").unwrap(), MemoryLevel::Normal);
    }

    #[test]
    fn test_percent_alone_can_be_critical() {
        let (guard, _) = guard(vec![MemoryUsage {
            used_mb: None,
            percent: Some(97.0),
        }]);
        assert!(matches!(
            guard.check("stage"),
            Err(PipelineError::ResourceExhausted { .. })
        ));
    }

    #[test]
    fn test_warning_level() {
        let (guard, probe) = guard(vec![MemoryUsage::new(100.0, 85.0)]);
        assert_eq!(guard.check("stage").unwrap(), MemoryLevel::Warning);
        assert_eq!(probe.reclaims.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unavailable_reading_is_within_limits() {
        let (guard, _) = guard(vec![MemoryUsage::unavailable()]);
        assert_eq!(guard.check("stage").unwrap(), MemoryLevel::Unknown);
    }

    #[test]
    fn test_sysinfo_memory_reclaims_and_resamples() {
        let probe = SysinfoProbe::new();
        let _ = probe.reclaim();
        let after = probe.sample();
        if let Some(mb) = after.used_mb {
            assert!(mb > 0.0);
        }
        if let Some(percent) = after.percent {
            assert!(percent > 0.0 && percent <= 100.0);
        }
    }

    #[test]
    fn test_disabled_guard_never_fails() {
        let guard = ResourceGuard::disabled(GuardConfig::default());
        assert!(!guard.is_enabled());
        assert_eq!(guard.check("stage").unwrap(), MemoryLevel::Normal);
        assert_eq!(guard.batch_size(), 3);
    }
}
