//! CPU placement for the two hot threads
//!
//! The system runs exactly two busy loops: the ingress poll loop, which
//! never yields, and the strategy core downstream of the SPSC ring. Each
//! gets its own isolated CPU and a SCHED_FIFO slot, with the poll loop
//! one notch above the strategy thread so a shared-core misconfiguration
//! degrades market data last. Migration between cores costs cache
//! residency and shows up directly as latency jitter.

use anyhow::{bail, Result};

/// SCHED_FIFO priority requested for the ingress poll loop
const POLL_PRIORITY: i32 = 49;
/// SCHED_FIFO priority requested for the strategy core
const STRATEGY_PRIORITY: i32 = 48;

/// Which hot loop a thread is about to become.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRole {
    /// Hardware poll loop: never sleeps, owns the ring producer side
    PollLoop,
    /// Strategy thread: owns the ring consumer side and everything after
    Strategy,
}

impl ThreadRole {
    fn requested_priority(self) -> i32 {
        match self {
            ThreadRole::PollLoop => POLL_PRIORITY,
            ThreadRole::Strategy => STRATEGY_PRIORITY,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ThreadRole::PollLoop => "poll-loop",
            ThreadRole::Strategy => "strategy",
        }
    }
}

/// Core assignment for the two hot threads.
///
/// `None` leaves a role unpinned (the scheduler places it). The two
/// roles may never share a core: the poll loop would starve the
/// strategy thread outright.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreLayout {
    pub poll_core: Option<usize>,
    pub strategy_core: Option<usize>,
    /// Request SCHED_FIFO for pinned roles
    pub realtime: bool,
}

impl CoreLayout {
    /// Reject layouts that put both hot loops on one core.
    pub fn validate(&self) -> Result<()> {
        if let (Some(poll), Some(strategy)) = (self.poll_core, self.strategy_core) {
            if poll == strategy {
                bail!(
                    "poll loop and strategy thread both assigned core {}; \
                     the poll loop never yields and would starve the strategy",
                    poll
                );
            }
        }
        Ok(())
    }

    /// Pin and (optionally) elevate the current thread for `role`.
    pub fn apply(&self, role: ThreadRole) -> Result<()> {
        self.validate()?;

        let core = match role {
            ThreadRole::PollLoop => self.poll_core,
            ThreadRole::Strategy => self.strategy_core,
        };

        if let Some(core) = core {
            pin_to_core(core)?;
        }

        if self.realtime {
            let applied = set_realtime_priority(role.requested_priority())?;
            tracing::info!(
                "{} thread scheduled SCHED_FIFO:{} on core {:?}",
                role.name(),
                applied,
                core
            );
        }

        Ok(())
    }
}

/// Pin the current thread to a specific CPU core.
///
/// The core id is resolved against the visible core set first, so a
/// layout naming a nonexistent core fails here rather than silently
/// leaving the thread floating.
pub fn pin_to_core(core: usize) -> Result<()> {
    let cores = core_affinity::get_core_ids().unwrap_or_default();
    let Some(core_id) = cores.iter().find(|c| c.id == core).copied() else {
        bail!("core {} not present ({} cores visible)", core, cores.len());
    };

    if !core_affinity::set_for_current(core_id) {
        bail!("failed to pin thread to core {}", core);
    }

    tracing::info!("pinned thread to CPU core {}", core);
    Ok(())
}

/// Set SCHED_FIFO scheduling for the current thread (Linux only).
///
/// The requested priority is clamped into the policy's valid range as
/// reported by the kernel; the applied priority is returned. Requires
/// CAP_SYS_NICE or root.
#[cfg(target_os = "linux")]
pub fn set_realtime_priority(priority: i32) -> Result<i32> {
    use libc::{
        sched_get_priority_max, sched_get_priority_min, sched_param, sched_setscheduler,
        SCHED_FIFO,
    };

    unsafe {
        let min = sched_get_priority_min(SCHED_FIFO);
        let max = sched_get_priority_max(SCHED_FIFO);
        let clamped = if min >= 0 && max >= min {
            priority.clamp(min, max)
        } else {
            priority
        };

        let param = sched_param {
            sched_priority: clamped,
        };
        if sched_setscheduler(0, SCHED_FIFO, &param) != 0 {
            bail!(
                "sched_setscheduler(SCHED_FIFO, {}) failed (needs CAP_SYS_NICE or root)",
                clamped
            );
        }

        tracing::info!("set thread scheduling to SCHED_FIFO:{}", clamped);
        Ok(clamped)
    }
}

/// Real-time scheduling is unavailable off Linux; the request is
/// acknowledged without effect.
#[cfg(not(target_os = "linux"))]
pub fn set_realtime_priority(priority: i32) -> Result<i32> {
    tracing::warn!("real-time scheduling not supported on this platform");
    Ok(priority)
}

/// Number of visible CPU cores
pub fn num_cores() -> usize {
    core_affinity::get_core_ids()
        .map(|ids| ids.len())
        .unwrap_or(1)
}
