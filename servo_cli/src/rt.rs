//! Real-time scheduling helpers (Linux SCHED_FIFO / affinity / mlockall).
//!
//! A 1 ms control tick tolerates very little scheduler jitter; on Linux the
//! process can opt into SCHED_FIFO, a fixed CPU, and locked memory. Failures
//! here degrade to warnings: the controller still runs, just with
//! best-effort timing.

use crate::cli::RtLock;

#[cfg(target_os = "linux")]
pub fn setup_rt_once(rt: bool, prio: Option<i32>, lock: RtLock, rt_cpu: Option<usize>) {
    use libc::{
        CPU_SET, CPU_ZERO, MCL_CURRENT, MCL_FUTURE, SCHED_FIFO, mlockall,
        sched_get_priority_max, sched_get_priority_min, sched_param, sched_setaffinity,
        sched_setscheduler,
    };
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !rt {
        return;
    }

    RT_ONCE.get_or_init(|| {
        // Memory locking per the selected mode
        let lock_rc = unsafe {
            match lock {
                RtLock::None => 0,
                RtLock::Current => mlockall(MCL_CURRENT),
                RtLock::All => mlockall(MCL_CURRENT | MCL_FUTURE),
            }
        };
        if lock_rc != 0 {
            let err = std::io::Error::last_os_error();
            tracing::warn!(?lock, error = %err, "mlockall failed; continuing unlocked");
        } else if lock != RtLock::None {
            tracing::info!(?lock, "process memory locked");
        }

        // SCHED_FIFO with a clamped priority
        unsafe {
            let min = sched_get_priority_min(SCHED_FIFO);
            let max = sched_get_priority_max(SCHED_FIFO);
            if min >= 0 && max >= min {
                let wanted = prio.unwrap_or((min + max) / 2).clamp(min, max);
                let param = sched_param {
                    sched_priority: wanted,
                };
                if sched_setscheduler(0, SCHED_FIFO, &param) != 0 {
                    let err = std::io::Error::last_os_error();
                    tracing::warn!(prio = wanted, error = %err, "SCHED_FIFO unavailable; using normal scheduling");
                } else {
                    tracing::info!(prio = wanted, "SCHED_FIFO enabled");
                }
            }
        }

        // Pin to one CPU so the tick never migrates mid-period
        unsafe {
            let cpu = rt_cpu.unwrap_or(0);
            let max_bits = std::mem::size_of::<libc::cpu_set_t>() * 8;
            if cpu < max_bits {
                let mut set: libc::cpu_set_t = std::mem::zeroed();
                CPU_ZERO(&mut set);
                CPU_SET(cpu, &mut set);
                if sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
                    let err = std::io::Error::last_os_error();
                    tracing::warn!(cpu, error = %err, "CPU pinning failed");
                } else {
                    tracing::info!(cpu, "pinned to CPU");
                }
            } else {
                tracing::warn!(cpu, "CPU index out of range; not pinning");
            }
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(rt: bool, _prio: Option<i32>, _lock: RtLock, _rt_cpu: Option<usize>) {
    if rt {
        tracing::warn!("--rt is only supported on Linux; running with normal scheduling");
    }
}
