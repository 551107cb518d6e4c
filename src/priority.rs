//! Reader thread priority.
//!
//! Priorities use a `1..=99` scale with `50` as "medium"; `0` or less in configuration
//! means medium. On Linux the reader thread maps its priority onto a nice value
//! (`1 → 19`, `50 → 0`, `99 → −20`) with `setpriority(2)`. Raising priority above
//! normal usually needs `CAP_SYS_NICE`; a refusal is logged and the thread runs on at
//! its inherited priority. Other platforms keep the inherited priority.

use crate::error::ConfigError;
use tracing::debug;
#[cfg(target_os = "linux")]
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadPriority(u8);

impl ThreadPriority {
    pub const MIN: ThreadPriority = ThreadPriority(1);
    pub const MEDIUM: ThreadPriority = ThreadPriority(50);
    pub const MAX: ThreadPriority = ThreadPriority(99);

    /// `..=0` → medium; `1..=99` as given; above 99 is rejected.
    pub fn from_config(value: i64) -> Result<Self, ConfigError> {
        match value {
            ..=0 => Ok(Self::MEDIUM),
            1..=99 => Ok(Self(value as u8)),
            _ => Err(ConfigError::OutOfRange {
                field: "priority",
                value,
            }),
        }
    }

    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Equivalent nice value, linear from 19 (lowest) to −20 (highest).
    pub fn nice(self) -> i32 {
        19 - (i32::from(self.0) - 1) * 39 / 98
    }

    /// Apply to the calling thread. Failures are logged, never returned.
    pub fn apply_to_current_thread(self) {
        #[cfg(target_os = "linux")]
        {
            let nice = self.nice();
            // SAFETY: gettid and setpriority take plain integers and touch no Rust memory.
            let rc = unsafe {
                let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
                libc::setpriority(libc::PRIO_PROCESS, tid, nice)
            };
            if rc == 0 {
                debug!(priority = self.0, nice, "reader thread priority set");
            } else {
                warn!(
                    priority = self.0,
                    nice,
                    "can't set reader thread priority: {}",
                    std::io::Error::last_os_error()
                );
            }
        }
        #[cfg(not(target_os = "linux"))]
        debug!(priority = self.0, "thread priority not supported here, keeping default");
    }
}

impl Default for ThreadPriority {
    fn default() -> Self {
        Self::MEDIUM
    }
}
