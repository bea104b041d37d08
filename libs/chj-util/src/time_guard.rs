//! Scope timing for performance debugging.

//! `time_guard!` measures until the end of the enclosing scope and
//! reports at debug level. It is only active if the `TIME_GUARD` env
//! var is set to a truthy value or `enabled_set(true)` was called in
//! the thread; `notime_guard!` compiles it out.

use std::{time::Instant, fmt::Debug, cell::Cell};

fn time_guard_env_get() -> bool {
    match std::env::var("TIME_GUARD") {
        Ok(v) => !matches!(v.as_str(), "0" | "" | "off" | "false" | "no"),
        Err(_) => false
    }
}

thread_local!{
    pub static ENABLED: Cell<bool> = Cell::new(time_guard_env_get());
}

/// Enable `time_guard!` for the current thread.
pub fn enabled_set(on: bool) {
    ENABLED.with(|cell| cell.set(on))
}

pub fn enabled() -> bool {
    ENABLED.with(|old| old.get())
}

pub enum TimeGuard<S: Debug> {
    Disabled,
    Enabled {
        name: S,
        start: Instant
    },
}

impl<S: Debug> Drop for TimeGuard<S> {
    fn drop(&mut self) {
        match self {
            TimeGuard::Disabled => (),
            TimeGuard::Enabled { name, start } => {
                log::debug!("time {:?}: {:?}", name, start.elapsed());
            },
        }
    }
}

#[macro_export]
macro_rules! time_guard {
    ($namestr:expr) => {
        let _guard = if $crate::time_guard::enabled() {
            $crate::time_guard::TimeGuard::Enabled {
                name: $namestr,
                start: std::time::Instant::now()
            }
        } else {
            $crate::time_guard::TimeGuard::Disabled
        };
    }
}

#[macro_export]
macro_rules! notime_guard {
    ($namestr:expr) => {}
}
