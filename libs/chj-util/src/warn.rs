//! Logging statements carrying their source location.
//!
//! These go through the `log` facade; whoever runs the program picks
//! the backend (the server binary uses `env_logger`). The message
//! shape is "<message> at <file> line <n>", as it always was on
//! stderr.

#[macro_export]
macro_rules! _log_at {
    ($level:expr, $($arg:tt)+) => {
        $crate::log::log!($level, "{} at {:?} line {}",
                          format_args!($($arg)+),
                          file!(), line!())
    }
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => {
        $crate::_log_at!($crate::log::Level::Warn, $($arg)+)
    }
}

#[macro_export]
macro_rules! nowarn {
    ($($arg:tt)*) => {
    }
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => {
        $crate::_log_at!($crate::log::Level::Info, $($arg)+)
    }
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => {
        $crate::_log_at!($crate::log::Level::Debug, $($arg)+)
    }
}

/// Lifecycle chatter; off unless `RUST_LOG` asks for trace.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => {
        $crate::_log_at!($crate::log::Level::Trace, $($arg)+)
    }
}

/// Print a value with a label at debug level, and return it.
#[macro_export]
macro_rules! pp {
    ($namestr:expr, $val:expr) => {{
        let res = $val;
        $crate::log::debug!("{}: {:?}", $namestr, res);
        res
    }}
}

#[macro_export]
macro_rules! nopp {
    ($namestr:expr, $arg:expr) => {
        $arg
    }
}
