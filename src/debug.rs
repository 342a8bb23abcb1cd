/* Copyright (C) 2017-2024 Open Information Security Foundation
 *
 * You can copy, redistribute or modify this Program under the terms of
 * the GNU General Public License version 2 as published by the Free
 * Software Foundation.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * version 2 along with this program; if not, write to the Free Software
 * Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA
 * 02110-1301, USA.
 */

//! Log macros for the SMB transport.
//!
//! Messages go to a callback the embedding engine registers, or to
//! stderr when nothing is registered (unit tests, small tools).

use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum Level {
    Error = 1,
    Warning,
    Notice,
    Info,
    Config = 6,
    #[cfg(feature = "debug")]
    Debug,
}

/// Host log callback: level, source file, line, function, message.
pub type LogFn = fn(level: i32, file: &str, line: u32, function: &str, message: &str);

static LEVEL: AtomicI32 = AtomicI32::new(Level::Notice as i32);
static LOGGER: OnceLock<LogFn> = OnceLock::new();

pub fn set_log_level(level: Level) {
    LEVEL.store(level as i32, Ordering::Relaxed);
}

pub fn log_enabled(level: Level) -> bool {
    LEVEL.load(Ordering::Relaxed) >= level as i32
}

/// Returns false when a logger is already in place; the first one stays.
pub fn register_logger(f: LogFn) -> bool {
    LOGGER.set(f).is_ok()
}

fn short_name(file: &str) -> &str {
    Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file)
}

pub fn sclog(level: Level, file: &str, line: u32, function: &str, message: &str) {
    let file = short_name(file);
    match LOGGER.get() {
        Some(f) => f(level as i32, file, line, function, message),
        None => eprintln!("{}:{} <{:?}> -- {}", file, line, level, message),
    }
}

/// Path of the enclosing function, without the trailing `::__f`.
#[macro_export(local_inner_macros)]
macro_rules! function {
    () => {{
        fn __f() {}
        fn name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = name_of(__f);
        name.strip_suffix("::__f").unwrap_or(name)
    }};
}

#[macro_export]
macro_rules! do_log {
    ($level:expr, $($arg:tt)*) => {
        if $crate::debug::log_enabled($level) {
            $crate::debug::sclog($level, file!(), line!(), $crate::function!(),
                  &(format!($($arg)*)));
        }
    }
}

#[macro_export]
macro_rules! SCLogError {
    ($($arg:tt)*) => {
        $crate::do_log!($crate::debug::Level::Error, $($arg)*);
    };
}

#[macro_export]
macro_rules! SCLogWarning {
    ($($arg:tt)*) => {
        $crate::do_log!($crate::debug::Level::Warning, $($arg)*);
    };
}

#[macro_export]
macro_rules! SCLogNotice {
    ($($arg:tt)*) => {
        $crate::do_log!($crate::debug::Level::Notice, $($arg)*);
    }
}

#[macro_export]
macro_rules! SCLogInfo {
    ($($arg:tt)*) => {
        $crate::do_log!($crate::debug::Level::Info, $($arg)*);
    }
}

#[macro_export]
macro_rules! SCLogConfig {
    ($($arg:tt)*) => {
        $crate::do_log!($crate::debug::Level::Config, $($arg)*);
    }
}

#[cfg(feature = "debug")]
#[macro_export]
macro_rules! SCLogDebug {
    ($($arg:tt)*) => {
        $crate::do_log!($crate::debug::Level::Debug, $($arg)*);
    }
}

// Without the debug feature the arguments are dropped unexpanded.
#[cfg(not(feature = "debug"))]
#[macro_export]
macro_rules! SCLogDebug {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "debug-validate"))]
#[macro_export]
macro_rules! debug_validate_bug_on (
  ($item:expr) => {};
);

#[cfg(feature = "debug-validate")]
#[macro_export]
macro_rules! debug_validate_bug_on (
  ($item:expr) => {
    if $item {
        panic!("debug validation failed: {}", stringify!($item));
    }
  };
);
