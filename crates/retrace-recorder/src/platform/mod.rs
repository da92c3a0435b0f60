//! Global input hooks per platform
//!
//! `SystemSource` is the hook-backed [`InputSource`](crate::capture::InputSource)
//! for the current platform.

#[cfg(any(target_os = "windows", target_os = "macos"))]
pub mod rdev_hooks;

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub mod unsupported;

#[cfg(any(target_os = "windows", target_os = "macos"))]
pub use rdev_hooks::RdevSource as SystemSource;

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub use unsupported::NoHooks as SystemSource;

pub fn system_source() -> SystemSource {
    SystemSource::default()
}
