//! Platform automation providers
//!
//! Each platform module exposes `DesktopProvider` and `provider()`.
//! Windows drives UI Automation; everything else gets a provider that
//! reports itself unavailable.

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(not(target_os = "windows"))]
pub mod unsupported;

#[cfg(target_os = "windows")]
pub use self::windows as current;

#[cfg(not(target_os = "windows"))]
pub use self::unsupported as current;

pub use current::{provider, DesktopProvider};
