//! Browsing-surface abstraction for the viability workflow engine.
//!
//! The workflow core never talks to a browser library directly: it acts
//! through the [`Surface`]/[`BrowserSession`]/[`BrowserLauncher`] traits
//! defined here. The production implementation drives Chromium over CDP; the
//! `mock` feature supplies scripted doubles for tests.

pub mod chromium;
pub mod errors;
pub mod health;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod surface;

pub use chromium::{ChromiumLauncher, ChromiumSession, ChromiumSurface};
pub use errors::SurfaceError;
pub use health::ensure_active;
pub use surface::{
    BrowserLauncher, BrowserSession, ClickableElement, Key, LaunchOptions, Readiness, Surface,
};
