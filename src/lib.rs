//! Browser verification harness for the bookmarks manager web app.
//!
//! A [`scenario::Scenario`] lists mock rules and steps; the
//! [`runner::ScenarioRunner`] runs it on a fresh [`session::Session`], waits
//! on page state through [`wait`], and records diagnostics on the first
//! failure.

pub mod bookmarks;
pub mod browser;
pub mod condition;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod locator;
pub mod logging;
pub mod mock;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod step;
pub mod utils;
pub mod wait;

pub use error::HarnessError;
