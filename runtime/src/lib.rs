//! Argus runtime — scheduling, browser capture, persistence and CLI around
//! the pure `argus-core` extraction library.
//!
//! The scheduler turns due targets into queued capture jobs; the worker
//! claims jobs, drives a [`capture::CaptureOrchestrator`] per job in its own
//! browser context, and records immutable capture runs with their change
//! summaries.

pub mod audit;
pub mod capture;
pub mod cli;
pub mod config;
pub mod logging;
pub mod model;
pub mod pool;
pub mod renderer;
pub mod runs;
pub mod scheduler;
pub mod store;
pub mod worker;
