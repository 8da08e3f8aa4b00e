//! # asymrcu-harness
//!
//! Stress and litmus driver for the asymrcu grace-period engine.
//!
//! The [`stress`] module runs the classic publish/read workload: one
//! updater republishing a monotone sequence through an RCU-protected cell,
//! many readers checking they never observe a poisoned (reclaimed) buffer.
//! The [`litmus`] module runs the store-buffering experiment that probes
//! the sequential-consistency half of the grace-period contract. The
//! [`report`] module serializes run summaries as JSON for log scraping.

pub mod litmus;
pub mod report;
pub mod stress;
