//! # beaver-rs
//!
//! A beaver family collects sticks for the winter. Each trip out is a job;
//! a fixed pool of workers claims jobs from an in-process queue, spends a
//! while foraging, then records one excursion row in Postgres.
//!
//! Provides the job queue and worker pool, excursion identifier allocation,
//! a Postgres gateway (plus an in-memory one), and tracing/OpenTelemetry setup.

pub mod allocator;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod queue;
pub mod storage;
pub mod telemetry;
