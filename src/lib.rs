//! # qosnet - Multi-service network QoS experiments
//!
//! This library plans per-host traffic shaping for an emulated multi-service
//! network, drives synthetic workloads for three service classes, and turns
//! packet-capture summaries into protocol, host and per-class statistics.
//!
//! ## Overview
//!
//! An experiment compares network behaviour with and without QoS shaping,
//! under substrate-default or statically pinned routing. Each run:
//!
//! 1. builds a hierarchical shaping tree per attachment point from the
//!    service profiles and hands it to an installer,
//! 2. runs the workload units (bulk request/response, adaptive realtime
//!    streaming, periodic telemetry, cross-class transfers) under a
//!    supervisor with a join timeout,
//! 3. ingests one capture summary per aggregation point and folds them into
//!    an aggregate report,
//! 4. writes text and JSON reports plus chart data under
//!    `<results_dir>/<run_id>/`.
//!
//! ## Architecture
//!
//! - `service`: service class tags
//! - `topology`: attachment points, aggregation points, links and routes
//! - `qos`: service profiles, shaping tree builder and installers
//! - `workload`: traffic models and the unit supervisor
//! - `capture`: capture summary parsing, tcpdump conversion and the in-process tap
//! - `analysis`: aggregation, class lookup and run reports
//! - `config` / `config_loader`: YAML experiment configuration
//! - `experiment`: single runs, the full suite and the demo
//! - `utils`: rate and address helpers
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use qosnet::config_loader;
//! use qosnet::experiment::{ExperimentRunner, RoutingMode, RunOptions};
//!
//! let config = config_loader::load_or_reference(None)?;
//! let runner = ExperimentRunner::new(config);
//! let outcome = runner.run_single(RunOptions {
//!     qos: true,
//!     routing: RoutingMode::Static,
//!     duration: Duration::from_secs(60),
//! })?;
//! println!("{}", outcome.artifacts.text_report.display());
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! general:
//!   duration: 60s
//!   results_dir: results
//!   seed: 42
//!
//! topology:
//!   attachment_points:
//!     - { id: h1, address: 10.0.0.1, service: bulk }
//!   aggregation_points:
//!     - { id: s1 }
//!   links:
//!     - { a: h1, b: s1, capacity: 100mbit, latency: 1ms }
//!
//! policies:
//!   - { service: bulk, guaranteed: 80mbit, ceiling: 100mbit, priority: 1 }
//!
//! workloads:
//!   units:
//!     - { name: web, service: bulk, source: h1, destination: h2 }
//! ```
//!
//! ## Error Handling
//!
//! Components report typed `thiserror` errors; orchestration and the
//! binaries use `color_eyre` with context attached at each layer.

pub mod analysis;
pub mod capture;
pub mod config;
pub mod config_loader;
pub mod experiment;
pub mod qos;
pub mod service;
pub mod topology;
pub mod utils;
pub mod workload;
