//! # githarvest — incremental GitHub organization commit harvester
//!
//! A small long-lived process that harvests commit history for every
//! repository in a GitHub organization, appends the commits to one
//! newline-delimited-JSON log per repository, and tracks a per-repository
//! watermark (last successful fetch time) in Consul's KV store so that
//! repeated runs only fetch new commits.
//!
//! ## Overview
//!
//! At startup the process lists the organization's source repositories and
//! spawns one independent poll task per repository. Each task runs one
//! cycle: read the watermark, fetch everything newer from the paginated
//! commits API, append the batch to the repository's log, then commit the
//! cycle's start time as the new watermark. A cycle that fails leaves the
//! watermark untouched, so the next run re-fetches the same window —
//! commits can be appended twice across failures but never lost
//! (at-least-once).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   get/set    ┌─────────────────┐
//! │  Poll task   │─────────────▶│ Consul KV       │  watermark per repo
//! │  (per repo)  │              └─────────────────┘
//! │              │   commits    ┌─────────────────┐
//! │ fetch →      │─────────────▶│ GitHub API      │  paginated, 100/page
//! │ serialize →  │              └─────────────────┘
//! │ append →     │   append     ┌─────────────────┐
//! │ commit mark  │─────────────▶│ fs / object log │  /commits/<repo>.log
//! └──────────────┘              └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`]: flag/environment settings and storage backend selection
//! - [`error`]: error taxonomy for the pipeline's failure modes
//! - [`github`]: paginated commit source over the GitHub REST API
//! - [`watermark`]: per-repository watermarks in Consul's KV store
//! - [`storage`]: append-only log backends (local fs, HTTP object store)
//! - [`poller`]: the per-repository fetch→serialize→append→commit cycle

/// Process configuration from flags and environment
pub mod config;

/// Error types and utilities
pub mod error;

/// GitHub commit source with paginated retrieval
pub mod github;

/// Per-repository poll cycle and task scheduling
pub mod poller;

/// Append-only commit log backends
pub mod storage;

/// Per-repository fetch watermarks in Consul
pub mod watermark;
