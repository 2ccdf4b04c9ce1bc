//! # Evidence Harness
//!
//! Concurrent evidence collection about a named entity (person,
//! organization, domain) from independent public sources.
//!
//! A query fans out to every enabled connector at once. Each connector
//! reaches the network only through the SSRF-safe [`fetcher`], under its own
//! rate-limit gate and deadline, so one slow or failing source never blocks
//! or breaks the others. Results are normalized into content-addressed
//! documents, deduplicated by canonical URL, and every pipeline run is
//! recorded in an append-only audit log with per-day Merkle roots.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────────┐   ┌──────────────┐
//! │ Orchestrator │──▶│ Connector × N       │──▶│   Fetcher    │
//! │  (fan-out)   │   │ gate+deadline+retry │   │ allow-list,  │
//! └──────┬───────┘   └─────────────────────┘   │ IP checks    │
//!        │ raw docs                             └──────────────┘
//!        ▼
//! ┌──────────────┐   ┌──────────────┐
//! │  Normalize   │──▶│  Audit log   │
//! │ hash + dedup │   │ Merkle roots │
//! └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! evh search "Alice Smith" --type person
//! evh profile example.com --type domain --metrics
//! evh audit root
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`fetcher`] | SSRF-safe HTTP fetcher |
//! | [`retry`] | Exponential backoff and the connector fetch client |
//! | [`traits`] | Connector trait and registry |
//! | [`supervisor`] | Per-connector gate, deadline, metrics and isolation |
//! | [`orchestrator`] | Concurrent fan-out with ordered fan-in |
//! | [`normalize`] | Canonical URLs, content hashing, deduplication |
//! | [`extract`] | Signals, timeline events, log redaction |
//! | [`metrics`] | In-process metrics |
//! | [`audit`] | Append-only audit log and Merkle roots |
//! | [`pipeline`] | `search` and `profile` operations |
//! | [`backup`] | JSON backup and restore of document sets |

pub mod audit;
pub mod backup;
pub mod config;
pub mod connector_github;
pub mod connector_news;
pub mod connector_placeholder;
pub mod connector_rdap;
pub mod connector_wiki;
pub mod extract;
pub mod fetcher;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod supervisor;
pub mod traits;
