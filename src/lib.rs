//! # registry-mirror - historical mirror of a component registry
//!
//! Builds a versioned, content-addressed mirror of a component registry
//! (UI components, hooks, blocks) by replaying successive upstream commits.
//! Every file of every component keeps its current content plus the full
//! chain of distinct earlier versions, attributed to the commit that
//! introduced each one.
//!
//! ## Overview
//!
//! For each relevant commit a snapshot producer reports a manifest of
//! components and their files. The merge engine digests every referenced
//! file, compares against the last known version, and archives superseded
//! content. The result is persisted as a simplified `index.json` plus one
//! full document per component under `items/`, and exposed read-only over
//! HTTP.
//!
//! ## Architecture
//!
//! ```text
//! upstream git ──► CommitSource ──► SnapshotProducer ──► merge ──► MirrorStore
//!                  (git walker)     (build + manifest)   (engine)  (index.json,
//!                                                                   items/*.json)
//!                                                                       │
//!                                                               read API (hyper)
//! ```
//!
//! ## Modules
//!
//! - [`mirror`]: the mirror data model, merge engine and persisted store
//! - [`manifest`]: snapshot manifests in the structured and legacy shapes
//! - [`digest`]: content fingerprints
//! - [`git`]: commit listing, relevance filtering and checkout
//! - [`snapshot`]: turning a checked-out commit into a manifest
//! - [`sync`]: whole-history runs with resumable progress
//! - [`web`]: the read-only HTTP API
//! - [`config`]: configuration with environment variable overrides
//!
//! ## Usage Example
//!
//! ```no_run
//! use registry_mirror::manifest::Manifest;
//! use registry_mirror::mirror::{CommitRef, MirrorStore, merge_manifest};
//! use std::path::Path;
//!
//! fn main() -> Result<(), registry_mirror::error::MirrorError> {
//!     let manifest = Manifest::load(Path::new("checkout/registry.json"))?;
//!     let store = MirrorStore::new("mirror");
//!     let commit = CommitRef::new("3f2a9c1", "2024-03-01T12:00:00Z");
//!
//!     let outcome = merge_manifest(&manifest, Path::new("checkout"), &store, &commit, None)?;
//!     println!("{} added, {} updated", outcome.added(), outcome.updated());
//!     Ok(())
//! }
//! ```

/// Configuration management with environment variable overrides
pub mod config;

/// SHA-256 content digests
pub mod digest;

/// Error types and utilities
pub mod error;

/// Git repository walking, commit filtering and checkout
pub mod git;

/// Cross-process lock on a mirror output directory
pub mod lock;

/// Snapshot manifests in both descriptor shapes
pub mod manifest;

/// Mirror data model, merge engine and persistence
pub mod mirror;

/// Platform-specific default locations
pub mod paths;

/// Producing a manifest from a checked-out commit
pub mod snapshot;

/// Replaying upstream history into the mirror
pub mod sync;

/// Persisted record of commits already merged
pub mod sync_state;

/// Read-only HTTP API over the persisted mirror
pub mod web;
