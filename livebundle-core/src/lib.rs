#![doc = "livebundle-core: packaging, integrity and upload pipeline for livebundle."]

//! This crate contains all transport-agnostic logic for publishing live
//! update bundles: asset collection, manifest generation, archive packaging,
//! checksums and signatures, and the bounded-concurrency upload coordinator.
//! The HTTP client lives in the `livebundle` binary crate.
//!
//! # Usage
//! Build a [`publish::PublishConfig`] and hand it to [`publish::publish`]
//! together with any [`contract::BundleResource`] implementation.

pub mod assets;
pub mod config;
pub mod contract;
pub mod error;
pub mod integrity;
pub mod manifest;
pub mod package;
pub mod pool;
pub mod publish;
pub mod upload;

pub use error::{BundleError, ResourceError};
