//! Canonical type definitions for 0G storage networks.
//!
//! Each network bundles its chain id with the public endpoints a client needs:
//! the EVM RPC used for submissions, the indexer used for node discovery, and the
//! flow contract where it is published.
//!
//! # Features
//!
//! - `serde`: Enable serde serialization/deserialization

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod named;

pub use named::NamedNetwork;
