// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Viewstats Storage
//!
//! Data-access seams for the analytics engine and in-memory reference
//! implementations of each:
//!
//! - [`EventStore`]: read-only aggregation over raw view events and the blog catalog
//! - [`SummaryStore`]: daily summary rows with atomic batch upserts
//! - [`AdvisoryLocks`]: database-level advisory locking
//! - [`CacheBackend`]: key/value cache with per-entry TTL and conditional insert
//! - [`SketchBackend`]: mergeable HyperLogLog sketches keyed by string

pub mod access;
pub mod cache;
pub mod error;
pub mod memory;
pub mod sketch_backend;
pub mod sketches;

pub use access::{
    AdvisoryLocks, AggregateQuery, AggregateRow, Dimension, EventStore, MemberSetRow,
    SummaryBatch, SummaryStore,
};
pub use cache::{CacheBackend, MemoryCache};
pub use error::{BackendError, StorageError};
pub use memory::MemoryStore;
pub use sketch_backend::{sketch_key, MemorySketches, SketchBackend};
pub use sketches::HyperLogLog;
