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

use thiserror::Error;
use viewstats_core::ValidationError;
use viewstats_storage::StorageError;

/// Errors surfaced by analytics operations.
///
/// Cache, sketch and lock backend failures are absent on purpose: they are
/// logged and replaced by a fallback, never returned.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Summary commit failed; nothing from the run was written
    #[error("Failed to persist summaries: {0}")]
    Persistence(#[source] StorageError),

    #[error("Lock '{0}' is held by another run")]
    LockContended(String),

    #[error("No lock backend reachable for '{0}'")]
    LockUnavailable(String),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
