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
use viewstats_core::SummaryKey;

/// Failure of the event or summary store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Summary {0} already exists")]
    Conflict(SummaryKey),

    #[error("Summary {0} not found")]
    Missing(SummaryKey),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Failure of a backend that only exists to make things faster or safer:
/// caches, sketch servers, lock services.
///
/// Callers on the query path never surface these; they log and fall back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{backend} backend unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },

    #[error("{backend} operation failed: {reason}")]
    Operation {
        backend: &'static str,
        reason: String,
    },
}

impl BackendError {
    pub fn unavailable(backend: &'static str, reason: impl Into<String>) -> Self {
        BackendError::Unavailable {
            backend,
            reason: reason.into(),
        }
    }

    pub fn operation(backend: &'static str, reason: impl Into<String>) -> Self {
        BackendError::Operation {
            backend,
            reason: reason.into(),
        }
    }
}
