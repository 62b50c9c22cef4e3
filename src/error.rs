//! Typed failure taxonomy for the sync engine.
//!
//! The engine distinguishes failures by blast radius: a malformed pagination
//! response poisons the cursor chain and aborts the whole walk, while a
//! rejected write batch or a single record's content failure is recovered
//! into the run summary and the run continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote source returned a page without the pagination metadata
    /// needed to continue the walk. Fatal for the call that hit it.
    #[error("source response missing pagination metadata: {context}")]
    SourceProtocol { context: String },

    /// The destination rejected one topic-row batch. Recovered: counted
    /// against the run, then the engine moves to the next batch.
    #[error("destination rejected a batch of {rows} rows")]
    BatchWrite {
        rows: usize,
        #[source]
        source: anyhow::Error,
    },

    /// One record's content fetch or upsert failed. Recovered: counted,
    /// then the engine moves to the next record.
    #[error("content sync failed for record {source_id}")]
    RecordSync {
        source_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Transport-level failure talking to the remote source.
    #[error("source request failed: {0}")]
    Transport(#[from] anyhow::Error),
}

impl SyncError {
    pub fn protocol(context: impl Into<String>) -> Self {
        SyncError::SourceProtocol {
            context: context.into(),
        }
    }
}
