//! Chunked bulk import of source rows into a record scope.
//!
//! Each chunk is one `create_batch` call. A failed chunk is counted and
//! skipped; chunks committed before it stay committed.

use log::{debug, warn};
use serde::Serialize;

use crate::{
    data::RecordData,
    error::AppError,
    store::{RecordStore, Scope},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub attempted: usize,
    pub imported: usize,
    pub failed_chunks: usize,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.failed_chunks == 0
    }

    /// The aggregate failure, if any chunk was lost.
    pub fn as_warning(&self) -> Option<AppError> {
        (!self.is_complete()).then(|| AppError::ImportPartialFailure {
            imported: self.imported,
            attempted: self.attempted,
            failed_chunks: self.failed_chunks,
        })
    }
}

pub fn import_rows(
    store: &dyn RecordStore,
    scope: &Scope,
    rows: Vec<RecordData>,
    chunk_size: usize,
) -> ImportReport {
    let chunk_size = chunk_size.max(1);
    let mut report = ImportReport {
        attempted: rows.len(),
        ..ImportReport::default()
    };
    let mut rows = rows.into_iter().peekable();
    let mut chunk_index = 0usize;
    while rows.peek().is_some() {
        chunk_index += 1;
        let chunk = rows.by_ref().take(chunk_size).collect::<Vec<_>>();
        let len = chunk.len();
        match store.create_batch(scope, chunk) {
            Ok(count) => {
                report.imported += count;
                debug!("Imported chunk {chunk_index} ({count} row(s))");
            }
            Err(err) => {
                report.failed_chunks += 1;
                warn!("Import chunk {chunk_index} ({len} row(s)) failed: {err}");
            }
        }
    }
    report
}
