use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::phase::ProcessPhase;

/// Terminal status persisted for a task's result record.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Persistence seam for phase and result metadata.
///
/// The runner is the only caller, and it calls exactly once per terminal
/// outcome — the storage backend (database, tracker comments, flat files)
/// lives outside this crate.
pub trait RecordStore: Send + Sync {
    fn update_phase(
        &self,
        item_key: &str,
        phase: ProcessPhase,
    ) -> impl std::future::Future<Output = Result<(), String>> + Send;

    fn create_result(
        &self,
        item_key: &str,
        phase_label: &str,
        output_path: Option<&Path>,
        status: ResultStatus,
    ) -> impl std::future::Future<Output = Result<(), String>> + Send;
}

/// A result record captured by the in-memory store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredResult {
    pub item_key: String,
    pub phase_label: String,
    pub output_path: Option<PathBuf>,
    pub status: ResultStatus,
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryRecordStore {
    phases: Mutex<Vec<(String, ProcessPhase)>>,
    results: Mutex<Vec<StoredResult>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phases(&self) -> Vec<(String, ProcessPhase)> {
        self.phases
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn results(&self) -> Vec<StoredResult> {
        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl RecordStore for MemoryRecordStore {
    async fn update_phase(&self, item_key: &str, phase: ProcessPhase) -> Result<(), String> {
        self.phases
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((item_key.to_string(), phase));
        Ok(())
    }

    async fn create_result(
        &self,
        item_key: &str,
        phase_label: &str,
        output_path: Option<&Path>,
        status: ResultStatus,
    ) -> Result<(), String> {
        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(StoredResult {
                item_key: item_key.to_string(),
                phase_label: phase_label.to_string(),
                output_path: output_path.map(Path::to_path_buf),
                status,
            });
        Ok(())
    }
}
