use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::events::{Event, EventBus, EventType};
use crate::log_info;
use crate::phase::ProcessPhase;
use crate::store::RecordStore;

/// An issue record fetched from the tracking service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct IssueRecord {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
}

/// Tracking-service fetch seam. The HTTP client lives outside this crate.
pub trait IssueSource: Send + Sync {
    fn fetch(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<IssueRecord, String>> + Send;
}

/// Media download + frame extraction seam. The command wrappers (curl,
/// ffmpeg) live outside this crate.
pub trait MediaCollector: Send + Sync {
    fn download(
        &self,
        record: &IssueRecord,
        dest: &Path,
    ) -> impl std::future::Future<Output = Result<Vec<PathBuf>, String>> + Send;

    fn extract_frames(
        &self,
        media: &[PathBuf],
        dest: &Path,
    ) -> impl std::future::Future<Output = Result<Vec<PathBuf>, String>> + Send;
}

/// Derived-document renderer seam.
pub trait DocumentRenderer: Send + Sync {
    fn render(
        &self,
        record: &IssueRecord,
        frames: &[PathBuf],
        dest: &Path,
    ) -> impl std::future::Future<Output = Result<PathBuf, String>> + Send;
}

/// Drive the intake side of the workflow for one issue: fetch, collect
/// media, extract frames, render the analysis document.
///
/// Publishes a `PhaseChange` per stage and records the phase in the store
/// so history and UI track intake the same way they track agent phases.
/// Returns the rendered document path, ready to hand to the plan lane.
pub async fn run_intake<I, M, R, S>(
    source: &I,
    media: &M,
    renderer: &R,
    store: &S,
    bus: &EventBus,
    item_key: &str,
    workdir: &Path,
) -> Result<PathBuf, String>
where
    I: IssueSource,
    M: MediaCollector,
    R: DocumentRenderer,
    S: RecordStore,
{
    let intake_dir = workdir.join(".issue-pilot").join("intake").join(item_key);
    tokio::fs::create_dir_all(&intake_dir)
        .await
        .map_err(|e| format!("Failed to create {}: {}", intake_dir.display(), e))?;

    enter_stage(store, bus, item_key, ProcessPhase::FetchingSource).await;
    let record = match source.fetch(item_key).await {
        Ok(record) => record,
        Err(e) => return Err(fail_intake(store, bus, item_key, e).await),
    };

    enter_stage(store, bus, item_key, ProcessPhase::DownloadingMedia).await;
    let downloaded = match media.download(&record, &intake_dir).await {
        Ok(paths) => paths,
        Err(e) => return Err(fail_intake(store, bus, item_key, e).await),
    };

    enter_stage(store, bus, item_key, ProcessPhase::ExtractingFrames).await;
    let frames = match media.extract_frames(&downloaded, &intake_dir).await {
        Ok(paths) => paths,
        Err(e) => return Err(fail_intake(store, bus, item_key, e).await),
    };

    enter_stage(store, bus, item_key, ProcessPhase::GeneratingDocument).await;
    let document = match renderer.render(&record, &frames, &intake_dir).await {
        Ok(path) => path,
        Err(e) => return Err(fail_intake(store, bus, item_key, e).await),
    };

    enter_stage(store, bus, item_key, ProcessPhase::Phase1Complete).await;
    log_info!("[{}] Document ready: {}", item_key, document.display());

    Ok(document)
}

async fn enter_stage<S: RecordStore>(
    store: &S,
    bus: &EventBus,
    item_key: &str,
    phase: ProcessPhase,
) {
    if let Err(e) = store.update_phase(item_key, phase).await {
        crate::log_warn!("Warning: failed to persist phase for {}: {}", item_key, e);
    }
    bus.publish_sync(Event::new(
        EventType::PhaseChange,
        "intake",
        json!({
            "item_key": item_key,
            "phase": phase.display_name(),
            "progress": phase.progress(),
        }),
    ));
}

/// Mark the intake failed in store and on the bus, passing the error through.
async fn fail_intake<S: RecordStore>(
    store: &S,
    bus: &EventBus,
    item_key: &str,
    error: String,
) -> String {
    if let Err(e) = store.update_phase(item_key, ProcessPhase::Failed).await {
        crate::log_warn!("Warning: failed to persist phase for {}: {}", item_key, e);
    }
    bus.publish_sync(Event::new(
        EventType::JobFailed,
        "intake",
        json!({
            "item_key": item_key,
            "error": error,
        }),
    ));
    error
}

// --- Bundled narrow implementations ---

/// Reads issue records from local JSON files: `<root>/<key>.json`.
///
/// Stands in for the tracking-service client in tests and offline runs.
pub struct FileIssueSource {
    pub root: PathBuf,
}

impl IssueSource for FileIssueSource {
    async fn fetch(&self, key: &str) -> Result<IssueRecord, String> {
        let path = self.root.join(format!("{}.json", key));
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("Failed to read issue file {}: {}", path.display(), e))?;
        serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse issue file {}: {}", path.display(), e))
    }
}

/// Media collector that collects nothing. Used when the issue has no media
/// or the extraction toolchain is not installed.
pub struct NoopMediaCollector;

impl MediaCollector for NoopMediaCollector {
    async fn download(
        &self,
        record: &IssueRecord,
        _dest: &Path,
    ) -> Result<Vec<PathBuf>, String> {
        if !record.media_urls.is_empty() {
            log_info!(
                "[{}] Skipping {} media attachment(s): no collector configured",
                record.key,
                record.media_urls.len()
            );
        }
        Ok(Vec::new())
    }

    async fn extract_frames(
        &self,
        _media: &[PathBuf],
        _dest: &Path,
    ) -> Result<Vec<PathBuf>, String> {
        Ok(Vec::new())
    }
}

/// Renders the analysis document as markdown: title, body, frame listing.
pub struct MarkdownRenderer;

impl DocumentRenderer for MarkdownRenderer {
    async fn render(
        &self,
        record: &IssueRecord,
        frames: &[PathBuf],
        dest: &Path,
    ) -> Result<PathBuf, String> {
        let mut doc = format!("# {}: {}\n\n{}\n", record.key, record.title, record.body);
        if !frames.is_empty() {
            doc.push_str("\n## Extracted Frames\n\n");
            for frame in frames {
                doc.push_str(&format!("- {}\n", frame.display()));
            }
        }

        let path = dest.join(format!("{}.md", record.key));
        tokio::fs::write(&path, doc)
            .await
            .map_err(|e| format!("Failed to write document {}: {}", path.display(), e))?;
        Ok(path)
    }
}
