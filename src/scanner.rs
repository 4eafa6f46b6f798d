use anyhow::{Context, Result};
use hud_capture::CaptureRect;
use hud_data::{AssetPaths, ScanConfig};
use hud_state::OverlayState;
use hud_vision::{
    AssetIndex, AssetKind, AssetProfile, DiagnosticsWriter, IndexCache, MatchPipeline,
    MatchResult, OrbBackend, SharedBackend, SlotKind,
};
use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

/// Outcome of one scan: raw per-slot matches plus the overlay state they produced.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub results: Vec<MatchResult>,
    pub state: OverlayState,
}

/// Owns the process-lifetime asset indices and runs scans off the caller's
/// thread, publishing every report on a watch channel.
pub struct Scanner {
    config: ScanConfig,
    paths: AssetPaths,
    backend: SharedBackend,
    cache: Arc<Mutex<IndexCache>>,
    state: Arc<Mutex<OverlayState>>,
    report_tx: watch::Sender<Option<Arc<ScanReport>>>,
    report_rx: watch::Receiver<Option<Arc<ScanReport>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Scanner {
    /// Load `scan.json` from `data_dir` (defaults when absent).
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config = ScanConfig::load(data_dir)?;
        Ok(Self::with_config(data_dir, config))
    }

    pub fn with_config(data_dir: &Path, config: ScanConfig) -> Self {
        let paths = config.paths(data_dir);
        let (report_tx, report_rx) = watch::channel(None);
        let state = OverlayState::new(config.layout.panel_count);
        info!(
            "Scanner ready: icons {}, portraits {}",
            paths.icons_dir.display(),
            paths
                .portraits_dir
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<none>".to_string())
        );
        Self {
            config,
            paths,
            backend: Arc::new(OrbBackend::default()),
            cache: Arc::new(Mutex::new(IndexCache::new())),
            state: Arc::new(Mutex::new(state)),
            report_tx,
            report_rx,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn paths(&self) -> &AssetPaths {
        &self.paths
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ScanReport>>> {
        self.report_rx.clone()
    }

    pub fn latest(&self) -> Option<Arc<ScanReport>> {
        self.report_rx.borrow().clone()
    }

    pub fn state(&self) -> OverlayState {
        lock(&self.state).clone()
    }

    /// Start the countdown of a panel's spell slot.
    pub fn start_cooldown(&self, panel: usize, slot: usize, now: Instant) {
        if let Some(p) = lock(&self.state).panel_mut(panel) {
            p.start_cooldown(slot, now);
        }
    }

    /// Capture the selected screen rectangle and scan it.
    pub async fn scan_region(&self, rect: CaptureRect) -> Result<Arc<ScanReport>> {
        let frame = tokio::task::spawn_blocking(move || hud_capture::capture_rect(&rect))
            .await
            .context("Capture task panicked")??;
        self.scan_image(frame).await
    }

    /// Match a captured image on the blocking pool and publish the report.
    pub async fn scan_image(&self, frame: RgbImage) -> Result<Arc<ScanReport>> {
        let config = self.config.clone();
        let paths = self.paths.clone();
        let backend = self.backend.clone();
        let cache = self.cache.clone();
        let state = self.state.clone();

        let report = tokio::task::spawn_blocking(move || {
            let (icons, portraits) = indices(&cache, &config, &paths, &backend);
            let mut pipeline = MatchPipeline::new(&config, backend, icons, portraits);
            if config.save_diagnostics {
                match DiagnosticsWriter::new(&paths.output_dir) {
                    Ok(writer) => pipeline = pipeline.with_diagnostics(writer),
                    Err(e) => warn!("Diagnostics disabled: {:#}", e),
                }
            }

            let results = pipeline.run(&frame);
            let mut overlay = lock(&state);
            apply_results(&mut overlay, &results);
            ScanReport {
                results,
                state: overlay.clone(),
            }
        })
        .await
        .context("Scan task panicked")?;

        let report = Arc::new(report);
        self.report_tx.send_replace(Some(report.clone()));
        Ok(report)
    }

    /// Re-read both asset directories. The new indices are built without
    /// holding the cache and swapped in afterwards, so scans in flight keep
    /// the indices they started with.
    pub async fn rebuild_assets(&self) -> Result<(usize, usize)> {
        let config = self.config.clone();
        let paths = self.paths.clone();
        let backend = self.backend.clone();
        let cache = self.cache.clone();

        tokio::task::spawn_blocking(move || {
            let icon_profile = AssetProfile::icons(&config.matcher);
            let icons = Arc::new(AssetIndex::build(&paths.icons_dir, &icon_profile, &*backend));
            let portraits = paths.portraits_dir.as_ref().map(|dir| {
                let profile = AssetProfile::portraits(&config.matcher);
                (dir.clone(), Arc::new(AssetIndex::build(dir, &profile, &*backend)))
            });

            let mut cache = lock(&cache);
            cache.replace(&paths.icons_dir, icons.clone());
            let portrait_count = match portraits {
                Some((dir, index)) => {
                    let n = index.len();
                    cache.replace(&dir, index);
                    n
                }
                None => 0,
            };
            info!("Assets rebuilt: {} icons, {} portraits", icons.len(), portrait_count);
            (icons.len(), portrait_count)
        })
        .await
        .context("Rebuild task panicked")
    }

    /// Drop every cached index; the next scan rebuilds lazily.
    pub fn invalidate_assets(&self) {
        lock(&self.cache).clear();
    }

    /// Display icon for each slot of the latest report, in result order.
    pub fn display_icons(&self, report: &ScanReport) -> Vec<Option<PathBuf>> {
        report
            .results
            .iter()
            .map(|r| match (r.slot_kind, r.label.as_deref()) {
                (SlotKind::Icon, Some(label)) => self.paths.spell_icon(label),
                (SlotKind::Portrait, Some(label)) => self.paths.champion_icon(label),
                (_, None) => None,
            })
            .collect()
    }
}

fn indices(
    cache: &Mutex<IndexCache>,
    config: &ScanConfig,
    paths: &AssetPaths,
    backend: &SharedBackend,
) -> (Arc<AssetIndex>, Arc<AssetIndex>) {
    let icons = cached_or_build(cache, &paths.icons_dir, &AssetProfile::icons(&config.matcher), backend);
    let portraits = match &paths.portraits_dir {
        Some(dir) => cached_or_build(cache, dir, &AssetProfile::portraits(&config.matcher), backend),
        None => Arc::new(AssetIndex::empty(AssetKind::Portrait)),
    };
    (icons, portraits)
}

/// The cache lock is only held to look up and to insert; the build runs
/// unlocked. An index installed meanwhile by a rebuild wins.
fn cached_or_build(
    cache: &Mutex<IndexCache>,
    dir: &Path,
    profile: &AssetProfile,
    backend: &SharedBackend,
) -> Arc<AssetIndex> {
    let cached = lock(cache).get(dir, profile.kind);
    if let Some(index) = cached {
        return index;
    }
    let built = Arc::new(AssetIndex::build(dir, profile, &**backend));
    lock(cache).insert_if_absent(dir, built)
}

fn apply_results(state: &mut OverlayState, results: &[MatchResult]) {
    for r in results {
        let Some(panel) = state.panel_mut(r.panel_index) else {
            continue;
        };
        match r.slot_kind {
            SlotKind::Icon => panel.apply_spell(r.slot_index, r.label.as_deref(), r.confidence),
            SlotKind::Portrait => panel.apply_champion(r.label.as_deref(), r.confidence),
        }
    }
}
