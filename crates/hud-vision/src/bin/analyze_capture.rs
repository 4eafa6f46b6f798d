//! CLI tool to run a saved scoreboard capture through the matching pipeline.
//! Usage: cargo run -p hud-vision --features cli --bin analyze_capture -- <capture.png> [data_dir] [output_dir]

use anyhow::{Context, Result};
use hud_data::ScanConfig;
use hud_vision::{
    AssetIndex, AssetKind, AssetProfile, DiagnosticsWriter, MatchPipeline, OrbBackend,
    RegionSegmenter, SharedBackend, SlotKind,
};
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <capture.png> [data_dir] [output_dir]", args[0]);
        std::process::exit(1);
    }

    let input_path = PathBuf::from(&args[1]);
    let data_dir = args.get(2).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let config = ScanConfig::load(&data_dir)?;
    let paths = config.paths(&data_dir);
    let output_dir = args.get(3).map(PathBuf::from).unwrap_or(paths.output_dir.clone());

    println!("Loading image: {}", input_path.display());
    let img = image::open(&input_path)
        .with_context(|| format!("Failed to open {}", input_path.display()))?
        .to_rgb8();
    let (w, h) = img.dimensions();
    println!("Image size: {}x{}", w, h);

    println!("\n=== Layout ===");
    let segmenter = RegionSegmenter::new(config.layout.clone());
    for panel in segmenter.segment_default(w, h) {
        let p = panel.panel;
        println!(
            "  Panel {}: x={} w={} | spells y={}..{} | portrait y={}..{}",
            panel.index + 1,
            p.x,
            p.width,
            panel.spell_band.y,
            panel.spell_band.bottom(),
            panel.portrait.y,
            panel.portrait.bottom(),
        );
    }

    println!("\n=== Asset indices ===");
    let backend: SharedBackend = Arc::new(OrbBackend::default());
    let icons = AssetIndex::build(
        &paths.icons_dir,
        &AssetProfile::icons(&config.matcher),
        &*backend,
    );
    println!("Icons: {} from {}", icons.len(), paths.icons_dir.display());
    let portraits = match &paths.portraits_dir {
        Some(dir) => {
            let index = AssetIndex::build(dir, &AssetProfile::portraits(&config.matcher), &*backend);
            println!("Portraits: {} from {}", index.len(), dir.display());
            index
        }
        None => {
            println!("Portraits: no directory found");
            AssetIndex::empty(AssetKind::Portrait)
        }
    };

    let pipeline = MatchPipeline::new(&config, backend, Arc::new(icons), Arc::new(portraits))
        .with_diagnostics(DiagnosticsWriter::new(&output_dir)?);
    let results = pipeline.run(&img);

    println!("\n=== Results ===");
    for r in &results {
        let slot = match r.slot_kind {
            SlotKind::Icon => format!("spell{}", r.slot_index + 1),
            SlotKind::Portrait => "splash".to_string(),
        };
        println!(
            "char{}_{} -> {} ({:.1})",
            r.panel_index + 1,
            slot,
            r.display_label(),
            r.confidence
        );
    }

    println!("\nDebug images saved to: {}", output_dir.display());
    Ok(())
}
