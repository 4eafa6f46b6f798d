//! Scan the selected screen region (or a saved capture) once and print what
//! was recognised in every panel.
//!
//! Usage: spell-overlay [--data-dir DIR] [--image FILE | --region x,y,w,h] [--no-debug]

use anyhow::{bail, Context, Result};
use hud_capture::CaptureRect;
use hud_vision::SlotKind;
use spell_overlay_lib::{init_tracing, Scanner};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Default)]
struct Args {
    data_dir: Option<PathBuf>,
    image: Option<PathBuf>,
    region: Option<CaptureRect>,
    no_debug: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().with_context(|| format!("{} needs a value", name));
        match arg.as_str() {
            "--data-dir" => args.data_dir = Some(PathBuf::from(value("--data-dir")?)),
            "--image" => args.image = Some(PathBuf::from(value("--image")?)),
            "--region" => args.region = Some(CaptureRect::parse(&value("--region")?)?),
            "--no-debug" => args.no_debug = true,
            other => bail!("unknown argument '{}'", other),
        }
    }
    if args.image.is_some() && args.region.is_some() {
        bail!("--image and --region are mutually exclusive");
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = parse_args()?;

    let data_dir = args.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut config = hud_data::ScanConfig::load(&data_dir)?;
    if args.no_debug {
        config.save_diagnostics = false;
    }
    let scanner = Scanner::with_config(&data_dir, config);

    let started = Instant::now();
    let report = match &args.image {
        Some(path) => {
            let img = image::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?
                .to_rgb8();
            scanner.scan_image(img).await?
        }
        None => scanner.scan_region(args.region.unwrap_or_default()).await?,
    };

    let icons = scanner.display_icons(&report);
    println!("========== SCAN ({} ms) ==========", started.elapsed().as_millis());
    for (r, icon) in report.results.iter().zip(&icons) {
        let slot = match r.slot_kind {
            SlotKind::Icon => format!("spell{}", r.slot_index + 1),
            SlotKind::Portrait => "splash".to_string(),
        };
        let icon = icon
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "char{}_{} -> {} ({:.1}) [{}]",
            r.panel_index + 1,
            slot,
            r.display_label(),
            r.confidence,
            icon
        );
    }
    println!("{}", serde_json::to_string_pretty(&report.state)?);
    Ok(())
}
