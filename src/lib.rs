pub mod scanner;

pub use scanner::{ScanReport, Scanner};

/// Install the fmt subscriber; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "spell_overlay=debug,spell_overlay_lib=debug,hud_vision=debug,hud_capture=debug".into()
            }),
        )
        .init();
}
