use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Summoner spells the overlay knows about.
pub const SPELLS: &[&str] = &[
    "barrier", "cleanse", "exhaust", "flash", "ghost", "heal", "ignite", "smite", "teleport",
];

/// Spell name shown for a slot whose icon was not recognised.
pub const UNKNOWN_SPELL: &str = "?";

/// Cooldown used for spells missing from the table.
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// Base cooldown of a spell in seconds.
pub fn cooldown_secs(spell: &str) -> u64 {
    match spell {
        "flash" => 300,
        "ignite" => 180,
        "smite" => 15,
        "heal" => 240,
        "barrier" => 180,
        "cleanse" => 210,
        "ghost" => 210,
        "exhaust" => 210,
        "teleport" => 360,
        _ => DEFAULT_COOLDOWN_SECS,
    }
}

/// Countdown started when a tracked spell is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct CooldownTimer {
    running: Option<(Instant, Duration)>,
}

impl CooldownTimer {
    pub fn start(&mut self, spell: &str, now: Instant) {
        let duration = Duration::from_secs(cooldown_secs(spell));
        tracing::debug!("Cooldown for {} started ({}s)", spell, duration.as_secs());
        self.running = Some((now, duration));
    }

    pub fn stop(&mut self) {
        self.running = None;
    }

    /// Whole seconds left, rounded up; 0 once the timer expired or never ran.
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        match self.running {
            Some((started, duration)) => {
                let left = duration.saturating_sub(now.saturating_duration_since(started));
                let secs = left.as_secs();
                if left.subsec_nanos() > 0 {
                    secs + 1
                } else {
                    secs
                }
            }
            None => 0,
        }
    }

    pub fn is_running(&self, now: Instant) -> bool {
        self.remaining_secs(now) > 0
    }
}

/// One tracked ability slot on a panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellSlot {
    pub spell: String,
    pub confidence: Option<f64>,
    #[serde(skip)]
    pub timer: CooldownTimer,
}

impl SpellSlot {
    fn new(spell: &str) -> Self {
        Self {
            spell: spell.to_string(),
            confidence: None,
            timer: CooldownTimer::default(),
        }
    }

    /// Replace the spell. Any running countdown is stopped, even when the
    /// spell is unchanged.
    pub fn set_spell(&mut self, spell: &str, confidence: Option<f64>) {
        self.timer.stop();
        self.spell = spell.to_string();
        self.confidence = confidence;
    }
}

/// State shown for one opponent panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelState {
    pub index: usize,
    pub champion: Option<String>,
    pub champion_confidence: Option<f64>,
    pub spells: [SpellSlot; 2],
}

impl PanelState {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            champion: None,
            champion_confidence: None,
            spells: [SpellSlot::new("flash"), SpellSlot::new("ignite")],
        }
    }

    /// Record a spell recognition; unmatched slots show [`UNKNOWN_SPELL`].
    pub fn apply_spell(&mut self, slot: usize, label: Option<&str>, confidence: f64) {
        if let Some(spell) = self.spells.get_mut(slot) {
            spell.set_spell(label.unwrap_or(UNKNOWN_SPELL), Some(confidence));
        }
    }

    /// Record a portrait recognition; unmatched clears the champion.
    pub fn apply_champion(&mut self, label: Option<&str>, confidence: f64) {
        self.champion = label.map(str::to_string);
        self.champion_confidence = Some(confidence);
    }

    pub fn start_cooldown(&mut self, slot: usize, now: Instant) {
        if let Some(spell) = self.spells.get_mut(slot) {
            let name = spell.spell.clone();
            spell.timer.start(&name, now);
        }
    }
}

/// Overlay state for every panel in the capture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverlayState {
    pub panels: Vec<PanelState>,
}

impl OverlayState {
    pub fn new(panel_count: usize) -> Self {
        Self {
            panels: (0..panel_count).map(PanelState::new).collect(),
        }
    }

    pub fn panel_mut(&mut self, index: usize) -> Option<&mut PanelState> {
        self.panels.get_mut(index)
    }
}
