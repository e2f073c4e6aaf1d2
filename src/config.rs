use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_WINNING_SCORE: u32 = 100;
pub const AUTOPLAY_BANK_THRESHOLD: u32 = 87;
/// Registration tries before a taken autoplay name is reported.
pub const AUTOPLAY_REGISTER_ATTEMPTS: u32 = 3;

pub const AUTOPLAY_NAME_PREFIXES: [&str; 20] = [
    "Shadow", "Neon", "Cyber", "Quantum", "Nova", "Vortex", "Phantom", "Echo", "Blaze",
    "Storm", "Frost", "Thunder", "Cosmic", "Astral", "Mystic", "Razor", "Swift", "Iron",
    "Steel", "Crystal",
];

pub const AUTOPLAY_NAME_SUFFIXES: [&str; 20] = [
    "Dice", "Roller", "Master", "Champion", "Legend", "Warrior", "Hunter", "Striker",
    "Slayer", "Guardian", "Sentinel", "Vanguard", "Ace", "Pro", "Elite", "Prime", "Alpha",
    "Omega", "Nexus", "Core",
];

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Period of the passive state refresh while a game is in view.
    pub poll_interval: Duration,
    /// How long the double-six banner stays up before the forced bank.
    pub forfeiture_window: Duration,
    /// Pause between an autoplay turn qualifying and its decision.
    pub autoplay_think_delay: Duration,
    pub autoplay_bank_threshold: u32,
    pub default_winning_score: u32,
    pub autoplay_name_prefixes: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            forfeiture_window: Duration::from_secs(3),
            autoplay_think_delay: Duration::from_secs(1),
            autoplay_bank_threshold: AUTOPLAY_BANK_THRESHOLD,
            default_winning_score: DEFAULT_WINNING_SCORE,
            autoplay_name_prefixes: AUTOPLAY_NAME_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_forfeiture_window(mut self, window: Duration) -> Self {
        self.forfeiture_window = window;
        self
    }

    #[must_use]
    pub fn with_autoplay_think_delay(mut self, delay: Duration) -> Self {
        self.autoplay_think_delay = delay;
        self
    }

    #[must_use]
    pub fn with_autoplay_bank_threshold(mut self, threshold: u32) -> Self {
        self.autoplay_bank_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_default_winning_score(mut self, score: u32) -> Self {
        self.default_winning_score = score;
        self
    }
}
