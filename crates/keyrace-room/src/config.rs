//! Room configuration.

use std::time::Duration;

use keyrace_protocol::PromptMode;

/// Settings shared by every room a registry creates.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Delay between "everyone is ready" and the race starting.
    pub countdown: Duration,

    /// How often the countdown monitor wakes to check the clock.
    pub countdown_poll: Duration,

    /// Minimum members for a readiness update to start the countdown.
    pub min_players: usize,

    /// Candidate prompt texts carried by each room.
    pub prompts: Vec<String>,

    /// Prompt mode a new room starts with.
    pub default_prompt_mode: PromptMode,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            countdown: Duration::from_millis(3000),
            countdown_poll: Duration::from_millis(25),
            min_players: 2,
            prompts: vec![
                "The quick brown fox jumps over the lazy dog.".to_owned(),
                "This is a really fun thing to code".to_owned(),
            ],
            default_prompt_mode: PromptMode::Short,
        }
    }
}
