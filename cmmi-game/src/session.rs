//! Timing for a single mini-game attempt.
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_TIME_LIMIT_SECS, TIMER_CRITICAL_SECS, TIMER_WARNING_SECS};
use crate::levels::MaturityLevel;
use crate::score::ScoreDraft;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Running,
    Completed,
    Expired,
}

/// How close the countdown is to running out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
    Normal,
    Warning,
    Critical,
    Expired,
}

/// One attempt at a mini-game. Ending it, by completion or by the timer,
/// yields exactly one [`ScoreDraft`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    player_name: String,
    game_name: String,
    max_score: u32,
    score: u32,
    time_limit_secs: u32,
    elapsed_secs: u32,
    state: SessionState,
}

impl GameSession {
    #[must_use]
    pub fn start(
        player_name: impl Into<String>,
        game_name: impl Into<String>,
        max_score: u32,
        time_limit_secs: u32,
    ) -> Self {
        Self {
            player_name: player_name.into(),
            game_name: game_name.into(),
            max_score,
            score: 0,
            time_limit_secs,
            elapsed_secs: 0,
            state: SessionState::Running,
        }
    }

    /// Session for a level's designated game, scored out of its item count.
    #[must_use]
    pub fn for_level(player_name: impl Into<String>, level: MaturityLevel) -> Self {
        let spec = level.spec();
        Self::start(player_name, spec.game, spec.items, DEFAULT_TIME_LIMIT_SECS)
    }

    #[must_use]
    pub const fn with_time_limit(mut self, secs: u32) -> Self {
        self.time_limit_secs = secs;
        self
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub const fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    /// Update the running score, capped at the max score. Ignored once ended.
    pub fn set_score(&mut self, score: u32) {
        if self.state == SessionState::Running {
            self.score = score.min(self.max_score);
        }
    }

    #[must_use]
    pub const fn remaining_secs(&self) -> u32 {
        self.time_limit_secs.saturating_sub(self.elapsed_secs)
    }

    /// Remaining time as `m:ss`.
    #[must_use]
    pub fn remaining_label(&self) -> String {
        let remaining = self.remaining_secs();
        format!("{}:{:02}", remaining / 60, remaining % 60)
    }

    #[must_use]
    pub const fn urgency(&self) -> Urgency {
        let remaining = self.remaining_secs();
        if remaining == 0 {
            Urgency::Expired
        } else if remaining <= TIMER_CRITICAL_SECS {
            Urgency::Critical
        } else if remaining <= TIMER_WARNING_SECS {
            Urgency::Warning
        } else {
            Urgency::Normal
        }
    }

    /// Advance the countdown by one second. Returns the final draft when the
    /// timer forces the game to end.
    pub fn tick(&mut self) -> Option<ScoreDraft> {
        if self.state != SessionState::Running {
            return None;
        }
        self.elapsed_secs = self.elapsed_secs.saturating_add(1);
        if self.remaining_secs() > 0 {
            return None;
        }
        log::debug!("{} ran out of time on {}", self.player_name, self.game_name);
        self.state = SessionState::Expired;
        Some(self.draft())
    }

    /// Finish with `score`. Returns `None` if the session already ended.
    pub fn complete(&mut self, score: u32) -> Option<ScoreDraft> {
        if self.state != SessionState::Running {
            return None;
        }
        self.score = score.min(self.max_score);
        self.state = SessionState::Completed;
        Some(self.draft())
    }

    fn draft(&self) -> ScoreDraft {
        ScoreDraft::new(
            self.player_name.clone(),
            self.game_name.clone(),
            self.score,
            self.max_score,
        )
        .with_time_spent(self.elapsed_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_sessions_use_catalog_items_and_default_limit() {
        let session = GameSession::for_level("Alice", MaturityLevel::Defined);
        assert_eq!(session.remaining_label(), "5:00");
        assert_eq!(session.urgency(), Urgency::Normal);
        let draft = session.clone().complete(8).unwrap();
        assert_eq!(draft.max_score, 8);
        assert_eq!(draft.game_name, MaturityLevel::Defined.game());
    }

    #[test]
    fn countdown_escalates_and_expires_once() {
        let mut session = GameSession::start("Bob", "Level 1: Initial", 7, 62);
        session.set_score(4);
        assert!(session.tick().is_none());
        assert!(session.tick().is_none());
        assert_eq!(session.urgency(), Urgency::Warning);
        assert_eq!(session.remaining_label(), "1:00");

        for _ in 0..29 {
            assert!(session.tick().is_none());
        }
        assert_eq!(session.urgency(), Urgency::Warning);
        session.tick();
        assert_eq!(session.urgency(), Urgency::Critical);

        let mut expired = None;
        for _ in 0..30 {
            if let Some(draft) = session.tick() {
                assert!(expired.is_none());
                expired = Some(draft);
            }
        }
        let draft = expired.unwrap();
        assert_eq!(draft.score, 4);
        assert_eq!(draft.time_spent, 62);
        assert_eq!(session.state(), SessionState::Expired);
        assert!(session.tick().is_none());
        assert!(session.complete(7).is_none());
    }

    #[test]
    fn completion_caps_score_and_ends_session() {
        let mut session = GameSession::start("Carol", "OrderLevels", 5, 300);
        session.tick();
        let draft = session.complete(9).unwrap();
        assert_eq!(draft.score, 5);
        assert_eq!(draft.time_spent, 1);
        assert!(session.complete(1).is_none());
        assert_eq!(session.urgency(), Urgency::Normal);
    }
}
