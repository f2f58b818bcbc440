//! Gesture-driven swipe deck.
//!
//! The deck is a pure state machine: it never sleeps and never talks to the
//! backend. Callers feed it drag positions and release/press events, run the
//! returned [`Animation`], and report completion with the `finish_*` methods.
//! [`crate::SwipeController`] does that with real timers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::profile::CandidateProfile;

const MAX_ROTATION_DEG: f64 = 10.0;
const FLY_OFF_FACTOR: f64 = 1.5;
const SPRING_FRICTION: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipeDirection {
    Left,
    Right,
}

impl SwipeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    fn sign(&self) -> f64 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
        }
    }

    pub fn is_like(&self) -> bool {
        matches!(self, Self::Right)
    }
}

/// Ephemeral result of a committed swipe. Never persisted itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeDecision {
    pub profile_id: String,
    pub direction: SwipeDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeckSettings {
    pub screen_width: f64,
    pub fly_off: Duration,
    pub advance_delay: Duration,
    /// Displacement below which neither stamp shows.
    pub stamp_dead_zone: f64,
}

impl Default for DeckSettings {
    fn default() -> Self {
        Self {
            screen_width: 390.0,
            fly_off: Duration::from_millis(250),
            advance_delay: Duration::from_millis(120),
            stamp_dead_zone: 10.0,
        }
    }
}

impl DeckSettings {
    pub fn commit_threshold(&self) -> f64 {
        self.screen_width / 4.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckPhase {
    Idle,
    Dragging,
    FlyingOut(SwipeDirection),
    Returning,
    Advancing,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Easing {
    Linear,
    Spring { friction: f64 },
}

/// Where the card should move next and how.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Animation {
    pub to_x: f64,
    pub to_y: f64,
    /// `None` for springs, which settle on their own.
    pub duration: Option<Duration>,
    pub easing: Easing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Release {
    Commit {
        decision: SwipeDecision,
        animation: Animation,
    },
    Cancel {
        animation: Animation,
    },
    Ignored,
}

#[derive(Debug)]
pub struct SwipeDeck {
    candidates: Vec<CandidateProfile>,
    index: usize,
    position: (f64, f64),
    photo_index: usize,
    phase: DeckPhase,
    settings: DeckSettings,
}

impl SwipeDeck {
    pub fn new(candidates: Vec<CandidateProfile>, settings: DeckSettings) -> Self {
        let phase = if candidates.is_empty() {
            DeckPhase::Exhausted
        } else {
            DeckPhase::Idle
        };
        Self {
            candidates,
            index: 0,
            position: (0.0, 0.0),
            photo_index: 0,
            phase,
            settings,
        }
    }

    pub fn current(&self) -> Option<&CandidateProfile> {
        self.candidates.get(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn remaining(&self) -> usize {
        self.candidates.len().saturating_sub(self.index)
    }

    pub fn phase(&self) -> DeckPhase {
        self.phase
    }

    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    pub fn photo_index(&self) -> usize {
        self.photo_index
    }

    pub fn settings(&self) -> &DeckSettings {
        &self.settings
    }

    pub fn is_exhausted(&self) -> bool {
        self.index >= self.candidates.len()
    }

    /// Track the gesture. Returns false when the deck is not accepting drags.
    pub fn drag(&mut self, dx: f64, dy: f64) -> bool {
        match self.phase {
            DeckPhase::Idle | DeckPhase::Dragging => {
                self.phase = DeckPhase::Dragging;
                self.position = (dx, dy);
                true
            }
            _ => false,
        }
    }

    pub fn like_opacity(&self) -> f64 {
        self.stamp_opacity(self.position.0)
    }

    pub fn nope_opacity(&self) -> f64 {
        self.stamp_opacity(-self.position.0)
    }

    fn stamp_opacity(&self, displacement: f64) -> f64 {
        let start = self.settings.stamp_dead_zone;
        let end = self.settings.commit_threshold();
        if end <= start {
            return if displacement > start { 1.0 } else { 0.0 };
        }
        ((displacement - start) / (end - start)).clamp(0.0, 1.0)
    }

    /// Card tilt in degrees, ±10 over ±half the screen width.
    pub fn rotation_deg(&self) -> f64 {
        let half = self.settings.screen_width / 2.0;
        if half <= 0.0 {
            return 0.0;
        }
        (self.position.0 / half).clamp(-1.0, 1.0) * MAX_ROTATION_DEG
    }

    /// End the gesture: commit past a quarter screen width, otherwise spring back.
    pub fn release(&mut self) -> Release {
        if self.phase != DeckPhase::Dragging {
            return Release::Ignored;
        }

        let dx = self.position.0;
        if dx.abs() > self.settings.commit_threshold() {
            let direction = if dx > 0.0 {
                SwipeDirection::Right
            } else {
                SwipeDirection::Left
            };
            return self.commit(direction);
        }

        self.phase = DeckPhase::Returning;
        Release::Cancel {
            animation: Animation {
                to_x: 0.0,
                to_y: 0.0,
                duration: None,
                easing: Easing::Spring {
                    friction: SPRING_FRICTION,
                },
            },
        }
    }

    /// Footer button: same fly-off as a committed gesture, no dragging involved.
    pub fn press(&mut self, direction: SwipeDirection) -> Release {
        match self.phase {
            DeckPhase::Idle | DeckPhase::Dragging => self.commit(direction),
            _ => Release::Ignored,
        }
    }

    fn commit(&mut self, direction: SwipeDirection) -> Release {
        let Some(profile) = self.current() else {
            self.phase = DeckPhase::Exhausted;
            return Release::Ignored;
        };
        let decision = SwipeDecision {
            profile_id: profile.id.clone(),
            direction,
        };
        self.phase = DeckPhase::FlyingOut(direction);
        Release::Commit {
            decision,
            animation: Animation {
                to_x: direction.sign() * FLY_OFF_FACTOR * self.settings.screen_width,
                to_y: self.position.1,
                duration: Some(self.settings.fly_off),
                easing: Easing::Linear,
            },
        }
    }

    pub fn finish_return(&mut self) {
        if self.phase == DeckPhase::Returning {
            self.position = (0.0, 0.0);
            self.phase = DeckPhase::Idle;
        }
    }

    /// Fly-off done: reset the carousel and wait out the advance delay.
    pub fn finish_fly_out(&mut self) {
        if let DeckPhase::FlyingOut(_) = self.phase {
            self.photo_index = 0;
            self.phase = DeckPhase::Advancing;
        }
    }

    /// Move to the next card. No wraparound: past the end the deck stays exhausted.
    pub fn finish_advance(&mut self) -> DeckPhase {
        if self.phase == DeckPhase::Advancing {
            self.index += 1;
            self.position = (0.0, 0.0);
            self.phase = if self.is_exhausted() {
                DeckPhase::Exhausted
            } else {
                DeckPhase::Idle
            };
        }
        self.phase
    }

    /// Next photo of the focal card, modulo its photo count. Leaves the gesture alone.
    pub fn tap_photo(&mut self) -> usize {
        if let Some(count) = self.current().map(CandidateProfile::photo_count) {
            if count > 0 {
                self.photo_index = (self.photo_index + 1) % count;
            }
        }
        self.photo_index
    }
}
