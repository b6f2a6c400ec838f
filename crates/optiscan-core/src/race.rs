//! # Race State
//!
//! The per-session state machine behind "first successful decode wins".
//!
//! ## State Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        RaceState Transitions                            │
//! │                                                                         │
//! │  ┌────────┐   start()   ┌──────────┐                                   │
//! │  │  Idle  │ ──────────► │ Scanning │                                   │
//! │  └───┬────┘             └────┬─────┘                                   │
//! │      │                       │                                          │
//! │      │ cancel()   try_resolve() │ cancel()                              │
//! │      │               ┌─────────┴─────────┐                              │
//! │      │               ▼                   ▼                              │
//! │      │        ┌────────────┐      ┌────────────┐                        │
//! │      └──────► │  Resolved  │      │ Cancelled  │ ◄──┘                   │
//! │   (Cancelled) └────────────┘      └────────────┘                        │
//! │                                                                         │
//! │  Resolved and Cancelled are TERMINAL. Every later report or cancel     │
//! │  observes the terminal phase and does nothing.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `RaceState` belongs to exactly one scan session. A new session always
//! gets a new `RaceState`; there is no way to reset a terminal one.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ScanError};

// =============================================================================
// Race Phase
// =============================================================================

/// Phase of a scan session's race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RacePhase {
    /// Created, decoders not started yet.
    #[default]
    Idle,
    /// Both decoders running, nothing accepted yet.
    Scanning,
    /// A report won the race.
    Resolved,
    /// Stopped by the user, a facing switch, or a terminal failure.
    Cancelled,
}

impl RacePhase {
    /// True for `Resolved` and `Cancelled`.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, RacePhase::Resolved | RacePhase::Cancelled)
    }
}

impl std::fmt::Display for RacePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RacePhase::Idle => write!(f, "idle"),
            RacePhase::Scanning => write!(f, "scanning"),
            RacePhase::Resolved => write!(f, "resolved"),
            RacePhase::Cancelled => write!(f, "cancelled"),
        }
    }
}

// =============================================================================
// Race State
// =============================================================================

/// Checked flag guarding a single scan session.
///
/// Callers serialize access (the engine holds it behind the arbiter's lock),
/// so the check-then-flip in [`RaceState::try_resolve`] cannot interleave.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RaceState {
    phase: RacePhase,
}

impl RaceState {
    /// Creates an idle race.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    #[inline]
    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    /// `Idle → Scanning`.
    ///
    /// Fails if the race already left `Idle`: a RaceState is never reused.
    pub fn start(&mut self) -> CoreResult<()> {
        match self.phase {
            RacePhase::Idle => {
                self.phase = RacePhase::Scanning;
                Ok(())
            }
            other => Err(ScanError::SessionClosed {
                phase: other.to_string(),
            }),
        }
    }

    /// `Scanning → Resolved`.
    ///
    /// Returns true only for the single call that wins the race.
    pub fn try_resolve(&mut self) -> bool {
        if self.phase == RacePhase::Scanning {
            self.phase = RacePhase::Resolved;
            true
        } else {
            false
        }
    }

    /// `Idle | Scanning → Cancelled`.
    ///
    /// Returns true if this call performed the transition; false if the race
    /// was already terminal (idempotent).
    pub fn cancel(&mut self) -> bool {
        if self.phase.is_terminal() {
            false
        } else {
            self.phase = RacePhase::Cancelled;
            true
        }
    }

    /// True once resolved or cancelled.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// True while reports may still win.
    #[inline]
    pub fn is_scanning(&self) -> bool {
        self.phase == RacePhase::Scanning
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
