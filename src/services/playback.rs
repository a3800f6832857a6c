//! Playback fallback
//!
//! A playback session walks an ordered candidate list: each error reported by
//! the player moves to the next candidate, the first successful start is
//! final, and running out of candidates ends the session with a diagnostic
//! report. Advancement is driven only by player events, never by timers.
//!
//! ```text
//! Idle -> Attempting(0) -> Attempting(1) -> ... -> Exhausted
//!              |                 |
//!              +-> Playing(0)    +-> Playing(1)
//! ```

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::StreamCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Attempting(usize),
    /// Terminal; later player trouble is not handled here
    Playing(usize),
    /// Terminal; every candidate failed
    Exhausted,
}

impl PlaybackState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackState::Playing(_) | PlaybackState::Exhausted)
    }
}

/// Diagnostics for a session where no candidate played
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("All {candidate_count} stream candidates failed, last error: {last_error}")]
pub struct PlaybackExhausted {
    pub candidate_count: usize,
    pub last_url: String,
    pub last_error: String,
    pub candidates: Vec<String>,
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("No stream candidates to play")]
    NoCandidates,
    #[error("Playback session already started")]
    AlreadyStarted,
    #[error(transparent)]
    Exhausted(#[from] PlaybackExhausted),
}

/// One attempt to play one item
#[derive(Debug)]
pub struct PlaybackSession {
    id: Uuid,
    candidates: Vec<StreamCandidate>,
    state: PlaybackState,
    last_error: Option<String>,
}

impl PlaybackSession {
    pub fn new(candidates: Vec<StreamCandidate>) -> Result<Self, PlaybackError> {
        if candidates.is_empty() {
            return Err(PlaybackError::NoCandidates);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            candidates,
            state: PlaybackState::Idle,
            last_error: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn candidates(&self) -> &[StreamCandidate] {
        &self.candidates
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Candidate currently being attempted or playing
    pub fn current(&self) -> Option<&StreamCandidate> {
        match self.state {
            PlaybackState::Attempting(i) | PlaybackState::Playing(i) => self.candidates.get(i),
            PlaybackState::Idle | PlaybackState::Exhausted => None,
        }
    }

    /// `Idle -> Attempting(0)`. Returns the first candidate to load, or `None`
    /// if the session was already started.
    pub fn start(&mut self) -> Option<&StreamCandidate> {
        if self.state != PlaybackState::Idle {
            debug!(session = %self.id, state = ?self.state, "start ignored");
            return None;
        }

        self.state = PlaybackState::Attempting(0);
        debug!(
            session = %self.id,
            candidates = self.candidates.len(),
            extension = %self.candidates[0].extension,
            "playback attempt 1"
        );
        self.candidates.first()
    }

    /// Player reported an error for the current attempt.
    ///
    /// Returns the next candidate to load, `Ok(None)` if the event does not
    /// apply to the current state, or the exhaustion report when this was
    /// the last candidate.
    pub fn report_error(&mut self, error: impl Into<String>) -> Result<Option<&StreamCandidate>, PlaybackExhausted> {
        let PlaybackState::Attempting(i) = self.state else {
            debug!(session = %self.id, state = ?self.state, "error event ignored");
            return Ok(None);
        };

        let error = error.into();
        warn!(
            session = %self.id,
            attempt = i + 1,
            extension = %self.candidates[i].extension,
            "playback failed: {}",
            error
        );
        self.last_error = Some(error.clone());

        if i + 1 < self.candidates.len() {
            self.state = PlaybackState::Attempting(i + 1);
            debug!(
                session = %self.id,
                extension = %self.candidates[i + 1].extension,
                "playback attempt {}",
                i + 2
            );
            return Ok(self.candidates.get(i + 1));
        }

        self.state = PlaybackState::Exhausted;
        warn!(session = %self.id, candidates = self.candidates.len(), "all playback candidates failed");

        Err(PlaybackExhausted {
            candidate_count: self.candidates.len(),
            last_url: self.candidates[i].url.clone(),
            last_error: error,
            candidates: self.candidates.iter().map(|c| c.url.clone()).collect(),
        })
    }

    /// Player reported that playback started. Returns whether the event applied.
    pub fn report_started(&mut self) -> bool {
        let PlaybackState::Attempting(i) = self.state else {
            debug!(session = %self.id, state = ?self.state, "start event ignored");
            return false;
        };

        self.state = PlaybackState::Playing(i);
        info!(
            session = %self.id,
            attempt = i + 1,
            extension = %self.candidates[i].extension,
            "playback started"
        );
        true
    }
}

/// Native player seam
#[async_trait]
pub trait Player: Send {
    /// Load `url`. `Ok` once playback starts, `Err` with the player's message.
    async fn load(&mut self, url: &str) -> Result<(), String>;
}

/// Drive a fresh session against a player, one candidate at a time.
/// Returns the candidate that started playing.
pub async fn play_with_fallback<P: Player + ?Sized>(
    player: &mut P,
    session: &mut PlaybackSession,
) -> Result<StreamCandidate, PlaybackError> {
    let mut next = session.start().cloned();
    if next.is_none() {
        return Err(PlaybackError::AlreadyStarted);
    }

    while let Some(candidate) = next {
        match player.load(&candidate.url).await {
            Ok(()) => {
                session.report_started();
                return Ok(candidate);
            }
            Err(e) => next = session.report_error(e)?.cloned(),
        }
    }

    // report_error only yields Ok(None) outside Attempting, which the loop never reaches
    Err(PlaybackError::AlreadyStarted)
}
