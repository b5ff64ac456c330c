//! Episode lifecycle states.

use serde::{Deserialize, Serialize};

/// Where an episode is in its processing lifecycle.
///
/// ```text
/// pending -> downloading -> transcribing -> processing -> done
///    \            \               \              \
///     +------------+---------------+--------------+--> error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeStatus {
    #[default]
    Pending,
    Downloading,
    Transcribing,
    Processing,
    Done,
    Error,
}

impl EpisodeStatus {
    /// `done` and `error` end a run.
    pub fn is_terminal(self) -> bool {
        matches!(self, EpisodeStatus::Done | EpisodeStatus::Error)
    }

    /// Whether `next` may follow `self` within one run.
    ///
    /// `processing -> processing` is allowed: partial paragraph writes
    /// happen while the status is held.
    pub fn can_transition_to(self, next: EpisodeStatus) -> bool {
        use EpisodeStatus::*;
        match (self, next) {
            (Pending, Downloading)
            | (Downloading, Transcribing)
            | (Transcribing, Processing)
            | (Processing, Processing)
            | (Processing, Done) => true,
            (from, Error) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EpisodeStatus::Pending => "pending",
            EpisodeStatus::Downloading => "downloading",
            EpisodeStatus::Transcribing => "transcribing",
            EpisodeStatus::Processing => "processing",
            EpisodeStatus::Done => "done",
            EpisodeStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EpisodeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(EpisodeStatus::Pending),
            "downloading" => Ok(EpisodeStatus::Downloading),
            "transcribing" => Ok(EpisodeStatus::Transcribing),
            "processing" => Ok(EpisodeStatus::Processing),
            "done" => Ok(EpisodeStatus::Done),
            "error" => Ok(EpisodeStatus::Error),
            _ => Err(format!("Unknown episode status: {}", s)),
        }
    }
}

/// How a pipeline run enters the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// Resolve audio and transcribe, then refine.
    Full,
    /// Refine the persisted raw transcript again; no recognition call.
    Reprocess,
}

impl RunKind {
    /// First status written by a run of this kind.
    pub fn first_status(self) -> EpisodeStatus {
        match self {
            RunKind::Full => EpisodeStatus::Downloading,
            RunKind::Reprocess => EpisodeStatus::Processing,
        }
    }

    /// Whether a run of this kind may start on an episode in `status`.
    ///
    /// A full run needs a fresh episode, or a failed one that never got a
    /// raw transcript. A reprocess run only needs the raw transcript.
    pub fn can_start(self, status: EpisodeStatus, has_raw_transcript: bool) -> bool {
        match self {
            RunKind::Full => match status {
                EpisodeStatus::Pending => true,
                EpisodeStatus::Error => !has_raw_transcript,
                _ => false,
            },
            RunKind::Reprocess => has_raw_transcript,
        }
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunKind::Full => write!(f, "process"),
            RunKind::Reprocess => write!(f, "reprocess"),
        }
    }
}
