//! Engines over a `Store`: progress, roadmap sequencing, certificates.

pub mod certificates;
pub mod progress;
pub mod sequencer;

pub use certificates::CertificateIssuer;
pub use progress::{ActivityOutcome, Leaderboard, LeaderboardEntry, ProgressEngine};
pub use sequencer::{RoadmapSequencer, StepUpdate};
