//! CLI - Command-line argument parsing
//!
//! Defines the CLI structure using clap.
//! Keeps argument parsing separate from execution logic.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// EduAI progress core CLI
#[derive(Parser, Debug)]
#[command(name = "eductl")]
#[command(about = "EduAI - learner progress, roadmaps and certificates", long_about = None)]
#[command(version)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Config file (default: /etc/eduai/config.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path (overrides [database] path)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// XP, level, streak and achievements for a learner
    Progress {
        #[command(subcommand)]
        action: ProgressCommands,
    },

    /// Top learners by XP
    Leaderboard {
        /// Number of entries (1-100)
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Also report this user's position
        #[arg(long)]
        viewer: Option<i64>,
    },

    /// Learning roadmaps and their steps
    Roadmap {
        #[command(subcommand)]
        action: RoadmapCommands,
    },

    /// Course catalog
    Course {
        #[command(subcommand)]
        action: CourseCommands,
    },

    /// Record or update a learner's course progress
    Enroll {
        user_id: i64,
        course_id: i64,

        /// Completion percentage (0-100)
        #[arg(long, default_value_t = 0.0)]
        progress: f64,
    },

    /// Course completion certificates
    Certificate {
        #[command(subcommand)]
        action: CertificateCommands,
    },

    /// Configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProgressCommands {
    /// Apply one activity event
    Apply(ApplyArgs),

    /// Show the progress snapshot
    Show { user_id: i64 },

    /// List every achievement with the user's status
    Achievements { user_id: i64 },
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    pub user_id: i64,

    /// Activity kind (daily_login, course_completed, study_session, ...)
    #[arg(required_unless_present = "json", conflicts_with = "json")]
    pub kind: Option<String>,

    /// Full activity as JSON, e.g. '{"type":"study_session","minutes":30}'
    #[arg(long)]
    pub json: Option<String>,

    #[arg(long)]
    pub course_id: Option<i64>,

    #[arg(long)]
    pub assessment_id: Option<i64>,

    /// Assessment score (0-100)
    #[arg(long)]
    pub score: Option<u8>,

    #[arg(long)]
    pub step_id: Option<i64>,

    /// Study session length
    #[arg(long)]
    pub minutes: Option<u32>,

    /// XP adjustment (may be negative)
    #[arg(long, allow_hyphen_values = true)]
    pub amount: Option<i64>,

    #[arg(long)]
    pub reason: Option<String>,

    /// When the activity happened (RFC 3339, default: now)
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum RoadmapCommands {
    /// Create a roadmap for a user
    Create {
        user_id: i64,
        name: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        target_skill: Option<String>,
    },

    /// Append a step
    AddStep {
        roadmap_id: i64,
        title: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        course_id: Option<i64>,

        #[arg(long)]
        resource_url: Option<String>,
    },

    /// Set the step order; list every step id of the roadmap once
    Reorder {
        roadmap_id: i64,

        #[arg(required = true, num_args = 1..)]
        step_ids: Vec<i64>,
    },

    /// Move a step to in_progress or completed
    SetStatus { step_id: i64, status: String },

    /// Delete a step
    RemoveStep { step_id: i64 },

    /// Derived roadmap status
    Status { roadmap_id: i64 },

    /// Step counts, percentage and steps in order
    Progress { roadmap_id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum CourseCommands {
    /// Add or update a course
    Add {
        course_id: i64,
        title: String,

        #[arg(long, default_value = "")]
        instructor: String,

        #[arg(long, default_value_t = 0)]
        hours: u32,
    },
}

#[derive(Subcommand, Debug)]
pub enum CertificateCommands {
    /// Issue the certificate for a completed course
    Issue { user_id: i64, course_id: i64 },

    /// Look up a certificate and check its fingerprint
    Verify { certificate_id: String },

    /// Certificates held by a user
    List { user_id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
}
