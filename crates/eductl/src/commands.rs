//! Command execution.
//!
//! Every command produces a JSON value. Engine errors keep their
//! `EduError` identity through `anyhow` so the caller can render the
//! structured `{"error": {...}}` body.

use crate::cli::{
    ApplyArgs, CertificateCommands, Cli, Commands, ConfigCommands, CourseCommands,
    ProgressCommands, RoadmapCommands,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use edu_common::engine::{CertificateIssuer, ProgressEngine, RoadmapSequencer};
use edu_common::store::{SqliteOutbox, SqliteStore};
use edu_common::EduConfig;
use edu_shared::error::ErrorBody;
use edu_shared::{
    Activity, ActivityDetail, ActivityKind, Course, EduError, ErrorResponse, NewRoadmap, NewStep,
    StepStatus,
};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Opened configuration and database
pub struct App {
    pub config: EduConfig,
    store: SqliteStore,
}

impl App {
    pub fn open(cli: &Cli) -> Result<Self> {
        let mut config = EduConfig::load(cli.config.as_deref())?;
        if let Some(db) = &cli.db {
            config.database.path = db.clone();
        }
        let timeout = Duration::from_millis(config.database.effective_busy_timeout_ms());
        let store = SqliteStore::open(&config.database.path, timeout).with_context(|| {
            format!(
                "Failed to open database {}",
                config.database.path.display()
            )
        })?;
        Ok(Self { config, store })
    }

    fn progress(&self) -> Result<ProgressEngine<SqliteStore>> {
        ProgressEngine::from_config(self.store.clone(), &self.config)
    }

    fn sequencer(&self) -> RoadmapSequencer<SqliteStore> {
        RoadmapSequencer::new(self.store.clone())
    }

    fn issuer(&self) -> CertificateIssuer<SqliteStore, SqliteOutbox> {
        CertificateIssuer::new(self.store.clone(), self.store.outbox()).with_completion_threshold(
            self.config.certificates.effective_completion_threshold(),
        )
    }
}

fn json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).context("Failed to serialize output")
}

/// Parse `--at`, defaulting to now
fn parse_time(at: Option<&str>, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    match at {
        None => Ok(now),
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                EduError::validation(format!("invalid timestamp {:?}: {}", text, e)).into()
            }),
    }
}

fn required<T>(value: Option<T>, flag: &str, kind: ActivityKind) -> Result<T> {
    value.ok_or_else(|| EduError::validation(format!("{} requires --{}", kind, flag)).into())
}

/// Build the activity from either `--json` or the kind and its flags
pub fn build_activity(args: &ApplyArgs, now: DateTime<Utc>) -> Result<Activity> {
    if let Some(text) = &args.json {
        let mut value: Value = serde_json::from_str(text)
            .map_err(|e| EduError::validation(format!("activity is not valid JSON: {}", e)))?;
        if let Some(obj) = value.as_object_mut() {
            if !obj.contains_key("occurred_at") {
                let at = parse_time(args.at.as_deref(), now)?;
                obj.insert("occurred_at".to_string(), Value::String(at.to_rfc3339()));
            }
        }
        return Ok(Activity::from_json(value)?);
    }

    let kind: ActivityKind = args
        .kind
        .as_deref()
        .ok_or_else(|| EduError::validation("activity kind or --json is required"))?
        .parse()?;
    let detail = match kind {
        ActivityKind::DailyLogin => ActivityDetail::DailyLogin,
        ActivityKind::CourseEnrolled => ActivityDetail::CourseEnrolled {
            course_id: required(args.course_id, "course-id", kind)?,
        },
        ActivityKind::ModuleCompleted => ActivityDetail::ModuleCompleted {
            course_id: required(args.course_id, "course-id", kind)?,
        },
        ActivityKind::CourseCompleted => ActivityDetail::CourseCompleted {
            course_id: required(args.course_id, "course-id", kind)?,
        },
        ActivityKind::AssessmentCompleted => ActivityDetail::AssessmentCompleted {
            assessment_id: required(args.assessment_id, "assessment-id", kind)?,
            score: required(args.score, "score", kind)?,
        },
        ActivityKind::RoadmapStepCompleted => ActivityDetail::RoadmapStepCompleted {
            step_id: required(args.step_id, "step-id", kind)?,
        },
        ActivityKind::StudySession => ActivityDetail::StudySession {
            minutes: required(args.minutes, "minutes", kind)?,
        },
        ActivityKind::XpAdjustment => ActivityDetail::XpAdjustment {
            amount: required(args.amount, "amount", kind)?,
            reason: args.reason.clone().unwrap_or_default(),
        },
    };
    Ok(Activity::new(detail, parse_time(args.at.as_deref(), now)?))
}

/// Execute a parsed command line
pub fn run(cli: &Cli) -> Result<Value> {
    let app = App::open(cli)?;
    execute(&app, &cli.command, Utc::now())
}

pub fn execute(app: &App, command: &Commands, now: DateTime<Utc>) -> Result<Value> {
    debug!("Executing {:?}", command);
    match command {
        Commands::Progress { action } => {
            let engine = app.progress()?;
            match action {
                ProgressCommands::Apply(args) => {
                    let activity = build_activity(args, now)?;
                    json(&engine.apply_activity(args.user_id, &activity, now)?)
                }
                ProgressCommands::Show { user_id } => json(&engine.progress_view(*user_id)?),
                ProgressCommands::Achievements { user_id } => {
                    json(&engine.achievements(*user_id)?)
                }
            }
        }

        Commands::Leaderboard { limit, viewer } => {
            json(&app.progress()?.leaderboard(*limit, *viewer)?)
        }

        Commands::Roadmap { action } => {
            let seq = app.sequencer();
            match action {
                RoadmapCommands::Create {
                    user_id,
                    name,
                    description,
                    target_skill,
                } => {
                    let new = NewRoadmap {
                        name: name.clone(),
                        description: description.clone(),
                        target_skill: target_skill.clone(),
                    };
                    json(&seq.create_roadmap(*user_id, &new, now)?)
                }
                RoadmapCommands::AddStep {
                    roadmap_id,
                    title,
                    description,
                    course_id,
                    resource_url,
                } => {
                    let new = NewStep {
                        title: title.clone(),
                        description: description.clone(),
                        course_id: *course_id,
                        resource_url: resource_url.clone(),
                    };
                    json(&seq.add_step(*roadmap_id, &new)?)
                }
                RoadmapCommands::Reorder {
                    roadmap_id,
                    step_ids,
                } => json(&seq.reorder_steps(*roadmap_id, step_ids)?),
                RoadmapCommands::SetStatus { step_id, status } => {
                    let status: StepStatus = status.parse()?;
                    json(&seq.update_step_status(*step_id, status, now)?)
                }
                RoadmapCommands::RemoveStep { step_id } => json(&seq.remove_step(*step_id)?),
                RoadmapCommands::Status { roadmap_id } => {
                    let status = seq.get_roadmap_status(*roadmap_id)?;
                    Ok(serde_json::json!({
                        "roadmap_id": roadmap_id,
                        "status": status,
                    }))
                }
                RoadmapCommands::Progress { roadmap_id } => {
                    let roadmap = seq.roadmap(*roadmap_id)?;
                    let progress = seq.roadmap_progress(*roadmap_id)?;
                    let steps = seq.steps(*roadmap_id)?;
                    Ok(serde_json::json!({
                        "roadmap": roadmap,
                        "progress": progress,
                        "steps": steps,
                    }))
                }
            }
        }

        Commands::Course { action } => match action {
            CourseCommands::Add {
                course_id,
                title,
                instructor,
                hours,
            } => {
                let course = Course {
                    id: *course_id,
                    title: title.clone(),
                    instructor_name: instructor.clone(),
                    duration_hours: *hours,
                };
                app.issuer().register_course(&course)?;
                json(&course)
            }
        },

        Commands::Enroll {
            user_id,
            course_id,
            progress,
        } => json(
            &app
                .issuer()
                .record_enrollment(*user_id, *course_id, *progress, now)?,
        ),

        Commands::Certificate { action } => {
            let issuer = app.issuer();
            match action {
                CertificateCommands::Issue { user_id, course_id } => {
                    json(&issuer.issue_certificate(*user_id, *course_id, now)?)
                }
                CertificateCommands::Verify { certificate_id } => {
                    let id = Uuid::parse_str(certificate_id).map_err(|e| {
                        EduError::validation(format!(
                            "invalid certificate id {:?}: {}",
                            certificate_id, e
                        ))
                    })?;
                    json(&issuer.verify_certificate(id)?)
                }
                CertificateCommands::List { user_id } => {
                    json(&issuer.certificates_for_user(*user_id)?)
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigCommands::Show => json(&app.config),
        },
    }
}

/// Structured error body and process exit code for a failed command.
/// Engine errors keep their kind and code; anything else (config, I/O) is
/// reported as an internal error.
pub fn error_response(err: &anyhow::Error) -> (ErrorResponse, u8) {
    match err.downcast_ref::<EduError>() {
        Some(edu) => {
            let exit = if edu.is_client_error() { 1 } else { 2 };
            (edu.to_response(), exit)
        }
        None => (
            ErrorResponse {
                error: ErrorBody {
                    kind: "internal_error".to_string(),
                    code: 500,
                    message: format!("{:#}", err),
                },
            },
            2,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-09-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn apply_args(argv: &[&str]) -> ApplyArgs {
        let mut full = vec!["eductl", "progress", "apply"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Progress {
                action: ProgressCommands::Apply(args),
            } => args,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_build_from_flags() {
        let args = apply_args(&[
            "1",
            "assessment_completed",
            "--assessment-id",
            "3",
            "--score",
            "100",
        ]);
        let activity = build_activity(&args, now()).unwrap();
        assert!(activity.detail.is_perfect_score());
        assert_eq!(activity.occurred_at, now());
    }

    #[test]
    fn test_missing_flag_is_validation() {
        let args = apply_args(&["1", "study_session"]);
        let err = build_activity(&args, now()).unwrap_err();
        let (body, exit) = error_response(&err);
        assert_eq!(body.error.kind, "validation_error");
        assert!(body.error.message.contains("--minutes"));
        assert_eq!(exit, 1);
    }

    #[test]
    fn test_unknown_kind() {
        let args = apply_args(&["1", "teleport"]);
        let err = build_activity(&args, now()).unwrap_err();
        assert_eq!(error_response(&err).0.error.code, 400);
    }

    #[test]
    fn test_build_from_json_fills_time() {
        let args = apply_args(&["1", "--json", r#"{"type":"study_session","minutes":45}"#]);
        let activity = build_activity(&args, now()).unwrap();
        assert_eq!(activity.detail, ActivityDetail::StudySession { minutes: 45 });
        assert_eq!(activity.occurred_at, now());
    }

    #[test]
    fn test_explicit_time() {
        let args = apply_args(&["1", "daily_login", "--at", "2026-08-31T23:30:00-02:00"]);
        let activity = build_activity(&args, now()).unwrap();
        assert_eq!(activity.occurred_at.to_rfc3339(), "2026-09-01T01:30:00+00:00");
    }

    #[test]
    fn test_non_engine_error_is_internal() {
        let err = anyhow::anyhow!("disk on fire");
        let (body, exit) = error_response(&err);
        assert_eq!(body.error.kind, "internal_error");
        assert_eq!(exit, 2);
    }
}
