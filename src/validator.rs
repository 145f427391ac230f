// ABOUTME: Schema validation and parsing of raw provider output into artifacts
// ABOUTME: Rejections carry concrete issues to drive one corrective re-prompt
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! # Response Validator/Parser
//!
//! Parses raw provider text into the declared structured artifact. Structured
//! kinds go through strict JSON parsing followed by range checks (sets >= 1,
//! calories > 0, ...); chat replies only need non-empty text. An artifact
//! that fails validation is never cached or persisted — the orchestrator may
//! retry once with a corrective re-prompt built from the reported issues.

use crate::models::{
    ArtifactKind, ChatReply, GeneratedArtifact, MealPlan, ProgressAnalysis, WorkoutPlan,
};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Validation failure with enough detail for one corrective re-prompt
#[derive(Debug, Clone, Error)]
#[error("{kind} failed validation: {}", .issues.join("; "))]
pub struct ValidationError {
    /// Artifact class that failed
    pub kind: ArtifactKind,
    issues: Vec<String>,
}

impl ValidationError {
    /// Create a validation error from collected issues
    #[must_use]
    pub fn new(kind: ArtifactKind, issues: Vec<String>) -> Self {
        Self { kind, issues }
    }

    /// The concrete problems found
    #[must_use]
    pub fn issues(&self) -> &[String] {
        &self.issues
    }
}

/// Parse and validate raw provider text for the given artifact kind
///
/// # Errors
///
/// Returns a [`ValidationError`] describing every detected problem.
pub fn parse(kind: ArtifactKind, raw: &str) -> Result<GeneratedArtifact, ValidationError> {
    match kind {
        ArtifactKind::ChatReply => parse_chat(raw),
        ArtifactKind::WorkoutPlan => {
            let plan: WorkoutPlan = parse_json(kind, raw)?;
            validate_workout(&plan).map(|()| GeneratedArtifact::WorkoutPlan(plan))
        }
        ArtifactKind::MealPlan => {
            let plan: MealPlan = parse_json(kind, raw)?;
            validate_meal(&plan).map(|()| GeneratedArtifact::MealPlan(plan))
        }
        ArtifactKind::ProgressAnalysis => {
            let analysis: ProgressAnalysis = parse_json(kind, raw)?;
            validate_analysis(&analysis).map(|()| GeneratedArtifact::ProgressAnalysis(analysis))
        }
    }
}

/// Chat validation: any non-empty text is valid
fn parse_chat(raw: &str) -> Result<GeneratedArtifact, ValidationError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ValidationError::new(
            ArtifactKind::ChatReply,
            vec!["reply text is empty".to_owned()],
        ));
    }
    Ok(GeneratedArtifact::ChatReply(ChatReply {
        text: text.to_owned(),
    }))
}

/// Strict JSON parsing after peeling Markdown fences and surrounding prose
fn parse_json<T: DeserializeOwned>(kind: ArtifactKind, raw: &str) -> Result<T, ValidationError> {
    let candidate = strip_code_fences(raw);

    match serde_json::from_str(candidate) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            // Providers sometimes wrap the JSON object in prose; retry on the
            // outermost brace span before giving up
            if let Some(inner) = brace_span(candidate) {
                if let Ok(value) = serde_json::from_str(inner) {
                    return Ok(value);
                }
            }
            Err(ValidationError::new(
                kind,
                vec![format!("not valid JSON for the declared schema: {first_error}")],
            ))
        }
    }
}

/// Remove a surrounding Markdown code fence (```json ... ```), if present
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, then everything after the closing fence
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    let body = body.rsplit_once("```").map_or(body, |(inner, _)| inner);
    body.trim()
}

/// The outermost `{...}` span of the text, if any
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn validate_workout(plan: &WorkoutPlan) -> Result<(), ValidationError> {
    let mut issues = Vec::new();

    if plan.title.trim().is_empty() {
        issues.push("title is empty".to_owned());
    }
    if plan.sessions.is_empty() {
        issues.push("plan has no sessions".to_owned());
    }
    for (i, session) in plan.sessions.iter().enumerate() {
        if session.exercises.is_empty() {
            issues.push(format!("session {} ({}) has no exercises", i + 1, session.day));
        }
        for exercise in &session.exercises {
            if exercise.sets < 1 {
                issues.push(format!("exercise '{}' has sets < 1", exercise.name));
            }
            if exercise.reps < 1 {
                issues.push(format!("exercise '{}' has reps < 1", exercise.name));
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(ArtifactKind::WorkoutPlan, issues))
    }
}

fn validate_meal(plan: &MealPlan) -> Result<(), ValidationError> {
    let mut issues = Vec::new();

    if plan.title.trim().is_empty() {
        issues.push("title is empty".to_owned());
    }
    if plan.days.is_empty() {
        issues.push("plan has no days".to_owned());
    }
    for day in &plan.days {
        if day.meals.is_empty() {
            issues.push(format!("day '{}' has no meals", day.day));
        }
        for meal in &day.meals {
            if meal.calories == 0 {
                issues.push(format!("meal '{}' has calories <= 0", meal.name));
            }
            if meal.macros.protein_g < 0.0 || meal.macros.carbs_g < 0.0 || meal.macros.fat_g < 0.0 {
                issues.push(format!("meal '{}' has negative macros", meal.name));
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(ArtifactKind::MealPlan, issues))
    }
}

fn validate_analysis(analysis: &ProgressAnalysis) -> Result<(), ValidationError> {
    if analysis.summary.trim().is_empty() {
        return Err(ValidationError::new(
            ArtifactKind::ProgressAnalysis,
            vec!["summary is empty".to_owned()],
        ));
    }
    Ok(())
}
