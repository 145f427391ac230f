// ABOUTME: Deterministic prompt assembly for every artifact kind
// ABOUTME: Identical inputs produce byte-identical prompt text for cache fingerprinting
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! # Prompt Builder
//!
//! Pure functions, no I/O. Determinism is load-bearing: the cache fingerprint
//! hashes the rendered prompt, so identical (profile, overrides, window)
//! inputs must produce byte-identical text. Keep iteration order fixed and
//! avoid anything time- or randomness-dependent here.

use crate::database::ChatMessageRecord;
use crate::llm::{ChatMessage, MessageRole};
use crate::models::{Goal, MealPlanOverrides, ProgressEntry, UserProfile, WorkoutOverrides};
use crate::validator::ValidationError;
use std::fmt::Write;

/// System prompt for chat conversations
const CHAT_SYSTEM_PROMPT: &str = "You are Forma, a knowledgeable and encouraging fitness coach. \
Answer questions about training, nutrition, and recovery concisely and practically. \
Recommend consulting a professional for medical concerns.";

/// Get the chat system prompt
#[must_use]
pub const fn chat_system_prompt() -> &'static str {
    CHAT_SYSTEM_PROMPT
}

/// Render the shared profile block used by plan prompts
fn profile_block(profile: &UserProfile) -> String {
    let mut out = String::from("User profile:\n");
    if let Some(age) = profile.age {
        let _ = writeln!(out, "- Age: {age}");
    }
    if let Some(weight) = profile.weight_kg {
        let _ = writeln!(out, "- Weight: {weight} kg");
    }
    if let Some(height) = profile.height_cm {
        let _ = writeln!(out, "- Height: {height} cm");
    }
    let _ = writeln!(out, "- Fitness level: {}", profile.fitness_level.as_str());
    if !profile.goals.is_empty() {
        let _ = writeln!(out, "- Goals: {}", profile.goals.join(", "));
    }
    if !profile.dietary_preferences.is_empty() {
        let _ = writeln!(
            out,
            "- Dietary preferences: {}",
            profile.dietary_preferences.join(", ")
        );
    }
    if !profile.injuries.is_empty() {
        let _ = writeln!(out, "- Injuries: {}", profile.injuries.join(", "));
    }
    out
}

/// Build the workout plan generation prompt
#[must_use]
pub fn workout_plan(profile: &UserProfile, overrides: &WorkoutOverrides) -> String {
    let mut out = String::from(
        "Create a personalized workout plan.\n\n",
    );
    out.push_str(&profile_block(profile));

    out.push_str("\nConstraints:\n");
    if let Some(duration) = overrides.duration_minutes {
        let _ = writeln!(out, "- Session duration: {duration} minutes");
    }
    if let Some(days) = overrides.days_per_week {
        let _ = writeln!(out, "- Training days per week: {days}");
    }
    if overrides.equipment.is_empty() {
        out.push_str("- Equipment: bodyweight only\n");
    } else {
        let _ = writeln!(out, "- Equipment: {}", overrides.equipment.join(", "));
    }
    if let Some(focus) = &overrides.focus {
        let _ = writeln!(out, "- Focus: {focus}");
    }

    out.push_str(
        "\nRespond with JSON only, no prose, matching this schema exactly:\n\
        {\"title\": string, \"weeks\": number|null, \"notes\": string|null, \
        \"sessions\": [{\"day\": string, \"focus\": string|null, \
        \"exercises\": [{\"name\": string, \"sets\": number (>= 1), \"reps\": number (>= 1), \
        \"rest_secs\": number|null, \"equipment\": string|null}]}]}",
    );
    out
}

/// Build the meal plan generation prompt
#[must_use]
pub fn meal_plan(profile: &UserProfile, overrides: &MealPlanOverrides) -> String {
    let mut out = String::from("Create a personalized meal plan.\n\n");
    out.push_str(&profile_block(profile));

    out.push_str("\nConstraints:\n");
    if let Some(calories) = overrides.daily_calories {
        let _ = writeln!(out, "- Daily calorie target: {calories}");
    }
    if let Some(meals) = overrides.meals_per_day {
        let _ = writeln!(out, "- Meals per day: {meals}");
    }
    if let Some(style) = &overrides.dietary_style {
        let _ = writeln!(out, "- Dietary style: {style}");
    }
    if !overrides.exclusions.is_empty() {
        let _ = writeln!(out, "- Exclude: {}", overrides.exclusions.join(", "));
    }

    out.push_str(
        "\nRespond with JSON only, no prose, matching this schema exactly:\n\
        {\"title\": string, \"shopping_list\": [string], \
        \"days\": [{\"day\": string, \"meals\": [{\"name\": string, \
        \"kind\": \"breakfast\"|\"lunch\"|\"dinner\"|\"snack\", \"calories\": number (> 0), \
        \"macros\": {\"protein_g\": number, \"carbs_g\": number, \"fat_g\": number}}]}]}",
    );
    out
}

/// Build the progress analysis prompt
#[must_use]
pub fn progress_analysis(entries: &[ProgressEntry], goals: &[Goal]) -> String {
    let mut out = String::from("Analyze the user's fitness progress.\n\nLogged entries:\n");

    for entry in entries {
        let _ = write!(out, "- {}: ", entry.date);
        if let Some(weight) = entry.weight_kg {
            let _ = write!(out, "weight {weight} kg, ");
        }
        let _ = write!(out, "{} workouts", entry.workouts_completed);
        if let Some(notes) = &entry.notes {
            let _ = write!(out, " ({notes})");
        }
        out.push('\n');
    }

    if !goals.is_empty() {
        out.push_str("\nGoals:\n");
        for goal in goals {
            let _ = write!(out, "- {}", goal.name);
            if let Some(target) = &goal.target {
                let _ = write!(out, ": {target}");
            }
            if let Some(deadline) = goal.deadline {
                let _ = write!(out, " (by {deadline})");
            }
            out.push('\n');
        }
    }

    out.push_str(
        "\nRespond with JSON only, no prose, matching this schema exactly:\n\
        {\"summary\": string (non-empty), \
        \"trends\": [{\"metric\": string, \"direction\": \"improving\"|\"declining\"|\"stable\", \
        \"detail\": string|null}], \
        \"achievements\": [string], \"recommendations\": [string]}",
    );
    out
}

/// Build the message sequence for a chat completion: system prompt plus the
/// conversation window, oldest first. The window is already truncated to the
/// configured size by the store query.
#[must_use]
pub fn chat_messages(window: &[ChatMessageRecord]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(window.len() + 1);
    messages.push(ChatMessage::system(CHAT_SYSTEM_PROMPT));

    for record in window {
        let Some(role) = MessageRole::parse(&record.role) else {
            continue;
        };
        messages.push(ChatMessage::new(role, record.content.clone()));
    }

    messages
}

/// Canonical rendering of a message sequence, used as fingerprint input
#[must_use]
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        let _ = writeln!(out, "{}: {}", message.role.as_str(), message.content);
    }
    out
}

/// Build the corrective re-prompt issued after a schema violation.
///
/// Embeds the original instructions, the malformed reply, and the concrete
/// validation issues so the provider can fix formatting without changing
/// content.
#[must_use]
pub fn correction(original_prompt: &str, raw_reply: &str, error: &ValidationError) -> String {
    let mut out = String::from(
        "Your previous reply did not match the required JSON schema.\n\nOriginal request:\n",
    );
    out.push_str(original_prompt);
    out.push_str("\n\nYour reply:\n");
    out.push_str(raw_reply);
    out.push_str("\n\nProblems:\n");
    for issue in error.issues() {
        let _ = writeln!(out, "- {issue}");
    }
    out.push_str("\nRespond again with corrected JSON only. Do not include any other text.");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FitnessLevel;

    fn sample_profile() -> UserProfile {
        UserProfile {
            age: Some(31),
            weight_kg: Some(74.5),
            height_cm: Some(180.0),
            fitness_level: FitnessLevel::Intermediate,
            goals: vec!["build muscle".to_owned()],
            dietary_preferences: vec![],
            injuries: vec![],
        }
    }

    #[test]
    fn test_workout_prompt_is_deterministic() {
        let profile = sample_profile();
        let overrides = WorkoutOverrides {
            duration_minutes: Some(45),
            days_per_week: Some(4),
            equipment: vec!["dumbbells".to_owned(), "bench".to_owned()],
            focus: Some("strength".to_owned()),
        };

        let a = workout_plan(&profile, &overrides);
        let b = workout_plan(&profile, &overrides);
        assert_eq!(a, b);
        assert!(a.contains("dumbbells, bench"));
        assert!(a.contains("JSON only"));
    }

    #[test]
    fn test_different_overrides_change_prompt() {
        let profile = sample_profile();
        let a = workout_plan(&profile, &WorkoutOverrides::default());
        let b = workout_plan(
            &profile,
            &WorkoutOverrides {
                duration_minutes: Some(30),
                ..WorkoutOverrides::default()
            },
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_transcript_rendering() {
        let messages = vec![
            ChatMessage::system("s"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
        ];
        let rendered = render_transcript(&messages);
        assert_eq!(rendered, "system: s\nuser: hello\nassistant: hi\n");
    }
}
