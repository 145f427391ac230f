// ABOUTME: Domain model for users, request overrides, and generated artifacts
// ABOUTME: Typed structs replace loose JSON dictionaries at every boundary
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! Core data structures shared across the orchestration pipeline.
//!
//! Override parameters and generated artifacts are explicit structs validated
//! at the boundary; internal code never handles untyped maps.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

// ============================================================================
// User Tiers
// ============================================================================

/// Subscription tier controlling daily AI request ceilings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    /// Free tier with a small daily AI request limit
    #[default]
    Starter,
    /// Paid tier, effectively unlimited
    Professional,
    /// Paid tier, effectively unlimited
    Enterprise,
}

impl UserTier {
    /// Whether this tier has no daily ceiling
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        matches!(self, Self::Professional | Self::Enterprise)
    }

    /// String form used in JWT claims and logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }
}

impl Display for UserTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// User Profile & Request Overrides
// ============================================================================

/// Self-reported training experience
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FitnessLevel {
    /// New to structured training
    #[default]
    Beginner,
    /// Consistent training for several months
    Intermediate,
    /// Multiple years of structured training
    Advanced,
}

impl FitnessLevel {
    /// String form used in prompts
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

/// Snapshot of the user profile used as prompt input.
///
/// Field order matters: the serialized form feeds the cache fingerprint, so
/// it must stay stable across releases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UserProfile {
    /// Age in years
    pub age: Option<u32>,
    /// Body weight in kilograms
    pub weight_kg: Option<f64>,
    /// Height in centimeters
    pub height_cm: Option<f64>,
    /// Training experience
    pub fitness_level: FitnessLevel,
    /// Stated goals ("lose weight", "run a 10k", ...)
    #[serde(default)]
    pub goals: Vec<String>,
    /// Dietary preferences ("vegetarian", "no dairy", ...)
    #[serde(default)]
    pub dietary_preferences: Vec<String>,
    /// Known injuries or movement restrictions
    #[serde(default)]
    pub injuries: Vec<String>,
}

/// Per-request overrides for workout plan generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkoutOverrides {
    /// Target session duration in minutes
    pub duration_minutes: Option<u32>,
    /// Training days per week
    pub days_per_week: Option<u8>,
    /// Available equipment
    #[serde(default)]
    pub equipment: Vec<String>,
    /// Focus area ("strength", "endurance", ...)
    pub focus: Option<String>,
}

/// Per-request overrides for meal plan generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MealPlanOverrides {
    /// Daily calorie target
    pub daily_calories: Option<u32>,
    /// Number of meals per day
    pub meals_per_day: Option<u8>,
    /// Dietary style ("mediterranean", "high protein", ...)
    pub dietary_style: Option<String>,
    /// Ingredients to exclude
    #[serde(default)]
    pub exclusions: Vec<String>,
}

/// A single logged progress entry submitted for analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEntry {
    /// Calendar date of the entry
    pub date: NaiveDate,
    /// Body weight at the time, if logged
    pub weight_kg: Option<f64>,
    /// Workouts completed that day
    #[serde(default)]
    pub workouts_completed: u32,
    /// Free-form note
    pub notes: Option<String>,
}

/// A user goal considered during progress analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    /// Goal name
    pub name: String,
    /// Target description ("75 kg", "5k under 25:00")
    pub target: Option<String>,
    /// Target date, if any
    pub deadline: Option<NaiveDate>,
}

// ============================================================================
// Generated Artifacts
// ============================================================================

/// Artifact class of a generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Multi-session workout plan
    WorkoutPlan,
    /// Multi-day meal plan
    MealPlan,
    /// Trends/achievements/recommendations analysis
    ProgressAnalysis,
    /// Free-text chat reply
    ChatReply,
}

impl ArtifactKind {
    /// Stable identifier used in cache keys and logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WorkoutPlan => "workout_plan",
            Self::MealPlan => "meal_plan",
            Self::ProgressAnalysis => "progress_analysis",
            Self::ChatReply => "chat_reply",
        }
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// One exercise within a workout session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    /// Exercise name
    pub name: String,
    /// Number of sets (at least 1)
    pub sets: u32,
    /// Repetitions per set (at least 1)
    pub reps: u32,
    /// Rest between sets in seconds
    pub rest_secs: Option<u32>,
    /// Equipment needed, if any
    pub equipment: Option<String>,
}

/// One training session within a workout plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSession {
    /// Day label ("Monday", "Day 1")
    pub day: String,
    /// Session focus ("upper body", "intervals")
    pub focus: Option<String>,
    /// Ordered exercises
    pub exercises: Vec<Exercise>,
}

/// A generated workout plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutPlan {
    /// Plan title
    pub title: String,
    /// Plan length in weeks
    pub weeks: Option<u32>,
    /// Training sessions
    pub sessions: Vec<WorkoutSession>,
    /// Coaching notes
    pub notes: Option<String>,
}

/// Meal slot within a day
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MealKind {
    /// Morning meal
    Breakfast,
    /// Midday meal
    Lunch,
    /// Evening meal
    Dinner,
    /// Between-meal snack
    Snack,
}

/// Macronutrient breakdown in grams
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Macros {
    /// Protein in grams
    pub protein_g: f64,
    /// Carbohydrates in grams
    pub carbs_g: f64,
    /// Fat in grams
    pub fat_g: f64,
}

/// One meal within a meal-plan day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meal {
    /// Meal name
    pub name: String,
    /// Meal slot
    pub kind: MealKind,
    /// Calories (strictly positive)
    pub calories: u32,
    /// Macronutrient breakdown
    pub macros: Macros,
}

/// One day within a meal plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MealDay {
    /// Day label
    pub day: String,
    /// Meals for the day
    pub meals: Vec<Meal>,
}

/// A generated meal plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MealPlan {
    /// Plan title
    pub title: String,
    /// Daily meal schedules
    pub days: Vec<MealDay>,
    /// Combined shopping list
    #[serde(default)]
    pub shopping_list: Vec<String>,
}

/// Direction of a detected trend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    /// Metric is moving toward the goal
    Improving,
    /// Metric is moving away from the goal
    Declining,
    /// No meaningful change
    Stable,
}

/// One detected trend in a progress analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trend {
    /// Metric name ("weight", "workout frequency")
    pub metric: String,
    /// Direction of change
    pub direction: TrendDirection,
    /// Supporting detail
    pub detail: Option<String>,
}

/// A generated progress analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressAnalysis {
    /// Overall summary (non-empty)
    pub summary: String,
    /// Detected trends
    #[serde(default)]
    pub trends: Vec<Trend>,
    /// Notable achievements
    #[serde(default)]
    pub achievements: Vec<String>,
    /// Recommendations going forward
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// A free-text chat reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    /// Reply text (non-empty)
    pub text: String,
}

/// Discriminated union over everything the pipeline can generate.
///
/// Serialized form is internally tagged so cached entries self-describe
/// their kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratedArtifact {
    /// A workout plan
    WorkoutPlan(WorkoutPlan),
    /// A meal plan
    MealPlan(MealPlan),
    /// A progress analysis
    ProgressAnalysis(ProgressAnalysis),
    /// A chat reply
    ChatReply(ChatReply),
}

impl GeneratedArtifact {
    /// The artifact class of this value
    #[must_use]
    pub const fn kind(&self) -> ArtifactKind {
        match self {
            Self::WorkoutPlan(_) => ArtifactKind::WorkoutPlan,
            Self::MealPlan(_) => ArtifactKind::MealPlan,
            Self::ProgressAnalysis(_) => ArtifactKind::ProgressAnalysis,
            Self::ChatReply(_) => ArtifactKind::ChatReply,
        }
    }
}
