// ABOUTME: Generation route handlers for workout plans, meal plans, and analysis
// ABOUTME: Thin wrappers that authenticate and delegate to the orchestrator
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! Plan generation and progress analysis routes.

use crate::context::ServerResources;
use crate::errors::AppError;
use crate::models::{Goal, MealPlanOverrides, ProgressEntry, UserProfile, WorkoutOverrides};
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Request body for workout plan generation
#[derive(Debug, Deserialize)]
pub struct WorkoutPlanRequest {
    /// Profile snapshot used as prompt input
    #[serde(default)]
    pub profile: UserProfile,
    /// Per-request overrides
    #[serde(default)]
    pub overrides: WorkoutOverrides,
}

/// Request body for meal plan generation
#[derive(Debug, Deserialize)]
pub struct MealPlanRequest {
    /// Profile snapshot used as prompt input
    #[serde(default)]
    pub profile: UserProfile,
    /// Per-request overrides
    #[serde(default)]
    pub overrides: MealPlanOverrides,
}

/// Request body for progress analysis
#[derive(Debug, Deserialize)]
pub struct AnalyzeProgressRequest {
    /// Logged entries to analyze
    pub entries: Vec<ProgressEntry>,
    /// Goals to analyze against
    #[serde(default)]
    pub goals: Vec<Goal>,
}

/// Generation routes handler
pub struct GenerateRoutes;

impl GenerateRoutes {
    /// Create all generation routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/ai/workout-plan", post(Self::workout_plan))
            .route("/ai/meal-plan", post(Self::meal_plan))
            .route("/progress/analyze", post(Self::analyze_progress))
            .with_state(resources)
    }

    /// Generate a workout plan
    async fn workout_plan(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<WorkoutPlanRequest>,
    ) -> Result<Response, AppError> {
        let auth = resources.auth.authenticate(&headers)?;

        let plan = resources
            .orchestrator
            .generate_workout_plan(&auth, &request.profile, &request.overrides)
            .await?;

        Ok(Json(plan).into_response())
    }

    /// Generate a meal plan
    async fn meal_plan(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<MealPlanRequest>,
    ) -> Result<Response, AppError> {
        let auth = resources.auth.authenticate(&headers)?;

        let plan = resources
            .orchestrator
            .generate_meal_plan(&auth, &request.profile, &request.overrides)
            .await?;

        Ok(Json(plan).into_response())
    }

    /// Analyze progress entries against goals
    async fn analyze_progress(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<AnalyzeProgressRequest>,
    ) -> Result<Response, AppError> {
        let auth = resources.auth.authenticate(&headers)?;

        let analysis = resources
            .orchestrator
            .analyze_progress(&auth, &request.entries, &request.goals)
            .await?;

        Ok(Json(analysis).into_response())
    }
}
