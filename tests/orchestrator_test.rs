// ABOUTME: Integration tests for the orchestrator pipeline
// ABOUTME: Covers cache hits, quota ceilings, fallback, corrective retries, and streaming
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{
    harness, harness_with_limit, professional_user, starter_user, MockBehavior,
    VALID_ANALYSIS_JSON, VALID_MEAL_JSON, VALID_WORKOUT_JSON,
};
use forma_server::errors::ErrorCode;
use forma_server::models::{
    Goal, MealPlanOverrides, ProgressEntry, UserProfile, WorkoutOverrides,
};
use forma_server::orchestrator::TurnEvent;
use tokio_stream::StreamExt;

fn workout_overrides() -> WorkoutOverrides {
    WorkoutOverrides {
        duration_minutes: Some(30),
        days_per_week: Some(3),
        equipment: vec!["dumbbells".to_owned()],
        focus: None,
    }
}

// ============================================================================
// Cache Behavior
// ============================================================================

#[tokio::test]
async fn test_identical_request_hits_cache_and_skips_provider() {
    let h = harness().await.unwrap();
    let user = starter_user();

    h.primary.push_reply(VALID_WORKOUT_JSON);

    let profile = UserProfile::default();
    let overrides = workout_overrides();

    let first = h
        .orchestrator
        .generate_workout_plan(&user, &profile, &overrides)
        .await
        .unwrap();

    // Second identical request: served from cache, zero adapter calls
    let second = h
        .orchestrator
        .generate_workout_plan(&user, &profile, &overrides)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(h.primary.total_calls(), 1);
    assert_eq!(h.fallback.total_calls(), 0);
}

#[tokio::test]
async fn test_cache_hit_does_not_consume_quota() {
    let h = harness().await.unwrap();
    let user = starter_user();

    h.primary.push_reply(VALID_WORKOUT_JSON);

    let profile = UserProfile::default();
    let overrides = workout_overrides();

    h.orchestrator
        .generate_workout_plan(&user, &profile, &overrides)
        .await
        .unwrap();
    h.orchestrator
        .generate_workout_plan(&user, &profile, &overrides)
        .await
        .unwrap();

    assert_eq!(h.quota.usage_today(user.user_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_different_overrides_miss_cache() {
    let h = harness().await.unwrap();
    let user = starter_user();

    h.primary.push_reply(VALID_WORKOUT_JSON);
    h.primary.push_reply(VALID_WORKOUT_JSON);

    let profile = UserProfile::default();

    h.orchestrator
        .generate_workout_plan(&user, &profile, &workout_overrides())
        .await
        .unwrap();

    let other = WorkoutOverrides {
        duration_minutes: Some(60),
        ..workout_overrides()
    };
    h.orchestrator
        .generate_workout_plan(&user, &profile, &other)
        .await
        .unwrap();

    assert_eq!(h.primary.total_calls(), 2);
}

// ============================================================================
// Quota Enforcement
// ============================================================================

#[tokio::test]
async fn test_quota_ceiling_rejects_without_provider_call() {
    let h = harness_with_limit(2).await.unwrap();
    let user = starter_user();

    h.primary.push_reply(VALID_WORKOUT_JSON);
    h.primary.push_reply(VALID_MEAL_JSON);

    let profile = UserProfile::default();

    h.orchestrator
        .generate_workout_plan(&user, &profile, &workout_overrides())
        .await
        .unwrap();
    h.orchestrator
        .generate_meal_plan(&user, &profile, &MealPlanOverrides::default())
        .await
        .unwrap();

    // Third billable request: rejected before any provider call
    let err = h
        .orchestrator
        .analyze_progress(
            &user,
            &[ProgressEntry {
                date: chrono::NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
                weight_kg: Some(80.0),
                workouts_completed: 3,
                notes: None,
            }],
            &[],
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::QuotaExceeded);
    assert_eq!(h.primary.total_calls(), 2);
    assert_eq!(h.fallback.total_calls(), 0);
}

#[tokio::test]
async fn test_paid_tier_is_not_ceiling_limited() {
    let h = harness_with_limit(1).await.unwrap();
    let user = professional_user();

    let profile = UserProfile::default();

    for _ in 0..3 {
        h.primary.push_reply(VALID_MEAL_JSON);
    }

    // Vary the calorie target so each call is a genuine cache miss
    h.orchestrator
        .generate_meal_plan(&user, &profile, &MealPlanOverrides::default())
        .await
        .unwrap();
    h.orchestrator
        .generate_meal_plan(
            &user,
            &profile,
            &MealPlanOverrides {
                daily_calories: Some(2200),
                ..MealPlanOverrides::default()
            },
        )
        .await
        .unwrap();
    h.orchestrator
        .generate_meal_plan(
            &user,
            &profile,
            &MealPlanOverrides {
                daily_calories: Some(2500),
                ..MealPlanOverrides::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(h.quota.usage_today(user.user_id).await.unwrap(), 3);
}

// ============================================================================
// Fallback & Error Policy
// ============================================================================

#[tokio::test]
async fn test_primary_timeout_falls_back_and_caches() {
    let h = harness().await.unwrap();
    let user = starter_user();

    h.primary.push(MockBehavior::Timeout);
    h.fallback.push_reply(VALID_WORKOUT_JSON);

    let profile = UserProfile::default();
    let overrides = workout_overrides();

    let plan = h
        .orchestrator
        .generate_workout_plan(&user, &profile, &overrides)
        .await
        .unwrap();
    assert_eq!(plan.title, "Dumbbell Strength Block");
    assert_eq!(h.primary.total_calls(), 1);
    assert_eq!(h.fallback.total_calls(), 1);

    // Identical call within TTL: zero additional adapter calls
    h.orchestrator
        .generate_workout_plan(&user, &profile, &overrides)
        .await
        .unwrap();
    assert_eq!(h.primary.total_calls(), 1);
    assert_eq!(h.fallback.total_calls(), 1);
}

#[tokio::test]
async fn test_both_providers_failing_surfaces_unavailable() {
    let h = harness().await.unwrap();
    let user = starter_user();

    h.primary.push(MockBehavior::ServerError);
    h.fallback.push(MockBehavior::Timeout);

    let err = h
        .orchestrator
        .generate_workout_plan(&user, &UserProfile::default(), &workout_overrides())
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::ProviderUnavailable);
}

#[tokio::test]
async fn test_rate_limited_primary_is_surfaced_without_fallback() {
    let h = harness().await.unwrap();
    let user = starter_user();

    h.primary.push(MockBehavior::RateLimited);

    let err = h
        .orchestrator
        .generate_workout_plan(&user, &UserProfile::default(), &workout_overrides())
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::ProviderRateLimited);
    assert_eq!(h.fallback.total_calls(), 0);
}

// ============================================================================
// Validation & Corrective Re-prompt
// ============================================================================

#[tokio::test]
async fn test_malformed_response_recovered_by_corrective_reprompt() {
    let h = harness().await.unwrap();
    let user = starter_user();

    h.primary.push_reply("here is your plan! (not json)");
    h.primary.push_reply(VALID_MEAL_JSON);

    let plan = h
        .orchestrator
        .generate_meal_plan(&user, &UserProfile::default(), &MealPlanOverrides::default())
        .await
        .unwrap();

    assert_eq!(plan.title, "High Protein Week");
    // Original call plus exactly one corrective re-prompt
    assert_eq!(h.primary.total_calls(), 2);
    assert_eq!(h.fallback.total_calls(), 0);
}

#[tokio::test]
async fn test_still_invalid_after_retry_caches_and_persists_nothing() {
    let h = harness().await.unwrap();
    let user = starter_user();

    h.primary.push_reply("not json");
    h.primary.push_reply("still not json");

    let overrides = MealPlanOverrides::default();
    let err = h
        .orchestrator
        .generate_meal_plan(&user, &UserProfile::default(), &overrides)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::InvalidGeneration);
    assert_eq!(h.primary.total_calls(), 2);

    // Nothing was cached: an identical request reaches the provider again
    h.primary.push_reply(VALID_MEAL_JSON);
    h.orchestrator
        .generate_meal_plan(&user, &UserProfile::default(), &overrides)
        .await
        .unwrap();
    assert_eq!(h.primary.total_calls(), 3);
}

#[tokio::test]
async fn test_analysis_round_trip() {
    let h = harness().await.unwrap();
    let user = starter_user();

    h.primary.push_reply(VALID_ANALYSIS_JSON);

    let analysis = h
        .orchestrator
        .analyze_progress(
            &user,
            &[ProgressEntry {
                date: chrono::NaiveDate::from_ymd_opt(2025, 5, 12).unwrap(),
                weight_kg: Some(78.2),
                workouts_completed: 4,
                notes: Some("felt strong".to_owned()),
            }],
            &[Goal {
                name: "weight".to_owned(),
                target: Some("75 kg".to_owned()),
                deadline: None,
            }],
        )
        .await
        .unwrap();

    assert!(!analysis.summary.is_empty());
    assert_eq!(analysis.trends.len(), 1);
}

// ============================================================================
// Chat
// ============================================================================

#[tokio::test]
async fn test_chat_persists_user_then_assistant_in_causal_order() {
    let h = harness().await.unwrap();
    let user = starter_user();
    let session_id = uuid::Uuid::new_v4().to_string();

    h.primary.push_reply("Squats and lunges are a great start.");
    h.primary.push_reply("Three times a week works well.");

    h.orchestrator
        .chat(&session_id, &user, "What leg exercises should I do?")
        .await
        .unwrap();
    h.orchestrator
        .chat(&session_id, &user, "How often?")
        .await
        .unwrap();

    let messages = h.store.list_messages(&session_id).await.unwrap();
    assert_eq!(messages.len(), 4);

    // Every assistant message is immediately preceded by its user message
    for pair in messages.chunks(2) {
        assert_eq!(pair[0].role, "user");
        assert_eq!(pair[1].role, "assistant");
        assert!(pair[0].seq < pair[1].seq);
    }
}

#[tokio::test]
async fn test_chat_user_message_survives_provider_failure() {
    let h = harness().await.unwrap();
    let user = starter_user();
    let session_id = uuid::Uuid::new_v4().to_string();

    h.primary.push(MockBehavior::Timeout);
    h.fallback.push(MockBehavior::ServerError);

    let err = h
        .orchestrator
        .chat(&session_id, &user, "Hello?")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ProviderUnavailable);

    // The user's turn is never lost, even when generation fails
    let messages = h.store.list_messages(&session_id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, "user");
}

#[tokio::test]
async fn test_foreign_session_is_not_found() {
    let h = harness().await.unwrap();
    let owner = starter_user();
    let intruder = starter_user();
    let session_id = uuid::Uuid::new_v4().to_string();

    h.primary.push_reply("hi!");
    h.orchestrator
        .chat(&session_id, &owner, "hello")
        .await
        .unwrap();

    let err = h
        .orchestrator
        .chat(&session_id, &intruder, "let me in")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn test_streaming_chat_orders_deltas_and_persists_once_complete() {
    let h = harness().await.unwrap();
    let user = starter_user();
    let session_id = uuid::Uuid::new_v4().to_string();

    h.primary.push(MockBehavior::ReplyChunks(vec![
        "Drink ".to_owned(),
        "more ".to_owned(),
        "water.".to_owned(),
    ]));

    let mut stream = h
        .orchestrator
        .chat_stream(&session_id, &user, "Hydration tips?")
        .await
        .unwrap();

    let mut deltas = Vec::new();
    let mut completed = None;
    while let Some(event) = stream.next().await {
        match event.unwrap() {
            TurnEvent::Delta(delta) => deltas.push(delta),
            TurnEvent::Completed(message) => completed = Some(message),
        }
    }

    assert_eq!(deltas, vec!["Drink ", "more ", "water."]);
    let completed = completed.expect("stream should end with a completion event");
    assert_eq!(completed.content, "Drink more water.");

    let messages = h.store.list_messages(&session_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, "assistant");
    assert_eq!(messages[1].content, "Drink more water.");
}

#[tokio::test]
async fn test_cancelled_stream_discards_partial_assistant_message() {
    let h = harness().await.unwrap();
    let user = starter_user();
    let session_id = uuid::Uuid::new_v4().to_string();

    h.primary.push(MockBehavior::ReplyChunks(vec![
        "First ".to_owned(),
        "second ".to_owned(),
        "third.".to_owned(),
    ]));

    let mut stream = h
        .orchestrator
        .chat_stream(&session_id, &user, "Tell me everything")
        .await
        .unwrap();

    // Consume a single delta, then simulate a client disconnect
    let first = stream.next().await.unwrap().unwrap();
    assert!(matches!(first, TurnEvent::Delta(_)));
    drop(stream);

    // No partial assistant row; the user's message remains intact
    let messages = h.store.list_messages(&session_id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, "user");
}

#[tokio::test]
async fn test_stream_limit_per_user() {
    let h = harness().await.unwrap();
    let user = starter_user();

    h.primary.push(MockBehavior::ReplyChunks(vec!["a".to_owned()]));
    h.primary.push(MockBehavior::ReplyChunks(vec!["b".to_owned()]));

    let s1 = h
        .orchestrator
        .chat_stream(&uuid::Uuid::new_v4().to_string(), &user, "one")
        .await
        .unwrap();
    let s2 = h
        .orchestrator
        .chat_stream(&uuid::Uuid::new_v4().to_string(), &user, "two")
        .await
        .unwrap();

    // Third concurrent stream for the same user is rejected up front
    let err = match h
        .orchestrator
        .chat_stream(&uuid::Uuid::new_v4().to_string(), &user, "three")
        .await
    {
        Ok(_) => panic!("expected third concurrent stream to be rejected"),
        Err(e) => e,
    };
    assert_eq!(err.code, ErrorCode::StreamLimitExceeded);

    // Releasing a slot frees capacity
    drop(s1);
    drop(s2);
    h.primary.push(MockBehavior::ReplyChunks(vec!["c".to_owned()]));
    assert!(h
        .orchestrator
        .chat_stream(&uuid::Uuid::new_v4().to_string(), &user, "four")
        .await
        .is_ok());
}

#[tokio::test]
async fn test_chat_cache_hit_still_appends_assistant_reply() {
    let h = harness().await.unwrap();
    let user = starter_user();

    h.primary.push_reply("Stretch daily.");

    // Two sessions with an identical opening turn share a fingerprint
    let first_session = uuid::Uuid::new_v4().to_string();
    let second_session = uuid::Uuid::new_v4().to_string();

    h.orchestrator
        .chat(&first_session, &user, "Mobility advice?")
        .await
        .unwrap();
    let turn = h
        .orchestrator
        .chat(&second_session, &user, "Mobility advice?")
        .await
        .unwrap();

    // Served from cache: no extra provider call, history still complete
    assert_eq!(h.primary.total_calls(), 1);
    assert_eq!(turn.assistant_message.content, "Stretch daily.");
    assert_eq!(
        h.store.list_messages(&second_session).await.unwrap().len(),
        2
    );
    assert_eq!(h.quota.usage_today(user.user_id).await.unwrap(), 1);
}
