// ABOUTME: Request fingerprinting for content-addressed response caching
// ABOUTME: SHA-256 over the normalized (kind, user, prompt) tuple
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! # Generation Fingerprint
//!
//! A generation request is normalized into (artifact kind, user id, rendered
//! prompt). The prompt builder is deterministic over the profile snapshot,
//! overrides, and conversation window, so hashing the rendered prompt covers
//! every input that affects the generation. Two requests with identical
//! normalized tuples are cache-equivalent regardless of arrival order.

use crate::models::ArtifactKind;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Ephemeral normalized form of a generation request.
///
/// Never persisted; exists only to compute the cache fingerprint.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// Artifact class being generated
    pub kind: ArtifactKind,
    /// Requesting user
    pub user_id: Uuid,
    /// Deterministically rendered prompt text
    pub prompt: &'a str,
}

impl GenerationRequest<'_> {
    /// Compute the hex-encoded SHA-256 fingerprint of this request
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        // NUL separators keep field boundaries unambiguous
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.user_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.prompt.as_bytes());
        hex::encode(hasher.finalize())
    }
}
