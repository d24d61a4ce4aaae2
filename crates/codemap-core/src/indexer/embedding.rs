//! Signature embeddings and cosine similarity.
//!
//! Vectors are built with signed feature hashing: every identifier in the
//! signature (and each of its camelCase / snake_case parts) is hashed into
//! one of `dimensions` buckets. The result is L2-normalised, so equal
//! signatures always produce equal vectors of the configured length.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;

use crate::models::CodeElement;

static IDENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z_$][\w$]*").unwrap());

static SUBWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]+(?:[a-z0-9]+)?|[a-z0-9]+").unwrap());

/// Lowercased features of a signature: whole identifiers plus their parts.
pub fn signature_features(signature: &str) -> Vec<String> {
    let mut features = Vec::new();
    for ident in IDENT_RE.find_iter(signature) {
        let ident = ident.as_str();
        features.push(ident.to_lowercase());
        let parts: Vec<&str> = SUBWORD_RE.find_iter(ident).map(|m| m.as_str()).collect();
        if parts.len() > 1 {
            features.extend(parts.into_iter().map(str::to_lowercase));
        }
    }
    features
}

pub fn embed_signature(signature: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimensions];
    if dimensions == 0 {
        return vector;
    }
    for feature in signature_features(signature) {
        let hash = crc32fast::hash(feature.as_bytes());
        let bucket = (hash as usize) % dimensions;
        let sign = if hash & 0x8000_0000 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

/// Cosine similarity in `[-1, 1]`. Zero vectors and mismatched lengths
/// compare as `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Embed a batch of elements in parallel.
pub fn embed_elements<'a>(
    elements: impl IntoIterator<Item = &'a CodeElement>,
    dimensions: usize,
) -> BTreeMap<String, Vec<f32>> {
    let pending: Vec<&CodeElement> = elements.into_iter().collect();
    pending
        .par_iter()
        .map(|e| (e.id.clone(), embed_signature(&e.signature, dimensions)))
        .collect()
}
