//! Canned model responses for Gemini client tests.
#![allow(dead_code)]

use serde_json::{json, Value};

pub const SUNSET_TITLE: &str = "Sunset over the bay, golden hour";

/// 47 keywords, as the prompt requests.
pub fn sunset_tags() -> Vec<String> {
    let mut tags: Vec<String> = ["beach", "sunset", "bay", "golden hour", "ocean", "sky", "coast"]
        .iter()
        .map(|tag| tag.to_string())
        .collect();
    tags.extend((tags.len() + 1..=47).map(|i| format!("keyword{i}")));
    tags
}

/// A `generateContent` body whose only text part is `text`.
pub fn gemini_response(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{ "text": text }]
            },
            "finishReason": "STOP"
        }]
    })
}

/// Model answer wrapped in a ```json fence, as Gemini sometimes returns it.
pub fn fenced_metadata(title: &str, tags: &[String]) -> String {
    format!(
        "```json\n{}\n```",
        json!({ "title": title, "tags": tags })
    )
}
