//! Primary provider payload normalization
//!
//! The primary API returns posts and media in separate lists: posts reference
//! media by key through `attachments.media_keys`, and the media objects live in
//! `includes.media`.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::data::{FetchResult, MediaItem, MediaKind, MediaPost};

/// A single post from the `data` array
#[derive(Debug, Deserialize)]
struct PrimaryPost {
    id: String,
    #[serde(default)]
    text: String,
    created_at: Option<String>,
    #[serde(default)]
    attachments: Option<Attachments>,
}

#[derive(Debug, Default, Deserialize)]
struct Attachments {
    #[serde(default)]
    media_keys: Vec<String>,
}

/// A single media object from `includes.media`
#[derive(Debug, Deserialize)]
struct PrimaryMedia {
    media_key: String,
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
    preview_image_url: Option<String>,
    variants: Option<Value>,
}

/// Normalizes a primary provider timeline payload
///
/// Each post and each media object is decoded independently, so one malformed
/// entry only drops itself. Unresolvable media keys are skipped and posts left
/// without media are dropped.
pub fn normalize_primary(raw: &Value, username: &str) -> FetchResult {
    let lookup = media_lookup(raw);

    let posts: Vec<MediaPost> = raw
        .get("data")
        .and_then(Value::as_array)
        .map(|entries| entries.as_slice())
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| serde_json::from_value::<PrimaryPost>(entry.clone()).ok())
        .filter_map(|post| {
            let media = post
                .attachments
                .unwrap_or_default()
                .media_keys
                .iter()
                .filter_map(|key| lookup.get(key.as_str()).cloned())
                .collect();
            MediaPost::new(post.id, post.text, post.created_at, username, media)
        })
        .collect();

    debug!(username, posts = posts.len(), "normalized primary payload");
    FetchResult::new(posts)
}

/// Builds the media key → item table from `includes.media`
fn media_lookup(raw: &Value) -> HashMap<String, MediaItem> {
    raw.get("includes")
        .and_then(|includes| includes.get("media"))
        .and_then(Value::as_array)
        .map(|entries| entries.as_slice())
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| serde_json::from_value::<PrimaryMedia>(entry.clone()).ok())
        .filter_map(|media| {
            let kind = MediaKind::parse(&media.kind)?;
            let item = MediaItem::new(
                media.media_key.clone(),
                kind,
                media.url,
                media.preview_image_url,
                media.variants,
            )?;
            Some((media.media_key, item))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> Value {
        json!({
            "data": [
                {
                    "id": "100",
                    "text": "with photo",
                    "created_at": "2024-07-15T10:00:00.000Z",
                    "attachments": { "media_keys": ["3_1"] }
                },
                {
                    "id": "101",
                    "text": "text only"
                },
                {
                    "id": "102",
                    "text": "video and a dangling key",
                    "attachments": { "media_keys": ["7_2", "missing"] }
                }
            ],
            "includes": {
                "media": [
                    { "media_key": "3_1", "type": "photo", "url": "https://pbs.example/1.jpg" },
                    {
                        "media_key": "7_2",
                        "type": "video",
                        "preview_image_url": "https://pbs.example/2.jpg",
                        "variants": [{ "bit_rate": 832000, "url": "https://video.example/2.mp4" }]
                    }
                ]
            }
        })
    }

    #[test]
    fn test_posts_without_media_are_dropped() {
        let result = normalize_primary(&sample_payload(), "alice");

        let ids: Vec<&str> = result.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["100", "102"]);
    }

    #[test]
    fn test_unresolvable_keys_are_skipped() {
        let result = normalize_primary(&sample_payload(), "alice");

        let post = &result.posts[1];
        assert_eq!(post.media().len(), 1);
        assert_eq!(post.media()[0].media_key, "7_2");
        assert_eq!(post.media()[0].kind, MediaKind::Video);
        assert!(post.media()[0].variants.is_some());
    }

    #[test]
    fn test_fields_are_carried_over() {
        let result = normalize_primary(&sample_payload(), "alice");

        let post = &result.posts[0];
        assert_eq!(post.text(), "with photo");
        assert_eq!(post.created_at(), Some("2024-07-15T10:00:00.000Z"));
        assert_eq!(post.author_username(), "alice");
        assert_eq!(post.media()[0].url.as_deref(), Some("https://pbs.example/1.jpg"));
    }

    #[test]
    fn test_media_without_any_url_is_excluded() {
        let payload = json!({
            "data": [{ "id": "1", "text": "t", "attachments": { "media_keys": ["k"] } }],
            "includes": { "media": [{ "media_key": "k", "type": "photo" }] }
        });

        assert!(normalize_primary(&payload, "alice").is_empty());
    }

    #[test]
    fn test_malformed_payloads_yield_empty_result() {
        assert!(normalize_primary(&json!(null), "alice").is_empty());
        assert!(normalize_primary(&json!([1, 2, 3]), "alice").is_empty());
        assert!(normalize_primary(&json!({ "data": "nope" }), "alice").is_empty());
        assert!(normalize_primary(&json!({ "data": [{ "text": "no id" }] }), "alice").is_empty());
    }

    #[test]
    fn test_one_bad_entry_does_not_poison_the_rest() {
        let payload = json!({
            "data": [
                { "id": 5, "text": "numeric id is rejected" },
                { "id": "6", "text": "ok", "attachments": { "media_keys": ["k"] } }
            ],
            "includes": {
                "media": [
                    { "type": "photo", "url": "https://pbs.example/nokey.jpg" },
                    {
                        "media_key": "k",
                        "type": "animated_gif",
                        "preview_image_url": "https://pbs.example/g.jpg"
                    }
                ]
            }
        });

        let result = normalize_primary(&payload, "alice");
        assert_eq!(result.len(), 1);
        assert_eq!(result.posts[0].media()[0].kind, MediaKind::AnimatedGif);
    }
}
