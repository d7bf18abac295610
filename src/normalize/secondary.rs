//! Secondary provider payload normalization
//!
//! The secondary API is inconsistent: the same logical timeline has been seen
//! under several envelopes, and media inside a post under several layouts.
//! Both levels are handled by ordered tables of shape detectors. The first
//! envelope that holds an array wins; the first media layout that yields at
//! least one usable item wins.

use serde_json::Value;
use tracing::debug;

use super::{first_str_field, str_field};
use crate::data::{FetchResult, MediaItem, MediaKind, MediaPost};

/// Locates the post array inside a payload
type EnvelopeDetector = fn(&Value) -> Option<&Vec<Value>>;

/// Extracts media from one post item; `None` means the layout does not apply
type MediaExtractor = fn(&Value, &str) -> Option<Vec<MediaItem>>;

/// Envelope shapes in priority order
const ENVELOPES: &[(&str, EnvelopeDetector)] = &[
    ("timeline", timeline_field),
    ("bare_array", bare_array),
    ("data", data_field),
    ("tweets", tweets_field),
];

/// Media layouts in priority order
const MEDIA_SHAPES: &[(&str, MediaExtractor)] = &[
    ("grouped_object", extract_grouped),
    ("flat_array", extract_flat),
    ("photo_urls", extract_photo_urls),
    ("video_entries", extract_video_entries),
];

/// Normalizes a secondary provider media payload
///
/// The post list is located by the first matching entry in `ENVELOPES`, and
/// each item's media by the first entry in `MEDIA_SHAPES` yielding anything.
///
/// # Arguments
/// * `raw` - The decoded response body
/// * `username` - Stored as the author of every post
///
/// # Returns
/// The normalized posts; empty if no envelope matches
pub fn normalize_secondary(raw: &Value, username: &str) -> FetchResult {
    let Some((envelope, items)) = ENVELOPES
        .iter()
        .find_map(|(name, detect)| detect(raw).map(|items| (*name, items)))
    else {
        debug!(username, "secondary payload has no recognizable post list");
        return FetchResult::empty();
    };

    let posts: Vec<MediaPost> = items
        .iter()
        .filter_map(|item| normalize_item(item, username))
        .collect();

    debug!(username, envelope, posts = posts.len(), "normalized secondary payload");
    FetchResult::new(posts)
}

fn timeline_field(raw: &Value) -> Option<&Vec<Value>> {
    raw.get("timeline")?.as_array()
}

fn bare_array(raw: &Value) -> Option<&Vec<Value>> {
    raw.as_array()
}

fn data_field(raw: &Value) -> Option<&Vec<Value>> {
    raw.get("data")?.as_array()
}

fn tweets_field(raw: &Value) -> Option<&Vec<Value>> {
    raw.get("tweets")?.as_array()
}

/// Normalizes one post item, dropping it if it has no id or no usable media
fn normalize_item(item: &Value, username: &str) -> Option<MediaPost> {
    let post_id = first_str_field(item, &["tweet_id", "id_str", "id"])?;
    let text = first_str_field(item, &["text", "full_text"]).unwrap_or_default();
    let created_at = str_field(item, "created_at");

    let media = MEDIA_SHAPES
        .iter()
        .filter_map(|(_, extract)| extract(item, &post_id))
        .find(|media| !media.is_empty())?;

    MediaPost::new(post_id, text, created_at, username, media)
}

/// Synthesized key for media the provider did not key itself
fn synthesize_key(kind: MediaKind, post_id: &str, index: usize) -> String {
    format!("{}_{}_{}", kind, post_id, index)
}

/// Builds an item from a provider media object
fn item_from_object(
    entry: &Value,
    kind: MediaKind,
    post_id: &str,
    index: usize,
) -> Option<MediaItem> {
    let media_key = first_str_field(entry, &["media_key", "id_str", "id"])
        .unwrap_or_else(|| synthesize_key(kind, post_id, index));

    let preview_url = first_str_field(
        entry,
        &["preview_image_url", "thumbnail", "thumbnail_url", "media_url_https", "media_url"],
    );
    let url = match kind {
        MediaKind::Photo => first_str_field(entry, &["url", "media_url_https", "media_url"]),
        MediaKind::Video | MediaKind::AnimatedGif => first_str_field(entry, &["url", "video_url"]),
    };
    let variants = entry.get("variants").cloned();

    MediaItem::new(media_key, kind, url, preview_url, variants)
}

/// Layout (a): `media: { photo: [..], video: [..], animated_gif: [..] }`
fn extract_grouped(item: &Value, post_id: &str) -> Option<Vec<MediaItem>> {
    let media = item.get("media")?.as_object()?;

    let groups = [
        ("video", MediaKind::Video),
        ("photo", MediaKind::Photo),
        ("animated_gif", MediaKind::AnimatedGif),
    ];

    let mut index = 0;
    let mut items = Vec::new();
    for (field, kind) in groups {
        let Some(entries) = media.get(field).and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            if let Some(media_item) = item_from_object(entry, kind, post_id, index) {
                items.push(media_item);
            }
            index += 1;
        }
    }
    Some(items)
}

/// Layout (b): `media: [ { type: "photo", .. }, { type: "video", .. } ]`
fn extract_flat(item: &Value, post_id: &str) -> Option<Vec<MediaItem>> {
    let entries = item.get("media")?.as_array()?;

    Some(
        entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let kind = MediaKind::parse(entry.get("type")?.as_str()?)?;
                item_from_object(entry, kind, post_id, index)
            })
            .collect(),
    )
}

/// Layout (c): `photos: [ "https://..", .. ]`
fn extract_photo_urls(item: &Value, post_id: &str) -> Option<Vec<MediaItem>> {
    let entries = item.get("photos")?.as_array()?;

    Some(
        entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let url = entry.as_str()?.to_string();
                MediaItem::new(
                    synthesize_key(MediaKind::Photo, post_id, index),
                    MediaKind::Photo,
                    Some(url),
                    None,
                    None,
                )
            })
            .collect(),
    )
}

/// Layout (d): `videos: [ "https://..", { url, thumbnail, variants }, .. ]`
fn extract_video_entries(item: &Value, post_id: &str) -> Option<Vec<MediaItem>> {
    let entries = item.get("videos")?.as_array()?;

    Some(
        entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match entry {
                Value::String(url) => MediaItem::new(
                    synthesize_key(MediaKind::Video, post_id, index),
                    MediaKind::Video,
                    Some(url.clone()),
                    None,
                    None,
                ),
                Value::Object(_) => item_from_object(entry, MediaKind::Video, post_id, index),
                _ => None,
            })
            .collect(),
    )
}
