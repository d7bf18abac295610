//! Core data models for mediafeed
//!
//! This module contains the canonical types every provider payload is normalized
//! into: posts that carry at least one piece of displayable media.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of media attached to a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
}

impl MediaKind {
    /// Parses a provider media type string
    ///
    /// Matching is case-insensitive; `gif` is accepted as an alias for `animated_gif`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "photo" | "image" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            "animated_gif" | "gif" => Some(MediaKind::AnimatedGif),
            _ => None,
        }
    }

    /// Returns the canonical wire name for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::AnimatedGif => "animated_gif",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One piece of media attached to a post
///
/// An item always has at least one of `url` or `preview_url`; `MediaItem::new`
/// refuses to build anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Provider-assigned or synthesized key, unique within a post
    pub media_key: String,
    /// Media type
    pub kind: MediaKind,
    /// Direct media URL
    pub url: Option<String>,
    /// Thumbnail or poster frame URL
    pub preview_url: Option<String>,
    /// Provider-specific bitrate/format variants, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<serde_json::Value>,
}

impl MediaItem {
    /// Builds a media item, returning `None` when neither URL is usable
    ///
    /// Blank strings count as missing.
    pub fn new(
        media_key: impl Into<String>,
        kind: MediaKind,
        url: Option<String>,
        preview_url: Option<String>,
        variants: Option<serde_json::Value>,
    ) -> Option<Self> {
        let url = url.filter(|u| !u.trim().is_empty());
        let preview_url = preview_url.filter(|u| !u.trim().is_empty());
        if url.is_none() && preview_url.is_none() {
            return None;
        }

        let variants = variants.filter(|v| !v.is_null());

        Some(Self {
            media_key: media_key.into(),
            kind,
            url,
            preview_url,
            variants,
        })
    }

    /// Returns the best URL to display: the media URL, else the preview
    pub fn display_url(&self) -> Option<&str> {
        self.url.as_deref().or(self.preview_url.as_deref())
    }
}

/// A social post with at least one attached media item
///
/// Note: This struct only implements `Serialize` (not `Deserialize`) so that
/// every instance goes through `MediaPost::new` and keeps its media non-empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaPost {
    id: String,
    text: String,
    created_at: Option<String>,
    author_username: String,
    media: Vec<MediaItem>,
}

impl MediaPost {
    /// Builds a post, returning `None` if `media` is empty
    ///
    /// Media items sharing a `media_key` are collapsed; the first one wins.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        created_at: Option<String>,
        author_username: impl Into<String>,
        media: Vec<MediaItem>,
    ) -> Option<Self> {
        let mut seen = HashSet::new();
        let media: Vec<MediaItem> = media
            .into_iter()
            .filter(|item| seen.insert(item.media_key.clone()))
            .collect();

        if media.is_empty() {
            return None;
        }

        Some(Self {
            id: id.into(),
            text: text.into(),
            created_at,
            author_username: author_username.into(),
            media,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    pub fn author_username(&self) -> &str {
        &self.author_username
    }

    /// Attached media, never empty
    pub fn media(&self) -> &[MediaItem] {
        &self.media
    }
}

/// Normalized result of one upstream fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchResult {
    pub posts: Vec<MediaPost>,
}

impl FetchResult {
    /// Builds a result, keeping only the first post for each id
    pub fn new(posts: Vec<MediaPost>) -> Self {
        let mut seen = HashSet::new();
        let posts = posts
            .into_iter()
            .filter(|post| seen.insert(post.id.clone()))
            .collect();
        Self { posts }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    /// Total number of media items across all posts
    pub fn media_count(&self) -> usize {
        self.posts.iter().map(|p| p.media().len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaPost> {
        self.posts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(key: &str) -> MediaItem {
        MediaItem::new(
            key,
            MediaKind::Photo,
            Some(format!("https://img.example/{}.jpg", key)),
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_media_kind_parse() {
        assert_eq!(MediaKind::parse("photo"), Some(MediaKind::Photo));
        assert_eq!(MediaKind::parse("VIDEO"), Some(MediaKind::Video));
        assert_eq!(MediaKind::parse("animated_gif"), Some(MediaKind::AnimatedGif));
        assert_eq!(MediaKind::parse("gif"), Some(MediaKind::AnimatedGif));
        assert_eq!(MediaKind::parse("audio"), None);
    }

    #[test]
    fn test_media_kind_serializes_snake_case() {
        let json = serde_json::to_string(&MediaKind::AnimatedGif).unwrap();
        assert_eq!(json, "\"animated_gif\"");
    }

    #[test]
    fn test_media_item_requires_some_url() {
        assert!(MediaItem::new("k", MediaKind::Photo, None, None, None).is_none());
        assert!(MediaItem::new(
            "k",
            MediaKind::Photo,
            Some("  ".to_string()),
            Some(String::new()),
            None
        )
        .is_none());
    }

    #[test]
    fn test_media_item_preview_only_is_usable() {
        let item = MediaItem::new(
            "v1",
            MediaKind::Video,
            None,
            Some("https://img.example/poster.jpg".to_string()),
            Some(serde_json::json!([{"bit_rate": 832000}])),
        )
        .expect("preview url is enough");

        assert_eq!(item.display_url(), Some("https://img.example/poster.jpg"));
        assert!(item.variants.is_some());
    }

    #[test]
    fn test_media_item_null_variants_dropped() {
        let item = MediaItem::new(
            "k",
            MediaKind::Photo,
            Some("https://img.example/a.jpg".to_string()),
            None,
            Some(serde_json::Value::Null),
        )
        .unwrap();
        assert!(item.variants.is_none());
    }

    #[test]
    fn test_media_post_rejects_empty_media() {
        assert!(MediaPost::new("1", "text", None, "alice", vec![]).is_none());
    }

    #[test]
    fn test_media_post_collapses_duplicate_keys() {
        let media = vec![photo("a"), photo("a"), photo("b")];
        let post = MediaPost::new("1", "text", None, "alice", media).unwrap();
        let keys: Vec<&str> = post.media().iter().map(|m| m.media_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_fetch_result_counts() {
        let result = FetchResult::new(vec![
            MediaPost::new("1", "one", None, "alice", vec![photo("a"), photo("b")]).unwrap(),
            MediaPost::new("2", "two", None, "alice", vec![photo("c")]).unwrap(),
        ]);

        assert_eq!(result.len(), 2);
        assert_eq!(result.media_count(), 3);
        assert!(!result.is_empty());
        assert!(FetchResult::empty().is_empty());
    }

    #[test]
    fn test_fetch_result_keeps_first_post_per_id() {
        let result = FetchResult::new(vec![
            MediaPost::new("1", "first", None, "alice", vec![photo("a")]).unwrap(),
            MediaPost::new("2", "two", None, "alice", vec![photo("b")]).unwrap(),
            MediaPost::new("1", "repeat", None, "alice", vec![photo("c")]).unwrap(),
        ]);

        let ids: Vec<&str> = result.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(result.posts[0].text(), "first");
    }
}
