//! YouTube video id extraction from free text and URLs.

use regex::Regex;
use std::sync::LazyLock;

static VIDEO_URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // watch?v=, /embed/, /v/, /e/, channel-style paths and youtu.be short links
        r"(?:https?://)?(?:www\.|m\.)?(?:youtube\.com/(?:[^/\s]+/\S+/|(?:v|e(?:mbed)?)/|\S*?[?&]v=)|youtu\.be/)([a-zA-Z0-9_-]{11})",
        r"(?:https?://)?(?:www\.|m\.)?youtube\.com/shorts/([a-zA-Z0-9_-]{11})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid video url pattern"))
    .collect()
});

/// Id of the first YouTube video linked anywhere in `text`.
pub fn find_video_id(text: &str) -> Option<String> {
    VIDEO_URL_PATTERNS
        .iter()
        .filter_map(|re| re.captures(text))
        .filter_map(|caps| caps.get(1).map(|m| (m.start(), m.as_str().to_string())))
        .min_by_key(|(start, _)| *start)
        .map(|(_, id)| id)
}

/// Id of the video a URL points at, falling back to its `v` query parameter.
pub fn video_id_from_url(link: &str) -> Option<String> {
    if let Some(id) = find_video_id(link) {
        return Some(id);
    }
    let parsed = url::Url::parse(link).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
}
