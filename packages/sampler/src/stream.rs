//! Stream URL validation for the YouTube monitor.
//!
//! Only URLs that point at a single playable YouTube video are accepted;
//! the extracted video id is what a frame grabber needs.

use std::sync::LazyLock;

use regex::Regex;

static YOUTUBE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^(?:https?://)?
        (?:(?:www|m|music)\.)?
        (?:
            youtu\.be/
          | youtube(?:-nocookie)?\.com/
            (?:embed/|v/|shorts/|live/|watch\?(?:[^\#]*&)?v=)
        )
        ([A-Za-z0-9_-]{11})
        (?:[?&\#/].*)?$",
    )
    .expect("valid regex")
});

/// A validated YouTube video URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamUrl {
    url: String,
    video_id: String,
}

/// Error returned for URLs that are not a playable YouTube video.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a playable YouTube URL: {url}")]
pub struct InvalidStreamUrl {
    /// The rejected input.
    pub url: String,
}

impl StreamUrl {
    /// Validates `input` and extracts the video id.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStreamUrl`] if `input` is not a recognised
    /// YouTube video URL.
    pub fn parse(input: &str) -> Result<Self, InvalidStreamUrl> {
        let url = input.trim();
        YOUTUBE_RE
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|id| Self {
                url: url.to_string(),
                video_id: id.as_str().to_string(),
            })
            .ok_or_else(|| InvalidStreamUrl {
                url: input.to_string(),
            })
    }

    /// The URL as given (trimmed).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// The 11-character video id.
    #[must_use]
    pub fn video_id(&self) -> &str {
        &self.video_id
    }
}

impl std::fmt::Display for StreamUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}
