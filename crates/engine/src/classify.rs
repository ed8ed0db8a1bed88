//! Classifier module for categorizing discovered files.
//!
//! Maps a path to video, audio or other by its extension, and decides whether
//! a media file shares its directory and stem with another media file, in which
//! case its output name needs an extension-derived suffix.

use crate::config::{normalize_extension, ExtensionsConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Category of a discovered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCategory {
    /// Encoded into an `.mp4` container.
    Video,
    /// Encoded into an `.m4a` container.
    Audio,
    /// Not encoded; optionally mirrored by the copy pass.
    Other,
}

impl MediaCategory {
    /// True for categories handled by the encoder.
    pub fn is_media(self) -> bool {
        !matches!(self, MediaCategory::Other)
    }

    /// Container extension produced for this category, if any.
    pub fn target_extension(self) -> Option<&'static str> {
        match self {
            MediaCategory::Video => Some("mp4"),
            MediaCategory::Audio => Some("m4a"),
            MediaCategory::Other => None,
        }
    }
}

impl std::fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaCategory::Video => write!(f, "video"),
            MediaCategory::Audio => write!(f, "audio"),
            MediaCategory::Other => write!(f, "other"),
        }
    }
}

/// Case-insensitive extension table with disjoint video and audio sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionTable {
    video: BTreeSet<String>,
    audio: BTreeSet<String>,
}

impl ExtensionTable {
    /// Build a table from extension lists (leading dots and case are ignored).
    ///
    /// An extension present in both lists is treated as video.
    pub fn new<V, A>(video: V, audio: A) -> Self
    where
        V: IntoIterator,
        V::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        let video: BTreeSet<String> = video
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        let audio = audio
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .filter(|e| !e.is_empty() && !video.contains(e))
            .collect();
        Self { video, audio }
    }

    pub fn from_config(cfg: &ExtensionsConfig) -> Self {
        Self::new(&cfg.video, &cfg.audio)
    }

    /// Category for a bare extension (no dot, any case).
    pub fn category_of(&self, ext: &str) -> MediaCategory {
        let ext = normalize_extension(ext);
        if self.video.contains(&ext) {
            MediaCategory::Video
        } else if self.audio.contains(&ext) {
            MediaCategory::Audio
        } else {
            MediaCategory::Other
        }
    }

    /// Classify a path by its extension.
    pub fn classify(&self, path: &Path) -> MediaCategory {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.category_of(ext))
            .unwrap_or(MediaCategory::Other)
    }

    /// True if `path` is in the combined video and audio set.
    pub fn is_media(&self, path: &Path) -> bool {
        self.classify(path).is_media()
    }

    /// Whether `path` needs a disambiguation suffix.
    ///
    /// True when more than one media file among `path` and `siblings` has the
    /// same parent directory and the same stem (compared case-insensitively).
    /// Only the static listing is consulted, so the answer does not depend on
    /// processing order.
    pub fn has_extension_collision<P: AsRef<Path>>(&self, path: &Path, siblings: &[P]) -> bool {
        if !self.is_media(path) {
            return false;
        }
        let Some(key) = stem_key(path) else {
            return false;
        };

        let mut media_with_stem = 1usize;
        for sibling in siblings {
            let sibling = sibling.as_ref();
            if sibling == path || sibling.parent() != path.parent() {
                continue;
            }
            if self.is_media(sibling) && stem_key(sibling).as_deref() == Some(key.as_str()) {
                media_with_stem += 1;
            }
        }
        media_with_stem > 1
    }
}

impl Default for ExtensionTable {
    fn default() -> Self {
        Self::from_config(&ExtensionsConfig::default())
    }
}

/// Lowercased file stem used to group same-named files.
fn stem_key(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase())
}
