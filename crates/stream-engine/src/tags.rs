//! Tag metadata extraction.

use std::path::Path;

use lofty::{read_from_path, Accessor, ItemKey, TaggedFileExt};

/// Text tags captured at load time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub comment: Option<String>,
}

/// Source of text tags for a file.
pub trait TagReader: Send + Sync {
    /// Read tags from `path`. Missing or unreadable tags yield an empty [`TagInfo`].
    fn read(&self, path: &Path) -> TagInfo;
}

/// Tag reader backed by `lofty`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> TagInfo {
        let tagged = match read_from_path(path) {
            Ok(tagged) => tagged,
            Err(e) => {
                tracing::debug!(path = %path.display(), "no tags: {e}");
                return TagInfo::default();
            }
        };
        let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
            return TagInfo::default();
        };

        let artist = tag
            .artist()
            .map(|s| s.into_owned())
            .or_else(|| tag.get_string(&ItemKey::AlbumArtist).map(str::to_string));

        TagInfo {
            title: tag.title().map(|s| s.into_owned()),
            artist,
            album: tag.album().map(|s| s.into_owned()),
            comment: tag.comment().map(|s| s.into_owned()),
        }
    }
}

/// Tag reader that never finds anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTags;

impl TagReader for NoTags {
    fn read(&self, _path: &Path) -> TagInfo {
        TagInfo::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_file_yields_empty_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.flac");
        std::fs::write(&path, b"not really flac").unwrap();
        assert_eq!(LoftyTagReader.read(&path), TagInfo::default());
    }

    #[test]
    fn missing_file_yields_empty_tags() {
        assert_eq!(
            LoftyTagReader.read(Path::new("/nonexistent/track.mp3")),
            TagInfo::default()
        );
    }
}
