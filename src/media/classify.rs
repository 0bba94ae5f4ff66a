use std::path::Path;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "svg", "webp", "ico",
];

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "mpeg", "mpg", "3gp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

/// Classifies a filename by extension alone. No content sniffing; a file with
/// no extension is `Other`.
pub fn classify(filename: &str) -> MediaKind {
    let Some(ext) = Path::new(filename).extension().and_then(|e| e.to_str()) else {
        return MediaKind::Other;
    };
    let ext = ext.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Image
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Video
    } else {
        MediaKind::Other
    }
}

pub fn is_image(filename: &str) -> bool {
    classify(filename) == MediaKind::Image
}

pub fn is_video(filename: &str) -> bool {
    classify(filename) == MediaKind::Video
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_extension_classifies() {
        for ext in IMAGE_EXTENSIONS {
            assert_eq!(classify(&format!("photo.{ext}")), MediaKind::Image, "{ext}");
        }
        for ext in VIDEO_EXTENSIONS {
            assert_eq!(classify(&format!("clip.{ext}")), MediaKind::Video, "{ext}");
        }
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(classify("A.JPG"), classify("a.jpg"));
        assert_eq!(classify("MOVIE.Mp4"), MediaKind::Video);
        assert!(is_image("A.JPG"));
        assert!(is_video("b.mkv"));
        assert!(!is_video("b.jpg"));
    }

    #[test]
    fn unknown_and_missing_extensions_are_other() {
        assert_eq!(classify("notes.txt"), MediaKind::Other);
        assert_eq!(classify("Makefile"), MediaKind::Other);
        assert_eq!(classify(".mp4"), MediaKind::Other);
        assert_eq!(classify("archive.tar.gz"), MediaKind::Other);
    }
}
