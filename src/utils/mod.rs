use std::path::Path;

pub trait PathExt {
    fn ext_lower(&self) -> String;
    fn stem_str(&self) -> &str;
}

impl PathExt for Path {
    fn ext_lower(&self) -> String {
        self.extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn stem_str(&self) -> &str {
        self.file_stem().and_then(|s| s.to_str()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn ext_lower_normalizes_case() {
        assert_eq!(Path::new("/a/IMG_0001.JPG").ext_lower(), "jpg");
        assert_eq!(Path::new("/a/photo.jpeg").ext_lower(), "jpeg");
        assert_eq!(Path::new("/a/no_extension").ext_lower(), "");
    }

    #[test]
    fn stem_str_drops_extension_only() {
        assert_eq!(Path::new("/a/IMG_0001.JPG").stem_str(), "IMG_0001");
        assert_eq!(Path::new("/a/archive.tar.gz").stem_str(), "archive.tar");
    }
}
