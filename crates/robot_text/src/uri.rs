use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

/// A normalized document URI.
///
/// Two URIs denoting the same filesystem path compare equal after
/// normalization: the Windows drive letter is lowercased and the path is
/// percent-decoded before re-encoding. The original string as the client sent
/// it is kept for echoing back over the wire.
#[derive(Clone)]
pub struct DocumentUri {
    original: Url,
    normalized: Url,
}

impl DocumentUri {
    pub fn new(url: Url) -> Self {
        let normalized = normalize(&url);
        Self {
            original: url,
            normalized,
        }
    }

    pub fn parse(s: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(s)?))
    }

    pub fn from_file_path(path: impl AsRef<Path>) -> Option<Self> {
        Url::from_file_path(path.as_ref()).ok().map(Self::new)
    }

    /// The URI exactly as received.
    pub fn as_url(&self) -> &Url {
        &self.original
    }

    pub fn normalized(&self) -> &Url {
        &self.normalized
    }

    pub fn scheme(&self) -> &str {
        self.original.scheme()
    }

    pub fn to_file_path(&self) -> Option<PathBuf> {
        if self.normalized.scheme() != "file" {
            return None;
        }
        self.normalized.to_file_path().ok()
    }
}

fn normalize(url: &Url) -> Url {
    if url.scheme() != "file" {
        return url.clone();
    }
    let Ok(path) = url.to_file_path() else {
        return url.clone();
    };
    // to_file_path percent-decodes; from_file_path re-encodes canonically.
    let path = lowercase_drive(path);
    Url::from_file_path(&path).unwrap_or_else(|_| url.clone())
}

fn lowercase_drive(path: PathBuf) -> PathBuf {
    let s = path.to_string_lossy();
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(drive), Some(':')) if drive.is_ascii_uppercase() => {
            let mut out = String::with_capacity(s.len());
            out.push(drive.to_ascii_lowercase());
            out.push(':');
            out.extend(chars);
            PathBuf::from(out)
        }
        _ => path,
    }
}

impl PartialEq for DocumentUri {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for DocumentUri {}

impl std::hash::Hash for DocumentUri {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl fmt::Debug for DocumentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

impl fmt::Display for DocumentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_encoding_normalizes() {
        let a = DocumentUri::parse("file:///tmp/some%20dir/test.robot").unwrap();
        let b = DocumentUri::from_file_path("/tmp/some dir/test.robot").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn file_path_roundtrip() {
        let uri = DocumentUri::from_file_path("/tmp/suite/test.robot").unwrap();
        assert_eq!(uri.to_file_path().unwrap(), PathBuf::from("/tmp/suite/test.robot"));
    }

    #[test]
    fn non_file_scheme_passes_through() {
        let uri = DocumentUri::parse("untitled:Untitled-1").unwrap();
        assert_eq!(uri.scheme(), "untitled");
        assert!(uri.to_file_path().is_none());
    }

    #[test]
    fn original_string_is_preserved() {
        let raw = "file:///tmp/some%20dir/test.robot";
        let uri = DocumentUri::parse(raw).unwrap();
        assert_eq!(uri.as_url().as_str(), raw);
    }
}
