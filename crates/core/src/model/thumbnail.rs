use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ThumbnailError {
    #[error("thumbnail reference cannot be empty")]
    Empty,
}

/// Where a course's cover image lives.
///
/// Absolute URLs are kept as `Url`; anything else is treated as a path
/// relative to the asset root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thumbnail {
    Url(Url),
    Path(PathBuf),
}

impl Thumbnail {
    /// Parses a stored thumbnail reference.
    ///
    /// # Errors
    ///
    /// Returns `ThumbnailError::Empty` for blank input.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, ThumbnailError> {
        let s = raw.as_ref().trim();
        if s.is_empty() {
            return Err(ThumbnailError::Empty);
        }
        match Url::parse(s) {
            Ok(url) => Ok(Self::Url(url)),
            Err(_) => Ok(Self::Path(PathBuf::from(s))),
        }
    }

    #[must_use]
    pub fn as_url(&self) -> Option<&Url> {
        match self {
            Self::Url(u) => Some(u),
            Self::Path(_) => None,
        }
    }

    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p.as_path()),
            Self::Url(_) => None,
        }
    }
}

impl fmt::Display for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(u) => write!(f, "{u}"),
            Self::Path(p) => write!(f, "{}", p.display()),
        }
    }
}
