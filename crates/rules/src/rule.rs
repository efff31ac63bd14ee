//! A single dispatch rule: glob pattern, target directory, and rank.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};

/// How patterns compare letters.
///
/// Follows the host filesystem by default: Windows and macOS volumes are
/// case-insensitive in their usual configuration, everything else is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseSensitivity {
    Sensitive,
    Insensitive,
}

impl CaseSensitivity {
    /// The convention of the filesystem this binary was built for.
    pub fn host() -> Self {
        if cfg!(any(windows, target_os = "macos")) {
            Self::Insensitive
        } else {
            Self::Sensitive
        }
    }
}

impl Default for CaseSensitivity {
    fn default() -> Self {
        Self::host()
    }
}

impl fmt::Display for CaseSensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensitive => f.write_str("case-sensitive"),
            Self::Insensitive => f.write_str("case-insensitive"),
        }
    }
}

/// An immutable (pattern, target) pair.
///
/// `rank` is the zero-based position of the record in the rules file.
/// Lower rank wins when several rules match the same name.
#[derive(Debug, Clone)]
pub struct Rule {
    rank: usize,
    matcher: GlobMatcher,
    target: PathBuf,
}

impl Rule {
    /// Compile `pattern` and bind it to `target`.
    ///
    /// `*` never crosses a path separator, so a pattern cannot reach into
    /// directory components even if it is handed a full path.
    pub fn new(
        rank: usize,
        pattern: &str,
        target: impl Into<PathBuf>,
        case: CaseSensitivity,
    ) -> Result<Self, globset::Error> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .case_insensitive(case == CaseSensitivity::Insensitive)
            .build()?;

        Ok(Self {
            rank,
            matcher: glob.compile_matcher(),
            target: target.into(),
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The pattern as written in the rules file.
    pub fn pattern(&self) -> &str {
        self.matcher.glob().glob()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Match against a bare file name (no directory component).
    pub fn is_match(&self, name: impl AsRef<Path>) -> bool {
        self.matcher.is_match(name)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} '{}' -> {}",
            self.rank,
            self.pattern(),
            self.target.display()
        )
    }
}
