use std::sync::Arc;

use crate::error::ProgrammerError;

/// How a path's root is anchored (spec §4.C).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PathRoot {
    /// Leading `*`: observe only the receiver's own child path.
    Chained,
    /// Leading `.` or `this.`, or no prefix at all: rooted at `this`.
    ThisRelative,
    /// First segment names a global; deferred to the queue until it
    /// resolves.
    Global,
}

/// A parsed dotted observation path, e.g. `a.b.c`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Path {
    pub root: PathRoot,
    pub segments: Vec<Arc<str>>,
}

impl Path {
    pub fn parse(raw: &str) -> Result<Path, ProgrammerError> {
        if raw.is_empty() {
            return Err(ProgrammerError::MalformedPath { path: raw.to_string() });
        }

        let (root, rest) = if let Some(rest) = raw.strip_prefix('*') {
            (PathRoot::Chained, rest)
        } else if let Some(rest) = raw.strip_prefix("this.") {
            (PathRoot::ThisRelative, rest)
        } else if let Some(rest) = raw.strip_prefix('.') {
            (PathRoot::ThisRelative, rest)
        } else {
            (PathRoot::Global, raw)
        };

        let segments: Vec<Arc<str>> = rest.split('.').filter(|s| !s.is_empty()).map(Arc::from).collect();
        if segments.is_empty() {
            return Err(ProgrammerError::MalformedPath { path: raw.to_string() });
        }

        // A single-segment path with no explicit prefix is conventionally
        // "this"-relative (a plain key), not a deferred global lookup.
        let root = if root == PathRoot::Global && segments.len() == 1 {
            PathRoot::ThisRelative
        } else {
            root
        };

        Ok(Path { root, segments })
    }

    pub fn is_plain_key(&self) -> bool {
        self.segments.len() == 1 && self.root != PathRoot::Chained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_this_relative() {
        let p = Path::parse("a.b.c").unwrap();
        assert_eq!(p.root, PathRoot::ThisRelative);
        assert_eq!(p.segments.len(), 3);
    }

    #[test]
    fn parses_chained() {
        let p = Path::parse("*a.b").unwrap();
        assert_eq!(p.root, PathRoot::Chained);
        assert_eq!(&*p.segments[0], "a");
    }

    #[test]
    fn parses_explicit_this_prefix() {
        let p = Path::parse("this.a.b").unwrap();
        assert_eq!(p.root, PathRoot::ThisRelative);
        assert_eq!(p.segments.len(), 2);
    }

    #[test]
    fn single_segment_is_plain_key() {
        let p = Path::parse("name").unwrap();
        assert!(p.is_plain_key());
    }

    #[test]
    fn global_root_for_multi_segment_bare_path() {
        let p = Path::parse("App.session.user").unwrap();
        assert_eq!(p.root, PathRoot::Global);
    }

    #[test]
    fn empty_path_is_malformed() {
        assert!(Path::parse("").is_err());
        assert!(Path::parse("*").is_err());
    }
}
