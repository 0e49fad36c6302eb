use std::fmt;
use std::path::{Path, PathBuf};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{DavError, Result};

/// Characters escaped in a path segment when building an href.
/// Only the unreserved set and the sub-delims allowed in a segment stay raw.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// A normalized resource path: absolute, decoded, `/` separated,
/// without empty, `.` or `..` segments and without trailing slash
/// (the root is `/`).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct DavPath(String);

impl DavPath {
    pub fn root() -> Self {
        Self("/".into())
    }

    /// Build a path from the path component of a request URI.
    /// Segments are percent-decoded one by one, so an encoded `/` can not
    /// smuggle an extra level. `..` above the root is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.split(['?', '#']).next().unwrap_or_default();
        if !raw.starts_with('/') {
            return Err(DavError::BadRequest(format!("not an absolute path: {}", raw)));
        }

        let mut segments: Vec<String> = Vec::new();
        for segment in raw.split('/') {
            let decoded = percent_decode_str(segment)
                .decode_utf8()
                .map_err(|_| DavError::BadRequest(format!("non UTF-8 path: {}", raw)))?;
            if decoded.contains('/') || decoded.contains('\0') {
                return Err(DavError::BadRequest(format!("invalid segment in {}", raw)));
            }
            match decoded.as_ref() {
                "" | "." => continue,
                ".." => {
                    if segments.pop().is_none() {
                        return Err(DavError::Forbidden(format!("{} escapes the root", raw)));
                    }
                }
                _ => segments.push(decoded.into_owned()),
            }
        }

        Ok(Self::from_segments(segments.iter().map(String::as_str)))
    }

    fn from_segments<'a>(segments: impl Iterator<Item = &'a str>) -> Self {
        let mut inner = String::new();
        for segment in segments {
            inner.push('/');
            inner.push_str(segment);
        }
        if inner.is_empty() {
            inner.push('/');
        }
        Self(inner)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last segment, empty for the root
    pub fn name(&self) -> &str {
        self.segments().last().unwrap_or_default()
    }

    pub fn parent(&self) -> Option<DavPath> {
        if self.is_root() {
            return None;
        }
        let count = self.segments().count();
        Some(Self::from_segments(self.segments().take(count - 1)))
    }

    /// Every ancestor, from the root down to the direct parent
    pub fn ancestors(&self) -> Vec<DavPath> {
        let mut acc = Vec::new();
        let mut cursor = self.parent();
        while let Some(p) = cursor {
            cursor = p.parent();
            acc.push(p);
        }
        acc.reverse();
        acc
    }

    pub fn join(&self, name: &str) -> DavPath {
        Self::from_segments(self.segments().chain(std::iter::once(name)))
    }

    /// Strictly above `other` in the tree
    pub fn is_ancestor_of(&self, other: &DavPath) -> bool {
        if self.is_root() {
            return !other.is_root();
        }
        other
            .0
            .strip_prefix(self.0.as_str())
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
    }

    /// `self` or one of its descendants
    pub fn contains(&self, other: &DavPath) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    /// Move `self` from under `from` to under `to`
    pub fn rebase(&self, from: &DavPath, to: &DavPath) -> Option<DavPath> {
        if !from.contains(self) {
            return None;
        }
        let skip = from.segments().count();
        Some(Self::from_segments(
            to.segments().chain(self.segments().skip(skip)),
        ))
    }

    /// Percent-encoded absolute href, collections end with a slash
    pub fn href(&self, is_collection: bool) -> String {
        let mut href = String::new();
        for segment in self.segments() {
            href.push('/');
            href.extend(utf8_percent_encode(segment, SEGMENT));
        }
        if href.is_empty() || is_collection {
            href.push('/');
        }
        href
    }

    /// Location of the resource below a local directory
    pub fn to_fs(&self, root: &Path) -> PathBuf {
        let mut target = root.to_path_buf();
        for segment in self.segments() {
            target.push(segment);
        }
        target
    }
}

impl fmt::Display for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization() {
        assert_eq!(DavPath::parse("/").unwrap(), DavPath::root());
        assert_eq!(DavPath::parse("//a/./b/").unwrap().as_str(), "/a/b");
        assert_eq!(DavPath::parse("/a/b/../c").unwrap().as_str(), "/a/c");
        assert_eq!(DavPath::parse("/a/..").unwrap(), DavPath::root());
        assert_eq!(DavPath::parse("/a%20b/%C3%A9t%C3%A9?x=1").unwrap().as_str(), "/a b/été");
    }

    #[test]
    fn escaping_the_root_is_forbidden() {
        assert!(matches!(DavPath::parse("/.."), Err(DavError::Forbidden(_))));
        assert!(matches!(DavPath::parse("/a/../../etc/passwd"), Err(DavError::Forbidden(_))));
        assert!(matches!(DavPath::parse("/%2e%2e/x"), Err(DavError::Forbidden(_))));
    }

    #[test]
    fn smuggled_separators_are_rejected() {
        assert!(matches!(DavPath::parse("/a%2Fb"), Err(DavError::BadRequest(_))));
        assert!(matches!(DavPath::parse("/a%00"), Err(DavError::BadRequest(_))));
        assert!(matches!(DavPath::parse("relative"), Err(DavError::BadRequest(_))));
    }

    #[test]
    fn tree_relations() {
        let a = DavPath::parse("/a").unwrap();
        let ab = DavPath::parse("/a/b").unwrap();
        let abc = DavPath::parse("/a/b/c").unwrap();
        let ax = DavPath::parse("/ax").unwrap();

        assert!(a.is_ancestor_of(&abc));
        assert!(!a.is_ancestor_of(&ax));
        assert!(!a.is_ancestor_of(&a));
        assert!(a.contains(&a));
        assert!(DavPath::root().is_ancestor_of(&a));
        assert_eq!(abc.parent(), Some(ab.clone()));
        assert_eq!(a.parent(), Some(DavPath::root()));
        assert_eq!(DavPath::root().parent(), None);
        assert_eq!(abc.ancestors(), vec![DavPath::root(), a.clone(), ab.clone()]);
        assert_eq!(abc.name(), "c");
        assert_eq!(a.join("b"), ab);

        let z = DavPath::parse("/z").unwrap();
        assert_eq!(abc.rebase(&a, &z).unwrap().as_str(), "/z/b/c");
        assert_eq!(a.rebase(&a, &z), Some(z.clone()));
        assert_eq!(ax.rebase(&a, &z), None);
    }

    #[test]
    fn hrefs() {
        assert_eq!(DavPath::root().href(true), "/");
        assert_eq!(DavPath::root().href(false), "/");
        let p = DavPath::parse("/my docs/r%C3%A9sum%C3%A9.txt").unwrap();
        assert_eq!(p.href(false), "/my%20docs/r%C3%A9sum%C3%A9.txt");
        assert_eq!(DavPath::parse("/dir").unwrap().href(true), "/dir/");
        assert_eq!(DavPath::parse("/100%25").unwrap().href(false), "/100%25");
    }
}
