//! Path comparison under an explicit separator policy.
//!
//! Paths are opaque, case-sensitive strings. The collaborators that report
//! them may use either separator style, so every comparison goes through a
//! [`PathPolicy`] that is chosen once and injected into the components that
//! need it.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Which separator convention paths follow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparatorStyle {
    /// `/` only.
    Unix,

    /// `\` canonical, `/` accepted.
    Windows,

    /// Whatever the host platform uses.
    #[default]
    Native,
}

/// Separator normalization and ancestry rules for paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathPolicy {
    canonical: char,
    alternate: Option<char>,
}

impl PathPolicy {
    /// Forward slashes only.
    pub const fn unix() -> Self {
        Self {
            canonical: '/',
            alternate: None,
        }
    }

    /// Backslashes, with forward slashes accepted and rewritten.
    pub const fn windows() -> Self {
        Self {
            canonical: '\\',
            alternate: Some('/'),
        }
    }

    /// The policy for the host platform.
    pub fn native() -> Self {
        if cfg!(windows) {
            Self::windows()
        } else {
            Self::unix()
        }
    }

    /// Resolve a configured style to a policy.
    pub fn from_style(style: SeparatorStyle) -> Self {
        match style {
            SeparatorStyle::Unix => Self::unix(),
            SeparatorStyle::Windows => Self::windows(),
            SeparatorStyle::Native => Self::native(),
        }
    }

    /// The canonical separator.
    pub fn separator(&self) -> char {
        self.canonical
    }

    fn is_separator(&self, c: char) -> bool {
        c == self.canonical || Some(c) == self.alternate
    }

    /// Rewrite `path` into canonical form.
    ///
    /// Accepted separators become the canonical one, runs of separators
    /// collapse to one and trailing separators are dropped unless that would
    /// strip a filesystem root (`/`, `C:\`). A leading double separator is
    /// kept under the Windows policy so UNC paths survive.
    pub fn normalize(&self, path: &str) -> String {
        let mut out = String::with_capacity(path.len());
        let mut prev_sep = false;

        for (i, c) in path.chars().enumerate() {
            if self.is_separator(c) {
                let keep_unc = i == 1 && self.alternate.is_some();
                if prev_sep && !keep_unc {
                    continue;
                }
                out.push(self.canonical);
                prev_sep = true;
            } else {
                out.push(c);
                prev_sep = false;
            }
        }

        while out.ends_with(self.canonical) {
            let trimmed = &out[..out.len() - self.canonical.len_utf8()];
            if trimmed.is_empty() || trimmed.ends_with(':') || trimmed.ends_with(self.canonical) {
                break;
            }
            out.pop();
        }

        out
    }

    fn segments<'a>(&self, normalized: &'a str) -> Vec<&'a str> {
        normalized
            .split(self.canonical)
            .filter(|segment| !segment.is_empty())
            .collect()
    }

    /// True if `a == b` or `b` lies strictly beneath `a`.
    ///
    /// Comparison is by whole segments, so `/foo` is not an ancestor of
    /// `/foobar`.
    pub fn is_ancestor_or_self(&self, a: &str, b: &str) -> bool {
        let a = self.normalize(a);
        let b = self.normalize(b);
        if a == b {
            return true;
        }

        if a.starts_with(self.canonical) != b.starts_with(self.canonical) {
            return false;
        }

        let a_segments = self.segments(&a);
        let b_segments = self.segments(&b);
        a_segments.len() < b_segments.len() && b_segments.starts_with(&a_segments)
    }

    /// True if either path contains the other.
    pub fn overlaps(&self, a: &str, b: &str) -> bool {
        self.is_ancestor_or_self(a, b) || self.is_ancestor_or_self(b, a)
    }

    /// True if `candidate` equals, contains, or lies within any of `existing`.
    pub fn conflicts_with_any<'a, I>(&self, candidate: &str, existing: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.find_conflict(candidate, existing).is_some()
    }

    /// The first entry of `existing` that overlaps `candidate`.
    pub fn find_conflict<'a, I>(&self, candidate: &str, existing: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        existing
            .into_iter()
            .find(|path| self.overlaps(candidate, path))
    }

    /// Append a single entry name to a directory path.
    pub fn join(&self, parent: &str, name: &str) -> String {
        if parent.ends_with(self.canonical) {
            format!("{parent}{name}")
        } else {
            format!("{parent}{}{name}", self.canonical)
        }
    }

    /// The last segment of `path`, or the path itself for a bare root.
    pub fn basename<'a>(&self, path: &'a str) -> &'a str {
        path.rsplit(|c| self.is_separator(c))
            .find(|segment| !segment.is_empty())
            .unwrap_or(path)
    }
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self::native()
    }
}

/// An insertion-ordered set of normalized paths.
#[derive(Debug, Clone)]
pub struct PathSet {
    policy: PathPolicy,
    paths: IndexSet<String>,
}

impl PathSet {
    /// Create an empty set under `policy`.
    pub fn new(policy: PathPolicy) -> Self {
        Self {
            policy,
            paths: IndexSet::new(),
        }
    }

    /// Insert a path, returning false if it was already present.
    pub fn insert(&mut self, path: &str) -> bool {
        self.paths.insert(self.policy.normalize(path))
    }

    /// Remove a path, returning true if it was present.
    pub fn remove(&mut self, path: &str) -> bool {
        self.paths.shift_remove(&self.policy.normalize(path))
    }

    /// Whether the exact path is a member.
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(&self.policy.normalize(path))
    }

    /// Whether any member overlaps `candidate`.
    pub fn conflicts_with(&self, candidate: &str) -> bool {
        self.policy.conflicts_with_any(candidate, self.iter())
    }

    /// The first member overlapping `candidate`.
    pub fn find_conflict(&self, candidate: &str) -> Option<&str> {
        self.policy.find_conflict(candidate, self.iter())
    }

    /// Remove `root` and every member beneath it; returns what was removed.
    pub fn remove_within(&mut self, root: &str) -> Vec<String> {
        let policy = self.policy;
        let mut removed = Vec::new();
        self.paths.retain(|path| {
            if policy.is_ancestor_or_self(root, path) {
                removed.push(path.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Keep only members matching `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.paths.retain(|path| keep(path));
    }

    /// Drop every member.
    pub fn clear(&mut self) {
        self.paths.clear();
    }

    /// Iterate members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Members as an owned list.
    pub fn to_vec(&self) -> Vec<String> {
        self.paths.iter().cloned().collect()
    }
}
