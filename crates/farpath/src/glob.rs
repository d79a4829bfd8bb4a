//! Recursive glob resolution over single-level listing primitives.
//!
//! Remote listing commands (FTP `NLST`, a scraped HTTP page) return only the
//! immediate children of one path and cannot evaluate a multi-segment
//! wildcard expression such as `a/*/b*.txt` in one call. The resolver walks
//! the pattern segment by segment, issuing one listing call per wildcard
//! segment and descending for free through literal segments.
//!
//! The same recursive shape, with different per-node actions, backs the FTP
//! subtree deletion and segmentwise directory creation in [`crate::ftp`].

use std::collections::HashSet;

use globset::{GlobBuilder, GlobMatcher};

use crate::error::Result;
use crate::pathstr;

/// Outcome of one single-level listing call.
#[derive(Debug, Clone)]
pub enum Listing {
    /// Entries found, as paths relative to the source root and extending the
    /// prefix they were listed under.
    Entries(Vec<String>),
    /// The backend reported "temporarily unable to list" (no such path).
    /// Interpreted as zero matches for the branch, never as an error.
    Unavailable,
}

/// Single-level listing capability consumed by the resolver.
///
/// `prefix` and probe paths are relative to the source root; an empty prefix
/// means an unscoped listing at the root itself.
pub trait ListingSource {
    fn list(&mut self, prefix: &str) -> Result<Listing>;
    fn probe(&mut self, path: &str) -> Result<bool>;
}

/// True if the segment contains a shell wildcard character.
pub fn has_magic(segment: &str) -> bool {
    segment.contains(['*', '?', '['])
}

/// Compile one pattern segment into a matcher applied to final path
/// components only.
pub(crate) fn segment_matcher(segment: &str) -> Result<GlobMatcher> {
    Ok(GlobBuilder::new(segment)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

/// Resolve a multi-segment glob pattern into the concrete paths it matches.
///
/// Returns the de-duplicated union of all matches, in the backend's native
/// listing order. A pattern with no wildcard characters yields at most one
/// match: the pattern itself, when it exists.
pub fn resolve<S: ListingSource + ?Sized>(source: &mut S, pattern: &str) -> Result<Vec<String>> {
    let mut segments: Vec<String> = pattern.split('/').map(str::to_string).collect();
    if pattern.starts_with('/') {
        // the first split element is empty; keep the root marker
        segments[0] = "/".to_string();
    }
    segments.retain(|s| !s.is_empty());

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    walk(source, &segments, String::new(), &mut out, &mut seen)?;
    Ok(out)
}

fn walk<S: ListingSource + ?Sized>(
    source: &mut S,
    segments: &[String],
    prefix: String,
    out: &mut Vec<String>,
    seen: &mut HashSet<String>,
) -> Result<()> {
    let Some((segment, rest)) = segments.split_first() else {
        // Base case: the accumulated prefix is a candidate match. Accept it
        // if a listing of it is non-empty or an existence probe succeeds.
        if prefix.is_empty() {
            return Ok(());
        }
        let hit = match source.list(&prefix)? {
            Listing::Unavailable => false,
            Listing::Entries(entries) => !entries.is_empty() || source.probe(&prefix)?,
        };
        if hit && seen.insert(prefix.clone()) {
            out.push(prefix);
        }
        return Ok(());
    };

    if !has_magic(segment) {
        // Literal segment: zero-cost descent, no listing call.
        return walk(source, rest, pathstr::join(&prefix, segment), out, seen);
    }

    let entries = match source.list(&prefix)? {
        Listing::Entries(entries) => entries,
        Listing::Unavailable => return Ok(()),
    };
    if entries.len() == 1 && entries[0] == prefix {
        // A listing of exactly one entry equal to the prefix means the
        // prefix denotes a file; no further segments can be satisfied.
        return Ok(());
    }

    let matcher = segment_matcher(segment)?;
    for entry in entries {
        if matcher.is_match(pathstr::final_component(&entry)) {
            walk(source, rest, entry, out, seen)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::BTreeMap;

    /// In-memory tree: maps a directory path to its child paths. Files are
    /// modelled the way list-only servers report them: listing a file path
    /// returns the single entry itself.
    struct Tree {
        dirs: BTreeMap<String, Vec<String>>,
        files: Vec<String>,
        poison: Option<String>,
    }

    impl Tree {
        fn new(dirs: &[(&str, &[&str])], files: &[&str]) -> Self {
            Self {
                dirs: dirs
                    .iter()
                    .map(|(d, cs)| ((*d).to_string(), cs.iter().map(|c| (*c).to_string()).collect()))
                    .collect(),
                files: files.iter().map(|f| (*f).to_string()).collect(),
                poison: None,
            }
        }
    }

    impl ListingSource for Tree {
        fn list(&mut self, prefix: &str) -> Result<Listing> {
            if self.poison.as_deref() == Some(prefix) {
                return Err(Error::Protocol("server on fire".into()));
            }
            if let Some(children) = self.dirs.get(prefix) {
                return Ok(Listing::Entries(children.clone()));
            }
            if self.files.iter().any(|f| f == prefix) {
                return Ok(Listing::Entries(vec![prefix.to_string()]));
            }
            Ok(Listing::Unavailable)
        }

        fn probe(&mut self, path: &str) -> Result<bool> {
            Ok(self.dirs.contains_key(path) || self.files.iter().any(|f| f == path))
        }
    }

    fn readings_tree() -> Tree {
        Tree::new(
            &[
                ("", &["data"]),
                ("data", &["data/2021", "data/2022"]),
                ("data/2021", &["data/2021/readings_jan.csv", "data/2021/notes.txt"]),
                ("data/2022", &["data/2022/readings_feb.csv"]),
            ],
            &[
                "data/2021/readings_jan.csv",
                "data/2021/notes.txt",
                "data/2022/readings_feb.csv",
            ],
        )
    }

    #[test]
    fn multi_segment_wildcards() {
        let mut tree = readings_tree();
        let got = resolve(&mut tree, "data/*/readings*.csv").unwrap();
        assert_eq!(
            got,
            vec!["data/2021/readings_jan.csv", "data/2022/readings_feb.csv"]
        );
    }

    #[test]
    fn literal_pattern_yields_at_most_one_match() {
        let mut tree = readings_tree();
        let got = resolve(&mut tree, "data/2021/notes.txt").unwrap();
        assert_eq!(got, vec!["data/2021/notes.txt"]);

        let got = resolve(&mut tree, "data/2021/absent.txt").unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn empty_directory_is_no_error() {
        let mut tree = Tree::new(&[("", &[])], &[]);
        assert!(resolve(&mut tree, "*").unwrap().is_empty());
        assert!(resolve(&mut tree, "a/*/b").unwrap().is_empty());
    }

    #[test]
    fn file_prefix_stops_recursion() {
        // `data/2021/readings_jan.csv` lists as a single entry equal to
        // itself, so a wildcard below it cannot match anything.
        let mut tree = readings_tree();
        let got = resolve(&mut tree, "data/2021/readings_jan.csv/*").unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn transient_branch_is_dropped() {
        let mut tree = readings_tree();
        let got = resolve(&mut tree, "nope/*/deep.txt").unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn permanent_failure_propagates() {
        let mut tree = readings_tree();
        tree.poison = Some("data/2021".to_string());
        let err = resolve(&mut tree, "data/*/readings*.csv").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn literal_descent_issues_no_listing() {
        struct CountingTree(Tree, usize);
        impl ListingSource for CountingTree {
            fn list(&mut self, prefix: &str) -> Result<Listing> {
                self.1 += 1;
                self.0.list(prefix)
            }
            fn probe(&mut self, path: &str) -> Result<bool> {
                self.0.probe(path)
            }
        }

        let mut tree = CountingTree(readings_tree(), 0);
        resolve(&mut tree, "data/2021/notes.txt").unwrap();
        // one listing call at the base case, none for the literal segments
        assert_eq!(tree.1, 1);
    }

    #[test]
    fn duplicates_are_merged() {
        // servers may report the same entry twice; branches must be unioned
        let mut tree = Tree::new(&[("", &["a", "a"]), ("a", &["a/x"])], &["a/x"]);
        let got = resolve(&mut tree, "a*/x").unwrap();
        assert_eq!(got, vec!["a/x"]);
    }

    #[test]
    fn magic_detection() {
        assert!(has_magic("*.txt"));
        assert!(has_magic("file?"));
        assert!(has_magic("[ab]c"));
        assert!(!has_magic("plain.txt"));
    }
}
