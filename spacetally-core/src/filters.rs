use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use aho_corasick::AhoCorasick;
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::RegexSet;

/// Compiled exclusion patterns applied to sampled entries.
///
/// Substring patterns match anywhere in the path, regexes match the lossy
/// string form, globs match the path, and literal paths match themselves and
/// anything below them. Globs and literal paths are also handed to the
/// sampler so the enumeration itself can skip them; substrings and regexes
/// are applied only after sampling.
#[derive(Default, Clone)]
pub struct ExcludeSet {
    paths: Vec<PathBuf>,
    contains: Vec<String>,
    regex: Vec<String>,
    glob: Vec<String>,
    contains_ac: Option<AhoCorasick>,
    regex_set: Option<RegexSet>,
    glob_set: Option<GlobSet>,
}

impl std::fmt::Debug for ExcludeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExcludeSet")
            .field("paths", &self.paths)
            .field("contains", &self.contains)
            .field("regex", &self.regex)
            .field("glob", &self.glob)
            .finish()
    }
}

impl ExcludeSet {
    pub fn new(contains: Vec<String>, regex: Vec<String>, glob: Vec<String>) -> Self {
        let contains: Vec<String> = contains.into_iter().filter(|s| !s.is_empty()).collect();
        let contains_ac = if contains.is_empty() {
            None
        } else {
            AhoCorasick::new(&contains).ok()
        };
        let regex_set = if regex.is_empty() {
            None
        } else {
            match RegexSet::new(&regex) {
                Ok(rs) => Some(rs),
                Err(e) => {
                    log::warn!("ignoring exclude regex set: {e}");
                    None
                }
            }
        };
        let glob_set = if glob.is_empty() {
            None
        } else {
            let mut b = GlobSetBuilder::new();
            for g in &glob {
                match Glob::new(g) {
                    Ok(gl) => {
                        b.add(gl);
                    }
                    Err(e) => log::warn!("ignoring exclude glob {g:?}: {e}"),
                }
            }
            b.build().ok()
        };
        Self {
            paths: Vec::new(),
            contains,
            regex,
            glob,
            contains_ac,
            regex_set,
            glob_set,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
            && self.contains.is_empty()
            && self.regex.is_empty()
            && self.glob.is_empty()
    }

    /// Adds a literal path (e.g. a separately reported mount) to the set.
    /// Matching is by whole components, so `/data/net` leaves `/data/network`.
    pub fn with_path(mut self, p: &Path) -> Self {
        self.paths.push(p.to_path_buf());
        self
    }

    /// Patterns forwarded to the enumeration tool's own exclusion flag.
    pub fn sampler_patterns(&self) -> impl Iterator<Item = &OsStr> {
        self.glob
            .iter()
            .map(|s| OsStr::new(s.as_str()))
            .chain(self.paths.iter().map(|p| p.as_os_str()))
    }

    #[inline]
    pub fn is_excluded(&self, p: &Path) -> bool {
        if self.paths.iter().any(|x| p.starts_with(x)) {
            return true;
        }
        if let Some(gs) = &self.glob_set {
            if gs.is_match(p) {
                return true;
            }
        }
        let s = p.as_os_str().to_string_lossy();
        if let Some(rs) = &self.regex_set {
            if rs.is_match(s.as_ref()) {
                return true;
            }
        }
        match &self.contains_ac {
            Some(ac) => ac.is_match(s.as_ref()),
            None => false,
        }
    }
}
