use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use matchers::{MatchRule, MatchRuleKind};
use pkgs::BinaryPackage;
use rustc_hash::{FxHashMap, FxHashSet};
use vfs::{Fs, NodeId};

use crate::discard::AutoDiscardRule;
use crate::error::InstallError;
use crate::search::SearchDir;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum DiscardState {
    NotDiscarded,
    ByAutomaticRule,
    ByManifestRule,
}

/// One matched source path, bound to the search dir it came from and the
/// packages it applies to.
#[derive(Clone, Debug)]
pub struct PathMatch {
    /// Node in the search dir's tree.
    pub node: NodeId,
    /// Index into the search dir slice the node belongs to.
    pub search_dir: usize,
    /// Packages this match installs into.
    pub into: BTreeSet<BinaryPackage>,
}

/// The claim ledger shared by every install and discard rule of one
/// install pass.
///
/// Keys are real filesystem paths, so a source file found through two
/// different search dirs is still a single claimable entity per dir.
/// Strictly sequential; rules mutate it one at a time.
#[derive(Debug)]
pub struct SourcePathMatcher {
    already_matched: FxHashMap<PathBuf, (BTreeSet<BinaryPackage>, String)>,
    /// (package name, source path) pairs claimed via exact rules.
    exact_match_request: FxHashSet<(String, PathBuf)>,
    discarded: FxHashMap<PathBuf, DiscardState>,
    auto_discard_rules: Vec<AutoDiscardRule>,
    used_auto_discard_rules: BTreeMap<String, BTreeSet<PathBuf>>,
}

fn ledger_key(fs: &Fs, id: NodeId) -> PathBuf {
    fs.backing_path(id)
        .map_or_else(|| PathBuf::from(fs.path(id)), Path::to_path_buf)
}

impl SourcePathMatcher {
    /// Creates a ledger with the given automatic discard rules.
    #[must_use]
    pub fn new(auto_discard_rules: Vec<AutoDiscardRule>) -> Self {
        Self {
            already_matched: FxHashMap::default(),
            exact_match_request: FxHashSet::default(),
            discarded: FxHashMap::default(),
            auto_discard_rules,
            used_auto_discard_rules: BTreeMap::new(),
        }
    }

    /// Whether `id` has already been claimed or discarded.
    ///
    /// Consults the automatic discard rules on a cache miss, walking up
    /// the directory chain: a path inside a discarded directory is
    /// discarded too, and every ancestor visited during the walk gets its
    /// verdict cached.
    pub fn is_reserved(&mut self, fs: &Fs, id: NodeId) -> bool {
        let key = ledger_key(fs, id);
        if self.already_matched.contains_key(&key) {
            return true;
        }
        let state = match self.discarded.get(&key) {
            Some(state) => *state,
            None => self.check_auto_discard(fs, id),
        };
        state != DiscardState::NotDiscarded
    }

    /// Marks a path as discarded by a manifest rule.
    pub fn exclude(&mut self, key: PathBuf) {
        self.discarded.insert(key, DiscardState::ByManifestRule);
    }

    /// Per-rule record of which paths each automatic discard rule hid.
    #[must_use]
    pub fn auto_discard_usage(&self) -> &BTreeMap<String, BTreeSet<PathBuf>> {
        &self.used_auto_discard_rules
    }

    fn run_auto_discard_rules(&mut self, fs: &Fs, id: NodeId) -> bool {
        for index in 0..self.auto_discard_rules.len() {
            if self.auto_discard_rules[index].should_discard(fs, id) {
                let name = self.auto_discard_rules[index].name().to_owned();
                self.used_auto_discard_rules
                    .entry(name)
                    .or_default()
                    .insert(ledger_key(fs, id));
                return true;
            }
        }
        false
    }

    fn check_auto_discard(&mut self, fs: &Fs, id: NodeId) -> DiscardState {
        let mut cache_misses: Vec<PathBuf> = Vec::new();
        let mut current = id;
        let verdict = loop {
            let key = ledger_key(fs, current);
            if let Some(state) = self.discarded.get(&key) {
                break *state;
            }
            cache_misses.push(key);
            if self.run_auto_discard_rules(fs, current) {
                break DiscardState::ByAutomaticRule;
            }
            // A clean verdict cannot be trusted until the parent has been
            // checked: the directory could be discarded without the file
            // itself triggering any rule.
            match fs.parent(current) {
                Some(parent) => current = parent,
                None => break DiscardState::NotDiscarded,
            }
        };
        for key in cache_misses {
            self.discarded.insert(key, verdict);
        }
        verdict
    }

    /// Looks up the claim state of a candidate match.
    ///
    /// Returns the prior claim if one exists, otherwise whether the path
    /// is discarded. An exact match overrides an automatic (but not a
    /// manifest) discard, rescuing paths the stock rules would hide.
    fn may_match(
        &mut self,
        fs: &Fs,
        id: NodeId,
        is_exact_match: bool,
    ) -> (Option<(BTreeSet<BinaryPackage>, String)>, bool) {
        let key = ledger_key(fs, id);
        if let Some(claim) = self.already_matched.get(&key) {
            return (Some(claim.clone()), false);
        }
        let state = match self.discarded.get(&key) {
            Some(state) => *state,
            None => self.check_auto_discard(fs, id),
        };
        let mut is_discarded = state != DiscardState::NotDiscarded;
        if is_exact_match && state == DiscardState::ByAutomaticRule {
            is_discarded = false;
        }
        (None, is_discarded)
    }

    /// Records a claim on `id` for `reserved_by`.
    ///
    /// Exact claims also populate the per-package de-duplication set and
    /// clear any stale discard verdict.
    pub fn reserve(
        &mut self,
        fs: &Fs,
        id: NodeId,
        reserved_by: &BTreeSet<BinaryPackage>,
        definition_source: &str,
        is_exact_match: bool,
    ) {
        let key = ledger_key(fs, id);
        self.already_matched
            .insert(key.clone(), (reserved_by.clone(), definition_source.to_owned()));
        if !is_exact_match {
            return;
        }
        for pkg in reserved_by {
            self.exact_match_request
                .insert((pkg.name().to_owned(), key.clone()));
        }
        self.discarded.remove(&key);
        for discarded_paths in self.used_auto_discard_rules.values_mut() {
            discarded_paths.remove(&key);
        }
    }

    /// Resolves `rule` against the ordered search dirs and reserves every
    /// match.
    ///
    /// Install rules (`reserved_by` non-empty) stop at the first search
    /// dir that satisfies every target package; discard rules visit all
    /// dirs so a single rule discards the path everywhere. Glob rules
    /// skip and count reserved candidates; exact rules error on them.
    pub fn find_and_reserve_all_matches(
        &mut self,
        rule: &MatchRule,
        search_dirs: &[&SearchDir],
        dir_only_match: bool,
        match_filter: Option<&dyn Fn(&Fs, NodeId) -> bool>,
        reserved_by: &BTreeSet<BinaryPackage>,
        definition_source: &str,
    ) -> Result<(Vec<PathMatch>, (usize, usize)), InstallError> {
        let mut matched = Vec::new();
        let mut already_installed_paths = 0_usize;
        let mut already_excluded_paths = 0_usize;
        let is_exact = rule.kind() == MatchRuleKind::ExactMatch;

        let mut missing_matches: BTreeSet<BinaryPackage> = reserved_by.clone();
        for (sdir_index, sdir) in search_dirs.iter().enumerate() {
            if !reserved_by.is_empty() && missing_matches.is_disjoint(sdir.applies_to()) {
                // Every package this search dir applies to already got a
                // match from an earlier dir.
                continue;
            }
            let applicable: BTreeSet<BinaryPackage> = sdir
                .applies_to()
                .intersection(&missing_matches)
                .cloned()
                .collect();
            let fs = sdir.fs();
            let ignore = match_filter.map(|f| move |id: NodeId| f(fs, id));
            let candidates = rule.finditer(
                fs,
                ignore
                    .as_ref()
                    .map(|f| f as &dyn Fn(NodeId) -> bool),
            );

            let mut matched_in_dir = false;
            for candidate in candidates {
                if dir_only_match && !fs.is_dir(candidate) {
                    continue;
                }
                if fs.parent(candidate).is_none() {
                    if rule.kind() == MatchRuleKind::MatchAnything {
                        continue;
                    }
                    return Err(InstallError::MatchedRootDir {
                        pattern: rule.describe_match_short(),
                    });
                }
                let (installed_into, excluded) = self.may_match(fs, candidate, is_exact);
                if let Some((packages, _)) = installed_into {
                    if !is_exact {
                        already_installed_paths += 1;
                        continue;
                    }
                    let packages = packages
                        .iter()
                        .map(BinaryPackage::name)
                        .collect::<Vec<_>>()
                        .join(", ");
                    return Err(InstallError::AlreadyInstalled {
                        path: ledger_key(fs, candidate),
                        packages,
                        definition_source: definition_source.to_owned(),
                    });
                }
                if excluded {
                    if !is_exact {
                        already_excluded_paths += 1;
                        continue;
                    }
                    return Err(InstallError::AlreadyExcluded {
                        path: ledger_key(fs, candidate),
                        definition_source: definition_source.to_owned(),
                    });
                }
                if is_exact {
                    let key = ledger_key(fs, candidate);
                    for pkg in &applicable {
                        let m_key = (pkg.name().to_owned(), key.clone());
                        if self.exact_match_request.contains(&m_key) {
                            return Err(InstallError::ExactPathMatchedTwice {
                                path: key,
                                package: pkg.name().to_owned(),
                                definition_source: definition_source.to_owned(),
                            });
                        }
                        self.exact_match_request.insert(m_key);
                    }
                }
                if reserved_by.is_empty() {
                    self.exclude(ledger_key(fs, candidate));
                } else {
                    // Going through reserve() clears any stale
                    // auto-discard verdict when the claim is exact.
                    self.reserve(fs, candidate, &applicable, definition_source, is_exact);
                }
                matched.push(PathMatch {
                    node: candidate,
                    search_dir: sdir_index,
                    into: applicable.clone(),
                });
                matched_in_dir = true;
            }

            if matched_in_dir {
                for pkg in &applicable {
                    missing_matches.remove(pkg);
                }
                if !reserved_by.is_empty() && missing_matches.is_empty() {
                    break;
                }
            }
        }
        Ok((matched, (already_installed_paths, already_excluded_paths)))
    }

    /// Walks a search dir and yields every file, and every empty
    /// directory, that no install or discard rule accounted for.
    pub fn detect_missing(&mut self, fs: &Fs) -> Vec<NodeId> {
        let mut missing = Vec::new();
        let mut stack = fs.children(fs.root());
        while let Some(id) = stack.pop() {
            if fs.is_dir(id) {
                let children = fs.children(id);
                if children.is_empty() {
                    if !self.is_reserved(fs, id) {
                        missing.push(id);
                    }
                } else {
                    stack.extend(children);
                }
            } else if !self.is_reserved(fs, id) {
                missing.push(id);
            }
        }
        missing
    }
}
