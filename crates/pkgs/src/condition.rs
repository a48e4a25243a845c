use std::collections::BTreeSet;

/// Build-environment facts conditions are evaluated against.
#[derive(Clone, Debug, Default)]
pub struct ConditionContext {
    host_architecture: String,
    active_build_profiles: BTreeSet<String>,
    is_cross_compiling: bool,
    build_docs: bool,
}

impl ConditionContext {
    /// Creates a context for `host_architecture`.
    #[must_use]
    pub fn new(host_architecture: impl Into<String>) -> Self {
        Self {
            host_architecture: host_architecture.into(),
            active_build_profiles: BTreeSet::new(),
            is_cross_compiling: false,
            build_docs: true,
        }
    }

    /// Sets the active build profiles (`DEB_BUILD_PROFILES`).
    #[must_use]
    pub fn with_build_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_build_profiles = profiles.into_iter().map(Into::into).collect();
        self.build_docs = !self.active_build_profiles.contains("nodoc");
        self
    }

    /// Marks the build as cross-compiling (build and host GNU types differ).
    #[must_use]
    pub const fn with_cross_compiling(mut self, cross: bool) -> Self {
        self.is_cross_compiling = cross;
        self
    }

    /// Returns the host architecture.
    #[must_use]
    pub fn host_architecture(&self) -> &str {
        &self.host_architecture
    }

    /// Whether `profile` is active.
    #[must_use]
    pub fn has_build_profile(&self, profile: &str) -> bool {
        self.active_build_profiles.contains(profile)
    }

    /// Whether the build is a cross build.
    #[must_use]
    pub const fn is_cross_compiling(&self) -> bool {
        self.is_cross_compiling
    }

    /// Whether documentation should be built (`nodoc` profile inactive).
    #[must_use]
    pub const fn build_docs(&self) -> bool {
        self.build_docs
    }
}

/// Condition attached to an install or transformation rule.
///
/// Evaluated against a [`ConditionContext`]; a rule whose condition is
/// false is a no-op (and its empty match result is tolerated).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManifestCondition {
    /// True when the host architecture is in the list.
    ArchMatches(Vec<String>),
    /// True when the named build profile is active.
    BuildProfileMatches(String),
    /// True when cross-compiling.
    CrossCompiling,
    /// True when documentation is being built (`nodoc` inactive).
    BuildDocs,
    /// True when every member condition is true.
    AllOf(Vec<ManifestCondition>),
    /// True when at least one member condition is true.
    AnyOf(Vec<ManifestCondition>),
    /// Structural negation.
    Not(Box<ManifestCondition>),
}

impl ManifestCondition {
    /// Builds an all-of group, flattening the trivial single-member case.
    #[must_use]
    pub fn all_of(mut conditions: Vec<Self>) -> Self {
        if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Self::AllOf(conditions)
        }
    }

    /// Returns the negated condition.
    #[must_use]
    pub fn negated(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Evaluates the condition.
    #[must_use]
    pub fn evaluate(&self, context: &ConditionContext) -> bool {
        match self {
            Self::ArchMatches(archs) => archs
                .iter()
                .any(|a| a == context.host_architecture() || a == "any"),
            Self::BuildProfileMatches(profile) => context.has_build_profile(profile),
            Self::CrossCompiling => context.is_cross_compiling(),
            Self::BuildDocs => context.build_docs(),
            Self::AllOf(conditions) => conditions.iter().all(|c| c.evaluate(context)),
            Self::AnyOf(conditions) => conditions.iter().any(|c| c.evaluate(context)),
            Self::Not(inner) => !inner.evaluate(context),
        }
    }
}
