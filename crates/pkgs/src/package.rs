use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
struct Inner {
    name: String,
    architecture: String,
    is_arch_all: bool,
    should_be_acted_on: bool,
}

/// A resolved binary package from `debian/control`.
///
/// Cheaply cloneable (the record is behind an [`Arc`]); equality and
/// hashing are by package name, which is unique within a source package.
#[derive(Clone, Debug)]
pub struct BinaryPackage {
    inner: Arc<Inner>,
}

impl BinaryPackage {
    /// Creates a package record.
    ///
    /// `architecture` is the value from the control file (`any`, `all` or a
    /// concrete architecture); `should_be_acted_on` is false when the
    /// package is excluded by the active build profiles and the engine must
    /// treat its rules as inert.
    #[must_use]
    pub fn new(name: impl Into<String>, architecture: impl Into<String>, should_be_acted_on: bool) -> Self {
        let architecture = architecture.into();
        let is_arch_all = architecture == "all";
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                architecture,
                is_arch_all,
                should_be_acted_on,
            }),
        }
    }

    /// Returns the package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the declared architecture.
    #[must_use]
    pub fn architecture(&self) -> &str {
        &self.inner.architecture
    }

    /// Whether the package is `Architecture: all`.
    #[must_use]
    pub fn is_arch_all(&self) -> bool {
        self.inner.is_arch_all
    }

    /// Whether this build produces the package.
    #[must_use]
    pub fn should_be_acted_on(&self) -> bool {
        self.inner.should_be_acted_on
    }
}

impl PartialEq for BinaryPackage {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name
    }
}

impl Eq for BinaryPackage {}

impl std::hash::Hash for BinaryPackage {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.name.hash(state);
    }
}

impl PartialOrd for BinaryPackage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BinaryPackage {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.inner.name.cmp(&other.inner.name)
    }
}

impl fmt::Display for BinaryPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_name() {
        let a = BinaryPackage::new("foo", "any", true);
        let b = BinaryPackage::new("foo", "all", false);
        assert_eq!(a, b);
    }

    #[test]
    fn arch_all_detection() {
        assert!(BinaryPackage::new("foo-doc", "all", true).is_arch_all());
        assert!(!BinaryPackage::new("foo", "amd64", true).is_arch_all());
    }
}
