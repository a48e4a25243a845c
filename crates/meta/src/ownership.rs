use std::fmt;

/// Error produced when an ownership definition is not usable for packaging.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum OwnershipError {
    /// The entity name was empty or contained a separator.
    #[error("'{0}' is not a valid owner/group name")]
    InvalidName(String),
    /// The id falls in a dynamically allocated range.
    ///
    /// Packages cannot rely on dynamic ids being stable across systems, so
    /// only the static system range (0-99) is accepted.
    #[error("id {id} for '{name}' is not in the statically allocated range (0-99)")]
    DynamicId {
        /// Entity name.
        name: String,
        /// Offending id.
        id: u32,
    },
    /// `nobody`/`nogroup` must never own shipped paths.
    #[error("paths must not be owned by '{0}'")]
    ForbiddenEntity(String),
}

/// A resolved (name, numeric id) pair recorded in tar members.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OwnershipDefinition {
    name: String,
    id: u32,
}

impl OwnershipDefinition {
    /// The `root` (id 0) definition used as default for every path.
    #[must_use]
    pub fn root() -> Self {
        Self {
            name: "root".to_owned(),
            id: 0,
        }
    }

    /// Returns the entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the numeric id.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }
}

impl fmt::Display for OwnershipDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

fn validate(name: &str, id: u32) -> Result<(), OwnershipError> {
    if name.is_empty() || name.contains([':', '/', '\0']) || name.contains(char::is_whitespace) {
        return Err(OwnershipError::InvalidName(name.to_owned()));
    }
    if matches!(name, "nobody" | "nogroup") || id == 65534 {
        return Err(OwnershipError::ForbiddenEntity(name.to_owned()));
    }
    if id > 99 {
        return Err(OwnershipError::DynamicId {
            name: name.to_owned(),
            id,
        });
    }
    Ok(())
}

/// Statically declared owner for a path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticOwner {
    definition: OwnershipDefinition,
}

impl StaticOwner {
    /// Creates an owner from a name and static system uid.
    pub fn from_name_and_id(name: &str, uid: u32) -> Result<Self, OwnershipError> {
        validate(name, uid)?;
        Ok(Self {
            definition: OwnershipDefinition {
                name: name.to_owned(),
                id: uid,
            },
        })
    }

    /// Returns the underlying definition.
    #[must_use]
    pub const fn ownership_definition(&self) -> &OwnershipDefinition {
        &self.definition
    }
}

/// Statically declared group for a path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticGroup {
    definition: OwnershipDefinition,
}

impl StaticGroup {
    /// Creates a group from a name and static system gid.
    pub fn from_name_and_id(name: &str, gid: u32) -> Result<Self, OwnershipError> {
        validate(name, gid)?;
        Ok(Self {
            definition: OwnershipDefinition {
                name: name.to_owned(),
                id: gid,
            },
        })
    }

    /// Returns the underlying definition.
    #[must_use]
    pub const fn ownership_definition(&self) -> &OwnershipDefinition {
        &self.definition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_definition() {
        let root = OwnershipDefinition::root();
        assert_eq!(root.name(), "root");
        assert_eq!(root.id(), 0);
    }

    #[test]
    fn static_system_ids_accepted() {
        let owner = StaticOwner::from_name_and_id("_apt", 42).unwrap();
        assert_eq!(owner.ownership_definition().id(), 42);
    }

    #[test]
    fn dynamic_ids_rejected() {
        assert!(matches!(
            StaticOwner::from_name_and_id("someuser", 1000),
            Err(OwnershipError::DynamicId { id: 1000, .. })
        ));
    }

    #[test]
    fn nobody_rejected() {
        assert!(matches!(
            StaticGroup::from_name_and_id("nogroup", 65534),
            Err(OwnershipError::ForbiddenEntity(_))
        ));
    }
}
