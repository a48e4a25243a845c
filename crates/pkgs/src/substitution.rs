use rustc_hash::FxHashMap;

/// Error produced when a `{{VAR}}` token cannot be expanded.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SubstitutionError {
    /// The token does not name a known variable.
    #[error(
        "the variable {{{{{token}}}}} used in {definition_source} is not defined; \
         the value cannot be resolved"
    )]
    UnresolvableToken {
        /// The token name (without braces).
        token: String,
        /// Where the value containing the token was defined.
        definition_source: String,
    },
    /// A `{{` was opened but never closed.
    #[error("unterminated substitution token in \"{value}\" (from {definition_source})")]
    UnterminatedToken {
        /// The full value being expanded.
        value: String,
        /// Where the value was defined.
        definition_source: String,
    },
}

/// `{{VAR}}` expansion with fail-on-unknown semantics.
///
/// An empty substitution (no variables) still succeeds for values without
/// tokens, so pattern parsing can run with [`Substitution::default`] in
/// tests.
#[derive(Clone, Debug, Default)]
pub struct Substitution {
    variables: FxHashMap<String, String>,
}

impl Substitution {
    /// Creates an empty substitution table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with `name` bound to `value`.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Whether `name` is a known variable.
    #[must_use]
    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Expands every `{{VAR}}` token in `value`.
    pub fn substitute(
        &self,
        value: &str,
        definition_source: &str,
    ) -> Result<String, SubstitutionError> {
        self.apply(value, definition_source, false)
    }

    /// Expands tokens, escaping glob metacharacters in substituted values.
    ///
    /// Used when the expanded string is fed to the pattern parser, so a
    /// variable holding `*` matches a literal asterisk rather than turning
    /// the pattern into a wildcard.
    pub fn substitute_into_pattern(
        &self,
        value: &str,
        definition_source: &str,
    ) -> Result<String, SubstitutionError> {
        self.apply(value, definition_source, true)
    }

    fn apply(
        &self,
        value: &str,
        definition_source: &str,
        escape_glob_characters: bool,
    ) -> Result<String, SubstitutionError> {
        if !value.contains("{{") {
            return Ok(value.to_owned());
        }
        let mut result = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(start) = rest.find("{{") {
            result.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            let Some(end) = after_open.find("}}") else {
                return Err(SubstitutionError::UnterminatedToken {
                    value: value.to_owned(),
                    definition_source: definition_source.to_owned(),
                });
            };
            let token = &after_open[..end];
            let Some(replacement) = self.variables.get(token) else {
                return Err(SubstitutionError::UnresolvableToken {
                    token: token.to_owned(),
                    definition_source: definition_source.to_owned(),
                });
            };
            if escape_glob_characters {
                result.push_str(&glob_escape(replacement));
            } else {
                result.push_str(replacement);
            }
            rest = &after_open[end + 2..];
        }
        result.push_str(rest);
        Ok(result)
    }
}

/// Escapes glob metacharacters so the value matches literally.
#[must_use]
pub(crate) fn glob_escape(value: &str) -> String {
    if !value.contains(['*', '?', '[', ']', '{', '}']) {
        return value.to_owned();
    }
    let mut escaped = String::with_capacity(value.len() + 4);
    for ch in value.chars() {
        match ch {
            '[' => escaped.push_str("[[]"),
            ']' => escaped.push_str("[]]"),
            '*' => escaped.push_str("[*]"),
            '?' => escaped.push_str("[?]"),
            '{' => escaped.push_str("[{]"),
            '}' => escaped.push_str("[}]"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_pass_through() {
        let subst = Substitution::new();
        assert_eq!(
            subst.substitute("usr/bin/tool", "rule #1").unwrap(),
            "usr/bin/tool"
        );
    }

    #[test]
    fn expands_known_tokens() {
        let subst = Substitution::new().with_variable("PACKAGE", "foo");
        assert_eq!(
            subst
                .substitute("usr/share/bug/{{PACKAGE}}/script", "builtin")
                .unwrap(),
            "usr/share/bug/foo/script"
        );
    }

    #[test]
    fn unknown_token_is_an_error() {
        let subst = Substitution::new();
        let err = subst.substitute("{{DEB_HOST_ARCH}}", "rule #2").unwrap_err();
        assert!(matches!(
            err,
            SubstitutionError::UnresolvableToken { ref token, .. } if token == "DEB_HOST_ARCH"
        ));
    }

    #[test]
    fn unterminated_token_is_an_error() {
        let subst = Substitution::new().with_variable("X", "y");
        assert!(matches!(
            subst.substitute("a/{{X", "rule #3"),
            Err(SubstitutionError::UnterminatedToken { .. })
        ));
    }

    #[test]
    fn pattern_substitution_escapes_globs() {
        let subst = Substitution::new().with_variable("NAME", "lib*");
        assert_eq!(
            subst.substitute_into_pattern("{{NAME}}/a", "rule #4").unwrap(),
            "lib[*]/a"
        );
    }
}
