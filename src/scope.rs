//! `UseKey` and `Scope` (C3): the addressing tuples operations and state are
//! keyed by.

use std::fmt;

/// `(application, substance)`. The subset of `Scope` used as a map key into
/// `SimulationState` — structural equality, deterministic ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UseKey {
    pub application: String,
    pub substance: String,
}

impl UseKey {
    pub fn new(application: impl Into<String>, substance: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            substance: substance.into(),
        }
    }
}

impl fmt::Display for UseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application, self.substance)
    }
}

/// `(stanza, application, substance)`: the superset of `UseKey` operations are
/// evaluated against, so that a policy stanza can temporarily address a
/// different substance for displacement without losing the stanza it came
/// from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub stanza: String,
    pub application: String,
    pub substance: String,
}

impl Scope {
    pub fn new(
        stanza: impl Into<String>,
        application: impl Into<String>,
        substance: impl Into<String>,
    ) -> Self {
        Self {
            stanza: stanza.into(),
            application: application.into(),
            substance: substance.into(),
        }
    }

    pub fn use_key(&self) -> UseKey {
        UseKey::new(self.application.clone(), self.substance.clone())
    }

    /// A copy of this scope addressing a different substance within the same
    /// application and stanza, for `DisplaceExecutor` to target explicitly
    /// instead of mutating a shared scope in place and restoring it later.
    pub fn with_substance(&self, substance: impl Into<String>) -> Self {
        Self {
            stanza: self.stanza.clone(),
            application: self.application.clone(),
            substance: substance.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.stanza, self.application, self.substance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_key_drops_the_stanza() {
        let scope = Scope::new("policy-a", "Domestic Refrigeration", "HFC-134a");
        let key = scope.use_key();
        assert_eq!(key.application, "Domestic Refrigeration");
        assert_eq!(key.substance, "HFC-134a");
    }

    #[test]
    fn with_substance_preserves_stanza_and_application() {
        let scope = Scope::new("policy-a", "Domestic Refrigeration", "HFC-134a");
        let displaced = scope.with_substance("HFC-32");
        assert_eq!(displaced.stanza, scope.stanza);
        assert_eq!(displaced.application, scope.application);
        assert_eq!(displaced.substance, "HFC-32");
    }

    #[test]
    fn use_keys_sort_deterministically() {
        let mut keys = vec![
            UseKey::new("B App", "Sub"),
            UseKey::new("A App", "Sub"),
            UseKey::new("A App", "Another"),
        ];
        keys.sort();
        assert_eq!(keys[0], UseKey::new("A App", "Another"));
        assert_eq!(keys[1], UseKey::new("A App", "Sub"));
        assert_eq!(keys[2], UseKey::new("B App", "Sub"));
    }
}
