//! Pipeline phases.
//!
//! # Responsibilities
//! - Allocate unique phase identities
//! - Compare phases by identity, never by display name
//!
//! # Design Decisions
//! - Identity comes from a global atomic counter, the name is diagnostic only
//! - Cheap to clone (shared name, copied id)

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Global atomic counter for phase IDs.
/// Relaxed ordering is enough since we only need uniqueness.
static PHASE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A named execution point within a pipeline.
///
/// Two phases created with the same name are still distinct.
#[derive(Clone)]
pub struct Phase {
    id: u64,
    name: Arc<str>,
}

impl Phase {
    /// Create a phase with a fresh identity.
    pub fn new(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self {
            id: PHASE_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name),
        }
    }

    /// Display name of the phase.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw identity value.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl PartialEq for Phase {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Phase {}

impl std::hash::Hash for Phase {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Phase({}#{})", self.name, self.id)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_same_name_phases_are_distinct() {
        let a = Phase::new("Transform");
        let b = Phase::new("Transform");
        assert_ne!(a, b);
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn test_clone_keeps_identity() {
        let a = Phase::new("Call");
        let b = a.clone();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_display_uses_name() {
        let phase = Phase::new("Setup");
        assert_eq!(phase.to_string(), "Setup");
        assert!(format!("{:?}", phase).starts_with("Phase(Setup#"));
    }
}
