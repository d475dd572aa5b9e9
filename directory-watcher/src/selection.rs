//! Turning a tree selection into search scopes.

use crate::path::PathPolicy;

/// Maps selected node ids to the path prefixes a search should cover.
pub trait SelectionProjector: Send + Sync {
    fn project(&self, selection: &[String]) -> Vec<String>;
}

/// Uses the selected ids as prefixes, unchanged and in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProjector;

impl SelectionProjector for IdentityProjector {
    fn project(&self, selection: &[String]) -> Vec<String> {
        selection.to_vec()
    }
}

/// Drops duplicates and any id already covered by another selected ancestor.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollapsingProjector {
    policy: PathPolicy,
}

impl CollapsingProjector {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

impl SelectionProjector for CollapsingProjector {
    fn project(&self, selection: &[String]) -> Vec<String> {
        let mut prefixes: Vec<String> = Vec::new();
        for id in selection {
            if prefixes
                .iter()
                .any(|p| self.policy.is_ancestor_or_self(p, id))
            {
                continue;
            }
            prefixes.retain(|p| !self.policy.is_ancestor_or_self(id, p));
            prefixes.push(id.clone());
        }
        prefixes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_identity_keeps_selection() {
        let selection = ids(&["/a/b", "/a", "/a/b"]);

        assert_eq!(IdentityProjector.project(&selection), selection);
    }

    #[test]
    fn test_collapsing_drops_covered_ids() {
        let projector = CollapsingProjector::new(PathPolicy::unix());

        let prefixes = projector.project(&ids(&["/a/b", "/c", "/a", "/a/x", "/c", "/ab"]));

        assert_eq!(prefixes, vec!["/c", "/a", "/ab"]);
    }

    #[test]
    fn test_empty_selection() {
        assert!(CollapsingProjector::default().project(&[]).is_empty());
    }
}
