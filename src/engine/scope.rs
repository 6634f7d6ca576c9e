//! Parse scope: backreference bindings plus the active cutpoint generation.
//!
//! A [`Scope`] is a persistent value. Extending it for one branch leaves every
//! other holder of the old scope untouched, so alternatives and repetitions
//! can try-and-discard without snapshot bookkeeping.

use crate::TreeElement;
use std::cell::Cell;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    bindings: im::HashMap<Arc<str>, TreeElement>,
    cutpoint: Option<u32>,
}

impl Scope {
    pub(crate) fn with(&self, ident: &str, value: TreeElement) -> Scope {
        Scope { bindings: self.bindings.update(Arc::from(ident), value), cutpoint: self.cutpoint }
    }

    pub(crate) fn get(&self, ident: &str) -> Option<&TreeElement> {
        self.bindings.get(ident)
    }

    pub(crate) fn cutpoint(&self) -> Option<u32> {
        self.cutpoint
    }

    /// Open a new cutpoint generation.
    ///
    /// Returns `(scope, previous, replacement)`. A generation is only opened
    /// if one is already active or `force` is set; otherwise the scope is
    /// returned unchanged with both ids `None`.
    pub(crate) fn replace_cutpoint(&self, force: bool, ids: &CutpointIds) -> (Scope, Option<u32>, Option<u32>) {
        let prev = self.cutpoint;
        if prev.is_none() && !force {
            return (self.clone(), None, None);
        }
        let next = ids.fresh();
        (Scope { bindings: self.bindings.clone(), cutpoint: Some(next) }, prev, Some(next))
    }
}

/// Strictly increasing generation ids, one sequence per parse call.
#[derive(Debug, Default)]
pub(crate) struct CutpointIds {
    next: Cell<u32>,
}

impl CutpointIds {
    pub(crate) fn fresh(&self) -> u32 {
        let id = self.next.get();
        self.next.set(id + 1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Scanner;

    #[test]
    fn bindings_do_not_leak_between_branches() {
        let s = Scanner::new("xy");
        let root = Scope::default();
        let left = root.with("a", s.slice(0, 1).into());
        let right = root.with("a", s.slice(1, 2).into());
        assert!(root.get("a").is_none());
        assert_eq!(left.get("a").map(TreeElement::text).as_deref(), Some("x"));
        assert_eq!(right.get("a").map(TreeElement::text).as_deref(), Some("y"));
    }

    #[test]
    fn cutpoints_only_open_when_forced_or_active() {
        let ids = CutpointIds::default();
        let root = Scope::default();

        let (same, prev, next) = root.replace_cutpoint(false, &ids);
        assert_eq!((prev, next, same.cutpoint()), (None, None, None));

        let (forced, prev, next) = root.replace_cutpoint(true, &ids);
        assert_eq!((prev, next), (None, Some(0)));

        let (nested, prev, next) = forced.replace_cutpoint(false, &ids);
        assert_eq!((prev, next, nested.cutpoint()), (Some(0), Some(1), Some(1)));
    }
}
