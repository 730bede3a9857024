use std::marker::PhantomData;

/// Runs a closure when it goes out of scope, whether the scope is left by a
/// normal return, an early return, or a panic.
pub(crate) struct ScopeGuard<'a, F: FnOnce()> {
    // Taken on drop so the closure runs at most once, even if it panics.
    closure: Option<F>,

    _p: PhantomData<&'a ()>,
}

impl<'a, F: FnOnce()> ScopeGuard<'a, F> {
    pub(crate) fn new(closure: F) -> Self {
        ScopeGuard {
            closure: Some(closure),
            _p: PhantomData,
        }
    }
}

impl<'a, F: FnOnce()> Drop for ScopeGuard<'a, F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn test_runs_on_scope_exit() {
        let hits = Cell::new(0);
        {
            let _guard = ScopeGuard::new(|| hits.set(hits.get() + 1));
            assert_eq!(hits.get(), 0);
        }
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_runs_on_unwind() {
        let hits = Cell::new(0);
        let res = catch_unwind(AssertUnwindSafe(|| {
            let _guard = ScopeGuard::new(|| hits.set(hits.get() + 1));
            panic!("unwinding");
        }));

        assert!(res.is_err());
        assert_eq!(hits.get(), 1);
    }
}
