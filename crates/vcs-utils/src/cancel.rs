use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::UtilError;

/// A cooperative cancellation signal passed into streaming I/O.
///
/// Commands check this at iteration boundaries between entries, not
/// mid-entry; receiving it closes the stream promptly with
/// [`UtilError::Cancelled`].
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Convenience for loops: returns `Err(Cancelled)` if cancellation fired.
    pub fn check(&self) -> Result<(), UtilError> {
        if self.is_cancelled() {
            Err(UtilError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let tok = CancellationToken::new();
        assert!(tok.check().is_ok());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let tok = CancellationToken::new();
        let clone = tok.clone();
        clone.cancel();
        assert!(tok.is_cancelled());
        assert!(tok.check().is_err());
    }
}
