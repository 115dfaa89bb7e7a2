use std::fmt;

/// What a fallible cleanup reports back.
pub type CleanupResult = std::result::Result<(), String>;

/// Release action held by a registry entry.
///
/// It is consumed when run, so one registration can never release twice.
pub struct Cleanup(Box<dyn FnOnce() -> CleanupResult>);

impl Cleanup {
    /// Wrap an action that cannot fail.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self(Box::new(move || {
            f();
            Ok(())
        }))
    }

    /// Wrap an action that reports failure as a message.
    pub fn fallible<F>(f: F) -> Self
    where
        F: FnOnce() -> CleanupResult + 'static,
    {
        Self(Box::new(f))
    }

    /// No-op release, for owners whose resource is freed elsewhere.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub(crate) fn run(self) -> CleanupResult {
        (self.0)()
    }
}

impl<F> From<F> for Cleanup
where
    F: FnOnce() + 'static,
{
    fn from(f: F) -> Self {
        Cleanup::new(f)
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup(..)")
    }
}
