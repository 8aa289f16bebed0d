//! Scoped observer registration.

/// Guard that keeps an observer registered for as long as it lives.
///
/// Dropping the guard unregisters the observer. Call [`Subscription::detach`]
/// to keep the observer registered for the lifetime of the registry instead.
#[must_use = "dropping a Subscription unregisters the observer immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Unregister now.
    pub fn cancel(mut self) {
        self.release_now();
    }

    /// Keep the observer registered and drop the guard without unregistering.
    pub fn detach(mut self) {
        self.release = None;
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
