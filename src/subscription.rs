use tokio::sync::mpsc;

/// Releases a live listener exactly once, on `release()` or on drop.
pub struct ListenerGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerGuard {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A guard with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn release(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.run();
    }
}

/// A standing query: every emission is the full current result set.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    guard: ListenerGuard,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<T>, guard: ListenerGuard) -> Self {
        Self { rx, guard }
    }

    /// Emits `value` once, then terminates.
    pub fn completed(value: T) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        // the receiver is alive, send cannot fail
        let _ = tx.send(value);
        Self::new(rx, ListenerGuard::noop())
    }

    /// Next emission, or `None` once the producer has terminated.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn close(self) {
        let Self { rx, guard } = self;
        guard.release();
        drop(rx);
    }

    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<T>, ListenerGuard) {
        (self.rx, self.guard)
    }
}
