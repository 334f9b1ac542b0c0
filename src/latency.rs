use std::fmt;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

/// Simulated storage access latency.
///
/// Invoked on metadata and block touches, including inside locked sections, so that enabling it
/// widens race windows. A `Latency` never shares mutable state between calls.
#[derive(Clone, Default)]
pub struct Latency(Option<Arc<dyn Fn() + Send + Sync>>);

impl Latency {
    /// No delay at all.
    pub fn none() -> Self {
        Latency(None)
    }

    /// Busy-waits for `iterations` rounds on every touch.
    pub fn spin(iterations: usize) -> Self {
        if iterations == 0 {
            return Self::none();
        }

        Self::from_fn(move || {
            for i in 0..iterations {
                black_box(i);
            }
        })
    }

    /// Sleeps the calling thread on every touch. Touches happen while table locks are held, so
    /// other threads spin for the whole duration.
    pub fn sleep(duration: Duration) -> Self {
        Self::from_fn(move || std::thread::sleep(duration))
    }

    pub fn from_fn<F>(delay: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Latency(Some(Arc::new(delay)))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Simulates one storage access.
    #[inline]
    pub fn touch(&self) {
        if let Some(delay) = &self.0 {
            delay();
        }
    }
}

impl fmt::Debug for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => f.write_str("Latency::none"),
            Some(_) => f.write_str("Latency::custom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_none_is_default() {
        assert!(Latency::default().is_none());
        assert!(Latency::spin(0).is_none());
        Latency::none().touch();
    }

    #[test]
    fn test_custom_delay_runs_on_every_touch() {
        let touches = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&touches);
        let latency = Latency::from_fn(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        latency.touch();
        latency.clone().touch();

        assert_eq!(touches.load(Ordering::Relaxed), 2);
    }
}
