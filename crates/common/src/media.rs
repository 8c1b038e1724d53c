//! Opaque handles to media owned by the external media provider.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A live, playable media object (decoder session, element, image bitmap…)
/// owned by the media provider. The timeline only stores and forwards it; it
/// is never serialized.
#[derive(Clone)]
pub struct MediaHandle {
    inner: Arc<dyn Any + Send + Sync>,
    label: Arc<str>,
}

impl MediaHandle {
    pub fn new<T: Any + Send + Sync>(value: T, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(value),
            label: Arc::from(label.into()),
        }
    }

    /// Human-readable label (usually the file name) for logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Whether two handles refer to the same underlying media object.
    pub fn same_media(&self, other: &MediaHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl PartialEq for MediaHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_media(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_media() {
        let a = MediaHandle::new(42_u32, "clip.mp4");
        let b = a.clone();
        assert!(a.same_media(&b));
        assert_eq!(b.downcast_ref::<u32>(), Some(&42));
        assert_eq!(a.label(), "clip.mp4");
    }

    #[test]
    fn distinct_handles_differ() {
        let a = MediaHandle::new(1_u8, "a");
        let b = MediaHandle::new(1_u8, "a");
        assert_ne!(a, b);
    }
}
