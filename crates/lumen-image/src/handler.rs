//! Receivers for image load results.

use crate::decode::DecodedImage;
use crate::error::LoadError;
use crate::task::LoadTicket;

/// Receives the outcome of image loads on the callback context.
///
/// Both methods run on the task's callback context, one call at a time and
/// in submission order. Neither is ever called for a load that was
/// superseded or cancelled.
pub trait ImageLoadHandler: Send + 'static {
    /// Called once for every load that completed and was still current.
    fn on_image_loaded(&mut self, ticket: LoadTicket, image: DecodedImage);

    /// Called once for every load that failed and was still current.
    ///
    /// The default implementation logs the failure.
    fn on_load_failed(&mut self, ticket: LoadTicket, error: LoadError) {
        tracing::warn!(
            target: lumen_core::logging::targets::IMAGE,
            ticket = ticket.id(),
            %error,
            "image load failed"
        );
    }
}

/// An [`ImageLoadHandler`] built from two closures.
pub struct FnHandler<L, F> {
    loaded: L,
    failed: F,
}

impl<L, F> ImageLoadHandler for FnHandler<L, F>
where
    L: FnMut(LoadTicket, DecodedImage) + Send + 'static,
    F: FnMut(LoadTicket, LoadError) + Send + 'static,
{
    fn on_image_loaded(&mut self, ticket: LoadTicket, image: DecodedImage) {
        (self.loaded)(ticket, image);
    }

    fn on_load_failed(&mut self, ticket: LoadTicket, error: LoadError) {
        (self.failed)(ticket, error);
    }
}

/// Build a handler from a success closure and a failure closure.
///
/// # Example
///
/// ```
/// use lumen_image::handler_fn;
///
/// let handler = handler_fn(
///     |ticket, image| println!("{ticket:?}: {}x{}", image.width(), image.height()),
///     |ticket, error| eprintln!("{ticket:?} failed: {error}"),
/// );
/// # let _ = handler;
/// ```
pub fn handler_fn<L, F>(loaded: L, failed: F) -> FnHandler<L, F>
where
    L: FnMut(LoadTicket, DecodedImage) + Send + 'static,
    F: FnMut(LoadTicket, LoadError) + Send + 'static,
{
    FnHandler { loaded, failed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct OnlyLoaded(Vec<u64>);

    impl ImageLoadHandler for OnlyLoaded {
        fn on_image_loaded(&mut self, ticket: LoadTicket, _image: DecodedImage) {
            self.0.push(ticket.id());
        }
    }

    #[test]
    fn test_fn_handler_dispatches() {
        let loaded = Arc::new(Mutex::new(Vec::new()));
        let failed = Arc::new(Mutex::new(Vec::new()));

        let loaded_clone = loaded.clone();
        let failed_clone = failed.clone();
        let mut handler = handler_fn(
            move |ticket: LoadTicket, image: DecodedImage| {
                loaded_clone.lock().push((ticket, image.width()))
            },
            move |ticket: LoadTicket, error: LoadError| {
                failed_clone.lock().push((ticket, error.is_decode()))
            },
        );
        handler.on_image_loaded(LoadTicket::new(1), DecodedImage::new(RgbaImage::new(2, 2), None));
        handler.on_load_failed(LoadTicket::new(2), LoadError::Decode("bad".into()));

        assert_eq!(*loaded.lock(), vec![(LoadTicket::new(1), 2)]);
        assert_eq!(*failed.lock(), vec![(LoadTicket::new(2), true)]);
    }

    #[test]
    fn test_default_failure_hook_is_harmless() {
        let mut handler = OnlyLoaded(Vec::new());
        handler.on_load_failed(LoadTicket::new(5), LoadError::Disposed);
        handler.on_image_loaded(LoadTicket::new(6), DecodedImage::new(RgbaImage::new(1, 1), None));
        assert_eq!(handler.0, vec![6]);
    }
}
