use crate::error::PresentationError;

/// What the next committed frame shows.
#[derive(Debug)]
pub enum Frame<'a, C> {
    Stimulus(&'a C),
    Fixation,
    Blank,
}

impl<C> Clone for Frame<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Frame<'_, C> {}

/// Display the scheduler draws on.
pub trait PresentationSurface {
    type Content;

    /// Stages the next frame. Must not block on the display.
    fn prepare(&mut self, frame: Frame<'_, Self::Content>) -> Result<(), PresentationError>;

    /// Shows the staged frame, blocking until it is on screen, and calls
    /// `on_flip` at the flip.
    fn commit(&mut self, on_flip: &mut dyn FnMut()) -> Result<(), PresentationError>;
}
