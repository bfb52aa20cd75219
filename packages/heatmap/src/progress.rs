//! Progress reporting for rasterization.
//!
//! The rasterizer reports how many shapes it has processed through
//! [`ProgressCallback`] so that the CLI can drive an `indicatif` bar while
//! the server and tests stay silent with [`NullProgress`].

/// Receives progress updates from a long-running rasterization.
///
/// Must be `Send + Sync`: the rasterizer holds it across `.await` points.
pub trait ProgressCallback: Send + Sync {
    /// Total number of shapes (rings + points) to process.
    fn set_total(&self, total: u64);

    /// Absolute number of shapes processed so far.
    fn set_position(&self, pos: u64);

    /// Advances the position by `delta`.
    fn inc(&self, delta: u64);

    /// Message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Rasterization completed.
    fn finish(&self, msg: String);

    /// Rasterization stopped early; removes the indicator.
    fn finish_and_clear(&self);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}
