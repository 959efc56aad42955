//! The one place in this crate where a propagating [`Result`] makes sense:
//! acquiring the raw backing region before any allocator exists.

use thiserror::Error;

/// Failure to obtain a backing region from the system allocator.
#[derive(Debug, Error)]
pub enum BackingMemoryError {
    /// `size`/`align` do not describe a valid [`core::alloc::Layout`].
    #[error("invalid backing-memory layout: size={size}, align={align}")]
    LayoutError { size: usize, align: usize },

    /// The system allocator returned null for this layout.
    #[error("system allocator failed to provide {size} bytes aligned to {align}")]
    AllocationFailed { size: usize, align: usize },
}
