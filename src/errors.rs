//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`Error`] covers the failure modes that surface to a
//! caller:
//! - Configuration errors raised while constructing a resource object
//! - Reference access errors (out-of-range elements, destroyed references)
//! - Device acquisition and device-level failures
//! - Asynchronous load failures
//!
//! Everything that happens inside [`Director::tick`](crate::Director::tick)
//! is logged instead of returned: a broken resource never becomes complete,
//! and the frame is submitted without it.
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, Error>`.
//!
//! ```rust,ignore
//! use tessera::errors::{Error, Result};
//!
//! fn build() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the crate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A required description field was not supplied.
    #[error("Missing required field `{field}` in {context}")]
    MissingField {
        /// Description being built
        context: String,
        /// Name of the missing field
        field: &'static str,
    },

    /// A region extends past the declared byte size of its buffer.
    #[error("Region `{region}` ends at byte {end}, past buffer size {size}")]
    RegionOverflow {
        /// Region (reference) name
        region: String,
        /// Exclusive end offset of the region
        end: u64,
        /// Declared buffer size
        size: u64,
    },

    /// A region offset overlaps its predecessor or violates its alignment.
    #[error("Invalid offset {offset} for region `{region}`: {reason}")]
    InvalidOffset {
        /// Region (reference) name
        region: String,
        /// Requested offset
        offset: u64,
        /// Why the offset was rejected
        reason: &'static str,
    },

    /// The declared buffer size does not match the extent of its regions.
    #[error("Buffer `{label}` declares {declared} bytes but its regions cover {computed}")]
    SizeMismatch {
        /// Buffer label
        label: String,
        /// Declared size
        declared: u64,
        /// Extent computed from regions
        computed: u64,
    },

    /// A buffer already holds a region with this name.
    #[error("Buffer `{label}` already has a region named `{region}`")]
    DuplicateRegion {
        /// Buffer label
        label: String,
        /// Region (reference) name
        region: String,
    },

    /// Element type has no usable size.
    #[error("Unsupported array element type: {0}")]
    UnsupportedElementType(String),

    /// Element data does not match the reference's element size.
    #[error("Element size mismatch: expected {expected} bytes, got {actual}")]
    ElementSize {
        /// Element size of the reference
        expected: usize,
        /// Size of the supplied data
        actual: usize,
    },

    /// A block field was assigned a value of a different type.
    #[error("Field `{field}` expects {expected}, got {actual}")]
    FieldType {
        /// Field name
        field: String,
        /// Declared type
        expected: &'static str,
        /// Supplied type
        actual: &'static str,
    },

    /// A block field name is unknown or declared twice.
    #[error("Invalid block field `{0}`")]
    InvalidField(String),

    /// A buffer of the wrong kind was used in a binding slot.
    #[error("Buffer `{label}` cannot be used as {expected}")]
    IncompatibleBuffer {
        /// Buffer label
        label: String,
        /// The slot kind that was requested
        expected: &'static str,
    },

    /// Two binding entries claim the same `(group, binding)` slot.
    #[error("Binding slot (group {group}, binding {binding}) declared twice in `{label}`")]
    DuplicateBinding {
        /// Binding label
        label: String,
        /// Bind group index
        group: u32,
        /// Binding index
        binding: u32,
    },

    /// Two vertex attributes of one binding share a shader location.
    #[error("Vertex location {location} supplied twice in `{label}`")]
    DuplicateLocation {
        /// Binding label
        label: String,
        /// Shader location
        location: u32,
    },

    /// Alignment values must be non-zero powers of two.
    #[error("Invalid alignment {0}: must be a power of two")]
    InvalidAlignment(u64),

    /// A stage with this name is already registered.
    #[error("Stage `{0}` is already registered")]
    DuplicateStage(String),

    /// The pass kind cannot accept this pipeline kind.
    #[error("Pass `{pass}` cannot execute pipeline `{pipeline}`")]
    PipelineKindMismatch {
        /// Pass label
        pass: String,
        /// Pipeline label
        pipeline: String,
    },

    // ========================================================================
    // Access Errors
    // ========================================================================
    /// Element index is outside the reference's bounds.
    #[error("Index {index} out of range (length {len})")]
    OutOfRange {
        /// The invalid index
        index: usize,
        /// Number of elements
        len: usize,
    },

    /// The reference has been released by its last holder.
    #[error("Reference `{0}` has been destroyed")]
    Destroyed(String),

    /// The handle does not refer to a live object.
    #[error("Unknown {0} handle")]
    UnknownHandle(&'static str),

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(String),

    /// The device rejected a shader module.
    #[error("Shader `{label}` failed to compile: {message}")]
    ShaderCompilation {
        /// Shader label
        label: String,
        /// Device diagnostics
        message: String,
    },

    /// Generic device-side rejection of a descriptor.
    #[error("Device error: {0}")]
    Device(String),

    // ========================================================================
    // Async Load Errors
    // ========================================================================
    /// Background load failed.
    #[error("Load failed: {0}")]
    LoadFailed(String),

    /// The load was cancelled or its producer went away.
    #[error("Load cancelled")]
    LoadCancelled,
}

// ============================================================================
// Convenient conversion implementations
// ============================================================================

impl From<wgpu::RequestDeviceError> for Error {
    fn from(err: wgpu::RequestDeviceError) -> Self {
        Error::DeviceCreateFailed(err.to_string())
    }
}

impl From<wgpu::CreateSurfaceError> for Error {
    fn from(err: wgpu::CreateSurfaceError) -> Self {
        Error::AdapterRequestFailed(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::LoadFailed(err.to_string())
    }
}

/// Alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
