//! Opaque native state buffers.

use std::ffi::c_void;
use std::fmt;

/// Memory owned by Rust but laid out and interpreted only by the native codec.
///
/// The buffer is zeroed on creation and never resized. It cannot be cloned,
/// read or written from Rust: the only access is the raw pointer handed to
/// the native library. Storage is backed by `u64` words so the native side
/// sees 8-byte alignment.
pub struct OpaqueState {
    words: Box<[u64]>,
    len: usize,
}

impl OpaqueState {
    /// Allocates a zeroed buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        let words = vec![0u64; len.div_ceil(size_of::<u64>())].into_boxed_slice();
        Self { words, len }
    }

    /// Size in bytes as requested by the native library.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pointer to the start of the buffer, valid for `len()` bytes while
    /// `self` is alive and not moved out of its box.
    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.words.as_mut_ptr().cast()
    }
}

impl fmt::Debug for OpaqueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueState").field("len", &self.len).finish()
    }
}
