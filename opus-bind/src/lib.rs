//! Opus encoding and decoding through a dynamically loaded native library.
//!
//! The codec itself lives in a platform binary (`libopus-jni-native.so`,
//! `libopus-jni-native.dylib` or `opus-jni-native.dll`). This crate finds,
//! extracts and loads that binary once per process, owns the encoder and
//! decoder state buffers, and checks every frame length and buffer range
//! before anything crosses into native code.
//!
//! # Usage
//!
//! ```no_run
//! use opus_bind::{loader, Codec};
//!
//! loader::setup_ephemeral()?;
//!
//! let mut codec = Codec::builder()
//!     .sample_rate(48000)
//!     .channels(2)
//!     .bit_rate(96000)
//!     .build()?;
//!
//! let pcm = vec![0u8; codec.options().frame_bytes()];
//! let packet = codec.encode(&pcm)?;
//! let decoded = codec.decode(&packet)?;
//! # Ok::<(), opus_bind::Error>(())
//! ```
//!
//! # Native Library
//!
//! The binary comes from the resource registry: either embedded at build
//! time (set `OPUS_JNI_NATIVE_BINARIES` to a directory holding the platform
//! binaries) or registered at runtime with
//! [`resources::register_native_binary`]. A persistent install can be used
//! instead of a temporary one via [`loader::extract_to`] and
//! [`loader::load_from`], or by pointing `OPUS_JNI_NATIVE_DIR` at it.
//!
//! # Thread Safety
//!
//! Loading is guarded by a process-wide one-time latch. A [`Codec`] is
//! `Send`; each of its encode and decode paths takes `&mut self`. Use
//! [`Codec::split`] to drive encoding and decoding from different threads.

mod codec;
mod error;
mod ffi;
pub mod loader;
mod native;
mod options;
pub mod platform;
pub mod resources;
mod state;

pub use codec::{Codec, FrameDecoder, FrameEncoder};
pub use error::{Error, Result};
pub use native::{NativeBackend, NativeLibrary};
pub use options::{Channels, CodecOptions, OptionsBuilder, SampleRate};
pub use platform::{resolve_library_name, resolve_library_name_for, Platform};
pub use state::OpaqueState;
