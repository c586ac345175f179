//! Raw libopus entry points resolved from the loaded native binary.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uchar, c_void};
use std::path::Path;

use libloading::Library;

/// opus_int32 type (from opus_types.h)
pub type OpusInt32 = i32;

/// opus_int16 type (from opus_types.h)
pub type OpusInt16 = i16;

// Return codes
pub const OPUS_OK: c_int = 0;
pub const OPUS_BAD_ARG: c_int = -1;
pub const OPUS_INVALID_PACKET: c_int = -4;

// Application types
pub const OPUS_APPLICATION_AUDIO: c_int = 2049;

// CTL request codes
pub const OPUS_SET_BITRATE_REQUEST: c_int = 4002;

type GetSizeFn = unsafe extern "C" fn(channels: c_int) -> c_int;

type EncoderInitFn = unsafe extern "C" fn(
    st: *mut c_void,
    fs: OpusInt32,
    channels: c_int,
    application: c_int,
) -> c_int;

type EncoderCtlFn = unsafe extern "C" fn(st: *mut c_void, request: c_int, ...) -> c_int;

type EncodeFn = unsafe extern "C" fn(
    st: *mut c_void,
    pcm: *const OpusInt16,
    frame_size: c_int,
    data: *mut c_uchar,
    max_data_bytes: OpusInt32,
) -> OpusInt32;

type DecoderInitFn =
    unsafe extern "C" fn(st: *mut c_void, fs: OpusInt32, channels: c_int) -> c_int;

type DecodeFn = unsafe extern "C" fn(
    st: *mut c_void,
    data: *const c_uchar,
    len: OpusInt32,
    pcm: *mut OpusInt16,
    frame_size: c_int,
    decode_fec: c_int,
) -> c_int;

type StrerrorFn = unsafe extern "C" fn(error: c_int) -> *const c_char;

/// Function pointers into a loaded library.
///
/// The pointers stay valid for as long as `_lib` is alive, which is the
/// lifetime of this struct.
pub struct OpusApi {
    pub encoder_get_size: GetSizeFn,
    pub encoder_init: EncoderInitFn,
    pub encoder_ctl: EncoderCtlFn,
    pub encode: EncodeFn,
    pub decoder_get_size: GetSizeFn,
    pub decoder_init: DecoderInitFn,
    pub decode: DecodeFn,
    strerror: StrerrorFn,
    _lib: Library,
}

impl OpusApi {
    /// Loads the library at `path` and resolves every symbol the codec uses.
    ///
    /// # Safety
    ///
    /// Runs the library's initialisers. `path` must name a build of libopus
    /// whose exported symbols match the signatures above.
    pub unsafe fn load(path: &Path) -> Result<Self, libloading::Error> {
        unsafe {
            let lib = Library::new(path)?;
            let encoder_get_size = *lib.get::<GetSizeFn>(b"opus_encoder_get_size\0")?;
            let encoder_init = *lib.get::<EncoderInitFn>(b"opus_encoder_init\0")?;
            let encoder_ctl = *lib.get::<EncoderCtlFn>(b"opus_encoder_ctl\0")?;
            let encode = *lib.get::<EncodeFn>(b"opus_encode\0")?;
            let decoder_get_size = *lib.get::<GetSizeFn>(b"opus_decoder_get_size\0")?;
            let decoder_init = *lib.get::<DecoderInitFn>(b"opus_decoder_init\0")?;
            let decode = *lib.get::<DecodeFn>(b"opus_decode\0")?;
            let strerror = *lib.get::<StrerrorFn>(b"opus_strerror\0")?;
            Ok(Self {
                encoder_get_size,
                encoder_init,
                encoder_ctl,
                encode,
                decoder_get_size,
                decoder_init,
                decode,
                strerror,
                _lib: lib,
            })
        }
    }

    /// Gets an error message for an opus error code.
    pub fn error_string(&self, error: c_int) -> String {
        unsafe {
            let c_str = (self.strerror)(error);
            if c_str.is_null() {
                return format!("opus error {}", error);
            }
            CStr::from_ptr(c_str).to_string_lossy().into_owned()
        }
    }
}
