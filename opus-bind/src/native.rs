//! The boundary to the native codec.
//!
//! [`NativeBackend`] is the contract every encode/decode call crosses.
//! Callers validate lengths and ranges before calling in; implementations
//! may rely on that.

use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::ptr;

use crate::error::{Error, Result};
use crate::ffi::{self, OpusApi};
use crate::options::{Channels, SampleRate};
use crate::state::OpaqueState;

/// Operations provided by a native codec implementation.
///
/// State buffers are created once per codec and passed back on every call.
/// An implementation must not keep references to them between calls.
pub trait NativeBackend: Send + Sync {
    /// Allocates and initialises encoder state.
    fn create_encoder_state(
        &self,
        sample_rate: SampleRate,
        channels: Channels,
        bit_rate: i32,
    ) -> Result<OpaqueState>;

    /// Allocates and initialises decoder state.
    fn create_decoder_state(
        &self,
        sample_rate: SampleRate,
        channels: Channels,
    ) -> Result<OpaqueState>;

    /// Encodes one frame of interleaved little-endian 16-bit PCM.
    ///
    /// `pcm.len()` is exactly `channels * frame_size * 2`. The returned packet
    /// is at most `max_packet_size` bytes.
    fn encode(
        &self,
        state: &mut OpaqueState,
        pcm: &[u8],
        max_packet_size: usize,
        channels: Channels,
        frame_size: usize,
    ) -> Result<Vec<u8>>;

    /// Decodes one packet into interleaved little-endian 16-bit PCM of at
    /// most `max_frame_size` samples per channel. An empty packet is treated
    /// as lost.
    fn decode(
        &self,
        state: &mut OpaqueState,
        packet: &[u8],
        max_frame_size: usize,
        channels: Channels,
    ) -> Result<Vec<u8>>;

    /// Called once when the owner of a state buffer goes away.
    fn release_state(&self, _state: &mut OpaqueState) {}
}

/// libopus loaded from a native binary on disk.
pub struct NativeLibrary {
    api: OpusApi,
    path: PathBuf,
}

impl NativeLibrary {
    /// Performs the OS-level load. Errors carry the loader's message.
    pub(crate) fn open(path: &Path) -> std::result::Result<Self, String> {
        // Safety: the file is the libopus build named by the platform table.
        let api = unsafe { OpusApi::load(path) }
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        Ok(Self {
            api,
            path: path.to_path_buf(),
        })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_error(&self, code: c_int) -> Error {
        Error::NativeInit {
            code,
            message: self.api.error_string(code),
        }
    }

    fn state_size(
        &self,
        get_size: unsafe extern "C" fn(c_int) -> c_int,
        channels: Channels,
    ) -> Result<usize> {
        let size = unsafe { get_size(channels.count() as c_int) };
        if size <= 0 {
            return Err(Error::NativeInit {
                code: ffi::OPUS_BAD_ARG,
                message: "channels must be 1 or 2".into(),
            });
        }
        Ok(size as usize)
    }
}

impl NativeBackend for NativeLibrary {
    fn create_encoder_state(
        &self,
        sample_rate: SampleRate,
        channels: Channels,
        bit_rate: i32,
    ) -> Result<OpaqueState> {
        let size = self.state_size(self.api.encoder_get_size, channels)?;
        let mut state = OpaqueState::zeroed(size);

        let ret = unsafe {
            (self.api.encoder_init)(
                state.as_mut_ptr(),
                sample_rate.hz(),
                channels.count() as c_int,
                ffi::OPUS_APPLICATION_AUDIO,
            )
        };
        if ret != ffi::OPUS_OK {
            return Err(self.init_error(ret));
        }

        let ret = unsafe {
            (self.api.encoder_ctl)(state.as_mut_ptr(), ffi::OPUS_SET_BITRATE_REQUEST, bit_rate)
        };
        if ret != ffi::OPUS_OK {
            return Err(self.init_error(ret));
        }

        Ok(state)
    }

    fn create_decoder_state(
        &self,
        sample_rate: SampleRate,
        channels: Channels,
    ) -> Result<OpaqueState> {
        let size = self.state_size(self.api.decoder_get_size, channels)?;
        let mut state = OpaqueState::zeroed(size);

        let ret = unsafe {
            (self.api.decoder_init)(state.as_mut_ptr(), sample_rate.hz(), channels.count() as c_int)
        };
        if ret != ffi::OPUS_OK {
            return Err(self.init_error(ret));
        }

        Ok(state)
    }

    fn encode(
        &self,
        state: &mut OpaqueState,
        pcm: &[u8],
        max_packet_size: usize,
        channels: Channels,
        frame_size: usize,
    ) -> Result<Vec<u8>> {
        check_frame_len(pcm, channels, frame_size)?;

        let input: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        let mut output = vec![0u8; max_packet_size];

        let n = unsafe {
            (self.api.encode)(
                state.as_mut_ptr(),
                input.as_ptr(),
                frame_size as c_int,
                output.as_mut_ptr(),
                max_packet_size.min(i32::MAX as usize) as i32,
            )
        };

        if n < 0 {
            return Err(Error::NativeEncode {
                code: n,
                message: self.api.error_string(n),
            });
        }

        output.truncate(n as usize);
        Ok(output)
    }

    fn decode(
        &self,
        state: &mut OpaqueState,
        packet: &[u8],
        max_frame_size: usize,
        channels: Channels,
    ) -> Result<Vec<u8>> {
        let len = i32::try_from(packet.len()).map_err(|_| {
            Error::InvalidPacket(format!("packet of {} bytes is too large", packet.len()))
        })?;
        let data = if packet.is_empty() {
            ptr::null()
        } else {
            packet.as_ptr()
        };
        let mut output = vec![0i16; max_frame_size * channels.count()];

        let n = unsafe {
            (self.api.decode)(
                state.as_mut_ptr(),
                data,
                len,
                output.as_mut_ptr(),
                max_frame_size.min(i32::MAX as usize) as c_int,
                0, // decode_fec
            )
        };

        if n == ffi::OPUS_INVALID_PACKET {
            return Err(Error::InvalidPacket(self.api.error_string(n)));
        }
        if n < 0 {
            return Err(Error::NativeDecode {
                code: n,
                message: self.api.error_string(n),
            });
        }

        let samples = (n as usize).min(max_frame_size) * channels.count();
        Ok(output[..samples]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect())
    }
}

// The native encoder reads exactly one frame from the input pointer.
fn check_frame_len(pcm: &[u8], channels: Channels, frame_size: usize) -> Result<()> {
    let expected = channels.count() * frame_size * 2;
    if pcm.len() != expected {
        return Err(Error::InvalidFrameLength {
            expected,
            actual: pcm.len(),
        });
    }
    Ok(())
}
