//! Opus codec facade.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::loader;
use crate::native::NativeBackend;
use crate::options::{CodecOptions, OptionsBuilder};
use crate::state::OpaqueState;

/// Checks that `offset..offset + length` lies inside a buffer of `size` bytes.
fn check_bounds(size: usize, offset: usize, length: usize) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::BufferBounds {
            offset,
            length,
            size,
        }),
    }
}

/// Encoding half of a codec. Owns the encoder state.
///
/// `&mut self` on every call serializes use of the state buffer; move the
/// encoder to another thread to encode there.
pub struct FrameEncoder {
    options: CodecOptions,
    state: OpaqueState,
    backend: Arc<dyn NativeBackend>,
}

impl FrameEncoder {
    fn new(options: CodecOptions, backend: Arc<dyn NativeBackend>) -> Result<Self> {
        let state = backend.create_encoder_state(
            options.sample_rate(),
            options.channels(),
            options.bit_rate(),
        )?;
        Ok(Self {
            options,
            state,
            backend,
        })
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Encodes one whole frame of raw PCM.
    pub fn encode(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        self.encode_frame(frame, 0, frame.len())
    }

    /// Encodes the frame stored at `data[offset..offset + length]`.
    ///
    /// `length` must be `channels * frame_size * 2`. Both checks run before
    /// the native library is called.
    pub fn encode_frame(&mut self, data: &[u8], offset: usize, length: usize) -> Result<Vec<u8>> {
        let expected = self.options.frame_bytes();
        if length != expected {
            return Err(Error::InvalidFrameLength {
                expected,
                actual: length,
            });
        }
        check_bounds(data.len(), offset, length)?;

        self.backend.encode(
            &mut self.state,
            &data[offset..offset + length],
            self.options.max_packet_size(),
            self.options.channels(),
            self.options.frame_size(),
        )
    }
}

impl Drop for FrameEncoder {
    fn drop(&mut self) {
        trace!(bytes = self.state.len(), "releasing encoder state");
        self.backend.release_state(&mut self.state);
    }
}

impl fmt::Debug for FrameEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameEncoder")
            .field("options", &self.options)
            .field("state", &self.state)
            .finish()
    }
}

/// Decoding half of a codec. Owns the decoder state.
pub struct FrameDecoder {
    options: CodecOptions,
    state: OpaqueState,
    backend: Arc<dyn NativeBackend>,
}

impl FrameDecoder {
    fn new(options: CodecOptions, backend: Arc<dyn NativeBackend>) -> Result<Self> {
        let state = backend.create_decoder_state(options.sample_rate(), options.channels())?;
        Ok(Self {
            options,
            state,
            backend,
        })
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Decodes one whole packet.
    pub fn decode(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        self.decode_frame(packet, 0, packet.len())
    }

    /// Decodes the packet stored at `data[offset..offset + length]` into
    /// interleaved little-endian 16-bit PCM.
    ///
    /// Packet sizes vary, so only the range is checked here; malformed
    /// packets come back from the native layer as [`Error::InvalidPacket`].
    /// A zero `length` requests packet loss concealment.
    pub fn decode_frame(&mut self, data: &[u8], offset: usize, length: usize) -> Result<Vec<u8>> {
        check_bounds(data.len(), offset, length)?;

        self.backend.decode(
            &mut self.state,
            &data[offset..offset + length],
            self.options.max_frame_size(),
            self.options.channels(),
        )
    }
}

impl Drop for FrameDecoder {
    fn drop(&mut self) {
        trace!(bytes = self.state.len(), "releasing decoder state");
        self.backend.release_state(&mut self.state);
    }
}

impl fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("options", &self.options)
            .field("state", &self.state)
            .finish()
    }
}

/// An Opus encoder/decoder pair sharing one configuration.
///
/// Construction allocates both native states; if either fails, nothing is
/// returned. The codec cannot be cloned: build another one for a second
/// independent stream.
///
/// # Thread Safety
///
/// Encoding and decoding each take `&mut self`. To encode on one thread and
/// decode on another, [`split`](Self::split) the codec into its halves.
#[derive(Debug)]
pub struct Codec {
    encoder: FrameEncoder,
    decoder: FrameDecoder,
}

impl Codec {
    /// Returns a builder filled with default values.
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Creates a codec on the process-wide native library, loading it first
    /// if needed.
    pub fn new(options: CodecOptions) -> Result<Self> {
        let backend = loader::ensure_loaded()?;
        Self::with_backend(options, backend)
    }

    /// Creates a codec on the given native backend.
    pub fn with_backend(options: CodecOptions, backend: Arc<dyn NativeBackend>) -> Result<Self> {
        let encoder = FrameEncoder::new(options, backend.clone())?;
        let decoder = FrameDecoder::new(options, backend)?;
        debug!(
            sample_rate = options.sample_rate().hz(),
            channels = options.channels().count(),
            bit_rate = options.bit_rate(),
            frame_size = options.frame_size(),
            "codec created"
        );
        Ok(Self { encoder, decoder })
    }

    /// The options this codec was created with.
    pub fn options(&self) -> &CodecOptions {
        self.encoder.options()
    }

    /// Encodes one whole frame of raw PCM.
    pub fn encode(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        self.encoder.encode(frame)
    }

    /// See [`FrameEncoder::encode_frame`].
    pub fn encode_frame(&mut self, data: &[u8], offset: usize, length: usize) -> Result<Vec<u8>> {
        self.encoder.encode_frame(data, offset, length)
    }

    /// Decodes one whole packet.
    pub fn decode(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        self.decoder.decode(packet)
    }

    /// See [`FrameDecoder::decode_frame`].
    pub fn decode_frame(&mut self, data: &[u8], offset: usize, length: usize) -> Result<Vec<u8>> {
        self.decoder.decode_frame(data, offset, length)
    }

    /// Separates the encoder and decoder so they can be used independently.
    pub fn split(self) -> (FrameEncoder, FrameDecoder) {
        (self.encoder, self.decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::stub::{self, StubBackend};
    use crate::options::SampleRate;

    fn stub() -> Arc<StubBackend> {
        Arc::new(StubBackend::default())
    }

    fn codec(builder: OptionsBuilder, backend: &Arc<StubBackend>) -> Codec {
        builder.build_with(backend.clone()).unwrap()
    }

    #[test]
    fn test_construct_allocates_both_states() {
        let backend = stub();
        let codec = codec(Codec::builder(), &backend);
        assert_eq!(backend.calls(), 2);
        assert_eq!(codec.options(), &CodecOptions::default());
    }

    #[test]
    fn test_valid_options_accept_exact_frame() {
        for rate in SampleRate::ALL {
            for channels in [1, 2] {
                for frame_size in [rate.hz() / 100, rate.hz() / 50] {
                    let backend = stub();
                    let mut codec = codec(
                        Codec::builder()
                            .sample_rate(rate.hz())
                            .channels(channels)
                            .frame_size(frame_size),
                        &backend,
                    );
                    let frame = vec![0u8; (channels * frame_size * 2) as usize];
                    assert!(codec.encode(&frame).is_ok(), "{rate:?} {channels} {frame_size}");
                }
            }
        }
    }

    #[test]
    fn test_invalid_options_create_no_state() {
        let backend = stub();
        let err = Codec::builder()
            .sample_rate(11025)
            .build_with(backend.clone())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn test_wrong_frame_length_skips_native() {
        let backend = stub();
        let mut codec = codec(Codec::builder().channels(2), &backend);
        let before = backend.calls();
        let expected = 2 * 960 * 2;

        for length in [0, 1, expected - 1, expected + 1, 960 * 2] {
            let data = vec![0u8; expected + 8];
            match codec.encode_frame(&data, 0, length) {
                Err(Error::InvalidFrameLength {
                    expected: e,
                    actual,
                }) => {
                    assert_eq!(e, expected);
                    assert_eq!(actual, length);
                }
                other => panic!("length {length}: {other:?}"),
            }
        }
        assert_eq!(backend.calls(), before);
    }

    #[test]
    fn test_encode_bounds() {
        let backend = stub();
        let mut codec = codec(Codec::builder(), &backend);
        let frame_bytes = codec.options().frame_bytes();
        let data = vec![0u8; frame_bytes + 10];

        assert!(codec.encode_frame(&data, 10, frame_bytes).is_ok());

        let before = backend.calls();
        let err = codec.encode_frame(&data, 11, frame_bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferBounds {
                offset: 11,
                size,
                ..
            } if size == frame_bytes + 10
        ));
        assert_eq!(backend.calls(), before);
    }

    #[test]
    fn test_encode_offset_overflow() {
        let backend = stub();
        let mut codec = codec(Codec::builder(), &backend);
        let frame_bytes = codec.options().frame_bytes();
        let err = codec
            .encode_frame(&[0u8; 16], usize::MAX, frame_bytes)
            .unwrap_err();
        assert!(matches!(err, Error::BufferBounds { .. }));
    }

    #[test]
    fn test_decode_bounds() {
        let backend = stub();
        let mut codec = codec(Codec::builder(), &backend);
        let data = [1u8, 2, 3, 4, 5, 6];

        assert!(codec.decode_frame(&data, 2, 4).is_ok());

        let before = backend.calls();
        let err = codec.decode_frame(&data, 3, 4).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferBounds {
                offset: 3,
                length: 4,
                size: 6
            }
        ));
        assert!(err.is_caller_error());
        assert_eq!(backend.calls(), before);
    }

    #[test]
    fn test_round_trip_silence() {
        let backend = stub();
        let mut codec = codec(Codec::builder().channels(2), &backend);
        let frame = vec![0u8; codec.options().frame_bytes()];

        let packet = codec.encode(&frame).unwrap();
        assert!(!packet.is_empty());
        assert!(packet.len() <= codec.options().max_packet_size());

        let pcm = codec.decode(&packet).unwrap();
        assert!(pcm.len() <= codec.options().max_pcm_bytes());
    }

    #[test]
    fn test_encode_does_not_touch_input() {
        let backend = stub();
        let mut codec = codec(Codec::builder(), &backend);
        let frame: Vec<u8> = (0..codec.options().frame_bytes()).map(|i| i as u8).collect();
        let copy = frame.clone();
        codec.encode(&frame).unwrap();
        assert_eq!(frame, copy);
    }

    #[test]
    fn test_identical_codecs_are_deterministic() {
        let backend = stub();
        let mut a = codec(Codec::builder(), &backend);
        let mut b = codec(Codec::builder(), &backend);
        let frames: Vec<Vec<u8>> = (0..5u8)
            .map(|n| vec![n; a.options().frame_bytes()])
            .collect();

        for frame in &frames {
            assert_eq!(a.encode(frame).unwrap(), b.encode(frame).unwrap());
        }
    }

    #[test]
    fn test_encoder_state_carries_across_calls() {
        let backend = stub();
        let mut codec = codec(Codec::builder(), &backend);
        let frame = vec![0u8; codec.options().frame_bytes()];
        let first = codec.encode(&frame).unwrap();
        let second = codec.encode(&frame).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_invalid_packet() {
        let backend = stub();
        let mut codec = codec(Codec::builder(), &backend);
        let err = codec.decode(&[0xFF, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, Error::InvalidPacket(_)));
        assert!(err.is_native_fault());
        assert!(!err.is_caller_error());
    }

    #[test]
    fn test_construction_is_all_or_nothing() {
        let backend = Arc::new(StubBackend {
            reject_decoder: true,
            ..Default::default()
        });
        let err = Codec::builder().build_with(backend.clone()).unwrap_err();
        assert!(matches!(err, Error::NativeInit { .. }));
        // The encoder state created before the failure is released.
        assert_eq!(backend.released(), 1);
    }

    #[test]
    fn test_rejected_bit_rate() {
        let backend = Arc::new(StubBackend {
            reject_bit_rate_above: Some(510_000),
            ..Default::default()
        });
        let err = Codec::builder()
            .bit_rate(1_000_000)
            .build_with(backend.clone())
            .unwrap_err();
        assert!(err.is_native_fault());
        assert_eq!(backend.released(), 0);
    }

    #[test]
    fn test_drop_releases_states() {
        let backend = stub();
        drop(codec(Codec::builder(), &backend));
        assert_eq!(backend.released(), 2);
    }

    #[test]
    fn test_split_halves_run_on_separate_threads() {
        let backend = stub();
        let codec = codec(Codec::builder(), &backend);
        let frame_bytes = codec.options().frame_bytes();
        let (mut encoder, mut decoder) = codec.split();

        std::thread::scope(|s| {
            s.spawn(move || {
                let frame = vec![0u8; frame_bytes];
                for _ in 0..50 {
                    encoder.encode(&frame).unwrap();
                }
            });
            s.spawn(move || {
                for _ in 0..50 {
                    let pcm = decoder.decode(&[1, 2]).unwrap();
                    assert_eq!(pcm.len(), stub::DECODED_SAMPLES * 2);
                }
            });
        });

        assert_eq!(backend.released(), 2);
        assert_eq!(backend.calls(), 2 + 100);
    }
}
