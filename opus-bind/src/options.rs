//! Codec configuration.
//!
//! [`OptionsBuilder`] stores whatever it is given; [`OptionsBuilder::validate`]
//! is the only way to obtain a [`CodecOptions`], so every options value in
//! circulation has passed validation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::native::NativeBackend;

/// Sample rates supported by the native codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleRate {
    Hz8000,
    Hz12000,
    Hz16000,
    Hz24000,
    Hz48000,
}

impl SampleRate {
    /// All supported sample rates, ascending.
    pub const ALL: [SampleRate; 5] = [
        Self::Hz8000,
        Self::Hz12000,
        Self::Hz16000,
        Self::Hz24000,
        Self::Hz48000,
    ];

    /// Returns the sample rate in Hz.
    pub fn hz(self) -> i32 {
        match self {
            Self::Hz8000 => 8000,
            Self::Hz12000 => 12000,
            Self::Hz16000 => 16000,
            Self::Hz24000 => 24000,
            Self::Hz48000 => 48000,
        }
    }
}

impl TryFrom<i32> for SampleRate {
    type Error = Error;

    fn try_from(hz: i32) -> Result<Self> {
        Self::ALL.into_iter().find(|r| r.hz() == hz).ok_or_else(|| {
            Error::InvalidConfiguration(format!(
                "invalid sample rate {hz}, can only be one of 48000, 24000, 16000, 12000 or 8000"
            ))
        })
    }
}

/// Channel layout of the PCM data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channels {
    Mono,
    Stereo,
}

impl Channels {
    /// Returns the number of interleaved channels.
    pub fn count(self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

impl TryFrom<i32> for Channels {
    type Error = Error;

    fn try_from(n: i32) -> Result<Self> {
        match n {
            1 => Ok(Self::Mono),
            2 => Ok(Self::Stereo),
            _ => Err(Error::InvalidConfiguration(format!(
                "channels must be 1 or 2, got {n}"
            ))),
        }
    }
}

/// Validated, immutable codec configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OptionsBuilder", into = "OptionsBuilder")]
pub struct CodecOptions {
    frame_size: usize,
    sample_rate: SampleRate,
    channels: Channels,
    bit_rate: i32,
    max_frame_size: usize,
    max_packet_size: usize,
}

impl CodecOptions {
    /// Returns a builder filled with default values.
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Samples per channel in one encoded frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    /// Returns the channel layout.
    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Target bit rate in bits per second.
    pub fn bit_rate(&self) -> i32 {
        self.bit_rate
    }

    /// Upper bound on decoded samples per channel.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Upper bound on the size of one encoded packet in bytes.
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Byte length of one PCM frame: `channels * frame_size * 2`.
    pub fn frame_bytes(&self) -> usize {
        self.channels.count() * self.frame_size * 2
    }

    /// Largest PCM output a single decode can produce: `channels * max_frame_size * 2`.
    pub fn max_pcm_bytes(&self) -> usize {
        self.channels.count() * self.max_frame_size * 2
    }
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            frame_size: 960,
            sample_rate: SampleRate::Hz48000,
            channels: Channels::Mono,
            bit_rate: 64000,
            max_frame_size: 6 * 960,
            max_packet_size: 3 * 1276,
        }
    }
}

/// Staging area for [`CodecOptions`].
///
/// Setters store raw values; nothing is checked until [`validate`](Self::validate)
/// (or [`build`](Self::build)) runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsBuilder {
    pub frame_size: i32,
    pub sample_rate: i32,
    pub channels: i32,
    pub bit_rate: i32,
    pub max_frame_size: i32,
    pub max_packet_size: i32,
}

impl Default for OptionsBuilder {
    fn default() -> Self {
        CodecOptions::default().into()
    }
}

impl OptionsBuilder {
    /// Creates a builder holding the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the samples per channel in one encoded frame.
    pub fn frame_size(mut self, frame_size: i32) -> Self {
        self.frame_size = frame_size;
        self
    }

    /// Sets the sample rate in Hz. 8, 12, 16, 24 and 48 kHz are supported.
    pub fn sample_rate(mut self, sample_rate: i32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Sets the channel count, 1 or 2.
    pub fn channels(mut self, channels: i32) -> Self {
        self.channels = channels;
        self
    }

    /// Sets the target bit rate in bits per second.
    pub fn bit_rate(mut self, bit_rate: i32) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    /// Sets the upper bound on decoded samples per channel.
    pub fn max_frame_size(mut self, max_frame_size: i32) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Sets the upper bound on one encoded packet in bytes.
    pub fn max_packet_size(mut self, max_packet_size: i32) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    /// Checks every field and returns the resulting options.
    pub fn validate(&self) -> Result<CodecOptions> {
        Ok(CodecOptions {
            frame_size: positive("frame size", self.frame_size)?,
            sample_rate: SampleRate::try_from(self.sample_rate)?,
            channels: Channels::try_from(self.channels)?,
            bit_rate: positive("bit rate", self.bit_rate)? as i32,
            max_frame_size: positive("max frame size", self.max_frame_size)?,
            max_packet_size: positive("max packet size", self.max_packet_size)?,
        })
    }

    /// Validates and creates a codec on the process-wide native library,
    /// setting the library up first if no load has happened yet.
    pub fn build(&self) -> Result<Codec> {
        Codec::new(self.validate()?)
    }

    /// Validates and creates a codec on the given backend.
    pub fn build_with(&self, backend: Arc<dyn NativeBackend>) -> Result<Codec> {
        Codec::with_backend(self.validate()?, backend)
    }
}

impl From<CodecOptions> for OptionsBuilder {
    fn from(opts: CodecOptions) -> Self {
        // Every validated field fits in i32: it either started as one or is an
        // enum with values below i32::MAX.
        Self {
            frame_size: opts.frame_size as i32,
            sample_rate: opts.sample_rate.hz(),
            channels: opts.channels.count() as i32,
            bit_rate: opts.bit_rate,
            max_frame_size: opts.max_frame_size as i32,
            max_packet_size: opts.max_packet_size as i32,
        }
    }
}

impl TryFrom<OptionsBuilder> for CodecOptions {
    type Error = Error;

    fn try_from(builder: OptionsBuilder) -> Result<Self> {
        builder.validate()
    }
}

fn positive(field: &str, value: i32) -> Result<usize> {
    if value <= 0 {
        return Err(Error::InvalidConfiguration(format!(
            "{field} must be positive, got {value}"
        )));
    }
    Ok(value as usize)
}
