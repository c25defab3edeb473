//! CPAL output: drives a [`Mixer`] from the device callback.
//!
//! The callback renders float frames from the mixer into a staging buffer and
//! converts them to the device's sample format (F32, I16 or U16).

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::config::BufferSize;
use crate::error::{EngineError, EngineResult};
use crate::mixer::Mixer;

fn device_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Device(e.to_string())
}

/// Names of the default host's output devices.
pub fn list_output_devices() -> EngineResult<Vec<String>> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for dev in host.output_devices().map_err(device_err)? {
        names.push(dev.name().map_err(device_err)?);
    }
    Ok(names)
}

fn pick_device(name: Option<&str>) -> EngineResult<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        for d in host.output_devices().map_err(device_err)? {
            if d.name().map_err(device_err)? == name {
                return Ok(d);
            }
        }
        return Err(EngineError::Device(format!("requested device not found: {name}")));
    }
    host.default_output_device().ok_or(EngineError::NoOutputDevice)
}

/// Closest supported config to the mixer's rate and channel count.
fn choose_config(device: &cpal::Device, sr: u32, ch: u16) -> EngineResult<cpal::SupportedStreamConfig> {
    let mut best: Option<(u64, cpal::SupportedStreamConfigRange)> = None;
    for range in device.supported_output_configs().map_err(device_err)? {
        let sr_min = range.min_sample_rate().0;
        let sr_max = range.max_sample_rate().0;
        let ch_pen = u64::from(range.channels().abs_diff(ch));
        let sr_pen = if (sr_min..=sr_max).contains(&sr) {
            0
        } else {
            u64::from(sr_min.abs_diff(sr).min(sr_max.abs_diff(sr)))
        };
        let score = sr_pen.saturating_mul(1000) + ch_pen;
        if best.as_ref().map_or(true, |(s, _)| score < *s) {
            best = Some((score, range));
        }
    }
    let (_, range) = best.ok_or_else(|| EngineError::Device("no supported output configs".into()))?;
    let rate = sr.clamp(range.min_sample_rate().0, range.max_sample_rate().0);
    Ok(range.with_sample_rate(cpal::SampleRate(rate)))
}

fn build_stream<T>(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    mixer: Arc<Mixer>,
) -> EngineResult<cpal::Stream>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let mut staging = vec![0.0_f32; usize::from(cfg.channels) * mixer.config().block_frames];
    let err_fn = |e: cpal::StreamError| log::error!("[cpal] stream error: {e}");
    device
        .build_output_stream(
            cfg,
            move |output: &mut [T], _| {
                if staging.len() < output.len() {
                    staging.resize(output.len(), 0.0);
                }
                let floats = &mut staging[..output.len()];
                mixer.render(floats);
                for (o, s) in output.iter_mut().zip(floats.iter()) {
                    *o = T::from_sample(*s);
                }
            },
            err_fn,
            None,
        )
        .map_err(device_err)
}

/// A running output stream. Dropping it stops playback.
pub struct OutputDevice {
    stream: cpal::Stream,
    name: String,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
}

impl OutputDevice {
    /// Open `device_name` (or the default device) at the mixer's format and
    /// start pulling from it.
    pub fn open(mixer: Arc<Mixer>, device_name: Option<&str>, buffer: BufferSize) -> EngineResult<Self> {
        let device = pick_device(device_name)?;
        let name = device.name().map_err(device_err)?;
        let format = mixer.format();
        let supported = choose_config(&device, format.sample_rate, format.channels)?;
        let sample_format = supported.sample_format();
        let mut config = supported.config();
        config.sample_rate = cpal::SampleRate(format.sample_rate);
        config.channels = format.channels;
        config.buffer_size = match buffer {
            BufferSize::Default => cpal::BufferSize::Default,
            BufferSize::Fixed(frames) => cpal::BufferSize::Fixed(frames),
        };

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer)?,
            other => {
                return Err(EngineError::Device(format!("unsupported device sample format: {other:?}")))
            }
        };
        stream.play().map_err(device_err)?;
        log::info!("output '{name}': {config:?} ({sample_format:?})");
        Ok(Self { stream, name, config, sample_format })
    }

    #[inline] pub fn name(&self) -> &str { &self.name }
    #[inline] pub fn config(&self) -> &cpal::StreamConfig { &self.config }
    #[inline] pub fn sample_format(&self) -> cpal::SampleFormat { self.sample_format }

    pub fn pause(&self) -> EngineResult<()> {
        self.stream.pause().map_err(device_err)
    }

    pub fn resume(&self) -> EngineResult<()> {
        self.stream.play().map_err(device_err)
    }
}
