//! cpal-backed engines.
//!
//! Both engines render mono `f32` frames through [`build_output_stream`], which
//! copies each frame to every device channel and converts to the device format.

pub mod buffered;
pub mod device;
pub mod streaming;

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

pub use buffered::CpalBufferedOutput;
pub use streaming::CpalStreamingOutput;

/// Build a cpal output stream that pulls mono frames from `render`.
///
/// `render` receives a scratch slice with one `f32` per output frame and must
/// fill all of it (silence included). It runs on the audio thread.
pub(crate) fn build_output_stream<R, E>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    render: R,
    on_error: E,
) -> Result<cpal::Stream>
where
    R: FnMut(&mut [f32]) + Send + 'static,
    E: FnMut(cpal::StreamError) + Send + 'static,
{
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32, _, _>(device, config, render, on_error),
        cpal::SampleFormat::I16 => build_stream::<i16, _, _>(device, config, render, on_error),
        cpal::SampleFormat::I32 => build_stream::<i32, _, _>(device, config, render, on_error),
        cpal::SampleFormat::U16 => build_stream::<u16, _, _>(device, config, render, on_error),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T, R, E>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut render: R,
    on_error: E,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
    R: FnMut(&mut [f32]) + Send + 'static,
    E: FnMut(cpal::StreamError) + Send + 'static,
{
    let channels_out = usize::from(config.channels).max(1);
    let mut mono: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let frames = data.len() / channels_out;
            if mono.len() < frames {
                mono.resize(frames, 0.0);
            }
            render(&mut mono[..frames]);
            for (frame, out) in data.chunks_mut(channels_out).enumerate() {
                let sample = <T as cpal::Sample>::from_sample::<f32>(mono.get(frame).copied().unwrap_or(0.0));
                out.fill(sample);
            }
        },
        on_error,
        None,
    )?;

    Ok(stream)
}
