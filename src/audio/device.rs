use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleFormat, Stream, StreamConfig};
use log::{debug, info, warn};

use crate::audio::resampler::LinearResampler;
use crate::audio::{lock, PcmBlock, PlaybackSink};
use crate::error::AudioError;

/// How long `push` sleeps while the device drains an over-full queue
const DRAIN_POLL: Duration = Duration::from_millis(5);

/// Manages audio device enumeration and selection
pub struct DeviceManager {
    host: Host,
    devices: HashMap<String, Device>,
    current_device: Option<Device>,
}

impl DeviceManager {
    /// Create a new DeviceManager instance
    pub fn new() -> Result<Self, AudioError> {
        let mut manager = DeviceManager {
            host: cpal::default_host(),
            devices: HashMap::new(),
            current_device: None,
        };

        manager.refresh_devices()?;
        Ok(manager)
    }

    /// Refresh the list of available output devices
    pub fn refresh_devices(&mut self) -> Result<(), AudioError> {
        self.devices.clear();

        let devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?;

        for device in devices {
            match device.name() {
                Ok(name) => {
                    self.devices.insert(name, device);
                }
                Err(e) => debug!("Skipping output device without a name: {}", e),
            }
        }

        Ok(())
    }

    /// Names of all available output devices, sorted
    pub fn list_devices(&self) -> Vec<String> {
        let mut names: Vec<String> = self.devices.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select a device by name, or the host default when `None`
    pub fn select_device(&mut self, device_name: Option<&str>) -> Result<(), AudioError> {
        match device_name {
            Some(name) => {
                let device = self.devices.get(name).cloned().ok_or_else(|| AudioError::DeviceNotFound {
                    device: name.to_string(),
                })?;
                self.current_device = Some(device);
                Ok(())
            }
            None => self.select_default_device(),
        }
    }

    /// Select the default audio device
    pub fn select_default_device(&mut self) -> Result<(), AudioError> {
        let default_device = self
            .host
            .default_output_device()
            .ok_or_else(|| AudioError::InitializationFailed("No default output device available".to_string()))?;

        self.current_device = Some(default_device);
        Ok(())
    }

    pub fn current_device(&self) -> Option<&Device> {
        self.current_device.as_ref()
    }

    /// Get the name of the currently selected device
    pub fn current_device_name(&self) -> Result<Option<String>, AudioError> {
        match &self.current_device {
            Some(device) => {
                let name = device
                    .name()
                    .map_err(|e| AudioError::InitializationFailed(format!("Failed to get device name: {}", e)))?;
                Ok(Some(name))
            }
            None => Ok(None),
        }
    }
}

/// Playback sink backed by a cpal output stream.
///
/// The stream lives on its own "audio-output" thread and pulls interleaved f32 samples from
/// a shared queue. `push` converts each decoded block to the device format, resampling and
/// remapping channels as needed, and blocks while more than `max_latency` of audio is queued.
pub struct CpalSink {
    queue: Arc<Mutex<VecDeque<f32>>>,
    volume: Arc<AtomicU32>,
    running: Arc<AtomicBool>,
    resampler: LinearResampler,
    max_queued: usize,
    device_name: String,
    sample_rate: u32,
    channels: u16,
    output_thread: Option<JoinHandle<()>>,
}

impl CpalSink {
    /// Open `device` (or the default output device) and start its stream
    pub fn open(device: Option<&str>, volume: f32, max_latency: Duration) -> Result<Self, AudioError> {
        let mut manager = DeviceManager::new()?;
        manager.select_device(device)?;

        let device_name = manager.current_device_name()?.unwrap_or_else(|| "default".to_string());
        let device = manager
            .current_device()
            .cloned()
            .ok_or_else(|| AudioError::InitializationFailed("No device selected".to_string()))?;

        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to get default config: {}", e)))?;
        let sample_format = default_config.sample_format();
        let config: StreamConfig = default_config.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let volume = Arc::new(AtomicU32::new(volume.clamp(0.0, 1.0).to_bits()));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel();

        let output_thread = {
            let queue = Arc::clone(&queue);
            let volume = Arc::clone(&volume);
            let running = Arc::clone(&running);

            thread::Builder::new()
                .name("audio-output".to_string())
                .spawn(move || {
                    let stream = match sample_format {
                        SampleFormat::F32 => build_stream::<f32>(&device, &config, &queue, &volume),
                        SampleFormat::I16 => build_stream::<i16>(&device, &config, &queue, &volume),
                        SampleFormat::U16 => build_stream::<u16>(&device, &config, &queue, &volume),
                        other => Err(AudioError::InitializationFailed(format!(
                            "Unsupported sample format: {:?}",
                            other
                        ))),
                    };

                    let stream = match stream.and_then(|stream| {
                        stream
                            .play()
                            .map_err(|e| AudioError::StreamError(format!("Failed to start audio stream: {}", e)))?;
                        Ok(stream)
                    }) {
                        Ok(stream) => stream,
                        Err(e) => {
                            running.store(false, Ordering::SeqCst);
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));

                    while running.load(Ordering::SeqCst) {
                        thread::park_timeout(Duration::from_millis(100));
                    }
                    drop(stream);
                })
                .map_err(|e| AudioError::InitializationFailed(format!("Failed to spawn audio thread: {}", e)))?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = output_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = output_thread.join();
                return Err(AudioError::InitializationFailed("Audio thread exited during setup".to_string()));
            }
        }

        info!(
            "Opened output device '{}' ({} Hz, {} channels, {:?})",
            device_name, sample_rate, channels, sample_format
        );

        Ok(Self {
            queue,
            volume,
            running,
            resampler: LinearResampler::new(sample_rate, sample_rate, channels as usize),
            max_queued: queued_samples_for(max_latency, sample_rate, channels),
            device_name,
            sample_rate,
            channels,
            output_thread: Some(output_thread),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Device stream format as (sample rate, channels)
    pub fn output_format(&self) -> (u32, u16) {
        (self.sample_rate, self.channels)
    }

    /// Set output volume, clamped to 0.0..=1.0; takes effect on the next device callback
    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// Samples queued for the device and not yet played
    pub fn queued_samples(&self) -> usize {
        lock(&self.queue).len()
    }
}

impl PlaybackSink for CpalSink {
    fn push(&mut self, block: &PcmBlock<'_>) -> Result<(), AudioError> {
        let samples = self.resampler.process_block(block);
        if samples.is_empty() {
            return Ok(());
        }

        loop {
            if !self.running.load(Ordering::SeqCst) {
                return Err(AudioError::StreamError("Output stream has stopped".to_string()));
            }
            if lock(&self.queue).len() < self.max_queued {
                break;
            }
            thread::sleep(DRAIN_POLL);
        }

        lock(&self.queue).extend(samples);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        let dropped = {
            let mut queue = lock(&self.queue);
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        self.resampler.reset();
        debug!("Output queue cleared ({} samples dropped)", dropped);
        Ok(())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.output_thread.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("Audio output thread panicked");
            }
        }
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    queue: &Arc<Mutex<VecDeque<f32>>>,
    volume: &Arc<AtomicU32>,
) -> Result<Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let queue = Arc::clone(queue);
    let volume = Arc::clone(volume);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let current_volume = f32::from_bits(volume.load(Ordering::Relaxed));
                fill_output(data, &mut lock(&queue), current_volume);
            },
            move |err| {
                warn!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(format!("Failed to build output stream: {}", e)))
}

/// Fill a device buffer from the queue, padding with silence. Returns samples taken.
fn fill_output<T>(data: &mut [T], queue: &mut VecDeque<f32>, volume: f32) -> usize
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let mut taken = 0;
    for sample in data.iter_mut() {
        let value = match queue.pop_front() {
            Some(value) => {
                taken += 1;
                value * volume
            }
            None => 0.0,
        };
        *sample = T::from_sample(value);
    }
    taken
}

/// Queue length in samples that holds `latency` of interleaved audio
fn queued_samples_for(latency: Duration, sample_rate: u32, channels: u16) -> usize {
    let frames = (latency.as_secs_f64() * sample_rate as f64).ceil() as usize;
    (frames * channels as usize).max(channels as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_limit_from_latency() {
        assert_eq!(queued_samples_for(Duration::from_millis(250), 48_000, 2), 24_000);
        assert_eq!(queued_samples_for(Duration::from_millis(100), 44_100, 1), 4_410);
        // Never smaller than one frame
        assert_eq!(queued_samples_for(Duration::ZERO, 48_000, 2), 2);
    }

    #[test]
    fn test_fill_output_applies_volume_and_pads() {
        let mut queue: VecDeque<f32> = vec![1.0, -0.5, 0.25].into();
        let mut data = [9.0f32; 5];

        let taken = fill_output(&mut data, &mut queue, 0.5);

        assert_eq!(taken, 3);
        assert_eq!(data, [0.5, -0.25, 0.125, 0.0, 0.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fill_output_converts_to_integer_formats() {
        let mut queue: VecDeque<f32> = vec![1.0, -1.0, 0.0].into();
        let mut data = [1i16; 4];

        fill_output(&mut data, &mut queue, 1.0);

        assert!(data[0] >= i16::MAX - 1);
        assert!(data[1] <= i16::MIN + 1);
        assert_eq!(data[2], 0);
        assert_eq!(data[3], 0);
    }

    #[test]
    fn test_fill_output_leaves_remainder_queued() {
        let mut queue: VecDeque<f32> = (0..10).map(|n| n as f32 / 10.0).collect();
        let mut data = [0.0f32; 4];

        assert_eq!(fill_output(&mut data, &mut queue, 1.0), 4);
        assert_eq!(queue.len(), 6);
        assert_eq!(queue.front(), Some(&0.4));
    }

    #[test]
    fn test_invalid_device_selection() {
        // Hosts without audio hardware cannot enumerate; nothing to check there
        let Ok(mut manager) = DeviceManager::new() else {
            return;
        };

        match manager.select_device(Some("NonExistentDevice")) {
            Err(AudioError::DeviceNotFound { device }) => assert_eq!(device, "NonExistentDevice"),
            other => panic!("Expected DeviceNotFound error, got {:?}", other.err()),
        }
        assert!(manager.current_device().is_none());
    }

    #[test]
    fn test_device_list_is_sorted() {
        let Ok(manager) = DeviceManager::new() else {
            return;
        };

        let devices = manager.list_devices();
        let mut sorted = devices.clone();
        sorted.sort();
        assert_eq!(devices, sorted);
    }
}
