// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The simulator: station fan-out, mixing, noise, rate conversion, gain and
//! paced delivery.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use fmsim_core::constants::{
    cycle_period, DEFAULT_BLOCK_SIZE, DEFAULT_CENTER_FREQUENCY_HZ, DEFAULT_GAIN_DB,
    DEFAULT_MAX_GAIN_DB, DEFAULT_MIN_GAIN_DB, DEFAULT_NOISE_SIGMA, DEFAULT_QUEUE_SIZE,
    MAX_OUTPUT_SAMPLE_RATE, MIN_OUTPUT_SAMPLE_RATE, UPSAMPLE_FACTOR,
};
use fmsim_core::{Sample, SampleSink, SimError, SimResult, StationConfig};
use fmsim_rds::ClockSource;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::audio::ProgramSource;
use crate::descriptor::{discover_descriptors, load_descriptor, RdsDefaults};
use crate::noise::NoiseTable;
use crate::queue::UserDataQueue;
use crate::rate::{available_sample_rates, nearest_rate, RateConverter};
use crate::transmitter::{Transmitter, TuningHandle};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Engine tunables, fixed at construction except where a setter exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Base-rate samples per station per cycle.
    pub block_size: usize,
    pub center_frequency_hz: f64,
    pub min_center_frequency_hz: f64,
    pub max_center_frequency_hz: f64,
    pub gain_db: f32,
    pub min_gain_db: f32,
    pub max_gain_db: f32,
    /// Requested output rate; snapped to the nearest available one.
    pub sample_rate: u32,
    pub queue_size: usize,
    pub add_noise: bool,
    /// Per-component standard deviation of the added noise.
    pub noise_sigma: f32,
    /// Fixed seed for reproducible noise.
    pub noise_seed: Option<u64>,
    /// Station worker threads; 0 picks one per core.
    pub worker_threads: usize,
    /// Send RDS clock-time groups from the system clock.
    pub rds_clock_time: bool,
    /// RDS fields for descriptors that leave them out.
    pub rds: RdsDefaults,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            center_frequency_hz: DEFAULT_CENTER_FREQUENCY_HZ,
            min_center_frequency_hz: 0.0,
            max_center_frequency_hz: f64::MAX,
            gain_db: DEFAULT_GAIN_DB,
            min_gain_db: DEFAULT_MIN_GAIN_DB,
            max_gain_db: DEFAULT_MAX_GAIN_DB,
            sample_rate: MAX_OUTPUT_SAMPLE_RATE,
            queue_size: DEFAULT_QUEUE_SIZE,
            add_noise: true,
            noise_sigma: DEFAULT_NOISE_SIGMA,
            noise_seed: None,
            worker_threads: 0,
            rds_clock_time: true,
            rds: RdsDefaults::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared cycle state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Controls {
    center_frequency_hz: f64,
    min_center_frequency_hz: f64,
    max_center_frequency_hz: f64,
    gain_db: f32,
    min_gain_db: f32,
    max_gain_db: f32,
}

/// Everything the scheduler thread touches.
struct Core {
    block_size: usize,
    clock: ClockSource,
    rds_defaults: RdsDefaults,
    noise_seed: Option<u64>,
    controls: Mutex<Controls>,
    stations: Mutex<Vec<Transmitter>>,
    tuning: Mutex<Vec<TuningHandle>>,
    sink: Mutex<Option<Arc<dyn SampleSink>>>,
    mix: Mutex<Vec<Sample>>,
    add_noise: AtomicBool,
    noise: Mutex<NoiseTable>,
    rate: Mutex<RateConverter>,
    queue: UserDataQueue,
    pool: rayon::ThreadPool,
}

impl Core {
    /// One cycle: run every station, mix, add noise, filter, decimate and
    /// apply gain.
    fn cycle(&self) -> Vec<Sample> {
        let mut mix = lock(&self.mix);
        mix.fill(Sample::default());
        {
            let mut stations = lock(&self.stations);
            let stations: &mut Vec<Transmitter> = &mut stations;
            self.pool
                .install(|| stations.par_iter_mut().for_each(Transmitter::run));
            for station in stations.iter() {
                let data = station.data();
                if data.len() != mix.len() {
                    warn!(
                        "Station {} produced {} samples, expected {}; skipping",
                        station.config().call_sign(),
                        data.len(),
                        mix.len()
                    );
                    continue;
                }
                for (m, s) in mix.iter_mut().zip(data) {
                    *m += s;
                }
            }
        }

        if self.add_noise.load(Ordering::Relaxed) {
            lock(&self.noise).add_to(&mut mix);
        }

        let mut block = lock(&self.rate).process(&mix);
        let gain = 10f32.powf(lock(&self.controls).gain_db / 10.0);
        block.iter_mut().for_each(|s| *s *= gain);
        block
    }
}

fn scheduler_loop(core: &Core, period: Duration, stop: &Receiver<()>) {
    let mut deadline = Instant::now() + period;
    loop {
        match stop.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        let now = Instant::now();
        if now > deadline + period {
            warn!(
                "Cycle is {:.1} ms behind schedule",
                (now - deadline).as_secs_f64() * 1e3
            );
        }
        deadline += period;
        let block = core.cycle();
        core.queue.deliver(block);
    }
    debug!("Scheduler stopped");
}

struct Scheduler {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Multi-station FM/RDS simulator.
///
/// Built from [`EngineSettings`], populated once with [`init`](Self::init)
/// or [`init_with_sources`](Self::init_with_sources), then paced by
/// [`start`](Self::start)/[`stop`](Self::stop). Every control takes `&self`
/// and may be called while running.
pub struct SimulatorEngine {
    core: Arc<Core>,
    available_rates: Vec<u32>,
    scheduler: Mutex<Option<Scheduler>>,
}

impl SimulatorEngine {
    pub fn new(settings: EngineSettings) -> SimResult<Self> {
        if settings.block_size == 0 {
            return Err(SimError::InvalidValue {
                name: "block size",
                value: 0.0,
            });
        }
        check_range(
            "center frequency range",
            settings.min_center_frequency_hz,
            settings.max_center_frequency_hz,
        )?;
        check_range(
            "gain range",
            settings.min_gain_db.into(),
            settings.max_gain_db.into(),
        )?;
        check_within(
            "center frequency",
            settings.center_frequency_hz,
            settings.min_center_frequency_hz,
            settings.max_center_frequency_hz,
        )?;
        check_within(
            "gain",
            settings.gain_db.into(),
            settings.min_gain_db.into(),
            settings.max_gain_db.into(),
        )?;

        let available_rates = available_sample_rates();
        let rate = snap_rate(&available_rates, settings.sample_rate)?;
        let noise = NoiseTable::generate(
            MAX_OUTPUT_SAMPLE_RATE as usize,
            noise_sigma(settings.noise_sigma),
            settings.noise_seed,
        )?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.worker_threads)
            .thread_name(|i| format!("fmsim-station-{i}"))
            .build()
            .map_err(|e| SimError::Config(PathBuf::from("worker pool"), e.to_string()))?;

        let clock = if settings.rds_clock_time {
            ClockSource::System
        } else {
            ClockSource::Disabled
        };
        let controls = Controls {
            center_frequency_hz: settings.center_frequency_hz,
            min_center_frequency_hz: settings.min_center_frequency_hz,
            max_center_frequency_hz: settings.max_center_frequency_hz,
            gain_db: settings.gain_db,
            min_gain_db: settings.min_gain_db,
            max_gain_db: settings.max_gain_db,
        };

        debug!(
            "Engine: block {} samples, output {} Hz, {} worker threads",
            settings.block_size,
            rate,
            pool.current_num_threads()
        );

        let core = Core {
            block_size: settings.block_size,
            clock,
            rds_defaults: settings.rds,
            noise_seed: settings.noise_seed,
            controls: Mutex::new(controls),
            stations: Mutex::new(Vec::new()),
            tuning: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
            mix: Mutex::new(vec![Sample::default(); settings.block_size * UPSAMPLE_FACTOR]),
            add_noise: AtomicBool::new(settings.add_noise),
            noise: Mutex::new(noise),
            rate: Mutex::new(RateConverter::new(rate)),
            queue: UserDataQueue::new(settings.queue_size),
            pool,
        };
        Ok(Self {
            core: Arc::new(core),
            available_rates,
            scheduler: Mutex::new(None),
        })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Load every station descriptor in `dir`. Stations that fail to load
    /// are logged and skipped. Returns the number of stations built.
    pub fn init(&self, dir: &Path, sink: Arc<dyn SampleSink>) -> SimResult<usize> {
        if self.is_initialized() {
            return Err(SimError::Config(
                dir.to_path_buf(),
                "simulator is already initialized".into(),
            ));
        }
        let descriptors = discover_descriptors(dir).unwrap_or_else(|e| {
            error!("Station discovery failed: {}", e);
            Vec::new()
        });

        let mut stations = Vec::with_capacity(descriptors.len());
        for path in descriptors {
            let built = load_descriptor(&path, &self.core.rds_defaults).and_then(|config| {
                Transmitter::open(config, self.core.block_size, self.core.clock)
            });
            match built {
                Ok(station) => stations.push(station),
                Err(e) => error!("Skipping station {}: {}", path.display(), e),
            }
        }
        self.install(stations, sink)
    }

    /// Build stations from in-memory configurations and opened sources.
    pub fn init_with_sources(
        &self,
        stations: Vec<(StationConfig, Box<dyn ProgramSource>)>,
        sink: Arc<dyn SampleSink>,
    ) -> SimResult<usize> {
        if self.is_initialized() {
            return Err(SimError::Config(
                PathBuf::new(),
                "simulator is already initialized".into(),
            ));
        }
        let stations = stations
            .into_iter()
            .map(|(config, source)| {
                Transmitter::with_source(config, source, self.core.block_size, self.core.clock)
            })
            .collect();
        self.install(stations, sink)
    }

    fn install(&self, stations: Vec<Transmitter>, sink: Arc<dyn SampleSink>) -> SimResult<usize> {
        let count = stations.len();
        {
            // Held until the handles are published so a concurrent retune
            // cannot land between reading the frequency and storing them.
            let controls = lock(&self.core.controls);
            let handles: Vec<TuningHandle> = stations.iter().map(Transmitter::tuning_handle).collect();
            for handle in &handles {
                handle.set_tuned_frequency(controls.center_frequency_hz);
            }
            *lock(&self.core.stations) = stations;
            *lock(&self.core.tuning) = handles;
        }
        *lock(&self.core.sink) = Some(sink);
        if count == 0 {
            warn!("Simulator initialized without stations");
        } else {
            info!("Simulator initialized with {} stations", count);
        }
        Ok(count)
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.core.sink).is_some()
    }

    /// Start the scheduler and delivery threads.
    pub fn start(&self) -> SimResult<()> {
        let mut scheduler = lock(&self.scheduler);
        if scheduler.is_some() {
            warn!("Simulator already running");
            return Ok(());
        }
        let Some(sink) = lock(&self.core.sink).clone() else {
            warn!("Simulator not initialized, not starting");
            return Ok(());
        };

        self.core.queue.spawn_consumer(sink)?;
        let (stop_tx, stop_rx) = mpsc::channel();
        let core = self.core.clone();
        let period = cycle_period(self.core.block_size);
        let spawned = std::thread::Builder::new()
            .name("fmsim-scheduler".to_string())
            .spawn(move || scheduler_loop(&core, period, &stop_rx));
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.core.queue.shut_down();
                return Err(SimError::Config("fmsim-scheduler".into(), e.to_string()));
            }
        };
        *scheduler = Some(Scheduler {
            stop: stop_tx,
            thread,
        });
        info!(
            "Simulator started: {} stations, {:.1} ms cycle",
            self.station_count(),
            period.as_secs_f64() * 1e3
        );
        Ok(())
    }

    /// Stop the scheduler and drain the delivery thread.
    pub fn stop(&self) {
        let Some(scheduler) = lock(&self.scheduler).take() else {
            warn!("Simulator is not running");
            return;
        };
        // A send error means the scheduler already exited.
        let _ = scheduler.stop.send(());
        if scheduler.thread.join().is_err() {
            error!("Scheduler thread panicked");
        }
        self.core.queue.shut_down();
        info!("Simulator stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.scheduler).is_some()
    }

    /// Run one cycle synchronously and return the output block instead of
    /// queueing it. Advances station state like a scheduled cycle.
    pub fn generate_block(&self) -> Vec<Sample> {
        self.core.cycle()
    }

    // -----------------------------------------------------------------------
    // Controls
    // -----------------------------------------------------------------------

    /// Retune the receiver; every station is shifted relative to it.
    pub fn set_center_frequency(&self, hz: f64) -> SimResult<()> {
        let mut controls = lock(&self.core.controls);
        check_within(
            "center frequency",
            hz,
            controls.min_center_frequency_hz,
            controls.max_center_frequency_hz,
        )?;
        controls.center_frequency_hz = hz;
        // Lock order: controls, then tuning.
        for handle in lock(&self.core.tuning).iter() {
            handle.set_tuned_frequency(hz);
        }
        drop(controls);
        debug!("Center frequency set to {} Hz", hz);
        Ok(())
    }

    pub fn center_frequency(&self) -> f64 {
        lock(&self.core.controls).center_frequency_hz
    }

    pub fn set_center_frequency_range(&self, min_hz: f64, max_hz: f64) -> SimResult<()> {
        check_range("center frequency range", min_hz, max_hz)?;
        let mut controls = lock(&self.core.controls);
        controls.min_center_frequency_hz = min_hz;
        controls.max_center_frequency_hz = max_hz;
        Ok(())
    }

    pub fn center_frequency_range(&self) -> (f64, f64) {
        let controls = lock(&self.core.controls);
        (controls.min_center_frequency_hz, controls.max_center_frequency_hz)
    }

    /// Output gain in dB; linear scale is `10^(gain / 10)`.
    pub fn set_gain(&self, gain_db: f32) -> SimResult<()> {
        let mut controls = lock(&self.core.controls);
        check_within(
            "gain",
            gain_db.into(),
            controls.min_gain_db.into(),
            controls.max_gain_db.into(),
        )?;
        controls.gain_db = gain_db;
        Ok(())
    }

    pub fn gain(&self) -> f32 {
        lock(&self.core.controls).gain_db
    }

    pub fn set_gain_range(&self, min_db: f32, max_db: f32) -> SimResult<()> {
        check_range("gain range", min_db.into(), max_db.into())?;
        let mut controls = lock(&self.core.controls);
        controls.min_gain_db = min_db;
        controls.max_gain_db = max_db;
        Ok(())
    }

    pub fn gain_range(&self) -> (f32, f32) {
        let controls = lock(&self.core.controls);
        (controls.min_gain_db, controls.max_gain_db)
    }

    /// Select the output rate closest to `rate`. Returns the rate in effect.
    pub fn set_sample_rate(&self, rate: u32) -> SimResult<u32> {
        let snapped = snap_rate(&self.available_rates, rate)?;
        let converter = RateConverter::new(snapped);
        *lock(&self.core.rate) = converter;
        info!("Output sample rate {} Hz (requested {})", snapped, rate);
        Ok(snapped)
    }

    pub fn sample_rate(&self) -> u32 {
        lock(&self.core.rate).rate()
    }

    pub fn available_sample_rates(&self) -> &[u32] {
        &self.available_rates
    }

    /// Samples per delivered block at the current output rate.
    pub fn output_block_len(&self) -> usize {
        lock(&self.core.rate).output_len(self.core.block_size * UPSAMPLE_FACTOR)
    }

    pub fn block_size(&self) -> usize {
        self.core.block_size
    }

    pub fn set_queue_size(&self, blocks: usize) {
        self.core.queue.set_max_queue_size(blocks);
    }

    pub fn queue_size(&self) -> usize {
        self.core.queue.max_queue_size()
    }

    pub fn add_noise(&self, enabled: bool) {
        self.core.add_noise.store(enabled, Ordering::Relaxed);
    }

    pub fn noise_enabled(&self) -> bool {
        self.core.add_noise.load(Ordering::Relaxed)
    }

    /// Regenerate the noise table. Negative values use their magnitude.
    pub fn set_noise_sigma(&self, sigma: f32) -> SimResult<()> {
        let table = NoiseTable::generate(
            MAX_OUTPUT_SAMPLE_RATE as usize,
            noise_sigma(sigma),
            self.core.noise_seed,
        )?;
        *lock(&self.core.noise) = table;
        Ok(())
    }

    pub fn noise_sigma(&self) -> f32 {
        lock(&self.core.noise).sigma()
    }

    pub fn station_count(&self) -> usize {
        lock(&self.core.tuning).len()
    }
}

impl Drop for SimulatorEngine {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

fn noise_sigma(sigma: f32) -> f32 {
    if sigma < 0.0 {
        warn!("Negative noise sigma {}, using its magnitude", sigma);
    }
    sigma.abs()
}

fn snap_rate(rates: &[u32], requested: u32) -> SimResult<u32> {
    if !(MIN_OUTPUT_SAMPLE_RATE..=MAX_OUTPUT_SAMPLE_RATE).contains(&requested) {
        return Err(SimError::InvalidValue {
            name: "sample rate",
            value: f64::from(requested),
        });
    }
    nearest_rate(rates, requested).ok_or(SimError::InvalidValue {
        name: "sample rate",
        value: f64::from(requested),
    })
}

fn check_within(name: &'static str, value: f64, min: f64, max: f64) -> SimResult<()> {
    if value.is_nan() || value < min || value > max {
        return Err(SimError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn check_range(name: &'static str, min: f64, max: f64) -> SimResult<()> {
    if min.is_nan() || max.is_nan() || min > max {
        return Err(SimError::InvalidValue { name, value: min });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SilentSource;
    use std::fs;
    use std::sync::atomic::AtomicUsize;

    const BLOCK: usize = 2_280;

    fn quiet_settings() -> EngineSettings {
        EngineSettings {
            block_size: BLOCK,
            add_noise: false,
            noise_seed: Some(42),
            worker_threads: 2,
            rds_clock_time: false,
            ..EngineSettings::default()
        }
    }

    fn null_sink() -> Arc<dyn SampleSink> {
        Arc::new(|_: &[Sample]| {})
    }

    fn silent_station(center_hz: f64) -> (StationConfig, Box<dyn ProgramSource>) {
        (
            StationConfig::new("silence", center_hz).with_call_sign("KQED"),
            Box::new(SilentSource::default()),
        )
    }

    fn engine_with_station(settings: EngineSettings) -> SimulatorEngine {
        let engine = SimulatorEngine::new(settings).unwrap();
        let center = engine.center_frequency();
        engine
            .init_with_sources(vec![silent_station(center)], null_sink())
            .unwrap();
        engine
    }

    fn energy(block: &[Sample]) -> f32 {
        block.iter().map(|s| s.norm_sqr()).sum()
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = EngineSettings::default();
        assert_eq!(s.sample_rate, MAX_OUTPUT_SAMPLE_RATE);
        assert_eq!(s.min_gain_db, -100.0);
        assert_eq!(s.max_gain_db, 100.0);
        assert!(s.add_noise);
        assert_eq!(s.noise_sigma, 0.1);
    }

    #[test]
    fn settings_parse_from_partial_toml() {
        let s: EngineSettings = toml::from_str("block_size = 1000\nadd_noise = false\n").unwrap();
        assert_eq!(s.block_size, 1000);
        assert!(!s.add_noise);
        assert_eq!(s.queue_size, DEFAULT_QUEUE_SIZE);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let zero_block = EngineSettings {
            block_size: 0,
            ..quiet_settings()
        };
        assert!(SimulatorEngine::new(zero_block).is_err());
        let loud = EngineSettings {
            gain_db: 200.0,
            ..quiet_settings()
        };
        assert!(matches!(
            SimulatorEngine::new(loud),
            Err(SimError::OutOfRange { name: "gain", .. })
        ));
    }

    #[test]
    fn output_length_follows_decimation() {
        let engine = engine_with_station(quiet_settings());
        assert_eq!(engine.generate_block().len(), BLOCK * UPSAMPLE_FACTOR);
        assert_eq!(engine.set_sample_rate(250_000).unwrap(), 228_000);
        assert_eq!(engine.sample_rate(), 228_000);
        assert_eq!(engine.output_block_len(), BLOCK);
        assert_eq!(engine.generate_block().len(), BLOCK);
    }

    #[test]
    fn sample_rate_outside_limits_is_invalid() {
        let engine = SimulatorEngine::new(quiet_settings()).unwrap();
        for rate in [0, MIN_OUTPUT_SAMPLE_RATE - 1, MAX_OUTPUT_SAMPLE_RATE + 1] {
            assert!(matches!(
                engine.set_sample_rate(rate),
                Err(SimError::InvalidValue {
                    name: "sample rate",
                    ..
                })
            ));
        }
        assert_eq!(engine.sample_rate(), MAX_OUTPUT_SAMPLE_RATE);
    }

    #[test]
    fn same_settings_give_same_output() {
        let a = engine_with_station(quiet_settings());
        let b = engine_with_station(quiet_settings());
        for _ in 0..3 {
            assert_eq!(a.generate_block(), b.generate_block());
        }
    }

    #[test]
    fn in_band_station_has_unit_power() {
        let engine = engine_with_station(quiet_settings());
        engine.generate_block();
        let block = engine.generate_block();
        let per_sample = energy(&block) / block.len() as f32;
        assert!(per_sample > 0.85 && per_sample < 1.05, "{per_sample}");
    }

    #[test]
    fn silent_stereo_station_matches_recorded_output() {
        // KQED, default texts, no clock groups, tuned on carrier, 228 kHz out.
        let engine = engine_with_station(quiet_settings());
        engine.set_sample_rate(228_000).unwrap();
        let first = engine.generate_block();
        let second = engine.generate_block();
        assert_eq!(second.len(), BLOCK);

        assert!((energy(&first) - 2265.398).abs() < 0.05, "{}", energy(&first));
        assert!((energy(&second) - 2266.172).abs() < 0.05, "{}", energy(&second));
        let recorded = [
            (0, Sample::new(0.548_751, 0.031_309)),
            (500, Sample::new(0.799_898, 0.599_262)),
            (1_000, Sample::new(0.927_562, 0.352_049)),
            (1_500, Sample::new(0.989_584, 0.030_644)),
        ];
        for (n, expected) in recorded {
            assert!((second[n] - expected).norm() < 1e-4, "n={n}: {}", second[n]);
        }
    }

    #[test]
    fn concurrent_retunes_leave_every_station_on_the_final_frequency() {
        let engine = SimulatorEngine::new(quiet_settings()).unwrap();
        let stations: Vec<_> = (0..4).map(|k| silent_station(88.1e6 + f64::from(k) * 0.2e6)).collect();
        let engine = &engine;
        std::thread::scope(|scope| {
            scope.spawn(move || engine.init_with_sources(stations, null_sink()).unwrap());
            for k in 0..4u32 {
                scope.spawn(move || {
                    for i in 0..50u32 {
                        let hz = 88e6 + f64::from(k * 50 + i) * 1e3;
                        engine.set_center_frequency(hz).unwrap();
                    }
                });
            }
        });

        let center = engine.center_frequency();
        let tuning = lock(&engine.core.tuning);
        assert_eq!(tuning.len(), 4);
        for handle in tuning.iter() {
            assert_eq!(handle.tuned_frequency(), center);
        }
    }

    #[test]
    fn ten_db_gain_is_hundredfold_energy() {
        let flat = engine_with_station(quiet_settings());
        let loud = engine_with_station(quiet_settings());
        loud.set_gain(10.0).unwrap();
        let a = flat.generate_block();
        let b = loud.generate_block();
        let ratio = energy(&b) / energy(&a);
        assert!((ratio - 100.0).abs() < 0.01, "{ratio}");
        for (x, y) in a.iter().zip(&b) {
            assert!((*x * 10.0 - *y).norm() < 1e-4);
        }
    }

    #[test]
    fn out_of_range_controls_keep_state() {
        let engine = engine_with_station(quiet_settings());
        engine.set_gain_range(-10.0, 10.0).unwrap();
        assert!(matches!(
            engine.set_gain(11.0),
            Err(SimError::OutOfRange { name: "gain", .. })
        ));
        assert_eq!(engine.gain(), 0.0);

        engine.set_center_frequency_range(87.5e6, 108e6).unwrap();
        let err = engine.set_center_frequency(80e6).unwrap_err();
        assert_eq!(
            err,
            SimError::OutOfRange {
                name: "center frequency",
                value: 80e6,
                min: 87.5e6,
                max: 108e6
            }
        );
        assert_eq!(engine.center_frequency(), DEFAULT_CENTER_FREQUENCY_HZ);
        assert!(engine.set_gain_range(5.0, -5.0).is_err());
    }

    #[test]
    fn retuning_moves_station_out_of_band() {
        let engine = engine_with_station(quiet_settings());
        assert!(energy(&engine.generate_block()) > 0.0);
        engine.set_center_frequency(95e6).unwrap();
        assert!(engine.generate_block().iter().all(|s| *s == Sample::default()));
        engine.set_center_frequency(DEFAULT_CENTER_FREQUENCY_HZ + 0.3e6).unwrap();
        assert!(energy(&engine.generate_block()) > 0.0);
    }

    #[test]
    fn noise_only_power_follows_sigma() {
        let settings = EngineSettings {
            add_noise: true,
            ..quiet_settings()
        };
        let engine = SimulatorEngine::new(settings).unwrap();
        engine.init_with_sources(Vec::new(), null_sink()).unwrap();
        let block = engine.generate_block();
        let per_sample = energy(&block) / block.len() as f32;
        assert!((per_sample - 0.02).abs() < 0.002, "{per_sample}");

        engine.set_noise_sigma(-0.5).unwrap();
        assert_eq!(engine.noise_sigma(), 0.5);
        engine.add_noise(false);
        assert!(engine.generate_block().iter().all(|s| *s == Sample::default()));
    }

    #[test]
    fn second_init_is_rejected() {
        let engine = engine_with_station(quiet_settings());
        let err = engine
            .init_with_sources(vec![silent_station(88.5e6)], null_sink())
            .unwrap_err();
        assert!(matches!(err, SimError::Config(..)));
        assert_eq!(engine.station_count(), 1);
    }

    #[test]
    fn init_skips_broken_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        crate::audio::tests::write_wav(&dir.path().join("tone.wav"), 2, 44_100, &[100; 200]);
        fs::write(
            dir.path().join("good.toml"),
            "FileName = \"tone.wav\"\nCenterFrequency = 88500000\n",
        )
        .unwrap();
        fs::write(dir.path().join("bad.toml"), "CenterFrequency = 88500000\n").unwrap();

        let engine = SimulatorEngine::new(quiet_settings()).unwrap();
        assert_eq!(engine.init(dir.path(), null_sink()).unwrap(), 1);
        assert!(engine.is_initialized());
        assert_eq!(engine.generate_block().len(), BLOCK * UPSAMPLE_FACTOR);
    }

    #[test]
    fn lifecycle_misuse_is_harmless() {
        let engine = SimulatorEngine::new(quiet_settings()).unwrap();
        engine.start().unwrap();
        assert!(!engine.is_running());
        engine.stop();

        engine.init_with_sources(Vec::new(), null_sink()).unwrap();
        engine.start().unwrap();
        engine.start().unwrap();
        assert!(engine.is_running());
        engine.stop();
        engine.stop();
        assert!(!engine.is_running());
    }

    #[test]
    fn running_engine_delivers_blocks() {
        let engine = SimulatorEngine::new(quiet_settings()).unwrap();
        engine.set_sample_rate(228_000).unwrap();
        let delivered = Arc::new(AtomicUsize::new(0));
        let wrong_len = Arc::new(AtomicUsize::new(0));
        let (count, bad) = (delivered.clone(), wrong_len.clone());
        let sink: Arc<dyn SampleSink> = Arc::new(move |block: &[Sample]| {
            if block.len() != BLOCK {
                bad.fetch_add(1, Ordering::SeqCst);
            }
            count.fetch_add(1, Ordering::SeqCst);
        });
        engine
            .init_with_sources(vec![silent_station(88.5e6)], sink)
            .unwrap();

        engine.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        while delivered.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        engine.stop();

        let seen = delivered.load(Ordering::SeqCst);
        assert!(seen >= 3, "only {seen} blocks delivered");
        assert_eq!(wrong_len.load(Ordering::SeqCst), 0);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(delivered.load(Ordering::SeqCst), seen);
    }
}
