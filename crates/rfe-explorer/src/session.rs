//! DeviceSession -- the caller-side state machine for one RF Explorer.
//!
//! The session owns the [`DeviceIo`] handle. The IO task reads the device
//! continuously and queues [`Token`]s; the caller drains that queue with
//! [`DeviceSession::process_received`] (or one of the waiting helpers), and
//! each token updates the session: configuration frames switch the mode and
//! refresh the analyzer, sniffer or generator fields, sweeps land in the
//! [`SweepBuffer`], and text lines identify the hardware.
//!
//! Edge-triggered conditions (acknowledgements, firmware resets, a full
//! sweep buffer) are published once on a [`broadcast`] channel as
//! [`DeviceEvent`]s.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use rfe_core::error::{Error, Result};
use rfe_core::events::DeviceEvent;
use rfe_core::helpers::decorate_serial_number;
use rfe_core::transport::Transport;
use rfe_core::types::*;

use crate::calibration::{CalibrationTable, GeneratorCalibration};
use crate::commands::{self, AmplitudeSweep, FrequencySweep, PowerSetting};
use crate::config::{Configuration, FrequencyPlan};
use crate::framer::Token;
use crate::io::{spawn_io_task, DeviceIo, IoConfig};
use crate::message::{decode_line, Message};
use crate::sweep::SweepRecord;
use crate::sweep_buffer::{Growth, SweepBuffer};

/// Configuration requests sent to a generator that has not yet delivered
/// its calibration block.
const CALIBRATION_REQUEST_LIMIT: u32 = 3;

/// Sweep gaps averaged before the sweep time estimate is refreshed.
const SWEEP_TIMING_SAMPLES: u32 = 10;

/// Gaps at or above this are treated as a pause, not a sweep interval.
const SWEEP_TIMING_MAX_GAP_MS: i64 = 60_000;

/// Minimum span of the 2.4G and 6G analyzers, MHz.
const WIDE_BAND_MIN_SPAN_MHZ: f64 = 2.0;

// ---------------------------------------------------------------------------
// Configuration and state types
// ---------------------------------------------------------------------------

/// Session-level policy.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Request the device configuration (`C0`) right after connecting.
    pub auto_configure: bool,
    /// Clear the sweep buffer when a configuration moves the frequency plan.
    pub auto_clean: bool,
    /// Keep every sweep; when off only the latest sweep is held.
    pub store_sweeps: bool,
    /// Keep WSUB3G analyzers in the max-hold calculator.
    pub use_max_hold: bool,
    /// Device kind assumed until the board model is reported.
    pub intended_device: DeviceKind,
    pub growth: Growth,
    /// Time allowed for a single command write.
    pub command_timeout: Duration,
    /// Bounded wait for the IO task to hand back the transport on close.
    pub close_timeout: Duration,
    /// Pause after reconfiguring the analyzer so the firmware can apply it.
    pub config_settle: Duration,
    pub io: IoConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            auto_configure: true,
            auto_clean: true,
            store_sweeps: true,
            use_max_hold: true,
            intended_device: DeviceKind::Analyzer,
            growth: Growth::default(),
            command_timeout: Duration::from_secs(1),
            close_timeout: Duration::from_secs(2),
            config_settle: Duration::from_millis(500),
            io: IoConfig::default(),
        }
    }
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    /// Connected, no usable configuration received yet.
    AwaitingConfig,
    SpectrumAnalyzer,
    Sniffer,
    Tracking,
    GeneratorCw,
    GeneratorSweepFreq,
    GeneratorSweepAmp,
    /// Generator connected with its RF output not in a known mode.
    GeneratorIdle,
    Closed,
}

impl SessionState {
    fn for_mode(mode: Mode, generator: bool) -> Self {
        match mode {
            Mode::SpectrumAnalyzer | Mode::Transmitter | Mode::WifiAnalyzer => {
                SessionState::SpectrumAnalyzer
            }
            Mode::Sniffer => SessionState::Sniffer,
            Mode::Tracking => SessionState::Tracking,
            Mode::GenCw => SessionState::GeneratorCw,
            Mode::GenSweepFreq => SessionState::GeneratorSweepFreq,
            Mode::GenSweepAmp => SessionState::GeneratorSweepAmp,
            Mode::None | Mode::Unknown(_) if generator => SessionState::GeneratorIdle,
            Mode::None | Mode::Unknown(_) => SessionState::AwaitingConfig,
        }
    }
}

/// How many queued tokens one [`DeviceSession::process_received`] call
/// handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    One,
    All,
}

/// Spectrum analyzer settings as last reported by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerState {
    pub plan: FrequencyPlan,
    pub top_dbm: f64,
    pub bottom_dbm: f64,
    pub min_freq_mhz: f64,
    pub max_freq_mhz: f64,
    pub max_span_mhz: f64,
    pub min_span_mhz: f64,
    pub rbw_khz: f64,
    pub offset_db: f64,
    pub calculator: Calculator,
}

impl Default for AnalyzerState {
    fn default() -> Self {
        AnalyzerState {
            plan: FrequencyPlan::default(),
            top_dbm: 0.0,
            bottom_dbm: 0.0,
            min_freq_mhz: 0.0,
            max_freq_mhz: 0.0,
            max_span_mhz: 0.0,
            min_span_mhz: 0.0,
            rbw_khz: 0.0,
            offset_db: 0.0,
            calculator: Calculator::Unknown,
        }
    }
}

impl AnalyzerState {
    /// `step * points`.
    pub fn span_mhz(&self) -> f64 {
        self.plan.step_mhz * self.plan.points as f64
    }

    pub fn center_mhz(&self) -> f64 {
        self.plan.start_mhz + self.span_mhz() / 2.0
    }

    pub fn end_mhz(&self) -> f64 {
        self.plan.start_mhz + self.span_mhz()
    }

    /// Top of the amplitude scale without the configured offset.
    pub fn normalized_top_dbm(&self) -> f64 {
        self.top_dbm - self.offset_db
    }

    pub fn normalized_bottom_dbm(&self) -> f64 {
        self.bottom_dbm - self.offset_db
    }
}

/// Sniffer decoder settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SnifferState {
    pub baud_rate: u32,
    pub threshold_dbm: f64,
    pub reference_mhz: f64,
    pub modulation: Modulation,
    pub rbw_khz: f64,
}

impl Default for SnifferState {
    fn default() -> Self {
        SnifferState {
            baud_rate: 0,
            threshold_dbm: 0.0,
            reference_mhz: 0.0,
            modulation: Modulation::None,
            rbw_khz: 0.0,
        }
    }
}

/// Signal generator settings, from the device or from the last command sent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeneratorState {
    pub cw_mhz: f64,
    pub start_mhz: f64,
    pub stop_mhz: f64,
    pub step_mhz: f64,
    pub sweep_steps: u16,
    pub power: PowerSetting,
    pub start_power: PowerSetting,
    pub stop_power: PowerSetting,
    pub amplitude_steps: u16,
    pub step_wait_ms: u32,
    pub rf_power_on: bool,
    pub min_freq_mhz: f64,
    pub max_freq_mhz: f64,
}

/// Running estimate of the time between sweeps.
#[derive(Debug, Clone, Default)]
struct SweepTiming {
    last_capture: Option<DateTime<Local>>,
    samples: u32,
    accumulated_ms: i64,
    average_secs: Option<f64>,
}

impl SweepTiming {
    fn record(&mut self, at: DateTime<Local>) {
        if let Some(last) = self.last_capture {
            let gap_ms = (at - last).num_milliseconds();
            if (0..SWEEP_TIMING_MAX_GAP_MS).contains(&gap_ms) {
                self.samples += 1;
                self.accumulated_ms += gap_ms;
                if self.samples >= SWEEP_TIMING_SAMPLES {
                    self.average_secs =
                        Some(self.accumulated_ms as f64 / 1000.0 / self.samples as f64);
                    self.samples = 0;
                    self.accumulated_ms = 0;
                }
            }
        }
        self.last_capture = Some(at);
    }

    fn touch(&mut self, at: DateTime<Local>) {
        self.last_capture = Some(at);
    }
}

// ---------------------------------------------------------------------------
// DeviceSession
// ---------------------------------------------------------------------------

/// A connected RF Explorer analyzer or signal generator.
///
/// Constructed via [`SessionBuilder`](crate::builder::SessionBuilder) or
/// [`DeviceSession::connect`].
pub struct DeviceSession {
    config: SessionConfig,
    io: Option<DeviceIo>,
    state: SessionState,
    mode: Mode,
    hold: bool,
    main_model: Model,
    expansion_model: Model,
    active_model: Model,
    expansion_active: bool,
    firmware: String,
    serial_number: String,
    dsp: DspMode,
    analyzer: AnalyzerState,
    sniffer: SnifferState,
    generator: GeneratorState,
    generator_calibration: Option<GeneratorCalibration>,
    calibration_requests: u32,
    calibration_chunk: Option<Vec<u8>>,
    internal_calibration: Option<Vec<u8>>,
    configuration: Option<Arc<Configuration>>,
    sweeps: SweepBuffer,
    amplitude_calibration: Option<CalibrationTable>,
    timing: SweepTiming,
    event_tx: broadcast::Sender<DeviceEvent>,
}

impl DeviceSession {
    fn new(config: SessionConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        DeviceSession {
            sweeps: SweepBuffer::new(config.growth),
            config,
            io: None,
            state: SessionState::Unconnected,
            mode: Mode::None,
            hold: false,
            main_model: Model::None,
            expansion_model: Model::None,
            active_model: Model::None,
            expansion_active: false,
            firmware: String::new(),
            serial_number: String::new(),
            dsp: DspMode::Unknown,
            analyzer: AnalyzerState::default(),
            sniffer: SnifferState::default(),
            generator: GeneratorState::default(),
            generator_calibration: None,
            calibration_requests: 0,
            calibration_chunk: None,
            internal_calibration: None,
            configuration: None,
            amplitude_calibration: None,
            timing: SweepTiming::default(),
            event_tx,
        }
    }

    /// Start the IO task over an open transport and, when auto-configure is
    /// on, ask the device for its configuration.
    pub async fn connect(transport: Box<dyn Transport>, config: SessionConfig) -> Result<Self> {
        if !transport.is_connected() {
            return Err(Error::NotConnected);
        }

        let mut session = DeviceSession::new(config);
        session.io = Some(spawn_io_task(transport, session.config.io.clone()));
        session.state = SessionState::AwaitingConfig;
        session.timing.touch(Local::now());
        info!(
            intended = ?session.config.intended_device,
            "device session connected"
        );
        session.emit(DeviceEvent::Connected);

        if session.config.auto_configure {
            session.send(commands::cmd_request_config()?).await?;
        }
        Ok(session)
    }

    // -----------------------------------------------------------------
    // Draining
    // -----------------------------------------------------------------

    /// Handle queued tokens without waiting for new ones. Returns how many
    /// were processed.
    pub async fn process_received(&mut self, mode: ProcessMode) -> Result<usize> {
        if self.io.is_none() {
            return Err(Error::NotConnected);
        }

        let mut processed = 0;
        while let Some(token) = self.io.as_mut().and_then(DeviceIo::try_next_token) {
            self.handle_token(token).await;
            processed += 1;
            if mode == ProcessMode::One {
                break;
            }
        }
        Ok(processed)
    }

    /// Wait up to `timeout` for at least one token, then drain the queue.
    pub async fn wait_received(&mut self, timeout: Duration) -> Result<usize> {
        let processed = self.process_received(ProcessMode::All).await?;
        if processed > 0 {
            return Ok(processed);
        }

        let io = self.io.as_mut().ok_or(Error::NotConnected)?;
        let next = tokio::time::timeout(timeout, io.next_token()).await;
        match next {
            Ok(Some(token)) => {
                self.handle_token(token).await;
                Ok(1 + self.process_received(ProcessMode::All).await?)
            }
            Ok(None) => Err(Error::NotConnected),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Drain until the device has reported its main board model.
    pub async fn wait_for_model(&mut self, timeout: Duration) -> Result<Model> {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_received(ProcessMode::All).await?;
            if self.main_model != Model::None {
                return Ok(self.main_model);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }
            match self.wait_received(remaining).await {
                Ok(_) | Err(Error::Timeout) => {}
                Err(e) => return Err(e),
            }
        }
    }

    async fn handle_token(&mut self, token: Token) {
        match token {
            Token::Configuration(cfg) => self.handle_configuration(cfg).await,
            Token::Sweep(record) => self.handle_sweep(record),
            Token::Line(line) => self.handle_line(&line),
            Token::CalibrationChunk(chunk) => {
                debug!(len = chunk.len(), "calibration chunk received");
                self.calibration_chunk = Some(chunk);
            }
            Token::InternalCalibration(dump) => {
                match GeneratorCalibration::from_dump(&dump).filter(|_| self.is_generator()) {
                    Some(cal) => {
                        debug!(entries = cal.entries(), "generator calibration received");
                        self.generator_calibration = Some(cal);
                    }
                    None => {
                        debug!(len = dump.len(), "internal calibration dump received");
                        self.internal_calibration = Some(dump);
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------

    async fn handle_configuration(&mut self, cfg: Arc<Configuration>) {
        debug!(mode = %cfg.mode, raw = %cfg.raw, "configuration received");

        let plan_changed = if self.is_generator() {
            self.apply_generator(&cfg).await
        } else {
            self.apply_analyzer(&cfg).await
        };

        self.configuration = Some(Arc::clone(&cfg));
        if let Some(io) = &self.io {
            io.set_tracking(self.mode == Mode::Tracking);
        }

        let state = SessionState::for_mode(self.mode, self.is_generator());
        if state != self.state {
            debug!(from = ?self.state, to = ?state, "session state changed");
            self.state = state;
        }
        self.emit(DeviceEvent::ConfigurationChanged {
            mode: self.mode,
            plan_changed,
        });
    }

    async fn apply_generator(&mut self, cfg: &Configuration) -> bool {
        if self.generator_calibration.is_none()
            && self.calibration_requests < CALIBRATION_REQUEST_LIMIT
        {
            self.calibration_requests += 1;
            debug!(attempt = self.calibration_requests, "requesting generator calibration");
            if let Err(e) = self.send_framed(commands::cmd_request_calibration()).await {
                warn!(error = %e, "calibration request failed");
            }
        }

        self.mode = cfg.mode;
        let before = FrequencyPlan {
            start_mhz: self.generator.start_mhz,
            step_mhz: self.generator.step_mhz,
            points: 0,
        };

        let g = &cfg.generator;
        let target = &mut self.generator;
        target.rf_power_on = g.rf_power_on;
        let power = PowerSetting::new(g.high_power, g.power_level);
        let start_power = PowerSetting::new(g.start_high_power, g.start_power_level);
        let stop_power = PowerSetting::new(g.stop_high_power, g.stop_power_level);
        let steps = u16::try_from(cfg.plan.points).unwrap_or(u16::MAX);

        match cfg.mode {
            Mode::GenCw => {
                target.cw_mhz = g.cw_mhz;
                target.step_mhz = cfg.plan.step_mhz;
                target.power = power;
            }
            Mode::GenSweepFreq => {
                target.start_mhz = cfg.plan.start_mhz;
                target.step_mhz = cfg.plan.step_mhz;
                target.sweep_steps = steps;
                target.stop_mhz = target.start_mhz + steps as f64 * target.step_mhz;
                target.power = power;
                target.step_wait_ms = g.step_wait_ms;
            }
            Mode::GenSweepAmp => {
                target.cw_mhz = g.cw_mhz;
                target.amplitude_steps = g.sweep_power_steps;
                target.start_power = start_power;
                target.stop_power = stop_power;
                target.step_wait_ms = g.step_wait_ms;
            }
            Mode::None if cfg.plan.start_mhz > 0.0 => {
                target.start_mhz = cfg.plan.start_mhz;
                target.cw_mhz = g.cw_mhz;
                target.sweep_steps = steps;
                target.step_mhz = cfg.plan.step_mhz;
                target.stop_mhz = target.start_mhz + steps as f64 * target.step_mhz;
                target.power = power;
                target.amplitude_steps = g.sweep_power_steps;
                target.start_power = start_power;
                target.stop_power = stop_power;
                target.step_wait_ms = g.step_wait_ms;
            }
            _ => warn!(raw = %cfg.raw, "unknown signal generator configuration"),
        }

        (target.min_freq_mhz, target.max_freq_mhz) = if cfg.expansion_active {
            (RFGEN_EXPANSION_MIN_FREQ_MHZ, RFGEN_EXPANSION_MAX_FREQ_MHZ)
        } else {
            (RFGEN_MIN_FREQ_MHZ, RFGEN_MAX_FREQ_MHZ)
        };
        self.expansion_active = cfg.expansion_active;
        self.active_model = self.main_model;

        FrequencyPlan {
            start_mhz: target.start_mhz,
            step_mhz: target.step_mhz,
            points: 0,
        }
        .differs_from(&before)
    }

    async fn apply_analyzer(&mut self, cfg: &Configuration) -> bool {
        self.mode = cfg.mode;
        let sniffer = cfg.mode == Mode::Sniffer;

        let mut plan_changed = false;
        if !sniffer {
            plan_changed = cfg.plan.differs_from(&self.analyzer.plan);
            if plan_changed {
                debug!(
                    start_mhz = cfg.plan.start_mhz,
                    step_mhz = cfg.plan.step_mhz,
                    "new frequency range"
                );
            }
            self.analyzer.plan = cfg.plan;
            self.analyzer.top_dbm = cfg.analyzer.top_dbm;
            self.analyzer.bottom_dbm = cfg.analyzer.bottom_dbm;
        }

        self.expansion_active = cfg.expansion_active;
        self.active_model = if self.expansion_active {
            self.expansion_model
        } else {
            self.main_model
        };

        if self.active_model == Model::WSub3G {
            self.analyzer.calculator = cfg.analyzer.calculator;
            self.sync_max_hold().await;
        }

        if sniffer {
            let s = &mut self.sniffer;
            s.baud_rate = cfg.sniffer.baud_rate;
            s.threshold_dbm = cfg.sniffer.threshold_dbm;
            s.reference_mhz = cfg.plan.start_mhz;
            s.modulation = cfg.sniffer.modulation;
            s.rbw_khz = cfg.sniffer.rbw_khz;
        } else {
            let a = &mut self.analyzer;
            a.min_freq_mhz = cfg.analyzer.min_freq_mhz;
            a.max_freq_mhz = cfg.analyzer.max_freq_mhz;
            a.max_span_mhz = cfg.analyzer.max_span_mhz;
            a.offset_db = cfg.analyzer.offset_db;
            a.rbw_khz = cfg.analyzer.rbw_khz;
            a.calculator = cfg.analyzer.calculator;
            a.min_span_mhz = match self.active_model {
                Model::Ghz2400 | Model::Ghz6 => WIDE_BAND_MIN_SPAN_MHZ,
                _ => 0.001 * cfg.plan.points as f64,
            };
        }

        if plan_changed && self.config.auto_clean && !self.sweeps.is_empty() {
            debug!(dropped = self.sweeps.len(), "sweep buffer cleared");
            self.sweeps.clean_all();
        }
        plan_changed
    }

    /// Keep the WSUB3G calculator in step with [`SessionConfig::use_max_hold`].
    async fn sync_max_hold(&mut self) {
        let calculator = self.analyzer.calculator;
        let command = if self.config.use_max_hold && calculator != Calculator::MaxHold {
            info!("switching analyzer to max hold for reliable DSP with fast signals");
            commands::cmd_max_hold()
        } else if !self.config.use_max_hold && calculator == Calculator::MaxHold {
            info!("analyzer not in max hold; fast signals may be missed");
            commands::cmd_realtime()
        } else {
            return;
        };
        if let Err(e) = self.send_framed(command).await {
            warn!(error = %e, "calculator update failed");
        }
    }

    // -----------------------------------------------------------------
    // Sweeps and text
    // -----------------------------------------------------------------

    fn handle_sweep(&mut self, record: SweepRecord) {
        if self.mode == Mode::Tracking {
            trace!("sweep ignored in tracking mode");
            return;
        }
        if self.hold {
            self.timing.touch(Local::now());
            return;
        }

        let captured_at = record.captured_at();
        if !self.config.store_sweeps {
            self.sweeps.clean_all();
        }
        match self.sweeps.try_add(record) {
            Ok(()) => self.emit(DeviceEvent::SweepAdded {
                count: self.sweeps.len(),
            }),
            Err(e) => warn!(error = %e, "sweep dropped"),
        }
        if self.sweeps.is_full() {
            warn!(count = self.sweeps.len(), "sweep buffer full, entering hold");
            self.hold = true;
            self.emit(DeviceEvent::BufferFull);
        }
        self.timing.record(captured_at);
    }

    fn handle_line(&mut self, line: &str) {
        let message = match decode_line(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, line, "dropping undecodable line");
                return;
            }
        };

        match message {
            Message::Ack => {
                debug!("device acknowledged");
                self.emit(DeviceEvent::Acknowledged);
            }
            Message::Dsp(dsp) => {
                debug!(?dsp, "DSP mode");
                self.dsp = dsp;
            }
            Message::SerialNumber(serial) => {
                debug!(serial = %serial, "serial number");
                self.serial_number = serial;
            }
            Message::Model {
                main,
                expansion,
                firmware,
                generator,
            } => {
                info!(
                    main = %main,
                    expansion = %expansion,
                    firmware = %firmware,
                    generator,
                    "device identified"
                );
                self.main_model = main;
                self.expansion_model = expansion;
                self.firmware = firmware.clone();
                if self.active_model == Model::None {
                    self.active_model = main;
                }
                self.emit(DeviceEvent::ModelIdentified {
                    main,
                    expansion,
                    firmware,
                });
            }
            Message::GeneratorCalibration(cal) => {
                debug!(entries = cal.entries(), "generator calibration received");
                self.generator_calibration = Some(cal);
            }
            Message::ResetBanner => {
                info!("device reset detected");
                self.emit(DeviceEvent::ResetDetected);
            }
            Message::Obsolete(line) => {
                warn!(line = %line, "configuration from unsupported firmware");
            }
            Message::UnexpectedConfig(line) => {
                warn!(line = %line, "unexpected configuration data");
            }
            Message::Text(text) => {
                debug!(text = %text, "device text");
                self.emit(DeviceEvent::Text(text));
            }
        }
    }

    // -----------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------

    async fn send(&self, data: Vec<u8>) -> Result<()> {
        let io = self.io.as_ref().ok_or(Error::NotConnected)?;
        if !io.is_connected() {
            return Err(Error::NotConnected);
        }
        trace!(data = ?data, "command");
        io.send(data, self.config.command_timeout).await
    }

    async fn send_framed(&self, frame: Result<Vec<u8>>) -> Result<()> {
        self.send(frame?).await
    }

    /// Frame and send an arbitrary command payload.
    pub async fn send_command(&self, payload: &[u8]) -> Result<()> {
        self.send(commands::encode_command(payload)?).await
    }

    fn require_analyzer(&self, what: &str) -> Result<()> {
        if self.is_generator() {
            return Err(Error::Unsupported(format!("{what} needs a spectrum analyzer")));
        }
        Ok(())
    }

    fn require_generator(&self, what: &str) -> Result<()> {
        if self.is_analyzer() {
            return Err(Error::Unsupported(format!("{what} needs a signal generator")));
        }
        Ok(())
    }

    pub async fn request_config(&self) -> Result<()> {
        self.send(commands::cmd_request_config()?).await
    }

    /// Ask the device to stop sending sweeps.
    pub async fn hold(&self) -> Result<()> {
        self.send(commands::cmd_hold()?).await
    }

    pub async fn realtime(&self) -> Result<()> {
        self.require_analyzer("realtime calculator")?;
        self.send(commands::cmd_realtime()?).await
    }

    pub async fn max_hold(&self) -> Result<()> {
        self.require_analyzer("max hold calculator")?;
        self.send(commands::cmd_max_hold()?).await
    }

    /// Re-initialize the max-hold buffers inside the device.
    pub async fn reset_internal_buffers(&self) -> Result<()> {
        self.send(commands::cmd_reset_buffers()?).await
    }

    pub async fn request_internal_calibration(&self) -> Result<()> {
        self.send(commands::cmd_request_calibration()?).await
    }

    pub async fn screen(&self, on: bool) -> Result<()> {
        self.send(commands::cmd_screen(on)?).await
    }

    pub async fn disable_screen_dump(&self) -> Result<()> {
        self.send(commands::cmd_disable_screen_dump()?).await
    }

    pub async fn set_sweep_points(&self, points: u16) -> Result<()> {
        self.require_analyzer("sweep points")?;
        self.send(commands::cmd_sweep_points(points)?).await
    }

    pub async fn set_input_stage(&self, stage: InputStage) -> Result<()> {
        self.require_analyzer("input stage")?;
        self.send(commands::cmd_input_stage(stage)?).await
    }

    /// Reconfigure the analyzer range and amplitude scale, optionally
    /// deriving the point count from a resolution bandwidth.
    pub async fn update_analyzer_config(
        &self,
        start_mhz: f64,
        end_mhz: f64,
        top_dbm: f64,
        bottom_dbm: f64,
        rbw_khz: Option<f64>,
    ) -> Result<()> {
        self.require_analyzer("analyzer configuration")?;
        let command =
            commands::cmd_analyzer_config(start_mhz, end_mhz, top_dbm, bottom_dbm, rbw_khz)?;
        self.send(command).await?;
        tokio::time::sleep(self.config.config_settle).await;
        Ok(())
    }

    /// Turn max-hold use on WSUB3G analyzers on or off.
    pub async fn set_use_max_hold(&mut self, use_max_hold: bool) -> Result<()> {
        if use_max_hold != self.config.use_max_hold {
            if use_max_hold {
                self.send(commands::cmd_max_hold()?).await?;
            } else if self.analyzer.calculator != Calculator::Normal {
                self.send(commands::cmd_realtime()?).await?;
            }
        }
        self.config.use_max_hold = use_max_hold;
        Ok(())
    }

    pub async fn generator_rf_power(&mut self, on: bool) -> Result<()> {
        self.require_generator("RF power")?;
        self.send(commands::cmd_rf_power(on)?).await?;
        self.generator.rf_power_on = on;
        Ok(())
    }

    pub async fn generator_cw(&mut self, cw_mhz: f64, power: PowerSetting) -> Result<()> {
        self.require_generator("CW output")?;
        self.send(commands::cmd_generator_cw(cw_mhz, power)?).await?;
        self.generator.cw_mhz = cw_mhz;
        self.generator.power = power;
        Ok(())
    }

    /// Start a frequency sweep. A tracking sweep drives a scalar network
    /// analysis and leaves the generator mode unknown until it reports back.
    pub async fn generator_sweep_freq(
        &mut self,
        sweep: &FrequencySweep,
        tracking: bool,
    ) -> Result<()> {
        self.require_generator("frequency sweep")?;
        self.send(commands::cmd_generator_sweep_freq(sweep, tracking)?)
            .await?;

        let target = &mut self.generator;
        target.start_mhz = sweep.start_mhz;
        target.stop_mhz = sweep.stop_mhz;
        target.sweep_steps = sweep.steps;
        target.step_mhz = sweep.step_mhz();
        target.power = sweep.power;
        target.step_wait_ms = sweep.step_wait_ms;
        if tracking {
            self.mode = Mode::None;
        }
        Ok(())
    }

    pub async fn generator_sweep_amp(&mut self, sweep: &AmplitudeSweep) -> Result<()> {
        self.require_generator("amplitude sweep")?;
        self.send(commands::cmd_generator_sweep_amp(sweep)?).await?;

        let target = &mut self.generator;
        target.cw_mhz = sweep.cw_mhz;
        target.start_power = sweep.start;
        target.stop_power = sweep.stop;
        target.amplitude_steps = sweep.steps;
        target.step_wait_ms = sweep.step_wait_ms;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Close
    // -----------------------------------------------------------------

    fn shutdown_sequence(&self) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        if self.is_analyzer() {
            if self.mode == Mode::Sniffer {
                let a = &self.analyzer;
                frames.push(commands::cmd_analyzer_config(
                    a.plan.start_mhz,
                    a.end_mhz(),
                    a.top_dbm,
                    a.bottom_dbm,
                    None,
                ));
            }
            if !matches!(self.mode, Mode::SpectrumAnalyzer | Mode::Sniffer) {
                frames.push(commands::cmd_request_config());
            }
            frames.push(commands::cmd_hold());
        } else {
            frames.push(commands::cmd_rf_power(false));
        }
        frames.push(commands::cmd_screen(true));
        frames.push(commands::cmd_disable_screen_dump());

        frames
            .into_iter()
            .filter_map(|frame| match frame {
                Ok(frame) => Some(frame),
                Err(e) => {
                    debug!(error = %e, "shutdown command skipped");
                    None
                }
            })
            .collect()
    }

    /// Stop the IO task, put the device in a safe state and close the
    /// transport. Failures along the way are logged, not returned.
    pub async fn close(&mut self) {
        let Some(io) = self.io.take() else {
            return;
        };
        info!("closing device session");

        let sequence = self.shutdown_sequence();
        match io.shutdown(self.config.close_timeout).await {
            Ok(mut transport) => {
                for command in sequence {
                    if let Err(e) = transport.send(&command).await {
                        debug!(error = %e, "shutdown command failed");
                    }
                }
                if let Err(e) = transport.close().await {
                    debug!(error = %e, "transport close failed");
                }
            }
            Err(e) => warn!(error = %e, "IO task did not return the transport"),
        }

        self.main_model = Model::None;
        self.expansion_model = Model::None;
        self.active_model = Model::None;
        self.serial_number.clear();
        self.calibration_requests = 0;
        self.generator_calibration = None;
        self.timing = SweepTiming::default();
        self.state = SessionState::Closed;
        self.emit(DeviceEvent::Disconnected);
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    fn emit(&self, event: DeviceEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether the IO task is running and the transport usable.
    pub fn is_connected(&self) -> bool {
        self.io.as_ref().is_some_and(DeviceIo::is_connected)
    }

    /// A generator session before the model is known follows the intended
    /// device kind.
    pub fn is_generator(&self) -> bool {
        if self.main_model == Model::None {
            self.config.intended_device == DeviceKind::Generator
        } else {
            self.main_model.is_generator()
        }
    }

    pub fn is_analyzer(&self) -> bool {
        !self.is_generator()
    }

    pub fn is_hold(&self) -> bool {
        self.hold
    }

    /// Enter or leave hold; in hold received sweeps are not stored.
    pub fn set_hold(&mut self, hold: bool) {
        self.hold = hold;
    }

    pub fn main_model(&self) -> Model {
        self.main_model
    }

    pub fn expansion_model(&self) -> Model {
        self.expansion_model
    }

    pub fn active_model(&self) -> Model {
        self.active_model
    }

    pub fn is_expansion_active(&self) -> bool {
        self.expansion_active
    }

    /// Firmware version, or `"N/A"` before the device identified itself.
    pub fn firmware(&self) -> &str {
        if self.firmware.is_empty() {
            "N/A"
        } else {
            &self.firmware
        }
    }

    /// Serial number as `xxxx-xxxx-xxxx-xxxx`; empty when not connected.
    pub fn serial_number(&self) -> String {
        if !self.is_connected() {
            return String::new();
        }
        decorate_serial_number(&self.serial_number)
    }

    pub fn dsp_mode(&self) -> DspMode {
        self.dsp
    }

    pub fn analyzer(&self) -> &AnalyzerState {
        &self.analyzer
    }

    pub fn sniffer(&self) -> &SnifferState {
        &self.sniffer
    }

    pub fn generator(&self) -> &GeneratorState {
        &self.generator
    }

    pub fn generator_calibration(&self) -> Option<&GeneratorCalibration> {
        self.generator_calibration.as_ref()
    }

    /// Expected generator output at `mhz` with the current power setting.
    /// `None` until the factory calibration has been read.
    pub fn estimated_generator_amplitude_dbm(&self, mhz: f64) -> Option<f64> {
        self.generator_calibration
            .as_ref()
            .map(|cal| cal.estimated_amplitude_dbm(mhz, self.generator.power))
    }

    /// Last `$C` calibration chunk received.
    pub fn calibration_chunk(&self) -> Option<&[u8]> {
        self.calibration_chunk.as_deref()
    }

    pub fn internal_calibration(&self) -> Option<&[u8]> {
        self.internal_calibration.as_deref()
    }

    /// The configuration frame most recently applied.
    pub fn configuration(&self) -> Option<&Arc<Configuration>> {
        self.configuration.as_ref()
    }

    pub fn center_frequency_mhz(&self) -> f64 {
        self.analyzer.center_mhz()
    }

    pub fn span_mhz(&self) -> f64 {
        self.analyzer.span_mhz()
    }

    pub fn end_frequency_mhz(&self) -> f64 {
        self.analyzer.end_mhz()
    }

    /// Usable frequency range of the active board or generator.
    pub fn frequency_range_mhz(&self) -> (f64, f64) {
        if self.is_generator() {
            (self.generator.min_freq_mhz, self.generator.max_freq_mhz)
        } else {
            (self.analyzer.min_freq_mhz, self.analyzer.max_freq_mhz)
        }
    }

    pub fn sweeps(&self) -> &SweepBuffer {
        &self.sweeps
    }

    pub fn sweeps_mut(&mut self) -> &mut SweepBuffer {
        &mut self.sweeps
    }

    /// Average time between sweeps, once enough sweeps have arrived.
    pub fn average_sweep_secs(&self) -> Option<f64> {
        self.timing.average_secs
    }

    pub fn amplitude_calibration(&self) -> Option<&CalibrationTable> {
        self.amplitude_calibration.as_ref()
    }

    pub fn set_amplitude_calibration(&mut self, table: Option<CalibrationTable>) {
        self.amplitude_calibration = table;
    }

    /// Amplitude of `record` at `index`, corrected by the amplitude
    /// calibration table when one is loaded.
    pub fn amplitude_dbm(&self, record: &SweepRecord, index: usize) -> f64 {
        match &self.amplitude_calibration {
            Some(table) => record.corrected_amplitude(index, table),
            None => record.amplitude(index),
        }
    }

    /// Frequency and amplitude of the strongest point in the latest sweep.
    pub fn peak(&self) -> Option<(f64, f64)> {
        let record = self.sweeps.latest()?;
        let index = record.peak_index();
        Some((record.frequency_mhz(index), self.amplitude_dbm(record, index)))
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if let Some(io) = &self.io {
            io.cancel.cancel();
        }
    }
}
