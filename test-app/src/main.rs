// rfe-cli -- command line tool for exercising RF Explorer analyzers and
// signal generators against real hardware or a mock transport.
//
// Usage:
//   rfe-cli --port /dev/ttyUSB0 info
//   rfe-cli --port /dev/ttyUSB0 monitor --duration 10
//   rfe-cli --port /dev/ttyUSB0 config --start 430 --end 440 --top -20 --bottom -110
//   rfe-cli --port /dev/ttyUSB0 hold
//   rfe-cli --port /dev/ttyUSB1 --generator generator cw --freq 433.92 --level 2
//   rfe-cli --port /dev/ttyUSB1 --generator generator off
//   rfe-cli --mock monitor --sweeps 5

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rfe::config::{analyzer_configuration, encode_analyzer_frame};
use rfe::{
    DeviceEvent, DeviceKind, DeviceSession, FrequencyPlan, PowerSetting, ProcessMode,
    SessionBuilder,
};
use rfe_test_harness::MockTransport;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// rfe-cli -- talk to an RF Explorer from the command line.
#[derive(Parser)]
#[command(name = "rfe-cli", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3). Required unless --mock.
    #[arg(long)]
    port: Option<String>,

    /// Override the default 500000 baud.
    #[arg(long)]
    baud: Option<u32>,

    /// Expect a signal generator instead of a spectrum analyzer.
    #[arg(long)]
    generator: bool,

    /// Seconds to wait for the device to identify itself.
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// Use a mock transport preloaded with synthetic device traffic.
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print model, firmware, serial number and current configuration.
    Info,

    /// Print sweeps and device events as they arrive.
    Monitor {
        /// Stop after this many seconds (0 = until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
        /// Stop after this many sweeps (0 = no limit).
        #[arg(long, default_value_t = 0)]
        sweeps: usize,
    },

    /// Reconfigure the analyzer frequency range and amplitude scale.
    Config {
        /// Start frequency, MHz.
        #[arg(long)]
        start: f64,
        /// End frequency, MHz.
        #[arg(long)]
        end: f64,
        /// Top of the amplitude scale, dBm.
        #[arg(long, default_value_t = 0.0)]
        top: f64,
        /// Bottom of the amplitude scale, dBm.
        #[arg(long, default_value_t = -120.0)]
        bottom: f64,
        /// Requested resolution bandwidth, kHz.
        #[arg(long)]
        rbw: Option<f64>,
    },

    /// Stop the analyzer from sending sweeps.
    Hold,

    /// Signal generator output.
    Generator {
        #[command(subcommand)]
        action: GeneratorAction,
    },
}

#[derive(Subcommand)]
enum GeneratorAction {
    /// Start a CW carrier.
    Cw {
        /// Carrier frequency, MHz.
        #[arg(long)]
        freq: f64,
        /// Use the high power switch.
        #[arg(long)]
        high: bool,
        /// Power level 0-3.
        #[arg(long, default_value_t = 0)]
        level: u8,
    },
    /// Turn the RF output off.
    Off,
}

// ---------------------------------------------------------------------------
// Session construction
// ---------------------------------------------------------------------------

fn mock_transport(generator: bool) -> MockTransport {
    let mut mock = MockTransport::new();
    mock.accept_unexpected_sends(true);

    if generator {
        mock.queue_inbound(b"#C3-M:060,255,01.15\r\n");
        mock.queue_inbound(b"#C3-G:0432144,0432144,0020,0000100,0,2,0\r\n");
        return mock;
    }

    let points = 112;
    let mut cfg = analyzer_configuration(
        FrequencyPlan {
            start_mhz: 430.0,
            step_mhz: 0.1,
            points,
        },
        -20.0,
        -110.0,
    );
    cfg.analyzer.min_freq_mhz = 240.0;
    cfg.analyzer.max_freq_mhz = 960.0;
    cfg.analyzer.max_span_mhz = 100.0;

    mock.queue_inbound(b"#C2-M:003,255,01.12\r\n");
    mock.queue_inbound(b"#SnMOCK0000DEVICE01\r\n");
    mock.queue_inbound(format!("{}\r\n", encode_analyzer_frame(&cfg)).as_bytes());
    for sweep in 0..10u8 {
        let mut frame = vec![b'$', b'S', points as u8];
        frame.extend((0..points).map(|i| if i == 40 + sweep as usize { 60 } else { 200 }));
        frame.extend_from_slice(b"\r\n");
        mock.queue_inbound(&frame);
    }
    mock
}

async fn create_session(cli: &Cli) -> Result<DeviceSession> {
    let kind = if cli.generator {
        DeviceKind::Generator
    } else {
        DeviceKind::Analyzer
    };
    let mut builder = SessionBuilder::new().intended_device(kind);
    if let Some(baud) = cli.baud {
        builder = builder.baud_rate(baud);
    }

    let mut session = if cli.mock {
        let session = builder
            .build_with_transport(Box::new(mock_transport(cli.generator)))
            .await
            .context("failed to build session with mock transport")?;
        println!("Connected (mock transport)");
        session
    } else {
        let port = cli
            .port
            .as_deref()
            .context("--port is required when not using --mock")?;
        tracing::debug!(port, baud = ?cli.baud, "opening serial port");
        let session = builder
            .serial_port(port)
            .build()
            .await
            .with_context(|| format!("failed to open {port}"))?;
        println!("Connected on {port}");
        session
    };

    session
        .wait_for_model(Duration::from_secs(cli.timeout))
        .await
        .context("device did not identify itself")?;
    Ok(session)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_info(session: &mut DeviceSession) -> Result<()> {
    // Give the configuration frame a moment to follow the model line.
    let _ = session.wait_received(Duration::from_secs(1)).await;

    println!("Device Information");
    println!("  Main board:     {}", session.main_model());
    println!("  Expansion:      {}", session.expansion_model());
    println!("  Active board:   {}", session.active_model());
    println!("  Firmware:       {}", session.firmware());
    println!("  Serial number:  {}", session.serial_number());
    println!("  Mode:           {}", session.mode());

    let (min, max) = session.frequency_range_mhz();
    println!("  Range:          {} - {}", rfe::format_freq_mhz(min), rfe::format_freq_mhz(max));

    if session.is_analyzer() {
        let a = session.analyzer();
        println!();
        println!("Analyzer");
        println!("  Start:          {}", rfe::format_freq_mhz(a.plan.start_mhz));
        println!("  Center:         {}", rfe::format_freq_mhz(a.center_mhz()));
        println!("  End:            {}", rfe::format_freq_mhz(a.end_mhz()));
        println!("  Points:         {}", a.plan.points);
        println!("  RBW:            {} kHz", a.rbw_khz);
        println!("  Amplitude:      {} .. {} dBm", a.bottom_dbm, a.top_dbm);
        println!("  Calculator:     {:?}", a.calculator);
    } else {
        let g = session.generator();
        println!();
        println!("Generator");
        println!("  CW:             {}", rfe::format_freq_mhz(g.cw_mhz));
        println!("  Power:          high={} level={}", g.power.high_power, g.power.level);
        println!("  RF output:      {}", if g.rf_power_on { "on" } else { "off" });
        if let Some(dbm) = session.estimated_generator_amplitude_dbm(g.cw_mhz) {
            println!("  Est. output:    {dbm:.1} dBm");
        }
    }
    Ok(())
}

async fn cmd_monitor(
    session: &mut DeviceSession,
    duration_secs: u64,
    max_sweeps: usize,
    mock: bool,
) -> Result<()> {
    let mut events = session.subscribe();
    println!("Monitoring sweeps (Ctrl-C to stop)...");

    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));
    let mut seen = 0usize;

    loop {
        if deadline.is_some_and(|dl| Instant::now() >= dl) {
            println!("Monitor duration elapsed.");
            break;
        }

        match session.wait_received(Duration::from_millis(500)).await {
            Ok(_) => {}
            // A mock device sends its canned traffic once.
            Err(rfe::Error::Timeout) if mock => break,
            Err(rfe::Error::Timeout) => continue,
            Err(e) => return Err(e).context("lost the device"),
        }

        while let Ok(event) = events.try_recv() {
            match event {
                DeviceEvent::SweepAdded { count } => {
                    seen += 1;
                    if let Some((mhz, dbm)) = session.peak() {
                        println!("[sweep {count}] peak {} at {dbm:.1} dBm", rfe::format_freq_mhz(mhz));
                    }
                }
                other => println!("[event] {other:?}"),
            }
        }

        if max_sweeps > 0 && seen >= max_sweeps {
            break;
        }
    }

    if let Some(secs) = session.average_sweep_secs() {
        println!("Average sweep time: {secs:.3} s");
    }
    Ok(())
}

async fn cmd_config(
    session: &mut DeviceSession,
    start: f64,
    end: f64,
    top: f64,
    bottom: f64,
    rbw: Option<f64>,
) -> Result<()> {
    session
        .update_analyzer_config(start, end, top, bottom, rbw)
        .await
        .context("failed to send analyzer configuration")?;
    session.process_received(ProcessMode::All).await?;
    println!(
        "Requested {} - {}",
        rfe::format_freq_mhz(start),
        rfe::format_freq_mhz(end)
    );
    Ok(())
}

async fn cmd_generator(session: &mut DeviceSession, action: &GeneratorAction) -> Result<()> {
    match action {
        GeneratorAction::Cw { freq, high, level } => {
            session
                .generator_cw(*freq, PowerSetting::new(*high, *level))
                .await
                .context("failed to start CW")?;
            session.generator_rf_power(true).await?;
            println!("CW carrier at {}", rfe::format_freq_mhz(*freq));
        }
        GeneratorAction::Off => {
            session.generator_rf_power(false).await?;
            println!("RF output off");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if cli.mock && cli.port.is_some() {
        bail!("--mock and --port are mutually exclusive");
    }
    if matches!(cli.command, Command::Generator { .. }) && !cli.generator {
        bail!("generator commands need --generator");
    }

    let mut session = create_session(&cli).await?;

    let result = match &cli.command {
        Command::Info => cmd_info(&mut session).await,
        Command::Monitor { duration, sweeps } => {
            cmd_monitor(&mut session, *duration, *sweeps, cli.mock).await
        },
        Command::Config {
            start,
            end,
            top,
            bottom,
            rbw,
        } => cmd_config(&mut session, *start, *end, *top, *bottom, *rbw).await,
        Command::Hold => {
            session.hold().await.context("failed to send hold")?;
            session.set_hold(true);
            println!("Hold");
            Ok(())
        }
        Command::Generator { action } => cmd_generator(&mut session, action).await,
    };

    session.close().await;
    result
}
