// instrlib test application -- CLI tool for exercising the instrlib
// backends (Cordis, Fluke, Druck, SureFlow) against real hardware or a
// mock transport.
//
// Usage:
//   instrlib-test-app list-ports
//   instrlib-test-app discover --poll
//   instrlib-test-app --mock discover --poll
//   instrlib-test-app --family cordis --port /dev/ttyUSB0 info
//   instrlib-test-app --family cordis --port /dev/ttyUSB0 get command_full_scale
//   instrlib-test-app --family cordis --port /dev/ttyUSB0 set CZERO 10
//   instrlib-test-app --family cordis --port /dev/ttyUSB0 valve disable-exhaust
//   instrlib-test-app --family cordis --port /dev/ttyUSB0 \
//       leak-test --max-allowable -0.4 --deadline 120
//   instrlib-test-app --family sensor --port /dev/ttyUSB4 refresh
//   instrlib-test-app --family fluke8846 --port /dev/ttyUSB1 measure current
//   instrlib-test-app --family sureflow --mock monitor --count 5

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use instrlib::cordis::models::write_keyword;
use instrlib::cordis::protocol::format_set;
use instrlib::cordis::{
    CordisBuilder, CordisController, ControllerVariant, ExternalSensor, LeakTestConfig,
    SensorBuilder, SensorTelemetry, SetOutcome, Telemetry,
};
use instrlib::discovery::{connect, Prober};
use instrlib::druck::{Pace1000, Pace1000Builder};
use instrlib::fluke::{Fluke2700, Fluke2700Builder, Fluke8846, Fluke8846Builder};
use instrlib::sureflow::{SureFlow, SureFlowBuilder};
use instrlib::{Instrument, Transport};
use instrlib_test_harness::{MockLock, MockOpener, MockTransport};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// instrlib test application -- exercises instrument backends from the
/// command line.
#[derive(Parser)]
#[command(name = "instrlib-test-app", version, about)]
struct Cli {
    /// Instrument to connect to. Required for all commands except
    /// `list-ports` and `discover`.
    #[arg(long, value_enum)]
    family: Option<Target>,

    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    /// Required unless --mock is used.
    #[arg(long)]
    port: Option<String>,

    /// Override the family's default baud rate.
    #[arg(long)]
    baud: Option<u32>,

    /// Override the family's exchange timeout, in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Use a simulated instrument instead of a real serial port.
    #[arg(long)]
    mock: bool,

    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Target {
    /// Cordis flow controller.
    Cordis,
    /// Cordis external sensor board.
    Sensor,
    /// Fluke 8846A multimeter.
    Fluke8846,
    /// Fluke 2700G pressure gauge.
    Fluke2700,
    /// GE Druck PACE1000.
    Pace1000,
    /// SureFlow flow standard.
    Sureflow,
}

#[derive(Subcommand)]
enum Command {
    /// List the serial ports the OS reports.
    ListPorts,

    /// Probe every port and print what answered.
    Discover {
        /// Take one reading from every device found.
        #[arg(long)]
        poll: bool,
    },

    /// Print identity and link information.
    Info,

    /// Poll live values and print them.
    Status,

    /// Read one telemetry value (Cordis controller or sensor).
    Get {
        /// Telemetry name or keyword (e.g. command_zero, CZERO).
        name: String,
    },

    /// Write one telemetry value (Cordis controller or sensor).
    Set {
        /// Telemetry name or keyword.
        name: String,
        /// Value to write.
        value: String,
    },

    /// Re-read every telemetry value (Cordis controller or sensor).
    Refresh,

    /// Switch the controller's valves.
    Valve {
        #[arg(value_enum)]
        action: ValveAction,
    },

    /// Close both valves and watch the monitor drift (Cordis controller).
    LeakTest {
        /// Drift (monitor minus baseline) at which the test stops.
        #[arg(long, default_value_t = -0.4, allow_hyphen_values = true)]
        max_allowable: f64,

        /// Give up after this many seconds (0 = no limit).
        #[arg(long, default_value_t = 300)]
        deadline: u64,

        /// Pause between status polls, in milliseconds.
        #[arg(long, default_value_t = 250)]
        interval_ms: u64,
    },

    /// Persist the board's settings (Cordis controller or sensor).
    Save,

    /// Run the controller's automatic calibration (with confirmation).
    AutoCal,

    /// Take a DC measurement (Fluke 8846A).
    Measure {
        #[arg(value_enum)]
        kind: MeasureKind,
    },

    /// Select the meter's DC function (Fluke 8846A).
    Configure {
        #[arg(value_enum)]
        kind: MeasureKind,
    },

    /// Poll the primary reading repeatedly.
    Monitor {
        /// Number of polls.
        #[arg(long, default_value_t = 10)]
        count: u32,

        /// Pause between polls, in milliseconds.
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ValveAction {
    EnableBoth,
    DisableBoth,
    EnableInlet,
    DisableInlet,
    EnableExhaust,
    DisableExhaust,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MeasureKind {
    Volts,
    Current,
}

// ---------------------------------------------------------------------------
// Connected device
// ---------------------------------------------------------------------------

/// Concrete facade behind a connection, so family-specific commands can
/// reach past the `Instrument` trait.
enum Device {
    Controller(CordisController),
    Sensor(ExternalSensor),
    Meter(Fluke8846),
    Gauge(Fluke2700),
    Pace(Pace1000),
    Flow(SureFlow),
}

impl Device {
    fn instrument(&self) -> &dyn Instrument {
        match self {
            Device::Controller(d) => d,
            Device::Sensor(d) => d,
            Device::Meter(d) => d,
            Device::Gauge(d) => d,
            Device::Pace(d) => d,
            Device::Flow(d) => d,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Prompt the user for y/N confirmation. Returns true only if "y" or "Y" entered.
fn confirm(prompt: &str) -> bool {
    print!("{prompt}");
    io::stdout().flush().ok();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    matches!(input.trim(), "y" | "Y")
}

fn outcome_label(outcome: SetOutcome) -> &'static str {
    match outcome {
        SetOutcome::Accepted => "accepted",
        SetOutcome::Rejected => "rejected",
    }
}

fn port_or_mock(cli: &Cli) -> Result<&str> {
    if cli.mock {
        return Ok(cli.port.as_deref().unwrap_or("mock"));
    }
    cli.port
        .as_deref()
        .context("--port is required when not using --mock")
}

// ---------------------------------------------------------------------------
// Mock instruments
// ---------------------------------------------------------------------------

/// A responder that behaves like a healthy instrument of `target`.
///
/// `set` pre-registers the echo for a `set` command so the mock accepts it.
fn mock_transport(target: Target, set: Option<(&str, &str)>) -> MockTransport {
    let mut mock = MockTransport::responder();
    match target {
        Target::Cordis => {
            for t in Telemetry::ALL {
                let reply = format!("{}: 0\r", t.keyword());
                mock.reply(format!("?{}\r", t.keyword()).as_bytes(), reply.as_bytes());
            }
            mock.reply(b"?ID\r", b"ID CS-1000 rev4\r")
                .reply(b"?SN\r", b"SN 12345\r")
                .reply(b"?STAT\r", b": C:1.0  S:100.0  E:0.5\r")
                .reply(b"SAVE\r", b"SAVE\r")
                .reply(b"AUTOC\r", b"AUTOC\r");
            for code in 0..=5 {
                let echo = format!("DVALVE: {code}\r");
                mock.reply(echo.as_bytes(), echo.as_bytes());
            }
        }
        Target::Sensor => {
            for t in SensorTelemetry::ALL {
                let reply = format!("{}: 0\r", t.keyword());
                mock.reply(format!("?{}\r", t.keyword()).as_bytes(), reply.as_bytes());
            }
            mock.reply(b"?ID\r", b"ID ES-100\r")
                .reply(b"?SN\r", b"SN 54321\r")
                .reply(b"?STAT\r", b": ADC::1.234 | SL::0.0 | SH::5.0 | OL::0.5 | OH::4.5\r")
                .reply(b"SAVE\r", b"SAVE\r");
        }
        Target::Fluke8846 => {
            mock.reply(b"\r*idn?\r", b"FLUKE,8846A,1234567,08/02/10-11:53\r")
                .reply(b"\rMEAS:VOLT:DC?\r", b"+1.23400000E+00\r")
                .reply(b"\rMEAS:CURR:DC?\r", b"+1.25000000E-02\r")
                .reply(b"\rCONF?\r", b"\"VOLT +1.00000000E+01,+3.00000000E-06\"\r")
                .reply(b"\rFETCH3?\r", b"+1.23400000E+00\r");
        }
        Target::Fluke2700 => {
            mock.reply(b"\r*idn?\r", b"FLUKE,2700G,9876543,1.04\r")
                .reply(b"\rval?\r", b"14.6959,PSI\r");
        }
        Target::Pace1000 => {
            mock.reply(b"\r\n*idn?\r\n", b"*IDN GE Druck,PACE1000,2345678,02.00.05\r\n")
                .reply(b"\r\n:SENS:PRES?\r\n", b":SENS:PRES 14.6959\r\n")
                .reply(b"\r\n:UNIT:PRES?\r\n", b":UNIT:PRES PSI\r\n");
        }
        Target::Sureflow => {
            mock.reply(b"\r*\r", b"A +014.70 +022.1 +000.00 +000.00\r")
                .reply(b"\rA r76\r", b"A r76 = 4242\r")
                .reply(b"\rA\r", b"A +014.70 +022.1 +012.34 +011.98\r");
        }
    }
    if let Some((keyword, value)) = set {
        let echo = format_set(keyword, value);
        mock.reply(&echo, &echo);
    }
    mock
}

/// The keyword a `set` command will put on the wire, for the mock's echo
/// table.
fn mock_set_keyword(cli: &Cli) -> Option<(String, String)> {
    let Command::Set { name, value } = &cli.command else {
        return None;
    };
    let keyword = match cli.family? {
        Target::Cordis => {
            let t = name.parse::<Telemetry>().ok()?;
            write_keyword(ControllerVariant::Standard, t)?.to_string()
        }
        Target::Sensor => name.parse::<SensorTelemetry>().ok()?.write_keyword().to_string(),
        _ => return None,
    };
    Some((keyword, value.clone()))
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

async fn create_device(cli: &Cli) -> Result<Device> {
    let target = cli
        .family
        .context("--family is required for this command")?;
    let port = port_or_mock(cli)?;
    let timeout = cli.timeout_ms.map(Duration::from_millis);

    let mock: Option<Box<dyn Transport>> = if cli.mock {
        let set = mock_set_keyword(cli);
        let set = set.as_ref().map(|(k, v)| (k.as_str(), v.as_str()));
        Some(Box::new(mock_transport(target, set)))
    } else {
        None
    };

    let device = match target {
        Target::Cordis => {
            let mut builder = CordisBuilder::new().serial_port(port);
            if let Some(baud) = cli.baud {
                builder = builder.baud_rate(baud);
            }
            if let Some(timeout) = timeout {
                builder = builder.command_timeout(timeout);
            }
            let controller = match mock {
                Some(transport) => builder.build_with_transport(transport).await,
                None => builder.build().await,
            }
            .with_context(|| format!("failed to connect to a Cordis controller on {port}"))?;
            Device::Controller(controller)
        }
        Target::Sensor => {
            let mut builder = SensorBuilder::new().serial_port(port);
            if let Some(baud) = cli.baud {
                builder = builder.baud_rate(baud);
            }
            if let Some(timeout) = timeout {
                builder = builder.command_timeout(timeout);
            }
            let sensor = match mock {
                Some(transport) => builder.build_with_transport(transport).await,
                None => builder.build().await,
            }
            .with_context(|| format!("failed to connect to a Cordis sensor on {port}"))?;
            Device::Sensor(sensor)
        }
        Target::Fluke8846 => {
            let mut builder = Fluke8846Builder::new().serial_port(port);
            if let Some(baud) = cli.baud {
                builder = builder.baud_rate(baud);
            }
            if let Some(timeout) = timeout {
                builder = builder.command_timeout(timeout);
            }
            let meter = match mock {
                Some(transport) => builder.build_with_transport(transport).await,
                None => builder.build().await,
            }
            .with_context(|| format!("failed to connect to a Fluke 8846A on {port}"))?;
            Device::Meter(meter)
        }
        Target::Fluke2700 => {
            let mut builder = Fluke2700Builder::new().serial_port(port);
            if let Some(baud) = cli.baud {
                builder = builder.baud_rate(baud);
            }
            if let Some(timeout) = timeout {
                builder = builder.command_timeout(timeout);
            }
            let gauge = match mock {
                Some(transport) => builder.build_with_transport(transport).await,
                None => builder.build().await,
            }
            .with_context(|| format!("failed to connect to a Fluke 2700G on {port}"))?;
            Device::Gauge(gauge)
        }
        Target::Pace1000 => {
            let mut builder = Pace1000Builder::new().serial_port(port);
            if let Some(baud) = cli.baud {
                builder = builder.baud_rate(baud);
            }
            if let Some(timeout) = timeout {
                builder = builder.command_timeout(timeout);
            }
            let pace = match mock {
                Some(transport) => builder.build_with_transport(transport).await,
                None => builder.build().await,
            }
            .with_context(|| format!("failed to connect to a PACE1000 on {port}"))?;
            Device::Pace(pace)
        }
        Target::Sureflow => {
            let mut builder = SureFlowBuilder::new().serial_port(port);
            if let Some(baud) = cli.baud {
                builder = builder.baud_rate(baud);
            }
            if let Some(timeout) = timeout {
                builder = builder.command_timeout(timeout);
            }
            let flow = match mock {
                Some(transport) => builder.build_with_transport(transport).await,
                None => builder.build().await,
            }
            .with_context(|| format!("failed to connect to a SureFlow on {port}"))?;
            Device::Flow(flow)
        }
    };

    let info = device.instrument().info();
    if cli.mock {
        println!("Connected (mock transport) -- {} {}", info.family, info.model_number);
    } else {
        println!("Connected to {port} -- {} {}", info.family, info.model_number);
    }
    Ok(device)
}

// ---------------------------------------------------------------------------
// Commands without a connection
// ---------------------------------------------------------------------------

fn cmd_list_ports() -> Result<()> {
    let ports = instrlib::available_ports();
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }
    for port in &ports {
        let note = if port == instrlib::discovery::CONSOLE_PORT {
            "  (console, never probed)"
        } else {
            ""
        };
        println!("{port}{note}");
    }
    Ok(())
}

async fn cmd_discover(mock: bool, poll: bool) -> Result<()> {
    let (prober, ports) = if mock {
        let mut opener = MockOpener::new();
        let mut ports = Vec::new();
        for (i, target) in [
            Target::Cordis,
            Target::Sensor,
            Target::Fluke8846,
            Target::Fluke2700,
            Target::Pace1000,
            Target::Sureflow,
        ]
        .into_iter()
        .enumerate()
        {
            let port = format!("/dev/mock{i}");
            opener.add_port(&port, move || mock_transport(target, None));
            ports.push(port);
        }
        let prober = Prober::new(Arc::new(opener), Arc::new(MockLock::new()));
        (prober, ports)
    } else {
        (Prober::serial(), instrlib::available_ports())
    };

    println!("Probing {} port(s)...", ports.len());
    let hits = prober.sweep(&ports).await;
    if hits.is_empty() {
        println!("No instruments found.");
        return Ok(());
    }

    println!();
    println!(
        "{:<14}  {:<12}  {:<18}  {:<14}  {:<10}  Reading",
        "Port", "Family", "Kind", "Model", "Serial"
    );
    println!(
        "{:<14}  {:<12}  {:<18}  {:<14}  {:<10}  {}",
        "-".repeat(14),
        "-".repeat(12),
        "-".repeat(18),
        "-".repeat(14),
        "-".repeat(10),
        "-".repeat(12),
    );

    let count = hits.len();
    for hit in hits {
        let port = hit.classification.port.clone();
        let device = match connect(hit).await {
            Ok(device) => device,
            Err(e) => {
                println!("{port:<14}  connect failed: {e}");
                continue;
            }
        };
        let reading = if poll {
            match device.update_values().await {
                Ok(()) => device.reading().await.to_string(),
                Err(e) => format!("poll failed: {e}"),
            }
        } else {
            String::new()
        };
        let info = device.info();
        println!(
            "{:<14}  {:<12}  {:<18}  {:<14}  {:<10}  {}",
            info.port,
            info.family.to_string(),
            info.kind.to_string(),
            info.model_number,
            info.serial_number,
            reading
        );
    }

    println!();
    println!("{count} instrument(s) found.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands on a connected device
// ---------------------------------------------------------------------------

async fn cmd_info(device: &Device) -> Result<()> {
    let instrument = device.instrument();
    let info = instrument.info();

    println!("Instrument Information");
    println!("  Family:         {}", info.family);
    println!("  Kind:           {}", info.kind);
    println!("  Role:           {}", info.kind.role());
    println!("  Model:          {}", info.model_number);
    println!("  Serial:         {}", info.serial_number);
    println!("  Port:           {}", info.port);
    println!("  Link:           {}", instrlib::profile(info.family).link);
    println!("  Connected:      {}", instrument.is_connected());
    if let Device::Controller(c) = device {
        println!("  Variant:        {}", c.variant());
    }
    Ok(())
}

async fn cmd_status(device: &Device) -> Result<()> {
    device
        .instrument()
        .update_values()
        .await
        .context("poll failed")?;

    match device {
        Device::Controller(c) => {
            let status = c.snapshot().await.status;
            println!("Command:  {}", status.command);
            println!("Monitor:  {}", status.monitor);
            println!("Exhaust:  {}", status.exhaust);
            let (inlet, exhaust) = c.valve_state().await;
            println!("Valves:   inlet {inlet}, exhaust {exhaust}");
        }
        Device::Sensor(s) => {
            let status = s.snapshot().await.status;
            println!("Output:       {}", status.output);
            println!("Sensor low:   {}", status.sensor_low);
            println!("Sensor high:  {}", status.sensor_high);
            println!("Out low:      {}", status.out_low);
            println!("Out high:     {}", status.out_high);
        }
        Device::Flow(f) => {
            let snap = f.snapshot().await;
            println!("Pressure:     {}", snap.pressure);
            println!("Temperature:  {}", snap.temperature);
            println!("CCM:          {}", snap.ccm);
            println!("SCCM:         {}", snap.sccm);
        }
        Device::Meter(_) | Device::Gauge(_) | Device::Pace(_) => {
            println!("Reading:  {}", device.instrument().reading().await);
        }
    }
    Ok(())
}

async fn cmd_get(device: &Device, name: &str) -> Result<()> {
    match device {
        Device::Controller(c) => {
            let t: Telemetry = name.parse()?;
            println!("{t}: {}", c.get_telemetry(t).await);
        }
        Device::Sensor(s) => {
            let t: SensorTelemetry = name.parse()?;
            println!("{t}: {}", s.get_telemetry(t).await);
        }
        _ => bail!("get is only supported for Cordis controllers and sensors"),
    }
    Ok(())
}

async fn cmd_set(device: &Device, name: &str, value: &str) -> Result<()> {
    match device {
        Device::Controller(c) => {
            let t: Telemetry = name.parse()?;
            let outcome = c
                .set_telemetry(t, value)
                .await
                .with_context(|| format!("cannot set {t}"))?;
            println!(
                "{t} = {value}: {} (cached: {})",
                outcome_label(outcome),
                c.snapshot().await.get(t)
            );
        }
        Device::Sensor(s) => {
            let t: SensorTelemetry = name.parse()?;
            let outcome = s.set_telemetry(t, value).await;
            println!(
                "{t} = {value}: {} (cached: {})",
                outcome_label(outcome),
                s.snapshot().await.get(t)
            );
        }
        _ => bail!("set is only supported for Cordis controllers and sensors"),
    }
    Ok(())
}

async fn cmd_refresh(device: &Device) -> Result<()> {
    match device {
        Device::Controller(c) => {
            c.refresh_all().await.context("refresh aborted")?;
            let snap = c.snapshot().await;
            for t in Telemetry::ALL {
                println!("{:<20}  {}", t.name(), snap.get(t));
            }
        }
        Device::Sensor(s) => {
            s.refresh_all().await.context("refresh aborted")?;
            let snap = s.snapshot().await;
            for t in SensorTelemetry::ALL {
                println!("{:<20}  {}", t.name(), snap.get(t));
            }
        }
        _ => bail!("refresh is only supported for Cordis controllers and sensors"),
    }
    Ok(())
}

fn controller(device: &Device) -> Result<&CordisController> {
    match device {
        Device::Controller(c) => Ok(c),
        _ => bail!("this command needs --family cordis"),
    }
}

async fn cmd_valve(device: &Device, action: ValveAction) -> Result<()> {
    let c = controller(device)?;
    let outcome = match action {
        ValveAction::EnableBoth => c.enable_valves().await,
        ValveAction::DisableBoth => c.disable_valves().await,
        ValveAction::EnableInlet => c.enable_inlet().await,
        ValveAction::DisableInlet => c.disable_inlet().await,
        ValveAction::EnableExhaust => c.enable_exhaust().await,
        ValveAction::DisableExhaust => c.disable_exhaust().await,
    };
    let (inlet, exhaust) = c.valve_state().await;
    println!(
        "{action:?}: {} (inlet {inlet}, exhaust {exhaust})",
        outcome_label(outcome)
    );
    Ok(())
}

async fn cmd_leak_test(
    device: &Device,
    max_allowable: f64,
    deadline_secs: u64,
    interval_ms: u64,
) -> Result<()> {
    let c = controller(device)?;
    let mut config =
        LeakTestConfig::new(max_allowable).poll_interval(Duration::from_millis(interval_ms));
    if deadline_secs > 0 {
        config = config.deadline(Duration::from_secs(deadline_secs));
    }

    println!("Leak test: valves closed, stopping at drift {max_allowable}");
    let report = c.leak_test(config).await.context("leak test failed")?;

    println!("Baseline:   {}", report.baseline);
    println!("Final:      {}", report.final_monitor);
    println!("Drift:      {:.3}", report.drift);
    println!("Polls:      {}", report.polls);
    println!("Elapsed:    {:.1} s", report.elapsed.as_secs_f64());
    Ok(())
}

async fn cmd_save(device: &Device) -> Result<()> {
    let reply = match device {
        Device::Controller(c) => c.save().await?,
        Device::Sensor(s) => s.save().await?,
        _ => bail!("save is only supported for Cordis controllers and sensors"),
    };
    println!("Saved ({reply})");
    Ok(())
}

async fn cmd_auto_cal(device: &Device) -> Result<()> {
    let c = controller(device)?;
    if !confirm("Run automatic calibration? The valves will move. [y/N] ") {
        println!("Cancelled.");
        return Ok(());
    }
    let reply = c.auto_calibrate().await.context("auto calibration failed")?;
    println!("Auto calibration started ({reply})");
    Ok(())
}

fn meter(device: &Device) -> Result<&Fluke8846> {
    match device {
        Device::Meter(m) => Ok(m),
        _ => bail!("this command needs --family fluke8846"),
    }
}

async fn cmd_measure(device: &Device, kind: MeasureKind) -> Result<()> {
    let m = meter(device)?;
    match kind {
        MeasureKind::Volts => println!("{} V", m.read_volts_dc().await?),
        MeasureKind::Current => println!("{} mA", m.read_current_dc().await?),
    }
    Ok(())
}

async fn cmd_configure(device: &Device, kind: MeasureKind) -> Result<()> {
    let m = meter(device)?;
    match kind {
        MeasureKind::Volts => m.set_voltage().await?,
        MeasureKind::Current => m.set_current().await?,
    }
    println!("Configured for DC {kind:?}");
    Ok(())
}

async fn cmd_monitor(device: &Device, count: u32, interval_ms: u64) -> Result<()> {
    let instrument = device.instrument();
    let started = Instant::now();

    for i in 0..count {
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
        instrument.update_values().await.context("poll failed")?;
        println!(
            "[{:>7.2}s] {}",
            started.elapsed().as_secs_f64(),
            instrument.reading().await
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Command::ListPorts => return cmd_list_ports(),
        Command::Discover { poll } => return cmd_discover(cli.mock, *poll).await,
        _ => {}
    }

    let device = create_device(&cli).await?;

    match &cli.command {
        Command::Info => cmd_info(&device).await,
        Command::Status => cmd_status(&device).await,
        Command::Get { name } => cmd_get(&device, name).await,
        Command::Set { name, value } => cmd_set(&device, name, value).await,
        Command::Refresh => cmd_refresh(&device).await,
        Command::Valve { action } => cmd_valve(&device, *action).await,
        Command::LeakTest {
            max_allowable,
            deadline,
            interval_ms,
        } => cmd_leak_test(&device, *max_allowable, *deadline, *interval_ms).await,
        Command::Save => cmd_save(&device).await,
        Command::AutoCal => cmd_auto_cal(&device).await,
        Command::Measure { kind } => cmd_measure(&device, *kind).await,
        Command::Configure { kind } => cmd_configure(&device, *kind).await,
        Command::Monitor { count, interval_ms } => {
            cmd_monitor(&device, *count, *interval_ms).await
        }
        Command::ListPorts => unreachable!("list-ports handled above"),
        Command::Discover { .. } => unreachable!("discover handled above"),
    }
}
