mod cli;

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells::Bash};
use itertools::Itertools;
use json::JsonValue;
use log::error;

use chroma_hipot::port::{self, SerialPort};
use chroma_hipot::results::{AcReadings, DcReadings, OsReadings};
use chroma_hipot::{
    AcStep, CancelToken, DcStep, LinkConfig, Measurement, Model, Readings, Session,
};

use cli::{Cli, Commands};

enum OutputFormat {
    Plain,
    Json,
}

type PortSession = Session<Box<dyn SerialPort>>;

fn measurement_to_line(m: &Measurement) -> String {
    let fields = match &m.readings {
        Readings::Ac(AcReadings {
            voltage,
            current,
            ramp_time,
            test_time,
            fall_time,
        }) => format!(
            "{} V {:.7} A ramp {:.1} s test {:.1} s fall {:.1} s",
            voltage, current, ramp_time, test_time, fall_time
        ),
        Readings::Dc(dc) => {
            let mut line = format!("{} V {:.7} A", dc.voltage, dc.current);
            if let Some(inrush) = dc.inrush {
                line += &format!(" inrush {:.7} A", inrush);
            }
            line += &format!(" ramp {:.1} s", dc.ramp_time);
            if let Some(dwell) = dc.dwell_time {
                line += &format!(" dwell {:.1} s", dwell);
            }
            line += &format!(" test {:.1} s fall {:.1} s", dc.test_time, dc.fall_time);
            line
        }
        Readings::Os(OsReadings {
            voltage,
            capacitance_pf,
            test_time,
        }) => format!("{} V {} pF test {:.1} s", voltage, capacitance_pf, test_time),
        Readings::Gc => String::new(),
    };

    format!("{} {} {} {}", m.step, m.mode, m.result_code, fields)
        .trim_end()
        .to_string()
}

fn measurement_to_json(m: &Measurement) -> JsonValue {
    let mut obj = JsonValue::new_object();
    obj["step"] = m.step.into();
    obj["result code"] = m.result_code.as_str().into();
    obj["mode"] = m.mode.to_string().into();

    match &m.readings {
        Readings::Ac(ac) => {
            obj["voltage"] = ac.voltage.into();
            obj["current"] = ac.current.into();
            obj["ramp time"] = ac.ramp_time.into();
            obj["test time"] = ac.test_time.into();
            obj["fall time"] = ac.fall_time.into();
        }
        Readings::Dc(DcReadings {
            voltage,
            current,
            inrush,
            ramp_time,
            dwell_time,
            test_time,
            fall_time,
        }) => {
            obj["voltage"] = (*voltage).into();
            obj["current"] = (*current).into();
            if let Some(inrush) = inrush {
                obj["inrush"] = (*inrush).into();
            }
            obj["ramp time"] = (*ramp_time).into();
            if let Some(dwell) = dwell_time {
                obj["dwell time"] = (*dwell).into();
            }
            obj["test time"] = (*test_time).into();
            obj["fall time"] = (*fall_time).into();
        }
        Readings::Os(os) => {
            obj["voltage"] = os.voltage.into();
            obj["cap_pF"] = os.capacitance_pf.into();
            obj["test time"] = os.test_time.into();
        }
        Readings::Gc => {}
    }

    obj
}

fn format_measurements(measurements: &[Measurement], fmt: OutputFormat) -> String {
    match fmt {
        OutputFormat::Plain => measurements.iter().map(measurement_to_line).join("\n"),
        OutputFormat::Json => json::stringify(
            measurements
                .iter()
                .map(measurement_to_json)
                .collect::<Vec<_>>(),
        ),
    }
}

fn cmd_list_models(fmt: OutputFormat) -> Result<String> {
    Ok(match fmt {
        OutputFormat::Plain => Model::all()
            .iter()
            .map(|model| format!("{:<14}{}", model.id(), model.name()))
            .join("\n"),
        OutputFormat::Json => json::stringify(
            Model::all()
                .iter()
                .map(|model| model.id())
                .collect::<Vec<_>>(),
        ),
    })
}

fn cmd_identify(session: &mut PortSession, fmt: OutputFormat) -> Result<String> {
    let identity = session
        .identify()
        .context("Failed to identify instrument")?;
    Ok(match fmt {
        OutputFormat::Plain => identity,
        OutputFormat::Json => json::stringify(identity),
    })
}

fn cmd_result(session: &mut PortSession, step: u8, fmt: OutputFormat) -> Result<String> {
    let measurement = session
        .get_result(step)
        .with_context(|| format!("Failed to read result of step {}", step))?;
    Ok(match fmt {
        OutputFormat::Plain => measurement_to_line(&measurement),
        OutputFormat::Json => json::stringify(measurement_to_json(&measurement)),
    })
}

fn cmd_wait(session: &mut PortSession, fmt: OutputFormat) -> Result<String> {
    let measurements = session
        .wait_and_return_results()
        .context("Failed to collect test results")?;
    Ok(format_measurements(&measurements, fmt))
}

fn do_main() -> Result<String> {
    if std::env::var("GENERATE_COMPLETION").is_ok() {
        generate(Bash, &mut Cli::command(), "hipot-tool", &mut io::stdout());

        return Ok(String::default());
    }

    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.debug {
        "debug"
    } else {
        "info"
    }))
    .format_timestamp(None)
    .format_target(false)
    .init();

    let fmt = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Plain
    };

    if let Commands::ListModels = cli.command {
        return cmd_list_models(fmt);
    }

    let timeout = Duration::from_millis(cli.timeout_ms);
    let port = port::open_port(&cli.port, cli.baudrate, timeout, cli.force)
        .with_context(|| format!("Can't open port '{}'", cli.port))?;
    let config = LinkConfig::default()
        .with_read_timeout(timeout)
        .with_poll_interval(Duration::from_millis(cli.poll_ms))
        .with_poll_timeout(Duration::from_secs(cli.wait_s));
    let mut session = Session::with_config(port, cli.model, config, CancelToken::new());

    match cli.command {
        Commands::ListModels => cmd_list_models(fmt),
        Commands::Identify => cmd_identify(&mut session, fmt),
        Commands::Start => session.start().map(|_| String::new()),
        Commands::Stop => session.stop().map(|_| String::new()),
        Commands::Clear => session.clear_steps().map(|_| String::new()),
        Commands::ProgramAc {
            step,
            voltage,
            ramp,
            test,
            fall,
            high_limit,
            low_limit,
            arc_limit,
        } => session
            .program_ac(&AcStep {
                step,
                voltage,
                ramp_time: ramp,
                test_time: test,
                fall_time: fall,
                high_limit,
                low_limit,
                arc_limit,
            })
            .with_context(|| format!("Failed to program AC step {}", step))
            .map(|_| String::new()),
        Commands::ProgramDc {
            step,
            voltage,
            ramp,
            dwell,
            test,
            fall,
            high_limit,
            low_limit,
            arc_limit,
            inrush,
        } => session
            .program_dc(&DcStep {
                step,
                voltage,
                ramp_time: ramp,
                dwell_time: dwell,
                test_time: test,
                fall_time: fall,
                high_limit,
                low_limit,
                arc_limit,
                inrush,
            })
            .with_context(|| format!("Failed to program DC step {}", step))
            .map(|_| String::new()),
        Commands::GetResult { step } => cmd_result(&mut session, step, fmt),
        Commands::Wait => cmd_wait(&mut session, fmt),
        Commands::Run => {
            session.start().context("Failed to start test")?;
            cmd_wait(&mut session, fmt)
        }
    }
}

fn main() {
    match do_main() {
        Ok(s) if s.is_empty() => {}
        Ok(s) => println!("{}", s),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
