use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use ventlink_frame::{encode_state, Command as FrameCommand, DeviceState};
use ventlink_session::{
    PollConfig, PollCoordinator, PollEvent, Session, SessionConfig, SessionError, SessionManager,
    UpdateFailed,
};
use ventlink_transport::{Faults, SimulatedUnit};

use crate::cmd::SimulateArgs;
use crate::exit::{session_error, update_failed, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{
    print_json, print_raw, print_table, state_rows, state_summary, to_hex, OutputFormat,
};

#[derive(Serialize)]
struct CycleReport {
    cycle: u32,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<UpdateFailed>,
}

#[derive(Serialize)]
struct ControlReport {
    command: &'static str,
    value: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip)]
    exit_code: i32,
}

#[derive(Serialize)]
struct SimulateOutput {
    address: String,
    auth_status: &'static str,
    cycles: Vec<CycleReport>,
    controls: Vec<ControlReport>,
    state: Option<DeviceState>,
    frames: Vec<&'static str>,
}

#[derive(Serialize)]
struct EventLine<'a> {
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a DeviceState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<&'a UpdateFailed>,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start runtime: {err}")))?;
    runtime.block_on(simulate(args, format))
}

async fn simulate(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let unit = SimulatedUnit::new(args.address.clone(), args.device_password);
    unit.set_faults(Faults {
        refuse_connect: args.refuse_connect,
        suppress_notifications: args.no_notify,
        silent_auth: args.silent_auth,
        garble_reads: args.garble_reads,
        ..Faults::default()
    });

    let manager = SessionManager::new(SessionConfig {
        password: args.password,
        connect_timeout: Duration::from_secs(2),
        command_settle: Duration::from_millis(10),
        auth_settle: args.settle,
        read_settle: args.settle,
        ..SessionConfig::default()
    });
    let session = manager.open(unit.clone());
    let coordinator = PollCoordinator::new(
        Arc::clone(&session),
        PollConfig {
            interval: args.interval,
            settle_window: args.window,
            reconnect_delay: args.interval.min(Duration::from_secs(5)),
            ..PollConfig::default()
        },
    );

    let mut cycles = Vec::new();
    for n in 1..=args.cycles {
        cycles.push(cycle_report(n, coordinator.run_cycle().await));
    }

    let controls = apply_controls(&session, &args).await;
    if controls.iter().any(|c| c.ok) {
        // Out-of-band refresh so the report shows the unit's own view.
        let n = args.cycles + 1;
        cycles.push(cycle_report(n, coordinator.run_cycle().await));
    }

    let out = SimulateOutput {
        address: args.address.clone(),
        auth_status: session.auth_status().as_str(),
        state: session
            .get_current_state()
            .or_else(|| coordinator.cached_state()),
        frames: unit
            .written_codes()
            .into_iter()
            .map(|code| FrameCommand::try_from(code).map_or("UNKNOWN", FrameCommand::name))
            .collect(),
        cycles,
        controls,
    };
    print_summary(&out, format);

    let exit = exit_code(&out);
    if args.follow {
        follow(coordinator, &args, format).await?;
    }
    manager.shutdown().await;
    Ok(exit)
}

fn cycle_report(cycle: u32, outcome: Result<DeviceState, UpdateFailed>) -> CycleReport {
    match outcome {
        Ok(_) => CycleReport {
            cycle,
            ok: true,
            failure: None,
        },
        Err(failed) => CycleReport {
            cycle,
            ok: false,
            failure: Some(failed),
        },
    }
}

fn control_report(
    command: FrameCommand,
    value: String,
    result: Result<(), SessionError>,
) -> ControlReport {
    match result {
        Ok(()) => ControlReport {
            command: command.name(),
            value,
            ok: true,
            error: None,
            exit_code: SUCCESS,
        },
        Err(err) => {
            let cli = session_error(command.name(), &err);
            ControlReport {
                command: command.name(),
                value,
                ok: false,
                error: Some(cli.message),
                exit_code: cli.code,
            }
        }
    }
}

async fn apply_controls(session: &Session<SimulatedUnit>, args: &SimulateArgs) -> Vec<ControlReport> {
    let mut reports = Vec::new();
    if let Some(on) = args.set_power {
        let value = if on { "on" } else { "off" };
        let result = session.set_power(on).await;
        reports.push(control_report(FrameCommand::SetPower, value.to_string(), result));
    }
    if let Some(speed) = args.set_speed {
        let result = session.set_speed(speed).await;
        reports.push(control_report(FrameCommand::SetSpeed, speed.to_string(), result));
    }
    if let Some(mode) = args.set_mode {
        let result = session.set_mode(mode).await;
        reports.push(control_report(FrameCommand::SetMode, mode.to_string(), result));
    }
    if let Some(level) = args.set_brightness {
        let result = session.set_brightness(level).await;
        reports.push(control_report(FrameCommand::SetBrightness, level.to_string(), result));
    }
    if args.reset_filter {
        let result = session.reset_filter().await;
        reports.push(control_report(FrameCommand::ResetFilter, String::new(), result));
    }
    reports
}

/// A failed final cycle wins over a failed control command.
fn exit_code(out: &SimulateOutput) -> i32 {
    if let Some(failed) = out.cycles.last().and_then(|c| c.failure.as_ref()) {
        return update_failed(failed).code;
    }
    out.controls
        .iter()
        .find(|c| !c.ok)
        .map_or(SUCCESS, |c| c.exit_code)
}

fn print_summary(out: &SimulateOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut rows = vec![
                ("address".to_string(), out.address.clone()),
                ("auth".to_string(), out.auth_status.to_string()),
            ];
            for cycle in &out.cycles {
                let result = match &cycle.failure {
                    None => "ok".to_string(),
                    Some(failed) => failed.to_string(),
                };
                rows.push((format!("cycle {}", cycle.cycle), result));
            }
            for control in &out.controls {
                let result = control.error.clone().unwrap_or_else(|| "sent".to_string());
                rows.push((format!("{} {}", control.command, control.value), result));
            }
            rows.push(("frames".to_string(), out.frames.join(", ")));
            print_table(["STEP", "RESULT"], &rows);
            if let Some(state) = &out.state {
                print_table(["FIELD", "VALUE"], &state_rows(state));
            }
        }
        OutputFormat::Pretty => {
            for cycle in &out.cycles {
                match &cycle.failure {
                    None => println!("cycle {}: ok", cycle.cycle),
                    Some(failed) => println!("cycle {}: {failed}", cycle.cycle),
                }
            }
            for control in &out.controls {
                match &control.error {
                    None => println!("{} {}: sent", control.command, control.value),
                    Some(err) => println!("{} {}: {err}", control.command, control.value),
                }
            }
            match &out.state {
                Some(state) => println!("state: {}", state_summary(state)),
                None => println!("state: unavailable"),
            }
        }
        OutputFormat::Raw => {
            if let Some(state) = &out.state {
                print_raw(to_hex(&encode_state(state)).as_bytes());
                println!();
            }
        }
    }
}

fn print_event(event: &PollEvent, format: OutputFormat) {
    match (event, format) {
        (PollEvent::Updated(state), OutputFormat::Json) => print_json(&EventLine {
            event: "updated",
            state: Some(state),
            failure: None,
        }),
        (PollEvent::UpdateFailed(failed), OutputFormat::Json) => print_json(&EventLine {
            event: "update_failed",
            state: None,
            failure: Some(failed),
        }),
        (PollEvent::Updated(state), _) => println!("updated: {}", state_summary(state)),
        (PollEvent::UpdateFailed(failed), _) => println!("{failed}"),
    }
}

async fn follow(
    coordinator: PollCoordinator<SimulatedUnit>,
    args: &SimulateArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let stop = CancellationToken::new();
    let on_interrupt = stop.clone();
    ctrlc::set_handler(move || on_interrupt.cancel()).map_err(|err| {
        CliError::new(INTERNAL, format!("failed to install interrupt handler: {err}"))
    })?;

    let mut events = coordinator.events();
    let handle = coordinator.spawn();
    let deadline = args.duration.map(|d| tokio::time::Instant::now() + d);
    info!(interval = ?args.interval, "following poll events, press Ctrl-C to stop");

    loop {
        let expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            () = stop.cancelled() => break,
            () = expired => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event, format),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "poll events dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown().await;
    Ok(())
}
