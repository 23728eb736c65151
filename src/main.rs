mod cli;
mod config;
mod dispatch;
mod error;
mod hardware;
mod prompt;
mod recovery;
mod scripts;
mod state;
mod transport;
mod ui;
mod unit;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command};
use config::MmuConfig;
use dispatch::{CommandDispatcher, MmuCommand};
use hardware::{SensorBehavior, SimRig};
use ui::{CommandProgress, Reporter};
use unit::Mmu;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = MmuConfig::load(cli.config.as_deref())?;
    if cli.debug {
        cfg.debug = true;
    }
    cfg.validate()?;

    // No printer attached here: the binary drives the simulated rig.
    // Production deployments wire MmuIo to the firmware instead.
    let rig = SimRig::new();
    if let Some(temp) = cli.hotend_temp {
        rig.set_temperature(temp);
    }
    if cli.dead_finda {
        rig.set_finda(SensorBehavior::Stuck(false));
    }

    let debug = cfg.debug;
    let mmu = Mmu::new(cfg, rig.io(), Reporter::new(debug));
    let mut dispatcher = CommandDispatcher::new(mmu);

    match cli.command {
        Command::Status => {
            let snapshot = dispatcher.mmu().status_snapshot();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            if let Some(record) = dispatcher.failure_record() {
                println!("pending replay: {} ({})", record.command, record.error);
            }
        }
        Command::Sensors => dispatcher.mmu_mut().report_sensors(),
        Command::Get { param } => {
            let value = dispatcher.mmu().cfg.get_param(&param)?;
            println!("{param}: {value}");
        }
        Command::Set { param, value } => {
            dispatcher.mmu_mut().cfg.set_param(&param, &value)?;
            let updated = dispatcher.mmu().cfg.get_param(&param)?;
            println!("{param}: {updated}");
        }
        Command::Demo => run_demo(&mut dispatcher),
        other => {
            if let Some(command) = to_mmu_command(other) {
                let progress = CommandProgress::start(&command.to_string());
                let report = dispatcher.dispatch(command);
                progress.finish(&report);
                progress.print_report(&report);
                if !report.succeeded {
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn to_mmu_command(command: Command) -> Option<MmuCommand> {
    match command {
        Command::Home => Some(MmuCommand::Home),
        Command::HomeOnly => Some(MmuCommand::HomeOnly),
        Command::HomeIdler => Some(MmuCommand::HomeIdler),
        Command::Select { tool } => Some(MmuCommand::SelectTool(tool)),
        Command::Unselect => Some(MmuCommand::UnselectTool),
        Command::Load { tool } => Some(MmuCommand::LoadTool(tool)),
        Command::Unload => Some(MmuCommand::UnloadTool),
        Command::Change { tool } => Some(MmuCommand::ChangeTool(tool)),
        Command::Cut { tool } => Some(MmuCommand::CutTool(tool)),
        Command::Eject => Some(MmuCommand::EjectTool),
        Command::Calibrate => Some(MmuCommand::CalibratePulley),
        Command::Pause => Some(MmuCommand::Pause),
        Command::Resume => Some(MmuCommand::Resume),
        Command::Unlock => Some(MmuCommand::Unlock),
        Command::Status
        | Command::Sensors
        | Command::Get { .. }
        | Command::Set { .. }
        | Command::Demo => None,
    }
}

/// Scripted session against the simulated rig: home, two tool changes, a
/// full unload, a final eject, then the state snapshot.
fn run_demo(dispatcher: &mut CommandDispatcher) {
    let sequence = [
        MmuCommand::Home,
        MmuCommand::ChangeTool(0),
        MmuCommand::ChangeTool(2),
        MmuCommand::UnloadTool,
        MmuCommand::EjectTool,
    ];
    for command in sequence {
        let progress = CommandProgress::start(&command.to_string());
        let report = dispatcher.dispatch(command);
        progress.finish(&report);
        if !report.succeeded {
            break;
        }
    }

    let snapshot = dispatcher.mmu().status_snapshot();
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).unwrap_or_default()
    );
}
