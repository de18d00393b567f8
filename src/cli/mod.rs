use std::collections::HashSet;
use std::fs::canonicalize;
use std::path::PathBuf;

use clap::Parser;
use env_logger::Env;

use crate::cli::args::Args;
use crate::cli::progress::StepContext;
use crate::config::parse_config;
use crate::plan::{execute_plan, ExecutePlanParams, TaskKey};
use crate::sim::{OpenEms, OrchestratorOpts};
use crate::tools::SystemRunner;
use crate::Result;

pub mod args;
pub mod progress;

pub const BANNER: &str = r"
  ___ _ __ ___  ___  __ _  ___ _ __
 / _ \ '_ ` _ \/ __|/ _` |/ _ \ '_ \
|  __/ | | | | \__ \ (_| |  __/ | | |
 \___|_| |_| |_|___/\__, |\___|_| |_|
                    |___/

EMSGEN v0.1
";

fn init_logging(args: &Args) {
    let level = match (&args.log, args.debug) {
        (Some(level), _) => level.as_str(),
        (None, true) => "debug",
        (None, false) => "warn",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
}

fn selected_tasks(args: &Args) -> HashSet<TaskKey> {
    if args.all {
        return TaskKey::all();
    }
    let tasks: HashSet<_> = [
        (args.convert, TaskKey::Convert),
        (args.geometry, TaskKey::BuildGeometry),
        (args.simulate, TaskKey::Simulate),
        (args.postprocess, TaskKey::Postprocess),
    ]
    .into_iter()
    .filter_map(|(a, b)| if a { Some(b) } else { None })
    .collect();

    if tasks.is_empty() {
        TaskKey::defaults()
    } else {
        tasks
    }
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let config_path = canonicalize(&args.config)?;
    let input_dir = canonicalize(&args.input)?;

    println!("{BANNER}");

    let tasks = selected_tasks(&args);
    let mut ctx = StepContext::new(&tasks);

    let config = ctx.check(parse_config(&config_path).map_err(Into::into))?;
    ctx.finish(TaskKey::LoadConfig);

    println!("Configuration file: {:?}", &config_path);
    println!("Simulation parameters:");
    println!(
        "\tFrequency: {} Hz to {} Hz ({} points)",
        config.frequency.start, config.frequency.stop, config.frequency.points
    );
    println!("\tPorts: {}", config.ports.len());
    println!("\tExcited ports: {:?}", config.excited_ports());
    println!("\tLayers: {}", config.layers.len());

    let work_dir = args.output_dir.clone().unwrap_or_else(|| PathBuf::from("emsgen"));
    std::fs::create_dir_all(&work_dir)?;
    let work_dir = canonicalize(work_dir)?;

    let opts = OrchestratorOpts::builder()
        .max_attempts(args.max_attempts.unwrap_or(config.simulation.max_attempts))
        .jobs(args.jobs)
        .resume(!args.fresh)
        .build()?;
    let solver = OpenEms::new(SystemRunner, args.threads);

    let res = execute_plan(ExecutePlanParams {
        config: &config,
        input_dir: &input_dir,
        work_dir: &work_dir,
        tasks: &tasks,
        export_field: args.export_field,
        runner: &SystemRunner,
        solver: &solver,
        opts,
        ctx: Some(&mut ctx),
    });

    ctx.check(res)?;
    println!("Artifacts saved to: {:?}\n", &work_dir);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks(argv: &[&str]) -> HashSet<TaskKey> {
        let args = Args::parse_from(std::iter::once("emsgen").chain(argv.iter().copied()));
        selected_tasks(&args)
    }

    #[test]
    fn test_task_selection() {
        assert_eq!(tasks(&[]), TaskKey::defaults());
        assert_eq!(tasks(&["-a"]), TaskKey::all());
        assert_eq!(
            tasks(&["-s", "-p"]),
            HashSet::from([TaskKey::Simulate, TaskKey::Postprocess])
        );
        assert_eq!(tasks(&["--convert"]), HashSet::from([TaskKey::Convert]));
    }
}
