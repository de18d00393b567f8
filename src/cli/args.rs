use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about,
    help_template(
        "{before-help}{name} {version}\n{author-with-newline}{about-with-newline}\n{usage-heading} {usage}\n\n{all-args}{after-help}"
    )
)]
pub struct Args {
    /// Path to the simulation configuration (JSON or TOML).
    #[arg(short, long, default_value = "simulation.json")]
    pub config: PathBuf,

    /// Directory holding the Gerber, drill and place files.
    #[arg(short, long, default_value = ".")]
    pub input: PathBuf,

    /// Directory to which output files should be saved.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Rasterize and mesh the Gerber files.
    #[arg(long)]
    pub convert: bool,

    /// Build the simulation geometry.
    #[arg(short, long)]
    pub geometry: bool,

    /// Run the field solver for every excited port.
    #[arg(short, long)]
    pub simulate: bool,

    /// Compute S-parameters and impedances from the solver output.
    #[arg(short, long)]
    pub postprocess: bool,

    /// Run all stages, including conversion.
    #[arg(short, long)]
    pub all: bool,

    /// Record the electric field in every dielectric layer.
    #[arg(long)]
    pub export_field: bool,

    /// Solver threads per excitation.
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Excitations simulated concurrently.
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    /// Solver attempts per excitation. Defaults to the configured value.
    #[arg(long)]
    pub max_attempts: Option<usize>,

    /// Re-run excitations that already have results.
    #[arg(long)]
    pub fresh: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    pub debug: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long)]
    pub log: Option<String>,
}
