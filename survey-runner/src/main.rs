mod reports;
mod util;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::warn;
use std::fs::File;
use std::io::{BufWriter, Read, Write, stderr, stdin, stdout};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use reports::SweepOutcome;
use survey_engine::{
    ClassificationRegistry, SeedOrder, SpawnTableGenerator, SpawnTables, SweepConfig,
    SweepOrchestrator, TargetDescriptor, concat, parse_lines,
};
use util::{parse_int, parse_seed, split_csv};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// One trial record line per target
    Record,
    /// Pretty JSON summary per target
    Json,
    /// Colored table with percentages and odds
    Console,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrderArg {
    /// seed(i) = base + i
    Linear,
    /// seed(i) = LCG advanced i steps from base
    Permuted,
}

impl From<OrderArg> for SeedOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Linear => Self::Linear,
            OrderArg::Permuted => Self::Permuted,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "survey-runner", version)]
#[command(about = "Seed surveys of procedurally generated cave floors")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sweep a seed range over one or more targets
    Sweep(SweepArgs),
    /// Merge trial records covering adjacent seed ranges into one
    Concat(ConcatArgs),
    /// List targets that have a classification rule
    Targets(TargetsArgs),
}

#[derive(Debug, Args)]
struct SweepArgs {
    /// Targets to sweep (comma-separated, e.g. CH8-1,SR-7 or CH28)
    #[arg(long)]
    target: Option<String>,

    /// Base seed (0x-prefixed hex or decimal)
    #[arg(long)]
    seed: Option<String>,

    /// Number of trials (0x-prefixed hex or decimal; non-positive runs none)
    #[arg(long, allow_hyphen_values = true)]
    num: Option<String>,

    /// Seed order
    #[arg(long, value_enum)]
    order: Option<OrderArg>,

    /// Worker threads per sweep
    #[arg(long)]
    workers: Option<usize>,

    /// Abort on the first generation failure instead of skipping the seed
    #[arg(long)]
    strict: bool,

    /// Sweep config JSON; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extra classification rules JSON, registered on top of the built-in catalog
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Spawn tables JSON replacing the built-in tables
    #[arg(long)]
    spawn_tables: Option<PathBuf>,

    /// Output report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Record)]
    report: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Optional path for notable seed lines instead of stderr
    #[arg(long)]
    notable_output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ConcatArgs {
    /// Files of trial record lines; stdin when omitted
    inputs: Vec<PathBuf>,

    /// Optional path to write the merged record instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct TargetsArgs {
    /// Extra classification rules JSON
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Optional path to write the list instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Sweep(args) => run_sweeps(&args),
        Command::Concat(args) => run_concat(&args),
        Command::Targets(args) => list_targets(&args),
    };
    if let Err(err) = outcome {
        eprintln!("{} {err:#}", "error:".red().bold());
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn announce_banner() {
    println!("{}", "🔎 Cave Floor Survey".bright_cyan().bold());
    println!("{}", "====================".cyan());
}

fn load_registry(rules: Option<&Path>) -> Result<ClassificationRegistry> {
    let mut registry = ClassificationRegistry::builtin();
    if let Some(path) = rules {
        registry
            .extend_from_path(path)
            .with_context(|| format!("failed to load rules from {}", path.display()))?;
    }
    Ok(registry)
}

fn load_spawn_tables(path: Option<&Path>) -> Result<Arc<SpawnTables>> {
    let tables = match path {
        Some(path) => SpawnTables::load(path)
            .with_context(|| format!("failed to load spawn tables from {}", path.display()))?,
        None => SpawnTables::default_tables().clone(),
    };
    Ok(Arc::new(tables))
}

/// Per-target configs: the config file (if any) with every given flag applied on top.
fn build_configs(args: &SweepArgs) -> Result<Vec<SweepConfig>> {
    let file_config = args
        .config
        .as_deref()
        .map(|path| {
            SweepConfig::load(path)
                .with_context(|| format!("failed to load sweep config {}", path.display()))
        })
        .transpose()?;

    let targets: Vec<TargetDescriptor> = match (&args.target, &file_config) {
        (Some(list), _) => split_csv(list)
            .iter()
            .map(|raw| {
                raw.parse::<TargetDescriptor>()
                    .with_context(|| format!("invalid target {raw:?}"))
            })
            .collect::<Result<_>>()?,
        (None, Some(config)) => vec![config.target.clone()],
        (None, None) => bail!("no target given; pass --target or --config"),
    };
    if targets.is_empty() {
        bail!("--target lists no targets");
    }

    let base_seed = args.seed.as_deref().map(parse_seed).transpose()?;
    let trial_count = args.num.as_deref().map(parse_int).transpose()?;

    let mut configs = Vec::with_capacity(targets.len());
    for target in targets {
        let mut config = match &file_config {
            Some(file) => SweepConfig {
                target,
                ..file.clone()
            },
            None => SweepConfig::new(target),
        };
        if let Some(seed) = base_seed {
            config = config.with_base_seed(seed);
        }
        if let Some(count) = trial_count {
            config = config.with_trial_count(count);
        }
        if let Some(order) = args.order {
            config = config.with_order(order.into());
        }
        if let Some(workers) = args.workers {
            config = config.with_workers(workers);
        }
        if args.strict {
            config = config.with_tolerate_failures(false);
        }
        config.validate().context("invalid sweep configuration")?;
        configs.push(config);
    }
    Ok(configs)
}

fn run_sweeps(args: &SweepArgs) -> Result<()> {
    let configs = build_configs(args)?;
    let registry = load_registry(args.rules.as_deref())?;
    let tables = load_spawn_tables(args.spawn_tables.as_deref())?;

    if args.report == ReportFormat::Console {
        announce_banner();
    }

    let mut notable_sink: Box<dyn Write> = match &args.notable_output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(stderr()),
    };

    let start_time = Instant::now();
    let mut outcomes = Vec::with_capacity(configs.len());
    for config in &configs {
        let started = Instant::now();
        let mut orchestrator = SweepOrchestrator::new(config, &registry);
        let result = if config.workers > 1 {
            orchestrator.run_sharded(
                |_| SpawnTableGenerator::new(Arc::clone(&tables)),
                &mut notable_sink,
            )
        } else {
            let mut generator = SpawnTableGenerator::new(Arc::clone(&tables));
            orchestrator.run(&mut generator, &mut notable_sink)
        };
        let run = result.with_context(|| format!("sweep of {} failed", config.target))?;

        if run.failed_trials() > 0 {
            warn!(
                "{}: {} of {} trials failed to generate",
                run.target(),
                run.failed_trials(),
                run.trial_count()
            );
        }
        outcomes.push(SweepOutcome {
            run,
            elapsed: started.elapsed(),
        });
    }

    let mut output_target = OutputTarget::new(args.output.clone())?;
    match args.report {
        ReportFormat::Record => reports::generate_record_report(&mut output_target, &outcomes)?,
        ReportFormat::Json => reports::generate_json_report(&mut output_target, &outcomes)?,
        ReportFormat::Console => reports::generate_console_report(
            &mut output_target,
            &outcomes,
            start_time.elapsed(),
        )?,
    }
    output_target.flush_inner()?;
    Ok(())
}

fn run_concat(args: &ConcatArgs) -> Result<()> {
    let mut text = String::new();
    if args.inputs.is_empty() {
        stdin()
            .read_to_string(&mut text)
            .context("failed to read records from stdin")?;
    } else {
        for path in &args.inputs {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            text.push_str(&contents);
            text.push('\n');
        }
    }

    let records = parse_lines(&text).context("failed to parse trial records")?;
    let merged = concat(records).context("failed to concatenate trial records")?;

    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "{merged}")?;
    output_target.flush_inner()?;
    Ok(())
}

fn list_targets(args: &TargetsArgs) -> Result<()> {
    let registry = load_registry(args.rules.as_deref())?;
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Supported targets:")?;
    for target in registry.targets() {
        let rule = registry.resolve(target)?;
        let notable = if rule.notable.is_some() {
            " (notable seeds reported)"
        } else {
            ""
        };
        writeln!(
            output_target.writer(),
            "  {:8} - {} key(s) per trial{notable}",
            target.to_string(),
            rule.keys_per_trial()
        )?;
    }
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> SweepArgs {
        SweepArgs {
            target: Some("CH8-1".to_string()),
            seed: None,
            num: None,
            order: None,
            workers: None,
            strict: false,
            config: None,
            rules: None,
            spawn_tables: None,
            report: ReportFormat::Record,
            output: None,
            notable_output: None,
        }
    }

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "survey-runner-unit-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    #[test]
    fn cli_parses_sweep_flags() {
        let cli = Cli::try_parse_from([
            "survey-runner",
            "sweep",
            "--target",
            "CH8,SR-7",
            "--seed",
            "0x10",
            "--num",
            "-1",
            "--order",
            "permuted",
            "--report",
            "json",
        ])
        .unwrap();
        let Command::Sweep(args) = cli.command else {
            panic!("expected sweep command");
        };
        assert_eq!(args.num.as_deref(), Some("-1"));
        assert_eq!(args.order, Some(OrderArg::Permuted));
        assert_eq!(args.report, ReportFormat::Json);
    }

    #[test]
    fn flags_build_one_config_per_target() {
        let mut args = base_args();
        args.target = Some("CH8, SR-7".to_string());
        args.seed = Some("0x20".to_string());
        args.num = Some("0x100".to_string());
        args.workers = Some(3);
        args.strict = true;
        let configs = build_configs(&args).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].target, TargetDescriptor::new("CH8", 1));
        assert_eq!(configs[1].target, TargetDescriptor::new("SR", 7));
        for config in &configs {
            assert_eq!(config.base_seed, 0x20);
            assert_eq!(config.trial_count, 0x100);
            assert_eq!(config.workers, 3);
            assert!(!config.tolerate_failures);
        }
    }

    #[test]
    fn flags_override_config_file() {
        let path = temp_path("config");
        std::fs::write(
            &path,
            r#"{"target": "CH5-2", "base_seed": 7, "trial_count": 64, "order": "permuted"}"#,
        )
        .unwrap();
        let mut args = base_args();
        args.target = None;
        args.config = Some(path.clone());
        args.num = Some("8".to_string());
        let configs = build_configs(&args).unwrap();
        let _ = std::fs::remove_file(path);
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].target, TargetDescriptor::new("CH5", 2));
        assert_eq!(configs[0].base_seed, 7);
        assert_eq!(configs[0].trial_count, 8);
        assert_eq!(configs[0].order, SeedOrder::Permuted);
    }

    #[test]
    fn missing_or_bad_targets_are_errors() {
        let mut args = base_args();
        args.target = None;
        assert!(build_configs(&args).is_err());
        args.target = Some("8-CH".to_string());
        assert!(build_configs(&args).is_err());
        args.target = Some(",".to_string());
        assert!(build_configs(&args).is_err());
        args.target = Some("CH8".to_string());
        args.workers = Some(0);
        assert!(build_configs(&args).is_err());
        args.workers = Some(100_000);
        let err = build_configs(&args).unwrap_err();
        assert!(format!("{err:#}").contains("at most 256"));
    }

    #[test]
    fn sweep_writes_records_to_output() {
        let output = temp_path("records");
        let notable = temp_path("notable");
        let mut args = base_args();
        args.target = Some("CH8-1,FC-7".to_string());
        args.num = Some("32".to_string());
        args.output = Some(output.clone());
        args.notable_output = Some(notable.clone());
        run_sweeps(&args).unwrap();
        let text = std::fs::read_to_string(&output).unwrap();
        let _ = std::fs::remove_file(output);
        let _ = std::fs::remove_file(notable);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            assert!(line.starts_with(r#"{"seed": 0x00000000, "num": 0x00000020, "result": {"#));
        }
    }

    #[test]
    fn unsupported_target_fails_the_sweep() {
        let mut args = base_args();
        args.target = Some("ZZ-9".to_string());
        args.num = Some("4".to_string());
        let err = run_sweeps(&args).unwrap_err();
        assert!(format!("{err:#}").contains("ZZ-9"));
    }
}
