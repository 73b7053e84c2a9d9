//! autopart - storage layout planner
//!
//! Works out partitions, volume groups, arrays and filesystems for a set of
//! disks and prints the actions an installer would run. Nothing is written
//! to any disk.

use anyhow::{bail, Context, Result};
use autopart::disk::detection::{get_ram, list_block_devices, probe_disk, SysfsCache};
use autopart::disk::size::Size;
use autopart::kickstart::{render_plan, KickstartStorage};
use autopart::layout::swap::{swap_suggestion, SwapPolicy, DEFAULT_SWAP_CAP};
use autopart::utils::command::command_exists;
use autopart::utils::progress::{progress_bar, render, ProgressReporter};
use autopart::{report, Diagnostics, LayoutConfig, Plan, Report};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::sync::mpsc::channel;
use std::thread;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "autopart")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Kickstart,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a storage layout and print the resulting actions
    Plan {
        /// Layout configuration file; the host is probed when omitted
        #[arg(short, long)]
        config: Option<String>,

        /// Kickstart file whose storage commands replace the configured layout
        #[arg(short, long)]
        kickstart: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Write the plan here instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// List disks that can be planned for
    ListDisks {
        /// Show all block devices, not just suitable targets
        #[arg(short, long)]
        all: bool,
    },

    /// Print the recommended swap size
    SuggestSwap {
        /// Installed memory (e.g. "16 GiB"); read from the host when omitted
        #[arg(short, long)]
        ram: Option<String>,

        /// Disk space available, for the 10 % clamp
        #[arg(short, long)]
        disk_space: Option<String>,

        #[arg(long)]
        hibernation: bool,

        /// Upper bound on the suggestion
        #[arg(long)]
        cap: Option<String>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        config: String,
    },

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "autopart.toml")]
        output: String,
    },

    /// Build a configuration file interactively
    Wizard {
        #[arg(short, long, default_value = "autopart.toml")]
        output: String,

        /// Offer every block device, not just suitable targets
        #[arg(short, long)]
        all: bool,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Plan {
            config,
            kickstart,
            format,
            output,
        } => cmd_plan(config, kickstart, format, output),
        Commands::ListDisks { all } => cmd_list_disks(all),
        Commands::SuggestSwap {
            ram,
            disk_space,
            hibernation,
            cap,
        } => cmd_suggest_swap(ram, disk_space, hibernation, cap),
        Commands::Validate { config } => cmd_validate(&config),
        Commands::GenerateConfig { output } => cmd_generate_config(&output),
        Commands::Wizard { output, all } => cmd_wizard(&output, all),
    }
}

fn run_pipeline(
    config: Option<String>,
    kickstart: Option<String>,
    progress: &ProgressReporter,
) -> Result<Report> {
    progress.init(3);
    let config = match &config {
        Some(path) => {
            info!("Loading configuration from {}", path);
            LayoutConfig::from_file(path).with_context(|| format!("reading {}", path))?
        }
        None => LayoutConfig::default(),
    };
    config.validate()?;
    progress.step("configuration loaded");

    let mut input = config.to_solve_input()?;
    if let Some(path) = &kickstart {
        info!("Reading storage commands from {}", path);
        KickstartStorage::from_file(path)
            .with_context(|| format!("reading {}", path))?
            .apply(&mut input);
    }
    progress.step(format!("{} disk(s) found", input.disks.len()));

    let report = report(&input);
    progress.step("layout solved");
    Ok(report)
}

fn cmd_plan(
    config: Option<String>,
    kickstart: Option<String>,
    format: OutputFormat,
    output: Option<String>,
) -> Result<()> {
    let (tx, rx) = channel();
    let progress = ProgressReporter::new(tx);
    let worker = thread::spawn(move || {
        let result = run_pipeline(config, kickstart, &progress);
        match &result {
            Ok(_) => progress.complete(),
            Err(_) => progress.quit(1),
        }
        result
    });

    let bar = progress_bar();
    render(rx, &bar);
    let report = match worker.join() {
        Ok(result) => result?,
        Err(_) => bail!("planning thread panicked"),
    };

    let Some(plan) = &report.plan else {
        print_diagnostics(&report.diagnostics);
        bail!("no layout could be planned");
    };

    if output.is_some() {
        colored::control::set_override(false);
    }
    let text = match format {
        OutputFormat::Text => plan_text(plan),
        OutputFormat::Json => serde_json::to_string_pretty(&report)?,
        OutputFormat::Kickstart => render_plan(plan),
    };
    match output {
        Some(path) => {
            std::fs::write(&path, text)?;
            println!("Plan written to {}", path);
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn plan_text(plan: &Plan) -> String {
    let mut out = Vec::new();
    out.push(format!(
        "{} {} (boot disk {})",
        "Platform:".bold(),
        plan.platform,
        plan.boot_disk
    ));
    for (disk, kind) in &plan.disklabels {
        out.push(format!("  {:<12} {}", disk, kind));
    }

    out.push(String::new());
    out.push("Actions:".bold().to_string());
    for (i, action) in plan.actions.iter().enumerate() {
        let line = format!("{:>4}. {}", i + 1, action);
        out.push(if action.is_destructive() {
            line.red().to_string()
        } else {
            line.green().to_string()
        });
    }

    if !plan.containers.is_empty() {
        out.push(String::new());
        out.push("Containers:".bold().to_string());
        for c in &plan.containers {
            out.push(format!(
                "  {} {} {} on {} ({} free)",
                c.kind,
                c.name,
                c.size,
                c.members.join(", "),
                c.free
            ));
        }
    }

    out.push(String::new());
    out.push("Free space:".bold().to_string());
    for (disk, free) in &plan.free_space {
        out.push(format!("  {:<12} {}", disk, free));
    }
    if !plan.diagnostics.is_clean() {
        out.push(String::new());
        for w in &plan.diagnostics.warnings {
            out.push(format!("{} {}", "warning:".yellow(), w));
        }
    }
    out.join("\n")
}

fn print_diagnostics(diag: &Diagnostics) {
    for w in &diag.warnings {
        eprintln!("{} {}", "warning:".yellow(), w);
    }
    for e in &diag.errors {
        eprintln!("{} {}", "error:".red().bold(), e);
    }
}

fn cmd_list_disks(all: bool) -> Result<()> {
    if !command_exists("blkid") {
        warn!("blkid not found; disklabels will not be shown");
    }
    let mut cache = SysfsCache::default();
    let devices = list_block_devices(&mut cache, all)?;

    if devices.is_empty() {
        println!("No suitable disks found.");
        return Ok(());
    }

    println!(
        "{:<15} {:>10} {:<20} {:<8} {}",
        "DEVICE", "SIZE", "MODEL", "TRAN", "LABEL"
    );
    println!("{}", "-".repeat(66));

    for dev in devices {
        let disk = probe_disk(&mut cache, &dev);
        let label = match &disk.label {
            Some(l) => format!("{} ({} parts)", l.kind, l.partitions.len()),
            None => disk.format.clone().unwrap_or_else(|| "-".to_string()),
        };
        println!(
            "{:<15} {:>10} {:<20} {:<8} {}",
            dev.path(),
            dev.size.to_string(),
            dev.model.as_deref().unwrap_or("-"),
            dev.transport,
            label
        );
    }

    Ok(())
}

fn cmd_suggest_swap(
    ram: Option<String>,
    disk_space: Option<String>,
    hibernation: bool,
    cap: Option<String>,
) -> Result<()> {
    let ram = match ram {
        Some(r) => r.parse::<Size>()?,
        None => get_ram(),
    };
    let disk_space = disk_space.map(|d| d.parse::<Size>()).transpose()?;
    let policy = SwapPolicy {
        cap: cap
            .map(|c| c.parse::<Size>())
            .transpose()?
            .unwrap_or(DEFAULT_SWAP_CAP),
        hibernation,
        clamp_to_disk: disk_space.is_some(),
    };
    let mut diag = Diagnostics::default();
    let size = swap_suggestion(ram, disk_space, &policy, &mut diag);
    println!("{} for {} of RAM", size.to_string().bold(), ram);
    print_diagnostics(&diag);
    Ok(())
}

fn cmd_validate(config_path: &str) -> Result<()> {
    let config = LayoutConfig::from_file(config_path)?;
    config.validate()?;
    println!("{} Configuration is valid", "✓".green());
    Ok(())
}

fn cmd_generate_config(output: &str) -> Result<()> {
    let sample = LayoutConfig::sample();
    std::fs::write(output, sample.to_toml()?)?;
    println!("{} Sample configuration written to {}", "✓".green(), output);
    Ok(())
}

fn cmd_wizard(output: &str, all: bool) -> Result<()> {
    let config = LayoutConfig::from_wizard(all)?;
    config.validate()?;
    std::fs::write(output, config.to_toml()?)?;
    println!("{} Configuration written to {}", "✓".green(), output);
    Ok(())
}
