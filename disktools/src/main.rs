mod logging;

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use disktools_core::copy::{
    DEFAULT_BLOCK_SIZE, DEFAULT_PROGRESS_EVERY, TransferOptions, TransferReport,
};
use disktools_core::device::{self, SECTOR_SIZE};
use disktools_core::erase::{Confirmation, EraseOutcome};
use disktools_core::error::{Error, Warning};
use disktools_core::progress::{self, ProgressSample};
use disktools_core::session::{self, SessionInfo};
use disktools_core::{clean, dump, eject, platform, restore};
use indicatif::{ProgressBar, ProgressStyle};
use logging::LogConfig;
use std::io::{IsTerminal, stdout};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

#[cfg(unix)]
use libc::ECHOCTL;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(unix)]
use termios::{TCSANOW, Termios, tcsetattr};

#[derive(Parser)]
#[command(name = "disktools")]
#[command(about = "Dump, restore, clean and eject raw disks", version)]
struct Cli {
    /// Answer yes to every confirmation prompt
    #[arg(short, long, global = true)]
    yes: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a disk, or part of it, to an image file
    Dump {
        /// Disk number, floppy drive letter or device path
        disk: String,
        /// Output image file (overwritten if it exists)
        file: PathBuf,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Write a raw or compressed (.gz, .xz, .zst) image to a disk
    Restore {
        /// Image file to write
        file: PathBuf,
        /// Disk number, floppy drive letter or device path
        disk: String,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Remove the partition layout (MBR, GPT) of a disk
    Clean {
        /// Disk number, floppy drive letter or device path
        disk: String,
    },
    /// Overwrite a disk, or part of it, with zeros
    Zero {
        /// Disk number, floppy drive letter or device path
        disk: String,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Eject removable media
    Eject {
        /// Disk number, floppy drive letter or device path
        disk: String,
    },
    /// List available block devices
    List,
}

#[derive(Args)]
struct RangeArgs {
    /// Number of 512-byte sectors to skip at the start of the disk
    #[arg(short, long, value_name = "SECTORS", default_value_t = 0)]
    skip: u64,

    /// Maximum number of bytes to transfer (0 = up to the end)
    #[arg(short, long, value_name = "BYTES", default_value_t = 0)]
    length: u64,

    /// Transfer block size in bytes, a multiple of 512
    #[arg(
        long,
        value_name = "BYTES",
        default_value_t = DEFAULT_BLOCK_SIZE,
        value_parser = parse_block_size
    )]
    block_size: usize,

    /// Report progress every N blocks
    #[arg(
        long,
        value_name = "BLOCKS",
        default_value_t = DEFAULT_PROGRESS_EVERY,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    progress_every: u64,
}

impl RangeArgs {
    fn options(&self) -> TransferOptions {
        TransferOptions {
            block_size: self.block_size,
            progress_every: self.progress_every,
        }
    }
}

fn parse_block_size(s: &str) -> Result<usize, String> {
    let size: usize = s.parse().map_err(|e| format!("{e}"))?;
    if size == 0 || size as u64 % SECTOR_SIZE != 0 {
        return Err(format!("must be a non-zero multiple of {SECTOR_SIZE}"));
    }
    Ok(size)
}

/// A helper struct that, on Unix, disables `ECHOCTL` for the terminal.
///
/// `ECHOCTL` is the terminal flag that causes Ctrl+C to be printed as `^C`.
/// The original terminal state is restored when this struct is dropped.
struct TermRestorer {
    #[cfg(unix)]
    original_termios: Option<Termios>,
}

impl TermRestorer {
    fn new() -> Self {
        #[cfg(unix)]
        {
            if !stdout().is_terminal() {
                return Self {
                    original_termios: None,
                };
            }

            let fd = stdout().as_raw_fd();
            let original_termios = Termios::from_fd(fd).ok().and_then(|original| {
                let mut quiet = original;
                quiet.c_lflag &= !ECHOCTL;
                tcsetattr(fd, TCSANOW, &quiet).ok().map(|_| original)
            });
            Self { original_termios }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }
}

impl Drop for TermRestorer {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(ref original_termios) = self.original_termios {
            tcsetattr(stdout().as_raw_fd(), TCSANOW, original_termios).ok();
        }
    }
}

/// Progress display for one transfer, fed by the core library's callbacks.
struct TransferBar {
    bar: ProgressBar,
    style: ProgressStyle,
}

impl TransferBar {
    fn new(prefix: &'static str, color: &str) -> Result<Self> {
        let style = ProgressStyle::default_bar()
            .template(&format!(
                "{{prefix:10}} [{{elapsed_precise}}] [{{bar:40.{color}/black}}] {{msg}}"
            ))?
            .progress_chars("■ ");
        let bar = ProgressBar::hidden();
        bar.set_prefix(prefix);
        Ok(Self { bar, style })
    }

    fn start(&self, info: &SessionInfo) {
        println!("Disk {}", style(&info.device).cyan());
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_style(self.style.clone());
        self.bar.set_length(info.range.length);
    }

    fn progress(&self, sample: &ProgressSample) {
        self.bar.set_position(sample.transferred);
        self.bar.set_message(sample.to_string());
    }

    fn finish(&self, outcome: &Result<TransferReport, Error>) {
        match outcome {
            Ok(report) => self.bar.finish_with_message(progress::format_line(
                0,
                report.bytes_transferred,
                report.range.length,
            )),
            Err(_) => self.bar.abandon_with_message("❌ Operation failed."),
        }
    }
}

/// Presents a final "Yes/No" confirmation, unless `--yes` was given.
fn confirm_operation(prompt: &str, assume_yes: bool) -> Result<Confirmation> {
    if assume_yes {
        return Ok(Confirmation::Confirmed);
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    Ok(confirmed.into())
}

/// Prints what is about to be overwritten and asks for confirmation.
fn confirm_destructive(
    device_path: &Path,
    action: &str,
    assume_yes: bool,
) -> Result<Confirmation> {
    let summary = session::describe(device_path)?;
    println!(
        "{} This will {action} on '{}'.",
        style("WARNING:").red().bold(),
        device_path.display()
    );
    println!("  Disk: {}", style(&summary).cyan());
    if is_system_disk(device_path) {
        println!(
            "  {}",
            style("This disk holds the running operating system!").red().bold()
        );
    }
    println!();

    confirm_operation("There is no going back after this. Continue?", assume_yes)
}

fn is_system_disk(device_path: &Path) -> bool {
    match platform::list_devices() {
        Ok(devices) => devices
            .iter()
            .any(|d| d.is_system && d.path == device_path),
        Err(e) => {
            debug!("could not enumerate devices: {e}");
            false
        }
    }
}

fn print_warnings(warnings: &[Warning]) {
    for warning in warnings {
        eprintln!("{} {warning}", style("WARNING:").yellow().bold());
    }
}

fn print_report(report: &TransferReport, skip_sectors: u64) {
    println!(
        "{}",
        progress::summary_line(report.bytes_transferred, report.range.length)
    );
    if skip_sectors > 0 {
        println!(
            "Skipped {skip_sectors} sectors ({} bytes) at the start of the disk.",
            skip_sectors * SECTOR_SIZE
        );
    }
    print_warnings(&report.warnings);
}

fn main() -> Result<()> {
    // This guard will be dropped when main() exits, restoring the terminal.
    let _term_restorer = TermRestorer::new();

    let cli = Cli::parse();
    logging::init(LogConfig {
        json: cli.log_json,
        verbose: cli.verbose,
    });

    // This flag allows for graceful cancellation between blocks.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    match cli.command {
        Commands::Dump { disk, file, range } => {
            let device_path = device::resolve_identifier(&disk)?;
            println!("  Output: {}", style(file.display()).cyan());

            let ui = TransferBar::new("Reading", "green")?;
            let result = dump::run(
                &device_path,
                &file,
                range.skip,
                range.length,
                range.options(),
                running,
                |info| ui.start(info),
                |sample| ui.progress(sample),
            );
            ui.finish(&result);
            print_report(&result?, range.skip);
        }
        Commands::Restore { file, disk, range } => {
            let device_path = device::resolve_identifier(&disk)?;
            println!("  Image: {}", style(file.display()).cyan());
            let confirmation = confirm_destructive(&device_path, "overwrite data", cli.yes)?;

            let compressed = restore::is_compressed(&file);
            let decompress_pb = if compressed && confirmation == Confirmation::Confirmed {
                let pb = ProgressBar::new_spinner();
                pb.set_prefix("Decompress");
                pb.set_style(ProgressStyle::default_spinner().template(
                    "{prefix:10} [{elapsed_precise}] {spinner:.blue} {bytes} ({bytes_per_sec})",
                )?);
                pb.enable_steady_tick(Duration::from_millis(100));
                pb
            } else {
                ProgressBar::hidden()
            };

            let ui = TransferBar::new("Writing", "green")?;
            let result = restore::run(
                &file,
                &device_path,
                range.skip,
                range.length,
                confirmation,
                range.options(),
                running,
                |bytes| decompress_pb.set_position(bytes),
                |info| {
                    if compressed {
                        decompress_pb.finish_with_message("Decompression complete.");
                    }
                    ui.start(info)
                },
                |sample| ui.progress(sample),
            );

            if let Err(Error::NotConfirmed) = result {
                println!("Restore cancelled.");
                return Ok(());
            }
            decompress_pb.finish_and_clear();
            ui.finish(&result);
            print_report(&result?, range.skip);
        }
        Commands::Clean { disk } => {
            let device_path = device::resolve_identifier(&disk)?;
            let confirmation =
                confirm_destructive(&device_path, "delete every partition", cli.yes)?;

            match clean::run(&device_path, confirmation)? {
                EraseOutcome::Cleared => println!(
                    "✨ Partition layout of {} removed.",
                    style(device_path.display()).cyan()
                ),
                EraseOutcome::NotConfirmed => println!("Clean cancelled."),
            }
        }
        Commands::Zero { disk, range } => {
            let device_path = device::resolve_identifier(&disk)?;
            let confirmation =
                confirm_destructive(&device_path, "overwrite data with zeros", cli.yes)?;

            let ui = TransferBar::new("Zeroing", "red")?;
            let result = clean::zero(
                &device_path,
                range.skip,
                range.length,
                confirmation,
                range.options(),
                running,
                |info| ui.start(info),
                |sample| ui.progress(sample),
            );

            if let Err(Error::NotConfirmed) = result {
                println!("Zero-fill cancelled.");
                return Ok(());
            }
            ui.finish(&result);
            print_report(&result?, range.skip);
        }
        Commands::Eject { disk } => {
            let device_path = device::resolve_identifier(&disk)?;
            eject::run(&device_path)?;
            println!("Ejected {}.", style(device_path.display()).cyan());
        }
        Commands::List => {
            let devices = platform::list_devices()
                .map_err(|e| anyhow!("Failed to enumerate devices: {e}"))?;
            if devices.is_empty() {
                println!("No block devices found.");
                return Ok(());
            }

            println!("Found {} devices:", devices.len());
            println!(
                "\n  {:<22} {:>13}  {}",
                "DEVICE", "SIZE", "DESCRIPTION"
            );
            println!("  {:-<22} {:->13}  {:-<30}", "", "", "");
            for device in devices {
                println!("  {device}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn block_size_must_be_whole_sectors() {
        assert_eq!(parse_block_size("65536"), Ok(65536));
        assert_eq!(parse_block_size("512"), Ok(512));
        assert!(parse_block_size("0").is_err());
        assert!(parse_block_size("1000").is_err());
        assert!(parse_block_size("lots").is_err());
    }

    #[test]
    fn dump_accepts_skip_and_length() {
        let cli = Cli::try_parse_from([
            "disktools", "dump", "1", "out.img", "--skip", "63", "--length", "1048576",
        ])
        .unwrap();
        match cli.command {
            Commands::Dump { disk, file, range } => {
                assert_eq!(disk, "1");
                assert_eq!(file, PathBuf::from("out.img"));
                assert_eq!(range.skip, 63);
                assert_eq!(range.length, 1_048_576);
                assert_eq!(range.options(), TransferOptions::default());
            }
            _ => panic!("expected dump"),
        }
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["disktools", "clean", "2", "--yes", "-v"]).unwrap();
        assert!(cli.yes);
        assert!(cli.verbose);
        assert!(!cli.log_json);
    }

    #[test]
    fn zero_progress_interval_is_rejected() {
        let parsed =
            Cli::try_parse_from(["disktools", "zero", "2", "--progress-every", "0"]);
        assert!(parsed.is_err());
    }
}
