use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};

use tzp::pool::CancelToken;
use tzp::reader::{decompress_file, inspect_file};
use tzp::strategy::Profile;
use tzp::writer::{compress_file, CompressOptions};
use tzp::TzpError;

#[derive(Parser)]
#[command(name = "tzp", version = "3.1.0", about = "Adaptive block-compression container")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a .tzp container
    Compress {
        input: PathBuf,
        /// Defaults to <input>.tzp
        output: Option<PathBuf>,
        /// Strategy preset: lightning, fast, balanced, high, max
        #[arg(long, default_value = "balanced")]
        profile: String,
        /// Worker threads (0 = one per logical CPU)
        #[arg(long, default_value_t = 0)]
        threads: usize,
        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Restore the original file from a .tzp container
    Decompress {
        input: PathBuf,
        /// Defaults to <input> without its .tzp suffix
        output: Option<PathBuf>,
        /// Worker threads (0 = one per logical CPU)
        #[arg(long, default_value_t = 0)]
        threads: usize,
        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show container metadata without decompressing
    Info {
        input: PathBuf,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version land here too; only real parse errors
            // are usage errors.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if let Err(e) = run(cli) {
        eprintln!("tzp: {e}");
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), TzpError> {
    match cli.command {
        Commands::Compress { input, output, profile, threads, force, verbose } => {
            let profile = Profile::from_name(&profile)
                .ok_or_else(|| TzpError::Usage(format!("unknown profile '{profile}'")))?;
            let output = output.unwrap_or_else(|| default_compress_output(&input));
            refuse_overwrite(&output, force)?;

            let opts = CompressOptions { profile, threads, name_hint: None };
            let started = Instant::now();
            let stats = compress_file(&input, &output, &opts, &CancelToken::new())?;
            let elapsed = started.elapsed();

            if verbose {
                println!("── Analysis ─────────────────────────────────────────");
                println!("  Content class   {}", stats.report.content_class.name());
                println!("  Entropy         {:.3} bits/byte", stats.report.entropy);
                println!("  Pattern density {:.3}", stats.report.pattern_density);
                println!("  Repetition      {:.3}", stats.report.repetition_factor);
                println!("  Compressibility {:.3}", stats.report.compressibility);
                println!("  Base block size {} KiB", stats.base_block_size / 1024);
                println!("  Blocks          {}", stats.block_count);
            }
            println!(
                "{} -> {}  ({} B -> {} B, {:.1}%, {} blocks, {:.2?})",
                input.display(),
                output.display(),
                stats.original_len,
                stats.container_len,
                stats.ratio() * 100.0,
                stats.block_count,
                elapsed,
            );
        }

        Commands::Decompress { input, output, threads, force, verbose } => {
            let output = output.unwrap_or_else(|| default_decompress_output(&input));
            refuse_overwrite(&output, force)?;

            let started = Instant::now();
            let stats = decompress_file(&input, &output, threads, &CancelToken::new())?;
            let elapsed = started.elapsed();

            if verbose {
                println!("  Blocks decoded  {}", stats.block_count);
            }
            println!(
                "{} -> {}  ({} B -> {} B, {:.2?})",
                input.display(),
                output.display(),
                stats.container_len,
                stats.original_len,
                elapsed,
            );
        }

        Commands::Info { input } => {
            let info = inspect_file(&input)?;
            let header = &info.header;
            let meta = &info.metadata;
            println!("── .tzp container ───────────────────────────────────────");
            println!("  Path            {}", input.display());
            println!("  Original length {} B", header.original_len);
            println!("  Blocks          {}", header.block_count);
            println!("  Base block size {} KiB", header.base_block_size / 1024);
            println!("  Global hash     {}", hex::encode(header.global_hash));
            println!("  Global flags    {:#06x}", header.flags);
            println!("  Profile         {}", meta.profile.name());
            println!("  Content class   {}", meta.content_class.name());
            println!("  Entropy         {:.3} bits/byte", meta.entropy);
            println!("  Compressibility {:.3}", meta.compressibility);
            println!("  Sample size     {} B", meta.sample_size);
            println!("  Algorithms:");
            for (name, count) in &meta.algorithms {
                println!("    {name:<14} {count} block(s)");
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn default_compress_output(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".tzp");
    PathBuf::from(name)
}

fn default_decompress_output(input: &Path) -> PathBuf {
    match (input.extension(), input.file_stem()) {
        (Some(ext), Some(stem)) if ext == "tzp" => input.with_file_name(stem),
        _ => {
            let mut name = input.as_os_str().to_owned();
            name.push(".out");
            PathBuf::from(name)
        }
    }
}

fn refuse_overwrite(output: &Path, force: bool) -> Result<(), TzpError> {
    if output.exists() && !force {
        return Err(TzpError::Usage(format!(
            "output '{}' exists (use --force to overwrite)",
            output.display()
        )));
    }
    Ok(())
}
