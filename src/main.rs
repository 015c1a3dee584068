use clap::{ArgAction, Parser, Subcommand};
use recdissect::binary::RenderOptions;
use recdissect::dump::{dump_file, DumpOptions, DEFAULT_MAX_RECORDS};
use recdissect::extract::{extract_file, ExtractOptions, ExtractOutcome, EXIT_UNFORCED_WARNING};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recdissect", about = "Inspect and unpack .rec match replay files")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a byte-aligned breakdown of a .rec file
    Dump {
        path: PathBuf,
        /// Show the header and key-value segments
        #[arg(short = 'H', long)]
        show_header: bool,
        /// Number of body segments to display
        #[arg(short = 'B', long, default_value = "0")]
        show_body: usize,
        /// Most records printed per body segment
        #[arg(short = 'm', long, default_value_t = DEFAULT_MAX_RECORDS)]
        max_packets: usize,
        /// Print labels only, without the hex column
        #[arg(short = 'S', long)]
        hide_source_bytes: bool,
        #[arg(short, long, default_value = "70")]
        column_width: usize,
        /// Emit the parsed tree as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Decompress the zstd payload of a .rec file
    Extract {
        input_file: PathBuf,
        out_file:   PathBuf,
        /// Input is already a bare zstd stream (footer pre-stripped)
        #[arg(short = 'z', long)]
        is_zst: bool,
        /// Continue despite integrity warnings
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { path, show_header, show_body, max_packets, hide_source_bytes, column_width, json } => {
            let opts = DumpOptions {
                show_header,
                body_segments: show_body,
                max_records:   max_packets,
                render:        RenderOptions { column_width, hide_source_bytes },
            };

            if json {
                let (file, packets) = dump_file(&path, &opts, |_| {})?;
                #[derive(Serialize)]
                struct Report<'a> {
                    file:    &'a recdissect::RecFile,
                    packets: &'a recdissect::packet::PacketLog,
                }
                println!("{}", serde_json::to_string_pretty(&Report { file: &file, packets: &packets })?);
            } else {
                let (file, packets) = dump_file(&path, &opts, |text| println!("{}", text))?;
                if let Some(version) = file.version() {
                    println!("Version {}  ·  {} properties  ·  {} bytes parsed",
                             version, file.properties.len(), file.parsed_len());
                }
                if let Some((first, last)) = packets.time_span() {
                    println!("{} packets, timestamps {}..{}", packets.len(), first, last);
                }
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input_file, out_file, is_zst, force } => {
            let opts = ExtractOptions { is_zst, force };
            match extract_file(&input_file, &out_file, &opts)? {
                ExtractOutcome::Written { compressed_len, output_len, warnings } => {
                    for w in &warnings {
                        println!("{}", w);
                    }
                    println!("Decompressed {} → {} bytes: {}",
                             compressed_len, output_len, out_file.display());
                }
                ExtractOutcome::Aborted { warnings } => {
                    for w in &warnings {
                        println!("{}", w);
                    }
                    println!("\n\nParsing stopped. No output written.\n(You can override this behavior using the -f flag)");
                    return Ok(ExitCode::from(EXIT_UNFORCED_WARNING));
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
