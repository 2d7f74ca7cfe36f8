//! edgarx CLI - EDGAR index parser and XBRL fact decoder

use anyhow::{bail, Context, Result};
use clap::{Args, Parser as ClapParser, Subcommand};
use colored::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use edgarx::index::parse_index_file;
use edgarx::{
    AccessionNumber, Cik, Client, Decoder, DynamicRecord, IndexEntry, IndexSource, Parser, Quarter,
};

/// EDGAR full-text index parser and XBRL fact decoder
#[derive(ClapParser)]
#[command(name = "edgarx")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List 10-K and 10-Q filings from form.idx files
    Index {
        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output as JSON lines
        #[arg(short, long)]
        json: bool,
    },

    /// Decode facts for one filer from an XBRL instance
    Facts {
        /// Instance document
        input: PathBuf,

        /// Filer CIK
        #[arg(long)]
        cik: Cik,

        /// Only use the plain instant context on this date (yyyy-mm-dd)
        #[arg(long)]
        instant: Option<String>,

        /// Field to decode, as concept=type (text, i32, i64)
        #[arg(short, long = "field", required = true, value_parser = parse_field)]
        fields: Vec<(String, String)>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Download a form.idx file
    FetchIndex {
        #[command(flatten)]
        net: NetArgs,

        /// Year of the quarterly index
        #[arg(long, requires = "quarter", conflicts_with = "current")]
        year: Option<i32>,

        /// Quarter of the quarterly index (1-4)
        #[arg(long, requires = "year", value_parser = clap::value_parser!(u8).range(1..=4))]
        quarter: Option<u8>,

        /// Download the index for the quarter in progress
        #[arg(long)]
        current: bool,

        /// Output file (stdout when absent)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download the XBRL instance of one filing
    FetchReport {
        #[command(flatten)]
        net: NetArgs,

        /// Filer CIK
        #[arg(long)]
        cik: Cik,

        /// Accession number, hyphenated or as 18 digits
        #[arg(long)]
        accession: AccessionNumber,

        /// Output file (stdout when absent)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct NetArgs {
    /// User-Agent sent to EDGAR, usually "Name email@example.com"
    #[arg(long, env = "EDGARX_USER_AGENT")]
    user_agent: String,

    /// Requests allowed per second
    #[arg(long, default_value = "10")]
    rate: u32,
}

impl NetArgs {
    fn client(&self) -> Result<Client> {
        Client::builder(self.user_agent.as_str())
            .rate(self.rate)
            .build()
            .context("Failed to build HTTP client")
    }
}

fn parse_field(arg: &str) -> std::result::Result<(String, String), String> {
    let (concept, kind) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected concept=type, got {:?}", arg))?;
    Ok((concept.to_string(), kind.to_string()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Index { inputs, json } => {
            let start = Instant::now();
            let mut out = BufWriter::new(io::stdout().lock());
            let mut total = 0;

            for (input, result) in inputs.iter().zip(parse_all(&inputs)) {
                let entries =
                    result.with_context(|| format!("Failed to parse {}", input.display()))?;
                total += entries.len();
                for entry in &entries {
                    write_entry(&mut out, entry, json)?;
                }
            }
            out.flush()?;

            if !json {
                eprintln!(
                    "{} {} filings from {} file(s) in {:.2}ms",
                    "✓".green().bold(),
                    total,
                    inputs.len(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
        }

        Commands::Facts {
            input,
            cik,
            instant,
            fields,
            json,
        } => {
            let doc = Parser::new()
                .parse_file(&input)
                .with_context(|| format!("Failed to parse {}", input.display()))?;
            let map = DynamicRecord::field_map(
                fields.iter().map(|(concept, kind)| (concept.as_str(), kind.as_str())),
            )?;

            let decoder = Decoder::new(&doc);
            let mut record = DynamicRecord::default();
            let decoded = match &instant {
                Some(date) => decoder.unpack_at_with(&map, &mut record, cik, date),
                None => decoder.unpack_with(&map, &mut record, cik),
            };
            decoded.with_context(|| format!("Failed to decode {}", input.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("{} {} (cik {})", "✓".green().bold(), input.display(), cik);
                for (concept, _) in &fields {
                    match record.get(concept) {
                        Some(value) => println!("  {}: {}", concept.bold(), value),
                        None => println!("  {}: {}", concept.bold(), "-".dimmed()),
                    }
                }
            }
        }

        Commands::FetchIndex {
            net,
            year,
            quarter,
            current,
            output,
        } => {
            let source = match (year, quarter.and_then(Quarter::from_number), current) {
                (_, _, true) => IndexSource::Current,
                (Some(year), Some(quarter), false) => IndexSource::Quarter { year, quarter },
                _ => bail!("either --current or both --year and --quarter are required"),
            };
            let client = net.client()?;
            let bytes = with_output(output.as_deref(), |out| Ok(client.download_index(source, out)?))
                .with_context(|| format!("Failed to download {}", source.url()))?;
            eprintln!("{} {} bytes from {}", "✓".green().bold(), bytes, source.url());
        }

        Commands::FetchReport {
            net,
            cik,
            accession,
            output,
        } => {
            let client = net.client()?;
            let bytes = with_output(output.as_deref(), |out| {
                Ok(client.download_report(out, cik, &accession)?)
            })
            .with_context(|| format!("Failed to download report {}", accession))?;
            eprintln!("{} {} bytes for {}", "✓".green().bold(), bytes, accession);
        }
    }

    Ok(())
}

#[cfg(feature = "parallel")]
fn parse_all(inputs: &[PathBuf]) -> Vec<edgarx::Result<Vec<IndexEntry>>> {
    edgarx::index::parse_index_files(inputs)
}

#[cfg(not(feature = "parallel"))]
fn parse_all(inputs: &[PathBuf]) -> Vec<edgarx::Result<Vec<IndexEntry>>> {
    inputs.iter().map(parse_index_file).collect()
}

fn write_entry<W: Write>(out: &mut W, entry: &IndexEntry, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *out, entry)?;
        writeln!(out)?;
    } else {
        writeln!(
            out,
            "{:<6} {} {} {} {}",
            entry.form_type,
            entry.cik,
            entry.date_filed,
            entry.accession_number,
            entry.company_name.trim_end()
        )?;
    }
    Ok(())
}

fn with_output<F>(path: Option<&Path>, write: F) -> Result<u64>
where
    F: FnOnce(&mut dyn Write) -> Result<u64>,
{
    match path {
        Some(path) => {
            let mut file = BufWriter::new(
                File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
            );
            let bytes = write(&mut file)?;
            file.flush()?;
            Ok(bytes)
        }
        None => {
            let mut out = io::stdout().lock();
            let bytes = write(&mut out)?;
            out.flush()?;
            Ok(bytes)
        }
    }
}
