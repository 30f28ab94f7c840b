//! xorwin command line interface
//!
//! Usage:
//!   xorwin bench [--no-header] <input.csv>                 # measure ratio and throughput
//!   xorwin compress [--no-header] <input.csv> <out.xwn>    # write a compressed artifact
//!   xorwin decompress <input.xwn>                          # print rows as CSV
//!   xorwin --version
//!   xorwin --help

use std::env;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::process;
use std::time::{Duration, Instant};

use log::info;
use xorwin::{load_csv, CompressedArtifact, Decoder, Encoder, Table};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parsed command line.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Bench { input: String },
    Compress { input: String, output: String },
    Decompress { input: String },
    Help,
    Version,
}

#[derive(Debug, PartialEq, Eq)]
struct Options {
    command: Command,
    /// Whether the first line of the CSV is a header.
    header: bool,
}

fn print_help(prog_name: &str) {
    println!("xorwin {VERSION}: multi-column time-series compression");
    println!();
    println!("Usage:");
    println!("  {prog_name} bench [--no-header] <input.csv>");
    println!("  {prog_name} compress [--no-header] <input.csv> <output.xwn>");
    println!("  {prog_name} decompress <input.xwn>\n");
    println!("Options:");
    println!("  --no-header    The CSV has no header line");
    println!("  -h, --help     Show this help message");
    println!("  -v, --version  Show version information\n");
    println!("The first CSV column is the timestamp; empty cells are read as NaN.");
    println!("Set RUST_LOG=debug for codec diagnostics.");
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut header = true;
    let mut positional = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => {
                return Ok(Options {
                    command: Command::Help,
                    header,
                })
            }
            "-v" | "--version" => {
                return Ok(Options {
                    command: Command::Version,
                    header,
                })
            }
            "--no-header" => header = false,
            flag if flag.starts_with('-') => return Err(format!("Unknown option: {flag}")),
            _ => positional.push(arg.clone()),
        }
    }

    let command = match positional.as_slice() {
        [cmd, input] if cmd == "bench" => Command::Bench {
            input: input.clone(),
        },
        [cmd, input, output] if cmd == "compress" => Command::Compress {
            input: input.clone(),
            output: output.clone(),
        },
        [cmd, input] if cmd == "decompress" => Command::Decompress {
            input: input.clone(),
        },
        [] => Command::Help,
        _ => return Err("Invalid arguments (see --help)".to_string()),
    };
    Ok(Options { command, header })
}

fn load(path: &str, header: bool) -> Result<Table, String> {
    let table = load_csv(path, header).map_err(|e| format!("Cannot load {path}: {e}"))?;
    if table.is_empty() {
        return Err(format!("{path} contains no rows"));
    }
    Ok(table)
}

fn encode(table: &Table) -> Encoder {
    let mut encoder = Encoder::with_capacity(table.timestamps[0], table.len() * table.columns());
    for (ts, values) in table.timestamps.iter().zip(&table.rows) {
        encoder.add_row(*ts, values);
    }
    encoder.finish();
    encoder
}

/// Megabytes of uncompressed input processed per second.
fn throughput(rows: usize, columns: usize, elapsed: Duration) -> f64 {
    let micros = elapsed.as_micros().max(1) as f64;
    (8 * (columns + 1) * rows) as f64 / micros
}

fn format_row(timestamp: i64, values: &[f64]) -> String {
    let mut line = timestamp.to_string();
    for v in values {
        line.push(',');
        if !v.is_nan() {
            line.push_str(&v.to_string());
        }
    }
    line
}

fn do_bench(input: &str, header: bool) -> Result<(), String> {
    let table = load(input, header)?;
    let rows = table.len();
    let columns = table.columns();

    let start = Instant::now();
    let encoder = encode(&table);
    let elapsed = start.elapsed();

    let original_bits = 64 * (columns as u64 + 1) * rows as u64;
    let compressed_bits = encoder.compressed_bit_size();
    println!("*** COMPRESSION ***");
    println!("Rows:        {rows} x {columns} columns");
    println!("Throughput:  {:.3} MB/s", throughput(rows, columns, elapsed));
    println!(
        "Ratio:       {:.3}x ({original_bits} -> {compressed_bits} bits)",
        original_bits as f64 / compressed_bits as f64
    );

    let start = Instant::now();
    let mut decoder = Decoder::from_artifact(encoder.into_artifact());
    while decoder
        .advance()
        .map_err(|e| format!("Decoding failed: {e}"))?
    {}
    let elapsed = start.elapsed();

    println!("\n*** DECOMPRESSION ***");
    println!("Throughput:  {:.3} MB/s", throughput(rows, columns, elapsed));
    println!("Rows:        {}", decoder.rows());
    println!("\n*** LAST ROW ***");
    println!("{}", format_row(decoder.timestamp(), decoder.values()));

    if decoder.rows() != rows as u64 {
        return Err(format!(
            "decoded {} rows, expected {rows}",
            decoder.rows()
        ));
    }
    Ok(())
}

fn do_compress(input: &str, output: &str, header: bool) -> Result<(), String> {
    let table = load(input, header)?;
    let artifact = encode(&table).into_artifact();

    let file = File::create(output).map_err(|e| format!("Cannot create {output}: {e}"))?;
    let mut writer = BufWriter::new(file);
    artifact
        .write_to(&mut writer)
        .map_err(|e| format!("Cannot write {output}: {e}"))?;
    writer
        .flush()
        .map_err(|e| format!("Cannot write {output}: {e}"))?;

    let original_bits = 64 * (table.columns() as u64 + 1) * table.len() as u64;
    info!("wrote {output}");
    println!("Input:   {input} ({} rows x {} columns)", table.len(), table.columns());
    println!("Output:  {output} ({} bits)", artifact.compressed_bit_size());
    println!(
        "Ratio:   {:.2}x",
        original_bits as f64 / artifact.compressed_bit_size() as f64
    );
    Ok(())
}

fn do_decompress(input: &str) -> Result<(), String> {
    let file = File::open(input).map_err(|e| format!("Cannot open {input}: {e}"))?;
    let artifact = CompressedArtifact::read_from(&mut BufReader::new(file))
        .map_err(|e| format!("Cannot read {input}: {e}"))?;
    info!(
        "{input}: {} rows x {} columns",
        artifact.rows, artifact.columns
    );

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for row in Decoder::from_artifact(artifact) {
        let row = row.map_err(|e| format!("Cannot decode {input}: {e}"))?;
        writeln!(out, "{}", format_row(row.timestamp, &row.values))
            .map_err(|e| format!("Cannot write output: {e}"))?;
    }
    out.flush().map_err(|e| format!("Cannot write output: {e}"))?;
    Ok(())
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let prog_name = args.first().map_or("xorwin", String::as_str);

    let options = match parse_args(&args[1.min(args.len())..]) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let result = match options.command {
        Command::Help => {
            print_help(prog_name);
            Ok(())
        }
        Command::Version => {
            println!("xorwin {VERSION}");
            Ok(())
        }
        Command::Bench { ref input } => do_bench(input, options.header),
        Command::Compress {
            ref input,
            ref output,
        } => do_compress(input, output, options.header),
        Command::Decompress { ref input } => do_decompress(input),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_bench() {
        let opts = parse_args(&args(&["bench", "--no-header", "data.csv"])).unwrap();
        assert_eq!(
            opts,
            Options {
                command: Command::Bench {
                    input: "data.csv".into()
                },
                header: false
            }
        );
    }

    #[test]
    fn test_parse_compress_and_decompress() {
        let opts = parse_args(&args(&["compress", "a.csv", "a.xwn"])).unwrap();
        assert!(opts.header);
        assert_eq!(
            opts.command,
            Command::Compress {
                input: "a.csv".into(),
                output: "a.xwn".into()
            }
        );
        let opts = parse_args(&args(&["decompress", "a.xwn"])).unwrap();
        assert_eq!(
            opts.command,
            Command::Decompress {
                input: "a.xwn".into()
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&["bench"])).is_err());
        assert!(parse_args(&args(&["bench", "--fast", "x"])).is_err());
        assert_eq!(parse_args(&[]).unwrap().command, Command::Help);
    }

    #[test]
    fn test_format_row_leaves_nan_empty() {
        assert_eq!(format_row(5, &[1.5, f64::NAN, 2.0]), "5,1.5,,2");
    }
}
