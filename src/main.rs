use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use std::io::{self, BufWriter, Write};

use jot::encode::Encoder;
use jot::format;
use jot::grep::{self, BinaryFlavor, JsonLinesFlavor, RecordFlavor};
use jot::pattern::{Atom, Pattern, StrPattern};
use jot::source::ByteSource;
use jot::stats;

#[derive(Parser)]
#[command(name = "jot", about = "Record-oriented binary log toolkit", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode files to JSON lines on stdout
    Cat {
        /// Input files; '-' or none reads stdin
        files: Vec<String>,

        /// Treat input as JSON lines (skip format sniffing)
        #[arg(long)]
        jsonl: bool,
    },

    /// Find records matching a structured pattern
    Grep(GrepArgs),

    /// Encode JSON lines to the binary format on stdout
    Enc {
        /// Input files; '-' or none reads stdin
        files: Vec<String>,
    },

    /// Show record and dictionary statistics for binary files
    Stats {
        /// Input files; '-' or none reads stdin
        files: Vec<String>,
    },
}

#[derive(Args)]
#[command(group(ArgGroup::new("value").required(true)))]
struct GrepArgs {
    /// Match a signed integer value
    #[arg(short = 'i', long, group = "value", allow_hyphen_values = true)]
    int: Option<i64>,

    /// Match an unsigned integer value
    #[arg(short = 'u', long, group = "value")]
    uint: Option<u64>,

    /// Match a double value (bit-exact)
    #[arg(short = 'd', long, group = "value", allow_hyphen_values = true)]
    double: Option<f64>,

    /// Match a string value (substring unless --full-match)
    #[arg(short = 's', long, group = "value")]
    string: Option<String>,

    /// Match null, true, or false
    #[arg(short = 'a', long, group = "value", value_enum)]
    atom: Option<AtomArg>,

    /// Match a timestamp interval: START..END (half-open) or a single
    /// instant, which covers the following second
    #[arg(short = 't', long, group = "value", value_name = "SPEC")]
    time: Option<String>,

    /// Only consider values under this object key
    #[arg(short = 'k', long, value_name = "KEY")]
    key: Option<String>,

    /// Strings must equal the pattern instead of containing it
    #[arg(long)]
    full_match: bool,

    /// Print only the number of matching records
    #[arg(short = 'c', long)]
    count: bool,

    /// Stop after N matches
    #[arg(short = 'm', long, value_name = "N")]
    max_count: Option<u64>,

    /// Print N records of leading context
    #[arg(short = 'B', long, value_name = "N")]
    before_context: Option<u32>,

    /// Print N records of trailing context
    #[arg(short = 'A', long, value_name = "N")]
    after_context: Option<u32>,

    /// Shorthand for --before-context N --after-context N
    #[arg(short = 'C', long, value_name = "N")]
    context: Option<u32>,

    /// Binary-search a file whose records are ordered by the patterned
    /// value; requires a seekable file
    #[arg(long)]
    bisect: bool,

    /// Give up after scanning N bytes past the last match
    #[arg(long, value_name = "N")]
    scan_suffix: Option<u64>,

    /// Treat input as JSON lines (skip format sniffing)
    #[arg(long)]
    jsonl: bool,

    /// Input files; '-' or none reads stdin
    files: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AtomArg {
    Null,
    True,
    False,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let stdout = io::stdout().lock();
    let mut out = BufWriter::with_capacity(128 * 1024, stdout);

    match cli.command {
        Command::Cat { files, jsonl } => cmd_cat(&files, jsonl, &mut out)?,
        Command::Grep(args) => cmd_grep(args, &mut out)?,
        Command::Enc { files } => cmd_enc(&files, &mut out)?,
        Command::Stats { files } => cmd_stats(&files, &mut out)?,
    }

    out.flush()?;
    Ok(())
}

/// '-' and the empty file list mean stdin.
fn inputs(files: &[String]) -> Vec<String> {
    if files.is_empty() {
        vec!["-".to_string()]
    } else {
        files.to_vec()
    }
}

fn open_source(path: &str) -> Result<ByteSource> {
    if path == "-" {
        Ok(ByteSource::stdin())
    } else {
        ByteSource::open(path).with_context(|| format!("failed to open '{path}'"))
    }
}

/// Pick the decoder flavour: the jot magic wins unless --jsonl forces text.
fn flavor_for(src: &mut ByteSource, force_jsonl: bool) -> Result<Box<dyn RecordFlavor>> {
    if !force_jsonl && src.starts_with(&format::MAGIC)? {
        Ok(Box::new(BinaryFlavor::new()))
    } else {
        Ok(Box::new(JsonLinesFlavor::new()))
    }
}

fn cmd_cat(files: &[String], jsonl: bool, out: &mut dyn Write) -> Result<()> {
    for path in inputs(files) {
        let mut src = open_source(&path)?;
        let mut flavor = flavor_for(&mut src, jsonl)?;
        loop {
            let more = flavor
                .output_value(&mut src, out)
                .with_context(|| format!("failed to decode '{path}'"))?;
            if !more {
                break;
            }
        }
    }
    Ok(())
}

fn cmd_grep(args: GrepArgs, out: &mut dyn Write) -> Result<()> {
    let pattern = build_pattern(&args)?;
    for path in inputs(&args.files) {
        let mut src = open_source(&path)?;
        let mut flavor = flavor_for(&mut src, args.jsonl)?;
        grep::grep(&pattern, &mut src, flavor.as_mut(), out)
            .with_context(|| format!("grep failed on '{path}'"))?;
    }
    Ok(())
}

fn build_pattern(args: &GrepArgs) -> Result<Pattern> {
    let mut pattern = Pattern {
        key_pattern: args.key.clone(),
        int_pattern: args.int,
        uint_pattern: args.uint,
        double_pattern: args.double,
        atom_pattern: args.atom.map(|a| match a {
            AtomArg::Null => Atom::Null,
            AtomArg::True => Atom::True,
            AtomArg::False => Atom::False,
        }),
        str_pattern: args.string.as_ref().map(|s| StrPattern {
            needle: s.clone(),
            full_match: args.full_match,
        }),
        num_matches: args.max_count,
        scan_suffix_amount: args.scan_suffix,
        before_context: args.context.or(args.before_context).unwrap_or(0),
        after_context: args.context.or(args.after_context).unwrap_or(0),
        bisect: args.bisect,
        count: args.count,
        ..Default::default()
    };
    if let Some(spec) = &args.time {
        let interval = format::parse_time_interval(spec)
            .with_context(|| format!("invalid --time '{spec}'"))?;
        pattern.timestamp_pattern = Some(interval);
    }
    Ok(pattern)
}

fn cmd_enc(files: &[String], out: &mut dyn Write) -> Result<()> {
    let mut enc = Encoder::new(out);
    let mut line = Vec::new();
    for path in inputs(files) {
        let mut src = open_source(&path)?;
        loop {
            let more = src
                .read_line(&mut line)
                .with_context(|| format!("failed to read '{path}'"))?;
            if !more {
                break;
            }
            enc.encode_line(&line)
                .with_context(|| format!("failed to encode '{path}'"))?;
        }
    }
    enc.finish()?;
    Ok(())
}

fn cmd_stats(files: &[String], out: &mut dyn Write) -> Result<()> {
    let paths = inputs(files);
    for path in &paths {
        let mut src = open_source(path)?;
        if !src.starts_with(&format::MAGIC)? {
            bail!("'{path}' is not a jot binary file");
        }
        let stats = stats::collect(&mut src)
            .with_context(|| format!("failed to read '{path}'"))?;
        if paths.len() > 1 {
            writeln!(out, "{path}:")?;
        }
        writeln!(out, "{stats}")?;
    }
    Ok(())
}
