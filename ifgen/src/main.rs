use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use ifgen::error::HeaderError;
use ifgen::header::{CallContext, Header, HeaderSpec, Port};
use ifgen::library::{write_header, LibraryLocation};
use ifgen::variant::registry;

#[derive(Parser, Debug)]
#[command(
    name = "ifgen",
    version,
    about = "Generates and checks C++ interfaces for functions with derivative variants"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print progress to stderr
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header for a compact function description
    Emit {
        /// Function name
        #[arg(long)]
        name: String,

        /// Input ports, e.g. "double x, double y"
        #[arg(long, default_value = "")]
        inputs: String,

        /// Output ports, e.g. "double r"
        #[arg(long, default_value = "")]
        outputs: String,

        /// Derivative channels, e.g. "D_r_D_x, D_r_D_y = 2.0"
        #[arg(long, default_value = "")]
        derivatives: String,

        /// Supported variants by short name
        #[arg(long, value_delimiter = ',', default_value = "d0")]
        variants: Vec<String>,

        /// Write `{lib}.h` into this absolute directory instead of stdout
        #[arg(long, requires = "lib")]
        out_dir: Option<PathBuf>,

        /// Base name of the written header
        #[arg(long, requires = "out_dir")]
        lib: Option<String>,
    },

    /// Parse a header file and verify it prints back unchanged
    Check {
        /// Header file
        file: PathBuf,

        /// Print a JSON summary of the parsed header
        #[arg(long)]
        json: bool,
    },

    /// Generate the call statement for one variant of a header file
    Call {
        /// Header file
        file: PathBuf,

        /// Variant short name
        #[arg(long, default_value = "d0")]
        variant: String,

        /// Input expression (repeatable, in input order)
        #[arg(long = "arg")]
        args: Vec<String>,

        /// Consume a channel into a destination: `CHANNEL=DEST` (repeatable)
        #[arg(long = "bind")]
        binds: Vec<String>,

        /// Consume a channel expected to be constant (repeatable)
        #[arg(long = "require")]
        requires: Vec<String>,

        /// Qualify the callee with this namespace
        #[arg(long)]
        namespace: Option<String>,
    },
}

/// `check --json` output.
#[derive(Serialize)]
struct HeaderSummary<'a> {
    name: &'a str,
    inputs: &'a [Port],
    outputs: &'a [Port],
    variants: Vec<&'static str>,
    constants: Vec<ConstantSummary>,
}

#[derive(Serialize)]
struct ConstantSummary {
    channel: String,
    value: f64,
}

fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    let result = match cli.command {
        Command::Emit {
            name,
            inputs,
            outputs,
            derivatives,
            variants,
            out_dir,
            lib,
        } => {
            let spec = HeaderSpec {
                name,
                inputs,
                outputs,
                derivatives,
                variants,
            };
            emit(&spec, out_dir.zip(lib), verbose)
        }
        Command::Check { file, json } => check(&file, json, verbose),
        Command::Call {
            file,
            variant,
            args,
            binds,
            requires,
            namespace,
        } => call(&file, &variant, args, &binds, &requires, namespace.as_deref(), verbose),
    };

    if let Err(e) = result {
        eprintln!("ifgen: error: {}", e);
        std::process::exit(exit_code(&e));
    }
}

/// 2 for filesystem failures, 1 for everything else.
fn exit_code(e: &HeaderError) -> i32 {
    match e {
        HeaderError::Io { .. } => 2,
        _ => 1,
    }
}

fn emit(spec: &HeaderSpec, target: Option<(PathBuf, String)>, verbose: bool) -> Result<(), HeaderError> {
    let header = Header::from_spec(spec)?;
    if verbose {
        eprintln!(
            "ifgen: {} with {} variants, {} constant channels",
            header.name(),
            header.supported_variants().len(),
            header.constant_channels().len()
        );
    }
    match target {
        Some((dir, base)) => {
            let location = LibraryLocation::new(dir, base)?;
            let path = write_header(&header, &location)?;
            if verbose {
                eprintln!("ifgen: wrote {}", path.display());
            }
        }
        None => print!("{}", header.print()?),
    }
    Ok(())
}

fn load(file: &Path, verbose: bool) -> Result<(Header, String), HeaderError> {
    let text = std::fs::read_to_string(file).map_err(|source| HeaderError::Io {
        path: file.to_path_buf(),
        source,
    })?;
    let header = Header::parse(&text)?;
    if verbose {
        eprintln!("ifgen: parsed {} from {}", header.name(), file.display());
    }
    Ok((header, text))
}

fn check(file: &Path, json: bool, verbose: bool) -> Result<(), HeaderError> {
    let (header, text) = load(file, verbose)?;
    let region = ifgen::header::codec::variant_region(&text).unwrap_or(&text);
    let printed = header.print()?;
    if printed != region {
        let line = printed
            .lines()
            .zip(region.lines())
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| printed.lines().count().min(region.lines().count()))
            + 1;
        return Err(HeaderError::Syntax {
            line,
            message: "header text is not in canonical form".to_string(),
        });
    }

    if json {
        let constants = header
            .constant_channels()
            .iter()
            .map(|(channel, value)| {
                Ok(ConstantSummary {
                    channel: header.channel_name(channel)?,
                    value: *value,
                })
            })
            .collect::<Result<Vec<_>, HeaderError>>()?;
        let summary = HeaderSummary {
            name: header.name(),
            inputs: header.inputs(),
            outputs: header.outputs(),
            variants: registry().names_of(header.supported_variants())?,
            constants,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{}: ok ({}, {} variants, {} constant channels)",
            file.display(),
            header.name(),
            header.supported_variants().len(),
            header.constant_channels().len()
        );
    }
    Ok(())
}

fn call(
    file: &Path,
    variant: &str,
    args: Vec<String>,
    binds: &[String],
    requires: &[String],
    namespace: Option<&str>,
    verbose: bool,
) -> Result<(), HeaderError> {
    let (header, _) = load(file, verbose)?;
    let variant = registry()
        .lookup(variant)
        .ok_or_else(|| HeaderError::UnknownVariant(variant.to_string()))?;

    let mut ctx = CallContext::new(args);
    for bind in binds {
        let (channel, dest) = bind.split_once('=').ok_or_else(|| HeaderError::Syntax {
            line: 1,
            message: format!("--bind expects CHANNEL=DEST, got '{}'", bind),
        })?;
        ctx = ctx.bind(header.channel_from_name(channel.trim())?, dest.trim());
    }
    for name in requires {
        ctx = ctx.require(header.channel_from_name(name.trim())?);
    }

    let site = match namespace {
        Some(ns) => header.generate_qualified_call_site(&variant, &ctx, ns)?,
        None => header.generate_call_site(&variant, &ctx)?,
    };
    println!("{}", site.text());
    for (channel, value) in &site.resolved_constants {
        println!("// {} = {:.6}", header.channel_name(channel)?, value);
    }
    if verbose {
        eprintln!(
            "ifgen: {} resolved constants",
            site.resolved_constants.len()
        );
    }
    Ok(())
}
