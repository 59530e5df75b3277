use std::fs::File;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use log::*;

use circuitry::{
    decoder, extract, printers, rules, serialize, Circuit, Error, Result, Runner, StopReason,
};

/// Symbolic circuit optimizer: rewrites a lifted decoder circuit with
/// equality saturation and emits it in several surface forms.
#[derive(Debug, Parser)]
#[command(name = "circuitry", version, about)]
struct Args {
    /// Path to a file containing only machine code instructions.
    #[arg(long = "binary_in")]
    binary_in: Option<String>,

    /// Path to a file containing serialized IR (`-` for stdin).
    #[arg(long = "ir_in", conflicts_with = "binary_in")]
    ir_in: Option<String>,

    /// Instruction set architecture of the input.
    #[arg(long, default_value = "amd64")]
    arch: String,

    /// Operating system the input targets.
    #[arg(long, default_value = "linux")]
    os: String,

    /// Path to the output IR file (`-` for stdout).
    #[arg(long = "ir_out")]
    ir_out: Option<String>,

    /// Path to the output GraphViz DOT file (`-` for stderr).
    #[arg(long = "dot_out")]
    dot_out: Option<String>,

    /// Path to the output Python file (`-` for stderr).
    #[arg(long = "python_out")]
    python_out: Option<String>,

    /// Path to the output SMT-LIB2 file (`-` for stderr).
    #[arg(long = "smt_out")]
    smt_out: Option<String>,

    /// Path to the output JSON file (`-` for stderr).
    #[arg(long = "json_out")]
    json_out: Option<String>,

    /// Path to the generated C decoder (`-` for stderr).
    #[arg(long = "decoder_out")]
    decoder_out: Option<String>,

    /// An additional rule-set file applied on top of the built-in rules.
    #[arg(long)]
    rules: Option<String>,

    /// Saturation iteration budget.
    #[arg(long = "iter_limit", default_value_t = 30)]
    iter_limit: usize,

    /// Saturation enode budget.
    #[arg(long = "node_limit", default_value_t = 10_000)]
    node_limit: usize,

    /// Saturation time budget, in seconds.
    #[arg(long = "time_limit", default_value_t = 5)]
    time_limit: u64,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("circuitry: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let circuit = read_circuit(&args)?;
    info!(
        "loaded a {}-operation circuit ({} / {})",
        circuit.len(),
        args.arch,
        args.os
    );

    let mut ruleset = rules::default_rules();
    if let Some(path) = &args.rules {
        let text = std::fs::read_to_string(path)?;
        ruleset.extend(circuitry::parse_rules(&text)?);
    }

    let (egraph, root) = extract::lower(&circuit);
    let runner = Runner::default()
        .with_iter_limit(args.iter_limit)
        .with_node_limit(args.node_limit)
        .with_time_limit(std::time::Duration::from_secs(args.time_limit))
        .with_egraph(egraph)
        .with_root(root)
        .run(&ruleset);

    match &runner.stop_reason {
        Some(StopReason::Saturated) => info!("rewriting saturated"),
        Some(reason) => warn!("rewriting budget exhausted: {:?}", reason),
        None => unreachable!("runner finished without a stop reason"),
    }

    let circuit = extract::Extractor::new(&runner.egraph).extract(runner.egraph.find(root));
    info!("extracted a {}-operation circuit", circuit.len());

    write_outputs(&args, &circuit)
}

fn read_circuit(args: &Args) -> Result<Circuit> {
    if args.binary_in.is_some() {
        // lifting machine code is the upstream front end's job
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::Unsupported,
            "binary lifting requires the external lifter; pass `--ir_in` instead",
        )));
    }
    let path = args.ir_in.as_deref().ok_or(Error::InputMissing)?;
    if path == "-" {
        serialize::deserialize(&mut io::stdin().lock())
    } else {
        serialize::deserialize(&mut File::open(path)?)
    }
}

fn write_outputs(args: &Args, circuit: &Circuit) -> Result<()> {
    if let Some(path) = &args.ir_out {
        let mut out = open_out(path, Dash::Stdout)?;
        serialize::serialize(circuit, out.as_mut())?;
    }
    if let Some(path) = &args.dot_out {
        let mut out = open_out(path, Dash::Stderr)?;
        printers::print_dot(circuit, out.as_mut())?;
    }
    if let Some(path) = &args.python_out {
        let mut out = open_out(path, Dash::Stderr)?;
        printers::print_python(circuit, out.as_mut())?;
    }
    if let Some(path) = &args.smt_out {
        let mut out = open_out(path, Dash::Stderr)?;
        printers::print_smt(circuit, out.as_mut())?;
    }
    if let Some(path) = &args.json_out {
        let mut out = open_out(path, Dash::Stderr)?;
        printers::print_json(circuit, out.as_mut())?;
    }
    if let Some(path) = &args.decoder_out {
        let contexts = decoder::extract_contexts(circuit)?;
        let tree = decoder::build_tree(&contexts);
        let mut out = open_out(path, Dash::Stderr)?;
        decoder::emit_c(&contexts, &tree, out.as_mut())?;
    }
    Ok(())
}

enum Dash {
    Stdout,
    Stderr,
}

fn open_out(path: &str, dash: Dash) -> Result<Box<dyn Write>> {
    Ok(match (path, dash) {
        ("-", Dash::Stdout) => Box::new(io::stdout().lock()),
        ("-", Dash::Stderr) => Box::new(io::stderr().lock()),
        (path, _) => Box::new(File::create(path)?),
    })
}
