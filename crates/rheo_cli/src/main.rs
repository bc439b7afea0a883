//! Rheo CLI — the command-line interface for the Rheo elastic-circuit tools.
//!
//! Provides `rheo buffers` for throughput-constrained elastic-buffer
//! placement and `rheo check` for structural validation of a netlist.

#![warn(missing_docs)]

mod buffers;
mod check;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use rheo_solver::SolverKind;

/// Rheo — elastic-circuit buffer placement.
#[derive(Parser, Debug)]
#[command(name = "rheo", version, about = "Rheo elastic-circuit tools")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output (per-region detail).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Place elastic buffers in a dataflow netlist.
    Buffers(BuffersArgs),
    /// Check a netlist for structural well-formedness.
    Check(CheckArgs),
}

/// Arguments for the `rheo buffers` subcommand.
#[derive(Parser, Debug)]
pub struct BuffersArgs {
    /// Input netlist in dot format.
    #[arg(short, long)]
    pub input: String,

    /// Output path for the buffered netlist.
    #[arg(short, long)]
    pub output: String,

    /// Target clock period in nanoseconds.
    #[arg(long)]
    pub period: f64,

    /// Combinational delay a transparent buffer adds to a channel.
    #[arg(long, default_value_t = 0.0)]
    pub buffer_delay: f64,

    /// MILP solver to use. Probes the PATH when omitted.
    #[arg(long, value_enum)]
    pub solver: Option<SolverChoice>,

    /// Maximize region throughput before minimizing buffer cost.
    #[arg(long)]
    pub max_throughput: bool,

    /// Fraction of the region weight the throughput constraints must cover.
    #[arg(long, default_value_t = 1.0)]
    pub coverage: f64,

    /// Solver wall-clock budget per solve, in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Arguments for the `rheo check` subcommand.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Input netlist in dot format.
    #[arg(short, long)]
    pub input: String,
}

/// MILP solver selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SolverChoice {
    /// COIN-OR CBC (`cbc`).
    Cbc,
    /// GNU GLPK (`glpsol`).
    Glpsol,
    /// Gurobi (`gurobi_cl`).
    Gurobi,
}

impl SolverChoice {
    fn kind(self) -> SolverKind {
        match self {
            SolverChoice::Cbc => SolverKind::Cbc,
            SolverChoice::Glpsol => SolverKind::Glpsol,
            SolverChoice::Gurobi => SolverKind::Gurobi,
        }
    }
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print per-region detail.
    pub verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let result = match cli.command {
        Command::Buffers(ref args) => buffers::run(args, &global),
        Command::Check(ref args) => check::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_buffers_minimal() {
        let cli = Cli::parse_from([
            "rheo", "buffers", "-i", "in.dot", "-o", "out.dot", "--period", "5.0",
        ]);
        match cli.command {
            Command::Buffers(ref args) => {
                assert_eq!(args.input, "in.dot");
                assert_eq!(args.output, "out.dot");
                assert_eq!(args.period, 5.0);
                assert_eq!(args.buffer_delay, 0.0);
                assert!(args.solver.is_none());
                assert!(!args.max_throughput);
                assert_eq!(args.coverage, 1.0);
                assert!(args.timeout.is_none());
            }
            _ => panic!("expected Buffers command"),
        }
    }

    #[test]
    fn parse_buffers_full() {
        let cli = Cli::parse_from([
            "rheo",
            "buffers",
            "--input",
            "a.dot",
            "--output",
            "b.dot",
            "--period",
            "4.0",
            "--buffer-delay",
            "0.1",
            "--solver",
            "glpsol",
            "--max-throughput",
            "--coverage",
            "0.5",
            "--timeout",
            "60",
        ]);
        match cli.command {
            Command::Buffers(ref args) => {
                assert_eq!(args.buffer_delay, 0.1);
                assert_eq!(args.solver, Some(SolverChoice::Glpsol));
                assert!(args.max_throughput);
                assert_eq!(args.coverage, 0.5);
                assert_eq!(args.timeout, Some(60));
            }
            _ => panic!("expected Buffers command"),
        }
    }

    #[test]
    fn parse_check() {
        let cli = Cli::parse_from(["rheo", "check", "-i", "in.dot"]);
        match cli.command {
            Command::Check(ref args) => assert_eq!(args.input, "in.dot"),
            _ => panic!("expected Check command"),
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from(["rheo", "--quiet", "check", "-i", "in.dot"]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
    }

    #[test]
    fn solver_choice_maps_to_kind() {
        assert_eq!(SolverChoice::Cbc.kind(), SolverKind::Cbc);
        assert_eq!(SolverChoice::Glpsol.kind(), SolverKind::Glpsol);
        assert_eq!(SolverChoice::Gurobi.kind(), SolverKind::Gurobi);
    }
}
