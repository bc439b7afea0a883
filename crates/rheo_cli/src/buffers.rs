//! `rheo buffers` — elastic-buffer placement.
//!
//! Loads a dot netlist, derives execution frequencies from its basic-block
//! tags when present, runs the MILP placement, and writes the buffered
//! netlist back out.

use std::fs;
use std::time::Duration;

use rheo_buffers::{place_buffers, PlacementConfig};
use rheo_netlist::bb::{
    annotate_from_basic_blocks, build_basic_blocks, DEFAULT_BACK_PROBABILITY,
};
use rheo_netlist::dot::{read_dot, write_dot};
use rheo_solver::SubprocessSolver;

use crate::{BuffersArgs, GlobalArgs};

/// Runs the `rheo buffers` command.
pub fn run(args: &BuffersArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(&args.input)?;
    let mut nl = read_dot(&text)?;
    nl.check()?;

    if let Some(mut bbg) = build_basic_blocks(&nl) {
        bbg.default_probabilities(DEFAULT_BACK_PROBABILITY);
        bbg.compute_frequencies();
        annotate_from_basic_blocks(&mut nl, &bbg);
    }

    let solver = SubprocessSolver::detect(args.solver.map(|s| s.kind()))?;
    if !global.quiet {
        eprintln!(
            "   Placing buffers in {} (period {} ns, solver {})",
            nl.name,
            args.period,
            solver.kind().executable()
        );
    }

    let mut config = PlacementConfig::new(args.period);
    config.buffer_delay = args.buffer_delay;
    config.max_throughput = args.max_throughput;
    config.coverage = args.coverage;
    config.time_limit = args.timeout.map(Duration::from_secs);

    let report = place_buffers(&mut nl, &config, &solver)?;
    fs::write(&args.output, write_dot(&nl))?;

    if !global.quiet {
        eprintln!(
            "   Inserted {} buffers, {} slots total",
            report.num_buffers, report.total_slots
        );
        if global.verbose {
            for (i, r) in report.regions.iter().enumerate() {
                eprintln!(
                    "   region {}: freq {:.2}, {} channels, throughput {:.4}",
                    i, r.frequency, r.num_channels, r.throughput
                );
            }
        }
    }

    Ok(0)
}
