//! `rheo check` — structural validation of a dot netlist.

use std::fs;

use rheo_netlist::dot::read_dot;

use crate::{CheckArgs, GlobalArgs};

/// Runs the `rheo check` command. Exit code 0 when the netlist is
/// well-formed; parse and structural failures surface as errors.
pub fn run(args: &CheckArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(&args.input)?;
    let nl = read_dot(&text)?;
    nl.check()?;

    if !global.quiet {
        eprintln!(
            "   {} ok: {} blocks, {} channels",
            nl.name,
            nl.num_blocks(),
            nl.num_channels()
        );
    }
    Ok(0)
}
