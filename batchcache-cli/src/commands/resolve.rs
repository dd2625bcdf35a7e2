//! Resolve command - map a dataset-wide packet index to its leaf.

use super::common::CommandContext;
use crate::error::CliError;

/// Run the resolve command.
pub fn run(ctx: &CommandContext, index: usize) -> Result<(), CliError> {
    let dataset = ctx.dataset()?;
    let route = dataset.resolve(index)?;
    println!(
        "{} -> {} [{}]",
        index,
        route.node.relative_path().display(),
        route.local_index
    );
    Ok(())
}
