//! Tree command - print the batch tree with counts and loads.

use std::fmt::Write;

use batchcache::batch::BatchNode;
use batchcache::dataset::Dataset;
use console::style;

use super::common::CommandContext;
use crate::error::CliError;

/// Run the tree command.
pub fn run(ctx: &CommandContext) -> Result<(), CliError> {
    let dataset = ctx.dataset()?;
    print!("{}", render(&dataset));
    Ok(())
}

/// Render the whole dataset as an indented tree.
pub fn render(dataset: &Dataset) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ({}) - {} packets, load {:.0}",
        style(&dataset.info().name).bold(),
        dataset.info().kind,
        dataset.total_packet_count(),
        dataset.expected_load()
    );
    let batches = dataset.batches();
    for (i, batch) in batches.iter().enumerate() {
        render_node(&mut out, batch, "", i + 1 == batches.len());
    }
    out
}

fn node_label(node: &BatchNode) -> &'static str {
    if node.is_bare() {
        "bare"
    } else if node.is_group() {
        "group"
    } else {
        "leaf"
    }
}

fn render_node(out: &mut String, node: &BatchNode, prefix: &str, last: bool) {
    let branch = if last { "└── " } else { "├── " };
    let _ = writeln!(
        out,
        "{}{}{} [{}] {} packets, load {:.0}{}",
        prefix,
        branch,
        node.name(),
        node_label(node),
        node.total_packet_count(),
        node.expected_load(),
        if node.is_grayscale() { ", gray" } else { "" }
    );
    // A bare group's only child repeats its own line.
    if node.is_bare() {
        return;
    }
    let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
    let children = node.children();
    for (i, child) in children.iter().enumerate() {
        render_node(out, child, &child_prefix, i + 1 == children.len());
    }
}
