//! GFA 1.0 output of variation graphs

use std::io::Write;

use rustc_hash::FxHashMap;

use crate::errors::PangeblocksError;
use crate::graph::VariationGraph;

/// Write segments, links and one path per sequence. Segment ids are 1-based, assigned in column
/// order.
pub fn write_gfa<W: Write>(mut writer: W, graph: &VariationGraph) -> Result<(), PangeblocksError> {
    writeln!(writer, "H\tVN:Z:1.0")?;

    let mut segment_ids = FxHashMap::default();
    for (ix, node) in graph.sorted_nodes().into_iter().enumerate() {
        segment_ids.insert(node, ix + 1);
        writeln!(writer, "S\t{}\t{}", ix + 1, graph.segment(node).label)?;
    }

    let mut links: Vec<(usize, usize)> = graph.edges()
        .map(|(s, t, _)| (segment_ids[&s], segment_ids[&t]))
        .collect();
    links.sort_unstable();
    for (s, t) in links {
        writeln!(writer, "L\t{s}\t+\t{t}\t+\t0M")?;
    }

    for path in graph.paths() {
        if path.nodes.is_empty() {
            continue;
        }

        let steps: Vec<String> = path.nodes.iter()
            .map(|n| format!("{}+", segment_ids[n]))
            .collect();
        writeln!(writer, "P\t{}\t{}\t*", path.name, steps.join(","))?;
    }

    Ok(())
}
