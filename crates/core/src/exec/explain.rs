//! Text rendering of operator trees.
//!
//! The rendering walks [`ExecOperator::child_count`] and [`ExecOperator::child`],
//! so it reflects the diagnostic tree operators choose to report. For a
//! [`DiskSpiller`](super::operators::DiskSpiller) in verbose mode this is not the
//! runtime data-flow graph.

use std::fmt::Write;

use crate::exec::{ExecOperator, SharedOperator};

/// Number of spaces used per indentation level in text plan output.
const INDENT_WIDTH: usize = 4;

/// Formats an operator tree as indented text, one operator per line.
pub fn format_plan(plan: &SharedOperator, verbose: bool) -> String {
	let mut output = String::new();
	format_execution_plan(plan, verbose, &mut output, "");
	output
}

fn format_execution_plan(plan: &SharedOperator, verbose: bool, output: &mut String, prefix: &str) {
	// Release the lock before descending, as children may be shared with other nodes
	let children = {
		let op = plan.lock();
		format_operator(&*op, output);
		(0..op.child_count(verbose)).filter_map(|i| op.child(i, verbose)).collect::<Vec<_>>()
	};
	if !children.is_empty() {
		let child_prefix = format!("{}{:width$}", prefix, "", width = INDENT_WIDTH);
		for child in children.iter() {
			let _ = write!(output, "{}", child_prefix);
			format_execution_plan(child, verbose, output, &child_prefix);
		}
	}
}

fn format_operator(op: &dyn ExecOperator, output: &mut String) {
	let _ = write!(output, "{}", op.name());
	let properties = op.attrs();
	if !properties.is_empty() {
		let _ = write!(output, " [");
		for (i, (key, value)) in properties.iter().enumerate() {
			if i > 0 {
				let _ = write!(output, ", ");
			}
			let _ = write!(output, "{key}: {value}");
		}
		let _ = write!(output, "]");
	}
	let _ = writeln!(output);
}
