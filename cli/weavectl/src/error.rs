//! Error display for the CLI.

use colored::Colorize;
use weave_assign::AssignError;

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if err.chain().any(|cause| cause.is::<AssignError>()) {
        eprintln!(
            "\n{}",
            "Hint: the engine config passed with --engine-config has an out-of-range value."
                .yellow()
        );
    }
}
