//! Console output helpers.
//!
//! Consistent formatting for the human-readable output of every command.
//! Nothing here is called when `--json` owns stdout.

use colored::Colorize;

const RULE_WIDTH: usize = 70;

/// Column width for the subject of a result line.
const RESULT_COLUMN: usize = 32;

fn rule() -> String {
    "═".repeat(RULE_WIDTH).bright_black().to_string()
}

/// Print a section header between two rules.
pub fn print_section(title: &str) {
    println!();
    println!("{}", rule());
    println!("  {}", title.cyan().bold());
    println!("{}", rule());
    println!();
}

/// Print the start of a sub-step.
pub fn print_step(message: &str) {
    println!("{} {}", "▶".cyan(), message.bold());
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

/// Print an error line on stderr.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a notice that nothing was (or will be) changed.
pub fn print_dry_run(message: &str) {
    println!("{} {}", "[DRY RUN]".magenta().bold(), message);
}

/// Print one node or pod result with an optional dimmed detail.
pub fn print_check_result(subject: &str, passed: bool, detail: Option<&str>) {
    let mark = if passed { "✓".green() } else { "✗".red() };
    match detail {
        Some(detail) => println!(
            "  {mark} {subject:<width$} {}",
            detail.bright_black(),
            width = RESULT_COLUMN
        ),
        None => println!("  {mark} {subject}"),
    }
}

/// Print a labelled value.
pub fn print_kv(key: &str, value: &str) {
    println!("  {} {}", format!("{key}:").bright_black(), value.green());
}

pub fn print_list_item(item: &str) {
    println!("    {} {item}", "•".bright_black());
}
