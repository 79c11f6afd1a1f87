//! Output formatting for dem-sim (table, json)

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::report::Report;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII tables, one per section (default)
    #[default]
    Table,
    /// Whole report as one JSON document
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format }
    }

    /// Print a success message (tables only, JSON stays machine-readable)
    pub fn success(&self, msg: &str) {
        if self.format == OutputFormat::Table {
            println!("{}", msg.green());
        }
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    pub fn print_report(&self, report: &Report) {
        match self.format {
            OutputFormat::Table => {
                print_section("Events", &report.events);
                print_section("Memory entries", &report.entries);
                print_section("Permanent DTCs", &report.permanent);
                print_section("Readiness", &report.readiness);
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
    }
}

fn print_section<T: Tabled + Serialize>(title: &str, rows: &[T]) {
    println!("\n{}", title.bold());
    if rows.is_empty() {
        println!("No data");
    } else {
        println!("{}", Table::new(rows));
    }
}
