//! Subcommand implementations

pub mod config;
pub mod decode;
pub mod inspect;

use crossterm::style::Stylize;
use ota_schema::AppDescriptor;

const LABEL_WIDTH: usize = 13;

/// Print a bold heading followed by aligned `label  value` rows.
pub(crate) fn print_rows(heading: &str, rows: &[(&str, String)]) {
    println!();
    println!("  {}", heading.white().bold());
    println!();
    for (label, value) in rows {
        let mut lines = value.lines();
        let first = lines.next().unwrap_or("");
        println!("  {}{first}", format!("{label:<LABEL_WIDTH$}").dark_grey());
        for line in lines {
            println!("  {:LABEL_WIDTH$}{line}", "");
        }
    }
}

/// Rows describing a decoded app.
pub(crate) fn descriptor_rows(descriptor: &AppDescriptor) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("identifier", descriptor.identifier.clone()),
        ("version", descriptor.version.clone()),
        ("build", descriptor.build_number.clone()),
    ];
    if let Some(name) = &descriptor.display_name {
        rows.push(("name", name.clone()));
    }
    rows
}
