//! Terminal output for facematchctl. ASCII only.

use facematch_common::hasher::KeySource;
use facematch_common::{IdentityKey, Name, StatsReport};
use owo_colors::OwoColorize;

const HR: &str = "------------------------------------------------------------";
const KEY_WIDTH: usize = 15;

fn print_kv(key: &str, value: &str) {
    println!("{:width$} {}", key, value, width = KEY_WIDTH);
}

pub fn print_stats(report: &StatsReport, store: &str) {
    println!("\n{}", "facematch stats".bold());
    println!("{}", HR.dimmed());

    print_kv("store", store);
    print_kv("people", &report.people.to_string());
    print_kv("negatives", &report.negatives.to_string());
    print_kv("avg_negatives", &format!("{:.1}", report.average_negatives));
    print_kv("accuracy", &report.accuracy_label());
    println!();
}

pub fn print_progress(people: usize, sample: &[(IdentityKey, Name)]) {
    println!("\n{}", "facematch progress".bold());
    println!("{}", HR.dimmed());
    print_kv("people", &people.to_string());

    if sample.is_empty() {
        println!("\n{}", "Nothing learned yet.".dimmed());
        return;
    }

    println!();
    for (key, name) in sample {
        println!("  {:<40} {}", key.as_str().dimmed(), name.green());
    }
    if people > sample.len() {
        println!("  {}", format!("... and {} more", people - sample.len()).dimmed());
    }
    println!();
}

pub fn print_hash(locator: &str, key: &IdentityKey, source: KeySource, known: Option<&str>) {
    print_kv("locator", locator);
    print_kv("key", key.as_str());

    let source = match source {
        KeySource::Structural => "structural id",
        KeySource::Content => "image content",
        KeySource::Suffix => "locator suffix (image unavailable)",
        KeySource::Cached => "cache",
    };
    print_kv("derived_from", source);

    match known {
        Some(name) => print_kv("known_as", &name.green().to_string()),
        None => print_kv("known_as", &"unknown".yellow().to_string()),
    }
}
