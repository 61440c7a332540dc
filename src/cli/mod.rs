use std::path::{Path, PathBuf};
use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::{Attribute, Cell, CellAlignment, ContentArrangement, Table};

use crate::vision::registry::ModelEntry;
use crate::vision::result::ClassificationResult;

/// Command line interface for the scan classification service
#[derive(Parser)]
#[command(name = "neuroscan", about = "MRI brain-scan classification with saliency explanations")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP inference server
    Serve,
    /// Classify a scan image from disk and write its saliency overlay
    Classify {
        /// Path to the scan image (PNG or JPEG)
        image: PathBuf,
        /// Model identifier to use
        #[arg(long, default_value = "custom-cnn")]
        model: String,
        /// Where to write the overlay PNG
        #[arg(long, default_value = "overlay.png")]
        output: PathBuf,
    },
    /// List the models loaded in the registry
    Models,
}

/// Displays a table of loaded models with colorful formatting.
///
/// # Arguments
///
/// * `entries` - The registry's model listings
pub fn display_models_table(entries: &[ModelEntry]) {
    if entries.is_empty() {
        println!("{}", "No models loaded in registry".yellow());
        return;
    }

    let mut table = Table::new();
    table
        .set_header(vec![
            Cell::new("Id").fg(comfy_table::Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new("Name").fg(comfy_table::Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new("Input").fg(comfy_table::Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new("Normalization").fg(comfy_table::Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new("Tensors").fg(comfy_table::Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new("File").fg(comfy_table::Color::Cyan).add_attribute(Attribute::Bold),
        ])
        .load_preset(comfy_table::presets::UTF8_FULL)
        // Use dynamic content arrangement
        .set_content_arrangement(ContentArrangement::Dynamic);

    for entry in entries {
        table.add_row(vec![
            Cell::new(&entry.id).fg(comfy_table::Color::Yellow).set_alignment(CellAlignment::Center),
            Cell::new(&entry.name).fg(comfy_table::Color::Green),
            Cell::new(format!("{0}x{0}", entry.input_size)).fg(comfy_table::Color::Blue).set_alignment(CellAlignment::Center),
            Cell::new(&entry.normalization).fg(comfy_table::Color::Magenta).set_alignment(CellAlignment::Center),
            Cell::new(entry.tensor_count.to_string()).fg(comfy_table::Color::White).set_alignment(CellAlignment::Right),
            Cell::new(&entry.filename).fg(comfy_table::Color::DarkGrey),
        ]);
    }

    println!("{table}");
    println!("{} model(s) loaded", entries.len());
}

/// Displays one classification result: predicted class, confidence, and
/// the full distribution.
pub fn display_classification(result: &ClassificationResult, overlay_path: &Path) {
    let predicted = result.predicted_label();
    let confidence = result.probabilities().confidence();

    println!();
    println!(
        "Prediction: {}   Confidence: {}",
        predicted.display_name().red().bold(),
        format!("{:.2}%", confidence * 100.0).blue().bold()
    );

    let mut table = Table::new();
    table
        .set_header(vec![
            Cell::new("Class").fg(comfy_table::Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new("Probability").fg(comfy_table::Color::Cyan).add_attribute(Attribute::Bold),
        ])
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    // Highest probability first, matching how the original UI charted them
    let mut rows: Vec<_> = result.probabilities().iter().collect();
    rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    for (label, probability) in rows {
        let color = if label == predicted {
            comfy_table::Color::Red
        } else {
            comfy_table::Color::Blue
        };
        table.add_row(vec![
            Cell::new(label.display_name()).fg(color),
            Cell::new(format!("{:.4}", probability)).fg(color).set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{table}");
    println!("Saliency overlay written to {}", overlay_path.display());
}
