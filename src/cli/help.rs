//! Help message display for CLI.

#![allow(clippy::print_stdout)]

use crate::config::Config;

/// Print help message based on configuration state.
pub fn print_smart_help(config: &Config) {
    if config.model.is_none() {
        print_first_time_help();
    } else {
        print_configured_help();
    }
}

/// Print setup guide for first-time users.
pub fn print_first_time_help() {
    println!("No detection model configured. Get started with roadwatch:");
    println!();
    println!("1. Initialize configuration:");
    println!("   roadwatch config init");
    println!();
    println!("2. Point the [model] section at an ONNX road damage detector and its labels");
    println!("   file (one class name per line, first line is class 1):");
    println!();
    println!("   [model]");
    println!("   path = \"/models/road_damage.onnx\"");
    println!("   labels = \"/models/road_damage.txt\"");
    println!();
    println!("3. Provide an imagery API key for downloads, either as the");
    println!("   MAPILLARY_API_KEY environment variable or in secrets.toml next to");
    println!("   the config file.");
    println!();
    println!("4. Download and analyze an area:");
    println!("   roadwatch fetch --lat 48.8566 --lon 2.3522 --radius 1.0");
    println!();
    println!("Run 'roadwatch -h' for all commands.");
}

/// Print brief usage reminder for configured users.
pub fn print_configured_help() {
    println!("Usage: roadwatch <COMMAND> [OPTIONS]");
    println!();
    println!("Examples:");
    println!("  roadwatch infer -c 0.74");
    println!("  roadwatch fetch --place \"Montmartre, Paris\" --radius 0.5");
    println!("  roadwatch serve");
    println!();
    println!("Run 'roadwatch -h' for all commands.");
}
