// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! auto-feedback Scaffold Utility
//!
//! Creates the auto-feedback project folder tree in one shot.

use clap::Parser;
use std::path::PathBuf;

use auto_feedback::scaffold::ProjectManifest;

#[derive(Parser, Debug)]
#[command(name = "auto-feedback-scaffold")]
#[command(version)]
#[command(about = "Create the auto-feedback project folder tree")]
struct Args {
    /// Directory to create
    #[arg(short, long, default_value = "./auto_feedback_agent")]
    root: PathBuf,

    /// List the paths without writing them
    #[arg(long)]
    list: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_target(false)
        .init();

    let manifest = ProjectManifest::auto_feedback_agent();

    if args.list {
        manifest.validate()?;
        println!("Project layout ({} entries):", manifest.plan(&args.root).len());
        println!("{:-<60}", "");
        for path in manifest.plan(&args.root) {
            println!("  {}", path.display());
        }
        return Ok(());
    }

    let report = manifest.scaffold(&args.root)?;
    println!(
        "Created {} directories and {} files under {}",
        report.directories,
        report.files_written,
        report.root.display()
    );
    if report.files_overwritten > 0 {
        println!("Note: {} existing file(s) were overwritten.", report.files_overwritten);
    }

    Ok(())
}
