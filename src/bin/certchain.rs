#![forbid(unsafe_code)]
//! Command-line access to the certificate ledger

use certchain::certificate::IssueRequest;
use certchain::config::load_config_from;
use certchain::service::Service;
use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issues a certificate and records it on the chain
    Issue {
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        course: String,
        #[arg(long)]
        issuer: String,
        /// Date of issue (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        #[arg(long)]
        grade: Option<String>,
    },
    /// Looks up a certificate by id
    Verify { id: String },
    /// Lists every block on the chain
    Chain,
    /// Checks chain integrity
    Validate,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    certchain::init_tracing();
    let cli = Cli::parse();

    let config = load_config_from(&cli.config)?;
    let service = Service::open(&config)?;

    match cli.command {
        Commands::Issue {
            recipient,
            course,
            issuer,
            date,
            grade,
        } => {
            let issued = service.issue(IssueRequest {
                recipient: Some(recipient),
                course: Some(course),
                grade,
                issuer: Some(issuer),
                date_issued: Some(date),
            })?;

            println!("{}", "✅ Certificate issued".bright_green().bold());
            println!("   Certificate ID: {}", issued.certificate.id.bright_white());
            println!("   Block index:    {}", issued.block.index);
            println!("   Block hash:     {}", issued.block.hash.bright_cyan());
        }
        Commands::Verify { id } => {
            let verification = service.verify(&id);
            match (&verification.certificate, &verification.block) {
                (Some(cert), Some(block)) if verification.found => {
                    println!("{}", "✅ Certificate found".bright_green().bold());
                    println!("   Recipient:   {}", cert.recipient);
                    println!("   Course:      {}", cert.course);
                    println!("   Issuer:      {}", cert.issuer);
                    println!("   Date Issued: {}", cert.date_issued);
                    println!("   Block:       #{} {}", block.index, block.hash.bright_cyan());
                }
                _ => println!("{}", "❌ Certificate not found on the chain.".red()),
            }
            print_validity(verification.chain_valid);
        }
        Commands::Chain => {
            let (chain, valid) = service.chain_report();

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    Cell::new("Index").add_attribute(Attribute::Bold),
                    Cell::new("Timestamp").add_attribute(Attribute::Bold),
                    Cell::new("Payload").add_attribute(Attribute::Bold),
                    Cell::new("Nonce").add_attribute(Attribute::Bold),
                    Cell::new("Hash").add_attribute(Attribute::Bold),
                ]);

            for block in &chain {
                table.add_row(vec![
                    Cell::new(block.index),
                    Cell::new(&block.timestamp),
                    Cell::new(block.data.to_string()),
                    Cell::new(block.nonce),
                    Cell::new(&block.hash),
                ]);
            }

            println!("{table}");
            print_validity(valid);
        }
        Commands::Validate => {
            let valid = service.chain_valid();
            print_validity(valid);
            if !valid {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn print_validity(valid: bool) {
    if valid {
        println!("{}", "🔗 Chain valid".green());
    } else {
        println!("{}", "⚠️  Chain INVALID: tampering detected".red().bold());
    }
}
