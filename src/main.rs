// Egyptian national ID extraction from the command line

use chrono::Local;
use clap::Parser;
use log::error;
use nid_extract::{
    models::{ExtractionResult, FieldKind},
    validation::NationalIdDecoder,
    IdCardError, IdCardProcessor, ModelSet, PipelineConfig, SharedModels,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "nid-extract", about = "Extract names and national ID data from an ID card photo")]
struct Args {
    /// Photo of the card front
    image: PathBuf,

    /// JSON pipeline configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the result as JSON instead of a report
    #[arg(long)]
    json: bool,

    /// Abort the request after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn run(args: &Args) -> Result<ExtractionResult, IdCardError> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if args.timeout_ms.is_some() {
        config.timeout_ms = args.timeout_ms;
    }

    let model_config = config.clone();
    let models = Arc::new(SharedModels::lazy(move || ModelSet::tesseract(&model_config)));
    let processor = IdCardProcessor::new(models, config)?;
    processor.detect_and_process_id_card(&args.image)
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn print_detailed_report(result: &ExtractionResult) {
    println!("\n===============================================");
    println!("        NATIONAL ID EXTRACTION REPORT");
    println!("===============================================\n");

    println!("CARD HOLDER:");
    println!("  First Name: {}", or_dash(result.first_name.as_deref()));
    println!("  Second Name: {}", or_dash(result.second_name.as_deref()));
    println!("  Full Name: {}", or_dash(result.full_name.as_deref()));
    println!("  Address: {}", or_dash(result.address.as_deref()));
    println!("  Serial: {}", or_dash(result.serial.as_deref()));

    println!("\nNATIONAL ID:");
    println!("  Number: {}", or_dash(result.national_id.as_deref()));
    match result.birth_date {
        Some(date) => println!("  Date of Birth: {}", date.format("%Y-%m-%d")),
        None => println!("  Date of Birth: -"),
    }
    if let Some(id) = &result.national_id {
        if let Ok(identity) = NationalIdDecoder::decode(id) {
            println!("  Age: {}", identity.age_on(Local::now().date_naive()));
        }
    }
    match result.governorate {
        Some(g) => println!("  Governorate: {} ({})", g, g.arabic_name()),
        None => println!("  Governorate: -"),
    }
    match result.gender {
        Some(gender) => println!("  Gender: {}", gender),
        None => println!("  Gender: -"),
    }
    if let Some(e) = &result.id_error {
        println!("  Problem: {}", e);
    }

    println!("\nFIELDS:");
    for kind in FieldKind::ALL {
        let status = match result.field(kind) {
            Some(text) if !text.is_empty() => format!("{:.2}", text.confidence),
            _ if kind == FieldKind::Photo && result.portrait.is_some() => "found".to_string(),
            _ => "MISSING".to_string(),
        };
        println!("  {}: {}", kind.label(), status);
    }
    println!("\nCard confidence: {:.2}", result.card_confidence);
    println!(
        "Extraction result: {}",
        if result.is_complete() { "COMPLETE" } else { "PARTIAL" }
    );
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(result) => {
            if args.json {
                match serde_json::to_string_pretty(&result) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        error!("Failed to serialize result: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                print_detailed_report(&result);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error processing {:?}: {}", args.image, err);
            ExitCode::FAILURE
        }
    }
}
