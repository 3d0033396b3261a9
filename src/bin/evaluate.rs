use anyhow::{Context, Result};
use deepfake_detector::core::training::{self, EvaluationConfig};
use getopts::Options;
use std::path::PathBuf;
use std::{env, process};

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} --data-dir DIR --weights FILE [options]", program);
    print!("{}", opts.usage(&brief));
}

fn main() -> Result<()> {
    deepfake_detector::init_logging();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("c", "config", "Evaluation config file (json5)", "FILE");
    opts.optopt("d", "data-dir", "Dataset root with real/ and fake/", "DIR");
    opts.optopt("m", "weights", "Checkpoint to evaluate", "FILE");
    opts.optopt("", "device", "auto, cpu, cuda[:N] or metal[:N]", "DEVICE");
    opts.optflag("", "json", "Print the report as JSON");
    opts.optflag("h", "help", "Print this help");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{}", e);
            print_usage(&program, &opts);
            process::exit(1);
        }
    };
    if matches.opt_present("h") {
        print_usage(&program, &opts);
        process::exit(0);
    }

    let mut config = match matches.opt_str("c") {
        Some(path) => EvaluationConfig::from_file(&PathBuf::from(&path))
            .with_context(|| format!("failed to load config {}", path))?,
        None => EvaluationConfig::default(),
    };
    if let Some(dir) = matches.opt_str("d") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(path) = matches.opt_str("m") {
        config.checkpoint_path = PathBuf::from(path);
    }
    if let Some(device) = matches.opt_str("device") {
        config.device = device.parse()?;
    }

    let report = training::evaluate(&config).context("evaluation failed")?;
    if matches.opt_present("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}
