use anyhow::{Context, Result};
use deepfake_detector::core::model::PretrainedSource;
use deepfake_detector::core::training::{self, TrainingConfig};
use getopts::Options;
use log::error;
use std::path::PathBuf;
use std::{env, process};

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} [--config FILE] [options]", program);
    print!("{}", opts.usage(&brief));
}

fn parse_num<T: std::str::FromStr>(value: Option<String>, name: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|v| v.parse::<T>().with_context(|| format!("invalid --{}: {}", name, v)))
        .transpose()
}

fn build_config() -> Result<TrainingConfig> {
    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("c", "config", "Training config file (json5)", "FILE");
    opts.optopt("d", "data-dir", "Dataset root with real/ and fake/", "DIR");
    opts.optopt("e", "epochs", "Number of epochs", "N");
    opts.optopt("b", "batch-size", "Videos per batch", "N");
    opts.optopt("", "lr", "Learning rate", "LR");
    opts.optopt("", "seq-len", "Frames per video", "N");
    opts.optopt("w", "workers", "Loader threads", "N");
    opts.optopt("o", "output", "Checkpoint path", "FILE");
    opts.optopt("", "device", "auto, cpu, cuda[:N] or metal[:N]", "DEVICE");
    opts.optopt("", "pretrained", "ImageNet backbone weights (safetensors)", "FILE");
    opts.optflag("", "download-pretrained", "Download ImageNet backbone weights");
    opts.optflag("", "no-augment", "Disable flip and color jitter");
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
        Some(path) => TrainingConfig::from_file(&PathBuf::from(&path))
            .with_context(|| format!("failed to load config {}", path))?,
        None => TrainingConfig::default(),
    };

    if let Some(dir) = matches.opt_str("d") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(n) = parse_num(matches.opt_str("e"), "epochs")? {
        config.num_epochs = n;
    }
    if let Some(n) = parse_num(matches.opt_str("b"), "batch-size")? {
        config.batch_size = n;
    }
    if let Some(lr) = parse_num(matches.opt_str("lr"), "lr")? {
        config.learning_rate = lr;
    }
    if let Some(n) = parse_num(matches.opt_str("seq-len"), "seq-len")? {
        config.seq_len = n;
    }
    if let Some(n) = parse_num(matches.opt_str("w"), "workers")? {
        config.num_workers = n;
    }
    if let Some(path) = matches.opt_str("o") {
        config.checkpoint_path = PathBuf::from(path);
    }
    if let Some(device) = matches.opt_str("device") {
        config.device = device.parse()?;
    }
    if let Some(path) = matches.opt_str("pretrained") {
        config.pretrained = PretrainedSource::Path(PathBuf::from(path));
    } else if matches.opt_present("download-pretrained") {
        config.pretrained = PretrainedSource::default_url();
    }
    if matches.opt_present("no-augment") {
        config.augment = false;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    deepfake_detector::init_logging();

    let config = build_config()?;
    let report = match training::train(config) {
        Ok(r) => r,
        Err(e) => {
            error!("❌ Training failed: {}", e);
            process::exit(1);
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
