use anyhow::Result;
use deepfake_detector::api::analyze_video;
use getopts::Options;
use std::path::Path;
use std::{env, process};

fn main() -> Result<()> {
    deepfake_detector::init_logging();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optflag("h", "help", "Print this help");
    let matches = opts.parse(&args[1..])?;

    if matches.opt_present("h") || matches.free.is_empty() {
        let brief = format!(
            "Usage: {} VIDEO... (weights from $DEEPFAKE_WEIGHTS, default best_model.safetensors)",
            program
        );
        print!("{}", opts.usage(&brief));
        process::exit(if matches.opt_present("h") { 0 } else { 1 });
    }

    let mut failures = 0;
    for video in &matches.free {
        let response = analyze_video(Path::new(video));
        if !response.is_completed() {
            failures += 1;
        }
        println!("{}", response.to_json());
    }

    if failures > 0 {
        process::exit(2);
    }
    Ok(())
}
