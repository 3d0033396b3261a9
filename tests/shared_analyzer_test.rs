//! 进程级共享分析器：单独的测试进程，保证全局缓存从空开始

use deepfake_detector::api::{analyze_video, shared_analyzer, AnalysisResponse};
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 6;

#[test]
fn test_concurrent_first_use_shares_one_analyzer() {
    std::env::set_var("DEEPFAKE_WEIGHTS", "/nonexistent/best_model.safetensors");
    std::env::set_var("DEEPFAKE_DEVICE", "cpu");

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let response = analyze_video(Path::new("/nonexistent/clip.mp4"));
                let analyzer = shared_analyzer().unwrap() as *const _ as usize;
                (response, analyzer)
            })
        })
        .collect();

    let results: Vec<(AnalysisResponse, usize)> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    for (response, _) in &results {
        match response {
            AnalysisResponse::Failed { error } => assert!(error.contains("Could not open video file")),
            other => panic!("expected failure, got {:?}", other),
        }
    }
    let first = results[0].1;
    assert!(results.iter().all(|(_, ptr)| *ptr == first));

    let analyzer = shared_analyzer().unwrap();
    assert_eq!(analyzer as *const _ as usize, first);
    assert!(!analyzer.weights_loaded());
}
