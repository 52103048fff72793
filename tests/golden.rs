//! Parity against double-precision Kaldi features.
//!
//! `tests/data/kaldi_reference.json` holds a fixed 1700-sample waveform and the
//! expected fbank, MFCC and snipped-edge fbank matrices. Set
//! `KALDI_FEATURES_GOLDEN_PATH` to check another file in the same layout, e.g.
//! one exported from a reference toolkit.

use std::path::PathBuf;

use kaldi_features::{Extractor, FeatureConfig};
use serde::Deserialize;

const MAX_DIFF: f32 = 1e-4;

#[derive(Deserialize)]
struct Golden {
    sampling_rate: u32,
    waveform: Vec<f32>,
    cases: Vec<GoldenCase>,
}

#[derive(Deserialize)]
struct GoldenCase {
    name: String,
    #[serde(default)]
    config: FeatureConfig,
    features: Vec<Vec<f32>>,
}

fn golden_path() -> PathBuf {
    match std::env::var("KALDI_FEATURES_GOLDEN_PATH") {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/kaldi_reference.json"),
    }
}

fn load_golden() -> Golden {
    let payload = std::fs::read_to_string(golden_path()).expect("read golden json");
    serde_json::from_str(&payload).expect("parse golden json")
}

#[test]
fn golden_features_match_reference() {
    let golden = load_golden();
    assert!(!golden.cases.is_empty());
    for case in golden.cases {
        let config = case.config.with_sampling_rate(golden.sampling_rate);
        let extractor = Extractor::new(config).expect("golden extractor");
        let features = extractor
            .extract(&golden.waveform, golden.sampling_rate)
            .expect("golden features");
        assert_eq!(features.nrows(), case.features.len(), "{}: frame count", case.name);
        assert!(!case.features.is_empty(), "{}: empty reference", case.name);

        let mut max_diff = 0.0_f32;
        for (row, golden_row) in features.outer_iter().zip(case.features.iter()) {
            assert_eq!(row.len(), golden_row.len(), "{}: feature dim", case.name);
            for (&a, &b) in row.iter().zip(golden_row.iter()) {
                max_diff = max_diff.max((a - b).abs());
            }
        }
        assert!(
            max_diff <= MAX_DIFF,
            "{}: max diff {max_diff} exceeds {MAX_DIFF}",
            case.name
        );
    }
}

#[test]
fn bundled_reference_covers_both_edge_policies() {
    let golden = load_golden();
    if std::env::var_os("KALDI_FEATURES_GOLDEN_PATH").is_some() {
        return;
    }
    let shapes: Vec<(String, usize, usize)> = golden
        .cases
        .iter()
        .map(|case| (case.name.clone(), case.features.len(), case.features[0].len()))
        .collect();
    assert_eq!(golden.waveform.len(), 1_700);
    assert_eq!(
        shapes,
        vec![
            ("fbank".to_string(), 11, 80),
            ("mfcc".to_string(), 11, 13),
            ("fbank_snip_edges".to_string(), 9, 80),
        ]
    );
}
