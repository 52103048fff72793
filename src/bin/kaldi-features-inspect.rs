//! Developer utility that dumps the resolved extraction parameters as JSON.

use std::path::PathBuf;

use kaldi_features::{Extractor, FeatureConfig, FeatureKind, FrameGeometry};
use serde::Serialize;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    if let Err(err) = kaldi_features::logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let mut config = match &options.config {
        Some(path) => FeatureConfig::load(path).map_err(|err| err.to_string())?,
        None => FeatureConfig::default(),
    };
    if let Some(kind) = options.kind {
        config.kind = kind;
    }
    let extractor = Extractor::new(config).map_err(|err| err.to_string())?;
    let inspection = Inspection::from_extractor(&extractor, options.samples);
    let json = serde_json::to_string_pretty(&inspection).map_err(|err| err.to_string())?;
    println!("{json}");
    Ok(())
}

#[derive(Serialize)]
struct Inspection<'a> {
    config: &'a FeatureConfig,
    geometry: &'a FrameGeometry,
    feature_dim: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_samples: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_frames: Option<usize>,
    window: &'a [f32],
    #[serde(skip_serializing_if = "Option::is_none")]
    mel_center_frequencies: Option<&'a [f32]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mel_matrix: Option<Vec<Vec<f32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dct: Option<Vec<Vec<f32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lifter: Option<&'a [f32]>,
}

impl<'a> Inspection<'a> {
    fn from_extractor(extractor: &'a Extractor, num_samples: Option<usize>) -> Self {
        let banks = extractor.mel_banks();
        let cepstral = extractor.cepstral();
        Self {
            config: extractor.config(),
            geometry: extractor.geometry(),
            feature_dim: extractor.feature_dim(),
            num_samples,
            num_frames: num_samples.map(|n| extractor.num_frames(n)),
            window: extractor.window(),
            mel_center_frequencies: banks.map(|b| b.center_frequencies()),
            mel_matrix: banks.map(|b| rows(&b.matrix())),
            dct: cepstral.map(|c| rows(c.dct())),
            lifter: cepstral.map(|c| c.lifter()).filter(|l| !l.is_empty()),
        }
    }
}

fn rows(matrix: &ndarray::Array2<f32>) -> Vec<Vec<f32>> {
    matrix.outer_iter().map(|row| row.to_vec()).collect()
}

#[derive(Debug, Clone)]
struct CliOptions {
    config: Option<PathBuf>,
    kind: Option<FeatureKind>,
    samples: Option<usize>,
}

fn parse_args(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    let mut options = CliOptions {
        config: None,
        kind: None,
        samples: None,
    };
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--config requires a value".to_string())?;
                options.config = Some(PathBuf::from(value));
            }
            "--kind" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--kind requires a value".to_string())?;
                options.kind = Some(parse_kind(value)?);
            }
            "--samples" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--samples requires a value".to_string())?;
                let samples = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --samples value: {value}"))?;
                options.samples = Some(samples);
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(Some(options))
}

fn parse_kind(value: &str) -> Result<FeatureKind, String> {
    match value {
        "fbank" => Ok(FeatureKind::Fbank),
        "mfcc" => Ok(FeatureKind::Mfcc),
        "spectrogram" => Ok(FeatureKind::Spectrogram),
        other => Err(format!("Unknown feature kind: {other}")),
    }
}

fn help_text() -> String {
    [
        "kaldi-features-inspect",
        "",
        "Usage:",
        "  kaldi-features-inspect [--config <path.toml>] [--kind fbank|mfcc|spectrogram] [--samples <n>]",
        "",
        "Prints the window, mel filterbank, DCT and frame geometry the extractor resolves.",
        "With --kind, the preset's stored kind is overridden but other options are kept.",
    ]
    .join("\n")
}
