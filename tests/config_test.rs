use std::io::Write;

use pdf_squeeze::config::job::{JobFile, parse_quality};
use pdf_squeeze::config::load_settings_for_job;
use pdf_squeeze::config::merged::MergedConfig;
use pdf_squeeze::config::preset::Preset;
use pdf_squeeze::config::settings::Settings;

// ============================================================
// 1. Preset table
// ============================================================

#[test]
fn test_preset_table_rows() {
    let id = Preset::Id.config();
    assert_eq!(id.quality, 0.85);
    assert_eq!(id.target_resolution_dpi, 300);
    assert!(!id.aggressive_mode);
    assert_eq!(id.min_image_dpi, 200);

    let receipt = Preset::Receipt.config();
    assert_eq!(receipt.quality, 0.40);
    assert_eq!(receipt.target_resolution_dpi, 120);
    assert!(receipt.aggressive_mode);
    assert_eq!(receipt.min_image_dpi, 72);

    assert!(Preset::Smart.config().adaptive_background);
    assert!(Preset::ALL.iter().all(|p| p.config().use_layer_separation));
}

#[test]
fn test_degradation_converges_to_receipt() {
    for start in Preset::ALL {
        let mut preset = start;
        for _ in 0..Preset::ALL.len() {
            let next = preset.degraded();
            if preset != Preset::Receipt {
                assert!(
                    next.config().quality < preset.config().quality,
                    "{preset} -> {next} should be cheaper"
                );
            }
            preset = next;
        }
        assert_eq!(preset, Preset::Receipt);
        assert_eq!(preset.degraded(), Preset::Receipt);
    }
}

#[test]
fn test_preset_from_str() {
    assert_eq!("document".parse::<Preset>().unwrap(), Preset::Document);
    assert!("fax".parse::<Preset>().is_err());
}

// ============================================================
// 2. Settings
// ============================================================

#[test]
fn test_settings_full_yaml() {
    let yaml = r#"
preset: archive
parallel_workers: 1
assumed_image_dpi: 200
max_input_bytes: 1048576
premium: true
max_retries: 2
processing_timeout_secs: 60
memory:
  backpressure_pause_ms: 10
  relief_timeout_secs: 5
separator:
  blur_sigma: 4.0
"#;
    let settings = Settings::from_yaml(yaml).expect("should parse settings");
    assert_eq!(settings.preset, Preset::Archive);
    assert_eq!(settings.parallel_workers, 1);
    assert_eq!(settings.assumed_image_dpi, 200);
    assert_eq!(settings.max_input_bytes, Some(1_048_576));
    assert!(settings.premium);
    assert_eq!(settings.max_retries, 2);
    assert_eq!(settings.processing_timeout().unwrap().as_secs(), 60);
    assert_eq!(settings.memory.backpressure_pause().as_millis(), 10);
    assert_eq!(settings.memory.relief_timeout().as_secs(), 5);
    assert_eq!(settings.separator.blur_sigma, 4.0);
}

#[test]
fn test_settings_defaults() {
    let settings = Settings::from_yaml("{}").expect("empty mapping is valid");
    assert_eq!(settings.preset, Preset::Smart);
    assert_eq!(settings.max_retries, 3);
    assert_eq!(settings.memory.relief_timeout().as_secs(), 30);
    assert!(settings.max_input_bytes.is_none());
}

#[test]
fn test_settings_unknown_preset_rejected() {
    assert!(Settings::from_yaml("preset: fax\n").is_err());
}

#[test]
fn test_load_settings_for_job_reads_sibling_file() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let mut f = std::fs::File::create(dir.path().join("settings.yaml")).unwrap();
    writeln!(f, "preset: receipt").unwrap();

    let settings = load_settings_for_job(&dir.path().join("jobs.yaml")).unwrap();
    assert_eq!(settings.preset, Preset::Receipt);
}

#[test]
fn test_load_settings_for_job_defaults_without_file() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let settings = load_settings_for_job(&dir.path().join("jobs.yaml")).unwrap();
    assert_eq!(settings.preset, Preset::Smart);
}

// ============================================================
// 3. Job file and merge
// ============================================================

#[test]
fn test_job_file_parse_and_merge() {
    let yaml = r#"
jobs:
  - input: scan.pdf
    output: scan.small.pdf
    preset: document
    quality: 35
    dpi: 100
  - input: photo.jpg
    output: photo.small.jpg
    layer_separation: false
"#;
    let job_file: JobFile = serde_yml::from_str(yaml).expect("should parse jobs");
    assert_eq!(job_file.jobs.len(), 2);

    let settings = Settings::default();
    let first = MergedConfig::new(&settings, &job_file.jobs[0]);
    assert_eq!(first.preset, Preset::Document);
    assert!((first.compression.quality - 0.35).abs() < 1e-6);
    assert_eq!(first.compression.target_resolution_dpi, 100);
    assert!(first.compression.aggressive_mode);

    let second = MergedConfig::new(&settings, &job_file.jobs[1]);
    assert_eq!(second.preset, Preset::Smart);
    assert!(!second.compression.use_layer_separation);
    assert_eq!(second.compression.quality, Preset::Smart.config().quality);
}

#[test]
fn test_job_quality_out_of_range_rejected() {
    let yaml = "jobs:\n  - input: a.pdf\n    output: b.pdf\n    quality: 150\n";
    assert!(serde_yml::from_str::<JobFile>(yaml).is_err());
}

#[test]
fn test_parse_quality_scales() {
    assert_eq!(parse_quality(0.4).unwrap(), 0.4);
    assert_eq!(parse_quality(40.0).unwrap(), 0.4);
    assert!(parse_quality(-1.0).is_err());
    assert!(parse_quality(f32::NAN).is_err());
}
