use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pdf_squeeze::config::job::JobFile;
use pdf_squeeze::config::merged::MergedConfig;
use pdf_squeeze::config::{self};
use pdf_squeeze::pipeline::job_runner::{JobConfig, JobRunner};
use pdf_squeeze::pipeline::orchestrator::run_all_jobs;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: pdf_squeeze [--analyze] <jobs.yaml>...");
        eprintln!("  Compress scanned PDFs and images according to job specifications.");
        eprintln!("  --analyze  print page count, size category and time estimate only");
        return if args.is_empty() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        };
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        eprintln!("pdf_squeeze {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let analyze_only = args.iter().any(|a| a == "--analyze");
    let mut has_error = false;

    for job_file_arg in args.iter().filter(|a| !a.starts_with("--")) {
        let job_file_path = Path::new(job_file_arg);

        // Load settings from the same directory as the job file.
        let settings = match config::load_settings_for_job(job_file_path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("ERROR: Failed to load settings for {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        let yaml_content = match std::fs::read_to_string(job_file_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("ERROR: Failed to read job file {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        let job_file: JobFile = match serde_yml::from_str(&yaml_content) {
            Ok(jf) => jf,
            Err(e) => {
                eprintln!("ERROR: Failed to parse job file {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        // Relative job paths are resolved against the job file's directory.
        let job_dir = job_file_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let job_configs: Vec<JobConfig> = job_file
            .jobs
            .iter()
            .map(|job| {
                let merged = MergedConfig::new(&settings, job);
                JobConfig {
                    input_path: resolve_path(&job_dir, &job.input),
                    output_path: resolve_path(&job_dir, &job.output),
                    preset: merged.preset,
                    compression: merged.compression,
                }
            })
            .collect();

        let runner = JobRunner::new(settings);

        if analyze_only {
            for job in &job_configs {
                match runner.analyze(&job.input_path) {
                    Ok(analysis) => {
                        eprintln!(
                            "OK: {} ({} pages, {:?})",
                            job.input_path.display(),
                            analysis.page_count,
                            analysis.size_category
                        );
                        print_json(&serde_json::json!({
                            "input": job.input_path,
                            "analysis": analysis,
                        }));
                    }
                    Err(e) => {
                        eprintln!("ERROR: {}: {e}", job.input_path.display());
                        has_error = true;
                    }
                }
            }
            continue;
        }

        for result in run_all_jobs(&runner, &job_configs) {
            match result {
                Ok(job_result) => {
                    eprintln!(
                        "OK: {} -> {} ({} pages, {})",
                        job_result.input_path.display(),
                        job_result.output_path.display(),
                        job_result.pages_processed,
                        job_result.guarantee.outcome()
                    );
                    print_json(&job_result);
                }
                Err(failure) => {
                    eprintln!(
                        "ERROR: {} -> {}: {}",
                        failure.input_path.display(),
                        failure.output_path.display(),
                        failure.error
                    );
                    print_json(&serde_json::json!({
                        "input_path": failure.input_path,
                        "output_path": failure.output_path,
                        "error": failure.error.to_string(),
                        "recovery": failure.action,
                        "attempts": failure.attempts,
                    }));
                    has_error = true;
                }
            }
        }
    }

    if has_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => eprintln!("ERROR: Failed to serialize report: {e}"),
    }
}

/// Resolve a potentially relative path against a base directory.
/// If the path is already absolute, return it as-is.
fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}
