// All jobs of one job file, in order.

use tracing::{error, info};

use crate::pipeline::job_runner::{JobConfig, JobFailure, JobResult, JobRunner};

/// Run multiple jobs, collecting results.
/// One job failure does NOT prevent other jobs from running.
pub fn run_all_jobs(runner: &JobRunner, jobs: &[JobConfig]) -> Vec<Result<JobResult, JobFailure>> {
    jobs.iter()
        .map(|job| {
            let result = runner.run_job(job);
            match &result {
                Ok(r) => info!(
                    input = %r.input_path.display(),
                    outcome = r.guarantee.outcome(),
                    attempts = r.attempts,
                    "job done"
                ),
                Err(f) => error!(
                    input = %f.input_path.display(),
                    error = %f.error,
                    action = ?f.action,
                    "job failed"
                ),
            }
            result
        })
        .collect()
}
