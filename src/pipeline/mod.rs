pub mod cancel;
pub mod job_runner;
pub mod orchestrator;
pub mod page_processor;
pub mod scheduler;
pub mod strategy;
