// Background Jobs Service
//
// Scheduled jobs that watch CRM records and publish workflow trigger events.
// Jobs are scheduled using tokio-cron-scheduler and run automatically at specified intervals.

pub mod due_dates;
pub mod scheduler;

pub use scheduler::{JobConfig, JobScheduler};
