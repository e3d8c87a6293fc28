// Schedule manager: one recurring job per cron subscription

pub mod expression;
pub mod manager;

pub use expression::CronTrigger;
pub use manager::ScheduleManager;
