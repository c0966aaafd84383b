// ─── Market lifecycle engine: scheduler, tasks, outcome math ───
pub mod lock;
pub mod outcome;
pub mod pool;
pub mod scheduler;
pub mod settle;
pub mod settle_uma;
pub mod types;
