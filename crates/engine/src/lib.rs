pub mod balance;
pub mod periods;
pub mod points;
pub mod scanner;
pub mod scheduler;
pub mod units;

pub use balance::{BalanceUpdate, BalanceUpdater};
pub use points::{CalcOutcome, PointsCalculator};
pub use scanner::{scan_window, ChainScanner};
pub use scheduler::PointsScheduler;
