pub mod controller;
pub mod loop_worker;

pub use controller::{replay_watcher, MonitorController};
pub use loop_worker::{poll_loop, run_tick, PollContext, TickReport};
