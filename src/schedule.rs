pub mod scheduler;
pub mod window;

pub use scheduler::AvailabilityWindowScheduler;
pub use window::{evaluate, AvailabilityWindow, WindowState};
