pub mod spin_wait;

pub use spin_wait::SpinWait;
