pub mod agent;
pub mod thread;
