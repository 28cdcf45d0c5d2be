pub mod liveness;
pub mod orchestrator;
pub mod retry;
pub mod transport;
