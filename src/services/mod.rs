pub mod monitor;
pub mod orchestrator;
pub mod progress;
pub mod recovery;
pub mod scanner;
pub mod upload_worker;
