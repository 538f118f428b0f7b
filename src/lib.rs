pub mod config;
pub mod hardware;
pub mod messages;
pub mod runtime;
pub mod swerve;
pub mod telemetry;
