pub mod config;
pub mod control;
pub mod keyboard;
pub mod messages;
pub mod motor;
pub mod network;
pub mod runtime;
