pub mod config;
pub mod deployment;
pub mod driver;
pub mod events;
pub mod registry;
pub mod repository;
pub mod rpc;
pub mod scanner;
