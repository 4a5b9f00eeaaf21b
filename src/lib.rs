pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod locks;
pub mod logger;
pub mod monitor;
pub mod overlay;
pub mod platform;
pub mod sampler;
pub mod schedule;
pub mod schedule_watcher;
pub mod service;
pub mod settings;
pub mod storage;
pub mod zero_mq_service;
