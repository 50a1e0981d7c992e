//! 一次性子命令

pub mod config;
