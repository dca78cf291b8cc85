#![doc = include_str!("../readme.md")]

pub mod allocator;
pub mod common;
pub mod config;
pub mod data;
pub mod disk_allocator;
pub mod element;
pub mod events;
pub mod host;
pub mod id;
pub mod scheduler;
pub mod simulation;
pub mod stats;
pub mod task;
pub mod vm;
pub mod work;

pub use simulation::CloudSimulation;
