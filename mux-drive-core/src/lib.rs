#![doc = "mux-drive-core: pipeline logic for mux-drive."]

//! This crate holds everything the merge pipeline does: streaming downloads, audio combination,
//! stream-copy multiplexing and the driver that runs them in order and cleans up afterwards.
//! Cloud-provider specific upload code lives in the CLI crate behind the
//! [`contract::Uploader`] trait.
//!
//! # Usage
//! Build a [`pipeline::PipelineConfig`], pick implementations for the [`contract`] traits and
//! call [`pipeline::run_pipeline`].

pub mod audio;
pub mod codec;
pub mod combine;
pub mod contract;
pub mod download;
pub mod error;
pub mod fs;
pub mod mux;
pub mod pipeline;
