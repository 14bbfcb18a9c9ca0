//! Shared utilities for audiosub integration tests.
//!
//! `TestHarness` runs a full `TranscriptionService` around the stub engine
//! inside a temporary work directory.

#![allow(dead_code)]

pub mod harness;

pub use harness::{silent_wav, TestHarness};
