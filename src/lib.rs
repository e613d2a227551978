// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! auto-feedback: essay feedback from a local quantized language model
//!
//! Two independent pieces share this crate: a feedback generator that sends an
//! essay to a GGUF model and parses a structured reply, and a scaffolder that
//! writes the starter folder tree for an auto-feedback project.

pub mod config;
pub mod error;
pub mod feedback;
pub mod llm;
pub mod scaffold;

pub use config::AppConfig;
pub use error::{FeedbackError, Result};
pub use feedback::{Feedback, FeedbackAgent};
