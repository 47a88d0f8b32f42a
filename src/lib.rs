//! # model-serving: latest-run image classification over HTTP
//!
//! Loads the model of the most recently started run of a tracked experiment
//! and serves it behind a single `POST /predict` endpoint.
//!
//! ## Flow
//!
//! - **Startup (once)**: attach to the experiment by name, pick the newest run,
//!   download its model artifact, build a [`model::Classifier`]. No runs means
//!   no server.
//! - **Per request**: multipart `file` → grayscale 28×28 tensor in `[0, 1]` →
//!   scores → argmax → metric logged against the resolved run → JSON reply.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use model_serving::model::ModelResolver;
//! use model_serving::server::{router, serve, ServingContext};
//! use model_serving::tracking::HttpTracking;
//!
//! # async fn run() -> model_serving::Result<()> {
//! let tracking = HttpTracking::new("http://localhost:5000");
//! let resolved = ModelResolver::new("Fashion MNIST Classification")
//!     .resolve(&tracking)
//!     .await?;
//!
//! let context = Arc::new(ServingContext::new(tracking, resolved));
//! serve("0.0.0.0:5001".parse().unwrap(), router(context, 10 << 20)).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod classify;
pub mod config;
pub mod error;
pub mod model;
pub mod preprocess;
pub mod server;
pub mod telemetry;
pub mod tracking;

pub use error::{Error, Result};
