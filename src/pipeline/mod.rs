//! Stage hosting framework for the forwarding pipeline.
//!
//! The [`Pipeline`] owns the broadcast side of every lifecycle signal:
//! shutdown, configuration replacement and diagnostic snapshot requests.
//! A stage registers itself once and receives a [`StageContext`], the
//! bundle of receivers it multiplexes over in its own event loop. There is
//! no global state; everything a stage needs is injected at registration.

mod pipeline;
mod snapshot;

pub use pipeline::*;
pub use snapshot::*;

#[cfg(test)]
mod pipeline_test;
