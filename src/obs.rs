//! Optional observability helpers for pipeline stages.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `auth_pipeline.stage` with the `stage` and
//!   `label` (call site) fields, plus a handful of `debug`/`warn` events.
//! - Enable `metrics` to increment the `auth_pipeline_stage_total` counter for every
//!   attempt/success/retry/failure/cancellation, labeled by `stage` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;

pub(crate) use self::tracing::{debug_event, in_stage, warn_event};

// self
use crate::_prelude::*;

/// Pipeline stages observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStage {
	/// Credential resolution and request signing.
	Sign,
	/// Credential refresh through a strategy.
	Refresh,
	/// Transport execution and response classification.
	Send,
}
impl PipelineStage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			PipelineStage::Sign => "sign",
			PipelineStage::Refresh => "refresh",
			PipelineStage::Send => "send",
		}
	}
}
impl Display for PipelineStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageOutcome {
	/// Entry to a stage.
	Attempt,
	/// Successful completion.
	Success,
	/// Authentication failure that triggers the single retry.
	Retry,
	/// Failure propagated back to the caller.
	Failure,
	/// The caller cancelled the request.
	Cancelled,
}
impl StageOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageOutcome::Attempt => "attempt",
			StageOutcome::Success => "success",
			StageOutcome::Retry => "retry",
			StageOutcome::Failure => "failure",
			StageOutcome::Cancelled => "cancelled",
		}
	}
}
impl Display for StageOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
