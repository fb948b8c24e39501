// self
use crate::{_prelude::*, obs::PipelineStage};

/// `fut` wrapped in its stage span when tracing is enabled.
#[cfg(feature = "tracing")]
pub(crate) type Instrumented<F> = tracing::instrument::Instrumented<F>;
/// `fut` itself when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub(crate) type Instrumented<F> = F;

/// Runs `fut` inside an `auth_pipeline.stage` span tagged with `stage` and the call-site `label`.
pub(crate) fn in_stage<F>(stage: PipelineStage, label: &'static str, fut: F) -> Instrumented<F>
where
	F: Future,
{
	#[cfg(feature = "tracing")]
	{
		use tracing::Instrument;

		fut.instrument(tracing::info_span!("auth_pipeline.stage", stage = stage.as_str(), label))
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, label);

		fut
	}
}

/// Emits a `debug` event when tracing is enabled.
macro_rules! debug_event {
	($($arg:tt)*) => {
		#[cfg(feature = "tracing")]
		{
			::tracing::debug!($($arg)*);
		}
	};
}
/// Emits a `warn` event when tracing is enabled.
macro_rules! warn_event {
	($($arg:tt)*) => {
		#[cfg(feature = "tracing")]
		{
			::tracing::warn!($($arg)*);
		}
	};
}
pub(crate) use {debug_event, warn_event};
