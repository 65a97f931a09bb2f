// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by token flows and the pipeline.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("esi_broker.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits the upstream `Warning` header of a freshly fetched response.
pub fn record_upstream_warning(url: &Url, warning: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(url = %url, warning, "upstream returned a warning header");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (url, warning);
	}
}

/// Emits a retry decision after a transient failure.
pub fn record_retry(attempt: u32, delay: Duration, error: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			attempt,
			delay_ms = delay.whole_milliseconds() as u64,
			error = %error,
			"retrying after transient failure"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (attempt, delay, error);
	}
}
