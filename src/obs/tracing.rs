// self
use crate::{_prelude::*, obs::OpKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// A span builder used by broker operations.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Creates a span tagged with the operation kind, stage, and platform label.
	pub fn new(kind: OpKind, stage: &'static str, platform: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("quota_broker.op", op = kind.as_str(), stage, platform);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage, platform);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
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

/// Emits a `warn` event in the current span (when tracing is enabled).
pub fn warn_event(kind: OpKind, message: impl Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(op = kind.as_str(), "{message}");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, message);
	}
}

/// Emits a `debug` event in the current span (when tracing is enabled).
pub fn debug_event(kind: OpKind, message: impl Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(op = kind.as_str(), "{message}");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, message);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn events_without_subscriber_are_silent() {
		warn_event(OpKind::Track, "usage log append failed");
		debug_event(OpKind::Select, format_args!("sticky hit for {}", "ebay-1"));
	}

	#[tokio::test]
	async fn instrument_passes_output_through() {
		let span = OpSpan::new(OpKind::Aggregate, "instrument_passes_output_through", "etsy");
		let value = span.instrument(async { 7 }).await;

		assert_eq!(value, 7);
	}
}
