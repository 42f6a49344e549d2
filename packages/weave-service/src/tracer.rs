//! Observability capability boundary. The external trace service is
//! orthogonal to the pipeline; the default implementation does nothing.

pub trait Tracer
where
	Self: Send + Sync,
{
	fn span(&self, name: &str) -> Box<dyn Span>;
}

pub trait Span
where
	Self: Send,
{
	fn set_attribute(&mut self, key: &str, value: String);
	fn add_event(&mut self, message: &str);
	fn record_error(&mut self, error: &dyn std::fmt::Display);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTracer;
impl Tracer for NoopTracer {
	fn span(&self, _name: &str) -> Box<dyn Span> {
		Box::new(NoopSpan)
	}
}

struct NoopSpan;
impl Span for NoopSpan {
	fn set_attribute(&mut self, _key: &str, _value: String) {}

	fn add_event(&mut self, _message: &str) {}

	fn record_error(&mut self, _error: &dyn std::fmt::Display) {}
}
