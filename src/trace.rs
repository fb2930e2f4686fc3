// Trace Sinks
// Capability for surfacing parse and evaluation traces to the embedder

/// Receives human-readable trace lines during parsing and evaluation.
///
/// The core writes only to `verbose`; `info` is reserved for embedders that
/// want to surface their own messages through the same sink.
pub trait TraceWriter {
    fn info(&mut self, message: &str);
    fn verbose(&mut self, message: &str);
}

/// Discards every trace line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTraceWriter;

impl TraceWriter for NoopTraceWriter {
    fn info(&mut self, _message: &str) {}

    fn verbose(&mut self, _message: &str) {}
}

/// Bridges trace lines onto the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTraceWriter;

impl TraceWriter for LogTraceWriter {
    fn info(&mut self, message: &str) {
        log::info!(target: "expressions", "{}", message);
    }

    fn verbose(&mut self, message: &str) {
        log::debug!(target: "expressions", "{}", message);
    }
}
