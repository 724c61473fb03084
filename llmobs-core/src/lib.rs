pub mod attributes;
pub mod config;
pub mod error;
pub mod instrumentation;
pub mod model;
pub mod provider;
pub mod telemetry;
pub mod token_count;
pub mod tracer;
pub mod wrapper;
#[cfg(test)]
pub mod test_util;

pub use instrumentation::LlmInstrumentation;
pub use wrapper::InstrumentedProvider;
