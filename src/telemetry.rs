//! Logging and tracing setup for the `rte` binary.
//!
//! The filter comes from `RTE_LOG`, then `RUST_LOG`, defaulting to `warn`.
//! Output is chosen by `OTEL_EXPORTER_OTLP_ENDPOINT`:
//! - unset → compact human-readable lines on stderr
//! - `"stderr"` → JSON events and span closes on stderr
//! - `"http://..."` → OTLP HTTP export of traces and logs (`otel` feature)
//!
//! A `TRACEPARENT` variable (W3C Trace Context), as set by CI runners that
//! trace their jobs, makes every span a child of the remote parent.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const DEFAULT_FILTER: &str = "warn";

/// Dropping this flushes and shuts down any exporters. Hold it in `main()`.
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    trace_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
    #[cfg(feature = "otel")]
    log_provider: Option<opentelemetry_sdk::logs::SdkLoggerProvider>,
}

impl TelemetryGuard {
    const fn local() -> Self {
        Self {
            #[cfg(feature = "otel")]
            trace_provider: None,
            #[cfg(feature = "otel")]
            log_provider: None,
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        {
            if let Some(provider) = self.trace_provider.take()
                && let Err(e) = provider.shutdown()
            {
                eprintln!("otel trace shutdown error: {e}");
            }
            if let Some(provider) = self.log_provider.take()
                && let Err(e) = provider.shutdown()
            {
                eprintln!("otel log shutdown error: {e}");
            }
        }
    }
}

/// The log filter: `RTE_LOG`, else `RUST_LOG`, else `warn`.
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("RTE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
#[must_use]
pub fn init() -> TelemetryGuard {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();

    match endpoint.as_deref() {
        None | Some("") => init_compact(),
        Some("stderr") => init_json(),
        #[cfg(feature = "otel")]
        Some(_) => init_otlp(),
        #[cfg(not(feature = "otel"))]
        Some(_) => {
            eprintln!("warning: OTEL_EXPORTER_OTLP_ENDPOINT set but rte built without 'otel' feature");
            init_compact()
        }
    }
}

fn init_compact() -> TelemetryGuard {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
    TelemetryGuard::local()
}

fn init_json() -> TelemetryGuard {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE),
        )
        .try_init();
    TelemetryGuard::local()
}

/// The SDK reads `OTEL_EXPORTER_OTLP_ENDPOINT` itself and appends
/// `/v1/traces` and `/v1/logs`.
#[cfg(feature = "otel")]
fn init_otlp() -> TelemetryGuard {
    use opentelemetry::trace::TracerProvider as _;

    let span_exporter = match opentelemetry_otlp::SpanExporter::builder().with_http().build() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("warning: failed to init OTLP span exporter: {e}");
            return init_compact();
        }
    };
    let log_exporter = match opentelemetry_otlp::LogExporter::builder().with_http().build() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("warning: failed to init OTLP log exporter: {e}");
            return init_compact();
        }
    };

    let resource = otel_resource();
    let trace_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_resource(resource.clone())
        .build();
    let log_provider = opentelemetry_sdk::logs::SdkLoggerProvider::builder()
        .with_batch_exporter(log_exporter)
        .with_resource(resource)
        .build();

    let tracer = trace_provider.tracer(env!("CARGO_PKG_NAME"));
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(
            &log_provider,
        ))
        .try_init();

    attach_remote_parent();

    TelemetryGuard {
        trace_provider: Some(trace_provider),
        log_provider: Some(log_provider),
    }
}

#[cfg(feature = "otel")]
fn attach_remote_parent() {
    use opentelemetry::propagation::TextMapPropagator as _;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use std::collections::HashMap;

    let Ok(traceparent) = std::env::var("TRACEPARENT") else {
        return;
    };
    let carrier = HashMap::from([("traceparent".to_owned(), traceparent)]);
    let cx = TraceContextPropagator::new().extract(&carrier);
    // Must stay attached for the life of the process.
    std::mem::forget(cx.attach());
}

#[cfg(feature = "otel")]
fn otel_resource() -> opentelemetry_sdk::Resource {
    use opentelemetry::KeyValue;
    opentelemetry_sdk::Resource::builder()
        .with_attribute(KeyValue::new("service.name", "rte"))
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build()
}
