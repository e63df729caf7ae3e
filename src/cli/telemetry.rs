//! Log and trace plumbing.
//!
//! Logging goes to the console through `tracing-subscriber`. Span export is
//! opt-in: when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans leave the process
//! over OTLP/gRPC with the service identity attached as resource attributes.

use anyhow::{Context, Result, anyhow};
use base64::{Engine, engine::general_purpose::STANDARD};
use once_cell::sync::OnceCell;
use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::{SpanExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    propagation::TraceContextPropagator,
    runtime,
    trace::{Tracer, TracerProvider as SdkTracerProvider},
};
use std::{env::var, time::Duration};
use tonic::{
    metadata::{Ascii, Binary, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};
use ulid::Ulid;

// Held so the batch exporter can be flushed on exit.
static PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Split `OTEL_EXPORTER_OTLP_HEADERS` (`k=v,k2=v2`) into pairs, dropping
/// entries without a `=`.
fn split_header_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Turn header pairs into gRPC metadata. Keys ending in `-bin` carry
/// base64-encoded bytes per the gRPC metadata convention; everything else is
/// plain ASCII.
fn grpc_metadata(pairs: &[(String, String)]) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::new();
    for (key, value) in pairs {
        let key = key.to_ascii_lowercase();
        if key.ends_with("-bin") {
            let bytes = STANDARD
                .decode(value.as_bytes())
                .map_err(|err| anyhow!("failed to base64-decode value for key {key}: {err}"))?;
            let key = MetadataKey::<Binary>::from_bytes(key.as_bytes())
                .map_err(|err| anyhow!("invalid binary metadata key {key}: {err}"))?;
            metadata.insert_bin(key, MetadataValue::from_bytes(&bytes));
        } else {
            let parsed: MetadataValue<Ascii> = value
                .parse()
                .map_err(|err| anyhow!("invalid metadata value for key {key}: {err}"))?;
            let key = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
                .map_err(|err| anyhow!("invalid metadata key {key}: {err}"))?;
            metadata.insert(key, parsed);
        }
    }
    Ok(metadata)
}

/// Collector endpoints without a scheme default to https, matching what a
/// bare `host:4317` almost always means outside localhost.
fn with_scheme(endpoint: String) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint;
    }
    format!("https://{}", endpoint.trim_end_matches('/'))
}

/// Host to pin TLS against, present only for https endpoints.
fn tls_host(endpoint: &str) -> Option<&str> {
    let rest = endpoint.strip_prefix("https://")?;
    let host_port = rest.split('/').next()?;
    host_port.split(':').next()
}

fn build_exporter(endpoint: &str) -> Result<SpanExporter> {
    let mut builder = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(3));

    if let Some(host) = tls_host(endpoint) {
        builder = builder.with_tls_config(
            ClientTlsConfig::new()
                .domain_name(host.to_string())
                .with_native_roots(),
        );
    }

    if let Ok(raw) = var("OTEL_EXPORTER_OTLP_HEADERS") {
        let pairs = split_header_pairs(&raw);
        if !pairs.is_empty() {
            builder = builder.with_metadata(grpc_metadata(&pairs)?);
        }
    }

    builder.build().context("failed to build span exporter")
}

fn install_tracer() -> Result<Tracer> {
    // OTLP/gRPC only. Other configured protocols are noted and ignored.
    if let Ok(protocol) = var("OTEL_EXPORTER_OTLP_PROTOCOL") {
        if protocol != "grpc" {
            debug!("OTEL_EXPORTER_OTLP_PROTOCOL='{protocol}' ignored: only 'grpc' is supported");
        }
    }

    let endpoint = with_scheme(
        var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string()),
    );
    let exporter = build_exporter(&endpoint)?;

    let instance_id = var("OTEL_SERVICE_INSTANCE_ID").unwrap_or_else(|_| Ulid::new().to_string());
    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![
            KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("service.instance.id", instance_id),
        ]))
        .build();

    let _ = PROVIDER.set(provider.clone());
    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TraceContextPropagator::new());

    Ok(provider.tracer(env!("CARGO_PKG_NAME")))
}

/// Install the global subscriber: pretty stderr logging, filtered by the
/// verbosity flag (overridable through `RUST_LOG`), plus an OTLP span layer
/// when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
///
/// # Errors
///
/// Returns an error when the exporter cannot be built or a subscriber is
/// already installed.
pub fn init(verbosity: Option<Level>) -> Result<()> {
    let level = verbosity.unwrap_or(Level::ERROR);

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?)
        .add_directive("opentelemetry_sdk=warn".parse()?);

    let log_layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty();

    let registry = Registry::default().with(filter).with(log_layer);
    if var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let span_layer = tracing_opentelemetry::layer().with_tracer(install_tracer()?);
        tracing::subscriber::set_global_default(registry.with(span_layer))?;
    } else {
        tracing::subscriber::set_global_default(registry)?;
    }

    Ok(())
}

/// Flush and drop the span exporter. Safe to call when tracing was never
/// enabled.
pub fn shutdown() {
    if let Some(provider) = PROVIDER.get() {
        debug!("flushing span exporter");
        let _ = provider.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_pairs_split_and_trim() {
        let pairs = split_header_pairs("a=1, b = two ,c=3");
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two".to_string()),
                ("c".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn header_pairs_drop_entries_without_separator() {
        let pairs = split_header_pairs("valid=yes,broken,also=fine");
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|(key, _)| key != "broken"));
    }

    #[test]
    fn header_pairs_keep_equals_in_value() {
        // Only the first `=` separates key from value.
        let pairs = split_header_pairs("authorization=Basic dXNlcjpwYXNz=");
        assert_eq!(pairs[0].1, "Basic dXNlcjpwYXNz=");
    }

    #[test]
    fn empty_header_env_yields_no_pairs() {
        assert!(split_header_pairs("").is_empty());
    }

    #[test]
    fn metadata_accepts_ascii_keys() -> Result<()> {
        let pairs = vec![
            ("authorization".to_string(), "Bearer abc".to_string()),
            ("x-tenant".to_string(), "tessera".to_string()),
        ];
        let metadata = grpc_metadata(&pairs)?;
        assert_eq!(metadata.len(), 2);
        Ok(())
    }

    #[test]
    fn metadata_decodes_bin_keys() -> Result<()> {
        let encoded = STANDARD.encode(b"raw bytes");
        let pairs = vec![("trace-state-bin".to_string(), encoded)];
        let metadata = grpc_metadata(&pairs)?;
        assert_eq!(metadata.len(), 1);
        Ok(())
    }

    #[test]
    fn metadata_rejects_bad_base64_for_bin_keys() {
        let pairs = vec![("broken-bin".to_string(), "!!not-base64!!".to_string())];
        let result = grpc_metadata(&pairs);
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(err.to_string().contains("base64"));
        }
    }

    #[test]
    fn metadata_handles_mixed_key_kinds() -> Result<()> {
        let pairs = vec![
            ("plain".to_string(), "value".to_string()),
            ("blob-bin".to_string(), STANDARD.encode(b"x")),
        ];
        assert_eq!(grpc_metadata(&pairs)?.len(), 2);
        Ok(())
    }

    #[test]
    fn scheme_is_preserved_when_present() {
        assert_eq!(
            with_scheme("http://localhost:4317".to_string()),
            "http://localhost:4317"
        );
        assert_eq!(
            with_scheme("https://otel.example.com:4317/v1".to_string()),
            "https://otel.example.com:4317/v1"
        );
    }

    #[test]
    fn bare_endpoints_default_to_https() {
        assert_eq!(
            with_scheme("otel.example.com:4317".to_string()),
            "https://otel.example.com:4317"
        );
        assert_eq!(
            with_scheme("otel.example.com:4317/".to_string()),
            "https://otel.example.com:4317"
        );
    }

    #[test]
    fn tls_host_only_for_https() {
        assert_eq!(tls_host("https://otel.example.com:4317"), Some("otel.example.com"));
        assert_eq!(tls_host("https://otel.example.com/v1/traces"), Some("otel.example.com"));
        assert_eq!(tls_host("http://localhost:4317"), None);
    }

    #[test]
    fn shutdown_without_provider_is_a_noop() {
        shutdown();
    }
}
