//! Per-record instrumentation applied on the outbound path.

use crate::model::{DIAGNOSTIC_ID_PROPERTY, EventRecord};
use serde_json::Value;
use uuid::Uuid;

/// Receives every outgoing record before it is handed to the transport.
pub trait TracingHook: Send + Sync {
    fn trace_record(&self, record: &mut EventRecord);
}

/// Stamps a W3C `traceparent` into the `Diagnostic-Id` application property.
///
/// Records that already carry a diagnostic id keep it, so a record resent after
/// a failed attempt reports the same trace. The span id follows the current
/// `tracing` span when one is entered.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticIdHook;

impl DiagnosticIdHook {
    fn traceparent() -> String {
        let trace_id = Uuid::new_v4().simple().to_string();
        let span_id = tracing::Span::current()
            .id()
            .map(|id| format!("{:016x}", id.into_u64()))
            .unwrap_or_else(|| trace_id[..16].to_string());
        format!("00-{trace_id}-{span_id}-01")
    }
}

impl TracingHook for DiagnosticIdHook {
    fn trace_record(&self, record: &mut EventRecord) {
        if record.properties().contains_key(DIAGNOSTIC_ID_PROPERTY) {
            return;
        }
        let traceparent = Self::traceparent();
        tracing::trace!(diagnostic_id = %traceparent, "tracing outgoing event");
        record
            .properties_mut()
            .insert(DIAGNOSTIC_ID_PROPERTY.to_string(), Value::String(traceparent));
    }
}
