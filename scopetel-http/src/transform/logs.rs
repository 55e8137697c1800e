use crate::transform::common::{as_opt_unix_nano, KeyValue, Resource, Scope, Value};
use scopetel::logs::LogData;
use serde::Serialize;
use std::time::SystemTime;

/// Attribute carrying the unrendered message template of a record.
const TEMPLATE_ATTRIBUTE: &str = "message.template";

/// Body of a `POST /v1/logs` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LogsData {
    resource_logs: Vec<ResourceLogs>,
}

impl From<Vec<LogData>> for LogsData {
    fn from(sdk_logs: Vec<LogData>) -> Self {
        let mut resource_logs: Vec<(scopetel::Resource, ResourceLogs)> = Vec::new();
        for sdk_log in sdk_logs {
            let index = match resource_logs
                .iter()
                .position(|(resource, _)| *resource == *sdk_log.resource)
            {
                Some(index) => index,
                None => {
                    resource_logs.push((
                        sdk_log.resource.as_ref().clone(),
                        ResourceLogs {
                            resource: sdk_log.resource.as_ref().into(),
                            scope_logs: Vec::with_capacity(1),
                        },
                    ));
                    resource_logs.len() - 1
                }
            };
            let rl = &mut resource_logs[index].1;

            let scope = Scope::from(&sdk_log.instrumentation_scope);
            match rl.scope_logs.iter_mut().find(|sl| sl.scope == scope) {
                Some(sl) => sl.log_records.push(sdk_log.into()),
                None => rl.scope_logs.push(ScopeLogs {
                    scope,
                    log_records: vec![sdk_log.into()],
                }),
            }
        }

        LogsData {
            resource_logs: resource_logs.into_iter().map(|(_, rl)| rl).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceLogs {
    resource: Resource,
    scope_logs: Vec<ScopeLogs>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScopeLogs {
    scope: Scope,
    log_records: Vec<LogRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogRecord {
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "as_opt_unix_nano"
    )]
    time_unix_nano: Option<SystemTime>,
    severity_number: u8,
    severity_text: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Value>,
    attributes: Vec<KeyValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    span_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    flags: Option<u8>,
}

impl From<LogData> for LogRecord {
    fn from(value: LogData) -> Self {
        let record = value.record;
        let mut attributes: Vec<KeyValue> = record.fields.into_iter().map(Into::into).collect();
        attributes.push(KeyValue::string(TEMPLATE_ATTRIBUTE, record.template));
        LogRecord {
            time_unix_nano: record.timestamp,
            severity_number: record.severity.number(),
            severity_text: record.severity.name(),
            body: record.message.map(Value::String),
            attributes,
            trace_id: record
                .trace_context
                .map(|trace_context| trace_context.trace_id.to_string()),
            span_id: record
                .trace_context
                .map(|trace_context| trace_context.span_id.to_string()),
            flags: record
                .trace_context
                .map(|trace_context| trace_context.trace_flags.to_u8()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopetel::logs::{InMemoryLogExporter, LoggerProvider, Severity};
    use scopetel::trace::TracerProvider;
    use serde_json::json;

    #[test]
    fn records_keep_template_and_correlation() {
        let exporter = InMemoryLogExporter::default();
        let provider = LoggerProvider::builder()
            .with_batch_exporter(exporter.clone())
            .build();
        let logger = provider.logger("WebAPI.Weather.Forecast");
        logger.log(Severity::Warning, "outside any span", vec![]);
        let span_context = TracerProvider::builder()
            .build()
            .tracer("test")
            .in_span("request", |span| {
                logger.log(
                    Severity::Information,
                    "Generating {count} forecasts",
                    vec![scopetel::KeyValue::new("count", 5)],
                );
                span.span_context().clone()
            });
        provider.force_flush().unwrap();

        let body = serde_json::to_value(LogsData::from(exporter.get_emitted_logs().unwrap()))
            .unwrap();
        let scope_logs = &body["resourceLogs"][0]["scopeLogs"];
        assert_eq!(scope_logs.as_array().unwrap().len(), 1);
        assert_eq!(scope_logs[0]["scope"]["name"], "WebAPI.Weather.Forecast");

        let records = scope_logs[0]["logRecords"].as_array().unwrap();
        let uncorrelated = &records[0];
        assert_eq!(uncorrelated["severityNumber"], 13);
        assert_eq!(uncorrelated["severityText"], "Warning");
        assert!(uncorrelated.get("traceId").is_none());

        let record = &records[1];
        assert!(record["timeUnixNano"].is_string());
        assert_eq!(record["severityNumber"], 9);
        assert_eq!(record["body"], json!({"stringValue": "Generating 5 forecasts"}));
        assert_eq!(
            record["attributes"],
            json!([
                {"key": "count", "value": {"intValue": "5"}},
                {"key": "message.template", "value": {"stringValue": "Generating {count} forecasts"}},
            ])
        );
        assert_eq!(record["traceId"], span_context.trace_id().to_string());
        assert_eq!(record["spanId"], span_context.span_id().to_string());
        assert_eq!(record["flags"], 1);
    }
}
