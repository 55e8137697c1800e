use crate::transform::common::{as_unix_nano, is_zero, KeyValue, Resource, Scope};
use scopetel::trace::SpanId;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::time::SystemTime;

/// Body of a `POST /v1/traces` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TracesData {
    resource_spans: Vec<ResourceSpans>,
}

impl From<Vec<scopetel::trace::SpanData>> for TracesData {
    fn from(sdk_spans: Vec<scopetel::trace::SpanData>) -> Self {
        let mut resource_spans: Vec<(scopetel::Resource, ResourceSpans)> = Vec::new();
        for sdk_span in sdk_spans {
            let index = match resource_spans
                .iter()
                .position(|(resource, _)| *resource == *sdk_span.resource)
            {
                Some(index) => index,
                None => {
                    resource_spans.push((
                        sdk_span.resource.as_ref().clone(),
                        ResourceSpans {
                            resource: sdk_span.resource.as_ref().into(),
                            scope_spans: Vec::with_capacity(1),
                        },
                    ));
                    resource_spans.len() - 1
                }
            };
            let rs = &mut resource_spans[index].1;

            let scope = Scope::from(&sdk_span.instrumentation_scope);
            match rs.scope_spans.iter_mut().find(|ss| ss.scope == scope) {
                Some(ss) => ss.spans.push(sdk_span.into()),
                None => rs.scope_spans.push(ScopeSpans {
                    scope,
                    spans: vec![sdk_span.into()],
                }),
            };
        }

        TracesData {
            resource_spans: resource_spans.into_iter().map(|(_, rs)| rs).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceSpans {
    resource: Resource,
    scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScopeSpans {
    scope: Scope,
    spans: Vec<Span>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Span {
    trace_id: String,
    span_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    parent_span_id: String,
    flags: u32,
    name: Cow<'static, str>,
    kind: SpanKind,
    #[serde(serialize_with = "as_unix_nano")]
    start_time_unix_nano: SystemTime,
    #[serde(serialize_with = "as_unix_nano")]
    end_time_unix_nano: SystemTime,
    attributes: Vec<KeyValue>,
    #[serde(skip_serializing_if = "is_zero")]
    dropped_attributes_count: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    events: Vec<Event>,
    #[serde(skip_serializing_if = "is_zero")]
    dropped_events_count: u32,
    status: Status,
}

impl From<scopetel::trace::SpanData> for Span {
    fn from(value: scopetel::trace::SpanData) -> Self {
        Span {
            trace_id: value.span_context.trace_id().to_string(),
            span_id: value.span_context.span_id().to_string(),
            parent_span_id: Some(value.parent_span_id)
                .filter(|id| *id != SpanId::INVALID)
                .map(|id| id.to_string())
                .unwrap_or_default(),
            flags: value.span_context.trace_flags().to_u8() as u32,
            name: value.name,
            kind: value.span_kind.into(),
            start_time_unix_nano: value.start_time,
            end_time_unix_nano: value.end_time,
            attributes: value.attributes.into_iter().map(Into::into).collect(),
            dropped_attributes_count: value.dropped_attributes_count,
            dropped_events_count: value.events.dropped_count,
            events: value.events.into_iter().map(Into::into).collect(),
            status: value.status.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SpanKind {
    Internal = 1,
    Server = 2,
    Client = 3,
    Producer = 4,
    Consumer = 5,
}

impl Serialize for SpanKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(*self as u8)
    }
}

impl From<scopetel::trace::SpanKind> for SpanKind {
    fn from(value: scopetel::trace::SpanKind) -> Self {
        match value {
            scopetel::trace::SpanKind::Client => SpanKind::Client,
            scopetel::trace::SpanKind::Server => SpanKind::Server,
            scopetel::trace::SpanKind::Producer => SpanKind::Producer,
            scopetel::trace::SpanKind::Consumer => SpanKind::Consumer,
            scopetel::trace::SpanKind::Internal => SpanKind::Internal,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    #[serde(serialize_with = "as_unix_nano")]
    time_unix_nano: SystemTime,
    name: Cow<'static, str>,
    attributes: Vec<KeyValue>,
    #[serde(skip_serializing_if = "is_zero")]
    dropped_attributes_count: u32,
}

impl From<scopetel::trace::Event> for Event {
    fn from(value: scopetel::trace::Event) -> Self {
        Event {
            time_unix_nano: value.timestamp,
            name: value.name,
            attributes: value.attributes.into_iter().map(Into::into).collect(),
            dropped_attributes_count: value.dropped_attributes_count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<Cow<'static, str>>,
    #[serde(skip_serializing_if = "is_zero")]
    code: u32,
}

impl From<scopetel::trace::Status> for Status {
    fn from(value: scopetel::trace::Status) -> Self {
        let non_empty = |description: Cow<'static, str>| Some(description).filter(|d| !d.is_empty());
        match value {
            scopetel::trace::Status::Unset => Status {
                message: None,
                code: 0,
            },
            scopetel::trace::Status::Ok { description } => Status {
                message: non_empty(description),
                code: 1,
            },
            scopetel::trace::Status::Error { description } => Status {
                message: non_empty(description),
                code: 2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopetel::trace::{InMemorySpanExporter, Status, TracerProvider};
    use serde_json::json;

    fn finished_spans() -> Vec<scopetel::trace::SpanData> {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter.clone())
            .with_resource(
                scopetel::Resource::builder()
                    .with_service_name("weather-api")
                    .with_service_version("1.0.0")
                    .with_instance_id("host-1")
                    .build(),
            )
            .build();
        let tracer = provider.tracer("WebAPI.Weather.Forecast");
        tracer.in_span_with_kind("GET /weatherforecast", scopetel::trace::SpanKind::Server, |a| {
            tracer.in_span("generate", |b| {
                b.add_event("work.start", vec![]).unwrap();
                b.set_status(Status::error("boom")).unwrap();
            });
            a.set_status(Status::ok("Forecast generated successfully"))
                .unwrap();
        });
        provider.force_flush().unwrap();
        exporter.get_finished_spans().unwrap()
    }

    #[test]
    fn groups_spans_by_resource_and_scope() {
        let spans = finished_spans();
        let root = spans.iter().find(|s| s.name == "GET /weatherforecast").unwrap();
        let trace_id = root.span_context.trace_id().to_string();
        let root_id = root.span_context.span_id().to_string();

        let body = serde_json::to_value(TracesData::from(spans)).unwrap();
        let resource_spans = body["resourceSpans"].as_array().unwrap();
        assert_eq!(resource_spans.len(), 1);
        assert!(resource_spans[0]["resource"]["attributes"]
            .as_array()
            .unwrap()
            .contains(&json!({"key": "service.name", "value": {"stringValue": "weather-api"}})));

        let scope_spans = resource_spans[0]["scopeSpans"].as_array().unwrap();
        assert_eq!(scope_spans.len(), 1);
        assert_eq!(scope_spans[0]["scope"]["name"], "WebAPI.Weather.Forecast");

        let spans = scope_spans[0]["spans"].as_array().unwrap();
        let child = spans.iter().find(|s| s["name"] == "generate").unwrap();
        let root = spans
            .iter()
            .find(|s| s["name"] == "GET /weatherforecast")
            .unwrap();
        assert_eq!(child["traceId"], trace_id.as_str());
        assert_eq!(child["parentSpanId"], root_id.as_str());
        assert_eq!(child["kind"], 1);
        assert_eq!(child["status"], json!({"message": "boom", "code": 2}));
        assert_eq!(child["events"][0]["name"], "work.start");
        assert!(child["startTimeUnixNano"].is_string());

        assert_eq!(root["kind"], 2);
        assert_eq!(root["flags"], 1);
        assert!(root.get("parentSpanId").is_none());
        assert_eq!(
            root["status"],
            json!({"message": "Forecast generated successfully", "code": 1})
        );
    }
}
