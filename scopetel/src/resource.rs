//! The identity of the process emitting telemetry.
//!
//! A [`Resource`] is built once at startup and shared, behind an `Arc`, by
//! every span, metric snapshot and log record the process exports.
//!
//! Detection order for each identity attribute, first hit wins:
//!
//! 1. the value set on [`ResourceBuilder`],
//! 2. `OTEL_SERVICE_NAME` (service name only),
//! 3. the matching key in `OTEL_RESOURCE_ATTRIBUTES` (`k=v,k2=v2`),
//! 4. the default: `unknown_service`, `unknown`, and for the instance id the
//!    host name (`HOSTNAME` / `COMPUTERNAME`) or else a random UUID.
use crate::{Key, KeyValue, Value};
use std::borrow::Cow;
use std::env;

const OTEL_RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";
const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";

/// `service.name` attribute key.
pub const SERVICE_NAME: &str = "service.name";
/// `service.version` attribute key.
pub const SERVICE_VERSION: &str = "service.version";
/// `service.instance.id` attribute key.
pub const SERVICE_INSTANCE_ID: &str = "service.instance.id";

const DEFAULT_SERVICE_NAME: &str = "unknown_service";
const DEFAULT_SERVICE_VERSION: &str = "unknown";

/// Immutable description of the emitting service instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    service_name: Cow<'static, str>,
    service_version: Cow<'static, str>,
    instance_id: Cow<'static, str>,
    attributes: Vec<KeyValue>,
}

impl Resource {
    /// Creates a [ResourceBuilder] that detects unset values from the
    /// environment.
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder::default()
    }

    /// Detects a resource entirely from the environment.
    pub fn from_env() -> Self {
        Resource::builder().build()
    }

    /// The logical service name, e.g. `weather-api`.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The deployed service version.
    pub fn service_version(&self) -> &str {
        &self.service_version
    }

    /// The id of this running instance.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Looks up an attribute, including the three identity attributes.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            SERVICE_NAME => Some(Value::String(self.service_name.clone())),
            SERVICE_VERSION => Some(Value::String(self.service_version.clone())),
            SERVICE_INSTANCE_ID => Some(Value::String(self.instance_id.clone())),
            _ => self
                .attributes
                .iter()
                .find(|kv| kv.key.as_str() == key)
                .map(|kv| kv.value.clone()),
        }
    }

    /// Iterates over every attribute, identity attributes first.
    pub fn iter(&self) -> impl Iterator<Item = KeyValue> + '_ {
        [
            KeyValue::new(SERVICE_NAME, Value::String(self.service_name.clone())),
            KeyValue::new(SERVICE_VERSION, Value::String(self.service_version.clone())),
            KeyValue::new(SERVICE_INSTANCE_ID, Value::String(self.instance_id.clone())),
        ]
        .into_iter()
        .chain(self.attributes.iter().cloned())
    }
}

impl Default for Resource {
    fn default() -> Self {
        Resource::from_env()
    }
}

/// Builder for [Resource].
#[derive(Debug, Default)]
pub struct ResourceBuilder {
    service_name: Option<Cow<'static, str>>,
    service_version: Option<Cow<'static, str>>,
    instance_id: Option<Cow<'static, str>>,
    attributes: Vec<KeyValue>,
}

impl ResourceBuilder {
    /// Sets the service name, overriding the environment.
    pub fn with_service_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Sets the service version, overriding the environment.
    pub fn with_service_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    /// Sets the instance id, overriding the environment.
    pub fn with_instance_id(mut self, id: impl Into<Cow<'static, str>>) -> Self {
        self.instance_id = Some(id.into());
        self
    }

    /// Adds an extra attribute. Later values for the same key win.
    pub fn with_attribute(mut self, attribute: KeyValue) -> Self {
        self.push_attribute(attribute);
        self
    }

    fn push_attribute(&mut self, attribute: KeyValue) {
        match attribute.key.as_str() {
            SERVICE_NAME => self.service_name = Some(attribute.value.as_str().into_owned().into()),
            SERVICE_VERSION => {
                self.service_version = Some(attribute.value.as_str().into_owned().into())
            }
            SERVICE_INSTANCE_ID => {
                self.instance_id = Some(attribute.value.as_str().into_owned().into())
            }
            _ => {
                self.attributes.retain(|kv| kv.key != attribute.key);
                self.attributes.push(attribute);
            }
        }
    }

    /// Resolves unset attributes and builds the [Resource].
    pub fn build(self) -> Resource {
        let mut detected = ResourceBuilder::default();
        for kv in env_resource_attributes() {
            detected.push_attribute(kv);
        }
        if let Some(name) = env::var(OTEL_SERVICE_NAME).ok().filter(|s| !s.is_empty()) {
            detected.service_name = Some(name.into());
        }

        let mut attributes = detected.attributes;
        for kv in self.attributes {
            attributes.retain(|existing| existing.key != kv.key);
            attributes.push(kv);
        }

        Resource {
            service_name: self
                .service_name
                .or(detected.service_name)
                .unwrap_or(Cow::Borrowed(DEFAULT_SERVICE_NAME)),
            service_version: self
                .service_version
                .or(detected.service_version)
                .unwrap_or(Cow::Borrowed(DEFAULT_SERVICE_VERSION)),
            instance_id: self
                .instance_id
                .or(detected.instance_id)
                .unwrap_or_else(default_instance_id),
            attributes,
        }
    }
}

/// Parses `OTEL_RESOURCE_ATTRIBUTES`, e.g. `key1=value1,key2=value2`.
fn env_resource_attributes() -> Vec<KeyValue> {
    match env::var(OTEL_RESOURCE_ATTRIBUTES) {
        Ok(s) if !s.is_empty() => s
            .split_terminator(',')
            .filter_map(|entry| {
                let (key, value) = entry.split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some(KeyValue::new(
                    Key::new(key.to_owned()),
                    value.trim().to_owned(),
                ))
            })
            .collect(),
        Ok(_) | Err(_) => Vec::new(),
    }
}

fn default_instance_id() -> Cow<'static, str> {
    ["HOSTNAME", "COMPUTERNAME"]
        .into_iter()
        .find_map(|var| env::var(var).ok().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_environment() {
        temp_env::with_vars_unset(
            [
                OTEL_SERVICE_NAME,
                OTEL_RESOURCE_ATTRIBUTES,
                "HOSTNAME",
                "COMPUTERNAME",
            ],
            || {
                let resource = Resource::from_env();
                assert_eq!(resource.service_name(), "unknown_service");
                assert_eq!(resource.service_version(), "unknown");
                // random uuid fallback
                assert!(uuid::Uuid::parse_str(resource.instance_id()).is_ok());
            },
        );
    }

    #[test]
    fn host_name_is_the_instance_id() {
        temp_env::with_vars(
            [("HOSTNAME", Some("web-7")), ("COMPUTERNAME", None::<&str>)],
            || {
                assert_eq!(Resource::from_env().instance_id(), "web-7");
            },
        );
    }

    #[test]
    fn reads_resource_attributes_from_env() {
        temp_env::with_vars(
            [
                (
                    OTEL_RESOURCE_ATTRIBUTES,
                    Some("service.name=from-attrs, service.version = 2.1.0 ,region=eu, =skip, bare"),
                ),
                (OTEL_SERVICE_NAME, None),
            ],
            || {
                let resource = Resource::from_env();
                assert_eq!(resource.service_name(), "from-attrs");
                assert_eq!(resource.service_version(), "2.1.0");
                assert_eq!(resource.get("region"), Some(Value::from("eu")));
                assert_eq!(resource.iter().count(), 4);
            },
        );
    }

    #[test]
    fn service_name_env_beats_resource_attributes() {
        temp_env::with_vars(
            [
                (OTEL_RESOURCE_ATTRIBUTES, Some("service.name=from-attrs")),
                (OTEL_SERVICE_NAME, Some("from-name")),
            ],
            || {
                assert_eq!(Resource::from_env().service_name(), "from-name");
            },
        );
    }

    #[test]
    fn builder_values_beat_environment() {
        temp_env::with_vars(
            [
                (OTEL_RESOURCE_ATTRIBUTES, Some("service.version=9,region=eu")),
                (OTEL_SERVICE_NAME, Some("from-env")),
            ],
            || {
                let resource = Resource::builder()
                    .with_service_name("weather-api")
                    .with_service_version("1.0.0")
                    .with_instance_id("pod-1")
                    .with_attribute(KeyValue::new("region", "us"))
                    .build();
                assert_eq!(resource.service_name(), "weather-api");
                assert_eq!(resource.service_version(), "1.0.0");
                assert_eq!(resource.instance_id(), "pod-1");
                assert_eq!(resource.get("region"), Some(Value::from("us")));
            },
        );
    }
}
