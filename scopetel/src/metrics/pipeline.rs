use crate::common::InstrumentationScope;
use crate::metrics::data::{Metric, ResourceMetrics, ScopeMetrics};
use crate::metrics::observable::{GaugeNumber, ObservableGaugeState};
use crate::metrics::sum::{Aggregator, Number, Sum};
use crate::resource::Resource;
use crate::tel_warn;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Clone)]
struct InstrumentEntry {
    scope: InstrumentationScope,
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
    aggregator: Aggregator,
}

/// The instrument registry of one meter provider, shared by its meters and
/// read by its periodic readers.
///
/// Instrument names are unique across the whole provider. Registering a name
/// again returns the existing aggregator, even from another meter.
pub(crate) struct Pipeline {
    resource: Arc<Resource>,
    start_time: SystemTime,
    registry: Mutex<Registry>,
}

struct Metadata {
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
}

#[derive(Default)]
struct Registry {
    // registration order
    instruments: Vec<InstrumentEntry>,
    by_name: HashMap<Cow<'static, str>, usize>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("resource", &self.resource)
            .finish()
    }
}

impl Pipeline {
    pub(crate) fn new(resource: Arc<Resource>) -> Self {
        Pipeline {
            resource,
            start_time: SystemTime::now(),
            registry: Mutex::new(Registry::default()),
        }
    }

    pub(crate) fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    /// Returns the sum registered under `name`, registering it first if
    /// needed. `None` if the name is taken by an instrument of another kind.
    pub(crate) fn get_or_create_sum<T: Number>(
        &self,
        scope: &InstrumentationScope,
        name: Cow<'static, str>,
        description: Cow<'static, str>,
        unit: Cow<'static, str>,
    ) -> Option<Arc<Sum<T>>> {
        let start_time = self.start_time;
        self.get_or_create(
            scope,
            Metadata {
                name,
                description,
                unit,
            },
            T::KIND,
            T::from_aggregator,
            |name| {
                let sum = Arc::new(Sum::new(name.to_string(), start_time));
                (sum.clone(), T::into_aggregator(sum))
            },
        )
    }

    /// Returns the observable gauge registered under `name`, registering it
    /// first if needed. `None` if the name is taken by an instrument of
    /// another kind.
    pub(crate) fn get_or_create_gauge<T: GaugeNumber>(
        &self,
        scope: &InstrumentationScope,
        name: Cow<'static, str>,
        description: Cow<'static, str>,
        unit: Cow<'static, str>,
    ) -> Option<Arc<ObservableGaugeState<T>>> {
        self.get_or_create(
            scope,
            Metadata {
                name,
                description,
                unit,
            },
            T::KIND,
            T::from_aggregator,
            |name| {
                let gauge = Arc::new(ObservableGaugeState::new(name.to_string()));
                (gauge.clone(), T::into_aggregator(gauge))
            },
        )
    }

    fn get_or_create<A>(
        &self,
        scope: &InstrumentationScope,
        metadata: Metadata,
        requested_kind: &'static str,
        existing: impl FnOnce(&Aggregator) -> Option<A>,
        create: impl FnOnce(&str) -> (A, Aggregator),
    ) -> Option<A> {
        let Metadata {
            name,
            description,
            unit,
        } = metadata;
        let Ok(mut registry) = self.registry.lock() else {
            return None;
        };

        if let Some(&position) = registry.by_name.get(&name) {
            let entry = &registry.instruments[position];
            let Some(instrument) = existing(&entry.aggregator) else {
                tel_warn!(
                    name: "Meter.InstrumentKindConflict",
                    instrument = format!("{}", name),
                    registered_kind = entry.aggregator.kind(),
                    requested_kind = requested_kind,
                    message = "Instrument name already registered with another kind; measurements will be ignored."
                );
                return None;
            };
            if entry.unit != unit || entry.description != description {
                tel_warn!(
                    name: "Meter.DuplicateInstrumentMetadata",
                    instrument = format!("{}", name),
                    message = "Instrument registered again with different unit or description; keeping the first registration."
                );
            }
            return Some(instrument);
        }

        let (instrument, aggregator) = create(name.as_ref());
        let position = registry.instruments.len();
        registry.by_name.insert(name.clone(), position);
        registry.instruments.push(InstrumentEntry {
            scope: scope.clone(),
            name,
            description,
            unit,
            aggregator,
        });
        Some(instrument)
    }

    /// A cumulative snapshot of every registered instrument, grouped by the
    /// scope that first registered it.
    pub(crate) fn produce(&self) -> ResourceMetrics {
        // gauge callbacks must run without the registry lock held
        let entries = match self.registry.lock() {
            Ok(registry) => registry.instruments.clone(),
            Err(_) => Vec::new(),
        };

        let mut scope_metrics: Vec<ScopeMetrics> = Vec::new();
        for entry in entries {
            let metric = Metric {
                name: entry.name,
                description: entry.description,
                unit: entry.unit,
                data: entry.aggregator.snapshot(),
            };
            match scope_metrics.iter_mut().find(|sm| sm.scope == entry.scope) {
                Some(sm) => sm.metrics.push(metric),
                None => scope_metrics.push(ScopeMetrics {
                    scope: entry.scope,
                    metrics: vec![metric],
                }),
            }
        }

        ResourceMetrics {
            resource: self.resource.clone(),
            scope_metrics,
        }
    }
}
