//! # Metrics
//!
//! Counters are always recorded, whether or not the surrounding trace is
//! sampled. Observable gauges are read through callbacks each time a
//! snapshot is taken; [process] registers a set of them describing the
//! current process.
//!
//! Each distinct attribute set of a counter is its own series with
//! its own running total; trace identifiers and baggage never become part
//! of a series key.
//!
//! All meters of a [MeterProvider] share one instrument registry, where
//! names are unique: building a counter whose name is already registered
//! returns a handle to the existing series. [PeriodicReader]s take
//! cumulative snapshots of the registry and push them to a
//! [MetricExporter].
//!
//! ### Example
//!
//! ```
//! use scopetel::metrics::{InMemoryMetricExporter, MeterProvider};
//! use scopetel::{KeyValue, Resource};
//!
//! let exporter = InMemoryMetricExporter::default();
//! let meter_provider = MeterProvider::builder()
//!     .with_resource(Resource::builder().with_service_name("weather-api").build())
//!     .with_periodic_exporter(exporter.clone())
//!     .build();
//!
//! let meter = meter_provider.meter("WebAPI.Weather.Forecast");
//! let counter = meter
//!     .u64_counter("forecast_requests")
//!     .with_description("Number of weather forecast requests")
//!     .with_unit("1")
//!     .build();
//!
//! counter.add(1, &[KeyValue::new("event", "add")]);
//!
//! // shutdown exports a final snapshot.
//! meter_provider.shutdown().unwrap();
//! assert_eq!(exporter.get_finished_metrics().unwrap().len(), 1);
//! ```
mod attribute_set;
pub mod data;
mod exporter;
mod in_memory_exporter;
mod instrument;
mod meter;
mod meter_provider;
mod observable;
mod periodic_reader;
mod pipeline;
pub mod process;
mod sum;

pub use exporter::MetricExporter;
pub use in_memory_exporter::InMemoryMetricExporter;
pub use instrument::{Counter, CounterBuilder};
pub use meter::Meter;
pub use meter_provider::{MeterProvider, MeterProviderBuilder};
pub use observable::{AsyncInstrument, Callback, ObservableGauge, ObservableGaugeBuilder};
pub use periodic_reader::{PeriodicReader, PeriodicReaderBuilder};

#[cfg(test)]
mod tests {
    use super::data::MetricData;
    use super::*;
    use crate::{Context, KeyValue};
    use std::thread;

    #[test]
    fn concurrent_adds_are_all_counted() {
        let provider = MeterProvider::builder().build();
        let counter = provider.meter("test").u64_counter("requests_total").build();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        counter.add(1, &[KeyValue::new("event", "add")]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        match &provider.collect().metric("requests_total").unwrap().data {
            MetricData::U64Sum(sum) => {
                assert_eq!(sum.value_for(&[KeyValue::new("event", "add")]), Some(5_000))
            }
            other => panic!("unexpected data {:?}", other),
        }
    }

    #[test]
    fn baggage_is_not_part_of_series_key() {
        let provider = MeterProvider::builder().build();
        let counter = provider.meter("test").u64_counter("requests_total").build();

        {
            let _guard = Context::new().attach();
            Context::set_baggage("user.id", "42");
            counter.add(1, &[]);
        }
        counter.add(1, &[]);

        let metrics = provider.collect();
        match &metrics.metric("requests_total").unwrap().data {
            MetricData::U64Sum(sum) => {
                // baggage is not part of the series key
                assert_eq!(sum.data_points.len(), 1);
                assert_eq!(sum.value_for(&[]), Some(2));
            }
            other => panic!("unexpected data {:?}", other),
        }
    }
}
