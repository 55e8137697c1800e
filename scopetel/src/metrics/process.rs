//! Observable gauges describing the current process.
//!
//! | name                   | unit       | attributes                 |
//! |------------------------|------------|----------------------------|
//! | `process.cpu.time`     | `s`        | `cpu.mode` = user / system |
//! | `process.memory.usage` | `By`       |                            |
//! | `process.thread.count` | `{thread}` |                            |
//! | `process.uptime`       | `s`        |                            |
//!
//! CPU time, memory and threads are read from `/proc/self` and are only
//! reported on Linux. Uptime is reported everywhere.
//!
//! ```
//! use scopetel::metrics::MeterProvider;
//!
//! let provider = MeterProvider::builder().with_process_metrics().build();
//! assert!(provider.collect().metric("process.uptime").is_some());
//! ```
use crate::common::{InstrumentationScope, KeyValue};
use crate::metrics::Meter;
use std::time::Instant;

/// Scope of the meter the process gauges are registered under.
pub const SCOPE_NAME: &str = "scopetel.process";

/// `/proc` reports CPU times in ticks of this rate on every Linux platform.
const USER_HZ: f64 = 100.0;

pub(crate) fn scope() -> InstrumentationScope {
    InstrumentationScope::builder(SCOPE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .build()
}

/// Registers the process gauges with `meter`.
///
/// Registering twice doubles the callbacks but not the series: each reading
/// replaces the one before it.
pub fn register(meter: &Meter) {
    let started = Instant::now();

    meter
        .f64_observable_gauge("process.cpu.time")
        .with_description("Total CPU seconds broken down by mode")
        .with_unit("s")
        .with_callback(|observer| {
            if let Some(cpu) = read_proc("stat").as_deref().and_then(parse_cpu_times) {
                observer.observe(cpu.user, &[KeyValue::new("cpu.mode", "user")]);
                observer.observe(cpu.system, &[KeyValue::new("cpu.mode", "system")]);
            }
        })
        .build();

    meter
        .u64_observable_gauge("process.memory.usage")
        .with_description("The amount of physical memory in use")
        .with_unit("By")
        .with_callback(|observer| {
            let resident = read_proc("status")
                .as_deref()
                .and_then(|status| status_value(status, "VmRSS"));
            if let Some(kib) = resident {
                observer.observe(kib.saturating_mul(1024), &[]);
            }
        })
        .build();

    meter
        .u64_observable_gauge("process.thread.count")
        .with_description("Process threads count")
        .with_unit("{thread}")
        .with_callback(|observer| {
            let threads = read_proc("status")
                .as_deref()
                .and_then(|status| status_value(status, "Threads"));
            if let Some(threads) = threads {
                observer.observe(threads, &[]);
            }
        })
        .build();

    meter
        .f64_observable_gauge("process.uptime")
        .with_description("The time the process has been running")
        .with_unit("s")
        .with_callback(move |observer| observer.observe(started.elapsed().as_secs_f64(), &[]))
        .build();
}

#[cfg(target_os = "linux")]
fn read_proc(file: &str) -> Option<String> {
    std::fs::read_to_string(format!("/proc/self/{file}")).ok()
}

#[cfg(not(target_os = "linux"))]
fn read_proc(_file: &str) -> Option<String> {
    None
}

#[derive(Debug, PartialEq)]
struct CpuTimes {
    user: f64,
    system: f64,
}

/// User and system CPU seconds from the contents of `/proc/<pid>/stat`.
fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    // The command name may itself contain spaces and parentheses.
    let (_, rest) = stat.rsplit_once(')')?;
    let mut fields = rest.split_whitespace();
    // fields 14 and 15 of the file; `rest` starts at field 3
    let utime: u64 = fields.nth(11)?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(CpuTimes {
        user: utime as f64 / USER_HZ,
        system: stime as f64 / USER_HZ,
    })
}

/// The leading number of a `Key:\tvalue` line of `/proc/<pid>/status`.
fn status_value(status: &str, key: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        let value = line.strip_prefix(key)?.strip_prefix(':')?;
        value.split_whitespace().next()?.parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::MetricData;
    use crate::metrics::MeterProvider;

    const STAT: &str = "4711 (weather api (v2)) S 1 4711 4711 0 -1 4194560 2411 0 0 0 \
                        250 37 0 0 20 0 9 0 1234567 123456789 3456 18446744073709551615";

    const STATUS: &str = "Name:\tweather-api\n\
                          Umask:\t0022\n\
                          State:\tS (sleeping)\n\
                          VmPeak:\t  412345 kB\n\
                          VmRSS:\t   20480 kB\n\
                          Threads:\t9\n";

    #[test]
    fn cpu_times_skip_command_name() {
        assert_eq!(
            parse_cpu_times(STAT),
            Some(CpuTimes {
                user: 2.5,
                system: 0.37
            })
        );
        assert_eq!(parse_cpu_times("4711 (truncated) S 1 2"), None);
        assert_eq!(parse_cpu_times(""), None);
    }

    #[test]
    fn status_values_by_key() {
        assert_eq!(status_value(STATUS, "VmRSS"), Some(20_480));
        assert_eq!(status_value(STATUS, "Threads"), Some(9));
        // prefix of another key
        assert_eq!(status_value(STATUS, "Vm"), None);
        assert_eq!(status_value(STATUS, "VmSwap"), None);
    }

    #[test]
    fn gauges_are_registered_under_process_scope() {
        let provider = MeterProvider::builder().with_process_metrics().build();
        let metrics = provider.collect();

        let scope = metrics
            .scope_metrics
            .iter()
            .find(|sm| sm.scope.name() == SCOPE_NAME)
            .unwrap();
        let names: Vec<_> = scope.metrics.iter().map(|m| m.name.as_ref()).collect();
        assert_eq!(
            names,
            [
                "process.cpu.time",
                "process.memory.usage",
                "process.thread.count",
                "process.uptime"
            ]
        );
        match &metrics.metric("process.uptime").unwrap().data {
            MetricData::F64Gauge(gauge) => assert!(gauge.value_for(&[]).unwrap() >= 0.0),
            other => panic!("unexpected data {:?}", other),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn reports_this_process() {
        let provider = MeterProvider::builder().with_process_metrics().build();
        let metrics = provider.collect();

        match &metrics.metric("process.thread.count").unwrap().data {
            MetricData::U64Gauge(gauge) => assert!(gauge.value_for(&[]).unwrap() >= 1),
            other => panic!("unexpected data {:?}", other),
        }
        match &metrics.metric("process.memory.usage").unwrap().data {
            MetricData::U64Gauge(gauge) => assert!(gauge.value_for(&[]).unwrap() > 0),
            other => panic!("unexpected data {:?}", other),
        }
        match &metrics.metric("process.cpu.time").unwrap().data {
            MetricData::F64Gauge(gauge) => {
                assert!(gauge.value_for(&[KeyValue::new("cpu.mode", "user")]).is_some());
                assert!(gauge.value_for(&[KeyValue::new("cpu.mode", "system")]).is_some());
            }
            other => panic!("unexpected data {:?}", other),
        }
    }
}
