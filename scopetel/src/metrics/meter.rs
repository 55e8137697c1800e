use crate::common::InstrumentationScope;
use crate::metrics::instrument::{Counter, CounterBuilder, NoopSyncInstrument};
use crate::metrics::observable::{GaugeNumber, ObservableGauge, ObservableGaugeBuilder};
use crate::metrics::pipeline::Pipeline;
use crate::metrics::sum::Number;
use crate::tel_warn;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

// maximum length of instrument name
const INSTRUMENT_NAME_MAX_LENGTH: usize = 255;
// maximum length of instrument unit name
const INSTRUMENT_UNIT_NAME_MAX_LENGTH: usize = 63;
const INSTRUMENT_NAME_ALLOWED_NON_ALPHANUMERIC_CHARS: [char; 4] = ['_', '.', '-', '/'];

// instrument validation error strings
const INSTRUMENT_NAME_EMPTY: &str = "instrument name must be non-empty";
const INSTRUMENT_NAME_LENGTH: &str = "instrument name must be less than 256 characters";
const INSTRUMENT_NAME_INVALID_CHAR: &str =
    "characters in instrument name must be ASCII and belong to the alphanumeric characters, '_', '.', '-' and '/'";
const INSTRUMENT_NAME_FIRST_ALPHABETIC: &str =
    "instrument name must start with an alphabetic character";
const INSTRUMENT_UNIT_LENGTH: &str = "instrument unit must be less than 64 characters";
const INSTRUMENT_UNIT_INVALID_CHAR: &str = "characters in instrument unit must be ASCII";

/// Creates instruments for one instrumentation scope.
///
/// Instruments are registered in the provider-wide registry: building a
/// counter whose name is already registered, from this or any other meter of
/// the same provider, returns a handle to the existing series.
#[derive(Clone)]
pub struct Meter {
    scope: InstrumentationScope,
    pipeline: Arc<Pipeline>,
}

impl Meter {
    pub(crate) fn new(scope: InstrumentationScope, pipeline: Arc<Pipeline>) -> Self {
        Meter { scope, pipeline }
    }

    /// The instrumentation scope of this meter.
    pub fn instrumentation_scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    /// Creates a builder for a counter of `u64` increments.
    pub fn u64_counter(&self, name: impl Into<Cow<'static, str>>) -> CounterBuilder<'_, u64> {
        CounterBuilder::new(self, name.into())
    }

    /// Creates a builder for a counter of `f64` increments.
    pub fn f64_counter(&self, name: impl Into<Cow<'static, str>>) -> CounterBuilder<'_, f64> {
        CounterBuilder::new(self, name.into())
    }

    /// Creates a builder for a gauge whose `u64` readings come from
    /// callbacks.
    pub fn u64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableGaugeBuilder<'_, u64> {
        ObservableGaugeBuilder::new(self, name.into())
    }

    /// Creates a builder for a gauge whose `f64` readings come from
    /// callbacks.
    pub fn f64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableGaugeBuilder<'_, f64> {
        ObservableGaugeBuilder::new(self, name.into())
    }

    pub(crate) fn create_counter<T: Number>(&self, builder: CounterBuilder<'_, T>) -> Counter<T> {
        if let Err(err) = validate_instrument_config(builder.name.as_ref(), &builder.unit) {
            tel_warn!(
                name: "Meter.InvalidInstrument",
                instrument = format!("{}", builder.name),
                reason = err,
                message = "Measurements will be ignored."
            );
            return Counter::new(Arc::new(NoopSyncInstrument));
        }

        match self.pipeline.get_or_create_sum::<T>(
            &self.scope,
            builder.name,
            builder.description.unwrap_or_default(),
            builder.unit.unwrap_or_default(),
        ) {
            Some(sum) => Counter::new(sum),
            None => Counter::new(Arc::new(NoopSyncInstrument)),
        }
    }

    pub(crate) fn create_observable_gauge<T: GaugeNumber>(
        &self,
        builder: ObservableGaugeBuilder<'_, T>,
    ) -> ObservableGauge<T> {
        if let Err(err) = validate_instrument_config(builder.name.as_ref(), &builder.unit) {
            tel_warn!(
                name: "Meter.InvalidInstrument",
                instrument = format!("{}", builder.name),
                reason = err,
                message = "Callbacks will not be called."
            );
            return ObservableGauge::new(None);
        }

        let gauge = self.pipeline.get_or_create_gauge::<T>(
            &self.scope,
            builder.name,
            builder.description.unwrap_or_default(),
            builder.unit.unwrap_or_default(),
        );
        if let Some(gauge) = &gauge {
            gauge.register_callbacks(builder.callbacks);
        }
        ObservableGauge::new(gauge)
    }
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter").field("scope", &self.scope).finish()
    }
}

fn validate_instrument_config(
    name: &str,
    unit: &Option<Cow<'static, str>>,
) -> Result<(), &'static str> {
    validate_instrument_name(name).and_then(|_| validate_instrument_unit(unit))
}

fn validate_instrument_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err(INSTRUMENT_NAME_EMPTY);
    }
    if name.len() > INSTRUMENT_NAME_MAX_LENGTH {
        return Err(INSTRUMENT_NAME_LENGTH);
    }
    if name.starts_with(|c: char| !c.is_ascii_alphabetic()) {
        return Err(INSTRUMENT_NAME_FIRST_ALPHABETIC);
    }
    if name.contains(|c: char| {
        !c.is_ascii_alphanumeric() && !INSTRUMENT_NAME_ALLOWED_NON_ALPHANUMERIC_CHARS.contains(&c)
    }) {
        return Err(INSTRUMENT_NAME_INVALID_CHAR);
    }
    Ok(())
}

fn validate_instrument_unit(unit: &Option<Cow<'static, str>>) -> Result<(), &'static str> {
    if let Some(unit) = unit {
        if unit.len() > INSTRUMENT_UNIT_NAME_MAX_LENGTH {
            return Err(INSTRUMENT_UNIT_LENGTH);
        }
        if unit.contains(|c: char| !c.is_ascii()) {
            return Err(INSTRUMENT_UNIT_INVALID_CHAR);
        }
    }
    Ok(())
}
