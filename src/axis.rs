//! Sweep axis and per-point run specification

use serde::{Deserialize, Serialize};

use crate::error::InvocationContext;
use crate::params::{ParamMap, Scalar};
use crate::subject::SubjectRef;
use crate::{Error, Result};

/// The single parameter varied across one sweep, with its ordered values.
///
/// Values are non-empty, unique, and either all numeric or all non-numeric,
/// so that aggregation stays row-aligned and charts can order them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AxisRepr", into = "AxisRepr")]
pub struct SweepAxis {
    name: String,
    values: Vec<Scalar>,
}

#[derive(Serialize, Deserialize)]
struct AxisRepr {
    name: String,
    values: Vec<Scalar>,
}

impl TryFrom<AxisRepr> for SweepAxis {
    type Error = Error;

    fn try_from(repr: AxisRepr) -> Result<Self> {
        Self::new(repr.name, repr.values)
    }
}

impl From<SweepAxis> for AxisRepr {
    fn from(axis: SweepAxis) -> Self {
        Self {
            name: axis.name,
            values: axis.values,
        }
    }
}

impl SweepAxis {
    /// Create a validated axis.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAxis`] if the name or value list is empty, a
    /// value repeats, a float is not finite, or numeric and non-numeric values
    /// are mixed.
    pub fn new<V: Into<Scalar>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self> {
        let name = name.into();
        let values: Vec<Scalar> = values.into_iter().map(Into::into).collect();
        let invalid = |reason: String| Error::InvalidAxis {
            axis: name.clone(),
            reason,
        };

        if name.is_empty() {
            return Err(invalid("axis name is empty".into()));
        }
        if values.is_empty() {
            return Err(invalid("no values".into()));
        }
        if let Some(Scalar::Float(v)) = values
            .iter()
            .find(|v| matches!(v, Scalar::Float(f) if !f.is_finite()))
        {
            return Err(invalid(format!("non-finite value {v}")));
        }
        let numeric = values[0].is_numeric();
        if values.iter().any(|v| v.is_numeric() != numeric) {
            return Err(invalid("numeric and non-numeric values mixed".into()));
        }
        for (i, value) in values.iter().enumerate() {
            if values[..i].iter().any(|earlier| same_value(earlier, value)) {
                return Err(invalid(format!("duplicate value {value}")));
            }
        }

        Ok(Self { name, values })
    }

    /// Name of the swept parameter.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values in sweep order.
    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false for a validated axis.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the values are numeric (plottable on a numeric x scale).
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.values[0].is_numeric()
    }
}

// `4` and `4.0` are the same sweep point; integers compare exactly.
#[allow(clippy::float_cmp)]
fn same_value(a: &Scalar, b: &Scalar) -> bool {
    match (a, b) {
        (Scalar::Int(x), Scalar::Int(y)) => x == y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}

/// Fully-specified input to one subject invocation.
///
/// Built by the engine per point, consumed once.
#[derive(Debug, Clone)]
pub struct RunSpec<'a> {
    subject: &'a SubjectRef,
    point: (String, Scalar),
    fixed_params: ParamMap,
    varying_param: Option<(String, Scalar)>,
    port: Option<u16>,
}

impl<'a> RunSpec<'a> {
    /// Build the spec for one axis point: baseline, then the subject's
    /// overrides, minus the subject's exclusions, with the axis value
    /// substituted.
    ///
    /// When the subject excludes the axis parameter the spec has no varying
    /// parameter and the subject is axis-invariant.
    #[must_use]
    pub fn for_point(
        subject: &'a SubjectRef,
        baseline: &ParamMap,
        axis_name: &str,
        value: &Scalar,
    ) -> Self {
        let mut fixed_params = baseline.clone();
        fixed_params.extend(
            subject
                .overrides()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        fixed_params.retain(|k, _| k != axis_name && !subject.excludes(k));

        let varying_param = (!subject.excludes(axis_name))
            .then(|| (axis_name.to_string(), value.clone()));

        Self {
            subject,
            point: (axis_name.to_string(), value.clone()),
            fixed_params,
            varying_param,
            port: None,
        }
    }

    /// Attach the port allocated for a server-paired invocation.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Subject to invoke.
    #[must_use]
    pub const fn subject(&self) -> &SubjectRef {
        self.subject
    }

    /// Axis name and value this spec was built for, even when the subject
    /// ignores the axis.
    #[must_use]
    pub const fn point(&self) -> &(String, Scalar) {
        &self.point
    }

    /// Parameters held constant at this point.
    #[must_use]
    pub const fn fixed_params(&self) -> &ParamMap {
        &self.fixed_params
    }

    /// The swept parameter and its value, absent for axis-invariant subjects.
    #[must_use]
    pub const fn varying_param(&self) -> Option<&(String, Scalar)> {
        self.varying_param.as_ref()
    }

    /// Allocated port, if any.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// Fixed and varying parameters merged.
    #[must_use]
    pub fn params(&self) -> ParamMap {
        let mut params = self.fixed_params.clone();
        if let Some((name, value)) = &self.varying_param {
            params.insert(name.clone(), value.clone());
        }
        params
    }

    /// Error context for this invocation given the command lines run.
    #[must_use]
    pub fn context(&self, commands: Vec<String>) -> InvocationContext {
        InvocationContext {
            subject: self.subject.label().to_string(),
            axis: self.point.0.clone(),
            value: self.point.1.to_string(),
            commands,
        }
    }
}
