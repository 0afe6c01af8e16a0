//! Distance-derived link characteristics and the wiring cost function.

use crate::error::{Result, TopologyError};
use crate::{LinkField, OverrideStore, Placement};

/// Scalar used to rank candidate links and weight graph edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CostFunction {
    /// Cost = latency.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "cost_min_latency"))]
    MinLatency,
    /// Cost = 1 / bandwidth.
    #[cfg_attr(feature = "serde", serde(rename = "cost_max_bandwidth"))]
    MaxBandwidth,
}

/// Global simulation defaults.
///
/// Immutable once built; changes go through [`LinkDefaults::patched`], which
/// returns a fresh validated value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkDefaults {
    /// Base link bandwidth (bps).
    pub bandwidth: i64,
    /// Decay bandwidth linearly with distance, reaching zero at `max_latency`.
    pub decay_bandwidth: bool,
    /// Percentage applied to distance-derived and overridden latency.
    pub latency_scale: i64,
    /// Links at or above this latency are never wired.
    pub max_latency: i64,
    /// Links at or below this bandwidth are never wired.
    pub min_bandwidth: i64,
    pub jitter: i64,
    pub packet_loss: i64,
    pub cost_function: CostFunction,
    pub client_bandwidth: i64,
    pub client_latency: i64,
    pub client_jitter: i64,
    pub client_loss: i64,
}

impl Default for LinkDefaults {
    fn default() -> Self {
        Self {
            bandwidth: 512_000,
            decay_bandwidth: true,
            latency_scale: 100,
            max_latency: 300,
            min_bandwidth: 0,
            jitter: 0,
            packet_loss: 0,
            cost_function: CostFunction::MinLatency,
            client_bandwidth: 512_000,
            client_latency: 0,
            client_jitter: 0,
            client_loss: 0,
        }
    }
}

/// Partial update of [`LinkDefaults`]; absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct DefaultsPatch {
    pub bandwidth: Option<i64>,
    pub decay_bandwidth: Option<bool>,
    pub latency_scale: Option<i64>,
    pub max_latency: Option<i64>,
    pub min_bandwidth: Option<i64>,
    pub jitter: Option<i64>,
    pub packet_loss: Option<i64>,
    pub cost_function: Option<CostFunction>,
    pub client_bandwidth: Option<i64>,
    pub client_latency: Option<i64>,
    pub client_jitter: Option<i64>,
    pub client_loss: Option<i64>,
}

impl LinkDefaults {
    /// A copy of these defaults with `patch` applied, validated as a whole.
    pub fn patched(&self, patch: &DefaultsPatch) -> Result<Self> {
        let next = Self {
            bandwidth: patch.bandwidth.unwrap_or(self.bandwidth),
            decay_bandwidth: patch.decay_bandwidth.unwrap_or(self.decay_bandwidth),
            latency_scale: patch.latency_scale.unwrap_or(self.latency_scale),
            max_latency: patch.max_latency.unwrap_or(self.max_latency),
            min_bandwidth: patch.min_bandwidth.unwrap_or(self.min_bandwidth),
            jitter: patch.jitter.unwrap_or(self.jitter),
            packet_loss: patch.packet_loss.unwrap_or(self.packet_loss),
            cost_function: patch.cost_function.unwrap_or(self.cost_function),
            client_bandwidth: patch.client_bandwidth.unwrap_or(self.client_bandwidth),
            client_latency: patch.client_latency.unwrap_or(self.client_latency),
            client_jitter: patch.client_jitter.unwrap_or(self.client_jitter),
            client_loss: patch.client_loss.unwrap_or(self.client_loss),
        };
        next.validate()?;
        Ok(next)
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(name: &'static str, reason: &'static str) -> Result<()> {
            Err(TopologyError::InvalidDefault { name, reason })
        }

        if self.max_latency <= 0 {
            return invalid("max_latency", "must be positive");
        }
        // min_bandwidth >= 0 keeps every wired link's inverse-bandwidth cost finite
        let non_negative = [
            ("bandwidth", self.bandwidth),
            ("latency_scale", self.latency_scale),
            ("min_bandwidth", self.min_bandwidth),
            ("jitter", self.jitter),
            ("client_bandwidth", self.client_bandwidth),
            ("client_latency", self.client_latency),
            ("client_jitter", self.client_jitter),
        ];
        for (name, value) in non_negative {
            if value < 0 {
                return invalid(name, "must not be negative");
            }
        }
        for (name, value) in [("packet_loss", self.packet_loss), ("client_loss", self.client_loss)] {
            if !(0..=100).contains(&value) {
                return invalid(name, "must be a percentage");
            }
        }
        Ok(())
    }

    fn scale_latency(&self, latency: f64) -> f64 {
        latency * (self.latency_scale as f64 / 100.0)
    }
}

/// Effective characteristics of one link.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkParams {
    pub bandwidth: i64,
    pub latency: f64,
    pub jitter: i64,
    pub packet_loss: i64,
}

/// Link characteristics for a given set of defaults and overrides.
///
/// All lookups normalize the pair, so `latency(a, b) == latency(b, a)`.
#[derive(Debug, Clone, Copy)]
pub struct LinkModel<'a> {
    defaults: &'a LinkDefaults,
    overrides: &'a OverrideStore,
}

impl<'a> LinkModel<'a> {
    pub fn new(defaults: &'a LinkDefaults, overrides: &'a OverrideStore) -> Self {
        Self {
            defaults,
            overrides,
        }
    }

    pub fn defaults(&self) -> &'a LinkDefaults {
        self.defaults
    }

    fn forced(&self, a: &Placement, b: &Placement, field: LinkField) -> Option<i64> {
        self.overrides.get(a.id, b.id).and_then(|o| o.get(field))
    }

    pub fn latency(&self, a: &Placement, b: &Placement) -> f64 {
        match self.forced(a, b, LinkField::Latency) {
            Some(latency) => self.defaults.scale_latency(latency as f64),
            None => self.defaults.scale_latency(a.distance(b).trunc()),
        }
    }

    /// May be zero or negative past `max_latency` when decay is enabled.
    pub fn bandwidth(&self, a: &Placement, b: &Placement) -> i64 {
        if let Some(bandwidth) = self.forced(a, b, LinkField::Bandwidth) {
            return bandwidth;
        }
        if !self.defaults.decay_bandwidth {
            return self.defaults.bandwidth;
        }
        let max_latency = self.defaults.max_latency as f64;
        let remaining = (max_latency - a.distance(b)) / max_latency;
        (self.defaults.bandwidth as f64 * remaining) as i64
    }

    pub fn jitter(&self, a: &Placement, b: &Placement) -> i64 {
        self.forced(a, b, LinkField::Jitter)
            .unwrap_or(self.defaults.jitter)
    }

    pub fn packet_loss(&self, a: &Placement, b: &Placement) -> i64 {
        self.forced(a, b, LinkField::PacketLoss)
            .unwrap_or(self.defaults.packet_loss)
    }

    pub fn params(&self, a: &Placement, b: &Placement) -> LinkParams {
        LinkParams {
            bandwidth: self.bandwidth(a, b),
            latency: self.latency(a, b),
            jitter: self.jitter(a, b),
            packet_loss: self.packet_loss(a, b),
        }
    }

    /// Active cost function. Non-positive bandwidth costs infinity.
    pub fn cost(&self, a: &Placement, b: &Placement) -> f64 {
        match self.defaults.cost_function {
            CostFunction::MinLatency => self.latency(a, b),
            CostFunction::MaxBandwidth => {
                let bandwidth = self.bandwidth(a, b);
                if bandwidth > 0 {
                    1.0 / bandwidth as f64
                } else {
                    f64::INFINITY
                }
            }
        }
    }

    /// Candidacy threshold: under the latency ceiling and above the bandwidth floor.
    pub fn qualifies(&self, a: &Placement, b: &Placement) -> bool {
        self.latency(a, b) < self.defaults.max_latency as f64
            && self.bandwidth(a, b) > self.defaults.min_bandwidth
    }
}
