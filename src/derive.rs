//! Derived variables computed from raw components
//!
//! Each [`DerivationRule`] names its input codes, its output code and a pure
//! transform. Rules run in order over a [`VariableSet`]; a rule whose inputs
//! are not all present is skipped. Adding a physical derivation means adding a
//! rule, the aggregator is unaffected.

use crate::message::{RasterMessage, TimestepKey, VariableCode};
use crate::timestep::Batch;
use ndarray::{Array2, Zip};
use std::collections::BTreeMap;

/// The messages of one timestep, keyed by variable code
#[derive(Debug, Clone)]
pub struct VariableSet {
    pub key: TimestepKey,
    fields: BTreeMap<VariableCode, RasterMessage>,
}

impl VariableSet {
    #[must_use]
    pub fn new(key: TimestepKey) -> Self {
        Self {
            key,
            fields: BTreeMap::new(),
        }
    }

    /// Index a batch by variable; a repeated code keeps the last message
    #[must_use]
    pub fn from_batch(batch: Batch) -> Self {
        let mut set = Self::new(batch.key);
        for message in batch.messages {
            if let Some(previous) = set.insert(message) {
                log::warn!(
                    "Duplicate '{}' message at {}; keeping the later one",
                    previous.variable,
                    set.key
                );
            }
        }
        set
    }

    pub fn insert(&mut self, message: RasterMessage) -> Option<RasterMessage> {
        self.fields.insert(message.variable.clone(), message)
    }

    #[must_use]
    pub fn contains(&self, code: &VariableCode) -> bool {
        self.fields.contains_key(code)
    }

    #[must_use]
    pub fn get(&self, code: &VariableCode) -> Option<&RasterMessage> {
        self.fields.get(code)
    }

    pub fn take(&mut self, code: &VariableCode) -> Option<RasterMessage> {
        self.fields.remove(code)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = &VariableCode> {
        self.fields.keys()
    }

    pub fn messages(&self) -> impl Iterator<Item = &RasterMessage> {
        self.fields.values()
    }
}

/// A physical derivation over the variables of one timestep
pub trait DerivationRule {
    /// Codes that must all be present for the rule to apply
    fn inputs(&self) -> &[VariableCode];

    /// Code of the produced variable
    fn output(&self) -> VariableCode;

    /// Whether the inputs are removed from the set once the output exists
    fn consumes_inputs(&self) -> bool {
        true
    }

    /// Compute the output from the inputs, given in [`DerivationRule::inputs`] order
    fn apply(&self, inputs: &[&RasterMessage], key: TimestepKey) -> RasterMessage;
}

/// 10 metre wind speed from its eastward and northward components
#[derive(Debug, Clone)]
pub struct WindSpeed {
    inputs: [VariableCode; 2],
}

impl Default for WindSpeed {
    fn default() -> Self {
        Self {
            inputs: [VariableCode::WindU, VariableCode::WindV],
        }
    }
}

impl DerivationRule for WindSpeed {
    fn inputs(&self) -> &[VariableCode] {
        &self.inputs
    }

    fn output(&self) -> VariableCode {
        VariableCode::WindSpeed
    }

    fn apply(&self, inputs: &[&RasterMessage], key: TimestepKey) -> RasterMessage {
        let (u, v) = (inputs[0], inputs[1]);
        let speed = Zip::from(&u.values)
            .and(&v.values)
            .map_collect(|&u, &v| (u * u + v * v).sqrt());
        derived(self.output(), speed, combined_validity(inputs), key, u)
    }
}

/// Snow depth clamped to zero; negative depths are a source artifact
#[derive(Debug, Clone)]
pub struct SnowDepthFloor {
    inputs: [VariableCode; 1],
}

impl Default for SnowDepthFloor {
    fn default() -> Self {
        Self {
            inputs: [VariableCode::SnowDepth],
        }
    }
}

impl DerivationRule for SnowDepthFloor {
    fn inputs(&self) -> &[VariableCode] {
        &self.inputs
    }

    fn output(&self) -> VariableCode {
        VariableCode::SnowDepth
    }

    fn apply(&self, inputs: &[&RasterMessage], key: TimestepKey) -> RasterMessage {
        let depth = inputs[0];
        // NaN stays NaN; the validity mask is taken before clamping so a
        // negative sentinel never turns into a valid zero
        let clamped = depth.values.mapv(|x| if x < 0.0 { 0.0 } else { x });
        derived(self.output(), clamped, depth.validity_mask(), key, depth)
    }
}

fn combined_validity(inputs: &[&RasterMessage]) -> Array2<bool> {
    let mut masks = inputs.iter().map(|m| m.validity_mask());
    let mut mask = masks.next().unwrap_or_default();
    for other in masks {
        Zip::from(&mut mask).and(&other).for_each(|m, &o| *m &= o);
    }
    mask
}

fn derived(
    variable: VariableCode,
    values: Array2<f64>,
    validity: Array2<bool>,
    key: TimestepKey,
    template: &RasterMessage,
) -> RasterMessage {
    RasterMessage {
        variable,
        values,
        missing_value: None,
        validity: Some(validity),
        valid_time: key.valid_time,
        forecast_step: key.forecast_step,
        level: template.level,
        units: template.units.clone(),
    }
}

/// Ordered list of derivation rules
pub struct Derivations {
    rules: Vec<Box<dyn DerivationRule>>,
}

impl Default for Derivations {
    fn default() -> Self {
        Self::standard()
    }
}

impl Derivations {
    /// No rules; every variable passes through unchanged
    #[must_use]
    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    /// Wind speed from components, then the snow depth floor
    #[must_use]
    pub fn standard() -> Self {
        Self::none()
            .with_rule(WindSpeed::default())
            .with_rule(SnowDepthFloor::default())
    }

    #[must_use]
    pub fn with_rule(mut self, rule: impl DerivationRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every applicable rule to the set in order
    pub fn apply(&self, set: &mut VariableSet) {
        for rule in &self.rules {
            let codes = rule.inputs();
            if codes.is_empty() {
                continue;
            }
            let Some(inputs) = codes.iter().map(|c| set.get(c)).collect::<Option<Vec<_>>>() else {
                continue;
            };

            let shape = inputs[0].shape();
            if let Some(odd) = inputs.iter().find(|m| m.shape() != shape) {
                log::warn!(
                    "Skipping derivation of '{}' at {}: '{}' has shape {:?}, expected {:?}",
                    rule.output(),
                    set.key,
                    odd.variable,
                    odd.shape(),
                    shape
                );
                continue;
            }

            let output = rule.apply(&inputs, set.key);
            if rule.consumes_inputs() {
                for code in codes {
                    set.take(code);
                }
            }
            set.insert(output);
        }
    }
}
