//! Introspection of rule graphs.
//!
//! [`describe_mapping`] walks a mapping through its structure and guard
//! without evaluating anything, producing a serializable tree suitable for
//! `sdm describe` or a debugging endpoint.

use serde::{Deserialize, Serialize};

use crate::mapping::{CompositionStyle, GuardedBody, Mapping, PredicateCost};

/// Static description of one node in a rule graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDescription {
    pub name: String,
    /// Composition style, for composite mappings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<CompositionStyle>,
    pub cost: PredicateCost,
    /// Guard of a guarded rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Box<MappingDescription>>,
    /// Set when a passing guard halts the enclosing rule set.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub halts: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<MappingDescription>,
}

/// Describe `mapping` and everything it is composed of.
pub fn describe_mapping<V>(mapping: &dyn Mapping<V>) -> MappingDescription {
    let mut description = MappingDescription {
        name: mapping.name(),
        style: None,
        cost: mapping.cost(),
        guard: None,
        halts: false,
        components: Vec::new(),
    };

    if let Some(structure) = mapping.structure() {
        description.style = Some(structure.style);
        description.components = structure
            .components
            .iter()
            .map(|component| describe_mapping(component.as_ref()))
            .collect();
    }

    if let Some(guarded) = mapping.guarded() {
        description.guard = Some(Box::new(describe_mapping(guarded.guard)));
        match guarded.body {
            GuardedBody::Value(_) => {}
            GuardedBody::Rules(rules) => description.components.push(describe_mapping(rules)),
            GuardedBody::Halt => description.halts = true,
        }
    }

    description
}
