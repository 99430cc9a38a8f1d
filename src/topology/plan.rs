//! Planning of partition function and scheme changes.
//!
//! Planning is a pure function of what the catalog holds and what is wanted, so it
//! can be inspected (`partkeeper plan`) and tested without an engine.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::engine::{PartitionFunctionDef, PartitionSchemeDef};

/// Partition objects as currently found in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentTopology {
    pub function: Option<PartitionFunctionDef>,
    pub scheme: Option<PartitionSchemeDef>,
}

/// The partition function and scheme that should exist after a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesiredTopology {
    pub function_name: String,
    pub scheme_name: String,
    pub placement: String,
    pub boundaries: Vec<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TopologyStep {
    DropScheme {
        name: String,
    },
    DropFunction {
        name: String,
    },
    CreateFunction {
        name: String,
        boundaries: Vec<NaiveDateTime>,
    },
    CreateScheme {
        name: String,
        function: String,
        placement: String,
    },
}

/// Ordered steps turning the current topology into the desired one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyPlan {
    steps: Vec<TopologyStep>,
}

impl TopologyPlan {
    /// Existing objects carrying the desired names are always dropped and recreated,
    /// even when they already match. Drops run scheme first, creates function first.
    pub fn between(current: &CurrentTopology, desired: &DesiredTopology) -> Self {
        let mut steps = Vec::with_capacity(4);

        if let Some(scheme) = &current.scheme {
            steps.push(TopologyStep::DropScheme {
                name: scheme.name.clone(),
            });
        }
        if let Some(function) = &current.function {
            steps.push(TopologyStep::DropFunction {
                name: function.name.clone(),
            });
        }
        steps.push(TopologyStep::CreateFunction {
            name: desired.function_name.clone(),
            boundaries: desired.boundaries.clone(),
        });
        steps.push(TopologyStep::CreateScheme {
            name: desired.scheme_name.clone(),
            function: desired.function_name.clone(),
            placement: desired.placement.clone(),
        });

        Self { steps }
    }

    pub fn steps(&self) -> &[TopologyStep] {
        &self.steps
    }

    /// Whether the current objects already match the desired ones.
    pub fn is_noop_rebuild(current: &CurrentTopology, desired: &DesiredTopology) -> bool {
        let function_matches = current.function.as_ref().is_some_and(|f| {
            f.name == desired.function_name && f.boundaries == desired.boundaries
        });
        let scheme_matches = current.scheme.as_ref().is_some_and(|s| {
            s.name == desired.scheme_name
                && s.function == desired.function_name
                && s.placement == desired.placement
        });
        function_matches && scheme_matches
    }
}
