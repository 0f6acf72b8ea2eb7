//! Dependency resolver
//!
//! A static prerequisite table evaluated against a probe snapshot. All
//! functions here are pure: no remote calls, no shared state.

use serde::Serialize;

use crate::catalog::{StackId, Unit, UnitKind};
use crate::errors::OrchestratorError;
use crate::probe::Snapshot;

/// Direct prerequisites per unit; must stay acyclic
const DEPENDENCIES: &[(Unit, &[Unit])] = &[
    (Unit::Docker, &[]),
    (Unit::Swarm, &[Unit::Docker]),
    (Unit::Network, &[Unit::Swarm]),
    (Unit::Ctop, &[Unit::Docker]),
    (Unit::Traefik, &[Unit::Network]),
    (Unit::Portainer, &[Unit::Traefik]),
    (Unit::Redis, &[Unit::Traefik]),
    (Unit::Postgres, &[Unit::Traefik]),
    (Unit::Rabbitmq, &[Unit::Traefik]),
    (Unit::Minio, &[Unit::Traefik]),
    (Unit::Baserow, &[Unit::Postgres]),
    (Unit::N8n, &[Unit::Redis, Unit::Postgres]),
    (Unit::Chatwoot, &[Unit::Redis, Unit::Postgres, Unit::Minio]),
];

pub fn direct_prerequisites(unit: Unit) -> &'static [Unit] {
    DEPENDENCIES
        .iter()
        .find(|(u, _)| *u == unit)
        .map(|(_, deps)| *deps)
        .unwrap_or(&[])
}

/// Longest path from `unit` down to a unit with no prerequisites
pub fn depth(unit: Unit) -> usize {
    direct_prerequisites(unit)
        .iter()
        .map(|&dep| depth(dep) + 1)
        .max()
        .unwrap_or(0)
}

/// Transitive prerequisites, nearest the root first
///
/// Units at the same depth keep catalog declaration order.
pub fn prerequisites(unit: Unit) -> Vec<Unit> {
    let mut closure = Vec::new();
    collect(unit, &mut closure);
    closure.sort_by_key(|&dep| (depth(dep), declaration_index(dep)));
    closure
}

fn collect(unit: Unit, closure: &mut Vec<Unit>) {
    for &dep in direct_prerequisites(unit) {
        if !closure.contains(&dep) {
            closure.push(dep);
            collect(dep, closure);
        }
    }
}

fn declaration_index(unit: Unit) -> usize {
    Unit::ALL
        .iter()
        .position(|&u| u == unit)
        .unwrap_or(usize::MAX)
}

/// Outcome of evaluating one unit against a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub enabled: bool,

    /// Empty when enabled
    pub reason: String,
}

impl Evaluation {
    fn enabled() -> Self {
        Self {
            enabled: true,
            reason: String::new(),
        }
    }

    pub fn blocked_by(dep: Unit) -> Self {
        Self {
            enabled: false,
            reason: format!("Requires {} to be installed first", dep.display_name()),
        }
    }

    /// Turn a blocked evaluation into a precondition error
    pub fn into_result(self) -> Result<(), OrchestratorError> {
        if self.enabled {
            Ok(())
        } else {
            Err(OrchestratorError::PreconditionError(self.reason))
        }
    }
}

/// Whether `unit` may be installed given `snapshot`
///
/// Reports only the first unmet prerequisite, nearest the root.
pub fn evaluate(unit: Unit, snapshot: &Snapshot) -> Evaluation {
    prerequisites(unit)
        .into_iter()
        .find(|&dep| !snapshot.is_satisfied(dep))
        .map(Evaluation::blocked_by)
        .unwrap_or_else(Evaluation::enabled)
}

/// One row of the dependency lattice for a given snapshot
#[derive(Debug, Clone, Serialize)]
pub struct UnitState {
    pub unit: &'static str,
    pub service_key: &'static str,
    pub installed: bool,
    pub enabled: bool,
    pub reason: String,
}

/// Evaluate every unit against `snapshot`
pub fn lattice(snapshot: &Snapshot) -> Vec<UnitState> {
    Unit::ALL
        .into_iter()
        .map(|unit| {
            let evaluation = evaluate(unit, snapshot);
            UnitState {
                unit: unit.display_name(),
                service_key: unit.service_key(),
                installed: snapshot.is_satisfied(unit),
                enabled: evaluation.enabled,
                reason: evaluation.reason,
            }
        })
        .collect()
}

/// Static description of a unit, independent of any host
#[derive(Debug, Clone, Serialize)]
pub struct UnitInfo {
    pub unit: &'static str,
    pub service_key: &'static str,
    pub kind: UnitKind,
    pub stacks: Vec<&'static str>,
    pub requires: Vec<&'static str>,
    pub parameters: &'static [&'static str],
}

pub fn catalog() -> Vec<UnitInfo> {
    Unit::ALL
        .into_iter()
        .map(|unit| UnitInfo {
            unit: unit.display_name(),
            service_key: unit.service_key(),
            kind: unit.kind(),
            stacks: unit.stacks().iter().map(|s| StackId::name(*s)).collect(),
            requires: direct_prerequisites(unit)
                .iter()
                .map(|dep| dep.service_key())
                .collect(),
            parameters: unit.required_params(),
        })
        .collect()
}
