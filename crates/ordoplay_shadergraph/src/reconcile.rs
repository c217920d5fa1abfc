// SPDX-License-Identifier: MIT OR Apache-2.0
//! Slot/parameter reconciliation.
//!
//! When a node's type definition changes, its stored slots and parameters
//! are rebuilt from the new definition. Entries whose id survives copy their
//! stored value forward; entries whose id disappeared are dropped with a
//! warning.

use crate::parameter::Parameter;
use crate::port::{Slot, SlotId};
use std::collections::HashSet;
use std::fmt;

/// Something identified by a node-local id that can inherit stored values
pub trait Reconcilable {
    /// Node-local id
    fn id(&self) -> SlotId;
    /// Take over the stored value of the previous instance with the same id
    fn copy_values_from(&mut self, previous: &Self);
}

impl Reconcilable for Slot {
    fn id(&self) -> SlotId {
        self.id
    }

    fn copy_values_from(&mut self, previous: &Self) {
        Slot::copy_values_from(self, previous);
    }
}

impl Reconcilable for Parameter {
    fn id(&self) -> SlotId {
        self.id
    }

    fn copy_values_from(&mut self, previous: &Self) {
        Parameter::copy_values_from(self, previous);
    }
}

/// What kind of entry a stale identifier belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    /// A slot
    Slot,
    /// A parameter
    Parameter,
}

/// An id removed because the new definition no longer declares it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaleIdentifierRemoved {
    /// Entry kind
    pub kind: IdentifierKind,
    /// Removed id
    pub id: SlotId,
}

impl fmt::Display for StaleIdentifierRemoved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            IdentifierKind::Slot => write!(f, "Removing invalid slot: {}", self.id),
            IdentifierKind::Parameter => write!(f, "Removing invalid parameter: {}", self.id),
        }
    }
}

/// Outcome of a reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// New slots, in the order the definition declares them
    pub slots: Vec<Slot>,
    /// New parameters, in the order the definition declares them
    pub parameters: Vec<Parameter>,
    /// Ids dropped because the definition no longer declares them
    pub removed: Vec<StaleIdentifierRemoved>,
}

impl Reconciliation {
    /// Ids of removed slots
    pub fn removed_slot_ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.removed
            .iter()
            .filter(|r| r.kind == IdentifierKind::Slot)
            .map(|r| r.id)
    }
}

/// Rebuild slots and parameters from their desired definitions.
///
/// `desired_*` hold freshly constructed entries carrying the definition's
/// defaults. Retained ids then copy their stored value from `current_*`, so
/// copy-forward always overrides the defaults. With `suppress_warnings` the
/// removals are still reported in the result but not logged.
pub fn reconcile(
    current_slots: &[Slot],
    current_parameters: &[Parameter],
    desired_slots: Vec<Slot>,
    desired_parameters: Vec<Parameter>,
    suppress_warnings: bool,
) -> Reconciliation {
    let mut removed = Vec::new();
    let slots = reconcile_entries(
        current_slots,
        desired_slots,
        IdentifierKind::Slot,
        suppress_warnings,
        &mut removed,
    );
    let parameters = reconcile_entries(
        current_parameters,
        desired_parameters,
        IdentifierKind::Parameter,
        suppress_warnings,
        &mut removed,
    );

    Reconciliation {
        slots,
        parameters,
        removed,
    }
}

fn reconcile_entries<T: Reconcilable>(
    current: &[T],
    desired: Vec<T>,
    kind: IdentifierKind,
    suppress_warnings: bool,
    removed: &mut Vec<StaleIdentifierRemoved>,
) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(desired.len());

    for mut entry in desired {
        if !seen.insert(entry.id()) {
            tracing::warn!("Ignoring repeated {kind:?} id {} in definition", entry.id());
            continue;
        }
        if let Some(previous) = current.iter().find(|c| c.id() == entry.id()) {
            entry.copy_values_from(previous);
        }
        result.push(entry);
    }

    for stale in current.iter().filter(|c| !seen.contains(&c.id())) {
        let stale = StaleIdentifierRemoved { kind, id: stale.id() };
        if !suppress_warnings {
            tracing::warn!("{stale}");
        }
        removed.push(stale);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;
    use crate::port::{ConcreteValueType, ShaderValue};
    use std::collections::BTreeSet;

    fn slots(ids: &[u32]) -> Vec<Slot> {
        ids.iter()
            .map(|id| Slot::input(SlotId(*id), format!("S{id}"), ShaderValue::Vector1(0.5)))
            .collect()
    }

    #[test]
    fn test_retained_values_survive() {
        let mut current = slots(&[0, 1]);
        current[0].value = ShaderValue::Vector1(3.0);
        current[1].value = ShaderValue::Vector1(4.0);

        let result = reconcile(&current, &[], slots(&[0, 1, 2]), Vec::new(), false);

        assert_eq!(result.slots[0].value, ShaderValue::Vector1(3.0));
        assert_eq!(result.slots[1].value, ShaderValue::Vector1(4.0));
        // New id gets the definition default
        assert_eq!(result.slots[2].value, ShaderValue::Vector1(0.5));
        assert!(result.removed.is_empty());
    }

    #[test]
    fn test_id_set_matches_desired() {
        let current = slots(&[0, 1, 5]);
        let result = reconcile(&current, &[], slots(&[1, 2]), Vec::new(), false);

        let ids: BTreeSet<_> = result.slots.iter().map(|s| s.id).collect();
        assert_eq!(ids, BTreeSet::from([SlotId(1), SlotId(2)]));

        let removed: Vec<_> = result.removed_slot_ids().collect();
        assert_eq!(removed, vec![SlotId(0), SlotId(5)]);
    }

    #[test]
    fn test_parameters_reconciled_separately() {
        let owner = NodeId::new();
        let mut current = vec![Parameter::new(SlotId(7), "Scale", ShaderValue::Vector1(1.0), owner)];
        current[0].value = ShaderValue::Vector1(9.0);

        let desired = vec![
            Parameter::new(SlotId(7), "Scale", ShaderValue::Vector1(1.0), owner),
            Parameter::new(SlotId(8), "Bias", ShaderValue::Vector1(0.0), owner),
        ];
        let result = reconcile(&[], &current, Vec::new(), desired, false);

        assert_eq!(result.parameters.len(), 2);
        assert_eq!(result.parameters[0].value, ShaderValue::Vector1(9.0));
        assert!(result.removed.is_empty());

        let result = reconcile(&[], &result.parameters, Vec::new(), Vec::new(), true);
        assert!(result.parameters.is_empty());
        assert_eq!(result.removed.len(), 2);
        assert!(result.removed.iter().all(|r| r.kind == IdentifierKind::Parameter));
    }

    #[test]
    fn test_type_change_keeps_new_default() {
        let mut current = slots(&[0]);
        current[0].value = ShaderValue::Vector1(2.0);
        let desired = vec![Slot::output(SlotId(0), "Out", ConcreteValueType::Vector3)];

        let result = reconcile(&current, &[], desired, Vec::new(), false);
        assert_eq!(result.slots[0].value, ShaderValue::Vector3([0.0; 3]));
    }

    #[test]
    fn test_stale_message_names_id() {
        let stale = StaleIdentifierRemoved {
            kind: IdentifierKind::Slot,
            id: SlotId(1),
        };
        assert_eq!(stale.to_string(), "Removing invalid slot: 1");
    }
}
