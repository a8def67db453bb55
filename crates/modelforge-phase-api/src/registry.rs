use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use modelforge_utils::error::PhaseError;
use modelforge_utils::types::Phase;

use crate::{ModelVisitor, PhaseAction};

/// An action as stored in a registry.
#[derive(Clone)]
pub enum RegisteredAction {
    Global(Arc<dyn PhaseAction>),
    Visiting(Arc<dyn ModelVisitor>),
}

impl RegisteredAction {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Global(action) => action.name(),
            Self::Visiting(visitor) => visitor.name(),
        }
    }
}

impl fmt::Debug for RegisteredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global(action) => f.debug_tuple("Global").field(&action.name()).finish(),
            Self::Visiting(visitor) => f.debug_tuple("Visiting").field(&visitor.name()).finish(),
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    phase: Phase,
    actions: Vec<RegisteredAction>,
}

/// Actions keyed by phase number.
///
/// Several actions may share a number; they run in registration order. The
/// first registration at a number fixes the phase name.
#[derive(Debug, Clone, Default)]
pub struct PhaseRegistry {
    slots: BTreeMap<u32, Slot>,
}

impl PhaseRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a whole-graph action to `phase`.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::ReservedPhase`] for phase `0`.
    pub fn register<A>(&mut self, phase: Phase, action: A) -> Result<(), PhaseError>
    where
        A: PhaseAction + 'static,
    {
        self.register_action(phase, RegisteredAction::Global(Arc::new(action)))
    }

    /// Bind a per-object visitor to `phase`.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::ReservedPhase`] for phase `0`.
    pub fn register_visitor<V>(&mut self, phase: Phase, visitor: V) -> Result<(), PhaseError>
    where
        V: ModelVisitor + 'static,
    {
        self.register_action(phase, RegisteredAction::Visiting(Arc::new(visitor)))
    }

    /// # Errors
    ///
    /// Returns [`PhaseError::ReservedPhase`] for phase `0`.
    pub fn register_action(
        &mut self,
        phase: Phase,
        action: RegisteredAction,
    ) -> Result<(), PhaseError> {
        if phase.number() == Phase::CREATE.number() {
            return Err(PhaseError::ReservedPhase {
                number: phase.number(),
            });
        }
        self.slots
            .entry(phase.number())
            .or_insert_with(|| Slot {
                phase,
                actions: Vec::new(),
            })
            .actions
            .push(action);
        Ok(())
    }

    /// Actions bound to `number`, in registration order.
    #[must_use]
    pub fn actions(&self, number: u32) -> &[RegisteredAction] {
        self.slots
            .get(&number)
            .map(|slot| slot.actions.as_slice())
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn phase(&self, number: u32) -> Option<&Phase> {
        self.slots.get(&number).map(|slot| &slot.phase)
    }

    /// Registered phases in ascending order.
    pub fn phases(&self) -> impl Iterator<Item = &Phase> {
        self.slots.values().map(|slot| &slot.phase)
    }

    /// Smallest registered phase number strictly after `cursor`
    /// (or the smallest overall when `cursor` is `None`).
    #[must_use]
    pub fn next_after(&self, cursor: Option<u32>) -> Option<u32> {
        match cursor {
            None => self.slots.keys().next().copied(),
            Some(n) => self
                .slots
                .range(n.saturating_add(1)..)
                .next()
                .map(|(k, _)| *k)
                .filter(|k| *k > n),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }
}
