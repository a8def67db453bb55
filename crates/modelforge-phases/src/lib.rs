//! Built-in lifecycle phases
//!
//! Each phase is a [`ModelVisitor`](modelforge_phase_api::ModelVisitor) run
//! over every object reachable from the build root:
//!
//! | Phase | Visitor |
//! |-------|---------|
//! | auto-create (100) | [`AutoCreatePhase`] |
//! | owner (200) | [`OwnerPhase`] |
//! | link (300) | [`LinkPhase`] |
//! | default (400) | [`DefaultPhase`] |
//! | post-process (500) | [`PostProcessPhase`] |
//! | complete (700) | [`CompletePhase`] |
//!
//! Validation (600) lives in `modelforge-validation`.

mod autocreate;
mod defaults;
mod lifecycle;
mod link;
mod owner;

pub use autocreate::AutoCreatePhase;
pub use defaults::DefaultPhase;
pub use lifecycle::{CompletePhase, PostProcessPhase};
pub use link::LinkPhase;
pub use owner::OwnerPhase;

use modelforge_phase_api::PhaseRegistry;
use modelforge_utils::error::PhaseError;
use modelforge_utils::types::Phase;

/// Register every phase of this crate at its standard number.
///
/// # Errors
///
/// Never fails for the standard numbers; the `Result` mirrors
/// [`PhaseRegistry::register_visitor`].
pub fn register_builtin(registry: &mut PhaseRegistry) -> Result<(), PhaseError> {
    registry.register_visitor(Phase::AUTO_CREATE, AutoCreatePhase::new())?;
    registry.register_visitor(Phase::OWNER, OwnerPhase::new())?;
    registry.register_visitor(Phase::LINK, LinkPhase::new())?;
    registry.register_visitor(Phase::DEFAULT, DefaultPhase::new())?;
    registry.register_visitor(Phase::POST_PROCESS, PostProcessPhase::new())?;
    registry.register_visitor(Phase::COMPLETE, CompletePhase::new())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_builtin_numbers() {
        let mut registry = PhaseRegistry::new();
        register_builtin(&mut registry).unwrap();
        let numbers: Vec<u32> = registry.phases().map(Phase::number).collect();
        assert_eq!(numbers, vec![100, 200, 300, 400, 500, 700]);
        assert_eq!(registry.actions(200)[0].name(), "assign-owners");
    }
}
