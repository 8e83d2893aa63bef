//! Physics index registry: dense slot layout for a variable equation set.
//!
//! A simulation may conserve mass for up to three fluid phases and,
//! optionally, a solvent component, a polymer component, and energy.
//! Which of these are present is fixed at configuration time, and the
//! active equations must be packed into contiguous array slots so that
//! primary-variable vectors and defect rows stay dense.
//!
//! The registry is built once from [`FeatureFlags`] and is immutable
//! afterwards; all other components share it read-only (typically behind
//! an `Arc`). Slots of disabled features are a distinguished sentinel —
//! asking for their index is a programming error and fails fast rather
//! than silently aliasing an unrelated equation.
//!
//! Variable slot layout, starting at the base offset:
//!
//! ```text
//! [ saturations of the first n_active-1 phases | pressure | solvent | polymer | temperature ]
//! ```
//!
//! Equation slot layout (same width — one equation per variable):
//!
//! ```text
//! [ continuity of each active phase | solvent | polymer | energy ]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Phases
// =============================================================================

/// Number of canonical fluid phases.
pub const NUM_CANONICAL_PHASES: usize = 3;

/// Canonical fluid phases.
///
/// The canonical ordering (oil = 0, water = 1, gas = 2) is fixed; the
/// *active* ordering compacts it when some phases are absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Oil phase (canonical index 0)
    Oil,
    /// Water phase (canonical index 1)
    Water,
    /// Gas phase (canonical index 2)
    Gas,
}

impl Phase {
    /// All canonical phases in canonical order.
    pub const ALL: [Phase; NUM_CANONICAL_PHASES] = [Phase::Oil, Phase::Water, Phase::Gas];

    /// The canonical index of this phase.
    #[inline]
    pub const fn canonical(self) -> usize {
        match self {
            Phase::Oil => 0,
            Phase::Water => 1,
            Phase::Gas => 2,
        }
    }

    /// Phase from a canonical index.
    ///
    /// # Panics
    /// Panics if `idx >= 3`.
    pub fn from_canonical(idx: usize) -> Phase {
        match idx {
            0 => Phase::Oil,
            1 => Phase::Water,
            2 => Phase::Gas,
            _ => panic!("canonical phase index {idx} out of range"),
        }
    }

    /// Human-readable phase name.
    pub fn name(self) -> &'static str {
        match self {
            Phase::Oil => "oil",
            Phase::Water => "water",
            Phase::Gas => "gas",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Slots
// =============================================================================

/// A variable or equation slot: a valid dense offset, or the disabled sentinel.
///
/// Reading a disabled slot's index is a configuration error, so
/// [`Slot::expect`] panics with the role name instead of returning a
/// wrong offset. Code that legitimately skips disabled features uses
/// [`Slot::get`] and ignores `None`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot(Option<usize>);

impl Slot {
    /// An active slot at the given offset.
    #[inline]
    pub const fn active(idx: usize) -> Self {
        Slot(Some(idx))
    }

    /// The disabled sentinel.
    #[inline]
    pub const fn disabled() -> Self {
        Slot(None)
    }

    /// Whether the slot is active.
    #[inline]
    pub fn is_active(self) -> bool {
        self.0.is_some()
    }

    /// The offset, or `None` when disabled.
    #[inline]
    pub fn get(self) -> Option<usize> {
        self.0
    }

    /// The offset of a slot that must be active.
    ///
    /// # Panics
    /// Panics with the role name if the slot is disabled.
    #[inline]
    #[track_caller]
    pub fn expect(self, role: &str) -> usize {
        match self.0 {
            Some(idx) => idx,
            None => panic!("slot for disabled feature '{role}' requested"),
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(idx) => write!(f, "Slot({idx})"),
            None => f.write_str("Slot(disabled)"),
        }
    }
}

// =============================================================================
// Feature flags
// =============================================================================

/// Enabled-feature flags, fixed for the lifetime of a simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Oil phase present
    pub oil: bool,
    /// Water phase present
    pub water: bool,
    /// Gas phase present
    pub gas: bool,
    /// Solvent component conserved
    pub solvent: bool,
    /// Polymer component conserved
    pub polymer: bool,
    /// Energy conserved
    pub energy: bool,
}

impl FeatureFlags {
    /// Single-phase configuration (one phase, no extras).
    pub fn single_phase(phase: Phase) -> Self {
        let mut flags = Self {
            oil: false,
            water: false,
            gas: false,
            solvent: false,
            polymer: false,
            energy: false,
        };
        match phase {
            Phase::Oil => flags.oil = true,
            Phase::Water => flags.water = true,
            Phase::Gas => flags.gas = true,
        }
        flags
    }

    /// Two-phase configuration with the given canonical phase absent.
    pub fn two_phase(disabled: Phase) -> Self {
        let mut flags = Self::all_phases();
        match disabled {
            Phase::Oil => flags.oil = false,
            Phase::Water => flags.water = false,
            Phase::Gas => flags.gas = false,
        }
        flags
    }

    /// Three-phase configuration, no extras.
    pub fn all_phases() -> Self {
        Self {
            oil: true,
            water: true,
            gas: true,
            solvent: false,
            polymer: false,
            energy: false,
        }
    }

    /// Enable the solvent component.
    pub fn with_solvent(mut self) -> Self {
        self.solvent = true;
        self
    }

    /// Enable the polymer component.
    pub fn with_polymer(mut self) -> Self {
        self.polymer = true;
        self
    }

    /// Enable energy conservation.
    pub fn with_energy(mut self) -> Self {
        self.energy = true;
        self
    }

    /// Whether a canonical phase is present.
    #[inline]
    pub fn phase_enabled(&self, phase: Phase) -> bool {
        match phase {
            Phase::Oil => self.oil,
            Phase::Water => self.water,
            Phase::Gas => self.gas,
        }
    }

    /// Number of active phases.
    pub fn num_phases(&self) -> usize {
        self.oil as usize + self.water as usize + self.gas as usize
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Immutable mapping from symbolic variable/equation roles to dense slots.
///
/// Construction is the only place mutation occurs; afterwards the
/// registry is shared read-only by the local residual, the assembler and
/// the time-step engine.
///
/// # Example
///
/// ```
/// use boxflow::model::{FeatureFlags, Phase, PhysicsIndexRegistry};
///
/// let flags = FeatureFlags::two_phase(Phase::Gas).with_energy();
/// let registry = PhysicsIndexRegistry::new(flags, 0);
///
/// assert_eq!(registry.num_eq(), 3); // 2 continuity + energy
/// assert_eq!(registry.pressure_idx(), 1);
/// assert!(registry.solvent_saturation_idx().get().is_none());
/// assert_eq!(registry.temperature_idx().expect("temperature"), 2);
/// ```
#[derive(Clone, Debug)]
pub struct PhysicsIndexRegistry {
    flags: FeatureFlags,
    base_offset: usize,
    num_eq: usize,

    // canonical <-> active phase translation tables
    active_of_canonical: [Option<usize>; NUM_CANONICAL_PHASES],
    canonical_of_active: Vec<usize>,

    // primary variable slots
    saturation: Vec<usize>,
    pressure: usize,
    solvent_saturation: Slot,
    polymer_concentration: Slot,
    temperature: Slot,

    // equation slots
    conti_eq: Vec<usize>,
    solvent_eq: Slot,
    polymer_eq: Slot,
    energy_eq: Slot,
}

impl PhysicsIndexRegistry {
    /// Build the registry for a feature configuration.
    ///
    /// `base_offset` shifts every slot; it is zero for a standalone model
    /// and nonzero when the equation set is embedded into a larger
    /// coupled system.
    ///
    /// # Panics
    /// Panics if no phase is enabled.
    pub fn new(flags: FeatureFlags, base_offset: usize) -> Self {
        let num_phases = flags.num_phases();
        assert!(num_phases > 0, "at least one fluid phase must be enabled");

        let mut active_of_canonical = [None; NUM_CANONICAL_PHASES];
        let mut canonical_of_active = Vec::with_capacity(num_phases);
        for phase in Phase::ALL {
            if flags.phase_enabled(phase) {
                active_of_canonical[phase.canonical()] = Some(canonical_of_active.len());
                canonical_of_active.push(phase.canonical());
            }
        }

        let num_solvents = flags.solvent as usize;
        let num_polymers = flags.polymer as usize;
        let num_energy = flags.energy as usize;
        let num_eq = num_phases + num_solvents + num_polymers + num_energy;

        // Variable slots: n-1 saturations, then pressure, then the extras.
        let saturation: Vec<usize> = (0..num_phases - 1).map(|k| base_offset + k).collect();
        let pressure = base_offset + num_phases - 1;

        let mut tail = base_offset + num_phases;
        let mut take = |enabled: bool| {
            if enabled {
                let slot = Slot::active(tail);
                tail += 1;
                slot
            } else {
                Slot::disabled()
            }
        };
        let solvent_saturation = take(flags.solvent);
        let polymer_concentration = take(flags.polymer);
        let temperature = take(flags.energy);
        debug_assert_eq!(tail, base_offset + num_eq);

        // Equation slots: one continuity equation per active phase, then
        // the extras at the same tail offsets as their variables.
        let conti_eq: Vec<usize> = (0..num_phases).map(|k| base_offset + k).collect();
        let solvent_eq = solvent_saturation;
        let polymer_eq = polymer_concentration;
        let energy_eq = temperature;

        Self {
            flags,
            base_offset,
            num_eq,
            active_of_canonical,
            canonical_of_active,
            saturation,
            pressure,
            solvent_saturation,
            polymer_concentration,
            temperature,
            conti_eq,
            solvent_eq,
            polymer_eq,
            energy_eq,
        }
    }

    /// The feature configuration this registry was built from.
    #[inline]
    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    /// Base offset of the first slot.
    #[inline]
    pub fn base_offset(&self) -> usize {
        self.base_offset
    }

    /// Number of equations (== number of primary variables).
    #[inline]
    pub fn num_eq(&self) -> usize {
        self.num_eq
    }

    /// Number of active phases.
    #[inline]
    pub fn num_phases(&self) -> usize {
        self.canonical_of_active.len()
    }

    // -------------------------------------------------------------------------
    // Primary variable slots
    // -------------------------------------------------------------------------

    /// Slot of the pressure primary variable (always active).
    #[inline]
    pub fn pressure_idx(&self) -> usize {
        self.pressure
    }

    /// Saturation slot of the k-th active phase.
    ///
    /// Only the first `num_phases() - 1` saturations are primary
    /// variables; the last one is implied by the closure relation, so its
    /// slot is the disabled sentinel.
    pub fn saturation_idx(&self, active_phase: usize) -> Slot {
        assert!(
            active_phase < self.num_phases(),
            "active phase index {active_phase} out of range ({} phases)",
            self.num_phases()
        );
        match self.saturation.get(active_phase) {
            Some(&idx) => Slot::active(idx),
            None => Slot::disabled(),
        }
    }

    /// Slot of the solvent saturation, or the sentinel if solvent is disabled.
    #[inline]
    pub fn solvent_saturation_idx(&self) -> Slot {
        self.solvent_saturation
    }

    /// Slot of the polymer concentration, or the sentinel if polymer is disabled.
    #[inline]
    pub fn polymer_concentration_idx(&self) -> Slot {
        self.polymer_concentration
    }

    /// Slot of the temperature, or the sentinel if energy is disabled.
    #[inline]
    pub fn temperature_idx(&self) -> Slot {
        self.temperature
    }

    // -------------------------------------------------------------------------
    // Equation slots
    // -------------------------------------------------------------------------

    /// Slot of the continuity equation of the k-th active phase.
    ///
    /// # Panics
    /// Panics if `active_phase >= num_phases()`.
    #[inline]
    pub fn conti_eq_idx(&self, active_phase: usize) -> usize {
        self.conti_eq[active_phase]
    }

    /// Slot of the solvent continuity equation.
    #[inline]
    pub fn solvent_eq_idx(&self) -> Slot {
        self.solvent_eq
    }

    /// Slot of the polymer continuity equation.
    #[inline]
    pub fn polymer_eq_idx(&self) -> Slot {
        self.polymer_eq
    }

    /// Slot of the energy conservation equation.
    #[inline]
    pub fn energy_eq_idx(&self) -> Slot {
        self.energy_eq
    }

    // -------------------------------------------------------------------------
    // Canonical <-> active phase translation
    // -------------------------------------------------------------------------

    /// Translate a canonical phase index to the compacted active index.
    ///
    /// # Panics
    /// Panics if the canonical phase is disabled in this configuration.
    #[inline]
    #[track_caller]
    pub fn canonical_to_active(&self, canonical: usize) -> usize {
        match self.active_of_canonical[canonical] {
            Some(active) => active,
            None => panic!(
                "phase '{}' is disabled in this configuration",
                Phase::from_canonical(canonical).name()
            ),
        }
    }

    /// Translate an active phase index back to its canonical index.
    ///
    /// # Panics
    /// Panics if `active >= num_phases()`.
    #[inline]
    pub fn active_to_canonical(&self, active: usize) -> usize {
        self.canonical_of_active[active]
    }

    /// Whether a canonical phase is active.
    #[inline]
    pub fn phase_active(&self, phase: Phase) -> bool {
        self.active_of_canonical[phase.canonical()].is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Every configuration with at least one phase.
    fn all_phase_configs() -> Vec<FeatureFlags> {
        let mut configs = Vec::new();
        for oil in [false, true] {
            for water in [false, true] {
                for gas in [false, true] {
                    if oil || water || gas {
                        configs.push(FeatureFlags {
                            oil,
                            water,
                            gas,
                            solvent: false,
                            polymer: false,
                            energy: false,
                        });
                    }
                }
            }
        }
        configs
    }

    #[test]
    fn test_phase_translation_roundtrip() {
        for flags in all_phase_configs() {
            let registry = PhysicsIndexRegistry::new(flags, 0);
            for active in 0..registry.num_phases() {
                let canonical = registry.active_to_canonical(active);
                assert_eq!(
                    registry.canonical_to_active(canonical),
                    active,
                    "roundtrip failed for {flags:?}"
                );
            }
            for phase in Phase::ALL {
                if flags.phase_enabled(phase) {
                    let active = registry.canonical_to_active(phase.canonical());
                    assert_eq!(registry.active_to_canonical(active), phase.canonical());
                }
            }
        }
    }

    #[test]
    fn test_active_ordering_preserves_canonical_ordering() {
        let registry = PhysicsIndexRegistry::new(FeatureFlags::two_phase(Phase::Water), 0);
        // oil = 0, gas = 2 canonically; compacted to oil = 0, gas = 1
        assert_eq!(registry.canonical_to_active(0), 0);
        assert_eq!(registry.canonical_to_active(2), 1);
        assert_eq!(registry.active_to_canonical(0), 0);
        assert_eq!(registry.active_to_canonical(1), 2);
    }

    #[test]
    #[should_panic(expected = "disabled")]
    fn test_translation_rejects_disabled_phase() {
        let registry = PhysicsIndexRegistry::new(FeatureFlags::two_phase(Phase::Gas), 0);
        registry.canonical_to_active(Phase::Gas.canonical());
    }

    #[test]
    fn test_disabled_slots_are_sentinels() {
        let registry = PhysicsIndexRegistry::new(FeatureFlags::two_phase(Phase::Gas), 0);
        assert!(!registry.solvent_saturation_idx().is_active());
        assert!(!registry.polymer_concentration_idx().is_active());
        assert!(!registry.temperature_idx().is_active());
        assert!(!registry.solvent_eq_idx().is_active());
        assert!(!registry.polymer_eq_idx().is_active());
        assert!(!registry.energy_eq_idx().is_active());
    }

    #[test]
    #[should_panic(expected = "solvent")]
    fn test_disabled_slot_fails_fast() {
        let registry = PhysicsIndexRegistry::new(FeatureFlags::all_phases(), 0);
        registry.solvent_saturation_idx().expect("solvent");
    }

    #[test]
    fn test_slots_contiguous_and_disjoint() {
        let flag_sets = [
            FeatureFlags::single_phase(Phase::Water),
            FeatureFlags::two_phase(Phase::Gas),
            FeatureFlags::all_phases(),
            FeatureFlags::all_phases()
                .with_solvent()
                .with_polymer()
                .with_energy(),
            FeatureFlags::two_phase(Phase::Oil).with_energy(),
        ];
        for flags in flag_sets {
            for base in [0, 4] {
                let registry = PhysicsIndexRegistry::new(flags, base);

                let mut var_slots: Vec<usize> = Vec::new();
                for k in 0..registry.num_phases() {
                    if let Some(idx) = registry.saturation_idx(k).get() {
                        var_slots.push(idx);
                    }
                }
                var_slots.push(registry.pressure_idx());
                for slot in [
                    registry.solvent_saturation_idx(),
                    registry.polymer_concentration_idx(),
                    registry.temperature_idx(),
                ] {
                    if let Some(idx) = slot.get() {
                        var_slots.push(idx);
                    }
                }
                var_slots.sort_unstable();

                let expected: Vec<usize> = (base..base + registry.num_eq()).collect();
                assert_eq!(var_slots, expected, "variable slots for {flags:?}");

                let mut eq_slots: Vec<usize> =
                    (0..registry.num_phases()).map(|k| registry.conti_eq_idx(k)).collect();
                for slot in [
                    registry.solvent_eq_idx(),
                    registry.polymer_eq_idx(),
                    registry.energy_eq_idx(),
                ] {
                    if let Some(idx) = slot.get() {
                        eq_slots.push(idx);
                    }
                }
                eq_slots.sort_unstable();
                assert_eq!(eq_slots, expected, "equation slots for {flags:?}");
            }
        }
    }

    #[test]
    fn test_equation_count_matches_variable_count() {
        let flags = FeatureFlags::all_phases().with_solvent().with_energy();
        let registry = PhysicsIndexRegistry::new(flags, 0);
        assert_eq!(registry.num_eq(), 5);
        assert_eq!(registry.num_phases(), 3);
    }

    #[test]
    #[should_panic(expected = "at least one fluid phase")]
    fn test_no_phases_rejected() {
        let flags = FeatureFlags {
            oil: false,
            water: false,
            gas: false,
            solvent: true,
            polymer: false,
            energy: false,
        };
        PhysicsIndexRegistry::new(flags, 0);
    }

    #[test]
    fn test_single_phase_layout() {
        let registry = PhysicsIndexRegistry::new(FeatureFlags::single_phase(Phase::Water), 0);
        assert_eq!(registry.num_eq(), 1);
        assert_eq!(registry.pressure_idx(), 0);
        assert_eq!(registry.conti_eq_idx(0), 0);
        assert!(!registry.saturation_idx(0).is_active());
    }
}
