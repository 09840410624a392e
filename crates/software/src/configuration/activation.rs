use embassy_time::Duration;

/// Determines what the activate pedals (see [`PedalMode::ToggleActive`][super::PedalMode::ToggleActive] and
/// [`PedalMode::PushActive`][super::PedalMode::PushActive]) act upon.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActivationTarget {
    /// The pedal flips the layer's persisted `active` register bit. Remote editors are notified of every change.
    #[default]
    Register,
    /// The pedal drives the layer's local activate latch, which is combined with the `active` bit by XOR. The
    /// register block is left untouched, so nothing is reported to remote editors.
    Latch,
}

/// Settings which are fixed when the engine is built rather than exposed through the register blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineConfig {
    /// What activate pedals act upon.
    pub activation: ActivationTarget,
    /// When the global `check_keep_alive` register is set, traffic from the control port is only passed on to the
    /// performance port if a register request arrived within this window.
    pub keep_alive_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            activation: ActivationTarget::default(),
            keep_alive_window: Duration::from_secs(2),
        }
    }
}
