use super::{HARMONIC_BAR_COUNT, PEDAL_COUNT, bias, put, take, unbias};
use crate::configuration::{LayerId, NoteMode, PedalMode};

/// Bit flags of a layer's config byte.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LayerConfig {
    /// Layer takes part in routing. A disabled layer only ends notes it already started.
    pub enabled: bool,
    /// Persisted half of the layer gate; combined with the runtime activate latch by XOR.
    pub active: bool,
    /// One-shot resynchronization trigger; reads back as zero once handled.
    pub init: bool,
}

impl From<u8> for LayerConfig {
    fn from(byte: u8) -> Self {
        Self {
            enabled: byte & 0x01 != 0,
            active: byte & 0x02 != 0,
            init: byte & 0x04 != 0,
        }
    }
}

impl From<LayerConfig> for u8 {
    fn from(config: LayerConfig) -> Self {
        u8::from(config.enabled) | u8::from(config.active) << 1 | u8::from(config.init) << 2
    }
}

/// Byte offsets of the layer block fields.
pub mod layer_offset {
    /// Config bits, see [`LayerConfig`][super::LayerConfig].
    pub const CONFIG: u8 = 0;
    /// Status bits (read-only).
    pub const STATUS: u8 = 1;
    /// One-shot init trigger (write-only).
    pub const INIT: u8 = 2;
    /// Program number.
    pub const PROGRAM: u8 = 3;
    /// Bank Select MSB.
    pub const BANK_MSB: u8 = 4;
    /// Bank Select LSB.
    pub const BANK_LSB: u8 = 5;
    /// Lowest accepted note.
    pub const LO: u8 = 6;
    /// Highest accepted note.
    pub const HI: u8 = 7;
    /// Volume, also the velocity scale.
    pub const VOLUME: u8 = 8;
    /// Note mode.
    pub const MODE: u8 = 9;
    /// Transposition, biased by 64.
    pub const TRANSPOSITION: u8 = 10;
    /// Additional transposition, biased by 64.
    pub const TRANSPOSITION_EXTRA: u8 = 11;
    /// Release time (CC 72).
    pub const RELEASE: u8 = 12;
    /// Attack time (CC 73).
    pub const ATTACK: u8 = 13;
    /// Brightness (CC 74).
    pub const CUTOFF: u8 = 14;
    /// Decay time (CC 75).
    pub const DECAY: u8 = 15;
    /// Controller numbers of the eight pedals.
    pub const PEDAL_CC: u8 = 16;
    /// Modes of the eight pedals.
    pub const PEDAL_MODE: u8 = 24;
    /// Organ percussion switch.
    pub const PERCUSSION: u8 = 32;
    /// Nine organ harmonic bars.
    pub const HARMONIC_BAR: u8 = 33;
    /// Portamento time (CC 5).
    pub const PORTAMENTO_TIME: u8 = 42;
    /// Channel whose volume controller feeds the volume register.
    pub const VOLUME_CHANNEL: u8 = 43;
}

/// One layer's register block.
///
/// Transpositions are held signed; the +64 wire bias is applied and removed only by [`LayerRegisters::to_bytes`]
/// and [`LayerRegisters::from_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LayerRegisters {
    /// Config bits.
    pub config: LayerConfig,
    /// Status bits. Writes are ignored.
    pub status: u8,
    /// One-shot trigger; reads back as zero once handled.
    pub init: u8,
    /// Program number sent to the attached instrument.
    pub program: u8,
    /// Bank Select MSB sent to the attached instrument.
    pub bank_msb: u8,
    /// Bank Select LSB sent to the attached instrument.
    pub bank_lsb: u8,
    /// Lowest accepted (incoming) note, inclusive.
    pub lo: u8,
    /// Highest accepted (incoming) note, inclusive.
    pub hi: u8,
    /// Part volume; Note On velocities are scaled by `volume / 127`.
    pub volume: u8,
    /// Note mode.
    pub mode: NoteMode,
    /// Transposition in semitones.
    pub transposition: i8,
    /// Additional transposition in semitones, added to [`LayerRegisters::transposition`].
    pub transposition_extra: i8,
    /// Release time (CC 72).
    pub release: u8,
    /// Attack time (CC 73).
    pub attack: u8,
    /// Brightness (CC 74).
    pub cutoff: u8,
    /// Decay time (CC 75).
    pub decay: u8,
    /// Controller numbers sent by the pedals in [`PedalMode::Normal`].
    pub pedal_cc: [u8; PEDAL_COUNT],
    /// Raw pedal modes, see [`LayerRegisters::pedal_mode`].
    pub pedal_mode: [u8; PEDAL_COUNT],
    /// Organ percussion switch.
    pub percussion: u8,
    /// Organ harmonic bar levels.
    pub harmonic_bar: [u8; HARMONIC_BAR_COUNT],
    /// Portamento time (CC 5).
    pub portamento_time: u8,
    /// Channel (1..=16) whose volume controller feeds [`LayerRegisters::volume`]; zero disables capture.
    pub volume_channel: u8,
}

impl LayerRegisters {
    /// Size of the block on the wire.
    pub const SIZE: usize = 44;

    /// Program of the organ voice, the only voice with harmonic bars.
    pub const ORGAN_PROGRAM: u8 = 17;
    /// Bank Select MSB of the organ voice.
    pub const ORGAN_BANK_MSB: u8 = 32;
    /// Bank Select LSB of the organ voice.
    pub const ORGAN_BANK_LSB: u8 = 68;

    /// Boot defaults of a layer. Only the first layer is enabled.
    pub fn new(layer: LayerId) -> Self {
        let index = layer.index();

        let pedal_cc = if index == 0 {
            [64, 67, 66, 0, 16, 17, 18, 19]
        } else {
            [0, 0, 0, 0, 16, 17, 18, 19]
        };

        let volume_channel = match index {
            0 | 1 => 1,
            6 | 7 => 3,
            _ => 0,
        };

        Self {
            config: LayerConfig {
                enabled: index == 0,
                active: true,
                init: false,
            },
            status: 0,
            init: 0,
            program: 0,
            bank_msb: 0,
            bank_lsb: 68,
            lo: 0,
            hi: 127,
            volume: 127,
            mode: NoteMode::NORMAL,
            transposition: 0,
            transposition_extra: 0,
            release: 0x40,
            attack: 0x40,
            cutoff: 0x40,
            decay: 0x40,
            pedal_cc,
            pedal_mode: [PedalMode::Ignore.into(); PEDAL_COUNT],
            percussion: 0,
            harmonic_bar: [0; HARMONIC_BAR_COUNT],
            portamento_time: 0,
            volume_channel,
        }
    }

    /// Serializes the block into its wire image.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut image = [0_u8; Self::SIZE];
        image[usize::from(layer_offset::CONFIG)] = self.config.into();
        image[usize::from(layer_offset::STATUS)] = self.status;
        image[usize::from(layer_offset::INIT)] = self.init;
        image[usize::from(layer_offset::PROGRAM)] = self.program;
        image[usize::from(layer_offset::BANK_MSB)] = self.bank_msb;
        image[usize::from(layer_offset::BANK_LSB)] = self.bank_lsb;
        image[usize::from(layer_offset::LO)] = self.lo;
        image[usize::from(layer_offset::HI)] = self.hi;
        image[usize::from(layer_offset::VOLUME)] = self.volume;
        image[usize::from(layer_offset::MODE)] = self.mode.into();
        image[usize::from(layer_offset::TRANSPOSITION)] = bias(self.transposition);
        image[usize::from(layer_offset::TRANSPOSITION_EXTRA)] = bias(self.transposition_extra);
        image[usize::from(layer_offset::RELEASE)] = self.release;
        image[usize::from(layer_offset::ATTACK)] = self.attack;
        image[usize::from(layer_offset::CUTOFF)] = self.cutoff;
        image[usize::from(layer_offset::DECAY)] = self.decay;
        put(&mut image, layer_offset::PEDAL_CC, &self.pedal_cc);
        put(&mut image, layer_offset::PEDAL_MODE, &self.pedal_mode);
        image[usize::from(layer_offset::PERCUSSION)] = self.percussion;
        put(&mut image, layer_offset::HARMONIC_BAR, &self.harmonic_bar);
        image[usize::from(layer_offset::PORTAMENTO_TIME)] = self.portamento_time;
        image[usize::from(layer_offset::VOLUME_CHANNEL)] = self.volume_channel;
        image
    }

    /// Parses a wire image, removing the transposition bias.
    pub fn from_bytes(image: &[u8; Self::SIZE]) -> Self {
        Self {
            config: image[usize::from(layer_offset::CONFIG)].into(),
            status: image[usize::from(layer_offset::STATUS)],
            init: image[usize::from(layer_offset::INIT)],
            program: image[usize::from(layer_offset::PROGRAM)],
            bank_msb: image[usize::from(layer_offset::BANK_MSB)],
            bank_lsb: image[usize::from(layer_offset::BANK_LSB)],
            lo: image[usize::from(layer_offset::LO)],
            hi: image[usize::from(layer_offset::HI)],
            volume: image[usize::from(layer_offset::VOLUME)],
            mode: image[usize::from(layer_offset::MODE)].into(),
            transposition: unbias(image[usize::from(layer_offset::TRANSPOSITION)]),
            transposition_extra: unbias(image[usize::from(layer_offset::TRANSPOSITION_EXTRA)]),
            release: image[usize::from(layer_offset::RELEASE)],
            attack: image[usize::from(layer_offset::ATTACK)],
            cutoff: image[usize::from(layer_offset::CUTOFF)],
            decay: image[usize::from(layer_offset::DECAY)],
            pedal_cc: take(image, layer_offset::PEDAL_CC),
            pedal_mode: take(image, layer_offset::PEDAL_MODE),
            percussion: image[usize::from(layer_offset::PERCUSSION)],
            harmonic_bar: take(image, layer_offset::HARMONIC_BAR),
            portamento_time: image[usize::from(layer_offset::PORTAMENTO_TIME)],
            volume_channel: image[usize::from(layer_offset::VOLUME_CHANNEL)],
        }
    }

    /// Interprets the mode of a pedal.
    pub fn pedal_mode(&self, pedal: usize) -> PedalMode {
        self.pedal_mode
            .get(pedal)
            .map_or(PedalMode::Ignore, |&mode| PedalMode::from_register(mode))
    }

    /// Returns `true` if the selected voice is the organ, whose harmonic bars and percussion can be set.
    pub fn is_organ_voice(&self) -> bool {
        self.program == Self::ORGAN_PROGRAM
            && self.bank_msb == Self::ORGAN_BANK_MSB
            && self.bank_lsb == Self::ORGAN_BANK_LSB
    }

    /// Clears both init triggers, returning whether either was set.
    pub(crate) fn take_init(&mut self) -> bool {
        let triggered = self.init != 0 || self.config.init;
        self.init = 0;
        self.config.init = false;
        triggered
    }
}
