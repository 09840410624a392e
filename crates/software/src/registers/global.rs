use super::{PEDAL_COUNT, put, take};
use crate::configuration::PedalMode;

/// Bit flags of the global config byte.
///
/// Serialized explicitly to and from the wire byte; bit 7 has no meaning and reads back as zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GlobalConfig {
    /// Master switch for the router. While clear, only Note Off messages are processed.
    pub enabled: bool,
    /// Mirror every performance message to the control port.
    pub mirror_all_to_control: bool,
    /// Mirror performance SysEx to the control port.
    pub mirror_sysex_to_control: bool,
    /// Mirror every performance message to the secondary port.
    pub mirror_all_to_secondary: bool,
    /// Mirror performance SysEx to the secondary port.
    pub mirror_sysex_to_secondary: bool,
    /// Ask the input subsystem to print raw pedal samples.
    pub print_samples: bool,
    /// Ask the input subsystem to print configuration changes.
    pub print_config: bool,
}

impl From<u8> for GlobalConfig {
    fn from(byte: u8) -> Self {
        Self {
            enabled: byte & 0x01 != 0,
            mirror_all_to_control: byte & 0x02 != 0,
            mirror_sysex_to_control: byte & 0x04 != 0,
            mirror_all_to_secondary: byte & 0x08 != 0,
            mirror_sysex_to_secondary: byte & 0x10 != 0,
            print_samples: byte & 0x20 != 0,
            print_config: byte & 0x40 != 0,
        }
    }
}

impl From<GlobalConfig> for u8 {
    fn from(config: GlobalConfig) -> Self {
        u8::from(config.enabled)
            | u8::from(config.mirror_all_to_control) << 1
            | u8::from(config.mirror_sysex_to_control) << 2
            | u8::from(config.mirror_all_to_secondary) << 3
            | u8::from(config.mirror_sysex_to_secondary) << 4
            | u8::from(config.print_samples) << 5
            | u8::from(config.print_config) << 6
    }
}

/// Byte offsets of the global block fields.
pub mod global_offset {
    /// Config bits, see [`GlobalConfig`][super::GlobalConfig].
    pub const CONFIG: u8 = 0;
    /// Status bits (read-only).
    pub const STATUS: u8 = 1;
    /// One-shot init trigger (write-only).
    pub const INIT: u8 = 2;
    /// Layer which receives Program Change, Bank Select and SysEx.
    pub const SELECTED_LAYER: u8 = 3;
    /// Upper seven bits of the tempo.
    pub const TEMPO_MSB: u8 = 4;
    /// Lower seven bits of the tempo.
    pub const TEMPO_LSB: u8 = 5;
    /// Controller numbers of the eight pedals.
    pub const PEDAL_CC: u8 = 6;
    /// Modes of the eight pedals.
    pub const PEDAL_MODE: u8 = 14;
    /// Calibration minimum of the eight analog pedals.
    pub const PEDAL_MIN: u8 = 22;
    /// Calibration maximum of the eight analog pedals.
    pub const PEDAL_MAX: u8 = 30;
    /// Gate control-port traffic on a recent keep-alive.
    pub const CHECK_KEEP_ALIVE: u8 = 38;
}

/// The global register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GlobalRegisters {
    /// Config bits.
    pub config: GlobalConfig,
    /// Status bits, see [`GlobalRegisters::STATUS_INITED`]. Writes are ignored.
    pub status: u8,
    /// One-shot trigger; reads back as zero once handled.
    pub init: u8,
    /// Layer which receives Program Change, Bank Select and SysEx.
    pub selected_layer: u8,
    /// Upper seven bits of the tempo.
    pub tempo_msb: u8,
    /// Lower seven bits of the tempo.
    pub tempo_lsb: u8,
    /// Controller numbers sent by the pedals in [`PedalMode::Normal`].
    pub pedal_cc: [u8; PEDAL_COUNT],
    /// Raw pedal modes, see [`GlobalRegisters::pedal_mode`].
    pub pedal_mode: [u8; PEDAL_COUNT],
    /// Calibration minimum of each analog pedal, consumed by the input subsystem.
    pub pedal_min: [u8; PEDAL_COUNT],
    /// Calibration maximum of each analog pedal, consumed by the input subsystem.
    pub pedal_max: [u8; PEDAL_COUNT],
    /// When non-zero, control-port traffic only reaches the performance port after a recent keep-alive.
    pub check_keep_alive: u8,
}

impl GlobalRegisters {
    /// Size of the block on the wire.
    pub const SIZE: usize = 39;

    /// Status bit set once every layer has been synchronized with the attached instrument.
    pub const STATUS_INITED: u8 = 0x01;

    /// Tempo used whenever the configured value is unusable.
    pub const DEFAULT_TEMPO: u16 = 120;

    /// Serializes the block into its wire image.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut image = [0_u8; Self::SIZE];
        image[usize::from(global_offset::CONFIG)] = self.config.into();
        image[usize::from(global_offset::STATUS)] = self.status;
        image[usize::from(global_offset::INIT)] = self.init;
        image[usize::from(global_offset::SELECTED_LAYER)] = self.selected_layer;
        image[usize::from(global_offset::TEMPO_MSB)] = self.tempo_msb;
        image[usize::from(global_offset::TEMPO_LSB)] = self.tempo_lsb;
        put(&mut image, global_offset::PEDAL_CC, &self.pedal_cc);
        put(&mut image, global_offset::PEDAL_MODE, &self.pedal_mode);
        put(&mut image, global_offset::PEDAL_MIN, &self.pedal_min);
        put(&mut image, global_offset::PEDAL_MAX, &self.pedal_max);
        image[usize::from(global_offset::CHECK_KEEP_ALIVE)] = self.check_keep_alive;
        image
    }

    /// Parses a wire image.
    pub fn from_bytes(image: &[u8; Self::SIZE]) -> Self {
        Self {
            config: image[usize::from(global_offset::CONFIG)].into(),
            status: image[usize::from(global_offset::STATUS)],
            init: image[usize::from(global_offset::INIT)],
            selected_layer: image[usize::from(global_offset::SELECTED_LAYER)],
            tempo_msb: image[usize::from(global_offset::TEMPO_MSB)],
            tempo_lsb: image[usize::from(global_offset::TEMPO_LSB)],
            pedal_cc: take(image, global_offset::PEDAL_CC),
            pedal_mode: take(image, global_offset::PEDAL_MODE),
            pedal_min: take(image, global_offset::PEDAL_MIN),
            pedal_max: take(image, global_offset::PEDAL_MAX),
            check_keep_alive: image[usize::from(global_offset::CHECK_KEEP_ALIVE)],
        }
    }

    /// Recombines the tempo from its two seven-bit halves.
    ///
    /// Any multiple of 1000 (including zero) is treated as unset and yields [`GlobalRegisters::DEFAULT_TEMPO`].
    pub fn tempo(&self) -> u16 {
        let tempo = u16::from(self.tempo_msb & 0x7F) << 7 | u16::from(self.tempo_lsb & 0x7F);
        if tempo % 1000 == 0 {
            Self::DEFAULT_TEMPO
        } else {
            tempo
        }
    }

    /// Splits a tempo into the two seven-bit registers.
    pub fn set_tempo(&mut self, tempo: u16) {
        self.tempo_msb = ((tempo >> 7) & 0x7F) as u8;
        self.tempo_lsb = (tempo & 0x7F) as u8;
    }

    /// Interprets the mode of a pedal.
    pub fn pedal_mode(&self, pedal: usize) -> PedalMode {
        self.pedal_mode
            .get(pedal)
            .map_or(PedalMode::Ignore, |&mode| PedalMode::from_register(mode))
    }

    /// Returns `true` once every layer has been synchronized with the attached instrument.
    pub fn is_inited(&self) -> bool {
        self.status & Self::STATUS_INITED != 0
    }

    /// Clears the init trigger, returning whether it was set.
    pub(crate) fn take_init(&mut self) -> bool {
        let triggered = self.init != 0;
        self.init = 0;
        triggered
    }
}

impl Default for GlobalRegisters {
    fn default() -> Self {
        // sustain, soft pedal and sostenuto for the three analog pedals, general purpose controllers 1..4 for the rest
        let pedal_cc = [64, 67, 66, 0, 16, 17, 18, 19];

        let mut pedal_mode = [u8::from(PedalMode::Normal); PEDAL_COUNT];
        pedal_mode[3] = PedalMode::Ignore.into();

        let mut registers = Self {
            config: GlobalConfig {
                mirror_all_to_control: true,
                ..GlobalConfig::default()
            },
            status: 0,
            init: 0,
            selected_layer: 0,
            tempo_msb: 0,
            tempo_lsb: 0,
            pedal_cc,
            pedal_mode,
            pedal_min: [0x05, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
            pedal_max: [0x06, 0x06, 0x75, 0x7F, 0x7F, 0x7F, 0x7F, 0x7F],
            check_keep_alive: 0,
        };
        registers.set_tempo(Self::DEFAULT_TEMPO);
        registers
    }
}
