use tinyvec::ArrayVec;

use super::{Engine, emitter::{self, ChangeSet}, send_sysex};
use crate::{
    configuration::LayerId,
    error::RequestError,
    host::{Host, Port},
    protocol::{self, Command, FRAME_CAPACITY, Request},
    registers::{Block, GlobalRegisters, LayerRegisters, read_window, write_window},
};

/// Bytes read from a register block.
pub type RegisterBytes = ArrayVec<[u8; FRAME_CAPACITY]>;

impl Engine {
    /// Handles a register request: the bytes of a System Exclusive message between its start and end markers,
    /// beginning with the SysEx id.
    ///
    /// Reads are answered on both control-facing ports, echoing the request's SysEx id. Writes are applied without a
    /// reply. A request which is malformed, unsupported or out of bounds is dropped without touching any register.
    pub fn handle_request(&mut self, frame: &[u8], host: &mut impl Host) {
        let Some((&sysex_id, body)) = frame.split_first() else {
            return;
        };

        match Request::decode(body).and_then(|request| self.apply(request, host)) {
            Ok(Some(reply)) => reply.send(sysex_id, host),
            Ok(None) => {}
            Err(_e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Dropped register request: {}", _e);
            }
        }
    }

    /// Validates and applies a request, returning the reply to send, if any.
    pub(crate) fn apply(
        &mut self,
        request: Request<'_>,
        host: &mut impl Host,
    ) -> Result<Option<Reply>, RequestError> {
        match request.command {
            Command::WriteRequest => {
                if usize::from(request.length) != request.payload.len() {
                    return Err(RequestError::LengthMismatch {
                        declared: request.length,
                        actual: request.payload.len(),
                    });
                }

                #[cfg(feature = "defmt")]
                defmt::debug!(
                    "Writing {} bytes at {} of {}",
                    request.length,
                    request.offset,
                    request.block
                );

                match request.block {
                    Block::Global => self.write_global(request.offset, request.payload, host)?,
                    Block::Layer(id) => self.write_layer(id, request.offset, request.payload, host)?,
                }
                Ok(None)
            }
            Command::ReadRequest => {
                let data = self.read(request.block, request.offset, request.length)?;
                Ok((!data.is_empty()).then_some(Reply {
                    block: request.block,
                    offset: request.offset,
                    data,
                }))
            }
            command => Err(RequestError::UnknownCommand(command as u8)),
        }
    }

    /// Copies `length` bytes of `block` starting at `offset`.
    pub(crate) fn read(&self, block: Block, offset: u8, length: u8) -> Result<RegisterBytes, RequestError> {
        let mut bytes = RegisterBytes::new();
        match block {
            Block::Global => bytes.extend_from_slice(read_window(&self.global.to_bytes(), offset, length)?),
            Block::Layer(id) => bytes.extend_from_slice(read_window(
                &self.layers[id.index()].registers.to_bytes(),
                offset,
                length,
            )?),
        }
        Ok(bytes)
    }

    /// Announces a change which did not come from a write request.
    ///
    /// The announcement is shaped like the reply to a read of the changed bytes.
    pub(crate) fn notify(&self, block: Block, offset: u8, length: u8, host: &mut impl Host) {
        if let Ok(data) = self.read(block, offset, length) {
            Reply {
                block,
                offset,
                data,
            }
            .send(protocol::SYSEX_ID, host);
        }
        host.registers_changed(block, offset, length);
    }

    fn write_global(&mut self, offset: u8, payload: &[u8], host: &mut impl Host) -> Result<(), RequestError> {
        let previous = self.global;

        let mut image = previous.to_bytes();
        write_window(&mut image, offset, payload)?;
        let mut global = GlobalRegisters::from_bytes(&image);
        global.status = previous.status;
        let init = global.take_init();
        self.global = global;

        host.registers_changed(Block::Global, offset, payload.len() as u8);

        if init || previous.config.enabled != global.config.enabled {
            self.broadcast_local_control(host);
        }
        if init || previous.tempo() != global.tempo() {
            host.tempo_changed(global.tempo());
        }
        Ok(())
    }

    fn write_layer(
        &mut self,
        id: LayerId,
        offset: u8,
        payload: &[u8],
        host: &mut impl Host,
    ) -> Result<(), RequestError> {
        let layer = &mut self.layers[id.index()];
        let previous = layer.registers;

        let mut image = previous.to_bytes();
        write_window(&mut image, offset, payload)?;
        let mut registers = LayerRegisters::from_bytes(&image);
        registers.status = previous.status;
        let changes = if registers.take_init() {
            ChangeSet::All
        } else {
            ChangeSet::between(&previous, &registers)
        };
        layer.registers = registers;

        host.registers_changed(Block::Layer(id), offset, payload.len() as u8);
        emitter::emit_layer_update(layer, &previous, changes, host);
        Ok(())
    }
}

/// A read response waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reply {
    block: Block,
    offset: u8,
    data: RegisterBytes,
}

impl Reply {
    fn send(&self, sysex_id: u8, host: &mut impl Host) {
        let frame = protocol::encode_response(sysex_id, self.block, self.offset, &self.data);
        send_sysex(host, Port::Control, &frame);
        send_sysex(host, Port::Secondary, &frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        envelope,
        registers::{global_offset, layer_offset},
        test_host::TestHost,
    };

    fn request(engine: &mut Engine, host: &mut TestHost, frame: &[u8]) {
        engine.handle_request(frame, host);
    }

    #[test]
    fn write_then_read_round_trip() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();

        request(&mut engine, &mut host, &[0x77, 0x41, 0x06, 0x03, 0x24, 0x48, 0x50]);
        assert!(host.sysex(Port::Control).is_empty(), "Writes are not acknowledged");

        request(&mut engine, &mut host, &[0x78, 0x21, 0x06, 0x03]);
        assert_eq!(
            vec![vec![0x78, 0x31, 0x06, 0x03, 0x24, 0x48, 0x50]],
            host.sysex(Port::Control),
            "Expected left but got right"
        );
        assert_eq!(host.sysex(Port::Control), host.sysex(Port::Secondary));
    }

    #[test]
    fn whole_block_round_trip() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();
        let payload: Vec<u8> = (0..LayerRegisters::SIZE as u8)
            .map(|i| match i {
                // status and init bytes do not read back as written
                1 | 2 => 0,
                // config bit 2 is the init trigger
                0 => 0x03,
                _ => i,
            })
            .collect();

        let mut frame = vec![0x77, 0x47, 0x00, payload.len() as u8];
        frame.extend_from_slice(&payload);
        request(&mut engine, &mut host, &frame);
        request(&mut engine, &mut host, &[0x77, 0x27, 0x00, 0x2C]);

        let reply = host.sysex(Port::Control).pop().unwrap();
        assert_eq!(payload, reply[4..].to_vec());
    }

    #[test]
    fn out_of_bounds_requests_are_dropped() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();
        let before = engine.clone();

        request(&mut engine, &mut host, &[0x77, 0x40, 0x2B, 0x02, 0x01, 0x01]);
        request(&mut engine, &mut host, &[0x77, 0x4F, 0x26, 0x02, 0x01, 0x01]);
        request(&mut engine, &mut host, &[0x77, 0x20, 0x00, 0x2D]);
        request(&mut engine, &mut host, &[0x77, 0x2F, 0x27, 0x01]);

        assert_eq!(before.global, engine.global);
        assert_eq!(before.layers, engine.layers);
        assert!(host.sent.is_empty(), "No frame may be produced");
        assert!(host.changed.is_empty());
    }

    #[test]
    fn length_mismatch_is_dropped() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();
        let before = engine.clone();

        request(&mut engine, &mut host, &[0x77, 0x40, 0x06, 0x02, 0x01]);
        request(&mut engine, &mut host, &[0x77, 0x40, 0x06, 0x01, 0x01, 0x02]);

        assert_eq!(before.layers, engine.layers);
        assert!(host.sent.is_empty());
    }

    #[test]
    fn unsupported_commands_are_dropped() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();

        for head in [0x00_u8, 0x10, 0x30, 0x50, 0x60, 0x70] {
            request(&mut engine, &mut host, &[0x77, head, 0x00, 0x01, 0x01]);
        }
        request(&mut engine, &mut host, &[0x77, 0x28, 0x00, 0x01]);
        request(&mut engine, &mut host, &[0x77]);
        request(&mut engine, &mut host, &[]);
        assert!(host.sent.is_empty());
    }

    #[test]
    fn zero_length_read_has_no_reply() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();
        request(&mut engine, &mut host, &[0x77, 0x20, 0x05, 0x00]);
        assert!(host.sent.is_empty());
    }

    #[test]
    fn transposition_is_unbiased_after_write() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();

        for semitone in -64_i8..=63 {
            let wire = (i16::from(semitone) + 64) as u8;
            request(&mut engine, &mut host, &[0x77, 0x42, 0x0A, 0x01, wire]);
            assert_eq!(
                semitone,
                engine.layer(LayerId::Layer3).registers.transposition,
                "Expected left but got right"
            );
        }
    }

    #[test]
    fn status_is_read_only() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();
        request(&mut engine, &mut host, &[0x77, 0x4F, 0x01, 0x01, 0x01]);
        request(&mut engine, &mut host, &[0x77, 0x40, 0x01, 0x01, 0x7F]);
        assert!(!engine.global().is_inited());
        assert_eq!(0, engine.layer(LayerId::Layer1).registers.status);
    }

    #[test]
    fn enabling_broadcasts_local_control() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();

        request(&mut engine, &mut host, &[0x77, 0x4F, 0x00, 0x01, 0x03]);
        let local_control = host.control_changes(Port::Performance, 122);
        assert_eq!(
            (1..=8).map(|channel| (channel, 0)).collect::<Vec<_>>(),
            local_control,
            "Local control is switched off on channels 1 to 8"
        );

        host.sent.clear();
        request(&mut engine, &mut host, &[0x77, 0x4F, 0x00, 0x01, 0x03]);
        assert!(host.sent.is_empty(), "Nothing changed, nothing is sent");
    }

    #[test]
    fn tempo_changes() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();

        request(&mut engine, &mut host, &[0x77, 0x4F, global_offset::TEMPO_MSB, 0x02, 0x01, 0x0C]);
        assert_eq!(vec![140], host.tempos);
        assert_eq!(140, engine.global().tempo());

        // 1000 = 7 << 7 | 104
        request(&mut engine, &mut host, &[0x77, 0x4F, global_offset::TEMPO_MSB, 0x02, 0x07, 0x68]);
        assert_eq!(vec![140, 120], host.tempos, "Multiples of 1000 fall back to 120");
    }

    #[test]
    fn global_init_reapplies_side_effects() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();

        request(&mut engine, &mut host, &[0x77, 0x4F, global_offset::INIT, 0x01, 0x01]);
        assert_eq!(0, engine.global().init, "The trigger reads back as zero");
        assert_eq!(8, host.control_changes(Port::Performance, 122).len());
        assert_eq!(vec![120], host.tempos);
    }

    #[test]
    fn layer_program_write_resends_program() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();

        request(&mut engine, &mut host, &[0x77, 0x41, layer_offset::PROGRAM, 0x01, 0x05]);
        assert_eq!(
            vec![(2, 0), (2, 68)],
            [
                host.control_changes(Port::Performance, 0),
                host.control_changes(Port::Performance, 32)
            ]
            .concat()
        );
        assert_eq!(vec![(2, 5)], host.program_changes(Port::Performance));
        assert!(host.sysex(Port::Performance).is_empty(), "Volume did not change");
    }

    #[test]
    fn organ_harmonics_write_sends_the_envelope() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();

        request(&mut engine, &mut host, &[0x77, 0x41, layer_offset::HARMONIC_BAR, 0x01, 0x08]);
        assert!(host.sent.is_empty(), "Only the organ voice has harmonic bars");

        request(&mut engine, &mut host, &[0x77, 0x41, layer_offset::PROGRAM, 0x03, 17, 32, 68]);
        host.clear();

        request(&mut engine, &mut host, &[0x77, 0x41, layer_offset::PERCUSSION, 0x02, 0x01, 0x06]);
        let bars = [0x06, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            vec![envelope::harmonic_bars(2, 0x01, &bars).to_vec()],
            host.sysex(Port::Performance),
            "Expected left but got right"
        );
        assert!(host.program_changes(Port::Performance).is_empty(), "The program did not change");
    }

    #[test]
    fn layer_init_resends_everything() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();

        request(&mut engine, &mut host, &[0x77, 0x40, layer_offset::CONFIG, 0x01, 0x07]);
        let layer = engine.layer(LayerId::Layer1).registers;
        assert!(!layer.config.init, "The trigger reads back as zero");
        assert!(layer.config.enabled && layer.config.active);

        assert_eq!(vec![(1, 0)], host.program_changes(Port::Performance));
        for cc in [72, 73, 74, 75, 5] {
            assert_eq!(1, host.control_changes(Port::Performance, cc).len());
        }
        assert_eq!(1, host.sysex(Port::Performance).len());
    }
}
