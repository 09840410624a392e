//! midibox is [Embassy](https://embassy.dev)-based firmware for a MIDI splitter which sits between a keyboard
//! instrument and its sound engine. The firmware runs on the [Nucleo-F767ZI development
//! board](https://www.st.com/en/evaluation-tools/nucleo-f767zi.html), which is powered by an F7-series
//! STM32 microcontroller.
//!
//! The board enumerates as a USB-MIDI device with three virtual cables: the attached instrument (performance),
//! the remote editor (control) and a secondary control link. Everything else, from layer routing to the register
//! protocol, lives in [`midibox_lib`]; this binary only moves bytes and reads the front panel: two footswitches,
//! a button which cycles the selected layer, and an LED which shows whether the router is enabled.

#![no_std]
#![no_main]

use defmt::{panic, *};
use embassy_executor::Spawner;
use embassy_stm32::{
    Config, bind_interrupts,
    exti::ExtiInput,
    gpio::{Level, Output, Pull, Speed},
    peripherals,
    time::Hertz,
    usb,
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel, mutex, signal::Signal};
use embassy_time::Timer;
use embassy_usb::{
    Builder, UsbDevice,
    class::midi::{MidiClass, Receiver, Sender},
    driver::EndpointError,
};
use midibox_lib::{
    configuration::{CycleConfig, EngineConfig, LayerId},
    embassy_time::Instant,
    engine::Engine,
    host::{Host, Port},
    registers::{Block, global_offset},
    usb_midi::{PACKET_SIZE, PacketReader, QUEUE_CAPACITY, write_packets},
};
use static_cell::StaticCell;
use wmidi::MidiMessage;

use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(
    #[doc(hidden)]
    struct Irqs {
        OTG_FS => usb::InterruptHandler<peripherals::USB_OTG_FS>;
    }
);

type EngineAsyncMutex = mutex::Mutex<CriticalSectionRawMutex, Engine>;
type UsbDriver = usb::Driver<'static, peripherals::USB_OTG_FS>;

const PERFORMANCE_CABLE: u8 = 0;
const CONTROL_CABLE: u8 = 1;
const SECONDARY_CABLE: u8 = 2;

/// Pedal numbers of the two footswitches; the analog pedals take 0..=2.
const FOOTSWITCH_PEDALS: [u8; 2] = [4, 5];
const DEBOUNCE_MS: u64 = 20;

/// Packets waiting for the USB endpoint. The engine fills it while holding its lock, so it must take a whole burst.
static OUTGOING: Channel<CriticalSectionRawMutex, [u8; PACKET_SIZE], QUEUE_CAPACITY> = Channel::new();

/// Raised whenever the global register block changes.
static GLOBAL_CHANGED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Hands the engine's output to the USB transmit task.
struct UsbHost;

impl Host for UsbHost {
    fn send(&mut self, port: Port, message: &MidiMessage<'_>) {
        let cable = match port {
            Port::Performance => PERFORMANCE_CABLE,
            Port::Control => CONTROL_CABLE,
            Port::Secondary => SECONDARY_CABLE,
        };
        write_packets(cable, message, |packet| {
            if OUTGOING.try_send(packet).is_err() {
                warn!("Outgoing queue full, dropped a packet for cable {}", cable);
            }
        });
    }

    fn registers_changed(&mut self, block: Block, offset: u8, length: u8) {
        debug!("{} bytes changed at {} of {}", length, offset, block);
        if block == Block::Global {
            GLOBAL_CHANGED.signal(());
        }
    }

    fn tempo_changed(&mut self, bpm: u16) {
        info!("Tempo is now {} BPM", bpm);
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Initializing midibox");

    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        // hse: high-speed external clock
        config.rcc.hse = Some(Hse {
            freq: Hertz(8_000_000),
            mode: HseMode::Bypass,
        });

        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL216,
            divp: Some(PllPDiv::DIV2), // 8mhz / 4 * 216 / 2 = 216Mhz
            // USB OTG FS needs 48MHz from the main PLL's Q output (RM0410, section 5.2)
            divq: Some(PllQDiv::DIV9), // 8mhz / 4 * 216 / 9 = 48Mhz
            divr: None,
        });
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.mux.clk48sel = mux::Clk48sel::PLL1_Q;
    }
    let p = embassy_stm32::init(config);

    static ENGINE: StaticCell<EngineAsyncMutex> = StaticCell::new();
    let engine = ENGINE.init(mutex::Mutex::new(Engine::new(EngineConfig::default())));

    let button = ExtiInput::new(p.PC13, p.EXTI13, Pull::None);
    unwrap!(spawner.spawn(layer_select_task(button, engine)));

    let red_led = Output::new(p.PB14, Level::Low, Speed::Low);
    unwrap!(spawner.spawn(enabled_display_task(red_led, engine)));
    GLOBAL_CHANGED.signal(());

    let footswitch = ExtiInput::new(p.PD1, p.EXTI1, Pull::Up);
    unwrap!(spawner.spawn(footswitch_task(footswitch, FOOTSWITCH_PEDALS[0], engine)));
    let footswitch = ExtiInput::new(p.PD0, p.EXTI0, Pull::Up);
    unwrap!(spawner.spawn(footswitch_task(footswitch, FOOTSWITCH_PEDALS[1], engine)));

    static ENDPOINT_OUT_BUFFER: StaticCell<[u8; 256]> = StaticCell::new();
    let mut config = embassy_stm32::usb::Config::default();

    // The Nucleo's USB port cannot power the board (UM1974, section 6.10), so the device is self-powered and must
    // detect VBUS.
    config.vbus_detection = true;

    let driver = usb::Driver::new_fs(
        p.USB_OTG_FS,
        Irqs,
        p.PA12,
        p.PA11,
        ENDPOINT_OUT_BUFFER.init([0; 256]),
        config,
    );

    // per https://pid.codes, FOSS projects can apply to be listed under the vendor ID owned by InterBiometrics
    let vendor_id = 0x1209;
    let product_id = 0x3B0C;

    let mut config = embassy_usb::Config::new(vendor_id, product_id);
    config.manufacturer = Some("Pawpaw Works");
    config.product = Some("midibox");
    config.self_powered = true;
    config.max_power = 0;

    static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUFFER: StaticCell<[u8; 64]> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        &mut [], // no msos descriptors
        CONTROL_BUFFER.init([0; 64]),
    );

    // one jack per direction for each cable
    let class = MidiClass::new(&mut builder, 3, 3, 64);
    let usb = builder.build();
    let (sender, receiver) = class.split();

    unwrap!(spawner.spawn(usb_task(usb)));
    unwrap!(spawner.spawn(midi_rx_task(receiver, engine)));
    unwrap!(spawner.spawn(midi_tx_task(sender)));
}

/// Handles button presses, cycling the selected layer.
#[embassy_executor::task]
async fn layer_select_task(mut button: ExtiInput<'static>, engine: &'static EngineAsyncMutex) -> ! {
    loop {
        button.wait_for_rising_edge().await;
        let mut engine = engine.lock().await;
        let selected = LayerId::from_index(engine.global().selected_layer)
            .unwrap_or(LayerId::Layer8)
            .cycle();

        match engine.write_registers(
            Block::Global,
            global_offset::SELECTED_LAYER,
            &[selected.index() as u8],
            &mut UsbHost,
        ) {
            Ok(()) => info!("Selected {}", selected),
            Err(e) => error!("Could not select {}: {}", selected, e),
        }
    }
}

/// Lights the LED while the router is enabled.
#[embassy_executor::task]
async fn enabled_display_task(mut led: Output<'static>, engine: &'static EngineAsyncMutex) -> ! {
    loop {
        GLOBAL_CHANGED.wait().await;
        let enabled = engine.lock().await.global().config.enabled;
        led.set_level(Level::from(enabled));
    }
}

/// Turns a footswitch into pedal events: 127 while pressed, 0 once released.
#[embassy_executor::task(pool_size = 2)]
async fn footswitch_task(mut switch: ExtiInput<'static>, pedal: u8, engine: &'static EngineAsyncMutex) -> ! {
    let mut pressed = false;
    loop {
        switch.wait_for_any_edge().await;
        Timer::after_millis(DEBOUNCE_MS).await;

        // the switch closes to ground
        if switch.is_low() == pressed {
            continue;
        }
        pressed = !pressed;
        let value = if pressed { 127 } else { 0 };
        debug!("Footswitch pedal {} sent {}", pedal, value);
        engine.lock().await.handle_pedal(pedal, value, &mut UsbHost);
    }
}

#[embassy_executor::task]
async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) -> ! {
    usb.run().await
}

#[embassy_executor::task]
async fn midi_rx_task(mut receiver: Receiver<'static, UsbDriver>, engine: &'static EngineAsyncMutex) -> ! {
    let mut reader = PacketReader::default();
    loop {
        receiver.wait_connection().await;
        info!("USB connected");
        let _ = receive(&mut receiver, &mut reader, engine).await;
        info!("USB disconnected");
        engine.lock().await.performance_link_lost(&mut UsbHost);
    }
}

#[embassy_executor::task]
async fn midi_tx_task(mut sender: Sender<'static, UsbDriver>) -> ! {
    loop {
        sender.wait_connection().await;
        let _ = transmit(&mut sender).await;
    }
}

#[doc(hidden)]
struct Disconnected {}

impl From<EndpointError> for Disconnected {
    fn from(val: EndpointError) -> Self {
        match val {
            EndpointError::BufferOverflow => panic!("Buffer overflow"),
            EndpointError::Disabled => Disconnected {},
        }
    }
}

/// Feeds every message received over USB to the engine, according to the cable it arrived on.
async fn receive<'d, T: usb::Instance + 'd>(
    receiver: &mut Receiver<'d, usb::Driver<'d, T>>,
    reader: &mut PacketReader,
    engine: &'static EngineAsyncMutex,
) -> Result<(), Disconnected> {
    let mut buf = [0; 64];
    loop {
        let n = receiver.read_packet(&mut buf).await?;
        let now = Instant::now();
        let mut engine = engine.lock().await;

        reader.read(&buf[..n], |cable, message| match cable {
            PERFORMANCE_CABLE => engine.handle_performance_message(message, &mut UsbHost),
            _ => engine.handle_control_message(now, message, &mut UsbHost),
        });
    }
}

/// Sends queued packets, batching as many as fit in one USB transfer.
async fn transmit<'d, T: usb::Instance + 'd>(sender: &mut Sender<'d, usb::Driver<'d, T>>) -> Result<(), Disconnected> {
    let mut buf = [0; 64];
    loop {
        let packet = OUTGOING.receive().await;
        buf[..PACKET_SIZE].copy_from_slice(&packet);
        let mut len = PACKET_SIZE;

        while len < buf.len() {
            let Ok(packet) = OUTGOING.try_receive() else {
                break;
            };
            buf[len..len + PACKET_SIZE].copy_from_slice(&packet);
            len += PACKET_SIZE;
        }
        sender.write_packet(&buf[..len]).await?;
    }
}
