//! Mode Bridge is [Embassy](https://embassy.dev)-based firmware for a two-voice MIDI to CV/gate interface. The
//! firmware runs on the [Nucleo-F767ZI development board](https://www.st.com/en/evaluation-tools/nucleo-f767zi.html),
//! which is powered by an F7-series STM32 microcontroller.
//!
//! The device enumerates as a USB MIDI class device. The channel of the most recent message selects what the outputs
//! do (mono or duophonic CV/gate, polyphony, controller conversion, drum triggers, random voltages, calibration); see
//! [`Mode`][mode_bridge_lib::Mode]. Two CVs come from the on-chip DAC, two gates from GPIO, and a square wave from a
//! timer acting as a digitally controlled oscillator.
//!
//! For details about the hardware or how to use the device, see the `README`.

#![no_std]
#![no_main]

mod output;

use crate::output::Outputs;
use defmt::{panic, *};
use embassy_executor::Spawner;
use embassy_stm32::{
    Config, bind_interrupts,
    dac::Dac,
    gpio::{Level, Output, OutputType, Speed},
    peripherals,
    time::Hertz,
    timer::{
        low_level::CountingMode,
        simple_pwm::{PwmPin, SimplePwm},
    },
    usb,
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex, signal::Signal};
use embassy_time::{Duration, Ticker};
use embassy_usb::{Builder, UsbDevice, class::midi::MidiClass, driver::EndpointError};
use mode_bridge_lib::{MidiState, Operation, Renderer, configuration::Config as EngineConfig};
use static_cell::StaticCell;

use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(
    #[doc(hidden)]
    struct Irqs {
        OTG_FS => usb::InterruptHandler<peripherals::USB_OTG_FS>;
    }
);

type UsbDriver = usb::Driver<'static, peripherals::USB_OTG_FS>;

/// What the MIDI, tick, and output tasks share; locking it keeps a render from seeing half a batch of packets.
struct Engine {
    state: MidiState,
    renderer: Renderer,
}

type EngineAsyncMutex = mutex::Mutex<CriticalSectionRawMutex, Engine>;

/// Wakes the output task when the state has changed since the last frame was written.
static REFRESH: Signal<CriticalSectionRawMutex, ()> = Signal::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Initializing Mode Bridge");

    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        // hse: high-speed external clock
        config.rcc.hse = Some(Hse {
            freq: Hertz(8_000_000),
            mode: HseMode::Bypass,
        });

        // pll: phase-locked loop, crucial for dividing clock
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL216,
            divp: Some(PllPDiv::DIV2), // 8mhz / 4 * 216 / 2 = 216Mhz
            // per section 5.2 of RM0410: the 48MHz clock used for USB OTG FS is derived from the main PLL VCO
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

    let engine_config = EngineConfig::default();
    static ENGINE: StaticCell<EngineAsyncMutex> = StaticCell::new();
    let engine = ENGINE.init(mutex::Mutex::new(Engine {
        state: MidiState::new(&engine_config),
        renderer: Renderer::new(),
    }));

    // Create the driver, from the HAL.
    static ENDPOINT_OUT_BUFFER: StaticCell<[u8; 256]> = StaticCell::new();
    let mut config = embassy_stm32::usb::Config::default();

    // Per section 6.10 of the Nucleo board manual (UM1974), CN13 (the USB port) cannot power the board, so the device
    // is self-powered and must enable vbus_detection.
    config.vbus_detection = true;

    let driver = usb::Driver::new_fs(
        p.USB_OTG_FS,
        Irqs,
        p.PA12,
        p.PA11,
        ENDPOINT_OUT_BUFFER.init([0; 256]),
        config,
    );

    // per https://pid.codes, 0x1209/0x0001 is set aside for testing
    let vendor_id = 0x1209;
    let product_id = 0x0001;

    let mut config = embassy_usb::Config::new(vendor_id, product_id);
    config.manufacturer = Some("Pawpaw Works");
    config.product = Some("Mode Bridge");
    config.self_powered = true;
    config.max_power = 0;

    // Create embassy-usb DeviceBuilder using the driver and config.
    // It needs some buffers for building the descriptors.
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

    let class = MidiClass::new(&mut builder, 0, 1, 64);
    let usb = builder.build();

    // per RM0410 (the reference manual for the chip), DAC channel 1 outputs on PA4 and channel 2 on PA5
    let (cv0, cv1) = Dac::new(p.DAC1, p.DMA1_CH5, p.DMA1_CH6, p.PA4, p.PA5).split();

    let gates = [
        Output::new(p.PG0, Level::Low, Speed::Low),
        Output::new(p.PG1, Level::Low, Speed::Low),
    ];

    // TIM1 channel 1 is broken out on PE9; the frequency is replaced as soon as a note is played
    let dco_pin = PwmPin::new(p.PE9, OutputType::PushPull);
    let dco = SimplePwm::new(
        p.TIM1,
        Some(dco_pin),
        None,
        None,
        None,
        Hertz(440),
        CountingMode::EdgeAlignedUp,
    );

    unwrap!(spawner.spawn(usb_task(usb)));
    unwrap!(spawner.spawn(midi_task(class, engine)));
    unwrap!(spawner.spawn(tick_task(
        engine,
        Duration::from_micros(engine_config.tick_interval.as_micros())
    )));
    unwrap!(spawner.spawn(output_task(Outputs::new(cv0, cv1, gates, dco), engine)));

    // bring the outputs to the initial frame
    REFRESH.signal(());
}

#[embassy_executor::task]
async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) -> ! {
    usb.run().await
}

#[embassy_executor::task]
async fn midi_task(mut class: MidiClass<'static, UsbDriver>, engine: &'static EngineAsyncMutex) -> ! {
    loop {
        class.wait_connection().await;
        info!("USB connected");
        let _ = process_midi(&mut class, engine).await;
        info!("USB disconnected");
    }
}

/// Advances retriggers and drum pulses at a fixed rate.
#[embassy_executor::task]
async fn tick_task(engine: &'static EngineAsyncMutex, interval: Duration) -> ! {
    let mut ticker = Ticker::every(interval);
    loop {
        ticker.next().await;
        if engine.lock().await.state.tick() {
            REFRESH.signal(());
        }
    }
}

/// Writes a new frame to the hardware whenever the state has changed.
#[embassy_executor::task]
async fn output_task(mut outputs: Outputs, engine: &'static EngineAsyncMutex) -> ! {
    loop {
        REFRESH.wait().await;
        let frame = {
            let mut guard = engine.lock().await;
            let engine = &mut *guard;
            engine.renderer.refresh(&mut engine.state).copied()
        };

        if let Some(frame) = frame {
            trace!("Writing {}", frame);
            outputs.write(&frame);
        }
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

/// Helper function which interprets data received over USB.
///
/// Applies each read to the state in one critical section and wakes the output task if anything changed.
async fn process_midi<'d, T: usb::Instance + 'd>(
    class: &mut MidiClass<'d, usb::Driver<'d, T>>,
    engine: &'static EngineAsyncMutex,
) -> Result<(), Disconnected> {
    let mut buf = [0; 64];
    loop {
        let n = class.read_packet(&mut buf).await?;
        let mut guard = engine.lock().await;
        match guard.state.update(&buf[..n]) {
            Ok(operation) => {
                if operation.contains(Operation::ModeChange) {
                    info!("Now in {}", guard.state.mode());
                }
                if guard.state.needs_refresh() {
                    REFRESH.signal(());
                }
            }
            // a malformed read is dropped; the next one is still processed
            Err(e) => warn!("Dropped {} bytes: {}", n, e),
        }
    }
}
