use firmata_host::{Board, PinConfig, PinMode, Result};
use std::{thread, time::Duration};

const PORT: &str = "/dev/ttyACM0";
const BAUD: u32 = 57_600;
const LED_PIN: u8 = 13;

fn main() -> Result<()> {
    env_logger::init();

    let config = PinConfig::parse(&[
        "", "", "", "", "", "", "", "", "", "", "", "", "", "digitalOut",
    ])?;
    let mut board = Board::open_serial(PORT, BAUD, config);

    println!("Connecting to {PORT}...");
    let mut on = false;
    let mut last_toggle = std::time::Instant::now();
    let mut announced_epoch = 0;

    loop {
        board.pump_read()?;
        if board.is_ready() {
            if board.connection_epoch() != announced_epoch {
                announced_epoch = board.connection_epoch();
                println!(
                    "Ready: firmware {} v{}.{}, {} pins",
                    board.firmware_name(),
                    board.firmware_version().map(|v| v.0).unwrap_or(0),
                    board.firmware_version().map(|v| v.1).unwrap_or(0),
                    board.pin_count()
                );
                assert_eq!(board.pin_mode(LED_PIN)?, PinMode::Output);
            }
            if last_toggle.elapsed() >= Duration::from_millis(400) {
                on = !on;
                board.write_digital(LED_PIN, on)?;
                last_toggle = std::time::Instant::now();
            }
        }
        board.pump_write()?;
        thread::sleep(Duration::from_millis(16));
    }
}
