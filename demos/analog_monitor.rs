use firmata_host::{Board, Message, PinConfig, Result};
use std::{thread, time::Duration};

const PORT: &str = "/dev/ttyACM0";
const BAUD: u32 = 57_600;

fn main() -> Result<()> {
    env_logger::init();

    // No explicit table: every analog-capable pin defaults to analog input.
    let mut board = Board::open_serial(PORT, BAUD, PinConfig::default());

    println!("Connecting to {PORT}...");
    let mut last_print = std::time::Instant::now();

    loop {
        board.pump_read()?;
        while let Some(event) = board.next_event() {
            if let Message::StringData(text) = event {
                println!("firmware says: {text}");
            }
        }
        if board.is_ready() && last_print.elapsed() >= Duration::from_millis(500) {
            let values: Vec<u16> = (0..board.analog_pin_count())
                .map(|ch| board.read_analog(ch))
                .collect::<Result<_>>()?;
            println!("analog: {values:?}");
            last_print = std::time::Instant::now();
        }
        board.pump_write()?;
        thread::sleep(Duration::from_millis(16));
    }
}
