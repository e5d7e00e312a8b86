mod commands;
mod session;

use std::io::{self, BufRead, Write};
use std::process;

use node_core::bus::BusConfig;
use node_core::sim::SimBus;

use session::{Outcome, Session};

fn main() -> io::Result<()> {
    let sensor = SimBus::new(BusConfig::DEFAULT.address, BusConfig::DEFAULT.command_prefix);
    let mut session = Session::new(&sensor).unwrap_or_else(|fault| {
        eprintln!("node failed to start: {fault}");
        process::exit(1);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut line = String::new();

    writeln!(
        writer,
        "Light node emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match session.handle_line(trimmed) {
            Outcome::Continue(responses) => {
                for response in responses {
                    writeln!(writer, "{response}")?;
                }
            }
            Outcome::Exit => {
                writeln!(writer, "Session closed.")?;
                break;
            }
        }
    }

    Ok(())
}
