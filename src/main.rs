use std::io::{BufRead, Write};

use anyhow::Result;
use sente_protocol::ProtocolEngine;
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    info!("sente starting");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut engine = ProtocolEngine::new();

    let mut lines = stdin.lock().lines();
    while let Some(line) = lines.next() {
        let line = line?;

        // a position upload continues until its DONE terminator
        let mut extra_lines = Vec::new();
        let command = line.trim();
        if command.eq_ignore_ascii_case("BOARD") || command.eq_ignore_ascii_case("YXBOARD") {
            for extra in lines.by_ref() {
                let extra = extra?;
                let done = extra.trim().eq_ignore_ascii_case("DONE");
                extra_lines.push(extra);
                if done {
                    break;
                }
            }
        }

        for response in engine.handle_line(&line, &extra_lines) {
            writeln!(stdout, "{response}")?;
        }
        stdout.flush()?;

        if engine.is_finished() {
            break;
        }
    }

    info!("sente exiting");
    Ok(())
}
