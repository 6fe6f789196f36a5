use std::io::{Read, Write};
use std::process::ExitCode;

use anyhow::Result;
use voiceplan_core::pii;

pub(crate) fn run() -> Result<ExitCode> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let redaction = pii::redact(&input);
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(redaction.text.as_bytes())?;
    stdout.flush()?;
    tracing::info!(total = redaction.total(), counts = ?redaction.counts, "redaction complete");
    Ok(ExitCode::SUCCESS)
}
