use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use serde_json::Value;
use voiceplan_core::{ValidationContext, ValidationOptions, validate_plan};

pub(crate) fn run(file: &Path, strict: bool) -> Result<ExitCode> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let plan: Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", file.display()))?;
    let options = ValidationOptions { strict, dry_run: true, ..ValidationOptions::default() };
    let report = validate_plan(&plan, &ValidationContext::default(), &options);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.passes(strict) {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::warn!(summary = %report.summary(), "plan failed validation");
        Ok(ExitCode::FAILURE)
    }
}
