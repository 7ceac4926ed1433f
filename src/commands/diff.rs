use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Utc};
use embedded::EmbeddedSession;
use featurediff::{
    ConfigDiff, ConfigReader, LocalSpecRegistry, ProvisionedConfig, ProvisionedState, classify,
};
use serde::Serialize;
use std::fs;
use std::path::Path;

use super::{Context, diff_error, embedded_error};
use crate::cli::DiffArgs;
use crate::config::ServerSettings;
use crate::ui;

/// JSON written by `--output`.
#[derive(Serialize)]
struct DiffReport<'a> {
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    diff: &'a ConfigDiff,
}

pub fn run(ctx: &Context, args: DiffArgs) -> Result<()> {
    let (config, _) = ctx.project_config()?;
    let settings = ServerSettings::resolve(&config, &args.server)?;

    let registry = LocalSpecRegistry::load(&args.specs)
        .map_err(diff_error)
        .with_context(|| format!("Failed to load feature specs from {}", args.specs.display()))?;
    if registry.is_empty() {
        bail!("No feature specs found under {}", args.specs.display());
    }
    log::info!("Loaded {} feature specs", registry.len());

    let mut baseline = match &args.baseline {
        Some(path) => ProvisionedState::load(path).map_err(diff_error)?,
        None => ProvisionedState::default(),
    };

    let bridge = embedded::bridge::initialize(&settings.home, settings.management.clone())
        .map_err(embedded_error)?;
    let session = EmbeddedSession::new(bridge).with_boot_timeout(settings.boot_timeout);
    let mut reader = ConfigReader::new(session, &registry).with_extra_args(settings.properties);

    let mut configs = Vec::with_capacity(args.files.len());
    for file in &args.files {
        configs.push(read_one(ctx, &mut reader, file)?);
    }

    let diff = classify(&baseline, configs.iter().cloned());
    if !ctx.quiet {
        print_summary(&diff);
    }

    if let Some(output) = &args.output {
        write_report(output, &diff)?;
        if !ctx.quiet {
            ui::success(&format!("Wrote {}", output.display()));
        }
    }

    if args.update_baseline
        && let Some(path) = &args.baseline
    {
        for config in configs {
            baseline.upsert(config);
        }
        baseline.save(path).map_err(diff_error)?;
        if !ctx.quiet {
            ui::success(&format!("Updated baseline {}", path.display()));
        }
    }
    Ok(())
}

fn read_one<B: embedded::ManagementBridge>(
    ctx: &Context,
    reader: &mut ConfigReader<'_, B>,
    file: &Path,
) -> Result<ProvisionedConfig> {
    let spinner = (!ctx.quiet).then(|| ui::spinner(&format!("Reading {}", file.display())));
    let result = reader.read(file);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    result
        .map_err(diff_error)
        .with_context(|| format!("Failed to read {}", file.display()))
}

fn write_report(path: &Path, diff: &ConfigDiff) -> Result<()> {
    let report = DiffReport {
        generated_at: Utc::now(),
        diff,
    };
    let content = serde_json::to_string_pretty(&report).context("Failed to serialize diff")?;
    fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))
}

fn print_summary(diff: &ConfigDiff) {
    ui::header("Configuration diff");
    if diff.is_empty() {
        ui::dim("No configurations read");
        return;
    }
    for (label, configs) in [("Added", &diff.added), ("Updated", &diff.updated)] {
        if configs.is_empty() {
            continue;
        }
        ui::section(label);
        for config in configs {
            ui::kv(
                &format!("{} {}", config.model, config.name),
                &ui::plural(config.features.len(), "feature"),
            );
            for (spec, count) in config.feature_counts() {
                ui::dim(&format!("{}: {}", spec, count));
            }
        }
    }
}
