use anyhow::{Context as _, Result};
use embedded::plan::apply;
use embedded::{ChildLauncher, EmbeddedSession, ForkedExecutor, GenerationPlan, NoProgress};
use std::path::Path;

use super::{Context, embedded_error};
use crate::cli::{BOOT_TIMEOUT_ENV, CONFIG_ENV, GenerateArgs};
use crate::config::{ServerSettings, collect_properties, ensure_forkable};
use crate::ui;

pub fn run(ctx: &Context, args: GenerateArgs) -> Result<()> {
    let (config, config_path) = ctx.project_config()?;
    let plan = GenerationPlan::load(&args.plan)
        .map_err(embedded_error)
        .with_context(|| format!("Failed to load plan {}", args.plan.display()))?;

    if plan.configs.is_empty() {
        ui::warn("The plan has no configurations to generate");
        return Ok(());
    }

    if args.dry_run {
        let properties = collect_properties(&args.server.properties)?;
        ensure_forkable(&properties)?;
        let mut forked = ForkedExecutor::new();
        apply(&plan, &properties, &mut forked, &mut NoProgress).map_err(embedded_error)?;
        print!("{}", forked.script());
        return Ok(());
    }

    let settings = ServerSettings::resolve(&config, &args.server)?;
    if !ctx.quiet {
        ui::header("Generating configurations");
        ui::kv("Installation", &settings.home.display().to_string());
        ui::kv("Plan", &args.plan.display().to_string());
        ui::kv(
            "Operations",
            &ui::plural(plan.operation_count(), "operation"),
        );
        println!();
    }

    if args.forked || config.installation.forked {
        run_forked(ctx, &plan, &settings, config_path.as_deref())?;
    } else {
        let bridge = embedded::bridge::initialize(&settings.home, settings.management.clone())
            .map_err(embedded_error)?;
        let mut session = EmbeddedSession::new(bridge).with_boot_timeout(settings.boot_timeout);
        let mut progress = ui::SpinnerProgress::new(ctx.quiet);
        apply(&plan, &settings.properties, &mut session, &mut progress).map_err(embedded_error)?;
    }

    if !ctx.quiet {
        ui::success(&format!(
            "Generated {}",
            ui::plural(plan.configs.len(), "configuration")
        ));
    }
    Ok(())
}

fn run_forked(
    ctx: &Context,
    plan: &GenerationPlan,
    settings: &ServerSettings,
    config_path: Option<&Path>,
) -> Result<()> {
    ensure_forkable(&settings.properties)?;
    let mut forked = ForkedExecutor::new();
    apply(plan, &settings.properties, &mut forked, &mut NoProgress).map_err(embedded_error)?;

    let mut launcher = ChildLauncher::current_exe(&settings.home).map_err(embedded_error)?;
    for _ in 0..ctx.verbose {
        launcher = launcher.arg("-v");
    }
    if let Some(path) = config_path {
        let path = std::fs::canonicalize(path)
            .with_context(|| format!("Could not resolve {}", path.display()))?;
        launcher = launcher.env(CONFIG_ENV, path.to_string_lossy());
    }
    if let Some(timeout) = settings.boot_timeout {
        launcher = launcher.env(BOOT_TIMEOUT_ENV, timeout.as_secs().to_string());
    }

    if !ctx.quiet {
        ui::info("Replaying the plan in a forked process");
    }
    forked.run(&launcher).map_err(embedded_error)
}
