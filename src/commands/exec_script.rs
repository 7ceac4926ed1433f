use anyhow::{Context as _, Result};
use embedded::EmbeddedSession;
use embedded::script::replay;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use super::{Context, embedded_error};
use crate::cli::ServerArgs;
use crate::config::ServerSettings;

/// Entry point of a forked child: replay `script` against `home`.
pub fn run(ctx: &Context, home: PathBuf, script: PathBuf, boot_timeout: Option<u64>) -> Result<()> {
    let (config, _) = ctx.project_config()?;
    let args = ServerArgs {
        home: Some(home),
        boot_timeout,
        properties: Vec::new(),
    };
    let settings = ServerSettings::resolve(&config, &args)?;

    let file = File::open(&script)
        .with_context(|| format!("Could not open script {}", script.display()))?;
    let bridge = embedded::bridge::initialize(&settings.home, settings.management.clone())
        .map_err(embedded_error)?;
    let mut session = EmbeddedSession::new(bridge).with_boot_timeout(settings.boot_timeout);

    replay(BufReader::new(file), &mut session)
        .map_err(embedded_error)
        .with_context(|| format!("Failed to replay {}", script.display()))?;
    log::info!("Replayed {}", script.display());
    Ok(())
}
