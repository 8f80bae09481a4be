use std::path::Path;

use anyhow::Context;
use gridscale_orchestrator::ScalingPolicy;
use gridscale_policy::{Normalizer, Policy, PolicyError};
use gridscale_state::SyncConfig;
use tracing::debug;

pub fn check(file: &str, config: Option<&str>, format: &str) -> anyhow::Result<()> {
    let normalizer = match config {
        Some(path) => Normalizer::new(SyncConfig::from_file(Path::new(path))?.canonical),
        None => Normalizer::default(),
    };
    let defaults = normalizer.defaults();
    debug!(
        file,
        default_target = %defaults.target,
        default_source = %defaults.source,
        "checking policy"
    );

    match normalize_file(Path::new(file), &normalizer) {
        Ok(policy) => {
            match format {
                "text" => println!("{}", format_policy(&policy)),
                _ => println!("{}", serde_json::to_string_pretty(&policy)?),
            }
            Ok(())
        }
        Err(e) => {
            if let Some(PolicyError::Validation { errors, .. }) = e.downcast_ref::<PolicyError>() {
                for error in errors.iter() {
                    eprintln!("  {error}");
                }
            }
            Err(e)
        }
    }
}

fn normalize_file(path: &Path, normalizer: &Normalizer) -> anyhow::Result<Policy> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let raw: ScalingPolicy = serde_json::from_str(&content)
        .with_context(|| format!("decoding {}", path.display()))?;
    Ok(normalizer.normalize(&raw)?)
}

fn format_policy(policy: &Policy) -> String {
    let mut out = format!("✓ Policy {}\n", policy.id);
    out.push_str(&format!("  Source:   {}\n", policy.source));
    out.push_str(&format!("  Query:    {}\n", policy.query));
    if !policy.interval.is_zero() {
        out.push_str(&format!("  Interval: {:?}\n", policy.interval));
    }
    out.push_str(&format!("  Target:   {}\n", policy.target.name));
    for (key, value) in policy.target.config.iter().flatten() {
        out.push_str(&format!("    {key} = {value}\n"));
    }
    out.push_str(&format!(
        "  Strategy: {} (min {}, max {})",
        policy.strategy.name, policy.strategy.min, policy.strategy.max
    ));
    for (key, value) in &policy.strategy.config {
        out.push_str(&format!("\n    {key} = {value}"));
    }
    out
}
