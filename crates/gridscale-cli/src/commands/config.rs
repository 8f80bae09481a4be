use std::path::Path;

use gridscale_orchestrator::RetryPolicy;
use gridscale_state::SyncConfig;

pub fn check(file: &str) -> anyhow::Result<()> {
    let config = SyncConfig::from_file(Path::new(file))?;
    println!("✓ {file} is valid");
    println!("{}", format_settings(&config)?);
    Ok(())
}

fn format_settings(config: &SyncConfig) -> anyhow::Result<String> {
    let retry = match config.retry_policy()? {
        RetryPolicy::Immediate => "immediate".to_string(),
        RetryPolicy::Exponential { base, max } => format!("exponential ({base:?} → {max:?})"),
    };
    let canonical = config.canonical_defaults();
    Ok(format!(
        "  Retry:     {retry}\n  Wait time: {:?}\n  Target:    {}\n  Source:    {}",
        config.wait_time()?,
        canonical.target,
        canonical.source
    ))
}
