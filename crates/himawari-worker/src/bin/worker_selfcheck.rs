use std::path::Path;

use himawari_media::check_tool;
use himawari_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={} tool={}",
        config.work_dir.display(),
        config.ffmpeg_path.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_tool(&config.ffmpeg_path).await?;
    ensure_coordinator(&config)?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir(path: &Path) -> anyhow::Result<()> {
    himawari_media::ensure_work_dir(path).await?;

    let scratch = tempfile::Builder::new()
        .prefix(".selfcheck-")
        .tempfile_in(path)
        .map_err(|e| anyhow::anyhow!("work dir {} is not writable: {}", path.display(), e))?;
    drop(scratch);
    Ok(())
}

async fn ensure_tool(program: &Path) -> anyhow::Result<()> {
    let resolved = check_tool(program)?;

    let output = tokio::process::Command::new(&resolved)
        .arg("-version")
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("{} not available: {}", resolved.display(), e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "{} -version failed: {:?}",
            resolved.display(),
            output.status
        ));
    }
    Ok(())
}

fn ensure_coordinator(config: &WorkerConfig) -> anyhow::Result<()> {
    if config.coordinator.trim().is_empty() {
        return Err(anyhow::anyhow!("missing required env var HIMAWARI_COORDINATOR"));
    }
    config.validate()?;
    Ok(())
}
