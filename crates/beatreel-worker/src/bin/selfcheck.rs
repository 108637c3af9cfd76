use std::path::Path;
use std::process::Command;

use beatreel_capture::{CaptureConfig, ChromeLauncher, SurfaceLauncher};
use beatreel_models::ResolutionProfile;
use beatreel_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();
    let capture = CaptureConfig::from_env();

    println!(
        "beatreel-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_ffmpeg()?;
    ensure_visualizer(capture).await?;

    println!("beatreel-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    let marker = path.join(".selfcheck");
    tokio::fs::write(&marker, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("work dir {} is not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&marker).await?;
    Ok(())
}

fn ensure_ffmpeg() -> anyhow::Result<()> {
    let output = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffmpeg -version failed: {:?}", output.status));
    }
    Ok(())
}

/// Launch Chromium against the visualizer and wait for its render hook.
async fn ensure_visualizer(config: CaptureConfig) -> anyhow::Result<()> {
    let ready_timeout = config.ready_timeout;
    let url = config.visualizer_url.clone();
    let launcher = ChromeLauncher::new(config);

    let mut surface = launcher
        .launch(ResolutionProfile::FREE)
        .await
        .map_err(|e| anyhow::anyhow!("chromium check failed: {}", e))?;
    let ready = surface.wait_until_ready(ready_timeout).await;
    surface.close().await?;

    if !ready? {
        return Err(anyhow::anyhow!(
            "{} did not expose renderFrame within {}s",
            url,
            ready_timeout.as_secs()
        ));
    }
    Ok(())
}
