use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use oxipix::domain::{ImageAsset, ResourceId, TransformDescriptor};
use oxipix::infrastructure::image::AnimatedDecoder;
use oxipix::infrastructure::{
    AppConfig, CliArgs, Command, ConfigStore, ImageLoader, spawn_playback,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level.to_tracing_level()).into())
        .from_env_lossy();

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let store = ConfigStore::locate(args.config.as_deref())?;
    let mut config = store
        .load()
        .wrap_err_with(|| format!("Failed to load config from {}", store.path().display()))?;
    config.merge_with_args(args);
    Ok(config)
}

async fn write_output(asset: &ImageAsset, path: &Path) -> Result<()> {
    match asset {
        ImageAsset::Static { raster } => {
            let raster = Arc::clone(raster);
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || {
                raster.save_with_format(&path, image::ImageFormat::Png)
            })
            .await??;
        }
        ImageAsset::Animated(animated) => {
            tokio::fs::write(path, &animated.bytes).await?;
        }
    }
    Ok(())
}

async fn run_load(
    loader: &ImageLoader,
    url: &str,
    transform: &str,
    output: Option<&Path>,
) -> Result<()> {
    let transform = TransformDescriptor::from_str(transform)?;
    let id = ResourceId::new(url);

    let started = Instant::now();
    let loaded = loader
        .load(&id, &transform)
        .await
        .wrap_err_with(|| format!("Failed to load {url}"))?;
    let (width, height) = loaded.asset.dimensions();

    match &loaded.asset {
        ImageAsset::Static { .. } => println!(
            "{url}: {width}x{height} still image from {} in {:?}",
            loaded.source,
            started.elapsed()
        ),
        ImageAsset::Animated(animated) => println!(
            "{url}: {width}x{height} {} with {} frames from {} in {:?}",
            animated.format,
            animated.frame_count,
            loaded.source,
            started.elapsed()
        ),
    }

    if let Some(path) = output {
        write_output(&loaded.asset, path).await?;
        println!("Wrote {}", path.display());
    }

    loader.flush().await;
    println!("{}", loader.memory_cache_stats());
    Ok(())
}

async fn run_prefetch(loader: ImageLoader, urls: Vec<String>) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let loader = loader.with_event_sender(tx);

    let started = loader.prefetch_batch(urls.into_iter().map(ResourceId::new));
    for _ in 0..started {
        let Some(event) = rx.recv().await else {
            break;
        };
        match event.state.loaded() {
            Some(loaded) => println!("{}: cached from {}", event.id, loaded.source),
            None => println!("{}: {:?}", event.id, event.state),
        }
    }

    loader.flush().await;
    println!(
        "Disk cache: {} files, {} KiB",
        loader.disk_cache_len(),
        loader.disk_cache_size() / 1024
    );
    Ok(())
}

async fn run_play(loader: &ImageLoader, url: &str, frames: u64) -> Result<()> {
    let id = ResourceId::new(url);
    let loaded = loader.load(&id, &TransformDescriptor::None).await?;
    let Some(animated) = loaded.asset.as_animated() else {
        return Err(eyre!("{url} is not an animated image"));
    };
    let decoder = loader.open_decoder(animated)?;
    println!(
        "Playing {} {}x{}: {} frames, {} ms, looping: {}",
        decoder.format(),
        decoder.width(),
        decoder.height(),
        decoder.frame_count(),
        decoder.duration(),
        decoder.is_looping()
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let last = Arc::new(Mutex::new(Instant::now()));
    let handle = spawn_playback(decoder, loader.frame_pool(), None, move |_, index| {
        let mut last = last.lock();
        let elapsed = last.elapsed();
        *last = Instant::now();
        if tx.send((index, elapsed)).is_err() {
            warn!("Frame receiver dropped");
        }
    });

    let mut rendered = 0u64;
    while rendered < frames {
        let Some((index, elapsed)) = rx.recv().await else {
            break;
        };
        println!("frame {index:>4} after {elapsed:?}");
        rendered += 1;
    }

    let summary = handle.stop().await;
    if let Some(e) = summary.error {
        return Err(e.into());
    }
    loader.flush().await;
    println!("{:?}", loader.frame_pool().stats());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    init_logging(&config)?;

    info!(version = oxipix::VERSION, "Starting {}", oxipix::NAME);

    let loader = ImageLoader::new(config.loader_config()).await?;

    match args.command {
        Command::Load {
            url,
            transform,
            output,
        } => run_load(&loader, &url, &transform, output.as_deref()).await?,
        Command::Prefetch { urls } => run_prefetch(loader, urls).await?,
        Command::Play { url, frames } => run_play(&loader, &url, frames).await?,
        Command::Clear => {
            loader.clear_all().await;
            println!("Cleared image caches");
        }
    }

    Ok(())
}
