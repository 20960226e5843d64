//! Binary entrypoint: browse a local photo library from the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser, Subcommand};
use futures::StreamExt;
use image::DynamicImage;
use photo_loader::config::Configuration;
use photo_loader::platform::PhotoPlatform;
use photo_loader::{LocalLibrary, PhotoAlbum, PhotoLoader, Size};
use tracing::{Level, debug, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "photo-loader", about = "Browse a photo library as async streams")]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the library root
    #[arg(long, value_name = "DIR")]
    library: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List albums with their asset counts
    Albums,
    /// List the assets of an album
    Assets { album: usize },
    /// Save an asset's thumbnail
    Thumb {
        album: usize,
        asset: usize,
        #[arg(long, value_parser = parse_size, default_value = "256x256")]
        size: Size,
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Save an asset's original image
    Original {
        album: usize,
        asset: usize,
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Print the album count whenever the library changes
    Watch,
}

fn parse_size(raw: &str) -> Result<Size, String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {raw:?}"))?;
    let parse = |v: &str| v.trim().parse::<f64>().map_err(|e| format!("{v:?}: {e}"));
    Ok(Size::new(parse(w)?, parse(h)?))
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("photo_loader={level}").parse()?)
        .add_directive("notify=warn".parse()?);
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Configuration> {
    let mut cfg = match &cli.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(library) = &cli.library {
        cfg.library_path = library.clone();
    }
    cfg.validated().context("validating configuration")
}

fn album_at(loader: &PhotoLoader, index: usize) -> Result<PhotoAlbum> {
    loader
        .items_for_album(index)
        .ok_or_else(|| anyhow!("no album at index {index}"))
}

fn save(image: Option<DynamicImage>, out: &Path) -> Result<()> {
    let Some(image) = image else {
        bail!("no image data for the requested asset");
    };
    image
        .save(out)
        .with_context(|| format!("writing {}", out.display()))?;
    info!(path = %out.display(), "saved image");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    let cfg = load_config(&cli)?;

    let platform: Arc<dyn PhotoPlatform> = Arc::new(LocalLibrary::from_config(&cfg)?);
    let loader = PhotoLoader::with_settings(platform, cfg.requests.clone());

    let mut counts = loader.number_of_albums();
    let total = counts
        .next()
        .await
        .ok_or_else(|| anyhow!("album count stream ended without a value"))??;

    match cli.command {
        Command::Albums => {
            println!("{total} albums");
            for index in 0..total {
                let album = album_at(&loader, index)?;
                println!("{index:>4}  {:<32} {:>6}", album.album_title(), album.images_count());
            }
        }
        Command::Assets { album } => {
            let album = album_at(&loader, album)?;
            for (index, asset) in album.assets().iter().enumerate() {
                let (w, h) = asset.pixel_size();
                println!("{index:>5}  {:<5}  {w:>5}x{h:<5}  {}", asset.asset_type(), asset.id());
            }
        }
        Command::Thumb {
            album,
            asset,
            size,
            out,
        } => {
            let asset = album_at(&loader, album)?.asset(asset).await?;
            let mut thumbs = asset.thumb_image(size);
            let mut last = None;
            while let Some(image) = thumbs.next().await {
                last = image?;
            }
            save(last, &out)?;
        }
        Command::Original { album, asset, out } => {
            let asset = album_at(&loader, album)?.asset(asset).await?;
            let mut originals = asset.original_image(|fraction| {
                debug!(progress = fraction, "downloading original");
            });
            let image = originals
                .next()
                .await
                .ok_or_else(|| anyhow!("original image stream ended without a value"))??;
            save(image, &out)?;
        }
        Command::Watch => {
            println!("{total} albums");
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    next = counts.next() => match next {
                        Some(count) => println!("{} albums", count?),
                        None => break,
                    },
                }
            }
        }
    }
    Ok(())
}
