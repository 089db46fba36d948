//! PriceLens - console host
//!
//! Runs one capture session against a still image standing in for the
//! camera and prints every snapshot the session publishes.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use price_lens::capture::frame::Dimensions;
use price_lens::capture::StillImageSource;
use price_lens::config;
use price_lens::conversion::HttpRateService;
use price_lens::vision::OcrEngineFactory;
use price_lens::{CaptureSessionController, CurrencyCode, SessionSnapshot, SessionState};

/// PriceLens - convert the price in a photo
#[derive(Parser, Debug)]
#[command(name = "price-lens")]
#[command(about = "Detect a price in an image and convert it to another currency")]
struct Args {
    /// Image used in place of a camera frame
    #[arg(short, long)]
    image: PathBuf,

    /// Target currency (defaults to the configured one)
    #[arg(short, long)]
    to: Option<String>,

    /// Source currency, overriding the detected symbol
    #[arg(short, long)]
    from: Option<String>,

    /// Path to a config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rendered video size as WIDTHxHEIGHT, for the overlay box
    #[arg(long)]
    viewport: Option<String>,

    /// Convert without asking for confirmation
    #[arg(short, long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = config::load_or_default(args.config.as_deref());

    let to: CurrencyCode = args
        .to
        .as_deref()
        .unwrap_or(&config.conversion.default_to)
        .parse()
        .map_err(anyhow::Error::msg)?;
    let from: Option<CurrencyCode> = args
        .from
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let viewport = args.viewport.as_deref().map(parse_viewport).transpose()?;

    let rates = Arc::new(HttpRateService::from_settings(&config.conversion)?);
    let media = Arc::new(StillImageSource::new(&args.image));
    info!("PriceLens starting on {:?}", media.path());
    let controller = CaptureSessionController::new(&config, media, ocr_factory()?, rates)?;

    let printer = tokio::spawn(print_snapshots(controller.subscribe()));

    controller.start().await;
    if let Some(viewport) = viewport {
        controller.set_viewport(viewport);
    }
    controller.capture().await;

    if controller.state() == SessionState::AwaitingConfirmation {
        let confirmed = args.yes || ask_confirmation(to).await?;
        if confirmed {
            controller.confirm_with(from, to).await;
        } else {
            controller.cancel();
        }
    }

    let last = controller.snapshot();
    controller.dispose().await;
    printer.await?;

    if let SessionState::Failed(reason) = last.state {
        bail!(reason);
    }
    if let Some(text) = last.result_text() {
        println!("{text}");
    }
    Ok(())
}

#[cfg(feature = "tesseract")]
fn ocr_factory() -> Result<Arc<dyn OcrEngineFactory>> {
    Ok(Arc::new(price_lens::vision::TesseractFactory))
}

#[cfg(not(feature = "tesseract"))]
fn ocr_factory() -> Result<Arc<dyn OcrEngineFactory>> {
    bail!("built without an OCR backend, rebuild with `--features tesseract`")
}

/// Print snapshots until the session is disposed
async fn print_snapshots(mut rx: watch::Receiver<SessionSnapshot>) {
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        println!("{}", describe(&snapshot));
        if snapshot.state == SessionState::Disposed {
            break;
        }
    }
}

fn describe(snapshot: &SessionSnapshot) -> String {
    let mut line = format!("[cycle {}] {}", snapshot.cycle, snapshot.state);
    if snapshot.state.is_busy() {
        line.push_str("...");
    }
    if let Some(price) = &snapshot.price {
        line.push_str(&format!(" | price {:?}", price.raw_match));
        if let Some(hint) = price.currency_hint {
            line.push_str(&format!(" ({hint})"));
        }
    }
    if let Some(b) = &snapshot.display_box {
        line.push_str(&format!(
            " | box {:.0},{:.0} {:.0}x{:.0}",
            b.left, b.top, b.width, b.height
        ));
    }
    if let Some(text) = snapshot.result_text() {
        line.push_str(&format!(" | {text}"));
    }
    line
}

async fn ask_confirmation(to: CurrencyCode) -> Result<bool> {
    tokio::task::spawn_blocking(move || -> Result<bool> {
        print!("Convert to {to}? [Y/n] ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        let answer = answer.trim().to_ascii_lowercase();
        Ok(answer.is_empty() || answer == "y" || answer == "yes")
    })
    .await?
}

fn parse_viewport(s: &str) -> Result<Dimensions> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .with_context(|| format!("viewport {s:?} is not WIDTHxHEIGHT"))?;
    let width: f64 = w.trim().parse().context("invalid viewport width")?;
    let height: f64 = h.trim().parse().context("invalid viewport height")?;
    if width <= 0.0 || height <= 0.0 {
        bail!("viewport must be positive, got {s:?}");
    }
    Ok(Dimensions::new(width, height))
}
