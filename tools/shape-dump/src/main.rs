use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use comshadow_common::{init_logging, BridgeConfig};
use comshadow_core::{ShapeInfo, ShapeRegistry};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Print the registered callback shapes and their vtable layouts")]
struct Args {
    /// TOML bridge config (defaults to $COMSHADOW_CONFIG, then built-in defaults)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only print this shape (e.g. IDWriteTextRenderer)
    #[arg(short, long, value_name = "NAME")]
    shape: Option<String>,

    /// Omit inherited slots
    #[arg(long)]
    own_only: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::from_env().context("Failed to read bridge config from the environment")?,
    };
    init_logging(&config);
    comshadow_core::configure(&config);

    comshadow_dwrite::install().context("Failed to register DirectWrite shapes")?;

    let shapes: Vec<ShapeInfo> = ShapeRegistry::global()
        .shapes()
        .into_iter()
        .filter(|s| args.shape.as_deref().map_or(true, |name| s.id.name() == name))
        .collect();
    if shapes.is_empty() {
        bail!("No shape named {:?}", args.shape.unwrap_or_default());
    }
    info!("Dumping {} shapes", shapes.len());

    for shape in &shapes {
        print_shape(shape, args.own_only);
    }
    Ok(())
}

fn print_shape(shape: &ShapeInfo, own_only: bool) {
    match shape.base {
        Some(base) => println!("{} {{{}}} : {}", shape.id, shape.iid, base),
        None => println!("{} {{{}}}", shape.id, shape.iid),
    }
    for slot in shape.slots.iter().filter(|s| !own_only || s.owner == shape.id) {
        println!("  [{:2}] {:<28} {}", slot.index, slot.owner.name(), slot.method);
    }
    println!();
}
