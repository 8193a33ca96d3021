//! fatmount binary
//!
//! Mounts a FAT image file or block device through FUSE.
//!
//! ## Usage
//!
//! ```bash
//! # Read-only (default)
//! fatmount disk.img /mnt/fat
//!
//! # Read-write
//! fatmount disk.img /mnt/fat -o rw,force
//!
//! # Print geometry, free space and the root listing as JSON
//! fatmount disk.img --inspect
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fatmount_core::disk::SectorStore;
use fatmount_core::{FatVfs, MountOptions};
use fatmount_fuse::{FatFuse, fuse_options, inspect};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Mount a FAT filesystem image through FUSE.
#[derive(Parser, Debug)]
#[command(name = "fatmount", version)]
#[command(about = "Mount a FAT image file or block device through FUSE")]
struct Args {
    /// Image file or block device holding the FAT filesystem
    image: PathBuf,

    /// Directory to mount on
    #[arg(required_unless_present = "inspect")]
    mountpoint: Option<PathBuf>,

    /// Mount options: ro, rw (with force), rw+, force; others go to FUSE
    #[arg(short = 'o', value_name = "OPTIONS")]
    options: Vec<String>,

    /// Print volume geometry, statistics and the root listing as JSON
    #[arg(long)]
    inspect: bool,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    SectorStore::check_source(&args.image)?;
    let vfs = Arc::new(FatVfs::new());

    if args.inspect {
        let report = inspect(&vfs, &args.image)
            .with_context(|| format!("inspecting {}", args.image.display()))?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let Some(mountpoint) = args.mountpoint else {
        anyhow::bail!("a mountpoint is required");
    };
    let opts = MountOptions::parse(&args.options);
    if opts.rw_without_force() {
        warn!("rw requires force; mounting read-only");
    }

    let volume = vfs
        .mount(&args.image, opts.volume_flags())
        .with_context(|| format!("mounting {}", args.image.display()))?;
    info!(
        image = %args.image.display(),
        mountpoint = %mountpoint.display(),
        read_only = opts.read_only(),
        "serving"
    );

    let session = fuser::mount2(
        FatFuse::new(volume.clone()),
        &mountpoint,
        &fuse_options(&args.image, &opts),
    );
    volume.unmount();
    session.with_context(|| format!("FUSE session on {}", mountpoint.display()))
}
