use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use memfs::{FsConfig, Latency, MemFs};

/// Loads host files into a fresh in-memory filesystem and copies them back out.
#[derive(Parser)]
struct Args {
    /// Host files to import, each stored under its file name
    files: Vec<PathBuf>,
    /// Directory to export the stored files to
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Number of data blocks
    #[arg(long, default_value_t = 1024)]
    blocks: usize,
    /// Size of a data block in bytes
    #[arg(long, default_value_t = 1024)]
    block_size: usize,
    /// Number of inodes, the directory included
    #[arg(long, default_value_t = 50)]
    inodes: usize,
    /// Number of simultaneously open files
    #[arg(long, default_value_t = 20)]
    open_files: usize,
    /// Number of direct block references per inode
    #[arg(long, default_value_t = 10)]
    direct: usize,
    /// Busy-wait iterations simulating the latency of every table access
    #[arg(long, default_value_t = 0)]
    delay: usize,
    /// Check the tables for consistency before exporting
    #[arg(long)]
    check: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let config = FsConfig {
        num_inodes: args.inodes,
        num_blocks: args.blocks,
        block_size: args.block_size,
        max_open_files: args.open_files,
        num_direct: args.direct,
        // touched while table locks are held, so it must not sleep
        latency: Latency::spin(args.delay),
    };

    let memfs = MemFs::new(config).context("unable to initialize filesystem")?;

    for file in &args.files {
        let name = file
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("{} has no usable file name", file.display()))?;

        memfs
            .import(file, &format!("/{name}"))
            .with_context(|| format!("unable to import {}", file.display()))?;
    }

    if args.check {
        memfs.check().context("filesystem check failed")?;
    }

    let entries = memfs.read_dir()?;

    if let Some(out_dir) = &args.out_dir {
        for entry in &entries {
            let path = format!("/{}", entry.name);

            memfs
                .export(&path, out_dir.join(&entry.name))
                .with_context(|| format!("unable to export {path}"))?;
        }
    }

    for entry in &entries {
        let stat = memfs.stat(&format!("/{}", entry.name))?;
        println!(
            "{:>4} {:>10} {:>4} {}",
            stat.inumber, stat.size, stat.blocks, entry.name
        );
    }

    let usage = memfs.usage();
    println!(
        "{} inodes and {} blocks free",
        usage.free_inodes, usage.free_blocks
    );

    memfs.destroy();

    Ok(())
}
