use std::thread;

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use log::info;
use memfs::{FsConfig, Latency, MemFs, OpenFlag};

/// Runs concurrent clients against one filesystem, then checks it.
#[derive(Parser)]
struct Args {
    /// Number of client threads
    #[arg(long, default_value_t = 8)]
    threads: usize,
    /// Operations per client
    #[arg(long, default_value_t = 100)]
    rounds: usize,
    /// Busy-wait iterations on every table access
    #[arg(long, default_value_t = 1000)]
    spin: usize,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let config = FsConfig {
        latency: Latency::spin(args.spin),
        max_open_files: args.threads * 2,
        ..FsConfig::default()
    };
    ensure!(
        args.threads + 2 <= config.max_dir_entries(),
        "at most {} threads fit in the directory",
        config.max_dir_entries() - 2
    );

    let memfs = MemFs::new(config)?;

    thread::scope(|scope| {
        let clients: Vec<_> = (0..args.threads)
            .map(|id| {
                let memfs = &memfs;
                scope.spawn(move || client(memfs, id, args.rounds))
            })
            .collect();

        clients.into_iter().try_for_each(|client| match client.join() {
            Ok(result) => result,
            Err(_) => bail!("client thread panicked"),
        })
    })?;

    let shared = memfs.read_dir()?;
    ensure!(
        shared.iter().filter(|entry| entry.name == "shared").count() == 1,
        "concurrent creates produced duplicate entries"
    );

    memfs.check().context("filesystem is inconsistent after the run")?;

    let usage = memfs.usage();
    info!(
        "{} inodes and {} blocks free after the run",
        usage.free_inodes, usage.free_blocks
    );
    println!("ok");

    Ok(())
}

/// Creates the shared file, then fills and removes a private file, over and over.
fn client(memfs: &MemFs, id: usize, rounds: usize) -> Result<()> {
    let path = format!("/client-{id}");
    let data = vec![id as u8; 3000 + id * 100];

    for round in 0..rounds {
        let shared = memfs.open("/shared", OpenFlag::CREATE)?;
        memfs.close(shared)?;

        let handle = memfs.open(&path, OpenFlag::CREATE | OpenFlag::TRUNC)?;
        let written = memfs.write(handle, &data)?;
        let contents = memfs.read_to_end(handle)?;
        memfs.close(handle)?;

        ensure!(written == data.len(), "client {id} wrote {written} bytes");
        ensure!(contents == data, "client {id} read back other data");

        if round % 2 == 1 {
            memfs.unlink(&path)?;
        }
    }

    Ok(())
}
