use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

use ftl_config::FtlConfig;
use ftl_core::Ftl;
use ftl_media::MockMedia;
use ftl_types::{Bio, BioOp};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// The bio queue this daemon serves: the out-of-scope bio/page-allocator
/// plumbing reduced to the one thing the data path actually needs from
/// it, a channel of already-built `Bio`s.
fn serve(ftl: Arc<Ftl>, queue: Receiver<Bio>) {
    for bio in queue {
        match bio.op {
            BioOp::Read => ftl.submit_read(bio),
            BioOp::Write => {
                if let Err(e) = ftl.buffer_write(bio) {
                    tracing::warn!(?e, "write submission rejected");
                }
            }
            BioOp::Discard => ftl.submit_discard(bio),
            BioOp::Flush => {
                if let Err(e) = ftl.buffer_write(bio) {
                    tracing::debug!(?e, "flush acknowledged");
                }
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO")))
        .init();

    let config_path =
        std::env::var("FTLD_CONFIG").unwrap_or_else(|_| "/etc/ftld/config.toml".to_string());
    let config = FtlConfig::load(&config_path)?;

    let geometry = config.geometry.into();
    let media = Arc::new(MockMedia::new(geometry)?);
    let ftl = Ftl::new(config, media);
    let workers = ftl.spawn_workers();

    info!(?geometry, "ftld: data path online");

    let (tx, rx) = mpsc::channel();
    close_queue_on_stdin_eof(tx);
    serve(ftl.clone(), rx);

    ftl.teardown();
    ftl.shutdown_workers(workers);
    info!("ftld: shut down cleanly");
    Ok(())
}

/// Closes the bio queue on EOF (or a blank line) from stdin, so `serve`'s
/// `for bio in queue` loop returns and teardown can run. No host bio
/// source is wired up in this binary — that's the out-of-scope
/// bio/page-allocator plumbing — so this is the process's only way to
/// request a clean shutdown.
fn close_queue_on_stdin_eof(tx: mpsc::Sender<Bio>) {
    std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = std::io::stdin().read_line(&mut buf);
        drop(tx);
    });
}
