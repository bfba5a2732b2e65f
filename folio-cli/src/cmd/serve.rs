use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use folio_core::{Builder, Cancellation, ChangeSet, SiteConfig, SiteLayout, build_site};
use folio_dev_server::{LiveServer, LiveServerConfig, ReloadHandle};
use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::cmd::{add_common_args, build_options, log_failure, log_report};
use crate::config::{BuildSettings, FolioConfig, site_root};

const DEBOUNCE: Duration = Duration::from_millis(300);
const EVENT_BUFFER: usize = 256;

pub fn make_subcommand() -> Command {
    add_common_args(Command::new("serve"))
        .about("Build, serve with live reload, and rebuild on changes")
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Port to serve on")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Host to bind to"),
        )
        .arg(
            Arg::new("open")
                .long("open")
                .help("Open browser automatically")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-watch")
                .long("no-watch")
                .help("Serve the first build without rebuilding on changes")
                .action(clap::ArgAction::SetTrue),
        )
}

pub async fn execute(args: &ArgMatches) -> Result<()> {
    let root = site_root(args)?;
    let config = FolioConfig::load(args, &root)?;
    let settings = config.build.clone();
    let output_dir = config.site.output_path(&root);

    // A broken first build still leaves something to serve.
    let first = {
        let root = root.clone();
        let site = config.site.clone();
        let options = build_options(&settings);
        tokio::task::spawn_blocking(move || build_site(&root, site, options)).await?
    };
    match first {
        Ok(report) => log_report(&report),
        Err(failure) => log_failure(&failure),
    }
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Could not create {}", output_dir.display()))?;

    let server = LiveServer::new(LiveServerConfig {
        host: settings.host.clone(),
        port: settings.port,
        root: output_dir,
        open: settings.open,
    });
    let reload = server.reload_handle();
    let server_handle = tokio::spawn(server.run());

    if !settings.watch {
        return server_handle.await?;
    }

    let watcher_handle = tokio::spawn(watch_and_rebuild(root, args.clone(), config, reload));

    tokio::select! {
        result = server_handle => result?,
        result = watcher_handle => result?,
    }
}

/// Feed debounced file events into one coordinating loop.
///
/// Every batch cancels the build in flight, if any, and starts exactly one
/// new build.
async fn watch_and_rebuild(
    root: PathBuf,
    args: ArgMatches,
    mut config: FolioConfig,
    reload: ReloadHandle,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<PathBuf>(EVENT_BUFFER);

    let mut debouncer = new_debouncer(DEBOUNCE, move |res: DebounceEventResult| match res {
        Ok(events) => {
            for event in events {
                if tx.blocking_send(event.path).is_err() {
                    break;
                }
            }
        }
        Err(e) => warn!("Watch error: {}", e),
    })?;

    let mut layout = SiteLayout::new(&root, &config.site);
    for dir in layout.watch_roots() {
        debouncer.watcher().watch(&dir, RecursiveMode::Recursive)?;
        info!("Watching {}", dir.display());
    }
    // For the config file; the output dir lives here too and is ignored.
    debouncer
        .watcher()
        .watch(&root, RecursiveMode::NonRecursive)?;

    let mut in_flight: Option<(Cancellation, JoinHandle<()>)> = None;
    let mut changes = ChangeSet::new();

    while let Some(path) = rx.recv().await {
        changes.record(&layout, &path);
        while let Ok(path) = rx.try_recv() {
            changes.record(&layout, &path);
        }
        if !changes.needs_rebuild() {
            continue;
        }
        for (path, kind) in changes.iter() {
            debug!("{:?} changed: {}", kind, path.display());
        }

        if changes.config_changed() {
            match FolioConfig::load(&args, &root) {
                Ok(reloaded) => {
                    info!("Reloaded {}", FolioConfig::config_file(&args, &root).display());
                    config = reloaded;
                    layout = SiteLayout::new(&root, &config.site);
                }
                Err(e) => {
                    error!("{:#}", e);
                    changes.clear();
                    continue;
                }
            }
        }
        info!("{} changed, rebuilding", describe(&changes));
        changes.clear();

        if let Some((cancel, handle)) = in_flight.take() {
            cancel.cancel();
            let _ = handle.await;
        }

        let cancel = Cancellation::new();
        let handle = tokio::spawn(rebuild(
            root.clone(),
            config.site.clone(),
            config.build.clone(),
            cancel.clone(),
            reload.clone(),
        ));
        in_flight = Some((cancel, handle));
    }

    Ok(())
}

fn describe(changes: &ChangeSet) -> String {
    match changes.len() {
        1 => changes
            .iter()
            .next()
            .and_then(|(path, _)| path.file_name())
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "1 file".to_string()),
        n => format!("{n} files"),
    }
}

async fn rebuild(
    root: PathBuf,
    site: SiteConfig,
    settings: BuildSettings,
    cancel: Cancellation,
    reload: ReloadHandle,
) {
    let options = build_options(&settings);
    let result = tokio::task::spawn_blocking(move || {
        Builder::new(Path::new(&root), site, options)
            .with_cancellation(cancel)
            .build()
    })
    .await;

    match result {
        Ok(Ok(report)) => {
            log_report(&report);
            reload.reload();
        }
        Ok(Err(failure)) if failure.is_cancelled() => debug!("Superseded build cancelled"),
        Ok(Err(failure)) => log_failure(&failure),
        Err(e) => error!("Build task failed: {}", e),
    }
}
