use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ems_client::EmsClient;
use ems_server::store::{MemoryEventStore, StoreTarget};
use ems_server::{Server, ServerOptions};
use ems_utils::{
    cli::{BatchCli, ClientCli, ServerCli},
    consts::{JOBS_EXTENSION, OUTPUT_EXTENSION},
    errors::prelude::*,
    jobs::{run_jobs, run_jobs_threaded, JobSummary},
};
use log::{info, warn};

pub(crate) fn start_server(opts: &ServerCli) -> Result<()> {
    let options = ServerOptions::from(opts);
    let store = Arc::new(MemoryEventStore::with_access_delay(options.access_delay));
    let server = Server::bind(&options, store)?;
    server.register_signal_handlers()?;
    server.run()
}

pub(crate) fn run_client(opts: &ClientCli) -> Result<()> {
    let mut client =
        EmsClient::connect(&opts.request_pipe, &opts.response_pipe, &opts.control_pipe)?;
    let summary = run_jobs_file(&opts.jobs_file, |input, output| {
        run_jobs(&mut client, input, output)
    })?;
    client.disconnect()?;
    info!(
        "{}: {} commands run, {} failed, {} invalid",
        opts.jobs_file.display(),
        summary.executed,
        summary.failed,
        summary.invalid
    );
    Ok(())
}

/// Runs every `.jobs` file of the directory, each on its own store, `max_jobs` at a time.
/// Each file is shared by `max_threads` threads.
pub(crate) fn run_batch(opts: &BatchCli) -> Result<()> {
    let err_context = || format!("failed to run jobs in {}", opts.jobs_dir.display());

    if opts.max_jobs == 0 {
        return Err(anyhow!("at least one job must be allowed to run")).with_context(err_context);
    }
    if opts.max_threads == 0 {
        return Err(anyhow!("every job needs at least one thread")).with_context(err_context);
    }
    let max_threads = opts.max_threads;
    let jobs_files = find_jobs_files(&opts.jobs_dir).with_context(err_context)?;
    let total = jobs_files.len();
    let access_delay = Duration::from_micros(opts.delay_us);
    let pending = Mutex::new(jobs_files.into_iter());
    let failed = Mutex::new(0usize);

    thread::scope(|scope| {
        for runner in 0..opts.max_jobs.min(total) {
            let pending = &pending;
            let failed = &failed;
            let spawned = thread::Builder::new()
                .name(format!("batch_{}", runner))
                .spawn_scoped(scope, move || loop {
                    let next = pending.lock().map(|mut files| files.next());
                    let path = match next {
                        Ok(Some(path)) => path,
                        _ => break,
                    };
                    let store = MemoryEventStore::with_access_delay(access_delay);
                    let ran = run_jobs_file(&path, |input, output| {
                        let targets = vec![StoreTarget::new(&store); max_threads];
                        run_jobs_threaded(targets, input, output)
                    });
                    if let Err(e) = ran.to_log() {
                        eprintln!("{}: {:?}", path.display(), e);
                        if let Ok(mut failed) = failed.lock() {
                            *failed += 1;
                        }
                    }
                });
            if let Err(e) = spawned {
                warn!("failed to spawn batch runner {}: {}", runner, e);
            }
        }
    });

    let failed = failed.into_inner().unwrap_or_else(|e| e.into_inner());
    let unprocessed = pending
        .into_inner()
        .map(|files| files.count())
        .unwrap_or_default();
    if failed > 0 || unprocessed > 0 {
        return Err(anyhow!(
            "{} of {} job files failed, {} were not run",
            failed,
            total,
            unprocessed
        ))
        .with_context(err_context);
    }
    info!("ran {} job files from {}", total, opts.jobs_dir.display());
    Ok(())
}

/// Runs one job file through `run`, writing results beside it with an `.out` extension.
fn run_jobs_file<F>(path: &Path, run: F) -> Result<JobSummary>
where
    F: FnOnce(BufReader<File>, &mut BufWriter<File>) -> Result<JobSummary>,
{
    let output_path = path.with_extension(OUTPUT_EXTENSION);
    let err_context = || format!("failed to run {}", path.display());

    if path.extension().map_or(true, |ext| ext != JOBS_EXTENSION) {
        return Err(EmsError::NotAJobsFile {
            path: path.to_path_buf(),
        })
        .with_context(err_context);
    }
    let input = File::open(path).with_context(err_context)?;
    let output = File::create(&output_path)
        .with_context(|| format!("failed to create {}", output_path.display()))?;

    run(BufReader::new(input), &mut BufWriter::new(output)).with_context(err_context)
}

/// Every `.jobs` file directly inside `dir`, sorted by name.
fn find_jobs_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == JOBS_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
