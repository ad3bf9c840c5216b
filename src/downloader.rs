use crate::command::{build_download_command, build_formats_command, build_title_command};
use crate::error::{DownloadError, Result};
use crate::models::{AuthOptions, DownloadPreset, DownloadRequest, ProgressSample};
use crate::presets::parse_format_listing;
use crate::progress::parse_progress_line;
use futures::stream::{self, Stream, StreamExt};
use log::{debug, info, warn};
use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, PipeReader, Read};
use std::pin::pin;
use std::process::Stdio;
use std::thread;
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Notification forwarded from a running download.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Progress(ProgressSample),
    /// Raw output line, sent for every line including progress lines.
    Status(String),
}

/// Terminal state of one download.
#[derive(Debug)]
pub enum DownloadOutcome {
    Succeeded,
    Failed(DownloadError),
    Cancelled,
}

pub struct Downloader {
    binary: String,
}

impl Downloader {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    /// Starts the download in a background task and returns its handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit_download(&self, request: &DownloadRequest) -> DownloadHandle {
        info!(
            "Downloading {} with preset {} into {}",
            request.source_url,
            request.preset.id,
            request.output_directory.display()
        );
        spawn_scraper(build_download_command(&self.binary, request))
    }

    pub async fn fetch_title(&self, url: &str, auth: &AuthOptions) -> Result<String> {
        let output = capture_output(build_title_command(&self.binary, url, auth)).await?;
        Ok(output.trim().to_string())
    }

    pub async fn list_formats(&self, url: &str, auth: &AuthOptions) -> Result<Vec<DownloadPreset>> {
        let output = capture_output(build_formats_command(&self.binary, url, auth)).await?;
        Ok(parse_format_listing(&output))
    }
}

/// Owner side of a running download.
///
/// Dropping the handle cancels the download and kills the child.
pub struct DownloadHandle {
    events: UnboundedReceiver<DownloadEvent>,
    cancel: CancellationToken,
    worker: JoinHandle<DownloadOutcome>,
    _cancel_on_drop: DropGuard,
}

impl DownloadHandle {
    /// Asks the download to stop; the child process is killed.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this download, for use from another task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once the output is exhausted or the download
    /// has been cancelled.
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    /// Feeds events to the two callbacks until the download ends, then
    /// returns the terminal outcome.
    pub async fn drive<P, S>(mut self, mut on_progress: P, mut on_status: S) -> DownloadOutcome
    where
        P: FnMut(ProgressSample),
        S: FnMut(String),
    {
        while let Some(event) = self.next_event().await {
            if self.cancel.is_cancelled() {
                break;
            }
            match event {
                DownloadEvent::Progress(sample) => on_progress(sample),
                DownloadEvent::Status(line) => on_status(line),
            }
        }
        self.wait().await
    }

    pub async fn wait(self) -> DownloadOutcome {
        match self.worker.await {
            Ok(outcome) => outcome,
            Err(e) => DownloadOutcome::Failed(DownloadError::Worker(e.to_string())),
        }
    }
}

/// Runs `argv` in a background task, scraping its output for progress.
pub fn spawn_scraper(argv: Vec<String>) -> DownloadHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let worker = tokio::spawn(run_process(argv, tx, cancel.clone()));

    DownloadHandle {
        events: rx,
        _cancel_on_drop: cancel.clone().drop_guard(),
        cancel,
        worker,
    }
}

async fn run_process(
    argv: Vec<String>,
    tx: UnboundedSender<DownloadEvent>,
    cancel: CancellationToken,
) -> DownloadOutcome {
    let (mut child, output) = match spawn_child(&argv) {
        Ok(spawned) => spawned,
        Err(e) => {
            warn!("{}", e);
            return DownloadOutcome::Failed(e);
        }
    };

    let lines = pin!(output_lines(output));

    match scrape_lines(lines, &tx, &cancel).await {
        ScrapeEnd::Cancelled => {
            info!("Download cancelled, stopping downloader");
            terminate(&mut child).await;
            return DownloadOutcome::Cancelled;
        }
        ScrapeEnd::ReadFailed(e) => {
            warn!("Lost downloader output: {}", e);
            terminate(&mut child).await;
            return DownloadOutcome::Failed(DownloadError::StreamRead(e));
        }
        ScrapeEnd::Exhausted => {}
    }

    let waited = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        status = child.wait() => Some(status),
    };
    let Some(status) = waited else {
        terminate(&mut child).await;
        return DownloadOutcome::Cancelled;
    };

    match status {
        Ok(_) if cancel.is_cancelled() => DownloadOutcome::Cancelled,
        Ok(status) if status.success() => {
            info!("Downloader finished successfully");
            DownloadOutcome::Succeeded
        }
        Ok(status) => {
            warn!("Downloader exited with {}", status);
            DownloadOutcome::Failed(DownloadError::NonZeroExit {
                code: status.code(),
            })
        }
        Err(e) => DownloadOutcome::Failed(DownloadError::StreamRead(e)),
    }
}

enum ScrapeEnd {
    Exhausted,
    Cancelled,
    ReadFailed(io::Error),
}

async fn scrape_lines<S>(
    mut lines: S,
    tx: &UnboundedSender<DownloadEvent>,
    cancel: &CancellationToken,
) -> ScrapeEnd
where
    S: Stream<Item = io::Result<String>> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ScrapeEnd::Cancelled,
            next = lines.next() => next,
        };

        let line = match next {
            None => return ScrapeEnd::Exhausted,
            Some(Err(e)) => return ScrapeEnd::ReadFailed(e),
            Some(Ok(line)) => line,
        };

        if cancel.is_cancelled() {
            return ScrapeEnd::Cancelled;
        }

        debug!("{}", line);
        // receiver may be gone; the download still runs to completion
        if let Some(sample) = parse_progress_line(&line) {
            let _ = tx.send(DownloadEvent::Progress(sample));
        }
        let _ = tx.send(DownloadEvent::Status(line));
    }
}

/// Splits a pipe into lines, decoding lossily and dropping `\r`.
///
/// The pipe is read on its own thread; a blocking read never holds up the
/// runtime, and the thread ends once every writer has closed.
fn output_lines<R>(reader: R) -> impl Stream<Item = io::Result<String>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        for segment in BufReader::new(reader).split(b'\n') {
            let line = segment.map(|bytes| {
                String::from_utf8_lossy(&bytes)
                    .trim_end_matches('\r')
                    .to_string()
            });
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });

    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|line| (line, rx)) })
}

/// Spawns the child with stdout and stderr sharing one pipe, so lines
/// arrive in the order the child wrote them.
fn spawn_child(argv: &[String]) -> Result<(Child, PipeReader)> {
    let (program, args) = argv.split_first().ok_or(DownloadError::EmptyCommand)?;
    debug!("Spawning {:?}", argv);

    let spawn_error = |source: io::Error| DownloadError::Spawn {
        program: program.clone(),
        source,
    };
    let (reader, writer) = io::pipe().map_err(spawn_error)?;
    let error_writer = writer.try_clone().map_err(spawn_error)?;

    // the Command, and with it our copies of the write end, is dropped
    // right after spawning so the reader sees EOF when the child exits
    let child = command(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(error_writer)
        .kill_on_drop(true)
        .spawn()
        .map_err(spawn_error)?;

    Ok((child, reader))
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("Downloader already gone: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap downloader: {}", e);
    }
}

/// Runs `argv` to completion and returns its stdout.
async fn capture_output(argv: Vec<String>) -> Result<String> {
    let (program, args) = argv.split_first().ok_or(DownloadError::EmptyCommand)?;
    debug!("Running {:?}", argv);

    let output = command(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| DownloadError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !output.status.success() {
        warn!(
            "{} failed: {}",
            program,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Err(DownloadError::NonZeroExit {
            code: output.status.code(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    hide_console(&mut cmd);
    cmd
}

#[cfg(windows)]
fn hide_console(cmd: &mut Command) {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console(_cmd: &mut Command) {}
