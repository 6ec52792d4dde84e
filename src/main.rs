//! zsearch 命令行驱动
//!
//! 从标准输入逐行读取查询，交给防抖协调器；以 `:` 开头的行是命令。

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use zsearch::core::Service;
use zsearch::kernel::services::adapters::{
    ensure_settings_file, load_settings, DebouncedSearch, LocalFileLookup, WorkspaceWatcher,
};
use zsearch::kernel::services::ports::{
    SearchEvent, SearchMode, SearchParams, SearchRequest, SearchSettings,
};

mod logging;

const USAGE: &str = "usage: zsearch <root> [--regex] [--case] [--word] [--include GLOBS] [--exclude GLOBS]";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    root: PathBuf,
    params: SearchParams,
}

fn parse_args<I>(args: I) -> Result<Args, String>
where
    I: IntoIterator<Item = String>,
{
    let mut root = None;
    let mut params = SearchParams::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--include=") {
            params.include = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("--exclude=") {
            params.exclude = Some(value.to_string());
        } else {
            match arg.as_str() {
                "--regex" => params.mode = SearchMode::Regex,
                "--case" => params.match_case = true,
                "--word" => params.whole_word = true,
                "--include" => {
                    params.include = Some(args.next().ok_or("--include needs a value")?);
                }
                "--exclude" => {
                    params.exclude = Some(args.next().ok_or("--exclude needs a value")?);
                }
                flag if flag.starts_with("--") => return Err(format!("unknown flag: {}", flag)),
                _ if root.is_none() => root = Some(PathBuf::from(arg)),
                _ => return Err(format!("unexpected argument: {}", arg)),
            }
        }
    }

    Ok(Args {
        root: root.ok_or("missing <root>")?,
        params,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Query(String),
    Within(String),
    Continue,
    Stop,
    Large,
    Clear,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(rest) = line.strip_prefix(':') else {
        return Command::Query(line.to_string());
    };
    let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
    match name {
        "continue" => Command::Continue,
        "stop" => Command::Stop,
        "large" => Command::Large,
        "clear" => Command::Clear,
        "quit" | "q" => Command::Quit,
        "within" => Command::Within(arg.to_string()),
        _ => Command::Unknown(name.to_string()),
    }
}

fn main() -> io::Result<()> {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}\n{}", msg, USAGE);
            std::process::exit(2);
        }
    };

    let logging = logging::init();
    if let Some(logging) = &logging {
        eprintln!("-- logs in {}", logging.log_dir().display());
    }

    if let Err(e) = ensure_settings_file() {
        tracing::warn!(error = %e, "cannot create settings file");
    }
    let settings = load_settings().unwrap_or_else(SearchSettings::default);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.concurrency())
        .enable_all()
        .build()?;

    let lookup = LocalFileLookup::new(&args.root).with_max_file_size(settings.max_file_size);
    let root = lookup.root().to_path_buf();
    let search = Arc::new(DebouncedSearch::new(
        runtime.handle().clone(),
        Arc::new(lookup),
        settings,
    ));
    tracing::info!(service = search.name(), root = %root.display(), "search ready");

    let mut watcher = match WorkspaceWatcher::new(&root) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "file watcher unavailable");
            None
        }
    };

    let latest_run = Arc::new(AtomicU64::new(u64::MAX));
    {
        let events = search.subscribe();
        let latest_run = latest_run.clone();
        let root = root.clone();
        std::thread::spawn(move || print_events(events, &latest_run, &root));
    }

    #[cfg(unix)]
    install_sigint(search.clone())?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if let Some(watcher) = watcher.as_mut() {
            watcher.apply_to(&search);
        }

        match parse_command(&line) {
            Command::Query(query) => {
                search.update(SearchRequest::new(query, args.params.clone()));
            }
            Command::Within(query) => {
                search.update(SearchRequest::new(query, args.params.clone()).within_results());
            }
            Command::Continue => search.continue_search(),
            Command::Stop => search.stop(),
            Command::Large => search.scan_large_files(),
            Command::Clear => search.clear_all(),
            Command::Quit => break,
            Command::Unknown(name) => eprintln!("unknown command: :{}", name),
        }
    }

    search.stop();
    Ok(())
}

#[cfg(unix)]
fn install_sigint(search: Arc<DebouncedSearch>) -> io::Result<()> {
    use signal_hook::consts::signal::SIGINT;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT])?;
    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            tracing::info!("interrupted");
            search.stop();
            std::process::exit(130);
        }
    });
    Ok(())
}

/// 只打印最新一次运行的事件，旧运行的残留事件丢弃
fn print_events(events: Receiver<SearchEvent>, latest_run: &AtomicU64, root: &Path) {
    let stdout = io::stdout();
    for event in events {
        if let SearchEvent::Started { run_id } = event {
            latest_run.store(run_id, Ordering::Relaxed);
        }
        if event.run_id() != latest_run.load(Ordering::Relaxed) {
            continue;
        }

        let mut out = stdout.lock();
        let _ = match event {
            SearchEvent::Started { .. } => writeln!(out, "-- searching"),
            SearchEvent::Progress { .. } => Ok(()),
            SearchEvent::Result { result, .. } => {
                let path = result.file.strip_prefix(root).unwrap_or(&result.file);
                if let Some(error) = &result.error {
                    writeln!(out, "{}: error: {}", path.display(), error)
                } else {
                    result.matches.iter().try_for_each(|m| {
                        writeln!(
                            out,
                            "{}:{}:{}: {}",
                            path.display(),
                            m.range.start_line,
                            m.range.start_column + 1,
                            m.text
                        )
                    })
                }
            }
            SearchEvent::Paused { limit, count, .. } => writeln!(
                out,
                "-- paused at {} matches (limit {}), :continue to resume",
                count, limit
            ),
            SearchEvent::SkippedLargeFiles { count, .. } => {
                writeln!(out, "-- {} large file(s) skipped, :large to scan", count)
            }
            SearchEvent::Done { .. } => writeln!(out, "-- done"),
            SearchEvent::Stopped { .. } => writeln!(out, "-- stopped"),
            SearchEvent::Error { message, .. } => writeln!(out, "-- error: {}", message),
        };
    }
}
