//! CLI command implementations

use anyhow::{anyhow, bail, Context, Result};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use polyexec_sandbox::{
    CancellationToken, ExecutionDispatcher, ExecutionRequest, ExecutionResult, ExecutionService,
    ExecutorConfig, Language,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

/// Options of the `run` command
pub struct RunOptions {
    pub file: PathBuf,
    pub lang: Option<String>,
    pub input: Option<PathBuf>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
    pub json: bool,
}

/// Load the configuration file (explicit or default), then env overrides
pub fn load_config(path: Option<&Path>) -> Result<ExecutorConfig> {
    let mut config = match path {
        Some(path) => ExecutorConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ExecutorConfig::load().context("Failed to load config")?,
    };
    config
        .apply_env_overrides()
        .context("Invalid POLYEXEC_* environment variable")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Cancelled on Ctrl-C so running programs are killed and workspaces removed
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling executions");
            trigger.cancel();
        }
    });
    token
}

fn infer_language(file: &Path, lang: Option<String>) -> Result<String> {
    if let Some(lang) = lang {
        return Ok(lang);
    }
    file.extension()
        .and_then(|ext| ext.to_str())
        .and_then(Language::from_extension)
        .map(|language| language.id().to_string())
        .ok_or_else(|| {
            anyhow!(
                "Cannot infer the language of {}, pass --lang",
                file.display()
            )
        })
}

/// Execute `run`; returns whether the program succeeded
pub async fn execute_run(mut config: ExecutorConfig, options: RunOptions) -> Result<bool> {
    let source_code = tokio::fs::read_to_string(&options.file)
        .await
        .with_context(|| format!("Failed to read {}", options.file.display()))?;
    let language = infer_language(&options.file, options.lang)?;

    let stdin = match (options.input, options.stdin) {
        (Some(path), _) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read input file {}", path.display()))?,
        (None, Some(text)) => text,
        (None, None) => String::new(),
    };

    if let Some(timeout) = options.timeout {
        config.limits.run.max_duration = timeout;
    }

    let service = ExecutionService::from_config(&config);
    let request = ExecutionRequest::new(language, source_code).with_stdin(stdin);
    let result = service
        .execute_with_cancel(request, shutdown_token())
        .await;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(result.success)
}

fn print_result(result: &ExecutionResult) {
    if result.success {
        print!("{}", result.output);
        if !result.output.ends_with('\n') {
            println!();
        }
    } else {
        eprintln!("✗ {}", result.error_kind);
        eprint!("{}", result.output);
        if !result.output.ends_with('\n') {
            eprintln!();
        }
    }
}

/// Parse one batch line into a request
fn parse_request(line: &str) -> std::result::Result<ExecutionRequest, String> {
    serde_json::from_str(line).map_err(|e| format!("Invalid request: {}", e))
}

fn batch_line(index: usize, result: &ExecutionResult) -> Result<String> {
    Ok(serde_json::to_string(&serde_json::json!({
        "index": index,
        "result": result,
    }))?)
}

/// Execute `batch`: JSON-lines requests on stdin, JSON-lines results on stdout
pub async fn execute_batch(config: ExecutorConfig) -> Result<()> {
    let service = ExecutionService::from_config(&config);
    // Never submit more than the service admits, so nothing is rejected as overload
    let window = config.pool.workers.max(1) + config.pool.queue_depth;
    let submitted = run_batch(
        &service,
        window,
        shutdown_token(),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;
    debug!(submitted, "Batch finished");
    Ok(())
}

/// Feed requests from `reader` through the service, at most `window` at a time.
///
/// Results are written in completion order, as soon as they finish, even
/// while more input is still expected; `index` is the zero-based line number
/// of the request. Returns the number of requests submitted.
async fn run_batch<R, W>(
    service: &ExecutionService,
    window: usize,
    cancel: CancellationToken,
    reader: R,
    mut writer: W,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut pending: FuturesUnordered<BoxFuture<'static, (usize, ExecutionResult)>> =
        FuturesUnordered::new();
    let mut input_open = true;
    let mut index = 0usize;
    let mut submitted = 0usize;

    while input_open || !pending.is_empty() {
        tokio::select! {
            Some((done, result)) = pending.next(), if !pending.is_empty() => {
                write_line(&mut writer, &batch_line(done, &result)?).await?;
            }
            line = lines.next_line(), if input_open && pending.len() < window.max(1) => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    input_open = false;
                    continue;
                };
                let line_index = index;
                index += 1;
                if line.trim().is_empty() {
                    continue;
                }

                match parse_request(&line) {
                    Ok(request) => {
                        let service = service.clone();
                        let token = cancel.child_token();
                        pending.push(
                            async move {
                                (line_index, service.execute_with_cancel(request, token).await)
                            }
                            .boxed(),
                        );
                        submitted += 1;
                    }
                    Err(message) => {
                        warn!(index = line_index, "{}", message);
                        let result = ExecutionResult::internal_error(None, message);
                        write_line(&mut writer, &batch_line(line_index, &result)?).await?;
                    }
                }
            }
        }
    }

    Ok(submitted)
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Execute `languages`
pub fn execute_languages(config: &ExecutorConfig) {
    let dispatcher = ExecutionDispatcher::from_config(config);
    for status in dispatcher.toolchain_report() {
        let kind = dispatcher
            .runner_kind(status.language)
            .map(|kind| kind.to_string())
            .unwrap_or_default();
        match (&status.resolved, &status.error) {
            (Some(path), _) => println!(
                "✓ {:<11} {:<11} {:<12} {}",
                status.language.id(),
                status.language.display_name(),
                kind,
                path.display()
            ),
            (None, error) => println!(
                "✗ {:<11} {:<11} {:<12} {} ({})",
                status.language.id(),
                status.language.display_name(),
                kind,
                status.program,
                error.as_deref().unwrap_or("not found")
            ),
        }
    }
}

fn config_file(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => ExecutorConfig::config_path()
            .ok_or_else(|| anyhow!("No configuration directory on this system, pass --config")),
    }
}

/// Execute `config show`
pub fn execute_config_show(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    let file = config_file(path)?;
    if file.exists() {
        println!("# {}", file.display());
    } else {
        println!("# {} (not found, showing defaults)", file.display());
    }
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Execute `config init`
pub fn execute_config_init(path: Option<&Path>, force: bool) -> Result<()> {
    let file = config_file(path)?;
    if file.exists() && !force {
        bail!(
            "{} already exists, use --force to overwrite",
            file.display()
        );
    }
    ExecutorConfig::default()
        .save_to(&file)
        .with_context(|| format!("Failed to write {}", file.display()))?;
    println!("✓ Wrote {}", file.display());
    Ok(())
}
