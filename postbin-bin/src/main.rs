#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

use std::{num::NonZeroUsize, path::PathBuf, time::Duration};

use rama::{
    error::{BoxError, ErrorContext as _},
    graceful::{self, ShutdownGuard},
    net::socket::Interface,
    telemetry::tracing::{self, Instrument as _},
};

use clap::Parser;

use postbin_lib::{
    dispatch::{DEFAULT_MAX_BODY_SIZE, ServiceConfig},
    pipeline::{PipelineOverride, Profile},
    token::ContentTypePolicy,
    utils,
};

pub mod server;

#[cfg(target_family = "unix")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(test)]
pub mod test;

/// CLI arguments for configuring postbin behavior.
#[derive(Debug, Clone, Parser)]
#[command(name = "postbin")]
#[command(bin_name = "postbin")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// network interface to bind to,
    /// defaults to all interfaces on the port found in the environment
    #[arg(long, short = 'b', value_name = "INTERFACE")]
    pub bind: Option<Interface>,

    /// worker threads serving requests (falls back to POSTBIN_SPAWN_COUNT)
    #[arg(long, short = 'w', value_name = "N")]
    pub workers: Option<NonZeroUsize>,

    /// route table variant to serve
    #[arg(long, value_name = "plain | current | extended", default_value_t = Profile::Current)]
    pub profile: Profile,

    /// replace the steps of a single route, e.g. `status=delay,auth-timeout`
    #[arg(long = "pipeline", value_name = "ROUTE=STEP[,STEP...]")]
    pub pipelines: Vec<PipelineOverride>,

    /// content type policy of the token endpoint, overrides the profile
    #[arg(long, value_name = "strict | lenient")]
    pub token_content_type: Option<ContentTypePolicy>,

    /// maximum accepted request body size in bytes
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_BODY_SIZE)]
    pub max_body_size: usize,

    /// directory in which the bound socket address is written as `postbin.addr.txt`
    #[arg(long, short = 'D')]
    pub data: Option<PathBuf>,

    /// debug logging as default instead of Info; use RUST_LOG env for more options
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,

    /// enable pretty logging (format for humans)
    #[arg(long, default_value_t = false)]
    pub pretty: bool,

    /// write the tracing output to the provided (log) file instead of stderr
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    #[arg(long, value_name = "SECONDS", default_value_t = 1.)]
    /// the graceful shutdown timeout (<= 0.0 = no timeout)
    pub graceful: f64,
}

impl Args {
    fn service_config(&self) -> ServiceConfig {
        let mut cfg = ServiceConfig::for_profile(self.profile);
        for pipeline_override in self.pipelines.iter().cloned() {
            tracing::info!(
                route = %pipeline_override.route,
                steps = %pipeline_override.pipeline,
                "override route pipeline"
            );
            cfg.routes.apply_override(pipeline_override);
        }
        if let Some(policy) = self.token_content_type {
            cfg.token.content_type = policy;
        }
        cfg.max_body_size = self.max_body_size;
        cfg
    }
}

fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    utils::telemetry::init_tracing(utils::telemetry::TelemetryConfig {
        verbose: args.verbose,
        pretty: args.pretty,
        output: args.output.as_deref(),
    })?;

    let workers = args
        .workers
        .unwrap_or_else(utils::env::compute_worker_count);
    tracing::info!(workers = workers.get(), "starting tokio runtime");

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers.get())
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    let result = rt.block_on(async move { run_with_args(graceful::default_signal(), args).await });
    if let Err(err) = result {
        eprintln!("🚩 exit with error: {err}");
        std::process::exit(1);
    }

    Ok(())
}

/// Runs the postbin http server and blocks until
/// a critical error occurs or the (graceful) shutdown has been initiated.
///
/// This entry point is used by both the (binary) `main` function as well as
/// for the e2e test suite found in the test module.
async fn run_with_args<F>(base_shutdown_signal: F, args: Args) -> Result<(), BoxError>
where
    F: Future<Output: Send + 'static> + Send + 'static,
{
    if let Some(data) = args.data.as_deref() {
        tokio::fs::create_dir_all(data)
            .await
            .context("create data directory")
            .with_context_debug_field("path", || data.to_owned())?;
    }

    let graceful_timeout = (args.graceful > 0.).then(|| Duration::from_secs_f64(args.graceful));
    let service_config = args.service_config();

    let (error_tx, error_rx) = tokio::sync::mpsc::channel::<BoxError>(1);
    let graceful = graceful::Shutdown::new(new_shutdown_signal(error_rx, base_shutdown_signal));

    graceful.spawn_task_fn(move |guard| run_http_server(args, guard, error_tx, service_config));

    let delay = match graceful_timeout {
        Some(duration) => graceful.shutdown_with_limit(duration).await?,
        None => graceful.shutdown().await,
    };

    tracing::info!("gracefully shutdown with a delay of: {delay:?}");
    Ok(())
}

async fn run_http_server(
    args: Args,
    guard: ShutdownGuard,
    error_tx: tokio::sync::mpsc::Sender<BoxError>,
    service_config: ServiceConfig,
) {
    tracing::info!("spawning postbin http server...");
    if let Err(err) = server::run_http_server(args, guard, service_config)
        .instrument(tracing::debug_span!(
            "http server lifetime",
            server.service.name = utils::env::project_name(),
            otel.kind = "server",
            network.protocol.name = "http",
        ))
        .await
    {
        tracing::error!("http server exited with an error: {err}");
        let _ = error_tx.send(err).await;
    }
}

fn new_shutdown_signal(
    error_rx: tokio::sync::mpsc::Receiver<BoxError>,
    base_shutdown_signal: impl Future<Output: Send + 'static> + Send + 'static,
) -> impl Future + Send + 'static {
    async move {
        let mut mut_error_rx = error_rx;
        let mut signal = Box::pin(base_shutdown_signal);

        tokio::select! {
            _ = signal.as_mut() => {
                tracing::debug!("default signal triggered: init graceful shutdown");
            }
            err = mut_error_rx.recv() => {
                if let Some(err) = err {
                    tracing::error!("fatal err received: {err}; abort");
                } else {
                    tracing::info!("wait for default signal, no error was received");
                    signal.await;
                    tracing::debug!("default signal triggered: init graceful shutdown");
                }
            }
        }
    }
}
