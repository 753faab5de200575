//! Config for the tokio runtime the gateway runs on.

use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Tokio runtime type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TokioRuntimeType {
    /// Current-thread runtime.
    CurrentThread,

    /// Multi-thread runtime.
    #[default]
    MultiThread,
}

/// CLI config for the tokio runtime.
#[derive(Debug, Clone, clap::Parser)]
#[allow(missing_copy_implementations)]
pub struct TokioRuntimeConfig {
    /// Set the maximum number of runtime worker threads to use.
    ///
    /// Defaults to the number of logical cores on the system.
    #[clap(long = "num-threads", env = "GATEWAY_NUM_THREADS", action)]
    pub num_threads: Option<NonZeroUsize>,

    /// Tokio runtime type.
    #[clap(
        long = "runtime-type",
        env = "GATEWAY_RUNTIME_TYPE",
        default_value_t = TokioRuntimeType::default(),
        value_enum,
        action
    )]
    pub runtime_type: TokioRuntimeType,

    /// Limit on threads spawned for blocking work, such as embedded database
    /// queries.
    #[clap(
        long = "max-blocking-threads",
        env = "GATEWAY_MAX_BLOCKING_THREADS",
        action
    )]
    pub max_blocking_threads: Option<NonZeroUsize>,

    /// How long an idle thread of the blocking pool is kept around.
    #[clap(
        long = "thread-keep-alive",
        env = "GATEWAY_THREAD_KEEP_ALIVE",
        value_parser = humantime::parse_duration
    )]
    pub thread_keep_alive: Option<Duration>,
}

impl TokioRuntimeConfig {
    /// Creates the tokio runtime builder.
    pub fn builder(&self) -> Result<::tokio::runtime::Builder, std::io::Error> {
        // Logging is not initialised yet, report problems through the error.
        let mut builder = match self.runtime_type {
            TokioRuntimeType::CurrentThread => ::tokio::runtime::Builder::new_current_thread(),
            TokioRuntimeType::MultiThread => ::tokio::runtime::Builder::new_multi_thread(),
        };
        builder.enable_all();

        let thread_counter = Arc::new(AtomicUsize::new(1));
        builder.thread_name_fn(move || {
            format!(
                "gateway-tokio-{}",
                thread_counter.fetch_add(1, Ordering::SeqCst)
            )
        });

        if self.runtime_type == TokioRuntimeType::MultiThread {
            let num_threads = match self.num_threads {
                Some(n) => n,
                None => std::thread::available_parallelism()?,
            };
            builder.worker_threads(num_threads.get());
        }

        if let Some(x) = self.max_blocking_threads {
            builder.max_blocking_threads(x.get());
        }

        if let Some(x) = self.thread_keep_alive {
            builder.thread_keep_alive(x);
        }

        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn defaults() {
        let config = TokioRuntimeConfig::parse_from(["prog"]);
        assert_eq!(config.runtime_type, TokioRuntimeType::MultiThread);
        assert!(config.num_threads.is_none());
    }

    #[test]
    fn thread_name() {
        let config = TokioRuntimeConfig::parse_from(["prog", "--num-threads", "2"]);
        let rt = config.builder().unwrap().build().unwrap();
        let name = rt
            .block_on(async {
                ::tokio::task::spawn(async { std::thread::current().name().map(str::to_string) })
                    .await
            })
            .unwrap()
            .unwrap();
        assert!(name.starts_with("gateway-tokio-"), "{name}");
    }

    #[test]
    fn current_thread_runtime_runs() {
        let config = TokioRuntimeConfig::parse_from([
            "prog",
            "--runtime-type",
            "current-thread",
            "--thread-keep-alive",
            "5s",
        ]);
        assert_eq!(config.thread_keep_alive, Some(Duration::from_secs(5)));
        let rt = config.builder().unwrap().build().unwrap();
        assert_eq!(rt.block_on(async { 1 + 1 }), 2);
    }
}
