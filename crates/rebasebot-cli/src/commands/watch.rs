//! `rebasebot watch` command - run on an interval until a signal arrives.

use std::time::Duration;

use anyhow::Result;
use tracing::info;

use super::RunArgs;
use super::utils::{self, Session};
use crate::output;
use crate::signals::Shutdown;

/// Loop until SIGINT or SIGTERM. The exit code is the last completed run's.
pub fn run(args: &RunArgs, interval: Option<u64>) -> Result<i32> {
    let session = Session::open(args)?;
    let secs = interval.unwrap_or(session.config.bot.poll_interval_secs).max(1);
    let every = Duration::from_secs(secs);
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let shutdown = Shutdown::new();
        shutdown.listen();
        output::info(&format!(
            "Watching {} every {}s",
            session.targets.dest,
            every.as_secs()
        ));

        let mut code = 0;
        while !shutdown.is_requested() {
            let Some(report) = session.run_once(shutdown.flag()).await else {
                break;
            };
            utils::print_report(&report, args.json)?;
            session.notify(&report).await;
            code = utils::exit_code(&report);

            tokio::select! {
                () = tokio::time::sleep(every) => {}
                () = shutdown.requested() => {}
            }
        }

        info!("shutdown requested, stopping");
        output::info("Stopped");
        Ok::<_, anyhow::Error>(code)
    })
}
