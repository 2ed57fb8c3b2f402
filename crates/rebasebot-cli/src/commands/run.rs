//! `rebasebot run` command - one rebase run.

use anyhow::Result;

use super::RunArgs;
use super::utils::{self, Session};
use crate::output;
use crate::signals::Shutdown;

/// Run once and return the process exit code. A run stopped by a signal
/// reports nothing and exits 0.
pub fn run(args: &RunArgs) -> Result<i32> {
    let session = Session::open(args)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let shutdown = Shutdown::new();
        shutdown.listen();

        let Some(report) = session.run_once(shutdown.flag()).await else {
            output::info("Cancelled");
            return Ok(0);
        };
        utils::print_report(&report, args.json)?;
        session.notify(&report).await;
        Ok::<_, anyhow::Error>(utils::exit_code(&report))
    })
}
