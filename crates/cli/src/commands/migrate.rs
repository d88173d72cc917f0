use loadout_core::config::LoadOptions;

use crate::commands::{async_runtime, load_config, open_database, CommandFailure, CommandResult};

pub fn run(options: &LoadOptions) -> CommandResult {
    match execute(options) {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure.into_result("migrate"),
    }
}

fn execute(options: &LoadOptions) -> Result<(), CommandFailure> {
    let config = load_config(options)?;
    let runtime = async_runtime()?;

    runtime.block_on(async {
        let pool = open_database(&config).await?;
        pool.close().await;
        Ok::<(), CommandFailure>(())
    })
}
