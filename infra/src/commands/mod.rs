pub mod deploy;
pub mod env;
pub mod pstore;

use crate::build::CargoPackager;
use crate::cli::{Cli, Command};
use crate::context::CmdContext;
use crate::error::CliError;
use crate::output::Output;

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = CmdContext::new(cli.global);
    let mut out = Output::stdio(ctx.global.text);
    let mut service = ctx.load_service()?;

    match cli.command {
        Command::Env(args) => env::run(&ctx, &mut service, args, &mut out),
        Command::Pstore(args) => {
            let config = ctx.aws_config().await;
            let store = ctx.pstore_client(&config);
            pstore::run(&ctx, &mut service, args, &store, &mut out).await
        }
        Command::Deploy(args) => {
            let config = ctx.aws_config().await;
            let store = ctx.pstore_client(&config);
            let deployer = ctx.deployer(&config);
            deploy::run(
                &ctx,
                &mut service,
                args,
                &store,
                &deployer,
                &CargoPackager,
                &mut out,
            )
            .await
        }
    }
}
