use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "infra",
    about = "Operator CLI for a serverless micro-service",
    long_about = "Reports feature environments, syncs them with the parameter store\n\
                  and builds and deploys lambda features."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Application env (dev, qa, prod, ...)
    #[arg(short, long, env = "ENV", global = true)]
    pub env: Option<String>,
    /// Service label, defaults to the name of the root directory
    #[arg(long, env = "APP_NAME", global = true)]
    pub app: Option<String>,
    /// Root directory of the service repository
    #[arg(long, default_value = ".", global = true)]
    pub root: PathBuf,
    /// AWS region the service is deployed to
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1", global = true)]
    pub region: String,
    /// AWS profile used for credentials
    #[arg(long, env = "AWS_PROFILE", global = true)]
    pub profile: Option<String>,
    /// Apply to the whole service
    #[arg(short, long, global = true)]
    pub all: bool,
    /// Skip default values
    #[arg(long, global = true)]
    pub skip_defaults: bool,
    /// Feature names are given with their trigger (ex apigw_feature)
    #[arg(short = 't', long, global = true)]
    pub name_includes_trigger: bool,
    /// Use plain text instead of json
    #[arg(long, env = "CLI_FORMAT_TEXT", global = true)]
    pub text: bool,
    /// Display names as fully qualified
    #[arg(long, env = "QUALIFIED_NAMES", global = true)]
    pub qualified_name: bool,
    /// Store parameters as SecureString
    #[arg(long, default_value_t = true, action = ArgAction::Set, global = true)]
    pub encrypt: bool,
    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Display environment variables for a feature or the whole service
    Env(EnvArgs),
    /// Display parameter store values for a feature or the whole service
    Pstore(PstoreArgs),
    /// Build and deploy a feature, or only its environment
    Deploy(DeployArgs),
}

#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
pub struct EnvArgs {
    #[command(subcommand)]
    pub command: Option<EnvCommand>,
    pub feature: Option<String>,
    /// Only display the env var names
    #[arg(long)]
    pub names_only: bool,
}

#[derive(Debug, Subcommand)]
pub enum EnvCommand {
    /// Export env vars of a feature or the whole service
    Export {
        feature: Option<String>,
        /// Export to a json file
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Only export the env var names
        #[arg(long)]
        names_only: bool,
    },
}

#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
pub struct PstoreArgs {
    #[command(subcommand)]
    pub command: Option<PstoreCommand>,
    pub feature: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum PstoreCommand {
    /// Import params into the parameter store
    Import {
        /// Read values from a json file of KEY: value
        #[arg(short, long, conflicts_with = "from_env")]
        file: Option<PathBuf>,
        /// Read values from env vars on this machine
        #[arg(long)]
        from_env: bool,
        /// Replace values that already exist
        #[arg(long)]
        overwrite: bool,
    },
    /// Export params of a feature or the whole service
    Export {
        feature: Option<String>,
        /// Export to a json file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Delete a single param, a feature's params or all params of the service
    Delete {
        key: Option<String>,
        /// Only delete params for the given feature (with --all)
        #[arg(long)]
        feature: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    pub feature: String,
    /// Only update environment variables
    #[arg(long)]
    pub env_only: bool,
    /// Compilation target triple for the lambda binary
    #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
    pub target: String,
    /// Build profile used for the binary
    #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
    pub profile: BuildProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    pub fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}
