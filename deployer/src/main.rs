//! Fargate Deployer CLI

use clap::{Arg, ArgAction, Command};
use fargate_deployer::ecs;
use std::path::PathBuf;
use tracing::error;

/// Returns the version of the crate.
pub const fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Flag for verbose output
const VERBOSE_FLAG: &str = "verbose";

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .required(true)
        .help("Path to YAML stack file")
        .value_parser(clap::value_parser!(PathBuf))
}

/// Entrypoint for the Fargate Deployer CLI
#[tokio::main]
async fn main() -> std::process::ExitCode {
    // Define application
    let matches = Command::new("deployer")
        .version(crate_version())
        .about("Validate a Fargate service stack and roll new container images out to it.")
        .arg(
            Arg::new(VERBOSE_FLAG)
                .short('v')
                .long(VERBOSE_FLAG)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new(ecs::CMD)
                .about("Build, push and roll out container images to an ECS service running on Fargate.")
                .subcommand(
                    Command::new(ecs::VALIDATE_CMD)
                        .about("Check a stack file without contacting AWS.")
                        .arg(config_arg()),
                )
                .subcommand(
                    Command::new(ecs::RENDER_CMD)
                        .about("Swap the image of one container in a task definition file.")
                        .arg(
                            Arg::new("task-definition")
                                .long("task-definition")
                                .required(true)
                                .help("Path to task definition JSON")
                                .value_parser(clap::value_parser!(PathBuf)),
                        )
                        .arg(
                            Arg::new("container-name")
                                .long("container-name")
                                .required(true)
                                .help("Name of the container to update")
                                .value_parser(clap::value_parser!(String)),
                        )
                        .arg(
                            Arg::new("image")
                                .long("image")
                                .required(true)
                                .help("Image URI (e.g. repo:tag)")
                                .value_parser(clap::value_parser!(String)),
                        )
                        .arg(
                            Arg::new("strip-read-only")
                                .long("strip-read-only")
                                .help("Remove the fields the control plane generates (arn, revision, status, ...) so the output can be registered")
                                .action(ArgAction::SetTrue),
                        )
                        .arg(
                            Arg::new("output")
                                .long("output")
                                .help("Where to write the rendered task definition (defaults to stdout)")
                                .value_parser(clap::value_parser!(PathBuf)),
                        ),
                )
                .subcommand(
                    Command::new(ecs::BUILD_CMD)
                        .about("Validate the stack and build its image without rolling it out.")
                        .arg(config_arg())
                        .arg(
                            Arg::new("commit")
                                .long("commit")
                                .help("Commit to tag the image with. If not provided, GITHUB_SHA or the checked out HEAD is used.")
                                .value_parser(clap::value_parser!(String)),
                        )
                        .arg(
                            Arg::new("push")
                                .long("push")
                                .help("Push the image to the registry after building it")
                                .action(ArgAction::SetTrue),
                        ),
                )
                .subcommand(
                    Command::new(ecs::DEPLOY_CMD)
                        .about("Build and push an image for the current commit, then roll it out and wait for steady state.")
                        .arg(config_arg())
                        .arg(
                            Arg::new("commit")
                                .long("commit")
                                .help("Commit to tag the image with. If not provided, GITHUB_SHA or the checked out HEAD is used.")
                                .value_parser(clap::value_parser!(String)),
                        ),
                )
                .subcommand(
                    Command::new(ecs::ROLLBACK_CMD)
                        .about("Roll the service out to an image that was already pushed.")
                        .arg(config_arg())
                        .arg(
                            Arg::new("tag")
                                .long("tag")
                                .help("Image tag to roll back to. If not provided, the previous successful rollout is used.")
                                .value_parser(clap::value_parser!(String)),
                        ),
                )
                .subcommand(
                    Command::new(ecs::SCALE_CMD)
                        .about("Set the desired task count (within the stack's scaling bounds).")
                        .arg(config_arg())
                        .arg(
                            Arg::new("count")
                                .long("count")
                                .required(true)
                                .help("Desired number of tasks")
                                .value_parser(clap::value_parser!(u32)),
                        ),
                )
                .subcommand(
                    Command::new(ecs::STATUS_CMD)
                        .about("Show the service's deployments and rollout state.")
                        .arg(config_arg()),
                )
                .subcommand(
                    Command::new(ecs::OUTPUTS_CMD)
                        .about("Print the stack outputs (names and live identifiers) as YAML.")
                        .arg(config_arg()),
                )
                .subcommand(
                    Command::new(ecs::HISTORY_CMD)
                        .about("List recorded rollouts, newest first.")
                        .arg(config_arg()),
                ),
        )
        .get_matches();

    // Create logger
    let level = if matches.get_flag(VERBOSE_FLAG) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    // Parse subcommands
    if let Some(ecs_matches) = matches.subcommand_matches(ecs::CMD) {
        match ecs_matches.subcommand() {
            Some((ecs::VALIDATE_CMD, matches)) => {
                let config_path = matches.get_one::<PathBuf>("config").unwrap();
                if let Err(e) = ecs::validate(config_path) {
                    error!(error=?e, "invalid stack");
                } else {
                    return std::process::ExitCode::SUCCESS;
                }
            }
            Some((ecs::RENDER_CMD, matches)) => {
                let task_definition = matches.get_one::<PathBuf>("task-definition").unwrap();
                let container = matches.get_one::<String>("container-name").unwrap();
                let image = matches.get_one::<String>("image").unwrap();
                let strip = matches.get_flag("strip-read-only");
                let output = matches.get_one::<PathBuf>("output");
                if let Err(e) = ecs::render_file(
                    task_definition,
                    container,
                    image,
                    strip,
                    output.map(|p| p.as_path()),
                ) {
                    error!(error=?e, "failed to render task definition");
                } else {
                    return std::process::ExitCode::SUCCESS;
                }
            }
            Some((ecs::BUILD_CMD, matches)) => {
                let config_path = matches.get_one::<PathBuf>("config").unwrap();
                let commit = matches.get_one::<String>("commit").map(|s| s.as_str());
                let push = matches.get_flag("push");
                if let Err(e) = ecs::build(config_path, commit, push).await {
                    error!(error=?e, "failed to build image");
                } else {
                    return std::process::ExitCode::SUCCESS;
                }
            }
            Some((ecs::DEPLOY_CMD, matches)) => {
                let config_path = matches.get_one::<PathBuf>("config").unwrap();
                let commit = matches.get_one::<String>("commit").map(|s| s.as_str());
                if let Err(e) = ecs::deploy(config_path, commit).await {
                    error!(error=?e, "failed to deploy");
                } else {
                    return std::process::ExitCode::SUCCESS;
                }
            }
            Some((ecs::ROLLBACK_CMD, matches)) => {
                let config_path = matches.get_one::<PathBuf>("config").unwrap();
                let tag = matches.get_one::<String>("tag").map(|s| s.as_str());
                if let Err(e) = ecs::rollback(config_path, tag).await {
                    error!(error=?e, "failed to roll back");
                } else {
                    return std::process::ExitCode::SUCCESS;
                }
            }
            Some((ecs::SCALE_CMD, matches)) => {
                let config_path = matches.get_one::<PathBuf>("config").unwrap();
                let count = *matches.get_one::<u32>("count").unwrap();
                if let Err(e) = ecs::scale(config_path, count).await {
                    error!(error=?e, "failed to scale service");
                } else {
                    return std::process::ExitCode::SUCCESS;
                }
            }
            Some((ecs::STATUS_CMD, matches)) => {
                let config_path = matches.get_one::<PathBuf>("config").unwrap();
                if let Err(e) = ecs::status(config_path).await {
                    error!(error=?e, "failed to get service status");
                } else {
                    return std::process::ExitCode::SUCCESS;
                }
            }
            Some((ecs::OUTPUTS_CMD, matches)) => {
                let config_path = matches.get_one::<PathBuf>("config").unwrap();
                if let Err(e) = ecs::outputs(config_path).await {
                    error!(error=?e, "failed to collect outputs");
                } else {
                    return std::process::ExitCode::SUCCESS;
                }
            }
            Some((ecs::HISTORY_CMD, matches)) => {
                let config_path = matches.get_one::<PathBuf>("config").unwrap();
                if let Err(e) = ecs::history(config_path) {
                    error!(error=?e, "failed to list rollouts");
                } else {
                    return std::process::ExitCode::SUCCESS;
                }
            }
            Some((cmd, _)) => {
                error!(cmd, "invalid subcommand");
            }
            None => {
                error!("no subcommand provided");
            }
        }
    } else if let Some(cmd) = matches.subcommand_name() {
        error!(cmd, "invalid subcommand");
    } else {
        error!("no subcommand provided");
    }
    std::process::ExitCode::FAILURE
}
