mod serve;

use anyhow::{Context, Result};
use burrow_cli::{Cli, Command, ConnectArgs};
use burrow_config::{AppConfig, AppPaths, ConfigManager};
use burrow_core::{FileManager, OperationResult};
use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let paths = AppPaths::new()?;
    let config_manager = ConfigManager::new(paths.clone());
    let config = config_manager.load(
        std::env::current_dir().ok().as_deref(),
        cli.config.as_deref(),
        Some(cli.overrides()),
    )?;
    let _log_guard = init_logging(&config, &paths)?;

    if let Command::Config { init } = &cli.command {
        if *init {
            config_manager.save_default()?;
            println!("config initialized at {}", paths.config_file.display());
        } else {
            print!("{}", burrow_config::to_toml(&config)?);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let manager = FileManager::from_config(&config);
    let code = if cli.is_serve() {
        serve::run(manager.clone(), config.ssh.port).await?;
        ExitCode::SUCCESS
    } else {
        let ok = run_once(&manager, &config, cli.command).await?;
        if ok {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    };
    manager.shutdown().await;
    Ok(code)
}

fn emit<T: Serialize>(result: OperationResult<T>) -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.success)
}

async fn run_once(manager: &FileManager, config: &AppConfig, command: Command) -> Result<bool> {
    let port = config.ssh.port;
    let target = |conn: &ConnectArgs| -> Result<_> {
        Ok((conn.endpoint(port)?, conn.credentials()?))
    };
    match command {
        Command::Ls { conn, path } => {
            let (endpoint, creds) = target(&conn)?;
            emit(manager.list_directory(&endpoint, &creds, path).await)
        }
        Command::Mkdir { conn, parent, name } => {
            let (endpoint, creds) = target(&conn)?;
            emit(manager.create_directory(&endpoint, &creds, parent, name).await)
        }
        Command::Cat { conn, path } => {
            let (endpoint, creds) = target(&conn)?;
            let result = manager.read_file(&endpoint, &creds, path).await;
            if let (true, Some(text)) = (result.success, &result.data) {
                print!("{}", text);
                return Ok(true);
            }
            emit(result)
        }
        Command::Write { conn, path, from } => {
            let (endpoint, creds) = target(&conn)?;
            let content = match from {
                Some(file) => tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?,
                None => {
                    let mut text = String::new();
                    tokio::io::stdin().read_to_string(&mut text).await?;
                    text
                }
            };
            emit(manager.write_file(&endpoint, &creds, path, content).await)
        }
        Command::Upload {
            conn,
            local,
            dest_dir,
            name,
        } => {
            let (endpoint, creds) = target(&conn)?;
            let name = match name {
                Some(name) => name,
                None => local
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .with_context(|| format!("{} has no file name", local.display()))?,
            };
            let mut file = tokio::fs::File::open(&local)
                .await
                .with_context(|| format!("opening {}", local.display()))?;
            emit(
                manager
                    .upload_file(&endpoint, &creds, dest_dir, name, &mut file)
                    .await,
            )
        }
        Command::Rename {
            conn,
            old_path,
            new_path,
        } => {
            let (endpoint, creds) = target(&conn)?;
            emit(manager.rename(&endpoint, &creds, old_path, new_path).await)
        }
        Command::Rm { conn, path, dir } => {
            let (endpoint, creds) = target(&conn)?;
            if dir {
                emit(manager.delete_directory(&endpoint, &creds, path).await)
            } else {
                emit(manager.delete_file(&endpoint, &creds, path).await)
            }
        }
        Command::Chmod { conn, path, bits } => {
            let (endpoint, creds) = target(&conn)?;
            emit(
                manager
                    .change_permissions(&endpoint, &creds, path, bits.into())
                    .await,
            )
        }
        Command::Cp {
            conn,
            source,
            destination,
        } => {
            let (endpoint, creds) = target(&conn)?;
            emit(manager.copy(&endpoint, &creds, source, destination).await)
        }
        Command::Mv {
            conn,
            source,
            destination,
        } => {
            let (endpoint, creds) = target(&conn)?;
            emit(manager.move_entry(&endpoint, &creds, source, destination).await)
        }
        Command::Serve | Command::Config { .. } => Ok(true),
    }
}

fn init_logging(
    config: &AppConfig,
    paths: &AppPaths,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let (file_layer, guard) = if config.logging.file {
        std::fs::create_dir_all(&paths.log_dir)?;
        let file_appender = tracing_appender::rolling::daily(&paths.log_dir, "burrow.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = if config.logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .boxed()
        };
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // stdout carries results, so console logs go to stderr.
    let stderr_layer = if !config.logging.stderr {
        None
    } else if config.logging.json {
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .boxed(),
        )
    } else {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .boxed(),
        )
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}
