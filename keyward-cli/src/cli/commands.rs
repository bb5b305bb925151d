//! Command handlers
//!
//! Each handler returns the process exit code. Soft failures (collisions,
//! refused volume operations) print what went wrong and return a failure
//! code; hard errors propagate.

use anyhow::{anyhow, Context, Result};
use keyward_config::AppConfig;
use keyward_keys::key_types::PRIVATE_FILE_MODE;
use keyward_keys::report::{collect_report, ReportRenderer, TextReportRenderer};
use keyward_keys::{
    backup, BackupMode, BackupOutcome, KeyDestination, KeyStore, RekeyAction, VolumeKeyManager,
    ZfsCli,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::Commands;

/// Execute the parsed CLI command
pub async fn execute(command: Commands, config: &AppConfig) -> Result<ExitCode> {
    match command {
        Commands::List { keystore } => cmd_list(&keystore).await,
        Commands::Report { keystore } => cmd_report(&keystore).await,
        Commands::Backup {
            keystore,
            dest,
            force,
        } => cmd_backup(&keystore, &dest, force).await,
        Commands::ZfsRekey {
            keystore,
            datasets,
            recursive,
        } => cmd_zfs_rekey(config, &keystore, &datasets, recursive).await,
        Commands::ZfsCreate {
            keystore,
            dataset,
            options,
        } => cmd_zfs_create(config, &keystore, &dataset, &options).await,
        Commands::ZfsList { keystore } => cmd_zfs_list(config, &keystore).await,
    }
}

async fn open_store(path: &Path) -> Result<KeyStore> {
    KeyStore::open(path)
        .await?
        .ok_or_else(|| anyhow!("key store not found: {}", path.display()))
}

fn volume_key_manager(config: &AppConfig) -> VolumeKeyManager {
    VolumeKeyManager::new(Arc::new(ZfsCli::new(&config.zfs_binary)))
        .with_key_len(config.key_length)
}

async fn cmd_list(keystore: &Path) -> Result<ExitCode> {
    let store = open_store(keystore).await?;
    for key in store.all_keys().await? {
        let flags = if key.is_valid().await? { "" } else { "bad_sum" };
        println!("{} [{}]", key.name(), flags);
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_report(keystore: &Path) -> Result<ExitCode> {
    let store = open_store(keystore).await?;
    let entries = collect_report(&store).await?;

    let report_name = chrono::Local::now()
        .format("keys_%Y%m%dT%H%M%S.txt")
        .to_string();
    let report_path = store.root().join(report_name);

    let mut out = Vec::new();
    TextReportRenderer.render(&entries, &mut out)?;
    write_private(&report_path, &out)
        .await
        .with_context(|| format!("writing {}", report_path.display()))?;

    println!("report generated at: {}", report_path.display());
    Ok(ExitCode::SUCCESS)
}

/// Write a file readable by the owner only (on Unix)
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(PRIVATE_FILE_MODE);
    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

async fn cmd_backup(keystore: &Path, dest: &Path, force: bool) -> Result<ExitCode> {
    let source = open_store(keystore).await?;
    let dest = KeyStore::create_or_open(dest).await?;
    let mode = if force {
        BackupMode::Force
    } else {
        BackupMode::Safe
    };

    match backup(&source, &dest, mode).await? {
        BackupOutcome::Copied(names) => {
            info!(count = names.len(), "Backed up keys");
            Ok(ExitCode::SUCCESS)
        }
        BackupOutcome::Collisions(names) => {
            println!("not backing up because the following keys already exist in destination");
            for name in names {
                println!("{}", name);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn cmd_zfs_rekey(
    config: &AppConfig,
    keystore: &str,
    datasets: &[String],
    recursive: bool,
) -> Result<ExitCode> {
    let dest = KeyDestination::resolve(keystore).await?;
    let report = volume_key_manager(config)
        .rekey(&dest, datasets, recursive)
        .await?;

    for entry in &report.entries {
        match &entry.action {
            RekeyAction::Planned => println!("would rekey: {}", entry.volume),
            RekeyAction::Rebound(key) => {
                println!("rekeyed: {} -> {}", entry.volume, key.path.display())
            }
            RekeyAction::RebindFailed(key) => println!(
                "FAILED: {} (unused key left at {})",
                entry.volume,
                key.path.display()
            ),
        }
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_zfs_create(
    config: &AppConfig,
    keystore: &Path,
    dataset: &str,
    options: &[String],
) -> Result<ExitCode> {
    let store = KeyStore::create_or_open(keystore).await?;
    let key = volume_key_manager(config)
        .create_volume(&store, dataset, options)
        .await?;
    println!("created: {} -> {}", dataset, key.path.display());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_zfs_list(config: &AppConfig, keystore: &Path) -> Result<ExitCode> {
    let store = open_store(keystore).await?;
    for keyed in volume_key_manager(config).keyed_volumes(&store).await? {
        let flags = if keyed.key_valid { "" } else { "bad_sum" };
        println!("{} {} [{}]", keyed.volume, keyed.key_name, flags);
    }
    Ok(ExitCode::SUCCESS)
}
