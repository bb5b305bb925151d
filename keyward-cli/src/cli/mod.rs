//! Command-line interface
//!
//! Subcommands: list, report, backup, zfs-rekey, zfs-create, zfs-list.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::execute;

/// Tools for interacting with a key store
#[derive(Parser, Debug)]
#[command(name = "keyward")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List keys stored in the store
    List {
        /// Path of a keystore to list keys from
        keystore: PathBuf,
    },

    /// Write a printable listing of the keys into the store
    Report {
        /// Path of a keystore to generate the report from
        keystore: PathBuf,
    },

    /// Backup one keystore to another
    Backup {
        /// Path of keystore to backup
        keystore: PathBuf,

        /// Path of keystore to backup to
        dest: PathBuf,

        /// Backup even if a key with the same name exists in the destination keystore
        #[arg(short, long)]
        force: bool,
    },

    /// Generate new keys for datasets in zfs
    ZfsRekey {
        /// Path of a keystore to store the new keys in, '-' to do a dry run
        keystore: String,

        /// Datasets to rekey; all datasets when none are given
        #[arg(value_name = "DATASET")]
        datasets: Vec<String>,

        /// Rekey all child datasets of the selected datasets
        #[arg(short, long)]
        recursive: bool,
    },

    /// Create a new dataset encrypted with a key in the keystore
    ZfsCreate {
        /// Path of a keystore to create the new key in
        keystore: PathBuf,

        /// Dataset to create
        dataset: String,

        /// Extra 'zfs create' options to add when creating
        #[arg(value_name = "OPTION", allow_hyphen_values = true)]
        options: Vec<String>,
    },

    /// List zfs datasets that are keyed through the keystore
    ZfsList {
        /// Path of the keystore to list datasets for
        keystore: PathBuf,
    },
}
