//! Firmware Site CLI Module
//! Command-line interface for running and administering a firmware site

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "firmware-site")]
#[command(version)]
#[command(about = "Vendor firmware distribution endpoint", long_about = None)]
pub struct Cli {
    /// Site directory holding firmware.config.json (defaults to current directory)
    #[arg(short, long, global = true)]
    pub site: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default firmware.config.json into the site directory
    Init {
        /// Vendor name
        #[arg(short, long)]
        name: String,

        /// Firmware id reported to devices
        #[arg(long, default_value = "8080")]
        firmware_id: String,
    },

    /// Start the distribution API server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Show site status
    Status,

    /// Vendor keypair management
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },

    /// Produce a detached signature for a file
    Sign {
        /// File to sign
        file: PathBuf,
    },

    /// Check a detached signature against a file
    Verify {
        /// Signed file
        file: PathBuf,

        /// Signature in the configured transport encoding
        signature: String,
    },

    /// Encrypt a file with the vendor public key
    Encrypt {
        /// File to encrypt
        file: PathBuf,
    },

    /// Decrypt transport-encoded ciphertext with the vendor private key
    Decrypt {
        /// File holding the encoded ciphertext
        file: PathBuf,

        /// Write plaintext here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Publish a new firmware version for a model
    Release {
        /// Device model identifier
        model: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum KeysAction {
    /// Print the active public key
    Show,

    /// Generate and persist a fresh keypair
    Rotate,
}

impl Cli {
    pub fn get_site_dir(&self) -> PathBuf {
        self.site
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}
