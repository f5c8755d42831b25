//! Firmware Site CLI - Main entry point for CLI binary
//!
//! This binary provides the `firmware-site` tool for serving updates and
//! administering the vendor keypair.

use firmware_site_lib::engine::{
    api::create_router,
    cli::{Cli, Commands, KeysAction, OutputFormat},
    config::Config,
    crypto::FileSigner,
    updater::validate_model,
    Site,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run_cli(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let site_dir = cli.get_site_dir();
    let json_output = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::Init { name, firmware_id } => {
            cmd_init(&site_dir, &name, &firmware_id, json_output)?;
        }
        Commands::Serve { port, host } => {
            cmd_serve(&site_dir, host, port)?;
        }
        Commands::Status => {
            cmd_status(&site_dir, json_output)?;
        }
        Commands::Keys { action } => {
            cmd_keys(action, &site_dir, json_output)?;
        }
        Commands::Sign { file } => {
            cmd_sign(&site_dir, &file, json_output)?;
        }
        Commands::Verify { file, signature } => {
            cmd_verify(&site_dir, &file, &signature, json_output)?;
        }
        Commands::Encrypt { file } => {
            cmd_encrypt(&site_dir, &file, json_output)?;
        }
        Commands::Decrypt { file, output } => {
            cmd_decrypt(&site_dir, &file, output, json_output)?;
        }
        Commands::Release { model } => {
            cmd_release(&site_dir, &model, json_output)?;
        }
    }

    Ok(())
}

fn cmd_init(site_dir: &Path, name: &str, firmware_id: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if site_dir.join(firmware_site_lib::engine::config::CONFIG_FILE).exists() {
        return Err(format!("Site already initialized: {}", site_dir.display()).into());
    }
    std::fs::create_dir_all(site_dir)?;

    let config = Config::default_for_site(name, firmware_id);
    config.save(site_dir)?;
    std::fs::create_dir_all(config.updates_dir(site_dir))?;

    let site = Site::with_config(site_dir, config)?;
    let keys = site.initialized_keys()?;

    if json {
        println!("{}", serde_json::json!({
            "success": true,
            "site_dir": site_dir.display().to_string(),
            "name": name,
            "firmware_id": firmware_id,
            "algorithm": keys.config().algorithm.to_string(),
        }));
    } else {
        println!("Created firmware site: {}", name);
        println!("   Directory: {}", site_dir.display());
        println!("   Firmware ID: {}", firmware_id);
        println!("   Key: {} ({} bits)", keys.config().algorithm, keys.config().key_bits);
    }

    Ok(())
}

#[tokio::main]
async fn cmd_serve(site_dir: &Path, host: Option<String>, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let site = Site::open(site_dir)?;
    let state = site.api_state()?;
    let app = create_router(state);

    let host = host.unwrap_or_else(|| site.config.api.host.clone());
    let port = port.unwrap_or(site.config.api.port);
    let addr = format!("{}:{}", host, port);
    println!("Firmware Site API Server");
    println!("   Vendor: {}", site.config.vendor.name);
    println!("   Listening: http://{}", addr);
    println!("   Press Ctrl+C to stop");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cmd_status(site_dir: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let site = Site::open(site_dir)?;
    let config = &site.config;
    let versions = site.db.list_versions(&config.vendor.firmware_id)?;
    let stored_keys = site.db.vendor_key_count()?;

    if json {
        println!("{}", serde_json::json!({
            "vendor": config.vendor.name,
            "firmware_id": config.vendor.firmware_id,
            "algorithm": config.crypto.algorithm.to_string(),
            "key_bits": config.crypto.key_bits,
            "transport_encoding": config.crypto.transport_encoding.as_str(),
            "api_port": config.api.port,
            "stored_keys": stored_keys,
            "models": versions,
        }));
    } else {
        println!("Firmware Site Status");
        println!("   Vendor: {} (firmware {})", config.vendor.name, config.vendor.firmware_id);
        println!("   Database: {}", config.database.path.display());
        println!("   Key: {} ({} bits), {} stored", config.crypto.algorithm, config.crypto.key_bits, stored_keys);
        println!("   Encoding: {}", config.crypto.transport_encoding.as_str());
        println!("   API Port: {}", config.api.port);
        if versions.is_empty() {
            println!("\n   Models: (none)");
        } else {
            println!("\n   Models:");
            for record in &versions {
                println!("   {} - version {}", record.model_id, record.version);
            }
        }
    }

    Ok(())
}

fn cmd_keys(action: KeysAction, site_dir: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let site = Site::open(site_dir)?;
    let mut keys = site.key_manager();

    match action {
        KeysAction::Show => keys.initialize()?,
        KeysAction::Rotate => keys.generate()?,
    }

    let encoded = site.config.crypto.transport_encoding.encode(keys.public_key_der()?);
    if json {
        println!("{}", serde_json::json!({
            "action": "publickey",
            "algorithm": keys.config().algorithm.to_string(),
            "publickey": encoded,
        }));
    } else {
        if matches!(action, KeysAction::Rotate) {
            println!("Generated new {} keypair", keys.config().algorithm);
        }
        println!("{}", encoded);
    }

    Ok(())
}

fn cmd_sign(site_dir: &Path, file: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let site = Site::open(site_dir)?;
    let keys = site.initialized_keys()?;
    let signature = FileSigner::sign_file(file, keys.private_key()?)?;
    let encoded = site.config.crypto.transport_encoding.encode(&signature);

    if json {
        println!("{}", serde_json::json!({
            "file": file.display().to_string(),
            "signature": encoded,
        }));
    } else {
        println!("{}", encoded);
    }

    Ok(())
}

fn cmd_verify(site_dir: &Path, file: &Path, signature: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let site = Site::open(site_dir)?;
    let keys = site.initialized_keys()?;
    let signature = site.config.crypto.transport_encoding.decode(signature)?;
    let valid = FileSigner::verify_file(file, &signature, keys.public_key()?)?;

    if json {
        println!("{}", serde_json::json!({
            "file": file.display().to_string(),
            "valid": valid,
        }));
    } else if valid {
        println!("Signature valid: {}", file.display());
    } else {
        println!("Signature INVALID: {}", file.display());
    }

    if !valid {
        return Err("signature does not match".into());
    }
    Ok(())
}

fn cmd_encrypt(site_dir: &Path, file: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let site = Site::open(site_dir)?;
    let keys = site.initialized_keys()?;
    let plaintext = std::fs::read(file)?;
    let encoded = site.config.cipher().encrypt_encoded(&plaintext, keys.public_key()?)?;

    if json {
        println!("{}", serde_json::json!({
            "file": file.display().to_string(),
            "ciphertext": encoded,
        }));
    } else {
        println!("{}", encoded);
    }

    Ok(())
}

fn cmd_decrypt(site_dir: &Path, file: &Path, output: Option<PathBuf>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let site = Site::open(site_dir)?;
    let keys = site.initialized_keys()?;
    let text = std::fs::read_to_string(file)?;
    let plaintext = site.config.cipher().decrypt_encoded(&text, keys.private_key()?)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &plaintext)?;
            if json {
                println!("{}", serde_json::json!({
                    "output": path.display().to_string(),
                    "bytes": plaintext.len(),
                }));
            } else {
                println!("Decrypted {} bytes to {}", plaintext.len(), path.display());
            }
        }
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&plaintext)?;
        }
    }

    Ok(())
}

fn cmd_release(site_dir: &Path, model: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    validate_model(model)?;
    let site = Site::open(site_dir)?;
    let record = site.db.increment_version(&site.config.vendor.firmware_id, model)?;

    if json {
        println!("{}", serde_json::to_string(&record)?);
    } else {
        println!("Released {} version {}", record.model_id, record.version);
    }

    Ok(())
}
