use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use pyre::constants::{CERT_FILE, KEY_FILE};
use rcgen::generate_simple_self_signed;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Simple helper to generate the self-signed keypair the listener fabric
/// loads from its certificate directory.
///
/// Secure defaults:
/// - ECDSA P-256 + SHA-256
/// - validity per rcgen defaults
/// - key permissions 0600 (on Unix), cert 0644
#[derive(Parser, Debug)]
#[command(
    name = "pyre-cert",
    version,
    about = "Generate a self-signed server.crt/server.key pair for Pyre"
)]
struct Cli {
    /// Directory the server reads certificates from
    #[arg(long, default_value = "certs")]
    out_dir: PathBuf,

    /// Subject alternative names to embed (repeatable). Defaults to localhost.
    #[arg(long)]
    host: Vec<String>,

    /// Overwrite output files if they exist
    #[arg(long, action = ArgAction::SetTrue)]
    force: bool,
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            // 0755 for directories
            let perm = fs::Permissions::from_mode(0o755);
            fs::set_permissions(parent, perm).ok();
        }
    }
    Ok(())
}

fn write_file(path: &Path, contents: &[u8], mode: u32, force: bool) -> std::io::Result<()> {
    if path.exists() && !force {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} exists; use --force to overwrite", path.display()),
        ));
    }
    ensure_parent(path)?;
    let mut f = File::create(path)?;
    f.write_all(contents)?;
    #[cfg(unix)]
    {
        let perm = fs::Permissions::from_mode(mode);
        fs::set_permissions(path, perm)?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut alt_names = cli.host.clone();
    if alt_names.is_empty() {
        alt_names.push("localhost".to_string());
    }

    let ck = generate_simple_self_signed(alt_names.clone())?;
    let cert_pem = ck.cert.pem();
    let key_pem = ck.key_pair.serialize_pem();

    let cert_path = cli.out_dir.join(CERT_FILE);
    let key_path = cli.out_dir.join(KEY_FILE);
    write_file(&cert_path, cert_pem.as_bytes(), 0o644, cli.force)?;
    write_file(&key_path, key_pem.as_bytes(), 0o600, cli.force)?;

    println!("✅ Generated cert and key");
    println!("  cert: {}", cert_path.display());
    println!("  key:  {}", key_path.display());
    println!("  SANs: {}", alt_names.join(", "));
    println!(
        "\nPoint the server at it (config.toml):\ncerts_dir = \"{}\"\n",
        cli.out_dir.display()
    );

    Ok(())
}
