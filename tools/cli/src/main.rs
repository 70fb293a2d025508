//! kryptr CLI - encrypt files under a machine-bound key.
//!
//! Key material lives in a per-user directory created by `kryptr setup`.
//! Encrypted output is base64 text; decrypted output is the original bytes.

use anyhow::{bail, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use kryptr_keystore::{write_atomic, Keystore, KeystoreConfig};

#[derive(Parser)]
#[command(name = "kryptr")]
#[command(about = "kryptr - Machine-bound file encryption")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Key directory (default: ~/.kryptr.d).
    #[arg(long, env = "KRYPTR_HOME", global = true, value_name = "DIR")]
    key_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new key set, replacing the current one.
    Setup {
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// RSA key size in bits.
        #[arg(long, default_value_t = kryptr_crypto::DEFAULT_KEY_BITS)]
        key_bits: usize,
    },

    /// Encrypt a file.
    Encrypt {
        #[command(flatten)]
        io: IoArgs,

        /// Delete the input file once the output is written.
        #[arg(long, requires_all = ["input", "output"])]
        delete_input: bool,
    },

    /// Decrypt a file encrypted on this machine.
    Decrypt {
        #[command(flatten)]
        io: IoArgs,
    },

    /// Decrypt a file with the recovery password of an earlier setup.
    Recover {
        #[command(flatten)]
        io: IoArgs,

        /// Recovery password (prompted for when omitted).
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Show what the key directory holds.
    Info {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print shell completions.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
struct IoArgs {
    /// Input file (default: stdin).
    #[arg(short = 'i', long = "in", value_name = "PATH")]
    input: Option<PathBuf>,

    /// Output file (default: stdout).
    #[arg(short = 'o', long = "out", value_name = "PATH")]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so decrypted data on stdout stays clean
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "kryptr", &mut std::io::stdout());
        return Ok(());
    }

    let config = match &cli.key_dir {
        Some(dir) => KeystoreConfig::new(dir),
        None => KeystoreConfig::default_location().context("Failed to locate key directory")?,
    };

    match cli.command {
        Commands::Setup { yes, key_bits } => cmd_setup(config.with_key_bits(key_bits), yes).await,
        Commands::Encrypt { io, delete_input } => cmd_encrypt(config, &io, delete_input).await,
        Commands::Decrypt { io } => cmd_decrypt(config, &io).await,
        Commands::Recover { io, password } => cmd_recover(config, &io, password).await,
        Commands::Info { json } => cmd_info(config, json),
        Commands::Completions { .. } => Ok(()),
    }
}

/// Cancellation token fired by Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

/// Ask the user to type YES.
fn confirm_setup(dir: &Path) -> Result<bool> {
    eprintln!(
        "Setup replaces the key set in {}. Files encrypted under the current key set",
        dir.display()
    );
    eprintln!("can then only be opened with their recovery password.");
    eprint!("Type YES to continue: ");
    std::io::stderr().flush()?;

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(answer.trim() == "YES")
}

/// Generate a new key set.
async fn cmd_setup(config: KeystoreConfig, yes: bool) -> Result<()> {
    if !yes && !confirm_setup(config.dir())? {
        bail!("Setup aborted");
    }

    let keystore = Keystore::new(config);
    let cancel = interrupt_token();

    let report = keystore
        .setup(&cancel)
        .await
        .context("Failed to set up key material")?;

    println!("Key material written to {}", keystore.config().dir().display());
    println!("  Key size: {} bits", report.manifest.key_bits);
    println!();
    println!("Recovery password (shown once, store it somewhere safe):");
    println!("  {}", report.recovery_password.expose());

    Ok(())
}

/// Encrypt input to base64 text.
async fn cmd_encrypt(config: KeystoreConfig, io: &IoArgs, delete_input: bool) -> Result<()> {
    validate_io(io, delete_input)?;
    let plaintext = Zeroizing::new(read_input(io.input.as_deref()).await?);

    let keystore = Keystore::new(config);
    let blob = keystore
        .encrypt(&plaintext)
        .context("Failed to encrypt")?;

    match &io.output {
        Some(path) => write_output(path, blob.as_bytes())?,
        None => write_stdout(format!("{}\n", blob).as_bytes()).await?,
    }

    if delete_input {
        if let Some(input) = &io.input {
            tokio::fs::remove_file(input)
                .await
                .with_context(|| format!("Failed to delete {}", input.display()))?;
            info!("Deleted input file {}", input.display());
        }
    }

    Ok(())
}

/// Decrypt input with the derived key.
async fn cmd_decrypt(config: KeystoreConfig, io: &IoArgs) -> Result<()> {
    validate_io(io, false)?;
    let blob = read_input(io.input.as_deref()).await?;

    let keystore = Keystore::new(config);
    let plaintext = Zeroizing::new(
        keystore
            .decrypt(&blob)
            .context("Failed to decrypt (use `kryptr recover` for files from an earlier setup)")?,
    );

    emit_plaintext(io, &plaintext).await
}

/// Decrypt input with a recovery password.
async fn cmd_recover(config: KeystoreConfig, io: &IoArgs, password: Option<String>) -> Result<()> {
    validate_io(io, false)?;
    let blob = read_input(io.input.as_deref()).await?;

    let password = Zeroizing::new(match password {
        Some(p) => p,
        None => rpassword::prompt_password("Recovery password: ")
            .context("Failed to read password")?,
    });

    let keystore = Keystore::new(config);
    let plaintext = Zeroizing::new(
        keystore
            .recover(&blob, password.as_bytes())
            .context("Failed to recover")?,
    );

    emit_plaintext(io, &plaintext).await
}

/// Show key directory status.
fn cmd_info(config: KeystoreConfig, json: bool) -> Result<()> {
    let keystore = Keystore::new(config);
    let info = keystore.info().context("Failed to inspect key directory")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let mark = |present: bool| if present { "present" } else { "missing" };

    println!("Key directory: {}", info.dir.display());
    println!("  Private key: {}", mark(info.private_key));
    println!("  Public key: {}", mark(info.public_key));
    println!("  Wrapped salt: {}", mark(info.wrapped_salt));
    if let Some(bits) = info.key_bits {
        println!("  Key size: {} bits", bits);
    }
    match &info.manifest {
        Some(manifest) => {
            println!(
                "  Version: {}.{}",
                manifest.version.major, manifest.version.minor
            );
            println!("  Created: {}", manifest.created_at);
        }
        None => println!("  Manifest: none"),
    }
    if !info.is_ready() {
        println!("\nRun `kryptr setup` to create key material.");
    }

    Ok(())
}

/// Reject option combinations before touching any file.
fn validate_io(io: &IoArgs, delete_input: bool) -> Result<()> {
    if io.input.is_none() && std::io::stdin().is_terminal() {
        bail!("No input: pass --in <PATH> or pipe data on stdin");
    }

    if delete_input {
        let (Some(input), Some(output)) = (&io.input, &io.output) else {
            bail!("--delete-input requires both --in and --out");
        };
        if same_file(input, output) {
            bail!("--delete-input with --in and --out naming the same file would destroy the output");
        }
    }

    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

async fn read_input(input: Option<&Path>) -> Result<Vec<u8>> {
    match input {
        Some(path) => {
            debug!("Reading {}", path.display());
            tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    write_atomic(path, data).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} ({} bytes)", path.display(), data.len());
    Ok(())
}

async fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(data).await.context("Failed to write stdout")?;
    stdout.flush().await.context("Failed to write stdout")?;
    Ok(())
}

async fn emit_plaintext(io: &IoArgs, plaintext: &[u8]) -> Result<()> {
    match &io.output {
        Some(path) => write_output(path, plaintext),
        None => write_stdout(plaintext).await,
    }
}
