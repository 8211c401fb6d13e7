//! pdfseal - inspect, decrypt, encrypt and re-save PDF files
//!
//! Logging goes to stderr and is filtered with `RUST_LOG`.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use pdfseal_core::{
    Archive, CreateFlags, Creator, Document, EncryptionSettings, FileArchive, PdfError,
    Permissions, Stage,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pdfseal")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the encryption parameters of a file
    Info {
        file: PathBuf,
        #[arg(short = 'P', long, default_value = "")]
        password: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a password; the exit status is 0 when it authenticates
    Check {
        file: PathBuf,
        #[arg(short = 'P', long)]
        password: String,
    },
    /// Rewrite a file without encryption
    Decrypt {
        input: PathBuf,
        output: PathBuf,
        #[arg(short = 'P', long, default_value = "")]
        password: String,
    },
    /// Rewrite a file with new encryption
    Encrypt {
        input: PathBuf,
        output: PathBuf,
        /// Password of the input file, if it is encrypted
        #[arg(short = 'P', long, default_value = "")]
        password: String,
        #[arg(short = 'u', long, default_value = "")]
        user: String,
        /// Defaults to the user password
        #[arg(short = 'o', long, default_value = "")]
        owner: String,
        #[arg(short = 'c', long, value_enum, default_value = "aes-256")]
        cipher: CipherArg,
        /// AES-256 revision (5 or 6)
        #[arg(short = 'r', long, default_value = "6")]
        revision: u8,
        /// Comma-separated permissions to grant (default: all), e.g. print,copy
        #[arg(short = 'p', long, value_delimiter = ',')]
        permissions: Option<Vec<String>>,
        /// Leave XMP metadata streams in clear text
        #[arg(long)]
        clear_metadata: bool,
    },
    /// Re-save a file, keeping its encryption
    Resave {
        input: PathBuf,
        output: PathBuf,
        #[arg(short = 'P', long, default_value = "")]
        password: String,
        /// Append an update instead of rewriting the file
        #[arg(short = 'i', long)]
        incremental: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CipherArg {
    #[value(name = "rc4-40")]
    Rc4_40,
    #[value(name = "rc4-128")]
    Rc4_128,
    #[value(name = "aes-128")]
    Aes128,
    #[value(name = "aes-256")]
    Aes256,
}

#[derive(Debug, Serialize)]
struct SecurityInfo {
    encrypted: bool,
    revision: Option<i64>,
    cipher: Option<String>,
    key_bits: Option<usize>,
    permissions: Option<Vec<&'static str>>,
    owner_unlocked: bool,
    file_version: Option<u8>,
}

fn load(path: &Path, password: &str) -> Result<Document> {
    let data = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let doc = Document::load(data, password)
        .with_context(|| format!("failed to open {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        encrypted = doc.security_handler().is_some(),
        owner = doc.security_handler().is_some_and(|h| h.is_owner_unlocked()),
        "opened document"
    );
    Ok(doc)
}

type FileCreator<'d> = Creator<'d, FileArchive<BufWriter<File>>>;

fn write(
    doc: &mut Document,
    output: &Path,
    flags: CreateFlags,
    setup: impl FnOnce(&mut FileCreator<'_>),
) -> Result<()> {
    let file = File::create(output)
        .with_context(|| format!("failed to create output file {}", output.display()))?;
    let mut creator = Creator::new(doc, FileArchive::new(BufWriter::new(file)));
    setup(&mut creator);
    let stage = creator.create(flags)?;
    if stage != Stage::Complete {
        bail!("writer stopped at {stage:?}");
    }
    tracing::info!(
        output = %output.display(),
        bytes = creator.archive().current_offset(),
        incremental = creator.is_incremental(),
        security_changed = creator.security_changed(),
        "wrote document"
    );
    let mut archive = creator.into_archive();
    archive.flush()?;
    archive.into_inner().flush()?;
    Ok(())
}

fn info(file: &Path, password: &str, json: bool) -> Result<()> {
    let doc = load(file, password)?;
    let handler = doc.security_handler();
    let report = SecurityInfo {
        encrypted: handler.is_some(),
        revision: handler.map(|h| h.revision()),
        cipher: handler.map(|h| h.cipher().to_string()),
        key_bits: handler.map(|h| h.key_len() * 8),
        permissions: handler.map(|h| Permissions::from_bits_retain(h.permissions(true)).names()),
        owner_unlocked: handler.is_some_and(|h| h.is_owner_unlocked()),
        file_version: doc.source().map(|s| s.file_version()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if let Some(v) = report.file_version {
        println!("version:     {}.{}", v / 10, v % 10);
    }
    if !report.encrypted {
        println!("encryption:  none");
        return Ok(());
    }
    println!("revision:    {}", report.revision.unwrap_or_default());
    println!("cipher:      {}", report.cipher.unwrap_or_default());
    println!("key length:  {} bits", report.key_bits.unwrap_or_default());
    println!(
        "permissions: {}",
        report.permissions.unwrap_or_default().join(",")
    );
    println!("owner:       {}", if report.owner_unlocked { "yes" } else { "no" });
    Ok(())
}

fn encryption_settings(
    cipher: CipherArg,
    revision: u8,
    permissions: Option<&[String]>,
    clear_metadata: bool,
) -> Result<EncryptionSettings> {
    let settings = match cipher {
        CipherArg::Rc4_40 => EncryptionSettings::rc4_40(),
        CipherArg::Rc4_128 => EncryptionSettings::rc4_128(),
        CipherArg::Aes128 => EncryptionSettings::aes_128(),
        CipherArg::Aes256 => {
            if !matches!(revision, 5 | 6) {
                bail!("AES-256 revision must be 5 or 6, got {revision}");
            }
            EncryptionSettings::aes_256(revision)
        }
    };
    let granted = match permissions {
        None => Permissions::all(),
        Some(names) => names.iter().try_fold(Permissions::empty(), |acc, name| {
            Permissions::from_cli_name(name.trim())
                .map(|p| acc | p)
                .with_context(|| format!("unknown permission: {name}"))
        })?,
    };
    Ok(settings
        .with_permissions(granted)
        .with_encrypt_metadata(!clear_metadata))
}

fn run(args: Args) -> Result<ExitCode> {
    match args.command {
        Command::Info {
            file,
            password,
            json,
        } => info(&file, &password, json)?,
        Command::Check { file, password } => {
            let data = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            return match Document::load(data, &password) {
                Ok(doc) => {
                    let owner = doc
                        .security_handler()
                        .is_some_and(|h| h.is_owner_unlocked());
                    println!("ok ({} password)", if owner { "owner" } else { "user" });
                    Ok(ExitCode::SUCCESS)
                }
                Err(err @ PdfError::InvalidPassword) => {
                    println!("{err}");
                    Ok(ExitCode::FAILURE)
                }
                Err(err) => Err(err).context(format!("failed to open {}", file.display())),
            };
        }
        Command::Decrypt {
            input,
            output,
            password,
        } => {
            let mut doc = load(&input, &password)?;
            write(&mut doc, &output, CreateFlags::empty(), |c| c.remove_security())?;
        }
        Command::Encrypt {
            input,
            output,
            password,
            user,
            owner,
            cipher,
            revision,
            permissions,
            clear_metadata,
        } => {
            let settings =
                encryption_settings(cipher, revision, permissions.as_deref(), clear_metadata)?;
            let mut doc = load(&input, &password)?;
            write(&mut doc, &output, CreateFlags::empty(), |c| {
                c.set_security(settings, user, owner);
            })?;
        }
        Command::Resave {
            input,
            output,
            password,
            incremental,
        } => {
            let mut doc = load(&input, &password)?;
            let flags = if incremental {
                CreateFlags::INCREMENTAL
            } else {
                CreateFlags::empty()
            };
            write(&mut doc, &output, flags, |_| {})?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
