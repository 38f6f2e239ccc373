//! Hybridbox CLI - hybrid file encryption
//!
//! Command-line interface for generating an RSA key pair and encrypting or
//! decrypting files with RSA-OAEP wrapped ChaCha20 keys.

use clap::{Parser, Subcommand};
use std::error::Error as StdError;
use std::path::PathBuf;
use std::process;

use hybridbox::error::{ErrorCategory, ErrorKind, HybridboxError, Result};
use hybridbox::{CryptoParams, HybridEncryptionService, Settings, keypair};

#[derive(Parser)]
#[command(name = "hybridbox")]
#[command(version)]
#[command(about = "Hybrid RSA + ChaCha20 file encryption.", long_about = None)]
struct Cli {
    /// JSON settings file providing default paths and parameters
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an RSA key pair
    #[command(alias = "g")]
    GenerateKeys {
        /// Path to write the PEM private key to
        #[arg(long, value_name = "FILE")]
        private_key: Option<PathBuf>,

        /// Path to write the PEM public key to
        #[arg(long, value_name = "FILE")]
        public_key: Option<PathBuf>,

        /// RSA modulus size in bits
        #[arg(long, value_name = "BITS")]
        modulus_bits: Option<usize>,
    },

    /// Encrypt a file
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file whose contents is to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Path to write the envelope to
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Recipient's PEM public key
        #[arg(long, value_name = "FILE")]
        public_key: Option<PathBuf>,
    },

    /// Decrypt a file
    #[command(alias = "d")]
    Decrypt {
        /// Path to the envelope to be decrypted
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Path to write the plaintext to
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// PEM private key matching the envelope's public key
        #[arg(long, value_name = "FILE")]
        private_key: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", error_chain(&e));
        process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::GenerateKeys {
            private_key,
            public_key,
            modulus_bits,
        } => {
            let private_path = required(private_key, &settings.private_key, "private-key")?;
            let public_path = required(public_key, &settings.public_key, "public-key")?;
            let params = CryptoParams {
                modulus_bits: modulus_bits.unwrap_or(settings.params.modulus_bits),
                ..settings.params
            };
            let pair = keypair::generate(&params)?;
            keypair::save_key_pair(&pair, &private_path, &public_path)
        }
        Commands::Encrypt {
            input,
            output,
            public_key,
        } => {
            let input = required(input, &settings.input_file, "input")?;
            let output = required(output, &settings.encrypted_output, "output")?;
            let public_path = required(public_key, &settings.public_key, "public-key")?;
            let public = keypair::read_public(&public_path)?;
            let service = HybridEncryptionService::new(&settings.params)?;
            service.encrypt_file(&input, &output, &public).map(drop)
        }
        Commands::Decrypt {
            input,
            output,
            private_key,
        } => {
            let input = required(input, &settings.encrypted_output, "input")?;
            let output = required(output, &settings.decrypted_output, "output")?;
            let private_path = required(private_key, &settings.private_key, "private-key")?;
            let private = keypair::read_private(&private_path)?;
            let service = HybridEncryptionService::new(&settings.params)?;
            service.decrypt_file(&input, &output, &private).map(drop)
        }
    }
}

/// Picks the command-line value, falling back to the settings file.
fn required(arg: Option<PathBuf>, fallback: &Option<PathBuf>, flag: &str) -> Result<PathBuf> {
    arg.or_else(|| fallback.clone()).ok_or_else(|| {
        HybridboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::Config,
            format!("missing --{flag} (and no value in the settings file)"),
        )
    })
}

fn error_chain(err: &HybridboxError) -> String {
    let mut out = err.to_string();
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}
