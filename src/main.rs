//! pairlock - end-to-end encryption for paired and group chat
//!
//! Keys stay on this device. The relay only ever sees ciphertext.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pairlock::cli::{self, CliContext};
use pairlock::message::RenderedMessage;

/// End-to-end encryption for paired and group chat.
#[derive(Parser)]
#[command(name = "pairlock")]
#[command(author = "Katie")]
#[command(version)]
#[command(about = "End-to-end encryption for paired and group chat.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory for keys
    #[arg(long, env = "PAIRLOCK_DATA_DIR", default_value = "~/.pairlock")]
    data_dir: PathBuf,

    /// Send unencrypted, clearly marked text when no shared key exists
    #[arg(long, env = "PAIRLOCK_ALLOW_PLAINTEXT")]
    allow_plaintext: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new key pair
    Keygen {
        /// RSA-4096 with SHA-512 instead of RSA-2048
        #[arg(long)]
        enhanced: bool,
    },

    /// Print the own public key
    ShowKey,

    /// Pair with a partner using their public key
    Pair {
        /// Partner's public key
        public_key: String,
    },

    /// Encrypt a message for the partner
    Encrypt {
        /// Message text
        text: String,
    },

    /// Decrypt a message from the partner
    Decrypt {
        /// Envelope JSON
        envelope: String,
    },

    /// Encrypt a file for the partner
    EncryptFile {
        /// File to encrypt
        path: PathBuf,
        /// MIME type, guessed from the extension when omitted
        #[arg(long)]
        mime: Option<String>,
    },

    /// Decrypt a file envelope from the partner
    DecryptFile {
        /// File holding the envelope JSON
        envelope: PathBuf,
        /// Where to write the decrypted file
        #[arg(long)]
        out: PathBuf,
    },

    /// Encrypt a message for several members at once
    GroupEncrypt {
        /// Group id
        #[arg(long)]
        group: String,
        /// Sender id stamped on the message
        #[arg(long, default_value = "me")]
        sender: String,
        /// Member as USER=PUBLIC_KEY, repeatable
        #[arg(long = "member", required = true)]
        members: Vec<String>,
        /// Message text
        text: String,
    },

    /// Decrypt a group message with the own key pair
    GroupDecrypt {
        /// Envelope JSON
        envelope: String,
        /// Own user id in the group
        #[arg(long)]
        user: String,
    },

    /// Remove all stored key material
    ClearKeys,

    /// Show key and pairing status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let ctx = CliContext::new(cli::expand_home(&args.data_dir)?, args.allow_plaintext);

    match args.command {
        Commands::Keygen { enhanced } => {
            let pair = cli::handle_keygen(&ctx, enhanced).await?;
            println!("Generated {:?} key pair", pair.mode);
            println!("{}", pair.public_key);
        }
        Commands::ShowKey => {
            println!("{}", cli::handle_show_key(&ctx)?);
        }
        Commands::Pair { public_key } => {
            let fingerprint = cli::handle_pair(&ctx, &public_key)?;
            println!("Paired. Compare this fingerprint with your partner: {}", fingerprint);
        }
        Commands::Encrypt { text } => {
            println!("{}", cli::handle_encrypt(&ctx, &text)?);
        }
        Commands::Decrypt { envelope } => {
            print_rendered(cli::handle_decrypt(&ctx, &envelope)?)?;
        }
        Commands::EncryptFile { path, mime } => {
            println!("{}", cli::handle_encrypt_file(&ctx, &path, mime.as_deref())?);
        }
        Commands::DecryptFile { envelope, out } => {
            let file = cli::handle_decrypt_file(&ctx, &envelope, &out)?;
            println!(
                "Wrote {} ({}, {} bytes) to {}",
                file.file_name,
                file.file_type,
                file.len(),
                out.display()
            );
        }
        Commands::GroupEncrypt {
            group,
            sender,
            members,
            text,
        } => {
            let encryption = cli::handle_group_encrypt(&group, &sender, &members, &text)?;
            for skipped in &encryption.skipped {
                eprintln!("Skipped {}: {}", skipped.user_id, skipped.reason);
            }
            println!("{}", serde_json::to_string(&encryption.message)?);
        }
        Commands::GroupDecrypt { envelope, user } => {
            print_rendered(cli::handle_group_decrypt(&ctx, &envelope, &user)?)?;
        }
        Commands::ClearKeys => {
            cli::handle_clear_keys(&ctx)?;
            println!("All key material removed from {}", ctx.data_dir.display());
        }
        Commands::Status => {
            println!("{}", cli::handle_status(&ctx)?);
        }
    }

    Ok(())
}

fn print_rendered(rendered: RenderedMessage) -> Result<()> {
    match rendered {
        RenderedMessage::Undecryptable {
            placeholder,
            diagnostics,
        } => {
            println!("[{}]", placeholder);
            bail!("{:?}: {}", diagnostics.kind, diagnostics.error)
        }
        RenderedMessage::File(file) => {
            println!(
                "[file] {} ({}, {} bytes); use decrypt-file to save it",
                file.file_name,
                file.file_type,
                file.len()
            );
            Ok(())
        }
        other => {
            println!("{}", other.display_text());
            Ok(())
        }
    }
}
