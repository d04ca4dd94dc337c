use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod auth;
use osenc::crypto::{RSA_BITS, keys::MIN_RSA_BITS};
use osenc::keystore::find_contact;
use osenc::{
    AtomicFile, ContainerKind, Credential, FileKeyStore, KdfParams, KeyBackup, KeyStore, Keypair,
    Recipient, detect_container_kind,
};

#[derive(Debug, Parser)]
#[command(name = "osenc")]
#[command(
    version,
    about = "Encrypt files with a password (.osenc) or for public-key recipients (.osencpk)."
)]
struct Cli {
    /// Path to the key store holding the device keypair and contacts
    #[arg(long, global = true, value_name = "PATH", env = "OSENC_KEYSTORE")]
    keystore: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Output path (defaults to a name derived from the input)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Overwrite the output file if it exists
    #[arg(short, long, default_value_t = false)]
    force: bool,
}

#[derive(Debug, Args)]
struct MetadataArgs {
    /// File name recorded in the container (defaults to the input's name)
    #[arg(long)]
    name: Option<String>,

    /// MIME type recorded in the container
    #[arg(long, default_value = osenc::DEFAULT_MIME)]
    mime: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Encrypts a file with a password
    #[command(arg_required_else_help = true)]
    Encrypt {
        input: PathBuf,

        /// PBKDF2 iterations
        #[arg(long, default_value_t = osenc::crypto::DEFAULT_ITERATIONS)]
        iterations: u32,

        #[command(flatten)]
        meta: MetadataArgs,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Encrypts a file for one or more contacts
    #[command(name = "encrypt-pk", arg_required_else_help = true)]
    EncryptPk {
        input: PathBuf,

        /// Contact id or label; repeat for several recipients
        #[arg(short, long = "recipient", value_name = "CONTACT")]
        recipients: Vec<String>,

        /// Also encrypt for this device's own keypair
        #[arg(long = "self", default_value_t = false)]
        include_self: bool,

        #[command(flatten)]
        meta: MetadataArgs,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Decrypts a .osenc or .osencpk file
    #[command(arg_required_else_help = true)]
    Decrypt {
        input: PathBuf,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Shows container metadata without decrypting
    #[command(arg_required_else_help = true)]
    Inspect { input: PathBuf },

    /// Manages this device's keypair
    #[command(subcommand)]
    Keys(KeysCommand),

    /// Manages recipient public keys
    #[command(subcommand)]
    Contacts(ContactsCommand),
}

#[derive(Debug, Subcommand)]
enum KeysCommand {
    /// Generates a new keypair, replacing the current one
    Generate {
        /// RSA modulus size
        #[arg(long, default_value_t = RSA_BITS)]
        bits: usize,

        /// Replace an existing keypair
        #[arg(short, long, default_value_t = false)]
        force: bool,
    },

    /// Prints the public key (base64 SPKI) to share with others
    Show,

    /// Writes a keypair backup (contains the private key)
    #[command(arg_required_else_help = true)]
    Export { path: PathBuf },

    /// Restores a keypair backup or an RSA private JWK
    #[command(arg_required_else_help = true)]
    Import {
        path: PathBuf,

        /// Replace an existing keypair
        #[arg(short, long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Debug, Subcommand)]
enum ContactsCommand {
    /// Adds a recipient public key (base64 SPKI or PEM; "-" reads stdin)
    #[command(arg_required_else_help = true)]
    Add { label: String, public_key: String },

    /// Lists contacts
    List,

    /// Removes a contact by id
    #[command(arg_required_else_help = true)]
    Remove { id: String },
}

fn default_keystore_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "osenc").context("could not determine platform directories")?;
    Ok(dirs.data_dir().join("keystore.json"))
}

fn open_keystore(path: Option<PathBuf>) -> Result<FileKeyStore> {
    let path = match path {
        Some(p) => p,
        None => default_keystore_path()?,
    };
    Ok(FileKeyStore::new(AtomicFile::new(path)))
}

fn device_keypair(store: &FileKeyStore) -> Result<Keypair> {
    store.load_device_keypair()?.with_context(|| {
        format!(
            "no device keypair in {}; run `osenc keys generate` or `osenc keys import` first",
            store.file().path().display()
        )
    })
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn input_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn write_output(path: &Path, data: &[u8], force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    AtomicFile::new(path)
        .write(data)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Names embedded in containers are untrusted: only the final component is
/// used, placed next to the input.
fn decrypted_output_path(input: &Path, embedded: &str) -> PathBuf {
    let name = Path::new(embedded)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "decrypted.bin".to_string());
    input.with_file_name(name)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("OSENC_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    match args.command {
        Commands::Encrypt {
            input,
            iterations,
            meta,
            out,
        } => {
            let kdf = KdfParams::new(iterations)?;
            let plaintext = read_input(&input)?;
            let name = meta.name.unwrap_or_else(|| input_name(&input));
            let password = auth::read_new_password_with_confirmation()?;

            let container =
                osenc::encrypt_password_with_kdf(&plaintext, &password, &name, &meta.mime, kdf)?;

            let target = out.output.unwrap_or_else(|| {
                input.with_file_name(osenc::make_osenc_filename(&input_name(&input)))
            });
            write_output(&target, &container, out.force)?;
            println!("encrypted {} -> {}", input.display(), target.display());
        }
        Commands::EncryptPk {
            input,
            recipients,
            include_self,
            meta,
            out,
        } => {
            let store = open_keystore(args.keystore)?;
            let contacts = store.list_contacts()?;

            let mut resolved = recipients
                .iter()
                .map(|query| Ok(find_contact(&contacts, query)?.recipient()?))
                .collect::<Result<Vec<Recipient>>>()?;
            if include_self {
                let me = device_keypair(&store)?;
                resolved.push(Recipient::new("me", me.public().clone()));
            }
            if resolved.is_empty() {
                bail!("no recipients given; use --recipient <CONTACT> or --self");
            }

            let plaintext = read_input(&input)?;
            let name = meta.name.unwrap_or_else(|| input_name(&input));
            let container = osenc::encrypt_public_key(&plaintext, &resolved, &name, &meta.mime)?;

            let target = out.output.unwrap_or_else(|| {
                input.with_file_name(osenc::make_osencpk_filename(&input_name(&input)))
            });
            write_output(&target, &container, out.force)?;
            println!(
                "encrypted {} for {} recipient(s) -> {}",
                input.display(),
                resolved.len(),
                target.display()
            );
        }
        Commands::Decrypt { input, out } => {
            let container = read_input(&input)?;
            let decrypted = match detect_container_kind(&container) {
                ContainerKind::Password => {
                    let password = auth::read_password()?;
                    osenc::decrypt_any(&container, Credential::Password(&password))?
                }
                ContainerKind::PublicKey => {
                    let store = open_keystore(args.keystore)?;
                    let keypair = device_keypair(&store)?;
                    osenc::decrypt_any(&container, Credential::PrivateKey(keypair.private()))?
                }
            };

            let target = out
                .output
                .unwrap_or_else(|| decrypted_output_path(&input, &decrypted.filename));
            write_output(&target, &decrypted.plaintext, out.force)?;
            println!(
                "decrypted {} -> {} ({})",
                input.display(),
                target.display(),
                decrypted.mime
            );
        }
        Commands::Inspect { input } => {
            let info = osenc::inspect(&read_input(&input)?)?;
            let kind = match info.kind {
                ContainerKind::Password => "password (.osenc)",
                ContainerKind::PublicKey => "public key (.osencpk)",
            };
            println!("kind:          {kind}");
            println!("filename:      {}", info.filename);
            println!("mime:          {}", info.mime);
            println!("original size: {}", info.original_size);
            println!("payload:       {} bytes", info.payload_len);
            if let Some(iterations) = info.iterations {
                println!("iterations:    {iterations}");
            }
            for label in &info.recipients {
                println!("recipient:     {label}");
            }
        }
        Commands::Keys(cmd) => {
            let mut store = open_keystore(args.keystore)?;
            match cmd {
                KeysCommand::Generate { bits, force } => {
                    if bits < MIN_RSA_BITS {
                        bail!("--bits must be at least {MIN_RSA_BITS}");
                    }
                    if !force && store.load_device_keypair()?.is_some() {
                        bail!("a device keypair already exists (use --force to replace it)");
                    }
                    let keypair = Keypair::generate_with_bits(bits)?;
                    store.save_device_keypair(&keypair)?;
                    println!("keypair generated");
                    println!("{}", keypair.public().to_base64()?);
                }
                KeysCommand::Show => {
                    println!("{}", device_keypair(&store)?.public().to_base64()?);
                }
                KeysCommand::Export { path } => {
                    let backup = KeyBackup::new(&device_keypair(&store)?)?;
                    write_output(&path, backup.to_json()?.as_bytes(), false)?;
                    println!(
                        "keypair exported to {}; anyone with this file can decrypt your files",
                        path.display()
                    );
                }
                KeysCommand::Import { path, force } => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    let keypair = KeyBackup::import(&text)?;
                    if !force && store.load_device_keypair()?.is_some() {
                        bail!("a device keypair already exists (use --force to replace it)");
                    }
                    store.save_device_keypair(&keypair)?;
                    println!("keypair imported");
                }
            }
        }
        Commands::Contacts(cmd) => {
            let mut store = open_keystore(args.keystore)?;
            match cmd {
                ContactsCommand::Add { label, public_key } => {
                    let public_key = if public_key == "-" {
                        std::io::read_to_string(std::io::stdin())?
                    } else {
                        public_key
                    };
                    let contact = store.add_contact(&label, &public_key)?;
                    println!("added contact '{}' ({})", contact.label, contact.id);
                }
                ContactsCommand::List => {
                    let contacts = store.list_contacts()?;
                    if contacts.is_empty() {
                        println!("No contacts stored.");
                        return Ok(());
                    }

                    let id_width = contacts
                        .iter()
                        .map(|c| c.id.len())
                        .chain(std::iter::once("Id".len()))
                        .max()
                        .unwrap_or(2);

                    println!("{:<id_width$}  Label", "Id");
                    println!("{:-<id_width$}  -----", "");
                    for c in contacts {
                        println!("{:<id_width$}  {}", c.id, c.label);
                    }
                }
                ContactsCommand::Remove { id } => {
                    store.remove_contact(&id)?;
                    println!("contact '{id}' removed");
                }
            }
        }
    }

    Ok(())
}
