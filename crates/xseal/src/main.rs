#![forbid(unsafe_code)]

//! xseal CLI: sign, verify, encrypt and decrypt XML documents.

use std::io::Write;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xseal::{
    C14nAlgorithm, Config, DecryptOptions, Destination, DocumentSource, EncAlgorithm, EncFormat,
    EncryptOptions, HashAlgorithm, KeySource, Output, PublicKeySource, Reference, SignAlgorithm,
    SignFormat, SignOptions, VerifyOptions, Xsec, XsecError,
};

#[derive(Parser)]
#[command(name = "xseal", about = "Sign, verify, encrypt and decrypt XML documents", version)]
struct Cli {
    /// TOML file with a [defaults] table
    #[arg(long, global = true, env = "XSEAL_CONFIG")]
    config: Option<PathBuf>,

    /// More logging (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Public key material; at most one may be given.
#[derive(Args)]
#[group(multiple = false)]
struct PublicKeyArgs {
    /// PEM public key
    #[arg(long)]
    pubkey: Option<PathBuf>,

    /// X.509 certificate (PEM or DER)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// PKCS#12 bundle
    #[arg(long)]
    p12: Option<PathBuf>,
}

impl PublicKeyArgs {
    fn source(self) -> Option<PublicKeySource> {
        self.pubkey
            .map(PublicKeySource::Pem)
            .or(self.cert.map(PublicKeySource::Certificate))
            .or(self.p12.map(PublicKeySource::Pkcs12))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Sign an XML document
    Sign {
        /// Input XML file
        file: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// enveloped, enveloping or detached
        #[arg(long, default_value_t = SignFormat::Unset)]
        format: SignFormat,

        /// c14n11, c14n or exclusive
        #[arg(long, default_value_t = C14nAlgorithm::Unset)]
        c14n: C14nAlgorithm,

        /// Digest algorithm (sha1 ... sha512)
        #[arg(long, default_value_t = HashAlgorithm::Unset)]
        hash: HashAlgorithm,

        /// Signature algorithm (rsa-sha256, ecdsa-sha384, ...)
        #[arg(long, default_value_t = SignAlgorithm::Unset)]
        algorithm: SignAlgorithm,

        /// PEM private key
        #[arg(short = 'k', long, conflicts_with = "p12")]
        key: Option<PathBuf>,

        /// PKCS#12 bundle holding the private key and its certificate
        #[arg(long)]
        p12: Option<PathBuf>,

        /// Password of the private key or bundle
        #[arg(long)]
        key_password: Option<String>,

        /// Certificate to embed as X509Data
        #[arg(long, conflicts_with = "pubkey")]
        cert: Option<PathBuf>,

        /// Public key to embed as KeyValue
        #[arg(long)]
        pubkey: Option<PathBuf>,

        /// Base URL for relative reference URIs
        #[arg(long)]
        base_url: Option<String>,

        /// uri[,hash=..][,c14n=..][,intersect=..][,subtract=..][,union=..]
        #[arg(long = "reference")]
        references: Vec<Reference>,
    },

    /// Verify a signed XML document
    Verify {
        /// Input XML file
        file: PathBuf,

        #[command(flatten)]
        key: PublicKeyArgs,

        /// Password of the PKCS#12 bundle
        #[arg(long)]
        key_password: Option<String>,

        /// Trust the given or embedded self-signed certificate
        #[arg(long)]
        trust_selfsigned: bool,

        /// Base URL for relative reference URIs
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Encrypt an XML document or parts of it
    Encrypt {
        /// Input XML file
        file: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// element, content or root
        #[arg(long, default_value_t = EncFormat::Unset)]
        form: EncFormat,

        /// aes128-cbc, aes192-cbc, aes256-cbc or 3des-cbc
        #[arg(long, default_value_t = EncAlgorithm::Unset)]
        algorithm: EncAlgorithm,

        #[command(flatten)]
        recipient: PublicKeyArgs,

        /// Password of the PKCS#12 bundle
        #[arg(long)]
        key_password: Option<String>,

        /// Trust the recipient's self-signed certificate
        #[arg(long)]
        trust_selfsigned: bool,

        /// XPath selecting elements to encrypt (default: the root)
        #[arg(long = "xpath")]
        xpaths: Vec<String>,
    },

    /// Decrypt an encrypted XML document
    Decrypt {
        /// Input XML file
        file: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// PEM private key
        #[arg(short = 'k', long, conflicts_with = "p12")]
        key: Option<PathBuf>,

        /// PKCS#12 bundle holding the private key
        #[arg(long)]
        p12: Option<PathBuf>,

        /// Password of the private key or bundle
        #[arg(long)]
        key_password: Option<String>,

        /// Trust the certificates in the bundle
        #[arg(long)]
        trust_selfsigned: bool,
    },

    /// Report whether files are signed, encrypted or plain
    Inspect {
        files: Vec<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error ({}): {e}", e.status_code());
            process::exit(2);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = if verbose == 0 {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level))
    } else {
        tracing_subscriber::EnvFilter::new(level)
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn key_source(key: Option<PathBuf>, p12: Option<PathBuf>) -> Option<KeySource> {
    key.map(KeySource::Pem).or(p12.map(KeySource::Pkcs12))
}

fn destination(output: &Option<PathBuf>) -> Destination {
    output.clone().map_or(Destination::Memory, Destination::Path)
}

fn run(cli: Cli) -> Result<i32, XsecError> {
    let mut xsec = match &cli.config {
        Some(path) => Xsec::with_defaults(Config::load(path)?.defaults()?),
        None => Xsec::new(),
    };

    match cli.command {
        Commands::Sign {
            file,
            output,
            format,
            c14n,
            hash,
            algorithm,
            key,
            p12,
            key_password,
            cert,
            pubkey,
            base_url,
            references,
        } => {
            let options = SignOptions {
                format,
                c14n,
                signature: algorithm,
                hash,
                private_key: key_source(key, p12),
                public_key: cert
                    .map(PublicKeySource::Certificate)
                    .or(pubkey.map(PublicKeySource::Pem)),
                key_password,
                base_url,
                references,
            };
            let out = xsec.sign(&DocumentSource::Path(file), &destination(&output), &options)?;
            emit(out)?;
            Ok(0)
        }

        Commands::Verify {
            file,
            key,
            key_password,
            trust_selfsigned,
            base_url,
        } => {
            let options = VerifyOptions {
                public_key: key.source(),
                key_password,
                trust_selfsigned,
                base_url,
            };
            let outcome = xsec.verify(&DocumentSource::Path(file), &options)?;
            if outcome.valid {
                println!("OK");
                Ok(0)
            } else {
                println!("INVALID");
                if let Some(reason) = outcome.diagnostic {
                    eprintln!("{reason}");
                }
                Ok(1)
            }
        }

        Commands::Encrypt {
            file,
            output,
            form,
            algorithm,
            recipient,
            key_password,
            trust_selfsigned,
            xpaths,
        } => {
            let options = EncryptOptions {
                form,
                algorithm,
                recipient: recipient.source(),
                key_password,
                trust_selfsigned,
                xpaths,
            };
            let out = xsec.encrypt(&DocumentSource::Path(file), &destination(&output), &options)?;
            emit(out)?;
            Ok(0)
        }

        Commands::Decrypt {
            file,
            output,
            key,
            p12,
            key_password,
            trust_selfsigned,
        } => {
            let options = DecryptOptions {
                private_key: key_source(key, p12),
                key_password,
                trust_selfsigned,
            };
            let out = xsec.decrypt(&DocumentSource::Path(file), &destination(&output), &options)?;
            emit(out)?;
            Ok(0)
        }

        Commands::Inspect { files } => {
            for file in files {
                let state = if xseal::has_signature(&file) {
                    "signed"
                } else if xseal::is_encrypted(&file) {
                    "encrypted"
                } else {
                    "plain"
                };
                println!("{}: {state}", file.display());
            }
            Ok(0)
        }
    }
}

/// In-memory results go to stdout; file results are already written.
fn emit(out: Output) -> Result<(), XsecError> {
    if let Output::Memory(bytes) = out {
        std::io::stdout()
            .write_all(&bytes)
            .map_err(|source| XsecError::Write {
                path: PathBuf::from("<stdout>"),
                source,
            })?;
    }
    Ok(())
}
