//! Sign a PDF according to a JSON signing configuration.
//!
//! Usage:
//!   pades_sign <input.pdf> <output.pdf> --config <config.json>
//!   pades_sign <input.pdf> <output.pdf> --config <config.json> --password <p12 password>
//!
//! The configuration must declare a certificate source. `--password` overrides
//! the password of a PKCS#12 source so it need not be stored in the file.

use pdf_pades::signatures::{CertificateSource, PdfSigner};
use pdf_pades::SigningConfig;
use std::path::PathBuf;
use std::process::ExitCode;

struct Args {
    input: PathBuf,
    output: PathBuf,
    config: PathBuf,
    password: Option<String>,
}

impl Args {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut positional = Vec::new();
        let mut config = None;
        let mut password = None;

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    i += 1;
                    config = args.get(i).map(PathBuf::from);
                },
                "--password" => {
                    i += 1;
                    password = args.get(i).cloned();
                },
                "--help" | "-h" => return Err(String::new()),
                flag if flag.starts_with('-') => return Err(format!("unknown option {}", flag)),
                value => positional.push(PathBuf::from(value)),
            }
            i += 1;
        }

        if positional.len() != 2 {
            return Err("expected an input and an output path".to_string());
        }
        let output = positional.pop().unwrap_or_default();
        let input = positional.pop().unwrap_or_default();
        Ok(Self {
            input,
            output,
            config: config.ok_or("missing --config")?,
            password,
        })
    }
}

fn usage() {
    eprintln!("Usage: pades_sign <input.pdf> <output.pdf> --config <config.json> [--password <password>]");
}

fn run(args: &Args) -> pdf_pades::Result<()> {
    let mut config = SigningConfig::from_file(&args.config)?;
    if let (Some(password), Some(CertificateSource::Pkcs12 { password: stored, .. })) =
        (&args.password, config.certificate.as_mut())
    {
        *stored = password.clone();
    }

    let options = config.to_sign_options()?;
    let certificate = config.load_certificate()?;
    let result = PdfSigner::new()?.sign_file(&args.input, &args.output, certificate, &options)?;

    println!("Signed {} -> {}", args.input.display(), args.output.display());
    println!("  field:   {}", result.field_name);
    println!("  level:   {}", result.level);
    println!("  signer:  {}", result.signer_name);
    println!("  issuer:  {}", result.certificate_issuer);
    println!("  serial:  {}", result.certificate_serial);
    println!("  time:    {}", result.signing_time.to_rfc3339());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match Args::from_args() {
        Ok(args) => args,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("Error: {}", message);
            }
            usage();
            return ExitCode::from(2);
        },
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error ({:?}): {}", e.kind(), e);
            ExitCode::FAILURE
        },
    }
}
