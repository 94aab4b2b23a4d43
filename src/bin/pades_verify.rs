//! Verify the signatures of a PDF.
//!
//! Usage:
//!   pades_verify <input.pdf>
//!   pades_verify <input.pdf> --trust <folder> --json
//!
//! Exits with status 0 when every signature is valid, 1 otherwise.

use pdf_pades::signatures::{SignatureVerificationInfo, SignatureVerifier};
use std::path::PathBuf;
use std::process::ExitCode;

struct Args {
    input: PathBuf,
    trust: Option<PathBuf>,
    json: bool,
}

impl Args {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut input = None;
        let mut trust = None;
        let mut json = false;

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--trust" | "-t" => {
                    i += 1;
                    trust = args.get(i).map(PathBuf::from);
                },
                "--json" => json = true,
                "--help" | "-h" => return Err(String::new()),
                flag if flag.starts_with('-') => return Err(format!("unknown option {}", flag)),
                value if input.is_none() => input = Some(PathBuf::from(value)),
                value => return Err(format!("unexpected argument {}", value)),
            }
            i += 1;
        }

        Ok(Self {
            input: input.ok_or("missing input path")?,
            trust,
            json,
        })
    }
}

fn print_signature(sig: &SignatureVerificationInfo) {
    let kind = if sig.is_document_timestamp {
        "Document timestamp"
    } else {
        "Signature"
    };
    println!("{} '{}': {:?}", kind, sig.field_name, sig.status());
    if let Some(name) = &sig.signer_name {
        println!("  signer:    {}", name);
    }
    if let Some(time) = sig.signing_time {
        println!("  signed at: {}", time.to_rfc3339());
    }
    if let Some(level) = sig.detected_level {
        println!("  level:     {}", level);
    }
    if let Some(cert) = &sig.certificate {
        println!("  subject:   {}", cert.subject);
        println!("  issuer:    {}", cert.issuer);
        println!("  validity:  {} .. {} ({:?})", cert.not_before, cert.not_after, cert.status);
    }
    if let Some(ts) = &sig.timestamp {
        println!(
            "  timestamp: {} ({})",
            ts.time.to_rfc3339(),
            if ts.valid { "valid" } else { "invalid" }
        );
    }
    println!(
        "  integrity: {}, covers document: {}, chain trusted: {}",
        sig.integrity_valid, sig.covers_whole_document, sig.chain_trusted
    );
    for error in &sig.errors {
        println!("  error:   {}", error);
    }
    for warning in &sig.warnings {
        println!("  warning: {}", warning);
    }
}

fn run(args: &Args) -> pdf_pades::Result<bool> {
    let mut verifier = SignatureVerifier::new();
    if let Some(folder) = &args.trust {
        verifier = verifier.with_trust_folder(folder)?;
    }
    let result = verifier.verify_file(&args.input)?;

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| pdf_pades::Error::Document(format!("cannot serialize report: {}", e)))?;
        println!("{}", json);
    } else {
        for sig in &result.signatures {
            print_signature(sig);
        }
        println!("{}", result.summary);
    }
    Ok(result.is_valid)
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match Args::from_args() {
        Ok(args) => args,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("Error: {}", message);
            }
            eprintln!("Usage: pades_verify <input.pdf> [--trust <folder>] [--json]");
            return ExitCode::from(2);
        },
    };

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error ({:?}): {}", e.kind(), e);
            ExitCode::FAILURE
        },
    }
}
