//! Verify the signatures of an OFD package.
//!
//! Prints a JSON report and exits with status 1 when any signature is
//! invalid, 2 on error.
//!
//! Usage:
//!   cargo run --release --bin verify_ofd -- contract.ofd
//!   cargo run --release --bin verify_ofd -- contract.ofd --password 123456
//!   cargo run --release --bin verify_ofd -- contract.ofd --signer-cert signer.der
//!   cargo run --release --bin verify_ofd -- contract.ofd --signatures-path Doc_0/Signs/Signatures.xml --skip-validity

use std::path::PathBuf;
use std::process::ExitCode;

use ofd_sign::package::{OpenMode, ZipPackage};
use ofd_sign::signatures::{PackageVerifier, RsaVerifier};
use ofd_sign::{KeyMaterial, SignConfig};

struct VerifyArgs {
    input: PathBuf,
    signatures_path: Option<String>,
    password: Option<String>,
    signer_cert: Option<PathBuf>,
    check_validity: bool,
}

impl VerifyArgs {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().collect();
        let mut input = None;
        let mut signatures_path = None;
        let mut password = None;
        let mut signer_cert = None;
        let mut check_validity = true;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--signatures-path" => {
                    i += 1;
                    signatures_path = Some(args.get(i).ok_or("--signatures-path needs a value")?.clone());
                },
                "--password" => {
                    i += 1;
                    password = Some(args.get(i).ok_or("--password needs a value")?.clone());
                },
                "--signer-cert" => {
                    i += 1;
                    signer_cert = Some(PathBuf::from(args.get(i).ok_or("--signer-cert needs a value")?));
                },
                "--skip-validity" => {
                    check_validity = false;
                },
                other if input.is_none() && !other.starts_with("--") => {
                    input = Some(PathBuf::from(other));
                },
                other => return Err(format!("unexpected argument: {}", other)),
            }
            i += 1;
        }

        Ok(Self {
            input: input.ok_or(
                "usage: verify_ofd <file.ofd> [--password PW] [--signer-cert DER] [--signatures-path PATH] [--skip-validity]",
            )?,
            signatures_path,
            password,
            signer_cert,
            check_validity,
        })
    }
}

fn run(args: VerifyArgs) -> ofd_sign::Result<bool> {
    let mut config = SignConfig::default();
    if let Some(path) = args.signatures_path {
        config = config.with_signatures_path(path);
    }

    let mut verifier = PackageVerifier::new(
        RsaVerifier::new().with_validity_check(args.check_validity),
        config,
    );
    if let Some(password) = args.password {
        verifier = verifier.with_key_material(KeyMaterial::Password(password));
    }
    if let Some(path) = args.signer_cert {
        verifier = verifier.with_signer_certificate(std::fs::read(path)?);
    }

    let mut package = ZipPackage::open(&args.input, OpenMode::ReadOnly)?;
    let report = verifier.verify(&mut package)?;

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: cannot serialize report: {}", e),
    }
    Ok(report.is_valid())
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match VerifyArgs::from_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        },
    };

    let input = args.input.display().to_string();
    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            eprintln!("{}: signature verification failed", input);
            ExitCode::from(1)
        },
        Err(e) => {
            eprintln!("Error: {}: {}", input, e);
            ExitCode::from(2)
        },
    }
}
